// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Control loops that react to watch events.

pub mod service;

pub use service::ServiceWatchLoop;
