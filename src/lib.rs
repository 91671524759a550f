// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod aggregation;
pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod context;
pub mod credentials;
pub mod error;
pub mod kubernetes;
pub mod leadership;
pub mod manifests;
pub mod reconcilers;
pub mod retry;
pub mod specialservices;

#[cfg(test)]
pub(crate) mod test_utils;
