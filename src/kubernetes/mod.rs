// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for client creation, namespace management and
//! virtual-to-physical namespace translation.

pub mod client;
pub mod namespaces;
pub mod translate;

pub use client::create_client_from_kubeconfig_file;
pub use namespaces::{ensure_namespace_exists, EnsureNamespace};
pub use translate::{NamespaceTranslator, TargetNamespace};
