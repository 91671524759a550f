// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster-critical services mirrored between the virtual and physical cluster.

pub mod ports;
pub mod resolver;
pub mod sync;

pub use ports::{translate_metrics_proxy_ports, translate_service_ports, PortTranslator};
pub use resolver::{Distribution, SpecialServiceResolver};
pub use sync::sync_special_service;

use std::fmt;

/// Namespace and name of a Service
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub namespace: String,
    pub name: String,
}

impl ServiceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A virtual service whose ports are mirrored onto a physical service.
#[derive(Clone)]
pub struct SpecialServiceBinding {
    pub virtual_service: ServiceKey,
    pub physical_service: ServiceKey,
    pub translate_ports: PortTranslator,
}

impl fmt::Debug for SpecialServiceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecialServiceBinding")
            .field("virtual_service", &self.virtual_service)
            .field("physical_service", &self.physical_service)
            .finish()
    }
}
