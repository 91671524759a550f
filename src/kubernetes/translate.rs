// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Mapping of virtual-cluster namespaces onto the physical cluster.

/// Pure mapping from a namespace as seen inside the virtual cluster to the
/// namespace that holds its objects in the physical cluster.
pub trait NamespaceTranslator: Send + Sync {
    fn physical_namespace(&self, virtual_namespace: &str) -> String;
}

/// Every virtual namespace is folded into a single physical target namespace.
#[derive(Debug, Clone)]
pub struct TargetNamespace {
    target: String,
}

impl TargetNamespace {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl NamespaceTranslator for TargetNamespace {
    fn physical_namespace(&self, _virtual_namespace: &str) -> String {
        self.target.clone()
    }
}

impl<F> NamespaceTranslator for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn physical_namespace(&self, virtual_namespace: &str) -> String {
        self(virtual_namespace)
    }
}
