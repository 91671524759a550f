// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Which special services must be kept in sync, decided once per distribution.

use super::ports::{translate_metrics_proxy_ports, translate_service_ports};
use super::{ServiceKey, SpecialServiceBinding};
use crate::constants::{dns, metrics};
use crate::context::ClusterContext;
use crate::error::ControlPlaneError;
use crate::kubernetes::NamespaceTranslator;
use kube::Client;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Flavour of the virtual cluster's control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Distribution {
    /// Plain upstream API server
    #[default]
    Vanilla,
    /// Packaged distro that serves metrics through the control-plane proxy
    K8sDistro,
}

impl Distribution {
    pub fn proxies_metrics(&self) -> bool {
        matches!(self, Distribution::K8sDistro)
    }
}

impl FromStr for Distribution {
    type Err = ControlPlaneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vanilla" => Ok(Distribution::Vanilla),
            "k8s" | "distro" => Ok(Distribution::K8sDistro),
            other => Err(ControlPlaneError::ConfigError(format!(
                "unknown distribution '{}', expected vanilla or k8s",
                other
            ))),
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Vanilla => write!(f, "vanilla"),
            Distribution::K8sDistro => write!(f, "k8s"),
        }
    }
}

/// Resolves the special-service bindings and the DNS authority.
///
/// Stateless after construction: the binding set never changes.
#[derive(Clone)]
pub struct SpecialServiceResolver {
    bindings: Vec<SpecialServiceBinding>,
    translator: Arc<dyn NamespaceTranslator>,
}

impl SpecialServiceResolver {
    /// `service_name` and `current_namespace` locate the control plane's own
    /// service, which fronts the metrics proxy on distro clusters.
    pub fn new(
        distribution: Distribution,
        translator: Arc<dyn NamespaceTranslator>,
        service_name: &str,
        current_namespace: &str,
    ) -> Self {
        let mut bindings = vec![SpecialServiceBinding {
            virtual_service: ServiceKey::new(dns::SERVICE_NAMESPACE, dns::SERVICE_NAME),
            physical_service: ServiceKey::new(
                translator.physical_namespace(dns::SERVICE_NAMESPACE),
                dns::SERVICE_NAME,
            ),
            translate_ports: translate_service_ports,
        }];

        if distribution.proxies_metrics() {
            bindings.push(SpecialServiceBinding {
                virtual_service: ServiceKey::new(
                    metrics::PROXY_SERVICE_NAMESPACE,
                    metrics::PROXY_SERVICE_NAME,
                ),
                physical_service: ServiceKey::new(
                    current_namespace,
                    format!("{}{}", service_name, metrics::PROXY_SERVICE_SUFFIX),
                ),
                translate_ports: translate_metrics_proxy_ports,
            });
        }

        Self {
            bindings,
            translator,
        }
    }

    pub fn bindings(&self) -> &[SpecialServiceBinding] {
        &self.bindings
    }

    /// Client and namespace to consult for DNS service resolution
    pub fn dns_authority(&self, ctx: &ClusterContext) -> (Client, String) {
        (
            ctx.physical.clone(),
            self.translator.physical_namespace(dns::SERVICE_NAMESPACE),
        )
    }
}
