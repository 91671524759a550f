// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{credentials, DEFAULT_COREDNS_MANIFEST, SERVICE_ACCOUNT_NAMESPACE_FILE};
use crate::error::{ControlPlaneError, Result};
use crate::specialservices::Distribution;
use std::env;
use std::path::PathBuf;

/// Control-plane configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the control plane's own service in its namespace
    pub service_name: String,
    /// Namespace the control plane runs in
    pub current_namespace: String,
    /// Namespace virtual workloads are synced into on the physical side
    pub target_namespace: String,
    /// Record the control-plane service as owner of produced objects
    pub set_owner: bool,
    /// Whether the metrics aggregation registration should exist
    pub proxy_metrics_server: bool,
    /// Keep plugin subsystems out of leader-only work
    pub disable_plugins: bool,
    pub distribution: Distribution,
    /// Kubeconfig of the virtual cluster API surface
    pub virtual_kubeconfig: PathBuf,
    /// Secret the virtual kubeconfig is persisted to
    pub kubeconfig_secret: String,
    /// DNS add-on manifest applied to the virtual cluster
    pub coredns_manifest: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let service_name = lookup("SERVICE_NAME").ok_or_else(|| {
            ControlPlaneError::ConfigError("SERVICE_NAME environment variable not set".to_string())
        })?;
        let virtual_kubeconfig = lookup("VIRTUAL_KUBECONFIG").ok_or_else(|| {
            ControlPlaneError::ConfigError(
                "VIRTUAL_KUBECONFIG environment variable not set".to_string(),
            )
        })?;

        let current_namespace = lookup("CURRENT_NAMESPACE")
            .or_else(|| {
                std::fs::read_to_string(SERVICE_ACCOUNT_NAMESPACE_FILE)
                    .ok()
                    .map(|ns| ns.trim().to_string())
            })
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| "default".to_string());
        let target_namespace =
            lookup("TARGET_NAMESPACE").unwrap_or_else(|| current_namespace.clone());

        let distribution = match lookup("DISTRIBUTION") {
            Some(value) => value.parse()?,
            None => Distribution::Vanilla,
        };

        let kubeconfig_secret = lookup("KUBECONFIG_SECRET")
            .unwrap_or_else(|| format!("{}{}", credentials::SECRET_PREFIX, service_name));
        let coredns_manifest = lookup("COREDNS_MANIFEST")
            .unwrap_or_else(|| DEFAULT_COREDNS_MANIFEST.to_string());

        Ok(Config {
            set_owner: parse_bool(&lookup, "SET_OWNER")?,
            proxy_metrics_server: parse_bool(&lookup, "PROXY_METRICS_SERVER")?,
            disable_plugins: parse_bool(&lookup, "DISABLE_PLUGINS")?,
            service_name,
            current_namespace,
            target_namespace,
            distribution,
            virtual_kubeconfig: PathBuf::from(virtual_kubeconfig),
            kubeconfig_secret,
            coredns_manifest: PathBuf::from(coredns_manifest),
        })
    }
}

fn parse_bool<F>(lookup: &F, key: &str) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(false),
        Some(value) => value.trim().parse().map_err(|_| {
            ControlPlaneError::ConfigError(format!("{} must be true or false, got '{}'", key, value))
        }),
    }
}
