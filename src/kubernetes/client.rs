// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Client creation for the virtual cluster API surface

use crate::error::{ControlPlaneError, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use std::path::Path;
use tracing::{info, instrument};

/// Create a Kubernetes client from a kubeconfig file on disk
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn create_client_from_kubeconfig_file(path: &Path) -> Result<Client> {
    info!("Loading kubeconfig from {}", path.display());

    let kubeconfig = tokio::fs::read_to_string(path).await.map_err(|e| {
        ControlPlaneError::KubeconfigError(format!(
            "Failed to read kubeconfig {}: {}",
            path.display(),
            e
        ))
    })?;

    create_client_from_kubeconfig(&kubeconfig).await
}

/// Create a Kubernetes client from a kubeconfig string
pub async fn create_client_from_kubeconfig(kubeconfig: &str) -> Result<Client> {
    let kubeconfig_parsed: Kubeconfig = serde_yaml::from_str(kubeconfig).map_err(|e| {
        ControlPlaneError::KubeconfigError(format!("Failed to parse kubeconfig: {}", e))
    })?;

    let client_config =
        kube::Config::from_custom_kubeconfig(kubeconfig_parsed, &KubeConfigOptions::default())
            .await
            .map_err(|e| {
                ControlPlaneError::KubeconfigError(format!("Failed to create config: {}", e))
            })?;

    Client::try_from(client_config).map_err(|e| {
        ControlPlaneError::KubeconfigError(format!("Failed to create client: {}", e))
    })
}
