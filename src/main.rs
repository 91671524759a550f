// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use async_trait::async_trait;
use kube::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vcluster_bootstrap::bootstrap::{ClusterSide, Collaborators, ControlPlane, IndexRegistrar};
use vcluster_bootstrap::config::Config;
use vcluster_bootstrap::context::ClusterContext;
use vcluster_bootstrap::credentials::{KubeconfigFile, SecretSink};
use vcluster_bootstrap::kubernetes::{
    create_client_from_kubeconfig_file, EnsureNamespace, TargetNamespace,
};
use vcluster_bootstrap::manifests::ManifestFile;
use vcluster_bootstrap::reconcilers::ServiceWatchLoop;
use vcluster_bootstrap::specialservices::SpecialServiceResolver;

/// The Service watch loops need no extra cache indices
struct NoIndices;

#[async_trait]
impl IndexRegistrar for NoIndices {
    async fn register_indices(&self, _ctx: &ClusterContext) -> vcluster_bootstrap::error::Result<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting vcluster control plane bootstrap");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "Configuration loaded: current_namespace={}, target_namespace={}, distribution={}",
        config.current_namespace, config.target_namespace, config.distribution
    );

    // Physical cluster from the in-cluster environment, virtual cluster from its kubeconfig
    let physical = Client::try_default()
        .await
        .context("Failed to connect to physical cluster")?;
    let virtual_client = create_client_from_kubeconfig_file(&config.virtual_kubeconfig)
        .await
        .context("Failed to connect to virtual cluster")?;
    info!("Connected to physical and virtual clusters");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
                cancel.cancel();
            }
        });
    }

    let ctx = ClusterContext::new(
        cancel,
        physical.clone(),
        virtual_client.clone(),
        config.current_namespace.clone(),
    );
    let resolver = SpecialServiceResolver::new(
        config.distribution,
        Arc::new(TargetNamespace::new(config.target_namespace.clone())),
        &config.service_name,
        &config.current_namespace,
    );
    let collaborators = Collaborators {
        initializers: vec![Arc::new(EnsureNamespace::new(
            config.target_namespace.clone(),
        ))],
        indices: Arc::new(NoIndices),
        physical_loop: Arc::new(ServiceWatchLoop::namespaced(
            ClusterSide::Physical,
            physical.clone(),
            &config.target_namespace,
        )),
        virtual_loop: Arc::new(ServiceWatchLoop::all(ClusterSide::Virtual, virtual_client)),
        dns_manifest: Arc::new(ManifestFile::new(config.coredns_manifest.clone())),
        credentials: Arc::new(KubeconfigFile::new(config.virtual_kubeconfig.clone())),
        credential_sink: Arc::new(SecretSink::new(physical)),
    };

    let running = ControlPlane::new(ctx, config, resolver, collaborators)
        .start_control_plane()
        .await
        .context("Control plane startup failed")?;

    let (_, dns_namespace) = running.dns_authority();
    info!(
        "Control plane is leading, DNS authority in namespace {}",
        dns_namespace
    );
    if let Some(owner) = running.owner() {
        info!("Produced objects will be owned by service {}", owner.name);
    }

    running.wait().await?;

    warn!("Control plane stopped");
    Ok(())
}
