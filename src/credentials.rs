// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Periodic persistence of the virtual cluster's access credentials.

use crate::constants::{credentials, labels, OPERATOR_NAME};
use crate::error::{ControlPlaneError, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::{
    api::{ObjectMeta, Patch, PatchParams},
    Api, Client,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

/// Key/value payload granting access to the virtual cluster
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialBundle {
    pub data: BTreeMap<String, Vec<u8>>,
}

#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn current(&self) -> Result<CredentialBundle>;
}

#[async_trait]
pub trait CredentialSink: Send + Sync {
    async fn write(&self, namespace: &str, identity: &str, payload: &CredentialBundle) -> Result<()>;
}

/// The virtual cluster's kubeconfig, read fresh from disk on every cycle
pub struct KubeconfigFile {
    path: PathBuf,
}

impl KubeconfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialSource for KubeconfigFile {
    async fn current(&self) -> Result<CredentialBundle> {
        let kubeconfig = tokio::fs::read(&self.path).await.map_err(|e| {
            ControlPlaneError::CredentialError(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(CredentialBundle {
            data: BTreeMap::from([(credentials::KUBECONFIG_KEY.to_string(), kubeconfig)]),
        })
    }
}

/// Writes the bundle into an Opaque Secret using server-side apply
pub struct SecretSink {
    client: Client,
}

impl SecretSink {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CredentialSink for SecretSink {
    #[instrument(skip(self, payload))]
    async fn write(&self, namespace: &str, identity: &str, payload: &CredentialBundle) -> Result<()> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = build_secret(namespace, identity, payload);

        secrets
            .patch(
                identity,
                &PatchParams::apply(OPERATOR_NAME).force(),
                &Patch::Apply(&secret),
            )
            .await?;

        debug!("Persisted credential bundle");
        Ok(())
    }
}

fn build_secret(namespace: &str, identity: &str, payload: &CredentialBundle) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(identity.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                labels::MANAGED_BY.to_string(),
                OPERATOR_NAME.to_string(),
            )])),
            ..Default::default()
        },
        data: Some(
            payload
                .data
                .iter()
                .map(|(k, v)| (k.clone(), ByteString(v.clone())))
                .collect(),
        ),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

/// Read the current bundle and hand it to the sink
pub async fn persist_once(
    source: &dyn CredentialSource,
    sink: &dyn CredentialSink,
    namespace: &str,
    identity: &str,
) -> Result<()> {
    let bundle = source.current().await?;
    sink.write(namespace, identity, &bundle).await
}

/// Persist the bundle every `period` until `cancel` fires. The first write
/// happens immediately; failed cycles are logged and never stop the loop.
pub async fn persist_periodically(
    cancel: CancellationToken,
    source: Arc<dyn CredentialSource>,
    sink: Arc<dyn CredentialSink>,
    namespace: String,
    identity: String,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Credential persistence stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        if let Err(e) = persist_once(source.as_ref(), sink.as_ref(), &namespace, &identity).await {
            error!("Error writing kube config to secret {}/{}: {}", namespace, identity, e);
        }
    }
}
