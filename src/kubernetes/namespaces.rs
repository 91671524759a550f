// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Namespace management utilities

use crate::bootstrap::Initializer;
use crate::constants::{labels, OPERATOR_NAME};
use crate::context::ClusterContext;
use crate::error::{is_already_exists, is_not_found, ControlPlaneError, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    api::{ObjectMeta, PostParams},
    Api, Client,
};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Ensure a namespace exists in the cluster, create if it doesn't
#[instrument(skip(client))]
pub async fn ensure_namespace_exists(client: &Client, namespace: &str) -> Result<()> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    match namespaces.get(namespace).await {
        Ok(_) => {
            debug!("Namespace {} already exists", namespace);
            Ok(())
        }
        Err(e) if is_not_found(&e) => {
            info!("Creating namespace {}", namespace);
            let ns = Namespace {
                metadata: ObjectMeta {
                    name: Some(namespace.to_string()),
                    labels: Some(BTreeMap::from([(
                        labels::MANAGED_BY.to_string(),
                        OPERATOR_NAME.to_string(),
                    )])),
                    ..Default::default()
                },
                ..Default::default()
            };
            match namespaces.create(&PostParams::default(), &ns).await {
                Ok(_) => {
                    info!("Namespace {} created successfully", namespace);
                    Ok(())
                }
                Err(e) if is_already_exists(&e) => {
                    debug!("Namespace {} was created concurrently", namespace);
                    Ok(())
                }
                Err(e) => Err(ControlPlaneError::NamespaceError(format!(
                    "Failed to create namespace {}: {}",
                    namespace, e
                ))),
            }
        }
        Err(e) => Err(ControlPlaneError::NamespaceError(format!(
            "Failed to check namespace {}: {}",
            namespace, e
        ))),
    }
}

/// Initializer making sure the physical target namespace exists before the
/// control loops start watching it.
pub struct EnsureNamespace {
    namespace: String,
}

impl EnsureNamespace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl Initializer for EnsureNamespace {
    fn name(&self) -> &str {
        "ensure-target-namespace"
    }

    async fn initialize(&self, ctx: &ClusterContext) -> Result<()> {
        ensure_namespace_exists(&ctx.physical, &self.namespace).await
    }
}
