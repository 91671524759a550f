// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! DNS add-on manifest application to the virtual cluster.

use crate::constants::{dns, OPERATOR_NAME};
use crate::context::ClusterContext;
use crate::error::{ControlPlaneError, Result};
use async_trait::async_trait;
use kube::{
    api::{DynamicObject, Patch, PatchParams},
    core::GroupVersionKind,
    discovery::{pinned_kind, Scope},
    Api, ResourceExt,
};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, info, instrument};

/// Applies the cluster's DNS add-on manifest.
///
/// Returns `ControlPlaneError::NoManifests` when there is nothing to apply.
#[async_trait]
pub trait ManifestApplier: Send + Sync {
    async fn apply(&self, ctx: &ClusterContext) -> Result<()>;
}

/// Multi-document YAML manifest read from disk and server-side applied to
/// the virtual cluster.
pub struct ManifestFile {
    path: PathBuf,
}

impl ManifestFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Vec<DynamicObject>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ControlPlaneError::NoManifests)
            }
            Err(e) => {
                return Err(ControlPlaneError::ManifestError(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let objects = parse_manifests(&content)?;
        if objects.is_empty() {
            return Err(ControlPlaneError::NoManifests);
        }
        Ok(objects)
    }
}

#[async_trait]
impl ManifestApplier for ManifestFile {
    #[instrument(skip_all, fields(path = %self.path.display()))]
    async fn apply(&self, ctx: &ClusterContext) -> Result<()> {
        let objects = self.load().await?;
        debug!("Applying {} manifest objects", objects.len());

        for object in &objects {
            apply_object(ctx, object).await?;
        }

        info!("Applied {} manifest objects", objects.len());
        Ok(())
    }
}

/// Split a multi-document YAML string into objects, skipping empty documents
pub fn parse_manifests(content: &str) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();

    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| ControlPlaneError::ManifestError(format!("Invalid YAML: {}", e)))?;
        if value.is_null() {
            continue;
        }

        let object: DynamicObject = serde_yaml::from_value(value)
            .map_err(|e| ControlPlaneError::ManifestError(format!("Invalid object: {}", e)))?;
        objects.push(object);
    }

    Ok(objects)
}

fn group_version_kind(object: &DynamicObject) -> Result<GroupVersionKind> {
    let types = object.types.as_ref().ok_or_else(|| {
        ControlPlaneError::ManifestError(format!(
            "Object {} is missing apiVersion/kind",
            object.name_any()
        ))
    })?;

    let (group, version) = types
        .api_version
        .split_once('/')
        .unwrap_or(("", types.api_version.as_str()));
    Ok(GroupVersionKind::gvk(group, version, &types.kind))
}

async fn apply_object(ctx: &ClusterContext, object: &DynamicObject) -> Result<()> {
    let gvk = group_version_kind(object)?;
    let name = object.name_any();
    let (resource, capabilities) = pinned_kind(&ctx.virtual_client, &gvk).await?;

    let api: Api<DynamicObject> = match capabilities.scope {
        Scope::Namespaced => {
            let namespace = object
                .namespace()
                .unwrap_or_else(|| dns::SERVICE_NAMESPACE.to_string());
            Api::namespaced_with(ctx.virtual_client.clone(), &namespace, &resource)
        }
        Scope::Cluster => Api::all_with(ctx.virtual_client.clone(), &resource),
    };

    api.patch(
        &name,
        &PatchParams::apply(OPERATOR_NAME).force(),
        &Patch::Apply(object),
    )
    .await
    .map_err(|e| {
        ControlPlaneError::ManifestError(format!("Failed to apply {}/{}: {}", gvk.kind, name, e))
    })?;

    debug!("Applied {} {}", gvk.kind, name);
    Ok(())
}
