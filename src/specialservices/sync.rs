// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Mirroring of one special service from the virtual onto the physical cluster.

use super::SpecialServiceBinding;
use crate::constants::{labels, CONFLICT_RETRY_PAUSE_SECS, OPERATOR_NAME};
use crate::context::ClusterContext;
use crate::error::{is_not_found, ControlPlaneError, Result, RetryAbort};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{ObjectMeta, PostParams};
use kube::Api;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Sync the physical service of `binding` from its virtual counterpart.
///
/// A write that loses an optimistic-concurrency race (including a create
/// racing another creator) restarts the whole operation after a fixed pause,
/// without an attempt cap. Every other error is returned.
#[instrument(
    skip(ctx, binding),
    fields(
        virtual_service = %binding.virtual_service,
        physical_service = %binding.physical_service
    )
)]
pub async fn sync_special_service(
    ctx: &ClusterContext,
    binding: &SpecialServiceBinding,
) -> Result<()> {
    let pause = Duration::from_secs(CONFLICT_RETRY_PAUSE_SECS);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match sync_once(ctx, binding).await {
            Err(e) if e.is_conflict() || e.is_already_exists() => {
                warn!(attempt, "Conflict syncing special service, retrying: {}", e);
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return Err(RetryAbort::Cancelled.into()),
                    _ = tokio::time::sleep(pause) => {}
                }
            }
            result => return result,
        }
    }
}

async fn sync_once(ctx: &ClusterContext, binding: &SpecialServiceBinding) -> Result<()> {
    let virtual_services: Api<Service> = Api::namespaced(
        ctx.virtual_client.clone(),
        &binding.virtual_service.namespace,
    );
    let source = virtual_services
        .get(&binding.virtual_service.name)
        .await
        .map_err(|e| {
            if is_not_found(&e) {
                ControlPlaneError::SpecialServiceError(format!(
                    "virtual service {} not found",
                    binding.virtual_service
                ))
            } else {
                e.into()
            }
        })?;

    let source_ports = source
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_deref())
        .unwrap_or_default();
    let desired_ports = (binding.translate_ports)(source_ports);

    let physical_services: Api<Service> = Api::namespaced(
        ctx.physical.clone(),
        &binding.physical_service.namespace,
    );

    match physical_services.get(&binding.physical_service.name).await {
        Ok(mut existing) => {
            let current_ports = existing
                .spec
                .as_ref()
                .and_then(|s| s.ports.as_deref())
                .unwrap_or_default();
            if ports_in_sync(current_ports, &desired_ports) {
                debug!("Physical service already in sync");
                return Ok(());
            }

            existing.spec.get_or_insert_with(Default::default).ports = Some(desired_ports);
            physical_services
                .replace(
                    &binding.physical_service.name,
                    &PostParams::default(),
                    &existing,
                )
                .await?;
            info!("Updated physical service ports");
        }
        Err(e) if is_not_found(&e) => {
            let service = create_physical_service(binding, desired_ports);
            physical_services
                .create(&PostParams::default(), &service)
                .await?;
            info!("Created physical service");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

/// Compare only what the translation decides. Protocol and target port fall
/// back to the API server defaults; node ports are allocated per cluster.
fn ports_in_sync(current: &[ServicePort], desired: &[ServicePort]) -> bool {
    fn protocol(port: &ServicePort) -> &str {
        port.protocol.as_deref().unwrap_or("TCP")
    }
    fn target_port(port: &ServicePort) -> IntOrString {
        port.target_port.clone().unwrap_or(IntOrString::Int(port.port))
    }

    current.len() == desired.len()
        && current.iter().zip(desired).all(|(c, d)| {
            c.name == d.name
                && c.port == d.port
                && protocol(c) == protocol(d)
                && target_port(c) == target_port(d)
                && c.app_protocol == d.app_protocol
        })
}

fn create_physical_service(
    binding: &SpecialServiceBinding,
    ports: Vec<ServicePort>,
) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(binding.physical_service.name.clone()),
            namespace: Some(binding.physical_service.namespace.clone()),
            labels: Some(BTreeMap::from([(
                labels::MANAGED_BY.to_string(),
                OPERATOR_NAME.to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(ports),
            ..Default::default()
        }),
        status: None,
    }
}
