// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Convergence of the metrics API aggregation registration.
//!
//! The registration is keyed by a fixed name, so at most one object exists for
//! the group/version. Creation and deletion are idempotent per attempt:
//! "already exists" on create and "not found" on delete count as done.

use crate::constants::metrics;
use crate::context::ClusterContext;
use crate::error::{
    is_already_exists, is_conflict, is_not_found, is_transient, ControlPlaneError, Result,
};
use crate::retry;
use k8s_openapi::kube_aggregator::pkg::apis::apiregistration::v1::{
    APIService, APIServiceSpec, ServiceReference,
};
use kube::api::{DeleteParams, ObjectMeta, PostParams};
use kube::Api;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, instrument, warn};

/// Identity and desired spec of an aggregated API group/version.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationRegistration {
    pub group: String,
    pub version: String,
    pub group_priority_minimum: i32,
    pub version_priority: i32,
    /// Backing service; `None` means the API server handles it locally
    pub service: Option<ServiceReference>,
}

impl AggregationRegistration {
    /// The `metrics.k8s.io/v1beta1` registration served by the control plane itself
    pub fn metrics() -> Self {
        Self {
            group: metrics::GROUP.to_string(),
            version: metrics::VERSION.to_string(),
            group_priority_minimum: metrics::GROUP_PRIORITY_MINIMUM,
            version_priority: metrics::VERSION_PRIORITY,
            service: None,
        }
    }

    /// Object name, `<version>.<group>`
    pub fn name(&self) -> String {
        format!("{}.{}", self.version, self.group)
    }

    fn spec(&self) -> APIServiceSpec {
        APIServiceSpec {
            group: Some(self.group.clone()),
            version: Some(self.version.clone()),
            group_priority_minimum: self.group_priority_minimum,
            version_priority: self.version_priority,
            service: self.service.clone(),
            ..Default::default()
        }
    }
}

pub struct AggregationReconciler {
    api: Api<APIService>,
    registration: AggregationRegistration,
}

impl AggregationReconciler {
    pub fn new(ctx: &ClusterContext, registration: AggregationRegistration) -> Self {
        Self {
            api: Api::all(ctx.virtual_client.clone()),
            registration,
        }
    }

    pub fn metrics(ctx: &ClusterContext) -> Self {
        Self::new(ctx, AggregationRegistration::metrics())
    }

    /// Converge the registration to `desired_registered`.
    ///
    /// Transient API failures are retried under the context's backoff policy;
    /// only terminal failures and cancellation are returned.
    #[instrument(skip(self, ctx), fields(apiservice = %self.registration.name()))]
    pub async fn reconcile(&self, ctx: &ClusterContext, desired_registered: bool) -> Result<()> {
        if desired_registered {
            retry::run(&ctx.cancel, &ctx.policy, || self.create_or_update()).await?;
            info!("APIService registered");
            return Ok(());
        }

        if !self.exists(ctx).await? {
            debug!("APIService absent, nothing to do");
            return Ok(());
        }

        retry::run(&ctx.cancel, &ctx.policy, || self.delete()).await?;
        info!("APIService deregistered");
        Ok(())
    }

    async fn exists(&self, ctx: &ClusterContext) -> Result<bool> {
        let name = self.registration.name();
        let found = AtomicBool::new(false);
        let (api, name, found_ref) = (&self.api, name.as_str(), &found);

        retry::run(&ctx.cancel, &ctx.policy, move || async move {
            match api.get(name).await {
                Ok(_) => {
                    found_ref.store(true, Ordering::SeqCst);
                    Ok(true)
                }
                Err(e) if is_not_found(&e) => Ok(true),
                Err(e) if is_transient(&e) => {
                    warn!("Error probing APIService, retrying: {}", e);
                    Ok(false)
                }
                Err(e) => Err(ControlPlaneError::from(e)),
            }
        })
        .await?;

        Ok(found.load(Ordering::SeqCst))
    }

    async fn create_or_update(&self) -> Result<bool> {
        let name = self.registration.name();
        let desired = self.registration.spec();

        let result = match self.api.get(&name).await {
            Ok(existing) if existing.spec.as_ref() == Some(&desired) => {
                debug!("APIService already up to date");
                return Ok(true);
            }
            Ok(mut existing) => {
                existing.spec = Some(desired);
                self.api
                    .replace(&name, &PostParams::default(), &existing)
                    .await
            }
            Err(e) if is_not_found(&e) => {
                let api_service = APIService {
                    metadata: ObjectMeta {
                        name: Some(name.clone()),
                        ..Default::default()
                    },
                    spec: Some(desired),
                    status: None,
                };
                self.api.create(&PostParams::default(), &api_service).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_already_exists(&e) => Ok(true),
            Err(e) if is_conflict(&e) || is_not_found(&e) => {
                debug!("APIService changed underneath us, retrying: {}", e);
                Ok(false)
            }
            Err(e) if is_transient(&e) => {
                warn!("Error applying APIService, retrying: {}", e);
                Ok(false)
            }
            Err(e) => {
                error!("Error creating APIService: {}", e);
                Err(e.into())
            }
        }
    }

    async fn delete(&self) -> Result<bool> {
        match self
            .api
            .delete(&self.registration.name(), &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(true),
            Err(e) if is_transient(&e) => {
                warn!("Error deleting APIService, retrying: {}", e);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
