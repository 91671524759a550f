// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Service control loop - watches Services on one side of the cluster pair.

use crate::bootstrap::{ClusterSide, ControlLoop};
use crate::error::{ControlPlaneError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Service;
use kube::{
    runtime::{controller::Action, reflector::Store, Controller},
    Api, Client, ResourceExt,
};
use kube_runtime::watcher::Config as WatcherConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct ServiceWatchLoop {
    side: ClusterSide,
    api: Api<Service>,
    store: watch::Sender<Option<Store<Service>>>,
}

struct WatchContext {
    side: ClusterSide,
}

impl ServiceWatchLoop {
    /// Watch Services in a single namespace
    pub fn namespaced(side: ClusterSide, client: Client, namespace: &str) -> Self {
        Self::with_api(side, Api::namespaced(client, namespace))
    }

    /// Watch Services across all namespaces
    pub fn all(side: ClusterSide, client: Client) -> Self {
        Self::with_api(side, Api::all(client))
    }

    fn with_api(side: ClusterSide, api: Api<Service>) -> Self {
        let (store, _) = watch::channel(None);
        Self { side, api, store }
    }

    async fn published_store(&self) -> Option<Store<Service>> {
        let mut rx = self.store.subscribe();
        let store = rx.wait_for(Option::is_some).await.ok()?.clone();
        store
    }
}

#[async_trait]
impl ControlLoop for ServiceWatchLoop {
    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let side = self.side;
        let controller = Controller::new(self.api.clone(), WatcherConfig::default());
        self.store.send_replace(Some(controller.store()));

        info!("Starting {} service control loop", side);

        let run = controller
            .run(reconcile, error_policy, Arc::new(WatchContext { side }))
            .for_each(move |res| async move {
                match res {
                    Ok(o) => debug!("Reconciled {} service: {:?}", side, o),
                    Err(e) => warn!("Reconciliation error on {} cluster: {:?}", side, e),
                }
            });

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Stopped {} service control loop", side);
                Ok(())
            }
            _ = run => Err(ControlPlaneError::ControlLoopError(format!(
                "{} service watch ended unexpectedly",
                side
            ))),
        }
    }

    async fn wait_for_cache_sync(&self, cancel: &CancellationToken) -> bool {
        let store = tokio::select! {
            _ = cancel.cancelled() => return false,
            store = self.published_store() => store,
        };
        let Some(store) = store else {
            return false;
        };

        tokio::select! {
            _ = cancel.cancelled() => false,
            ready = store.wait_until_ready() => ready.is_ok(),
        }
    }
}

async fn reconcile(service: Arc<Service>, ctx: Arc<WatchContext>) -> Result<Action> {
    debug!(
        "Observed {} service {}/{}",
        ctx.side,
        service.namespace().unwrap_or_default(),
        service.name_any()
    );
    Ok(Action::await_change())
}

fn error_policy(_service: Arc<Service>, error: &ControlPlaneError, ctx: Arc<WatchContext>) -> Action {
    error!("Reconciliation error on {} cluster: {}", ctx.side, error);
    Action::requeue(Duration::from_secs(60))
}
