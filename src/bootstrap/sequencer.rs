// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The startup sequence and the supervised background tasks it leaves behind.

use super::{BootstrapPhase, ClusterSide, ControlLoop, IndexRegistrar, Initializer};
use crate::aggregation::AggregationReconciler;
use crate::config::Config;
use crate::constants;
use crate::context::ClusterContext;
use crate::credentials::{persist_periodically, CredentialSink, CredentialSource};
use crate::error::{ControlPlaneError, Result, RetryAbort};
use crate::leadership::LeadershipFlag;
use crate::manifests::ManifestApplier;
use crate::retry;
use crate::specialservices::{sync_special_service, SpecialServiceResolver};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Api, Client, ResourceExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// External pieces the startup sequence drives
pub struct Collaborators {
    /// Run in order, exactly once
    pub initializers: Vec<Arc<dyn Initializer>>,
    pub indices: Arc<dyn IndexRegistrar>,
    pub physical_loop: Arc<dyn ControlLoop>,
    pub virtual_loop: Arc<dyn ControlLoop>,
    pub dns_manifest: Arc<dyn ManifestApplier>,
    pub credentials: Arc<dyn CredentialSource>,
    pub credential_sink: Arc<dyn CredentialSink>,
}

pub struct ControlPlane {
    ctx: ClusterContext,
    config: Config,
    resolver: SpecialServiceResolver,
    collaborators: Collaborators,
    leadership: LeadershipFlag,
    phase: watch::Sender<BootstrapPhase>,
}

impl ControlPlane {
    pub fn new(
        ctx: ClusterContext,
        config: Config,
        resolver: SpecialServiceResolver,
        collaborators: Collaborators,
    ) -> Self {
        let (phase, _) = watch::channel(BootstrapPhase::Initializing);
        Self {
            ctx,
            config,
            resolver,
            collaborators,
            leadership: LeadershipFlag::new(),
            phase,
        }
    }

    /// Read handle on the flag set once the sequence reaches `Leading`
    pub fn leadership(&self) -> LeadershipFlag {
        self.leadership.clone()
    }

    pub fn phases(&self) -> watch::Receiver<BootstrapPhase> {
        self.phase.subscribe()
    }

    /// Run the startup sequence.
    ///
    /// Returns once `Leading` is reached, leaving the control loops and the
    /// best-effort tasks running under the returned handle, or with the first
    /// fatal error after stopping everything it started.
    pub async fn start_control_plane(self) -> Result<RunningControlPlane> {
        let ctx = self.ctx.child();
        let mut supervisor = Supervisor::new(ctx.cancel.clone());

        match self.bootstrap(&ctx, &mut supervisor).await {
            Ok(owner) => Ok(RunningControlPlane {
                ctx,
                resolver: self.resolver,
                supervisor,
                leadership: self.leadership,
                owner,
                phase: self.phase.subscribe(),
            }),
            Err(e) => {
                error!("Control plane startup failed: {}", e);
                supervisor.shutdown().await;
                Err(e)
            }
        }
    }

    async fn bootstrap(
        &self,
        ctx: &ClusterContext,
        supervisor: &mut Supervisor,
    ) -> Result<Option<OwnerReference>> {
        self.enter(BootstrapPhase::Initializing);
        self.run_initializers(ctx).await?;

        self.enter(BootstrapPhase::StartingLoops);
        supervisor.spawn_loop(ClusterSide::Physical, self.collaborators.physical_loop.clone());
        supervisor.spawn_loop(ClusterSide::Virtual, self.collaborators.virtual_loop.clone());

        self.enter(BootstrapPhase::AwaitingCacheSync);
        self.await_cache_sync(ctx, supervisor).await?;

        self.enter(BootstrapPhase::SyncingSpecialServices);
        supervisor.spawn(apply_dns_manifest(
            ctx.clone(),
            self.collaborators.dns_manifest.clone(),
        ));
        supervisor.spawn(reconcile_aggregation(
            ctx.clone(),
            self.config.proxy_metrics_server,
        ));

        // A loop dying past the barrier aborts startup just the same.
        let owner = tokio::select! {
            Some(err) = supervisor.fatal_rx.recv() => return Err(err),
            owner = self.sync_and_discover_owner(ctx) => owner?,
        };
        if let Ok(err) = supervisor.fatal_rx.try_recv() {
            return Err(err);
        }

        supervisor.spawn(persist_periodically(
            ctx.cancel.clone(),
            self.collaborators.credentials.clone(),
            self.collaborators.credential_sink.clone(),
            ctx.current_namespace.clone(),
            self.config.kubeconfig_secret.clone(),
            Duration::from_secs(constants::credentials::PERSIST_INTERVAL_SECS),
        ));
        if self.config.disable_plugins {
            debug!("Plugins disabled, leaving leadership flag unset");
        } else {
            self.leadership.set();
        }
        self.enter(BootstrapPhase::Leading);

        Ok(owner)
    }

    async fn sync_and_discover_owner(&self, ctx: &ClusterContext) -> Result<Option<OwnerReference>> {
        for binding in self.resolver.bindings() {
            if let Err(e) = sync_special_service(ctx, binding).await {
                error!(
                    "Error syncing special service {}: {}",
                    binding.virtual_service, e
                );
                return Err(e);
            }
        }

        // Aggregation converges in the background; nothing to wait for here.
        self.enter(BootstrapPhase::ReconcilingAggregation);

        self.enter(BootstrapPhase::DiscoveringOwner);
        self.discover_owner(ctx).await
    }

    fn enter(&self, phase: BootstrapPhase) {
        self.phase.send_replace(phase);
        info!(?phase, "Entering bootstrap phase");
    }

    async fn run_initializers(&self, ctx: &ClusterContext) -> Result<()> {
        for initializer in &self.collaborators.initializers {
            initializer.initialize(ctx).await.map_err(|e| {
                ControlPlaneError::InitializerError(format!("{}: {}", initializer.name(), e))
            })?;
            debug!("Initializer {} done", initializer.name());
        }

        self.collaborators
            .indices
            .register_indices(ctx)
            .await
            .map_err(|e| ControlPlaneError::IndexError(e.to_string()))
    }

    async fn await_cache_sync(&self, ctx: &ClusterContext, supervisor: &mut Supervisor) -> Result<()> {
        let physical = self.collaborators.physical_loop.clone();
        let virtual_loop = self.collaborators.virtual_loop.clone();
        let caches = futures::future::join(
            physical.wait_for_cache_sync(&ctx.cancel),
            virtual_loop.wait_for_cache_sync(&ctx.cancel),
        );

        let (physical_synced, virtual_synced) = tokio::select! {
            Some(err) = supervisor.fatal_rx.recv() => return Err(err),
            synced = caches => synced,
        };

        if ctx.cancel.is_cancelled() {
            return Err(RetryAbort::Cancelled.into());
        }
        for (side, synced) in [
            (ClusterSide::Physical, physical_synced),
            (ClusterSide::Virtual, virtual_synced),
        ] {
            if !synced {
                return Err(ControlPlaneError::CacheSyncError(format!(
                    "{} cluster cache did not sync",
                    side
                )));
            }
        }

        info!("Control loop caches synced");
        Ok(())
    }

    #[instrument(skip(self, ctx), fields(service = %self.config.service_name))]
    async fn discover_owner(&self, ctx: &ClusterContext) -> Result<Option<OwnerReference>> {
        if !self.config.set_owner {
            return Ok(None);
        }
        if ctx.current_namespace != self.config.target_namespace {
            warn!(
                "Owner references requested, but control plane runs in {} instead of target namespace {}; skipping",
                ctx.current_namespace, self.config.target_namespace
            );
            return Ok(None);
        }

        let services: Api<Service> = Api::namespaced(ctx.physical.clone(), &ctx.current_namespace);
        let service = services.get(&self.config.service_name).await.map_err(|e| {
            ControlPlaneError::OwnerError(format!(
                "Failed to get service {}/{}: {}",
                ctx.current_namespace, self.config.service_name, e
            ))
        })?;
        let uid = service.metadata.uid.clone().ok_or_else(|| {
            ControlPlaneError::OwnerError(format!(
                "Service {}/{} has no uid",
                ctx.current_namespace, self.config.service_name
            ))
        })?;

        info!("Recording service {} as owner", service.name_any());
        Ok(Some(OwnerReference {
            api_version: "v1".to_string(),
            kind: "Service".to_string(),
            name: service.name_any(),
            uid,
            ..Default::default()
        }))
    }
}

/// Keeps applying the DNS add-on manifest until it lands. A missing manifest
/// counts as done.
async fn apply_dns_manifest(ctx: ClusterContext, manifest: Arc<dyn ManifestApplier>) {
    let (ctx_ref, manifest_ref) = (&ctx, manifest.as_ref());

    let result = retry::run::<_, _, ControlPlaneError>(&ctx.cancel, &ctx.policy, move || async move {
        match manifest_ref.apply(ctx_ref).await {
            Ok(()) => Ok(true),
            Err(ControlPlaneError::NoManifests) => {
                debug!("No DNS add-on manifest to apply");
                Ok(true)
            }
            Err(e) => {
                info!("Error applying DNS add-on manifest, retrying: {}", e);
                Ok(false)
            }
        }
    })
    .await;

    match result {
        Ok(()) => debug!("DNS add-on manifest task done"),
        Err(e) if e.is_cancelled() => debug!("DNS add-on manifest task cancelled"),
        Err(e) => warn!("DNS add-on manifest task stopped: {}", e),
    }
}

async fn reconcile_aggregation(ctx: ClusterContext, desired_registered: bool) {
    let reconciler = AggregationReconciler::metrics(&ctx);

    match reconciler.reconcile(&ctx, desired_registered).await {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => debug!("Metrics APIService reconciliation cancelled"),
        Err(e) => error!("Error reconciling metrics APIService: {}", e),
    }
}

/// Tasks started during bootstrap, all bound to one cancellation scope.
struct Supervisor {
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    fatal_tx: mpsc::UnboundedSender<ControlPlaneError>,
    fatal_rx: mpsc::UnboundedReceiver<ControlPlaneError>,
}

impl Supervisor {
    fn new(cancel: CancellationToken) -> Self {
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        Self {
            cancel,
            tasks: JoinSet::new(),
            fatal_tx,
            fatal_rx,
        }
    }

    fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    /// A control loop returning while the scope is live is reported as fatal.
    fn spawn_loop(&mut self, side: ClusterSide, control_loop: Arc<dyn ControlLoop>) {
        let cancel = self.cancel.clone();
        let fatal = self.fatal_tx.clone();

        self.tasks.spawn(async move {
            let result = control_loop.start(cancel.clone()).await;
            if cancel.is_cancelled() {
                debug!("{} control loop stopped", side);
                return;
            }

            let err = match result {
                Ok(()) => ControlPlaneError::ControlLoopError(format!(
                    "{} control loop stopped unexpectedly",
                    side
                )),
                Err(e) => ControlPlaneError::ControlLoopError(format!(
                    "{} control loop failed: {}",
                    side, e
                )),
            };
            error!("{}", err);
            let _ = fatal.send(err);
        });
    }

    async fn shutdown(&mut self) {
        self.cancel.cancel();
        while let Some(res) = self.tasks.join_next().await {
            if let Err(e) = res {
                if e.is_panic() {
                    error!("Supervised task panicked: {}", e);
                }
            }
        }
    }
}

/// A control plane that reached `Leading`.
pub struct RunningControlPlane {
    ctx: ClusterContext,
    resolver: SpecialServiceResolver,
    supervisor: Supervisor,
    leadership: LeadershipFlag,
    owner: Option<OwnerReference>,
    phase: watch::Receiver<BootstrapPhase>,
}

impl RunningControlPlane {
    pub fn leadership(&self) -> &LeadershipFlag {
        &self.leadership
    }

    /// Owner reference source for produced objects, when owner-setting applies
    pub fn owner(&self) -> Option<&OwnerReference> {
        self.owner.as_ref()
    }

    pub fn phase(&self) -> BootstrapPhase {
        *self.phase.borrow()
    }

    /// Client and namespace consulted for DNS service resolution
    pub fn dns_authority(&self) -> (Client, String) {
        self.resolver.dns_authority(&self.ctx)
    }

    /// Block until the scope is cancelled or a control loop dies, then stop
    /// and join every supervised task.
    pub async fn wait(mut self) -> Result<()> {
        let result = tokio::select! {
            Some(err) = self.supervisor.fatal_rx.recv() => Err(err),
            _ = self.ctx.cancel.cancelled() => Ok(()),
        };

        self.supervisor.shutdown().await;
        result
    }

    pub async fn shutdown(mut self) {
        self.supervisor.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialBundle;
    use crate::kubernetes::TargetNamespace;
    use crate::retry::BackoffPolicy;
    use crate::specialservices::Distribution;
    use crate::test_utils::{conflict_json, service_json, service_path, services_path, MockService};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeLoop {
        fail_start: bool,
        never_syncs: bool,
        stop: CancellationToken,
        starts: AtomicU32,
    }

    #[async_trait]
    impl ControlLoop for FakeLoop {
        async fn start(&self, cancel: CancellationToken) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(ControlPlaneError::ControlLoopError("watch refused".to_string()));
            }
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = self.stop.cancelled() => {}
            }
            Ok(())
        }

        async fn wait_for_cache_sync(&self, cancel: &CancellationToken) -> bool {
            if self.never_syncs {
                cancel.cancelled().await;
                return false;
            }
            true
        }
    }

    struct RecordingInitializer {
        name: String,
        fail: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Initializer for RecordingInitializer {
        fn name(&self) -> &str {
            &self.name
        }

        async fn initialize(&self, _ctx: &ClusterContext) -> Result<()> {
            self.log.lock().unwrap().push(self.name.clone());
            if self.fail {
                return Err(ControlPlaneError::NamespaceError("forbidden".to_string()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingIndices {
        calls: AtomicU32,
    }

    #[async_trait]
    impl IndexRegistrar for CountingIndices {
        async fn register_indices(&self, _ctx: &ClusterContext) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct BrokenManifest {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl ManifestApplier for BrokenManifest {
        async fn apply(&self, _ctx: &ClusterContext) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(ControlPlaneError::ManifestError("coredns rejected".to_string()))
        }
    }

    struct StaticSource;

    #[async_trait]
    impl CredentialSource for StaticSource {
        async fn current(&self) -> Result<CredentialBundle> {
            Ok(CredentialBundle {
                data: BTreeMap::from([("config".to_string(), b"kubeconfig".to_vec())]),
            })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        writes: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl CredentialSink for RecordingSink {
        async fn write(&self, namespace: &str, identity: &str, _: &CredentialBundle) -> Result<()> {
            self.writes
                .lock()
                .unwrap()
                .push((namespace.to_string(), identity.to_string()));
            Ok(())
        }
    }

    struct Harness {
        cancel: CancellationToken,
        physical: MockService,
        virtual_mock: MockService,
        physical_loop: Arc<FakeLoop>,
        virtual_loop: Arc<FakeLoop>,
        indices: Arc<CountingIndices>,
        manifest: Arc<BrokenManifest>,
        sink: Arc<RecordingSink>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Harness {
        /// Control plane in `team-a`, workloads synced into `target`
        fn new(target: &str) -> Self {
            let ports = [("dns", 53), ("dns-tcp", 53)];
            Self {
                cancel: CancellationToken::new(),
                physical: MockService::new()
                    .on_get(
                        &service_path(target, "kube-dns"),
                        200,
                        &service_json(target, "kube-dns", "p-dns", &ports),
                    )
                    .on_get(
                        &service_path("team-a", "my-vcluster"),
                        200,
                        &service_json("team-a", "my-vcluster", "owner-uid", &[("https", 443)]),
                    ),
                virtual_mock: MockService::new().on_get(
                    &service_path("kube-system", "kube-dns"),
                    200,
                    &service_json("kube-system", "kube-dns", "v-dns", &ports),
                ),
                physical_loop: Arc::new(FakeLoop::default()),
                virtual_loop: Arc::new(FakeLoop::default()),
                indices: Arc::new(CountingIndices::default()),
                manifest: Arc::new(BrokenManifest::default()),
                sink: Arc::new(RecordingSink::default()),
                log: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn initializer(&self, name: &str, fail: bool) -> Arc<dyn Initializer> {
            Arc::new(RecordingInitializer {
                name: name.to_string(),
                fail,
                log: self.log.clone(),
            })
        }

        fn config(&self, target: &str, set_owner: bool) -> Config {
            Config {
                service_name: "my-vcluster".to_string(),
                current_namespace: "team-a".to_string(),
                target_namespace: target.to_string(),
                set_owner,
                proxy_metrics_server: false,
                disable_plugins: false,
                distribution: Distribution::Vanilla,
                virtual_kubeconfig: PathBuf::from("/data/kubeconfig.yaml"),
                kubeconfig_secret: "vc-my-vcluster".to_string(),
                coredns_manifest: PathBuf::from("/manifests/coredns/coredns.yaml"),
            }
        }

        fn control_plane(
            &self,
            target: &str,
            set_owner: bool,
            initializers: Vec<Arc<dyn Initializer>>,
        ) -> ControlPlane {
            self.control_plane_with(self.config(target, set_owner), initializers)
        }

        fn control_plane_with(
            &self,
            config: Config,
            initializers: Vec<Arc<dyn Initializer>>,
        ) -> ControlPlane {
            let ctx = ClusterContext::new(
                self.cancel.clone(),
                self.physical.client(),
                self.virtual_mock.client(),
                "team-a",
            )
            .with_policy(BackoffPolicy {
                initial_delay: Duration::from_millis(1),
                factor: 2.0,
                max_delay: Duration::from_millis(10),
                max_attempts: None,
            });
            let resolver = SpecialServiceResolver::new(
                config.distribution,
                Arc::new(TargetNamespace::new(config.target_namespace.clone())),
                &config.service_name,
                &config.current_namespace,
            );

            ControlPlane::new(
                ctx,
                config,
                resolver,
                Collaborators {
                    initializers,
                    indices: self.indices.clone(),
                    physical_loop: self.physical_loop.clone(),
                    virtual_loop: self.virtual_loop.clone(),
                    dns_manifest: self.manifest.clone(),
                    credentials: Arc::new(StaticSource),
                    credential_sink: self.sink.clone(),
                },
            )
        }
    }

    async fn startup_error(plane: ControlPlane) -> ControlPlaneError {
        match plane.start_control_plane().await {
            Ok(_) => panic!("startup reached Leading"),
            Err(e) => e,
        }
    }

    /// Poll `condition` until it holds or roughly a second passes
    async fn eventually(condition: impl Fn() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn test_reaches_leading_while_dns_manifest_keeps_failing() {
        let harness = Harness::new("team-a");
        let plane = harness.control_plane("team-a", false, vec![]);
        let flag = plane.leadership();
        assert!(!flag.is_leader());

        let running = plane.start_control_plane().await.unwrap();

        assert!(flag.is_leader());
        assert_eq!(running.phase(), BootstrapPhase::Leading);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(harness.manifest.attempts.load(Ordering::SeqCst) >= 2);
        assert_eq!(
            harness.sink.writes.lock().unwrap().first(),
            Some(&("team-a".to_string(), "vc-my-vcluster".to_string()))
        );

        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_failing_physical_loop_start_is_fatal() {
        let mut harness = Harness::new("team-a");
        harness.physical_loop = Arc::new(FakeLoop {
            fail_start: true,
            never_syncs: true,
            ..Default::default()
        });
        let plane = harness.control_plane("team-a", false, vec![]);
        let flag = plane.leadership();
        let phases = plane.phases();

        let err = startup_error(plane).await;

        assert!(matches!(err, ControlPlaneError::ControlLoopError(_)));
        assert!(!flag.is_leader());
        assert_eq!(*phases.borrow(), BootstrapPhase::AwaitingCacheSync);
        assert_eq!(harness.physical.count_method("GET"), 0);
        assert_eq!(harness.sink.writes.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_failing_virtual_loop_start_is_fatal() {
        let mut harness = Harness::new("team-a");
        harness.virtual_loop = Arc::new(FakeLoop {
            fail_start: true,
            never_syncs: true,
            ..Default::default()
        });
        let plane = harness.control_plane("team-a", false, vec![]);
        let flag = plane.leadership();

        let err = startup_error(plane).await;

        assert!(matches!(err, ControlPlaneError::ControlLoopError(_)));
        assert!(!flag.is_leader());
        assert_eq!(harness.virtual_mock.count_method("GET"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_dying_during_special_service_sync_is_fatal() {
        let mut harness = Harness::new("team-a");
        let dns_path = service_path("team-a", "kube-dns");
        harness.physical = MockService::new()
            .on_get(
                &dns_path,
                200,
                &service_json("team-a", "kube-dns", "p-dns", &[("dns", 5353)]),
            )
            .on_put(&dns_path, 409, &conflict_json("services", "kube-dns"))
            .on_put(
                &dns_path,
                200,
                &service_json("team-a", "kube-dns", "p-dns", &[("dns", 53), ("dns-tcp", 53)]),
            );
        let plane = harness.control_plane("team-a", false, vec![]);
        let flag = plane.leadership();

        let stop = harness.virtual_loop.stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stop.cancel();
        });

        let err = startup_error(plane).await;

        assert!(matches!(err, ControlPlaneError::ControlLoopError(_)));
        assert!(!flag.is_leader());
        assert_eq!(harness.physical.count("PUT", &dns_path), 1);
        assert_eq!(harness.sink.writes.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_registers_metrics_apiservice_when_requested() {
        const APISERVICES: &str = "/apis/apiregistration.k8s.io/v1/apiservices";
        let mut harness = Harness::new("team-a");
        let api_service = serde_json::json!({
            "apiVersion": "apiregistration.k8s.io/v1",
            "kind": "APIService",
            "metadata": { "name": constants::metrics::API_SERVICE },
            "spec": {
                "group": "metrics.k8s.io",
                "version": "v1beta1",
                "groupPriorityMinimum": 100,
                "versionPriority": 100
            }
        })
        .to_string();
        harness.virtual_mock = harness
            .virtual_mock
            .clone()
            .on_post(APISERVICES, 201, &api_service);
        let mut config = harness.config("team-a", false);
        config.proxy_metrics_server = true;

        let running = harness
            .control_plane_with(config, vec![])
            .start_control_plane()
            .await
            .unwrap();

        assert!(eventually(|| harness.virtual_mock.count("POST", APISERVICES) == 1).await);

        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_distro_syncs_metrics_proxy_service() {
        let mut harness = Harness::new("team-a");
        harness.virtual_mock = harness.virtual_mock.clone().on_get(
            &service_path("kube-system", "metrics-server"),
            200,
            &service_json("kube-system", "metrics-server", "v-metrics", &[("https", 443)]),
        );
        harness.physical = harness.physical.clone().on_post(
            &services_path("team-a"),
            201,
            &service_json(
                "team-a",
                "my-vcluster-metrics-proxy",
                "p-metrics",
                &[("https", 443)],
            ),
        );
        let mut config = harness.config("team-a", false);
        config.distribution = Distribution::K8sDistro;

        let running = harness
            .control_plane_with(config, vec![])
            .start_control_plane()
            .await
            .unwrap();

        assert_eq!(
            harness
                .physical
                .count("GET", &service_path("team-a", "my-vcluster-metrics-proxy")),
            1
        );
        assert_eq!(harness.physical.count("POST", &services_path("team-a")), 1);
        assert!(running.leadership().is_leader());

        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_disabled_plugins_leave_flag_unset() {
        let harness = Harness::new("team-a");
        let mut config = harness.config("team-a", false);
        config.disable_plugins = true;

        let running = harness
            .control_plane_with(config, vec![])
            .start_control_plane()
            .await
            .unwrap();

        assert_eq!(running.phase(), BootstrapPhase::Leading);
        assert!(!running.leadership().is_leader());

        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_records_owner_in_target_namespace() {
        let harness = Harness::new("team-a");
        let running = harness
            .control_plane("team-a", true, vec![])
            .start_control_plane()
            .await
            .unwrap();

        let owner = running.owner().unwrap();
        assert_eq!(owner.kind, "Service");
        assert_eq!(owner.name, "my-vcluster");
        assert_eq!(owner.uid, "owner-uid");

        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_skips_owner_outside_target_namespace() {
        let harness = Harness::new("team-a-workloads");
        let running = harness
            .control_plane("team-a-workloads", true, vec![])
            .start_control_plane()
            .await
            .unwrap();

        assert!(running.owner().is_none());
        assert!(running.leadership().is_leader());
        assert_eq!(
            harness
                .physical
                .count("GET", &service_path("team-a", "my-vcluster")),
            0
        );

        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_initializers_run_once_in_order() {
        let harness = Harness::new("team-a");
        let initializers = vec![
            harness.initializer("first", false),
            harness.initializer("second", false),
        ];

        let running = harness
            .control_plane("team-a", false, initializers)
            .start_control_plane()
            .await
            .unwrap();

        assert_eq!(*harness.log.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(harness.indices.calls.load(Ordering::SeqCst), 1);

        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_initializer_failure_is_fatal() {
        let harness = Harness::new("team-a");
        let initializers = vec![
            harness.initializer("namespace", true),
            harness.initializer("never-run", false),
        ];

        let err = startup_error(harness.control_plane("team-a", false, initializers)).await;

        assert!(matches!(err, ControlPlaneError::InitializerError(_)));
        assert_eq!(*harness.log.lock().unwrap(), vec!["namespace"]);
        assert_eq!(harness.indices.calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.physical_loop.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_virtual_dns_service_is_fatal() {
        let mut harness = Harness::new("team-a");
        harness.virtual_mock = MockService::new();
        let plane = harness.control_plane("team-a", false, vec![]);
        let flag = plane.leadership();

        let err = startup_error(plane).await;

        assert!(matches!(err, ControlPlaneError::SpecialServiceError(_)));
        assert!(!flag.is_leader());
    }

    #[tokio::test]
    async fn test_wait_returns_on_cancel() {
        let harness = Harness::new("team-a");
        let running = harness
            .control_plane("team-a", false, vec![])
            .start_control_plane()
            .await
            .unwrap();

        harness.cancel.cancel();

        running.wait().await.unwrap();
        assert_eq!(harness.physical_loop.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wait_surfaces_loop_dying_after_startup() {
        let harness = Harness::new("team-a");
        let running = harness
            .control_plane("team-a", false, vec![])
            .start_control_plane()
            .await
            .unwrap();

        harness.virtual_loop.stop.cancel();

        let err = running.wait().await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::ControlLoopError(_)));
    }
}
