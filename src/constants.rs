// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// The field manager name used for server-side apply
pub const OPERATOR_NAME: &str = "vcluster-bootstrap";

/// Well-known DNS service inside the virtual cluster
pub mod dns {
    pub const SERVICE_NAME: &str = "kube-dns";
    pub const SERVICE_NAMESPACE: &str = "kube-system";
}

/// Metrics aggregation registration
pub mod metrics {
    pub const GROUP: &str = "metrics.k8s.io";
    pub const VERSION: &str = "v1beta1";
    /// Fully qualified APIService name, `<version>.<group>`
    pub const API_SERVICE: &str = "v1beta1.metrics.k8s.io";
    pub const GROUP_PRIORITY_MINIMUM: i32 = 100;
    pub const VERSION_PRIORITY: i32 = 100;

    /// Virtual-side service fronting the metrics proxy on distro clusters
    pub const PROXY_SERVICE_NAME: &str = "metrics-server";
    pub const PROXY_SERVICE_NAMESPACE: &str = "kube-system";
    /// Suffix appended to the control-plane service name on the physical side
    pub const PROXY_SERVICE_SUFFIX: &str = "-metrics-proxy";
    /// Port the control plane serves proxied metrics on
    pub const PROXY_TARGET_PORT: i32 = 8443;
}

/// Labels placed on objects this control plane creates
pub mod labels {
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
}

/// Credential persistence
pub mod credentials {
    /// Interval between credential bundle writes, in seconds
    pub const PERSIST_INTERVAL_SECS: u64 = 60;
    /// Key under which the kubeconfig is stored in the secret
    pub const KUBECONFIG_KEY: &str = "config";
    /// Prefix of the default secret name
    pub const SECRET_PREFIX: &str = "vc-";
}

/// Pause between attempts when a service write loses a conflict, in seconds
pub const CONFLICT_RETRY_PAUSE_SECS: u64 = 1;

pub const DEFAULT_COREDNS_MANIFEST: &str = "/manifests/coredns/coredns.yaml";

pub const SERVICE_ACCOUNT_NAMESPACE_FILE: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";
