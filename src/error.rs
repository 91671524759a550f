// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Why a retry loop stopped without the operation reporting done.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAbort {
    #[error("operation cancelled")]
    Cancelled,

    #[error("operation did not complete after {0} attempts")]
    Exhausted(u32),
}

#[derive(Error, Debug)]
pub enum ControlPlaneError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error(transparent)]
    Retry(#[from] RetryAbort),

    #[error("Failed to load kubeconfig: {0}")]
    KubeconfigError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Initializer failed: {0}")]
    InitializerError(String),

    #[error("Index registration failed: {0}")]
    IndexError(String),

    #[error("Control loop failed: {0}")]
    ControlLoopError(String),

    #[error("Cache sync failed: {0}")]
    CacheSyncError(String),

    #[error("Special service sync failed: {0}")]
    SpecialServiceError(String),

    #[error("Owner discovery failed: {0}")]
    OwnerError(String),

    #[error("No manifests found")]
    NoManifests,

    #[error("Manifest apply failed: {0}")]
    ManifestError(String),

    #[error("Credential persistence failed: {0}")]
    CredentialError(String),

    #[error("Namespace creation failed: {0}")]
    NamespaceError(String),
}

impl ControlPlaneError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ControlPlaneError::Retry(RetryAbort::Cancelled))
    }

    /// True when the underlying API call lost an optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ControlPlaneError::KubeError(e) if is_conflict(e))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ControlPlaneError::KubeError(e) if is_already_exists(e))
    }
}

pub type Result<T> = std::result::Result<T, ControlPlaneError>;

pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 404)
}

pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 409 && e.reason == "AlreadyExists")
}

pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 409 && e.reason != "AlreadyExists")
}

/// Errors that say nothing about the request itself: throttling, server-side
/// failures and transport problems.
pub fn is_transient(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(e) => e.code == 429 || e.code >= 500,
        kube::Error::HyperError(_) | kube::Error::Service(_) => true,
        _ => false,
    }
}
