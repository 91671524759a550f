// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Execution context shared by every bootstrap operation.

use crate::retry::BackoffPolicy;
use kube::Client;
use tokio_util::sync::CancellationToken;

/// Handles threaded through all operations. Owned by the bootstrap sequence,
/// borrowed by everything else.
#[derive(Clone)]
pub struct ClusterContext {
    /// Lifetime scope; cancelling it stops every retry loop and background task
    pub cancel: CancellationToken,
    /// Client for the backing cluster
    pub physical: Client,
    /// Client for the virtual cluster API surface
    pub virtual_client: Client,
    /// Namespace the control plane itself runs in
    pub current_namespace: String,
    /// Backoff used by every retrying operation
    pub policy: BackoffPolicy,
}

impl ClusterContext {
    pub fn new(
        cancel: CancellationToken,
        physical: Client,
        virtual_client: Client,
        current_namespace: impl Into<String>,
    ) -> Self {
        Self {
            cancel,
            physical,
            virtual_client,
            current_namespace: current_namespace.into(),
            policy: BackoffPolicy::canonical(),
        }
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// A context whose scope is a child of this one, so it can be cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            ..self.clone()
        }
    }
}
