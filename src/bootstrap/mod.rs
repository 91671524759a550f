// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Control-plane bring-up: collaborator interfaces and the startup sequence.

pub mod sequencer;

pub use sequencer::{Collaborators, ControlPlane, RunningControlPlane};

use crate::context::ClusterContext;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Prerequisite setup run exactly once before the control loops start
#[async_trait]
pub trait Initializer: Send + Sync {
    fn name(&self) -> &str;

    async fn initialize(&self, ctx: &ClusterContext) -> Result<()>;
}

/// Registration of cache indices, run exactly once before the control loops start
#[async_trait]
pub trait IndexRegistrar: Send + Sync {
    async fn register_indices(&self, ctx: &ClusterContext) -> Result<()>;
}

/// Handle of a long-lived control loop watching one side of the cluster pair
#[async_trait]
pub trait ControlLoop: Send + Sync {
    /// Run until `cancel` fires or the loop fails. Returning while the scope is
    /// still live is treated as abnormal termination.
    async fn start(&self, cancel: CancellationToken) -> Result<()>;

    /// Resolve once the loop's local cache is populated. `false` means the
    /// cache never synced (e.g. the scope was cancelled first).
    async fn wait_for_cache_sync(&self, cancel: &CancellationToken) -> bool;
}

/// Steps of the startup sequence, strictly forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BootstrapPhase {
    Initializing,
    StartingLoops,
    AwaitingCacheSync,
    SyncingSpecialServices,
    ReconcilingAggregation,
    DiscoveringOwner,
    Leading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterSide {
    Physical,
    Virtual,
}

impl fmt::Display for ClusterSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterSide::Physical => write!(f, "physical"),
            ClusterSide::Virtual => write!(f, "virtual"),
        }
    }
}
