// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-cluster agent for the octopus WireGuard mesh.
//!
//! [`TunnelManager`] is the composition root: it owns the local device,
//! publishes this cluster's Peer record on [`init`](TunnelManager::init),
//! retracts it on [`cleanup`](TunnelManager::cleanup), and applies remote
//! clusters as incremental peer deltas. [`PeerWatcher`] drives the latter
//! from the hub.

pub mod config;
pub mod error;
pub mod tunnel;
pub mod watcher;

pub use config::{Role, Specification, DEFAULT_NAMESPACE};
pub use error::{ConfigError, Result, TunnelError};
pub use tunnel::{AppliedPeer, PeerChange, TunnelManager};
pub use watcher::{PeerWatcher, DEFAULT_RESYNC_INTERVAL};
