// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Hub registry access for the octopus agent.
//!
//! This crate provides:
//! - The `Peer` custom resource (`octopus.io/v1alpha1`)
//! - A trait-based registry abstraction for testability
//! - A production implementation using the kube crate
//! - An in-memory registry with optimistic concurrency for tests
//! - Resolution of hub credentials for spoke clusters

mod client;
mod crd;
mod error;
mod hub;
mod kube_client;
mod mock;

pub use client::PeerRegistry;
pub use crd::{Peer, PeerSpec};
pub use error::{K8sError, K8sResult, RegistryError, RegistryResult};
pub use hub::{hub_kubeconfig, resolve_hub_config, HUB_CREDENTIALS_SECRET};
pub use kube_client::KubePeerRegistry;
pub use mock::{MockOp, MockPeerRegistry};
