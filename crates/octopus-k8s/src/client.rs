// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;

use crate::crd::Peer;
use crate::error::RegistryResult;

/// Operations on the hub's Peer collection.
///
/// Implementations classify failures into [`RegistryError`](crate::RegistryError)
/// and do no retrying of their own; conflict handling lives in the caller.
#[async_trait]
pub trait PeerRegistry: Send + Sync {
	/// Create `peer` in `namespace`. Fails with `AlreadyExists` if a record of
	/// that name is present.
	async fn create(&self, namespace: &str, peer: &Peer) -> RegistryResult<Peer>;

	async fn get(&self, namespace: &str, name: &str) -> RegistryResult<Peer>;

	/// Replace the stored record. `peer.metadata.resource_version` must match
	/// the stored version or the call fails with `Conflict`.
	async fn replace(&self, namespace: &str, peer: &Peer) -> RegistryResult<Peer>;

	async fn delete(&self, namespace: &str, name: &str) -> RegistryResult<()>;
}
