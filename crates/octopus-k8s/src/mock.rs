// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory Peer registry with API-server-like optimistic concurrency.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use kube::ResourceExt;

use crate::client::PeerRegistry;
use crate::crd::Peer;
use crate::error::{RegistryError, RegistryResult};

/// Registry call kinds, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOp {
	Create,
	Get,
	Replace,
	Delete,
}

#[derive(Default)]
struct MockState {
	objects: BTreeMap<(String, String), Peer>,
	next_version: u64,
	failures: VecDeque<(MockOp, RegistryError)>,
	/// Gets after which another writer bumps the stored version.
	interfering_gets: usize,
	create_calls: usize,
	get_calls: usize,
	replace_calls: usize,
	delete_calls: usize,
	writes: usize,
}

impl MockState {
	fn take_failure(&mut self, op: MockOp) -> Option<RegistryError> {
		let pos = self.failures.iter().position(|(o, _)| *o == op)?;
		self.failures.remove(pos).map(|(_, err)| err)
	}

	fn bump_version(&mut self) -> String {
		self.next_version += 1;
		self.next_version.to_string()
	}
}

/// Mock registry for tests.
///
/// Versions every stored object like the API server does: `replace` only
/// succeeds when the caller presents the current `resourceVersion`.
#[derive(Clone, Default)]
pub struct MockPeerRegistry {
	state: Arc<Mutex<MockState>>,
}

impl MockPeerRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	fn lock(&self) -> MutexGuard<'_, MockState> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Store `peer` as if written by someone else. Does not count as a write.
	pub fn insert(&self, namespace: &str, mut peer: Peer) {
		let mut state = self.lock();
		peer.metadata.namespace = Some(namespace.to_string());
		peer.metadata.resource_version = Some(state.bump_version());
		state
			.objects
			.insert((namespace.to_string(), peer.name_any()), peer);
	}

	/// Delete a record behind the agent's back.
	pub fn remove(&self, namespace: &str, name: &str) -> Option<Peer> {
		self
			.lock()
			.objects
			.remove(&(namespace.to_string(), name.to_string()))
	}

	pub fn stored(&self, namespace: &str, name: &str) -> Option<Peer> {
		self
			.lock()
			.objects
			.get(&(namespace.to_string(), name.to_string()))
			.cloned()
	}

	/// Fail the next `op` call with `err`.
	pub fn fail_next(&self, op: MockOp, err: RegistryError) {
		self.lock().failures.push_back((op, err));
	}

	/// After each of the next `count` gets, bump the stored object's version
	/// so the caller's following replace conflicts.
	pub fn interfere_after_gets(&self, count: usize) {
		self.lock().interfering_gets = count;
	}

	pub fn calls(&self, op: MockOp) -> usize {
		let state = self.lock();
		match op {
			MockOp::Create => state.create_calls,
			MockOp::Get => state.get_calls,
			MockOp::Replace => state.replace_calls,
			MockOp::Delete => state.delete_calls,
		}
	}

	/// Successful mutations: creates, replaces and deletes that took effect.
	pub fn writes(&self) -> usize {
		self.lock().writes
	}
}

impl std::fmt::Debug for MockPeerRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.lock();
		f.debug_struct("MockPeerRegistry")
			.field("objects", &state.objects.len())
			.field("writes", &state.writes)
			.finish()
	}
}

#[async_trait]
impl PeerRegistry for MockPeerRegistry {
	async fn create(&self, namespace: &str, peer: &Peer) -> RegistryResult<Peer> {
		tokio::task::yield_now().await;
		let mut state = self.lock();
		state.create_calls += 1;
		if let Some(err) = state.take_failure(MockOp::Create) {
			return Err(err);
		}

		let name = peer.name_any();
		let key = (namespace.to_string(), name.clone());
		if state.objects.contains_key(&key) {
			return Err(RegistryError::AlreadyExists { name });
		}

		let mut stored = peer.clone();
		stored.metadata.namespace = Some(namespace.to_string());
		stored.metadata.resource_version = Some(state.bump_version());
		state.objects.insert(key, stored.clone());
		state.writes += 1;
		Ok(stored)
	}

	async fn get(&self, namespace: &str, name: &str) -> RegistryResult<Peer> {
		tokio::task::yield_now().await;
		let mut state = self.lock();
		state.get_calls += 1;
		if let Some(err) = state.take_failure(MockOp::Get) {
			return Err(err);
		}

		let key = (namespace.to_string(), name.to_string());
		let found = state
			.objects
			.get(&key)
			.cloned()
			.ok_or_else(|| RegistryError::NotFound { name: name.into() })?;

		if state.interfering_gets > 0 {
			state.interfering_gets -= 1;
			let version = state.bump_version();
			if let Some(obj) = state.objects.get_mut(&key) {
				obj.metadata.resource_version = Some(version);
			}
		}
		Ok(found)
	}

	async fn replace(&self, namespace: &str, peer: &Peer) -> RegistryResult<Peer> {
		tokio::task::yield_now().await;
		let mut state = self.lock();
		state.replace_calls += 1;
		if let Some(err) = state.take_failure(MockOp::Replace) {
			return Err(err);
		}

		let name = peer.name_any();
		let key = (namespace.to_string(), name.clone());
		let current = state
			.objects
			.get(&key)
			.and_then(|p| p.metadata.resource_version.clone())
			.ok_or_else(|| RegistryError::NotFound { name: name.clone() })?;
		if peer.metadata.resource_version.as_deref() != Some(current.as_str()) {
			return Err(RegistryError::Conflict { name });
		}

		let mut stored = peer.clone();
		stored.metadata.resource_version = Some(state.bump_version());
		state.objects.insert(key, stored.clone());
		state.writes += 1;
		Ok(stored)
	}

	async fn delete(&self, namespace: &str, name: &str) -> RegistryResult<()> {
		tokio::task::yield_now().await;
		let mut state = self.lock();
		state.delete_calls += 1;
		if let Some(err) = state.take_failure(MockOp::Delete) {
			return Err(err);
		}

		match state
			.objects
			.remove(&(namespace.to_string(), name.to_string()))
		{
			Some(_) => {
				state.writes += 1;
				Ok(())
			}
			None => Err(RegistryError::NotFound { name: name.into() }),
		}
	}
}
