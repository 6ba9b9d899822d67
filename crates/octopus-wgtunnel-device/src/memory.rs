// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory [`WgBackend`] for tests.
//!
//! Cloning a [`MemoryBackend`] yields another handle onto the same state, so
//! a test can hand one clone to a controller and inspect the device through
//! the other.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use octopus_wgtunnel_common::{PeerConfig, PeerDelta, WgPrivateKey, WgPublicKey};

use crate::backend::{DeviceConfig, LinkHandle, WgBackend};
use crate::error::{DeviceError, LinkCreateKind, Result};

/// A one-shot failure to inject into the next matching call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryFailure {
	CreateLink(LinkCreateKind),
	Configure,
	SetUp,
	PeerDelta,
}

#[derive(Default)]
struct MemoryLink {
	index: u32,
	/// Some other kind of link holding the name.
	foreign: bool,
	up: bool,
	private_key: Option<WgPrivateKey>,
	listen_port: Option<u16>,
	peers: BTreeMap<WgPublicKey, PeerConfig>,
}

#[derive(Default)]
struct MemoryState {
	links: BTreeMap<String, MemoryLink>,
	next_index: u32,
	failures: Vec<MemoryFailure>,
	full_replaces: usize,
	deltas: usize,
}

impl MemoryState {
	fn take_failure(&mut self, matches: impl Fn(&MemoryFailure) -> bool) -> Option<MemoryFailure> {
		let pos = self.failures.iter().position(matches)?;
		Some(self.failures.remove(pos))
	}

	fn link_mut(&mut self, name: &str) -> Result<&mut MemoryLink> {
		self
			.links
			.get_mut(name)
			.ok_or_else(|| DeviceError::LinkNotFound(name.to_string()))
	}

	fn ensure_link(&mut self, name: &str) -> &mut MemoryLink {
		if !self.links.contains_key(name) {
			self.next_index += 1;
			let link = MemoryLink {
				index: self.next_index,
				..Default::default()
			};
			self.links.insert(name.to_string(), link);
		}
		self
			.links
			.entry(name.to_string())
			.or_default()
	}
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
	state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
	pub fn new() -> Self {
		Self::default()
	}

	fn lock(&self) -> MutexGuard<'_, MemoryState> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Fail the next call matching `failure`.
	pub fn fail_next(&self, failure: MemoryFailure) {
		self.lock().failures.push(failure);
	}

	/// Pre-populate a peer, as if left behind by an earlier process.
	pub fn seed_peer(&self, name: &str, peer: PeerConfig) {
		let mut state = self.lock();
		state
			.ensure_link(name)
			.peers
			.insert(peer.public_key, peer);
	}

	/// Occupy `name` with a link that is not a WireGuard device.
	pub fn seed_foreign_link(&self, name: &str) {
		self.lock().ensure_link(name).foreign = true;
	}

	pub fn link_count(&self) -> usize {
		self.lock().links.len()
	}

	pub fn is_up(&self, name: &str) -> bool {
		self.lock().links.get(name).is_some_and(|l| l.up)
	}

	pub fn listen_port(&self, name: &str) -> Option<u16> {
		self.lock().links.get(name).and_then(|l| l.listen_port)
	}

	pub fn public_key(&self, name: &str) -> Option<WgPublicKey> {
		self
			.lock()
			.links
			.get(name)
			.and_then(|l| l.private_key.as_ref().map(WgPrivateKey::public_key))
	}

	pub fn peers(&self, name: &str) -> Vec<PeerConfig> {
		self
			.lock()
			.links
			.get(name)
			.map(|l| l.peers.values().cloned().collect())
			.unwrap_or_default()
	}

	/// Number of configure calls that replaced the whole peer list.
	pub fn full_replace_count(&self) -> usize {
		self.lock().full_replaces
	}

	/// Number of non-empty peer deltas applied.
	pub fn delta_count(&self) -> usize {
		self.lock().deltas
	}
}

impl std::fmt::Debug for MemoryBackend {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.lock();
		f.debug_struct("MemoryBackend")
			.field("links", &state.links.keys().collect::<Vec<_>>())
			.field("full_replaces", &state.full_replaces)
			.field("deltas", &state.deltas)
			.finish()
	}
}

#[async_trait]
impl WgBackend for MemoryBackend {
	async fn create_link(&self, name: &str) -> Result<LinkHandle> {
		let mut state = self.lock();
		if let Some(MemoryFailure::CreateLink(kind)) =
			state.take_failure(|f| matches!(f, MemoryFailure::CreateLink(_)))
		{
			return Err(DeviceError::LinkCreate {
				name: name.to_string(),
				kind,
				message: "injected failure".to_string(),
			});
		}

		let link = state.ensure_link(name);
		if link.foreign {
			return Err(DeviceError::LinkCreate {
				name: name.to_string(),
				kind: LinkCreateKind::Other,
				message: format!("link {name} exists and is not a WireGuard device"),
			});
		}
		Ok(LinkHandle {
			name: name.to_string(),
			index: link.index,
		})
	}

	async fn configure(&self, name: &str, config: &DeviceConfig) -> Result<()> {
		let mut state = self.lock();
		if state
			.take_failure(|f| *f == MemoryFailure::Configure)
			.is_some()
		{
			return Err(DeviceError::DeviceConfig {
				name: name.to_string(),
				message: "injected failure".to_string(),
			});
		}

		let replace = config.replace_peers;
		let link = state.link_mut(name)?;
		link.private_key = Some(config.private_key.clone());
		link.listen_port = Some(config.listen_port);
		if replace {
			link.peers.clear();
		}
		for peer in &config.peers {
			link.peers.insert(peer.public_key, peer.clone());
		}
		if replace {
			state.full_replaces += 1;
		}
		Ok(())
	}

	async fn set_up(&self, link: &LinkHandle) -> Result<()> {
		let mut state = self.lock();
		if state.take_failure(|f| *f == MemoryFailure::SetUp).is_some() {
			return Err(DeviceError::LinkUp {
				name: link.name.clone(),
				message: "injected failure".to_string(),
			});
		}

		state.link_mut(&link.name)?.up = true;
		Ok(())
	}

	async fn apply_peer_delta(&self, name: &str, delta: &PeerDelta) -> Result<()> {
		let mut state = self.lock();
		if state
			.take_failure(|f| *f == MemoryFailure::PeerDelta)
			.is_some()
		{
			return Err(DeviceError::DeviceConfig {
				name: name.to_string(),
				message: "injected failure".to_string(),
			});
		}

		let link = state.link_mut(name)?;
		for key in &delta.removed {
			link.peers.remove(key);
		}
		for peer in &delta.added {
			link.peers.insert(peer.public_key, peer.clone());
		}
		state.deltas += 1;
		Ok(())
	}

	async fn configured_peers(&self, name: &str) -> Result<Vec<WgPublicKey>> {
		let mut state = self.lock();
		Ok(state.link_mut(name)?.peers.keys().copied().collect())
	}
}
