// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use octopus_wgtunnel_common::{PeerConfig, PeerDelta, WgPrivateKey, WgPublicKey};
use tracing::{debug, info, instrument};

use crate::backend::{DeviceConfig, LinkHandle, WgBackend};
use crate::error::{DeviceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceState {
	Unconfigured,
	LinkCreated,
	KeysConfigured,
	Up,
}

impl fmt::Display for DeviceState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Unconfigured => write!(f, "unconfigured"),
			Self::LinkCreated => write!(f, "link-created"),
			Self::KeysConfigured => write!(f, "keys-configured"),
			Self::Up => write!(f, "up"),
		}
	}
}

/// Exclusive owner of one WireGuard link.
///
/// `Up` is terminal for the lifetime of the controller; there is no
/// teardown, the link outlives the process so tunnels do not flap across
/// restarts.
pub struct DeviceController {
	backend: Arc<dyn WgBackend>,
	name: String,
	state: DeviceState,
	link: Option<LinkHandle>,
	listen_port: Option<u16>,
	remote_peers: HashSet<WgPublicKey>,
}

impl DeviceController {
	pub fn new(backend: Arc<dyn WgBackend>, name: impl Into<String>) -> Self {
		Self {
			backend,
			name: name.into(),
			state: DeviceState::Unconfigured,
			link: None,
			listen_port: None,
			remote_peers: HashSet::new(),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn state(&self) -> DeviceState {
		self.state
	}

	pub fn link(&self) -> Option<&LinkHandle> {
		self.link.as_ref()
	}

	pub fn listen_port(&self) -> Option<u16> {
		self.listen_port
	}

	/// Keys of the remote peers this controller has programmed.
	pub fn remote_peers(&self) -> &HashSet<WgPublicKey> {
		&self.remote_peers
	}

	#[instrument(skip(self), fields(device = %self.name))]
	pub async fn create_link(&mut self) -> Result<LinkHandle> {
		if let Some(link) = &self.link {
			return Ok(link.clone());
		}

		let link = self.backend.create_link(&self.name).await?;
		info!(index = link.index, "WireGuard link ready");

		self.link = Some(link.clone());
		self.state = DeviceState::LinkCreated;
		Ok(link)
	}

	/// Applies key and listen port, replacing the whole peer list.
	///
	/// Only allowed before any remote peer has been added through
	/// [`apply_peer_delta`](Self::apply_peer_delta); afterwards a full
	/// replace would drop every tunnel in the mesh at once.
	#[instrument(skip(self, private_key, peers), fields(device = %self.name, peers = peers.len()))]
	pub async fn configure_device(
		&mut self,
		private_key: &WgPrivateKey,
		listen_port: u16,
		peers: Vec<PeerConfig>,
	) -> Result<()> {
		if self.state < DeviceState::LinkCreated {
			return Err(DeviceError::InvalidState {
				state: self.state,
				op: "configure device",
			});
		}
		if !self.remote_peers.is_empty() {
			return Err(DeviceError::DestructiveResync(self.remote_peers.len()));
		}

		let keys: HashSet<WgPublicKey> = peers.iter().map(|p| p.public_key).collect();
		let config = DeviceConfig {
			private_key: private_key.clone(),
			listen_port,
			replace_peers: true,
			peers,
		};
		self.backend.configure(&self.name, &config).await?;

		self.remote_peers = keys;
		self.listen_port = Some(listen_port);
		if self.state < DeviceState::KeysConfigured {
			self.state = DeviceState::KeysConfigured;
		}
		debug!("WireGuard device configured");
		Ok(())
	}

	#[instrument(skip(self), fields(device = %self.name))]
	pub async fn bring_up(&mut self) -> Result<()> {
		if self.state < DeviceState::KeysConfigured {
			return Err(DeviceError::InvalidState {
				state: self.state,
				op: "bring up link",
			});
		}
		let link = self
			.link
			.as_ref()
			.ok_or_else(|| DeviceError::LinkNotFound(self.name.clone()))?;

		self.backend.set_up(link).await?;
		if self.state != DeviceState::Up {
			info!(index = link.index, listen_port = ?self.listen_port, "WireGuard link is up");
		}
		self.state = DeviceState::Up;
		Ok(())
	}

	/// Programs `added` and drops `removed`, leaving every other peer alone.
	#[instrument(skip(self, added, removed), fields(device = %self.name, added = added.len(), removed = removed.len()))]
	pub async fn apply_peer_delta(
		&mut self,
		added: Vec<PeerConfig>,
		removed: Vec<WgPublicKey>,
	) -> Result<()> {
		if self.state < DeviceState::KeysConfigured {
			return Err(DeviceError::InvalidState {
				state: self.state,
				op: "apply peer delta",
			});
		}

		let delta = PeerDelta::new(added, removed);
		if delta.is_empty() {
			return Ok(());
		}

		self.backend.apply_peer_delta(&self.name, &delta).await?;

		for key in &delta.removed {
			self.remote_peers.remove(key);
		}
		for peer in &delta.added {
			self.remote_peers.insert(peer.public_key);
		}
		debug!(total = self.remote_peers.len(), "applied peer delta");
		Ok(())
	}

	/// Peers as reported by the device itself.
	pub async fn configured_peers(&self) -> Result<Vec<WgPublicKey>> {
		self.backend.configured_peers(&self.name).await
	}
}

impl fmt::Debug for DeviceController {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DeviceController")
			.field("name", &self.name)
			.field("state", &self.state)
			.field("link", &self.link)
			.field("remote_peers", &self.remote_peers.len())
			.finish()
	}
}
