// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ipnet::IpNet;
use kube::ResourceExt;
use octopus_k8s::{Peer, PeerRegistry, PeerSpec};
use octopus_peer_registry::{
	apply_self, retract_self, ApplyOutcome, ExponentialBackoff, RetractOutcome,
};
use octopus_wgtunnel_common::{
	load_or_generate_key_material, KeyMaterial, PeerConfig, WgPublicKey, DEFAULT_DEVICE_NAME,
	PERSISTENT_KEEPALIVE_SECS, UDP_PORT,
};
use octopus_wgtunnel_device::{DeviceController, WgBackend};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::config::Specification;
use crate::error::{Result, TunnelError};

/// A remote cluster as last programmed into the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedPeer {
	pub spec: PeerSpec,
	pub config: PeerConfig,
}

/// What [`TunnelManager::add_peer`] or [`TunnelManager::remove_peer`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerChange {
	Added,
	Updated,
	Removed,
	/// Device already matched; nothing was sent to it.
	Unchanged,
	/// The record describes this cluster.
	Ignored,
}

struct TunnelState {
	device: DeviceController,
	connections: HashMap<String, AppliedPeer>,
}

/// Owns the local WireGuard device and this cluster's place in the hub.
///
/// `connections` only ever records a peer after the device accepted it, so at
/// any quiescent point it equals what the device has programmed. Hub calls run
/// outside the state lock.
pub struct TunnelManager {
	registry: Arc<dyn PeerRegistry>,
	spec: Specification,
	keys: KeyMaterial,
	state: Mutex<TunnelState>,
	conflict_backoff: ExponentialBackoff,
	retract_backoff: ExponentialBackoff,
}

impl TunnelManager {
	/// Creates the link, loads or generates keys and programs the device with
	/// an empty peer list. Fails fast on any device error.
	#[instrument(skip_all, fields(cluster_id = %spec.cluster_id))]
	pub async fn new(
		registry: Arc<dyn PeerRegistry>,
		spec: Specification,
		backend: Arc<dyn WgBackend>,
	) -> Result<Self> {
		let mut device = DeviceController::new(backend, DEFAULT_DEVICE_NAME);
		device.create_link().await?;

		let keys = match &spec.key_dir {
			Some(dir) => load_or_generate_key_material(dir).await?,
			None => {
				let keys = KeyMaterial::generate()?;
				info!(public_key = %keys.public_key(), "generated ephemeral WireGuard key material");
				keys
			}
		};

		device
			.configure_device(keys.private_key(), UDP_PORT, Vec::new())
			.await?;

		Ok(Self {
			registry,
			spec,
			keys,
			state: Mutex::new(TunnelState {
				device,
				connections: HashMap::new(),
			}),
			conflict_backoff: ExponentialBackoff::default(),
			retract_backoff: ExponentialBackoff::new(
				Duration::from_millis(100),
				2.0,
				Duration::from_secs(5),
			)
			.with_max_retries(None),
		})
	}

	pub fn with_backoff(mut self, conflict: ExponentialBackoff, retract: ExponentialBackoff) -> Self {
		self.conflict_backoff = conflict;
		self.retract_backoff = retract;
		self
	}

	pub fn spec(&self) -> &Specification {
		&self.spec
	}

	pub fn public_key(&self) -> &WgPublicKey {
		self.keys.public_key()
	}

	/// Brings the device up and publishes this cluster's Peer record.
	///
	/// Device state is not rolled back if publishing fails.
	#[instrument(skip(self), fields(cluster_id = %self.spec.cluster_id))]
	pub async fn init(&self) -> Result<ApplyOutcome> {
		let peer = {
			let mut state = self.state.lock().await;
			state.device.bring_up().await?;
			Peer::for_cluster(
				&self.spec.share_namespace,
				self.spec.peer_spec(self.keys.public_key()),
			)
		};

		let mut backoff = self.conflict_backoff.clone();
		let outcome = apply_self(
			self.registry.as_ref(),
			&self.spec.share_namespace,
			&peer,
			&mut backoff,
		)
		.await?;
		info!(?outcome, "joined mesh");
		Ok(outcome)
	}

	/// Retracts this cluster's Peer record within `timeout`.
	///
	/// Runs under its own cancellation scope, so it still executes after the
	/// agent's shutdown signal fired. The device and `connections` are left
	/// alone.
	#[instrument(skip(self), fields(cluster_id = %self.spec.cluster_id))]
	pub async fn cleanup(&self, timeout: Duration) -> Result<RetractOutcome> {
		let mut backoff = self.retract_backoff.clone();
		let outcome = retract_self(
			self.registry.as_ref(),
			&self.spec.share_namespace,
			&self.spec.cluster_id,
			&mut backoff,
			timeout,
			&CancellationToken::new(),
		)
		.await?;
		Ok(outcome)
	}

	/// Programs a remote cluster into the device, or updates it.
	#[instrument(skip(self, peer), fields(peer = %peer_cluster_id(peer)))]
	pub async fn add_peer(&self, peer: &Peer) -> Result<PeerChange> {
		let cluster_id = peer_cluster_id(peer);
		if cluster_id == self.spec.cluster_id {
			return Ok(PeerChange::Ignored);
		}

		// DNS happens before the lock so a slow resolver stalls only this peer.
		let config = remote_peer_config(&cluster_id, &peer.spec).await?;

		let mut guard = self.state.lock().await;
		let state = &mut *guard;

		// The device is keyed by public key, so one key can only stand for one
		// cluster.
		if let Some((owner, _)) = state
			.connections
			.iter()
			.find(|(id, applied)| **id != cluster_id && applied.config.public_key == config.public_key)
		{
			return Err(TunnelError::InvalidPeer {
				cluster_id,
				message: format!("public key {} is already used by peer {owner}", config.public_key),
			});
		}

		let (removed, change) = match state.connections.get(&cluster_id) {
			Some(applied) if applied.config == config => {
				debug!("peer unchanged");
				return Ok(PeerChange::Unchanged);
			}
			Some(applied) if applied.config.public_key != config.public_key => {
				(vec![applied.config.public_key], PeerChange::Updated)
			}
			Some(_) => (Vec::new(), PeerChange::Updated),
			None => (Vec::new(), PeerChange::Added),
		};

		state
			.device
			.apply_peer_delta(vec![config.clone()], removed)
			.await?;
		state.connections.insert(
			cluster_id,
			AppliedPeer {
				spec: peer.spec.clone(),
				config,
			},
		);
		info!(?change, "remote peer programmed");
		Ok(change)
	}

	/// Drops a remote cluster from the device. Unknown clusters are a no-op.
	#[instrument(skip(self))]
	pub async fn remove_peer(&self, cluster_id: &str) -> Result<PeerChange> {
		let mut guard = self.state.lock().await;
		let state = &mut *guard;

		let Some(applied) = state.connections.get(cluster_id) else {
			return Ok(PeerChange::Unchanged);
		};
		let key = applied.config.public_key;

		state.device.apply_peer_delta(Vec::new(), vec![key]).await?;
		state.connections.remove(cluster_id);
		info!("remote peer removed");
		Ok(PeerChange::Removed)
	}

	/// Snapshot of the remote clusters currently programmed.
	pub async fn connections(&self) -> HashMap<String, AppliedPeer> {
		self.state.lock().await.connections.clone()
	}

	pub async fn connected_clusters(&self) -> Vec<String> {
		self.state.lock().await.connections.keys().cloned().collect()
	}

	/// Peer keys as reported by the device itself.
	pub async fn configured_peer_keys(&self) -> Result<Vec<WgPublicKey>> {
		Ok(self.state.lock().await.device.configured_peers().await?)
	}
}

impl std::fmt::Debug for TunnelManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TunnelManager")
			.field("cluster_id", &self.spec.cluster_id)
			.field("public_key", self.keys.public_key())
			.finish_non_exhaustive()
	}
}

/// Records are named after their cluster, but `clusterID` wins when set.
pub(crate) fn peer_cluster_id(peer: &Peer) -> String {
	if peer.spec.cluster_id.is_empty() {
		peer.name_any()
	} else {
		peer.spec.cluster_id.clone()
	}
}

async fn remote_peer_config(cluster_id: &str, spec: &PeerSpec) -> Result<PeerConfig> {
	let invalid = |message: String| TunnelError::InvalidPeer {
		cluster_id: cluster_id.to_string(),
		message,
	};

	let public_key = WgPublicKey::from_base64(&spec.public_key)
		.map_err(|e| invalid(format!("public key: {e}")))?;
	let allowed_ips = spec
		.pod_cidr
		.iter()
		.map(|c| {
			c.trim()
				.parse::<IpNet>()
				.map_err(|e| invalid(format!("pod CIDR {c}: {e}")))
		})
		.collect::<Result<Vec<_>>>()?;

	let mut config = PeerConfig::new(public_key)
		.with_allowed_ips(allowed_ips)
		.with_persistent_keepalive(PERSISTENT_KEEPALIVE_SECS);
	if !spec.endpoint.is_empty() {
		config = config.with_endpoint(resolve_endpoint(cluster_id, &spec.endpoint).await?);
	}
	Ok(config)
}

async fn resolve_endpoint(cluster_id: &str, endpoint: &str) -> Result<SocketAddr> {
	if let Ok(addr) = endpoint.parse::<SocketAddr>() {
		return Ok(addr);
	}

	let resolve_err = |message: String| TunnelError::Resolve {
		cluster_id: cluster_id.to_string(),
		endpoint: endpoint.to_string(),
		message,
	};
	tokio::net::lookup_host(endpoint)
		.await
		.map_err(|e| resolve_err(e.to_string()))?
		.next()
		.ok_or_else(|| resolve_err("no addresses".to_string()))
}
