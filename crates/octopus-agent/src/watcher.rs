// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Feeds Peer records observed in the hub into the [`TunnelManager`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client};
use octopus_k8s::Peer;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::tunnel::{peer_cluster_id, TunnelManager};

/// How often peers whose last apply or remove failed transiently are retried.
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Reconciles the device against the hub's Peer collection.
///
/// Transient failures are parked per cluster and retried every resync
/// interval until they succeed or a newer event for the same cluster
/// supersedes them. Permanent failures are logged and wait for the record to
/// change.
pub struct PeerWatcher {
	tunnel: Arc<TunnelManager>,
	/// Clusters seen during the current relist, between `Init` and `InitDone`.
	relist: Option<HashSet<String>>,
	/// Failed work by cluster id. `Some` retries an apply, `None` a removal.
	pending: HashMap<String, Option<Peer>>,
	resync: Duration,
}

impl PeerWatcher {
	pub fn new(tunnel: Arc<TunnelManager>) -> Self {
		Self {
			tunnel,
			relist: None,
			pending: HashMap::new(),
			resync: DEFAULT_RESYNC_INTERVAL,
		}
	}

	pub fn with_resync(mut self, resync: Duration) -> Self {
		self.resync = resync;
		self
	}

	/// Number of clusters waiting for a retry.
	pub fn pending_count(&self) -> usize {
		self.pending.len()
	}

	/// Watch Peer records in the share namespace until `cancel` fires.
	pub async fn run(mut self, client: Client, cancel: CancellationToken) {
		let namespace = self.tunnel.spec().share_namespace.clone();
		let api: Api<Peer> = Api::namespaced(client, &namespace);
		let stream = watcher::watcher(api, watcher::Config::default()).default_backoff();
		tokio::pin!(stream);

		let mut resync = time::interval_at(Instant::now() + self.resync, self.resync);
		resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

		info!(%namespace, resync_secs = self.resync.as_secs(), "watching peer records");
		loop {
			tokio::select! {
				_ = cancel.cancelled() => {
					debug!("peer watcher cancelled");
					break;
				}
				_ = resync.tick() => self.retry_pending().await,
				event = stream.next() => match event {
					Some(Ok(event)) => self.handle(event).await,
					Some(Err(e)) => warn!(error = %e, "peer watch error"),
					None => {
						info!("peer watch stream ended");
						break;
					}
				}
			}
		}
	}

	pub async fn handle(&mut self, event: Event<Peer>) {
		match event {
			Event::Init => self.relist = Some(HashSet::new()),
			Event::InitApply(peer) => {
				if let Some(seen) = self.relist.as_mut() {
					seen.insert(peer_cluster_id(&peer));
				}
				self.apply(&peer).await;
			}
			Event::Apply(peer) => self.apply(&peer).await,
			Event::Delete(peer) => self.remove(&peer_cluster_id(&peer)).await,
			Event::InitDone => {
				let Some(seen) = self.relist.take() else {
					return;
				};
				self
					.pending
					.retain(|cluster_id, work| work.is_none() || seen.contains(cluster_id));
				for cluster_id in self.tunnel.connected_clusters().await {
					if !seen.contains(&cluster_id) {
						debug!(%cluster_id, "peer vanished while the watch was down");
						self.remove(&cluster_id).await;
					}
				}
			}
		}
	}

	/// Re-run every parked apply or removal once.
	pub async fn retry_pending(&mut self) {
		if self.pending.is_empty() {
			return;
		}
		debug!(count = self.pending.len(), "retrying failed peer updates");
		for (cluster_id, work) in std::mem::take(&mut self.pending) {
			match work {
				Some(peer) => self.apply(&peer).await,
				None => self.remove(&cluster_id).await,
			}
		}
	}

	async fn apply(&mut self, peer: &Peer) {
		let cluster_id = peer_cluster_id(peer);
		self.pending.remove(&cluster_id);
		if let Err(e) = self.tunnel.add_peer(peer).await {
			let transient = e.is_transient();
			warn!(peer = %cluster_id, error = %e, transient, "failed to apply remote peer");
			if transient {
				self.pending.insert(cluster_id, Some(peer.clone()));
			}
		}
	}

	async fn remove(&mut self, cluster_id: &str) {
		self.pending.remove(cluster_id);
		if let Err(e) = self.tunnel.remove_peer(cluster_id).await {
			let transient = e.is_transient();
			warn!(%cluster_id, error = %e, transient, "failed to remove remote peer");
			if transient {
				self.pending.insert(cluster_id.to_string(), None);
			}
		}
	}
}
