// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use ipnet::IpNet;
use kube::runtime::watcher::Event;
use octopus_agent::{PeerChange, PeerWatcher, Role, Specification, TunnelError, TunnelManager};
use octopus_k8s::{MockOp, MockPeerRegistry, Peer, PeerSpec, RegistryError};
use octopus_peer_registry::{ApplyOutcome, ExponentialBackoff, RetractOutcome};
use octopus_wgtunnel_common::{KeyMaterial, WgPublicKey, DEFAULT_DEVICE_NAME, UDP_PORT};
use octopus_wgtunnel_device::{DeviceError, LinkCreateKind, MemoryBackend, MemoryFailure};

const NS: &str = "syncer-operator";

fn alpha_spec() -> Specification {
	Specification {
		cluster_id: "alpha".to_string(),
		local_namespace: NS.to_string(),
		share_namespace: NS.to_string(),
		role: Role::Spoke {
			hub_url: "https://hub.example.com:6443".parse().unwrap(),
		},
		cidr: vec!["10.1.0.0/16".parse().unwrap()],
		endpoint: Some("alpha.example.com:51820".to_string()),
		key_dir: None,
	}
}

fn fast_backoff() -> (ExponentialBackoff, ExponentialBackoff) {
	let conflict = ExponentialBackoff::new(Duration::from_millis(1), 2.0, Duration::from_millis(5));
	let retract = conflict.clone().with_max_retries(None);
	(conflict, retract)
}

async fn manager(
	registry: &MockPeerRegistry,
	backend: &MemoryBackend,
	spec: Specification,
) -> TunnelManager {
	let (conflict, retract) = fast_backoff();
	TunnelManager::new(Arc::new(registry.clone()), spec, Arc::new(backend.clone()))
		.await
		.unwrap()
		.with_backoff(conflict, retract)
}

fn remote(cluster_id: &str, public_key: &WgPublicKey, cidr: &str, endpoint: &str) -> Peer {
	Peer::for_cluster(
		NS,
		PeerSpec {
			cluster_id: cluster_id.to_string(),
			pod_cidr: vec![cidr.to_string()],
			endpoint: endpoint.to_string(),
			is_hub: false,
			public_key: public_key.to_base64(),
		},
	)
}

fn new_key() -> WgPublicKey {
	*KeyMaterial::generate().unwrap().public_key()
}

async fn assert_device_matches_connections(tunnel: &TunnelManager) {
	let expected: HashSet<WgPublicKey> = tunnel
		.connections()
		.await
		.values()
		.map(|applied| applied.config.public_key)
		.collect();
	let actual: HashSet<WgPublicKey> = tunnel
		.configured_peer_keys()
		.await
		.unwrap()
		.into_iter()
		.collect();
	assert_eq!(actual, expected);
}

#[tokio::test]
async fn new_configures_device_with_empty_peer_list() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = manager(&registry, &backend, alpha_spec()).await;

	assert_eq!(backend.listen_port(DEFAULT_DEVICE_NAME), Some(UDP_PORT));
	assert_eq!(backend.public_key(DEFAULT_DEVICE_NAME), Some(*tunnel.public_key()));
	assert!(backend.peers(DEFAULT_DEVICE_NAME).is_empty());
	assert!(!backend.is_up(DEFAULT_DEVICE_NAME));
	assert_eq!(registry.writes(), 0);
}

#[tokio::test]
async fn new_fails_fast_on_link_error() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	backend.fail_next(MemoryFailure::CreateLink(LinkCreateKind::PermissionDenied));

	let err = TunnelManager::new(Arc::new(registry), alpha_spec(), Arc::new(backend))
		.await
		.unwrap_err();

	assert!(matches!(
		err,
		TunnelError::Configuration(DeviceError::LinkCreate {
			kind: LinkCreateKind::PermissionDenied,
			..
		})
	));
	assert!(!err.is_transient());
}

/// Purpose: first start against an empty hub creates exactly one record
/// matching the local configuration, and a restart with the same
/// configuration writes nothing.
#[tokio::test]
async fn init_publishes_once_and_reinit_is_a_no_op() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = manager(&registry, &backend, alpha_spec()).await;

	assert_eq!(tunnel.init().await.unwrap(), ApplyOutcome::Created);
	assert!(backend.is_up(DEFAULT_DEVICE_NAME));
	assert_eq!(registry.calls(MockOp::Create), 1);

	let stored = registry.stored(NS, "alpha").unwrap();
	assert_eq!(stored.spec.cluster_id, "alpha");
	assert_eq!(stored.spec.pod_cidr, vec!["10.1.0.0/16".to_string()]);
	assert_eq!(stored.spec.endpoint, "alpha.example.com:51820");
	assert!(!stored.spec.is_hub);
	assert_eq!(stored.spec.public_key, tunnel.public_key().to_base64());

	assert_eq!(tunnel.init().await.unwrap(), ApplyOutcome::Unchanged);
	assert_eq!(registry.calls(MockOp::Replace), 0);
	assert_eq!(registry.writes(), 1);
}

#[tokio::test]
async fn restart_with_new_keys_updates_record() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();

	let first = manager(&registry, &backend, alpha_spec()).await;
	first.init().await.unwrap();
	let second = manager(&registry, &backend, alpha_spec()).await;

	assert_eq!(second.init().await.unwrap(), ApplyOutcome::Updated);
	assert_eq!(
		registry.stored(NS, "alpha").unwrap().spec.public_key,
		second.public_key().to_base64()
	);
	assert_eq!(backend.link_count(), 1);
}

#[tokio::test]
async fn hub_role_is_published() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let mut spec = alpha_spec();
	spec.role = Role::Hub;
	let tunnel = manager(&registry, &backend, spec).await;

	tunnel.init().await.unwrap();
	assert!(registry.stored(NS, "alpha").unwrap().spec.is_hub);
}

#[tokio::test]
async fn init_surfaces_registry_outage() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = manager(&registry, &backend, alpha_spec()).await;
	registry.fail_next(
		MockOp::Create,
		RegistryError::Unavailable {
			message: "forbidden".to_string(),
		},
	);

	let err = tunnel.init().await.unwrap_err();
	assert!(matches!(err, TunnelError::RegistryUnavailable(_)));
	assert!(backend.is_up(DEFAULT_DEVICE_NAME));
}

#[tokio::test]
async fn init_reports_exhausted_conflicts() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let stale = remote("alpha", &new_key(), "10.1.0.0/16", "192.0.2.1:51820");
	registry.insert(NS, stale);
	registry.interfere_after_gets(usize::MAX);
	let tunnel = manager(&registry, &backend, alpha_spec()).await;

	let err = tunnel.init().await.unwrap_err();
	assert!(matches!(err, TunnelError::RegistryConflict(_)));
}

#[tokio::test]
async fn cleanup_deletes_own_record() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = manager(&registry, &backend, alpha_spec()).await;
	tunnel.init().await.unwrap();

	let outcome = tunnel.cleanup(Duration::from_secs(5)).await.unwrap();
	assert_eq!(outcome, RetractOutcome::Deleted);
	assert!(registry.stored(NS, "alpha").is_none());
	assert!(backend.is_up(DEFAULT_DEVICE_NAME));
}

/// Purpose: the record was already removed by someone else; cleanup must
/// still report success.
#[tokio::test]
async fn cleanup_after_external_delete_succeeds() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = manager(&registry, &backend, alpha_spec()).await;
	tunnel.init().await.unwrap();
	registry.remove(NS, "alpha");

	let outcome = tunnel.cleanup(Duration::from_secs(5)).await.unwrap();
	assert_eq!(outcome, RetractOutcome::AlreadyAbsent);
}

#[tokio::test(start_paused = true)]
async fn cleanup_gives_up_at_deadline() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = manager(&registry, &backend, alpha_spec()).await;
	tunnel.init().await.unwrap();
	for _ in 0..10_000 {
		registry.fail_next(
			MockOp::Delete,
			RegistryError::Unavailable {
				message: "connection refused".to_string(),
			},
		);
	}

	let err = tunnel.cleanup(Duration::from_millis(100)).await.unwrap_err();
	assert!(matches!(err, TunnelError::Retract(_)));
	assert!(registry.stored(NS, "alpha").is_some());
}

#[tokio::test]
async fn add_and_remove_keep_device_consistent() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = manager(&registry, &backend, alpha_spec()).await;
	tunnel.init().await.unwrap();

	let beta = remote("beta", &new_key(), "10.2.0.0/16", "192.0.2.2:31820");
	let gamma = remote("gamma", &new_key(), "10.3.0.0/16", "192.0.2.3:31820");
	let delta = remote("delta", &new_key(), "10.4.0.0/16", "");

	assert_eq!(tunnel.add_peer(&beta).await.unwrap(), PeerChange::Added);
	assert_device_matches_connections(&tunnel).await;
	assert_eq!(tunnel.add_peer(&gamma).await.unwrap(), PeerChange::Added);
	assert_eq!(tunnel.add_peer(&delta).await.unwrap(), PeerChange::Added);
	assert_device_matches_connections(&tunnel).await;

	assert_eq!(tunnel.remove_peer("gamma").await.unwrap(), PeerChange::Removed);
	assert_device_matches_connections(&tunnel).await;
	assert_eq!(tunnel.remove_peer("gamma").await.unwrap(), PeerChange::Unchanged);
	assert_eq!(tunnel.remove_peer("beta").await.unwrap(), PeerChange::Removed);
	assert_device_matches_connections(&tunnel).await;

	let connections = tunnel.connections().await;
	assert_eq!(connections.len(), 1);
	assert!(connections.contains_key("delta"));
}

/// Purpose: after the initial configure, every peer change is an incremental
/// delta; a full replace would drop every tunnel in the mesh.
#[tokio::test]
async fn steady_state_never_replaces_the_full_peer_list() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = manager(&registry, &backend, alpha_spec()).await;
	tunnel.init().await.unwrap();
	assert_eq!(backend.full_replace_count(), 1);

	let beta_key = new_key();
	tunnel
		.add_peer(&remote("beta", &beta_key, "10.2.0.0/16", "192.0.2.2:31820"))
		.await
		.unwrap();
	tunnel
		.add_peer(&remote("beta", &beta_key, "10.9.0.0/16", "192.0.2.2:31820"))
		.await
		.unwrap();
	tunnel
		.add_peer(&remote("beta", &new_key(), "10.9.0.0/16", "192.0.2.2:31820"))
		.await
		.unwrap();
	tunnel.init().await.unwrap();
	tunnel.remove_peer("beta").await.unwrap();

	assert_eq!(backend.full_replace_count(), 1);
	assert_eq!(backend.delta_count(), 4);
}

#[tokio::test]
async fn identical_add_skips_the_device() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = manager(&registry, &backend, alpha_spec()).await;
	let beta = remote("beta", &new_key(), "10.2.0.0/16", "192.0.2.2:31820");

	tunnel.add_peer(&beta).await.unwrap();
	assert_eq!(tunnel.add_peer(&beta).await.unwrap(), PeerChange::Unchanged);
	assert_eq!(backend.delta_count(), 1);
}

#[tokio::test]
async fn rotated_key_swaps_peer_in_one_delta() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = manager(&registry, &backend, alpha_spec()).await;
	let old_key = new_key();
	let new = new_key();

	tunnel
		.add_peer(&remote("beta", &old_key, "10.2.0.0/16", "192.0.2.2:31820"))
		.await
		.unwrap();
	let change = tunnel
		.add_peer(&remote("beta", &new, "10.2.0.0/16", "192.0.2.2:31820"))
		.await
		.unwrap();

	assert_eq!(change, PeerChange::Updated);
	assert_eq!(backend.delta_count(), 2);
	assert_eq!(tunnel.configured_peer_keys().await.unwrap(), vec![new]);
	assert_eq!(tunnel.connections().await["beta"].config.public_key, new);
}

#[tokio::test]
async fn changed_cidr_updates_allowed_ips() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = manager(&registry, &backend, alpha_spec()).await;
	let key = new_key();

	tunnel
		.add_peer(&remote("beta", &key, "10.2.0.0/16", "192.0.2.2:31820"))
		.await
		.unwrap();
	let change = tunnel
		.add_peer(&remote("beta", &key, "10.20.0.0/16", "192.0.2.2:31820"))
		.await
		.unwrap();

	assert_eq!(change, PeerChange::Updated);
	let peers = backend.peers(DEFAULT_DEVICE_NAME);
	assert_eq!(peers.len(), 1);
	assert_eq!(peers[0].allowed_ips, vec!["10.20.0.0/16".parse::<IpNet>().unwrap()]);
}

#[tokio::test]
async fn own_record_is_ignored() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = manager(&registry, &backend, alpha_spec()).await;

	let own = remote("alpha", tunnel.public_key(), "10.1.0.0/16", "192.0.2.1:51820");
	assert_eq!(tunnel.add_peer(&own).await.unwrap(), PeerChange::Ignored);
	assert!(tunnel.connections().await.is_empty());
	assert_eq!(backend.delta_count(), 0);
}

#[tokio::test]
async fn failed_device_update_is_not_recorded() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = manager(&registry, &backend, alpha_spec()).await;
	backend.fail_next(MemoryFailure::PeerDelta);

	let beta = remote("beta", &new_key(), "10.2.0.0/16", "192.0.2.2:31820");
	let err = tunnel.add_peer(&beta).await.unwrap_err();

	assert!(matches!(err, TunnelError::Configuration(_)));
	assert!(err.is_transient());
	assert!(tunnel.connections().await.is_empty());
	assert_device_matches_connections(&tunnel).await;

	assert_eq!(tunnel.add_peer(&beta).await.unwrap(), PeerChange::Added);
}

#[tokio::test]
async fn invalid_remote_record_is_rejected() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = manager(&registry, &backend, alpha_spec()).await;

	let mut bad = remote("beta", &new_key(), "10.2.0.0/16", "192.0.2.2:31820");
	bad.spec.public_key = "AAAA".to_string();

	assert!(matches!(
		tunnel.add_peer(&bad).await,
		Err(TunnelError::InvalidPeer { .. })
	));
	assert_eq!(backend.delta_count(), 0);
}

/// Purpose: two records claiming one public key must not share a device
/// peer; removing the impostor would otherwise tear down the real tunnel.
#[tokio::test]
async fn duplicate_public_key_is_rejected() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = manager(&registry, &backend, alpha_spec()).await;
	let key = new_key();

	let beta = remote("beta", &key, "10.2.0.0/16", "192.0.2.2:31820");
	let gamma = remote("gamma", &key, "10.3.0.0/16", "192.0.2.3:31820");

	assert_eq!(tunnel.add_peer(&beta).await.unwrap(), PeerChange::Added);
	let err = tunnel.add_peer(&gamma).await.unwrap_err();
	assert!(matches!(err, TunnelError::InvalidPeer { ref cluster_id, .. } if cluster_id == "gamma"));
	assert!(!err.is_transient());

	assert_eq!(tunnel.remove_peer("gamma").await.unwrap(), PeerChange::Unchanged);
	assert_device_matches_connections(&tunnel).await;

	let connections = tunnel.connections().await;
	assert_eq!(connections.len(), 1);
	assert!(connections.contains_key("beta"));
	let peers = backend.peers(DEFAULT_DEVICE_NAME);
	assert_eq!(peers.len(), 1);
	assert_eq!(peers[0].allowed_ips, vec!["10.2.0.0/16".parse::<IpNet>().unwrap()]);
	assert_eq!(backend.delta_count(), 1);
}

#[tokio::test]
async fn key_freed_by_removal_can_be_reused() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = manager(&registry, &backend, alpha_spec()).await;
	let key = new_key();

	tunnel
		.add_peer(&remote("beta", &key, "10.2.0.0/16", "192.0.2.2:31820"))
		.await
		.unwrap();
	tunnel.remove_peer("beta").await.unwrap();

	let gamma = remote("gamma", &key, "10.3.0.0/16", "192.0.2.3:31820");
	assert_eq!(tunnel.add_peer(&gamma).await.unwrap(), PeerChange::Added);
	assert_device_matches_connections(&tunnel).await;
}

#[tokio::test]
async fn persisted_keys_survive_restart() {
	let dir = tempfile::TempDir::new().unwrap();
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let mut spec = alpha_spec();
	spec.key_dir = Some(dir.path().to_path_buf());

	let first = manager(&registry, &backend, spec.clone()).await;
	first.init().await.unwrap();
	let second = manager(&registry, &backend, spec).await;

	assert_eq!(first.public_key(), second.public_key());
	assert_eq!(second.init().await.unwrap(), ApplyOutcome::Unchanged);
}

#[tokio::test]
async fn watcher_relist_drops_vanished_peers() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = Arc::new(manager(&registry, &backend, alpha_spec()).await);
	tunnel.init().await.unwrap();

	let beta = remote("beta", &new_key(), "10.2.0.0/16", "192.0.2.2:31820");
	let gamma = remote("gamma", &new_key(), "10.3.0.0/16", "192.0.2.3:31820");
	let own = remote("alpha", tunnel.public_key(), "10.1.0.0/16", "192.0.2.1:51820");

	let mut watcher = PeerWatcher::new(Arc::clone(&tunnel));
	watcher.handle(Event::Apply(beta.clone())).await;
	watcher.handle(Event::Apply(gamma)).await;
	assert_eq!(tunnel.connections().await.len(), 2);

	watcher.handle(Event::Init).await;
	watcher.handle(Event::InitApply(own)).await;
	watcher.handle(Event::InitApply(beta.clone())).await;
	watcher.handle(Event::InitDone).await;

	let connections = tunnel.connections().await;
	assert_eq!(connections.len(), 1);
	assert!(connections.contains_key("beta"));
	assert_device_matches_connections(&tunnel).await;

	watcher.handle(Event::Delete(beta)).await;
	assert!(tunnel.connections().await.is_empty());
	assert_device_matches_connections(&tunnel).await;
}

#[tokio::test]
async fn watcher_survives_bad_records() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = Arc::new(manager(&registry, &backend, alpha_spec()).await);

	let mut bad = remote("beta", &new_key(), "10.2.0.0/16", "192.0.2.2:31820");
	bad.spec.pod_cidr = vec!["garbage".to_string()];
	let gamma = remote("gamma", &new_key(), "10.3.0.0/16", "192.0.2.3:31820");

	let mut watcher = PeerWatcher::new(Arc::clone(&tunnel));
	watcher.handle(Event::Apply(bad)).await;
	watcher.handle(Event::Apply(gamma)).await;

	let connections = tunnel.connections().await;
	assert_eq!(connections.len(), 1);
	assert!(connections.contains_key("gamma"));
	assert_eq!(watcher.pending_count(), 0);
}

/// Purpose: a transient device failure must not leave the peer missing until
/// the hub record happens to change again.
#[tokio::test]
async fn watcher_retries_failed_apply() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = Arc::new(manager(&registry, &backend, alpha_spec()).await);
	tunnel.init().await.unwrap();
	backend.fail_next(MemoryFailure::PeerDelta);

	let beta = remote("beta", &new_key(), "10.2.0.0/16", "192.0.2.2:31820");
	let mut watcher = PeerWatcher::new(Arc::clone(&tunnel));
	watcher.handle(Event::Apply(beta)).await;
	assert!(tunnel.connections().await.is_empty());
	assert_eq!(watcher.pending_count(), 1);

	watcher.retry_pending().await;

	assert!(tunnel.connections().await.contains_key("beta"));
	assert_eq!(watcher.pending_count(), 0);
	assert_device_matches_connections(&tunnel).await;
}

#[tokio::test]
async fn watcher_keeps_retrying_until_apply_succeeds() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = Arc::new(manager(&registry, &backend, alpha_spec()).await);
	backend.fail_next(MemoryFailure::PeerDelta);
	backend.fail_next(MemoryFailure::PeerDelta);

	let beta = remote("beta", &new_key(), "10.2.0.0/16", "192.0.2.2:31820");
	let mut watcher = PeerWatcher::new(Arc::clone(&tunnel));
	watcher.handle(Event::Apply(beta)).await;

	watcher.retry_pending().await;
	assert_eq!(watcher.pending_count(), 1);
	assert!(tunnel.connections().await.is_empty());

	watcher.retry_pending().await;
	assert_eq!(watcher.pending_count(), 0);
	assert_eq!(tunnel.connections().await.len(), 1);
}

#[tokio::test]
async fn watcher_retries_failed_removal() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = Arc::new(manager(&registry, &backend, alpha_spec()).await);

	let beta = remote("beta", &new_key(), "10.2.0.0/16", "192.0.2.2:31820");
	let mut watcher = PeerWatcher::new(Arc::clone(&tunnel));
	watcher.handle(Event::Apply(beta.clone())).await;
	backend.fail_next(MemoryFailure::PeerDelta);
	watcher.handle(Event::Delete(beta)).await;
	assert!(tunnel.connections().await.contains_key("beta"));
	assert_eq!(watcher.pending_count(), 1);

	watcher.retry_pending().await;

	assert!(tunnel.connections().await.is_empty());
	assert!(backend.peers(DEFAULT_DEVICE_NAME).is_empty());
	assert_eq!(watcher.pending_count(), 0);
}

/// Purpose: a delete that arrives while an apply is parked wins; the retry
/// must not resurrect the peer.
#[tokio::test]
async fn delete_supersedes_pending_apply() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = Arc::new(manager(&registry, &backend, alpha_spec()).await);
	backend.fail_next(MemoryFailure::PeerDelta);

	let beta = remote("beta", &new_key(), "10.2.0.0/16", "192.0.2.2:31820");
	let mut watcher = PeerWatcher::new(Arc::clone(&tunnel));
	watcher.handle(Event::Apply(beta.clone())).await;
	assert_eq!(watcher.pending_count(), 1);

	watcher.handle(Event::Delete(beta)).await;
	assert_eq!(watcher.pending_count(), 0);

	watcher.retry_pending().await;
	assert!(tunnel.connections().await.is_empty());
	assert!(backend.peers(DEFAULT_DEVICE_NAME).is_empty());
}

#[tokio::test]
async fn relist_drops_pending_apply_for_vanished_peer() {
	let registry = MockPeerRegistry::new();
	let backend = MemoryBackend::new();
	let tunnel = Arc::new(manager(&registry, &backend, alpha_spec()).await);
	backend.fail_next(MemoryFailure::PeerDelta);

	let beta = remote("beta", &new_key(), "10.2.0.0/16", "192.0.2.2:31820");
	let mut watcher = PeerWatcher::new(Arc::clone(&tunnel));
	watcher.handle(Event::Apply(beta)).await;
	assert_eq!(watcher.pending_count(), 1);

	watcher.handle(Event::Init).await;
	watcher.handle(Event::InitDone).await;

	assert_eq!(watcher.pending_count(), 0);
	watcher.retry_pending().await;
	assert!(tunnel.connections().await.is_empty());
}
