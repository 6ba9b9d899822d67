// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use futures::TryStreamExt;
use octopus_wgtunnel_common::{PeerConfig, PeerDelta, WgPublicKey};
use netlink_packet_route::link::{InfoKind, LinkAttribute, LinkInfo, LinkMessage};
use rtnetlink::Handle;
use tracing::{debug, instrument, warn};
use wireguard_control::{Backend, Device, DeviceUpdate, InterfaceName, Key, PeerConfigBuilder};

use crate::backend::{DeviceConfig, LinkHandle, WgBackend};
use crate::error::{DeviceError, LinkCreateKind, Result};

/// Kernel WireGuard through rtnetlink and the `wireguard` genetlink family.
///
/// Requires `CAP_NET_ADMIN`. The genetlink calls are blocking and run on the
/// blocking pool.
#[derive(Clone)]
pub struct KernelBackend {
	handle: Handle,
}

impl KernelBackend {
	/// Opens an rtnetlink socket. Must be called inside a tokio runtime.
	pub fn new() -> std::io::Result<Self> {
		let (connection, handle, _) = rtnetlink::new_connection()?;
		tokio::spawn(connection);
		Ok(Self { handle })
	}

	async fn find_link(&self, name: &str) -> std::result::Result<Option<LinkMessage>, rtnetlink::Error> {
		let mut links = self
			.handle
			.link()
			.get()
			.match_name(name.to_string())
			.execute();
		match links.try_next().await {
			Ok(found) => Ok(found),
			Err(rtnetlink::Error::NetlinkError(e)) if e.raw_code() == -libc::ENODEV => Ok(None),
			Err(e) => Err(e),
		}
	}
}

impl std::fmt::Debug for KernelBackend {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("KernelBackend").finish_non_exhaustive()
	}
}

fn is_wireguard(link: &LinkMessage) -> bool {
	link.attributes.iter().any(|attr| match attr {
		LinkAttribute::LinkInfo(info) => info
			.iter()
			.any(|i| matches!(i, LinkInfo::Kind(InfoKind::Wireguard))),
		_ => false,
	})
}

fn classify_link_error(err: &rtnetlink::Error) -> LinkCreateKind {
	match err {
		rtnetlink::Error::NetlinkError(e) => {
			let code = -e.raw_code();
			if code == libc::EPERM || code == libc::EACCES {
				LinkCreateKind::PermissionDenied
			} else if code == libc::EOPNOTSUPP || code == libc::ENODEV || code == libc::ENOENT {
				LinkCreateKind::ModuleMissing
			} else {
				LinkCreateKind::Other
			}
		}
		_ => LinkCreateKind::Other,
	}
}

fn interface_name(name: &str) -> Result<InterfaceName> {
	name
		.parse()
		.map_err(|e| DeviceError::DeviceConfig {
			name: name.to_string(),
			message: format!("invalid interface name: {e}"),
		})
}

fn wg_key(bytes: &[u8; 32]) -> Key {
	Key(*bytes)
}

fn peer_builder(peer: &PeerConfig) -> PeerConfigBuilder {
	let mut builder = PeerConfigBuilder::new(&wg_key(peer.public_key.as_bytes())).replace_allowed_ips();
	for net in &peer.allowed_ips {
		builder = builder.add_allowed_ip(net.addr(), net.prefix_len());
	}
	if let Some(endpoint) = peer.endpoint {
		builder = builder.set_endpoint(endpoint);
	}
	if let Some(secs) = peer.persistent_keepalive {
		builder = builder.set_persistent_keepalive_interval(secs);
	}
	if let Some(psk) = &peer.preshared_key {
		builder = builder.set_preshared_key(wg_key(psk.expose_bytes()));
	}
	builder
}

async fn apply_update(name: &str, update: DeviceUpdate) -> Result<()> {
	let iface = interface_name(name)?;
	let owned = name.to_string();
	tokio::task::spawn_blocking(move || update.apply(&iface, Backend::Kernel))
		.await
		.map_err(|e| DeviceError::DeviceConfig {
			name: owned.clone(),
			message: e.to_string(),
		})?
		.map_err(|e| DeviceError::DeviceConfig {
			name: owned,
			message: e.to_string(),
		})
}

#[async_trait]
impl WgBackend for KernelBackend {
	#[instrument(skip(self))]
	async fn create_link(&self, name: &str) -> Result<LinkHandle> {
		let lookup_err = |e: rtnetlink::Error| DeviceError::LinkCreate {
			name: name.to_string(),
			kind: classify_link_error(&e),
			message: e.to_string(),
		};

		if let Some(existing) = self.find_link(name).await.map_err(lookup_err)? {
			let index = existing.header.index;
			if !is_wireguard(&existing) {
				warn!(index, "a non-WireGuard link already holds the device name");
				return Err(DeviceError::LinkCreate {
					name: name.to_string(),
					kind: LinkCreateKind::Other,
					message: format!("link {name} exists and is not a WireGuard device"),
				});
			}
			debug!(index, "reusing existing link");
			return Ok(LinkHandle {
				name: name.to_string(),
				index,
			});
		}

		self
			.handle
			.link()
			.add()
			.wireguard(name.to_string())
			.execute()
			.await
			.map_err(|e| {
				let kind = classify_link_error(&e);
				warn!(%kind, error = %e, "failed to create WireGuard link");
				DeviceError::LinkCreate {
					name: name.to_string(),
					kind,
					message: e.to_string(),
				}
			})?;

		let index = self
			.find_link(name)
			.await
			.map_err(lookup_err)?
			.ok_or_else(|| DeviceError::LinkNotFound(name.to_string()))?
			.header
			.index;
		Ok(LinkHandle {
			name: name.to_string(),
			index,
		})
	}

	#[instrument(skip(self, config), fields(peers = config.peers.len()))]
	async fn configure(&self, name: &str, config: &DeviceConfig) -> Result<()> {
		let mut update = DeviceUpdate::new()
			.set_private_key(wg_key(config.private_key.expose_bytes()))
			.set_listen_port(config.listen_port);
		if config.replace_peers {
			update = update.replace_peers();
		}
		let peers: Vec<PeerConfigBuilder> = config.peers.iter().map(peer_builder).collect();
		update = update.add_peers(&peers);

		apply_update(name, update).await
	}

	#[instrument(skip(self), fields(name = %link.name))]
	async fn set_up(&self, link: &LinkHandle) -> Result<()> {
		self
			.handle
			.link()
			.set(link.index)
			.up()
			.execute()
			.await
			.map_err(|e| DeviceError::LinkUp {
				name: link.name.clone(),
				message: e.to_string(),
			})
	}

	#[instrument(skip(self, delta), fields(added = delta.added.len(), removed = delta.removed.len()))]
	async fn apply_peer_delta(&self, name: &str, delta: &PeerDelta) -> Result<()> {
		let mut update = DeviceUpdate::new();
		for key in &delta.removed {
			update = update.remove_peer_by_key(&wg_key(key.as_bytes()));
		}
		let peers: Vec<PeerConfigBuilder> = delta.added.iter().map(peer_builder).collect();
		update = update.add_peers(&peers);

		apply_update(name, update).await
	}

	async fn configured_peers(&self, name: &str) -> Result<Vec<WgPublicKey>> {
		let iface = interface_name(name)?;
		let owned = name.to_string();
		let device = tokio::task::spawn_blocking(move || Device::get(&iface, Backend::Kernel))
			.await
			.map_err(|e| DeviceError::DeviceConfig {
				name: owned.clone(),
				message: e.to_string(),
			})?
			.map_err(|e| {
				if e.kind() == std::io::ErrorKind::NotFound {
					DeviceError::LinkNotFound(owned.clone())
				} else {
					DeviceError::DeviceConfig {
						name: owned.clone(),
						message: e.to_string(),
					}
				}
			})?;

		Ok(device
			.peers
			.iter()
			.map(|p| WgPublicKey::from_bytes(p.config.public_key.0))
			.collect())
	}
}
