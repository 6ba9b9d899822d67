// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::keys::{WgPresharedKey, WgPublicKey};
use ipnet::IpNet;
use std::net::SocketAddr;

/// One remote cluster as the WireGuard device sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
	pub public_key: WgPublicKey,
	pub preshared_key: Option<WgPresharedKey>,
	pub endpoint: Option<SocketAddr>,
	pub allowed_ips: Vec<IpNet>,
	pub persistent_keepalive: Option<u16>,
}

impl PeerConfig {
	pub fn new(public_key: WgPublicKey) -> Self {
		Self {
			public_key,
			preshared_key: None,
			endpoint: None,
			allowed_ips: Vec::new(),
			persistent_keepalive: None,
		}
	}

	pub fn with_allowed_ip(mut self, net: IpNet) -> Self {
		self.allowed_ips.push(net);
		self
	}

	pub fn with_allowed_ips(mut self, nets: Vec<IpNet>) -> Self {
		self.allowed_ips = nets;
		self
	}

	pub fn with_endpoint(mut self, endpoint: SocketAddr) -> Self {
		self.endpoint = Some(endpoint);
		self
	}

	pub fn with_preshared_key(mut self, key: WgPresharedKey) -> Self {
		self.preshared_key = Some(key);
		self
	}

	pub fn with_persistent_keepalive(mut self, seconds: u16) -> Self {
		self.persistent_keepalive = Some(seconds);
		self
	}
}

/// Incremental change to a device's peer list.
///
/// An entry in `added` whose key is already programmed replaces that peer's
/// endpoint and allowed IPs; it never touches other peers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerDelta {
	pub added: Vec<PeerConfig>,
	pub removed: Vec<WgPublicKey>,
}

impl PeerDelta {
	pub fn new(added: Vec<PeerConfig>, removed: Vec<WgPublicKey>) -> Self {
		Self { added, removed }
	}

	pub fn add(config: PeerConfig) -> Self {
		Self {
			added: vec![config],
			removed: Vec::new(),
		}
	}

	pub fn remove(key: WgPublicKey) -> Self {
		Self {
			added: Vec::new(),
			removed: vec![key],
		}
	}

	pub fn is_empty(&self) -> bool {
		self.added.is_empty() && self.removed.is_empty()
	}
}
