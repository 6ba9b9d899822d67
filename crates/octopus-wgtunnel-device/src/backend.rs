// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use octopus_wgtunnel_common::{PeerConfig, PeerDelta, WgPrivateKey, WgPublicKey};

use crate::error::Result;

/// A network link the backend created or found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkHandle {
	pub name: String,
	pub index: u32,
}

/// Full device configuration, applied with replace-all semantics when
/// `replace_peers` is set.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
	pub private_key: WgPrivateKey,
	pub listen_port: u16,
	pub replace_peers: bool,
	pub peers: Vec<PeerConfig>,
}

/// Kernel-facing operations on a WireGuard device.
///
/// Implementations perform no bookkeeping of their own beyond what the
/// kernel (or fake) holds; ordering and state checks live in
/// [`DeviceController`](crate::DeviceController).
#[async_trait]
pub trait WgBackend: Send + Sync {
	/// Create the WireGuard link `name`, or return the existing one.
	async fn create_link(&self, name: &str) -> Result<LinkHandle>;

	/// Apply private key, listen port and (optionally replaced) peer list.
	async fn configure(&self, name: &str, config: &DeviceConfig) -> Result<()>;

	/// Set the link administratively up. Calling this on an up link is a no-op.
	async fn set_up(&self, link: &LinkHandle) -> Result<()>;

	/// Add, update and remove individual peers without touching the rest.
	async fn apply_peer_delta(&self, name: &str, delta: &PeerDelta) -> Result<()>;

	/// Public keys of the peers currently programmed into the device.
	async fn configured_peers(&self, name: &str) -> Result<Vec<WgPublicKey>>;
}
