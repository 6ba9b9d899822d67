// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared WireGuard types for the octopus cluster mesh.
//!
//! Holds the local key material (private, public and pre-shared keys), the
//! optional on-disk persistence of that material, and the device-level
//! [`PeerConfig`] that the device controller programs into the kernel.

pub mod keys;
pub mod keys_file;
pub mod peer;

pub use keys::{KeyError, KeyMaterial, WgPresharedKey, WgPrivateKey, WgPublicKey};
pub use keys_file::{
	load_key_material, load_or_generate_key_material, save_key_material, KeyFileError,
	PRESHARED_KEY_FILENAME, PRIVATE_KEY_FILENAME,
};
pub use peer::{PeerConfig, PeerDelta};

/// Name of the WireGuard interface owned by the agent.
pub const DEFAULT_DEVICE_NAME: &str = "octopus";

/// UDP port the WireGuard device listens on.
pub const UDP_PORT: u16 = 31820;

/// Keepalive applied to every remote cluster peer, in seconds.
pub const PERSISTENT_KEEPALIVE_SECS: u16 = 25;
