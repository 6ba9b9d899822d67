// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;
use tracing::debug;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

pub const KEY_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum KeyError {
	#[error("invalid key length: expected 32 bytes, got {0}")]
	InvalidLength(usize),

	#[error("invalid base64 encoding: {0}")]
	InvalidBase64(#[from] base64::DecodeError),

	#[error("random source unavailable: {0}")]
	Rng(#[from] rand::Error),
}

pub type Result<T> = std::result::Result<T, KeyError>;

fn random_bytes() -> Result<[u8; KEY_LEN]> {
	let mut bytes = [0u8; KEY_LEN];
	OsRng.try_fill_bytes(&mut bytes)?;
	Ok(bytes)
}

fn decode_key(s: &str) -> Result<[u8; KEY_LEN]> {
	let bytes = Zeroizing::new(STANDARD.decode(s.trim())?);
	if bytes.len() != KEY_LEN {
		return Err(KeyError::InvalidLength(bytes.len()));
	}
	let mut arr = [0u8; KEY_LEN];
	arr.copy_from_slice(&bytes);
	Ok(arr)
}

/// Curve25519 private key, clamped the same way `wg genkey` does.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct WgPrivateKey {
	bytes: [u8; KEY_LEN],
}

impl WgPrivateKey {
	pub fn generate() -> Result<Self> {
		Ok(Self::from_bytes(random_bytes()?))
	}

	pub fn from_bytes(mut bytes: [u8; KEY_LEN]) -> Self {
		bytes[0] &= 248;
		bytes[31] &= 127;
		bytes[31] |= 64;
		Self { bytes }
	}

	pub fn from_base64(s: &str) -> Result<Self> {
		Ok(Self::from_bytes(decode_key(s)?))
	}

	pub fn to_base64(&self) -> Zeroizing<String> {
		Zeroizing::new(STANDARD.encode(self.bytes))
	}

	pub fn public_key(&self) -> WgPublicKey {
		let secret = StaticSecret::from(self.bytes);
		let public = PublicKey::from(&secret);
		WgPublicKey {
			bytes: *public.as_bytes(),
		}
	}

	pub fn expose_bytes(&self) -> &[u8; KEY_LEN] {
		&self.bytes
	}
}

impl fmt::Debug for WgPrivateKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("WgPrivateKey([REDACTED])")
	}
}

impl fmt::Display for WgPrivateKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("[REDACTED]")
	}
}

impl Serialize for WgPrivateKey {
	fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str("[REDACTED]")
	}
}

/// Symmetric key mixed into the handshake of a single peer.
#[derive(Clone, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
pub struct WgPresharedKey {
	bytes: [u8; KEY_LEN],
}

impl WgPresharedKey {
	pub fn generate() -> Result<Self> {
		Ok(Self {
			bytes: random_bytes()?,
		})
	}

	pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
		Self { bytes }
	}

	pub fn from_base64(s: &str) -> Result<Self> {
		Ok(Self {
			bytes: decode_key(s)?,
		})
	}

	pub fn to_base64(&self) -> Zeroizing<String> {
		Zeroizing::new(STANDARD.encode(self.bytes))
	}

	pub fn expose_bytes(&self) -> &[u8; KEY_LEN] {
		&self.bytes
	}
}

impl fmt::Debug for WgPresharedKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("WgPresharedKey([REDACTED])")
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WgPublicKey {
	bytes: [u8; KEY_LEN],
}

impl WgPublicKey {
	pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
		Self { bytes }
	}

	/// Parses the padded standard base64 form used by `wg` and by the
	/// `publicKey` field of a Peer record.
	pub fn from_base64(s: &str) -> Result<Self> {
		Ok(Self {
			bytes: decode_key(s)?,
		})
	}

	pub fn to_base64(&self) -> String {
		STANDARD.encode(self.bytes)
	}

	pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
		&self.bytes
	}
}

impl fmt::Debug for WgPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		// Enough to tell peers apart in logs.
		write!(f, "WgPublicKey({}..)", &self.to_base64()[..8])
	}
}

impl fmt::Display for WgPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_base64())
	}
}

impl std::str::FromStr for WgPublicKey {
	type Err = KeyError;

	fn from_str(s: &str) -> Result<Self> {
		Self::from_base64(s)
	}
}

impl Serialize for WgPublicKey {
	fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.to_base64())
	}
}

impl<'de> Deserialize<'de> for WgPublicKey {
	fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Self::from_base64(&s).map_err(serde::de::Error::custom)
	}
}

/// The private/public/pre-shared key triple identifying this cluster.
///
/// The public key is always derived from the private key, so the pair can
/// never disagree. The private half only leaves this type through
/// [`KeyMaterial::private_key`], which the device controller hands to the
/// kernel.
#[derive(Clone)]
pub struct KeyMaterial {
	private: WgPrivateKey,
	public: WgPublicKey,
	preshared: WgPresharedKey,
}

impl KeyMaterial {
	/// Draws a fresh identity from the operating system's random source.
	pub fn generate() -> Result<Self> {
		let private = WgPrivateKey::generate()?;
		let preshared = WgPresharedKey::generate()?;
		let material = Self::from_parts(private, preshared);
		debug!(public_key = %material.public, "generated WireGuard key material");
		Ok(material)
	}

	pub fn from_parts(private: WgPrivateKey, preshared: WgPresharedKey) -> Self {
		let public = private.public_key();
		Self {
			private,
			public,
			preshared,
		}
	}

	pub fn private_key(&self) -> &WgPrivateKey {
		&self.private
	}

	pub fn public_key(&self) -> &WgPublicKey {
		&self.public
	}

	pub fn preshared_key(&self) -> &WgPresharedKey {
		&self.preshared
	}
}

impl fmt::Debug for KeyMaterial {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("KeyMaterial")
			.field("private", &self.private)
			.field("public", &self.public)
			.field("preshared", &self.preshared)
			.finish()
	}
}
