// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::keys::{KeyMaterial, WgPresharedKey, WgPrivateKey};
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::{info, instrument};

pub const PRIVATE_KEY_FILENAME: &str = "private.key";
pub const PRESHARED_KEY_FILENAME: &str = "preshared.key";

#[derive(Error, Debug)]
pub enum KeyFileError {
	#[error("failed to access key file: {0}")]
	Io(#[from] std::io::Error),

	#[error("invalid key: {0}")]
	Key(#[from] crate::keys::KeyError),
}

pub type Result<T> = std::result::Result<T, KeyFileError>;

#[instrument(skip_all, fields(dir = %dir.as_ref().display()))]
pub async fn load_key_material(dir: impl AsRef<Path>) -> Result<KeyMaterial> {
	let dir = dir.as_ref();
	let private = fs::read_to_string(dir.join(PRIVATE_KEY_FILENAME)).await?;
	let preshared = fs::read_to_string(dir.join(PRESHARED_KEY_FILENAME)).await?;
	let private = WgPrivateKey::from_base64(private.trim())?;
	let preshared = WgPresharedKey::from_base64(preshared.trim())?;
	Ok(KeyMaterial::from_parts(private, preshared))
}

async fn write_key_file(path: &Path, content: &str) -> Result<()> {
	#[cfg(unix)]
	{
		use tokio::fs::OpenOptions;
		use tokio::io::AsyncWriteExt;

		let mut file = OpenOptions::new()
			.write(true)
			.create(true)
			.truncate(true)
			.mode(0o600)
			.open(path)
			.await?;
		file.write_all(content.as_bytes()).await?;
		file.flush().await?;
	}

	#[cfg(not(unix))]
	{
		fs::write(path, content).await?;
	}

	Ok(())
}

#[instrument(skip(keys), fields(dir = %dir.as_ref().display()))]
pub async fn save_key_material(keys: &KeyMaterial, dir: impl AsRef<Path>) -> Result<()> {
	let dir = dir.as_ref();
	fs::create_dir_all(dir).await?;

	let private = keys.private_key().to_base64();
	write_key_file(
		&dir.join(PRIVATE_KEY_FILENAME),
		&format!("{}\n", private.as_str()),
	)
	.await?;

	let preshared = keys.preshared_key().to_base64();
	write_key_file(
		&dir.join(PRESHARED_KEY_FILENAME),
		&format!("{}\n", preshared.as_str()),
	)
	.await?;

	Ok(())
}

/// Reuses the identity stored in `dir`, creating one on first start.
///
/// A stable identity means remote clusters keep trusting our public key
/// across agent restarts.
#[instrument(skip_all, fields(dir = %dir.as_ref().display()))]
pub async fn load_or_generate_key_material(dir: impl AsRef<Path>) -> Result<KeyMaterial> {
	let dir = dir.as_ref();

	if dir.join(PRIVATE_KEY_FILENAME).exists() && dir.join(PRESHARED_KEY_FILENAME).exists() {
		let keys = load_key_material(dir).await?;
		info!(public_key = %keys.public_key(), "loaded persisted WireGuard key material");
		return Ok(keys);
	}

	let keys = KeyMaterial::generate()?;
	save_key_material(&keys, dir).await?;
	info!(public_key = %keys.public_key(), "persisted new WireGuard key material");
	Ok(keys)
}
