// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use octopus_k8s::RegistryError;
use octopus_peer_registry::{ApplyError, RetractError};
use octopus_wgtunnel_common::{KeyError, KeyFileError};
use octopus_wgtunnel_device::DeviceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("missing environment variable: {0}")]
	MissingEnv(String),

	#[error("parse error: {0}")]
	Parse(String),
}

#[derive(Debug, Error)]
pub enum TunnelError {
	/// The local device could not be brought into shape. Fatal at startup.
	#[error("WireGuard device error: {0}")]
	Configuration(#[from] DeviceError),

	#[error("key generation failed: {0}")]
	Crypto(#[from] KeyError),

	#[error("key material unavailable: {0}")]
	KeyStore(#[from] KeyFileError),

	/// Lost every optimistic-concurrency race within the retry budget.
	#[error("hub registry conflict: {0}")]
	RegistryConflict(#[source] ApplyError),

	#[error("hub registry unavailable: {0}")]
	RegistryUnavailable(#[source] RegistryError),

	#[error("failed to retract peer record: {0}")]
	Retract(#[from] RetractError),

	#[error("invalid peer {cluster_id}: {message}")]
	InvalidPeer { cluster_id: String, message: String },

	#[error("cannot resolve endpoint {endpoint} of peer {cluster_id}: {message}")]
	Resolve {
		cluster_id: String,
		endpoint: String,
		message: String,
	},

	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),
}

impl From<ApplyError> for TunnelError {
	fn from(err: ApplyError) -> Self {
		match err {
			ApplyError::Registry(e) => TunnelError::RegistryUnavailable(e),
			e @ ApplyError::ConflictBudgetExhausted { .. } => TunnelError::RegistryConflict(e),
		}
	}
}

impl TunnelError {
	/// Whether the next reconciliation pass may succeed where this one failed.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Configuration(e) => e.is_retryable(),
			Self::RegistryConflict(_) | Self::RegistryUnavailable(_) | Self::Resolve { .. } => true,
			Self::Retract(_) => true,
			Self::Crypto(_) | Self::KeyStore(_) | Self::InvalidPeer { .. } | Self::Config(_) => false,
		}
	}
}

pub type Result<T> = std::result::Result<T, TunnelError>;
