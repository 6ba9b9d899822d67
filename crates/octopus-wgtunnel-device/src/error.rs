// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::controller::DeviceState;
use thiserror::Error;

/// Why a link could not be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCreateKind {
	/// The process lacks `CAP_NET_ADMIN`.
	PermissionDenied,
	/// The kernel has no WireGuard support loaded.
	ModuleMissing,
	Other,
}

impl std::fmt::Display for LinkCreateKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::PermissionDenied => write!(f, "permission denied"),
			Self::ModuleMissing => write!(f, "wireguard kernel module not available"),
			Self::Other => write!(f, "link creation failed"),
		}
	}
}

#[derive(Debug, Error)]
pub enum DeviceError {
	#[error("failed to create link {name}: {kind}: {message}")]
	LinkCreate {
		name: String,
		kind: LinkCreateKind,
		message: String,
	},

	#[error("link {0} not found")]
	LinkNotFound(String),

	#[error("failed to configure WireGuard device {name}: {message}")]
	DeviceConfig { name: String, message: String },

	#[error("failed to bring up link {name}: {message}")]
	LinkUp { name: String, message: String },

	#[error("cannot {op} while device is {state}")]
	InvalidState { state: DeviceState, op: &'static str },

	#[error("refusing full peer replace: {0} remote peers are configured")]
	DestructiveResync(usize),
}

impl DeviceError {
	/// Permission and missing-module failures will not fix themselves.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::LinkCreate { kind, .. } => *kind == LinkCreateKind::Other,
			Self::InvalidState { .. } | Self::DestructiveResync(_) => false,
			Self::LinkNotFound(_) | Self::DeviceConfig { .. } | Self::LinkUp { .. } => true,
		}
	}
}

pub type Result<T> = std::result::Result<T, DeviceError>;
