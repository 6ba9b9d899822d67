// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use octopus_k8s::RegistryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplyError {
	/// Every update attempt lost an optimistic-concurrency race.
	#[error("gave up publishing peer {name} after {attempts} conflicting updates: {last}")]
	ConflictBudgetExhausted {
		name: String,
		attempts: u32,
		#[source]
		last: RegistryError,
	},

	#[error(transparent)]
	Registry(#[from] RegistryError),
}

#[derive(Debug, Error)]
pub enum RetractError {
	#[error("deleting peer {name} did not finish within {timeout:?}")]
	DeadlineExceeded {
		name: String,
		timeout: Duration,
		#[source]
		last: Option<RegistryError>,
	},

	#[error("gave up deleting peer {name} after {attempts} attempts: {last}")]
	RetriesExhausted {
		name: String,
		attempts: u32,
		#[source]
		last: RegistryError,
	},

	#[error("deleting peer {name} was cancelled")]
	Cancelled {
		name: String,
		#[source]
		last: Option<RegistryError>,
	},
}

impl RetractError {
	/// The last error the registry returned, if any attempt completed.
	pub fn last_error(&self) -> Option<&RegistryError> {
		match self {
			Self::DeadlineExceeded { last, .. } | Self::Cancelled { last, .. } => last.as_ref(),
			Self::RetriesExhausted { last, .. } => Some(last),
		}
	}
}
