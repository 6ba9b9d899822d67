// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Result type alias for Peer registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Classified outcome of a failed registry call.
#[derive(Error, Debug)]
pub enum RegistryError {
	#[error("peer {name} already exists")]
	AlreadyExists { name: String },

	#[error("peer {name} was modified concurrently")]
	Conflict { name: String },

	#[error("peer {name} not found")]
	NotFound { name: String },

	#[error("hub registry unavailable: {message}")]
	Unavailable { message: String },
}

impl RegistryError {
	/// Classify a kube error for the object `name`.
	///
	/// The API server answers 409 both for creating an existing object and for
	/// a stale resourceVersion; only the status reason tells them apart.
	pub fn from_kube(err: kube::Error, name: &str) -> Self {
		match err {
			kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
				Self::AlreadyExists { name: name.into() }
			}
			kube::Error::Api(ae) if ae.code == 409 => Self::Conflict { name: name.into() },
			kube::Error::Api(ae) if ae.code == 404 => Self::NotFound { name: name.into() },
			other => Self::Unavailable {
				message: other.to_string(),
			},
		}
	}

	pub fn is_conflict(&self) -> bool {
		matches!(self, Self::Conflict { .. })
	}

	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound { .. })
	}
}

/// Result type alias for hub access setup.
pub type K8sResult<T> = Result<T, K8sError>;

/// Errors that can occur while building a client for the hub.
#[derive(Error, Debug)]
pub enum K8sError {
	#[error("K8s API error: {message}")]
	ApiError { message: String },

	#[error("hub credentials secret {namespace}/{name} not found")]
	SecretNotFound { namespace: String, name: String },

	#[error("hub credentials secret is missing key {key}")]
	MissingSecretKey { key: String },

	#[error("invalid hub URL {url}: {message}")]
	InvalidHubUrl { url: String, message: String },

	#[error("invalid hub kubeconfig: {message}")]
	Kubeconfig { message: String },
}

impl From<kube::Error> for K8sError {
	fn from(err: kube::Error) -> Self {
		K8sError::ApiError {
			message: err.to_string(),
		}
	}
}
