// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

use ipnet::IpNet;
use octopus_k8s::PeerSpec;
use octopus_wgtunnel_common::WgPublicKey;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_NAMESPACE: &str = "syncer-operator";

fn validate_https_url(url: &Url) -> Result<(), ConfigError> {
	if url.scheme() != "https" {
		return Err(ConfigError::Parse(
			"hub URL must use https://".to_string(),
		));
	}
	Ok(())
}

/// Checks `host:port` shape without resolving the host.
fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
	let (host, port) = endpoint
		.rsplit_once(':')
		.ok_or_else(|| ConfigError::Parse(format!("endpoint {endpoint} must be host:port")))?;
	let host = host.trim_start_matches('[').trim_end_matches(']');
	if host.is_empty() {
		return Err(ConfigError::Parse(format!("endpoint {endpoint} has no host")));
	}
	port
		.parse::<u16>()
		.map_err(|e| ConfigError::Parse(format!("invalid port in endpoint {endpoint}: {e}")))?;
	Ok(())
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
	match value.trim().to_lowercase().as_str() {
		"1" | "true" | "yes" => Ok(true),
		"" | "0" | "false" | "no" => Ok(false),
		other => Err(ConfigError::Parse(format!("invalid {name}: {other}"))),
	}
}

/// Which side of the hub this agent sits on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
	/// This cluster hosts the shared Peer collection.
	Hub,
	/// Reaches the hub through credentials resolved at startup.
	Spoke { hub_url: Url },
}

/// Process-wide configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Specification {
	pub cluster_id: String,
	pub local_namespace: String,
	pub share_namespace: String,
	pub role: Role,
	pub cidr: Vec<IpNet>,
	/// `host:port` other clusters dial. `None` for clusters that only dial out.
	pub endpoint: Option<String>,
	/// Where to keep key material across restarts. `None` regenerates keys on
	/// every start.
	pub key_dir: Option<PathBuf>,
}

impl Specification {
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_vars(|name| std::env::var(name).ok())
	}

	/// Build from an arbitrary variable source, for tests.
	pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let cluster_id = lookup("OCTOPUS_CLUSTER_ID")
			.filter(|s| !s.trim().is_empty())
			.ok_or_else(|| ConfigError::MissingEnv("OCTOPUS_CLUSTER_ID".to_string()))?;

		let local_namespace =
			lookup("OCTOPUS_LOCAL_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
		let share_namespace =
			lookup("OCTOPUS_SHARE_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

		let is_hub = match lookup("OCTOPUS_IS_HUB") {
			Some(v) => parse_bool("OCTOPUS_IS_HUB", &v)?,
			None => false,
		};

		let role = if is_hub {
			Role::Hub
		} else {
			let hub_url: Url = lookup("OCTOPUS_HUB_URL")
				.ok_or_else(|| ConfigError::MissingEnv("OCTOPUS_HUB_URL".to_string()))?
				.parse()
				.map_err(|e| ConfigError::Parse(format!("invalid OCTOPUS_HUB_URL: {e}")))?;
			validate_https_url(&hub_url)?;
			Role::Spoke { hub_url }
		};

		let cidr = lookup("OCTOPUS_CIDR")
			.unwrap_or_default()
			.split(',')
			.map(str::trim)
			.filter(|s| !s.is_empty())
			.map(|s| {
				s.parse::<IpNet>()
					.map_err(|e| ConfigError::Parse(format!("invalid CIDR {s}: {e}")))
			})
			.collect::<Result<Vec<_>, _>>()?;

		let endpoint = lookup("OCTOPUS_ENDPOINT").filter(|s| !s.trim().is_empty());
		if let Some(endpoint) = &endpoint {
			validate_endpoint(endpoint)?;
		}

		let key_dir = lookup("OCTOPUS_KEY_DIR")
			.filter(|s| !s.is_empty())
			.map(PathBuf::from);

		Ok(Self {
			cluster_id,
			local_namespace,
			share_namespace,
			role,
			cidr,
			endpoint,
			key_dir,
		})
	}

	pub fn is_hub(&self) -> bool {
		matches!(self.role, Role::Hub)
	}

	/// This cluster's own Peer record content.
	pub fn peer_spec(&self, public_key: &WgPublicKey) -> PeerSpec {
		PeerSpec {
			cluster_id: self.cluster_id.clone(),
			pod_cidr: self.cidr.iter().map(ToString::to_string).collect(),
			endpoint: self.endpoint.clone().unwrap_or_default(),
			is_hub: self.is_hub(),
			public_key: public_key.to_base64(),
		}
	}
}
