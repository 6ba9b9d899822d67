// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One cluster's tunnel identity, stored in the hub's share namespace under
/// the cluster id.
///
/// Only the owning cluster writes its own record; every other agent treats
/// it as read-only.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[kube(group = "octopus.io", version = "v1alpha1", kind = "Peer", namespaced)]
#[serde(rename_all = "camelCase")]
pub struct PeerSpec {
	#[serde(rename = "clusterID")]
	pub cluster_id: String,
	/// Pod networks reachable through this cluster.
	#[serde(rename = "podCIDR", default)]
	pub pod_cidr: Vec<String>,
	/// `host:port` other clusters dial.
	#[serde(default)]
	pub endpoint: String,
	#[serde(default)]
	pub is_hub: bool,
	/// Base64 WireGuard public key.
	#[serde(default)]
	pub public_key: String,
}

impl PeerSpec {
	/// Whether `self` (what is stored) must be rewritten to become `desired`.
	///
	/// `is_hub` is not compared.
	pub fn needs_resync(&self, desired: &PeerSpec) -> bool {
		self.cluster_id != desired.cluster_id
			|| self.pod_cidr != desired.pod_cidr
			|| self.endpoint != desired.endpoint
			|| self.public_key != desired.public_key
	}

	/// Copy the fields this agent owns onto a fetched record.
	pub fn overwrite_owned_fields(&mut self, desired: &PeerSpec) {
		self.cluster_id = desired.cluster_id.clone();
		self.pod_cidr = desired.pod_cidr.clone();
		self.endpoint = desired.endpoint.clone();
		self.public_key = desired.public_key.clone();
	}
}

impl Peer {
	/// A record named after its cluster id in `namespace`.
	pub fn for_cluster(namespace: &str, spec: PeerSpec) -> Self {
		let name = spec.cluster_id.clone();
		let mut peer = Peer::new(&name, spec);
		peer.metadata.namespace = Some(namespace.to_string());
		peer
	}
}
