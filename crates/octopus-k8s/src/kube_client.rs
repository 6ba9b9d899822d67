// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use kube::{
	api::{Api, DeleteParams, PostParams},
	Client, ResourceExt,
};
use tracing::{debug, instrument};

use crate::client::PeerRegistry;
use crate::crd::Peer;
use crate::error::{K8sError, RegistryError, RegistryResult};

/// Production registry backed by the hub's API server.
#[derive(Clone)]
pub struct KubePeerRegistry {
	client: Client,
}

impl KubePeerRegistry {
	pub fn new(client: Client) -> Self {
		Self { client }
	}

	/// Create a registry that auto-discovers cluster configuration.
	pub async fn try_default() -> Result<Self, K8sError> {
		let client = Client::try_default().await?;
		debug!("K8s client initialized");
		Ok(Self { client })
	}

	pub fn client(&self) -> &Client {
		&self.client
	}

	fn api(&self, namespace: &str) -> Api<Peer> {
		Api::namespaced(self.client.clone(), namespace)
	}
}

#[async_trait]
impl PeerRegistry for KubePeerRegistry {
	#[instrument(skip(self, peer), fields(peer = %peer.name_any()))]
	async fn create(&self, namespace: &str, peer: &Peer) -> RegistryResult<Peer> {
		let name = peer.name_any();
		self
			.api(namespace)
			.create(&PostParams::default(), peer)
			.await
			.map_err(|e| RegistryError::from_kube(e, &name))
	}

	#[instrument(skip(self))]
	async fn get(&self, namespace: &str, name: &str) -> RegistryResult<Peer> {
		self
			.api(namespace)
			.get(name)
			.await
			.map_err(|e| RegistryError::from_kube(e, name))
	}

	#[instrument(skip(self, peer), fields(peer = %peer.name_any(), version = ?peer.metadata.resource_version))]
	async fn replace(&self, namespace: &str, peer: &Peer) -> RegistryResult<Peer> {
		let name = peer.name_any();
		self
			.api(namespace)
			.replace(&name, &PostParams::default(), peer)
			.await
			.map_err(|e| RegistryError::from_kube(e, &name))
	}

	#[instrument(skip(self))]
	async fn delete(&self, namespace: &str, name: &str) -> RegistryResult<()> {
		match self.api(namespace).delete(name, &DeleteParams::default()).await {
			Ok(_) => Ok(()),
			Err(e) => Err(RegistryError::from_kube(e, name)),
		}
	}
}
