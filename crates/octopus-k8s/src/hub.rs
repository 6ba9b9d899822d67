// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credentials for reaching the hub from a spoke cluster.
//!
//! A spoke is bootstrapped with a Secret in its local namespace holding a
//! bearer token and the hub's CA bundle. How that Secret gets there is not
//! this crate's concern.

use base64::{engine::general_purpose::STANDARD, Engine};
use k8s_openapi::api::core::v1::Secret;
use kube::{
	config::{KubeConfigOptions, Kubeconfig},
	Api, Client, Config,
};
use tracing::{debug, instrument};
use url::Url;

use crate::error::{K8sError, K8sResult};

pub const HUB_CREDENTIALS_SECRET: &str = "octopus-hub-credentials";

const TOKEN_KEY: &str = "token";
const CA_KEY: &str = "ca.crt";
const HUB_CONTEXT: &str = "octopus-hub";

/// Build a kubeconfig that authenticates to `hub_url` with `token`,
/// trusting `ca_pem`.
pub fn hub_kubeconfig(hub_url: &str, token: &str, ca_pem: &[u8]) -> K8sResult<Kubeconfig> {
	let url = Url::parse(hub_url).map_err(|e| K8sError::InvalidHubUrl {
		url: hub_url.to_string(),
		message: e.to_string(),
	})?;
	if url.scheme() != "https" {
		return Err(K8sError::InvalidHubUrl {
			url: hub_url.to_string(),
			message: "hub must be reached over https".to_string(),
		});
	}

	let raw = serde_json::json!({
		"apiVersion": "v1",
		"kind": "Config",
		"clusters": [{
			"name": HUB_CONTEXT,
			"cluster": {
				"server": hub_url,
				"certificate-authority-data": STANDARD.encode(ca_pem),
			},
		}],
		"users": [{
			"name": HUB_CONTEXT,
			"user": { "token": token },
		}],
		"contexts": [{
			"name": HUB_CONTEXT,
			"context": { "cluster": HUB_CONTEXT, "user": HUB_CONTEXT },
		}],
		"current-context": HUB_CONTEXT,
	});

	serde_json::from_value(raw).map_err(|e| K8sError::Kubeconfig {
		message: e.to_string(),
	})
}

/// Resolve a client configuration for the hub from the credentials Secret
/// in the local cluster.
#[instrument(skip(local), fields(hub = %hub_url))]
pub async fn resolve_hub_config(
	local: Client,
	hub_url: &str,
	local_namespace: &str,
) -> K8sResult<Config> {
	let secrets: Api<Secret> = Api::namespaced(local, local_namespace);
	let secret = match secrets.get(HUB_CREDENTIALS_SECRET).await {
		Ok(secret) => secret,
		Err(kube::Error::Api(err)) if err.code == 404 => {
			return Err(K8sError::SecretNotFound {
				namespace: local_namespace.to_string(),
				name: HUB_CREDENTIALS_SECRET.to_string(),
			});
		}
		Err(e) => return Err(e.into()),
	};

	let data = secret.data.unwrap_or_default();
	let field = |key: &str| {
		data
			.get(key)
			.map(|v| v.0.clone())
			.ok_or_else(|| K8sError::MissingSecretKey { key: key.to_string() })
	};
	let token = String::from_utf8(field(TOKEN_KEY)?).map_err(|_| K8sError::Kubeconfig {
		message: "hub token is not valid UTF-8".to_string(),
	})?;
	let ca = field(CA_KEY)?;

	let kubeconfig = hub_kubeconfig(hub_url, token.trim(), &ca)?;
	let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
		.await
		.map_err(|e| K8sError::Kubeconfig {
			message: e.to_string(),
		})?;
	debug!(cluster_url = %config.cluster_url, "resolved hub client configuration");
	Ok(config)
}
