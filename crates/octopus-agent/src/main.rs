// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! octopus agent binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use octopus_agent::{PeerWatcher, Role, Specification, TunnelManager};
use octopus_k8s::{resolve_hub_config, KubePeerRegistry};
use octopus_wgtunnel_device::WgBackend;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
	Plain,
	Json,
}

/// Joins this cluster to the octopus WireGuard mesh.
#[derive(Parser, Debug)]
#[command(name = "octopus-agent", about = "octopus WireGuard mesh agent", version)]
struct Args {
	/// Kubeconfig of the local cluster. Only required out of cluster.
	#[arg(long, env = "KUBECONFIG")]
	kubeconfig: Option<PathBuf>,

	/// Kubeconfig context to use for the local cluster.
	#[arg(long)]
	context: Option<String>,

	/// How long to keep trying to retract our Peer record on shutdown.
	#[arg(long, default_value_t = 30)]
	cleanup_timeout_secs: u64,

	/// How often peer updates that failed transiently are retried.
	#[arg(long, default_value_t = 30)]
	resync_interval_secs: u64,

	#[arg(long, env = "OCTOPUS_LOG_FORMAT", value_enum, default_value_t = LogFormat::Plain)]
	log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
	let registry = tracing_subscriber::registry().with(
		tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
	);
	match format {
		LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
		LogFormat::Plain => registry.with(tracing_subscriber::fmt::layer()).init(),
	}
}

async fn local_client(args: &Args) -> anyhow::Result<Client> {
	let options = KubeConfigOptions {
		context: args.context.clone(),
		..Default::default()
	};
	let config = match &args.kubeconfig {
		Some(path) => {
			let kubeconfig = Kubeconfig::read_from(path)
				.with_context(|| format!("reading kubeconfig {}", path.display()))?;
			Config::from_custom_kubeconfig(kubeconfig, &options).await?
		}
		None if args.context.is_some() => Config::from_kubeconfig(&options).await?,
		None => Config::infer().await?,
	};
	Ok(Client::try_from(config)?)
}

async fn hub_client(spec: &Specification, local: &Client) -> anyhow::Result<Client> {
	match &spec.role {
		Role::Hub => Ok(local.clone()),
		Role::Spoke { hub_url } => {
			let config = resolve_hub_config(local.clone(), hub_url.as_str(), &spec.local_namespace)
				.await
				.context("resolving hub credentials")?;
			Ok(Client::try_from(config)?)
		}
	}
}

#[cfg(target_os = "linux")]
fn wireguard_backend() -> anyhow::Result<Arc<dyn WgBackend>> {
	let backend = octopus_wgtunnel_device::KernelBackend::new().context("opening rtnetlink socket")?;
	Ok(Arc::new(backend))
}

#[cfg(not(target_os = "linux"))]
fn wireguard_backend() -> anyhow::Result<Arc<dyn WgBackend>> {
	anyhow::bail!("kernel WireGuard is only supported on Linux")
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			warn!(error = %e, "failed to listen for ctrl-c");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut sig) => {
				sig.recv().await;
			}
			Err(e) => {
				warn!(error = %e, "failed to listen for SIGTERM");
				std::future::pending::<()>().await;
			}
		}
	};
	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {}
		_ = terminate => {}
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	init_tracing(args.log_format);

	let spec = Specification::from_env().context("loading agent configuration")?;
	info!(
		cluster_id = %spec.cluster_id,
		hub = spec.is_hub(),
		share_namespace = %spec.share_namespace,
		"starting octopus agent"
	);

	let local = local_client(&args).await.context("building local cluster client")?;
	let hub = hub_client(&spec, &local).await?;
	let registry = Arc::new(KubePeerRegistry::new(hub.clone()));

	let tunnel = TunnelManager::new(registry, spec, wireguard_backend()?)
		.await
		.context("setting up WireGuard device")?;
	let tunnel = Arc::new(tunnel);
	tunnel.init().await.context("joining the mesh")?;

	let cancel = CancellationToken::new();
	let watcher = PeerWatcher::new(Arc::clone(&tunnel))
		.with_resync(Duration::from_secs(args.resync_interval_secs.max(1)));
	let watcher = tokio::spawn(watcher.run(hub, cancel.clone()));

	shutdown_signal().await;
	info!("shutdown signal received");
	cancel.cancel();
	if let Err(e) = watcher.await {
		warn!(error = %e, "peer watcher task failed");
	}

	let timeout = Duration::from_secs(args.cleanup_timeout_secs);
	match tunnel.cleanup(timeout).await {
		Ok(outcome) => info!(?outcome, "left the mesh"),
		Err(e) => error!(error = %e, "error cleaning up peer record before exit"),
	}

	info!("octopus agent stopped");
	Ok(())
}
