// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Palisade enforcer daemon.
//!
//! Registers its key with the control plane, brings up the tunnel interface
//! and filter infrastructure, then reconciles policy every poll tick while
//! streaming observed flows back.

mod config;
mod controlplane;
mod error;
mod firewall;
mod flow;
mod poller;
mod reconcile;
mod tunnel;

use config::EnforcerEnv;
use controlplane::ControlPlaneClient;
use error::{EnforcerError, Result};
use firewall::FirewallManager;
use flow::lookup::LookupTables;
use flow::{capture, FlowPipeline, FlowPusher};
use palisade_common::keys_file;
use poller::{ConfigApplier, Poller, DEFAULT_POLL_INTERVAL};
use reconcile::EnforcerReconciler;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tunnel::TunnelManager;

#[tokio::main]
async fn main() {
	dotenvy::dotenv().ok();

	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| "info".into()),
		)
		.with(tracing_subscriber::fmt::layer())
		.init();

	if let Err(e) = run().await {
		tracing::error!(error = %e, "enforcer failed");
		std::process::exit(1);
	}
}

async fn run() -> Result<()> {
	if !nix::unistd::Uid::effective().is_root() {
		return Err(EnforcerError::NotRoot);
	}

	let env = EnforcerEnv::from_env()?;
	info!(interface = %env.wg_interface, "starting palisade-enforcer");

	let keypair = keys_file::load_or_generate_key(env.key_path()).await?;
	info!(public_key = %keypair.public_key(), "loaded device key");

	let client = Arc::new(ControlPlaneClient::new(
		env.controlplane_url.clone(),
		&env.api_key,
	)?);

	client
		.update_public_key(&keypair.public_key().to_base64())
		.await?;
	info!("public key registered with control plane");

	let initial_config = client.fetch_config().await?;
	info!(tunnel_address = %initial_config.tunnel_address, "config fetched");

	let tunnel = Arc::new(TunnelManager::new(
		&env.wg_interface,
		env.wg_listen_port,
		keypair,
		&initial_config.tunnel_address,
	)?);
	{
		let tunnel = Arc::clone(&tunnel);
		tokio::task::spawn_blocking(move || tunnel.setup()).await??;
	}

	let firewall = FirewallManager::new(&env.wg_interface, env.nflog_group);
	{
		let firewall = firewall.clone();
		tokio::task::spawn_blocking(move || firewall.setup()).await??;
	}

	let tables = Arc::new(LookupTables::new());
	let (pipeline, flow_rx) = FlowPipeline::new(Arc::clone(&tables));
	capture::spawn(env.nflog_group, Arc::clone(&pipeline))?;
	info!(group = env.nflog_group, "flow logging enabled");

	let (shutdown_tx, shutdown_rx) = watch::channel(false);

	let pusher_handle = tokio::spawn(
		FlowPusher::new(flow_rx, Arc::clone(&client)).run(shutdown_rx.clone()),
	);

	let reconciler = EnforcerReconciler::new(Arc::clone(&tunnel), firewall, Arc::clone(&tables));
	reconciler.apply(&initial_config).await?;
	info!("initial config applied");

	let poller = Poller {
		client: Arc::clone(&client),
		interval: DEFAULT_POLL_INTERVAL,
	};
	let poller_handle = {
		let shutdown_rx = shutdown_rx.clone();
		tokio::spawn(async move {
			poller.run(&reconciler, shutdown_rx).await;
		})
	};

	wait_for_signal().await;
	info!("shutdown signal received");
	let _ = shutdown_tx.send(true);

	if let Err(e) = poller_handle.await {
		warn!(error = %e, "poller task failed");
	}
	if let Err(e) = pusher_handle.await {
		warn!(error = %e, "pusher task failed");
	}

	let teardown = tokio::task::spawn_blocking(move || tunnel.down()).await;
	match teardown {
		Ok(Ok(())) => {}
		Ok(Err(e)) => warn!(error = %e, "failed to remove interface"),
		Err(e) => warn!(error = %e, "teardown task failed"),
	}

	info!(dropped = pipeline.dropped(), "shutting down");
	Ok(())
}

async fn wait_for_signal() {
	let ctrl_c = tokio::signal::ctrl_c();

	match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
		Ok(mut term) => {
			tokio::select! {
				_ = ctrl_c => {}
				_ = term.recv() => {}
			}
		}
		Err(e) => {
			warn!(error = %e, "failed to install SIGTERM handler");
			let _ = ctrl_c.await;
		}
	}
}
