// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::commands::CommonArgs;
use crate::connection::{self, ConnectionState};
use crate::controlplane::ControlPlaneClient;
use crate::error::Result;
use crate::poller::{ConfigApplier, Poller, DEFAULT_POLL_INTERVAL};
use crate::tunnel;
use chrono::Utc;
use clap::Args;
use console::style;
use palisade_common::{ClientConfig, WgKeyPair};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{info, warn};
use url::Url;

/// Login, fetch config, apply it, and keep it reconciled until interrupted.
#[derive(Debug, Args)]
pub struct UpArgs {
	/// Control plane base URL
	#[arg(long)]
	pub cp_url: Url,

	/// Client username
	#[arg(long)]
	pub username: String,

	/// Client password
	#[arg(long)]
	pub password: String,

	#[command(flatten)]
	pub common: CommonArgs,
}

struct TunnelApplier {
	interface: String,
	keypair: WgKeyPair,
	connection_path: PathBuf,
	controlplane_url: String,
}

#[async_trait::async_trait]
impl ConfigApplier for TunnelApplier {
	async fn apply(&self, config: &ClientConfig) -> Result<()> {
		let peers = tunnel::peers_from_config(config)?;

		let interface = self.interface.clone();
		let keypair = self.keypair.clone();
		tokio::task::spawn_blocking(move || tunnel::apply(&interface, &keypair, &peers)).await??;

		connection::save(
			&self.connection_path,
			&ConnectionState {
				controlplane_url: self.controlplane_url.clone(),
				interface_name: self.interface.clone(),
				config: config.clone(),
				updated_at: Utc::now(),
			},
		)
		.await
	}
}

pub async fn run(args: UpArgs) -> Result<()> {
	let keypair = palisade_common::keys_file::load_or_generate_key(args.common.key_path()).await?;
	info!(public_key = %keypair.public_key(), "loaded device key");

	let client = ControlPlaneClient::new(args.cp_url.clone())?;
	let session = client.login(&args.username, &args.password).await?;
	info!(client_id = %session.client_id, "logged in");

	client
		.update_public_key(&session.token, &keypair.public_key().to_base64())
		.await?;

	let applier = TunnelApplier {
		interface: args.common.iface.clone(),
		keypair,
		connection_path: args.common.connection_path(),
		controlplane_url: args.cp_url.to_string(),
	};

	let config = client.fetch_config(&session.token).await?;
	if let Err(e) = applier.apply(&config).await {
		teardown(&args.common.iface).await;
		return Err(e);
	}

	println!(
		"{} client is running; press Ctrl+C to stop",
		style("✓").green().bold()
	);

	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	tokio::spawn(async move {
		wait_for_signal().await;
		let _ = shutdown_tx.send(true);
	});

	let poller = Poller {
		client,
		username: args.username.clone(),
		password: args.password.clone(),
		interval: DEFAULT_POLL_INTERVAL,
	};
	let result = poller.run(&applier, shutdown_rx, Some(session.token)).await;

	teardown(&args.common.iface).await;
	println!("{} client stopped", style("✓").green().bold());
	result
}

async fn teardown(interface: &str) {
	let interface = interface.to_string();
	let result = tokio::task::spawn_blocking(move || tunnel::down(&interface)).await;
	match result {
		Ok(Ok(())) => {}
		Ok(Err(e)) => warn!(error = %e, "failed to remove interface"),
		Err(e) => warn!(error = %e, "teardown task failed"),
	}
}

async fn wait_for_signal() {
	let ctrl_c = tokio::signal::ctrl_c();

	#[cfg(unix)]
	{
		use tokio::signal::unix::{signal, SignalKind};
		match signal(SignalKind::terminate()) {
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

	#[cfg(not(unix))]
	{
		let _ = ctrl_c.await;
	}
}
