// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Palisade client agent.
//!
//! Authenticates against the control plane, keeps one local WireGuard
//! interface in sync with the derived client config, and reports status
//! including routing conflicts with other VPNs.

mod commands;
mod connection;
mod controlplane;
mod error;
mod poller;
mod routing;
mod tunnel;

use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Palisade agent - client side of the zero-trust overlay.
#[derive(Parser, Debug)]
#[command(name = "palisade-agent", version)]
struct Cli {
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Generate WireGuard key pair and display the public key
	Keygen(commands::keygen::KeygenArgs),
	/// Login, fetch config, and apply WireGuard settings
	Up(commands::up::UpArgs),
	/// Remove the WireGuard interface and routes
	Down(commands::down::DownArgs),
	/// Show current WireGuard status and configuration
	Status(commands::status::StatusArgs),
}

#[tokio::main]
async fn main() {
	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| "warn".into()),
		)
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
		.init();

	let cli = Cli::parse();

	let result = match cli.command {
		Command::Keygen(args) => commands::keygen::run(args).await,
		Command::Up(args) => commands::up::run(args).await,
		Command::Down(args) => commands::down::run(args).await,
		Command::Status(args) => commands::status::run(args).await,
	};

	if let Err(e) = result {
		eprintln!("{} {e}", style("error:").red().bold());
		std::process::exit(1);
	}
}
