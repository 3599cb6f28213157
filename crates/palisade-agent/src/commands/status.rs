// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::commands::CommonArgs;
use crate::connection;
use crate::error::{AgentError, Result};
use crate::routing;
use crate::tunnel;
use clap::Args;
use console::style;

/// Show the persisted connection, live peer state, and routing conflicts.
#[derive(Debug, Args)]
pub struct StatusArgs {
	#[command(flatten)]
	pub common: CommonArgs,
}

pub async fn run(args: StatusArgs) -> Result<()> {
	let record = connection::load(args.common.connection_path())
		.await
		.map_err(|_| {
			AgentError::config("no connection record found; run `palisade-agent up` first")
		})?;

	let interface = record.interface_name.clone();
	let state = {
		let interface = interface.clone();
		tokio::task::spawn_blocking(move || tunnel::read_state(&interface)).await??
	};

	println!("Interface:      {interface}");
	if state.exists {
		println!("Status:         {}", style("connected").green());
		println!("Peers:          {}", state.peer_count);
	} else {
		println!("Status:         {}", style("disconnected").red());
	}

	if !record.config.enforcers.is_empty() {
		println!("\nEnforcers:");
		for (i, enforcer) in record.config.enforcers.iter().enumerate() {
			println!("  [{}] {}", i + 1, enforcer.enforcer_endpoint);
			println!("      Tunnel IP: {}", enforcer.tunnel_ip);
			println!("      CIDRs:     {}", enforcer.allowed_cidrs.join(", "));
		}
	}

	let all_cidrs: Vec<String> = record
		.config
		.enforcers
		.iter()
		.flat_map(|e| e.allowed_cidrs.iter().cloned())
		.collect();

	if !all_cidrs.is_empty() {
		println!("\nResources:");
		match routing::resolve_preferred_interfaces(&all_cidrs).await {
			Ok(resolutions) => {
				for resolution in resolutions {
					println!("  {}", resolution.resource_cidr);
					match resolution.preferred.as_deref() {
						Some(preferred) if preferred == interface => {
							println!("    {} {} (preferred)", interface, style("✓").green());
							for route in resolution.routes.iter().filter(|r| r.interface != interface) {
								println!("    {}: {} (overlap)", route.interface, route.cidr);
							}
						}
						Some(preferred) => {
							println!("    {} {} (not preferred)", interface, style("⚠").yellow());
							println!("    {}: current route", preferred);
						}
						None => {
							println!("    no route {}", style("⚠").yellow());
						}
					}
				}
			}
			Err(e) => println!("  (routing check failed: {e})"),
		}
	}

	println!("\nControl Plane:  {}", record.controlplane_url);
	println!(
		"Last Updated:   {}",
		record.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
	);

	Ok(())
}
