// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::commands::CommonArgs;
use crate::error::Result;
use crate::tunnel;
use clap::Args;
use console::style;

/// Remove the WireGuard interface. A no-op when it is already gone.
#[derive(Debug, Args)]
pub struct DownArgs {
	#[command(flatten)]
	pub common: CommonArgs,
}

pub async fn run(args: DownArgs) -> Result<()> {
	let interface = args.common.iface.clone();
	tokio::task::spawn_blocking(move || tunnel::down(&interface)).await??;
	println!("{} wireguard interface removed", style("✓").green().bold());
	Ok(())
}
