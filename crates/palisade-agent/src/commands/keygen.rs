// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::commands::CommonArgs;
use crate::error::Result;
use clap::Args;
use palisade_common::keys_file;

/// Generate (or reuse) the WireGuard key pair and print the public key.
#[derive(Debug, Args)]
pub struct KeygenArgs {
	#[command(flatten)]
	pub common: CommonArgs,
}

pub async fn run(args: KeygenArgs) -> Result<()> {
	let keypair = keys_file::load_or_generate_key(args.common.key_path()).await?;
	println!("{}", keypair.public_key());
	Ok(())
}
