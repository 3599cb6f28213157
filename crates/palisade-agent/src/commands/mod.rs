// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod down;
pub mod keygen;
pub mod status;
pub mod up;

use clap::Args;
use std::path::PathBuf;

pub const DEFAULT_INTERFACE: &str = "wg0";
pub const DEFAULT_STATE_DIR: &str = "/var/lib/palisade-agent";

#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
	/// WireGuard interface name
	#[arg(long, default_value = DEFAULT_INTERFACE)]
	pub iface: String,

	/// Directory for key and connection state
	#[arg(long, default_value = DEFAULT_STATE_DIR)]
	pub state_dir: PathBuf,
}

impl CommonArgs {
	pub fn key_path(&self) -> PathBuf {
		self.state_dir.join(format!("{}.key", self.iface))
	}

	pub fn connection_path(&self) -> PathBuf {
		crate::connection::path_for_interface(&self.state_dir, &self.iface)
	}
}
