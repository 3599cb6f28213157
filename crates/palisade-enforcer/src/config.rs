// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::error::{EnforcerError, Result};
use std::path::PathBuf;
use url::Url;

pub const DEFAULT_WG_INTERFACE: &str = "wg0";
pub const DEFAULT_WG_LISTEN_PORT: u16 = 51820;
pub const DEFAULT_NFLOG_GROUP: u16 = 100;
pub const DEFAULT_STATE_DIR: &str = "/var/lib/palisade-enforcer";

#[derive(Debug, Clone)]
pub struct EnforcerEnv {
	pub controlplane_url: Url,
	pub api_key: String,
	pub wg_interface: String,
	pub wg_listen_port: u16,
	/// Kernel logging group the filter copies packets to. Configurable so
	/// multiple enforcers on one host do not collide.
	pub nflog_group: u16,
	pub state_dir: PathBuf,
}

impl EnforcerEnv {
	pub fn from_env() -> Result<Self> {
		let controlplane_url: Url = std::env::var("CONTROLPLANE_URL")
			.map_err(|_| EnforcerError::MissingEnv("CONTROLPLANE_URL".to_string()))?
			.parse()
			.map_err(|e| EnforcerError::config(format!("invalid CONTROLPLANE_URL: {e}")))?;

		let api_key = std::env::var("API_KEY")
			.map_err(|_| EnforcerError::MissingEnv("API_KEY".to_string()))?;
		if api_key.trim().is_empty() {
			return Err(EnforcerError::MissingEnv("API_KEY".to_string()));
		}

		let wg_interface = std::env::var("WG_INTERFACE")
			.ok()
			.filter(|v| !v.trim().is_empty())
			.unwrap_or_else(|| DEFAULT_WG_INTERFACE.to_string());

		let wg_listen_port = parse_port("WG_LISTEN_PORT", DEFAULT_WG_LISTEN_PORT)?;
		let nflog_group = match std::env::var("NFLOG_GROUP") {
			Ok(value) => value
				.parse()
				.map_err(|_| EnforcerError::config("NFLOG_GROUP must be 0-65535".to_string()))?,
			Err(_) => DEFAULT_NFLOG_GROUP,
		};

		let state_dir = std::env::var("STATE_DIR")
			.map(PathBuf::from)
			.unwrap_or_else(|_| PathBuf::from(DEFAULT_STATE_DIR));

		Ok(Self {
			controlplane_url,
			api_key,
			wg_interface,
			wg_listen_port,
			nflog_group,
			state_dir,
		})
	}

	pub fn key_path(&self) -> PathBuf {
		self.state_dir.join(format!("{}.key", self.wg_interface))
	}
}

fn parse_port(var: &str, default: u16) -> Result<u16> {
	match std::env::var(var) {
		Ok(value) => {
			let port: u16 = value
				.parse()
				.map_err(|_| EnforcerError::config(format!("{var} must be 1-65535")))?;
			if port == 0 {
				return Err(EnforcerError::config(format!("{var} must be 1-65535")));
			}
			Ok(port)
		}
		Err(_) => Ok(default),
	}
}
