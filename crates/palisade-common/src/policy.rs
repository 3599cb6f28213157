// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Policy record shapes shared between the control plane, the agent, and the
//! enforcer.
//!
//! These are the wire types: the control plane derives them, the agent and
//! the enforcer consume them verbatim. Derivation guarantees deterministic
//! ordering (enforcers and policies by id, CIDR lists ascending) so consumers
//! may compare whole configs for equality to detect change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Access mode of a protected resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
	/// Flows are logged, never blocked. Every authenticated client may reach
	/// the resource.
	Observe,
	/// Flows are logged and dropped unless the client holds a pair for the
	/// resource.
	Enforce,
}

impl Mode {
	pub fn is_enforce(self) -> bool {
		matches!(self, Mode::Enforce)
	}
}

impl fmt::Display for Mode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Mode::Observe => f.write_str("observe"),
			Mode::Enforce => f.write_str("enforce"),
		}
	}
}

impl std::str::FromStr for Mode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"observe" => Ok(Mode::Observe),
			"enforce" => Ok(Mode::Enforce),
			other => Err(format!("mode must be observe or enforce, got {other:?}")),
		}
	}
}

/// Everything a client needs to establish tunnels to its enforcers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
	pub client_id: String,
	pub wg_public_key: String,
	pub enforcers: Vec<ClientEnforcerConfig>,
}

/// Per-enforcer slice of a [`ClientConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEnforcerConfig {
	pub enforcer_id: String,
	/// Client's address inside this enforcer's tunnel subnet, e.g. `10.8.0.2/24`.
	pub tunnel_ip: String,
	pub enforcer_public_key: String,
	/// Public endpoint to dial, e.g. `enf.example.com:51820`.
	pub enforcer_endpoint: String,
	/// Resource CIDRs routed through this enforcer, ascending, deduplicated.
	pub allowed_cidrs: Vec<String>,
}

/// The complete configuration one enforcer polls for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcerConfig {
	pub enforcer_id: String,
	/// Enforcer's own tunnel address, e.g. `10.8.0.1/24`.
	pub tunnel_address: String,
	/// Per-client policies, ordered by client id.
	pub policies: Vec<Policy>,
}

/// Access policy for a single client on one enforcer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
	pub client_id: String,
	pub client_name: String,
	pub wg_public_key: String,
	/// The client's tunnel addresses, `/32`-suffixed, for the peer's
	/// AllowedIPs. Empty when the client holds no current allocation.
	pub allowed_ips: Vec<String>,
	/// Resources this client may reach, ordered by CIDR.
	pub allowed_cidrs: Vec<PolicyTarget>,
}

/// One resource CIDR with its access mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTarget {
	pub cidr: String,
	pub mode: Mode,
	pub resource_id: String,
	pub resource_name: String,
}

/// One observed flow, shipped from the enforcer to `POST /api/logs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
	#[serde(rename = "ts")]
	pub timestamp: DateTime<Utc>,
	pub src_ip: String,
	pub src_port: u16,
	pub dst_ip: String,
	pub dst_port: u16,
	pub proto: String,
	#[serde(default)]
	pub client_id: String,
	#[serde(default)]
	pub client_name: String,
	#[serde(default)]
	pub resource_id: String,
	#[serde(default)]
	pub resource_name: String,
	pub length: u64,
}
