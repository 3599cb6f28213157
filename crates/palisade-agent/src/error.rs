// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
	#[error("unauthorized")]
	Unauthorized,

	#[error("control plane error: {0}")]
	ControlPlane(String),

	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("URL parse error: {0}")]
	Url(#[from] url::ParseError),

	#[error("key file error: {0}")]
	KeyFile(#[from] palisade_common::keys_file::KeyFileError),

	#[error("wireguard error: {0}")]
	Wireguard(#[from] defguard_wireguard_rs::error::WireguardInterfaceError),

	#[error("netlink error: {0}")]
	Netlink(#[from] rtnetlink::Error),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("task join error: {0}")]
	Join(#[from] tokio::task::JoinError),

	#[error("connection state error: {0}")]
	ConnectionState(#[from] serde_json::Error),

	#[error("{0}")]
	Config(String),
}

impl AgentError {
	pub fn config(msg: impl Into<String>) -> Self {
		Self::Config(msg.into())
	}
}

pub type Result<T> = std::result::Result<T, AgentError>;
