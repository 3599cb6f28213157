// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnforcerError {
	#[error("missing environment variable: {0}")]
	MissingEnv(String),

	#[error("configuration error: {0}")]
	Config(String),

	#[error("enforcer must run as root")]
	NotRoot,

	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("URL parse error: {0}")]
	Url(#[from] url::ParseError),

	#[error("control plane error: {0}")]
	ControlPlane(String),

	#[error("key file error: {0}")]
	KeyFile(#[from] palisade_common::keys_file::KeyFileError),

	#[error("wireguard error: {0}")]
	Wireguard(#[from] defguard_wireguard_rs::error::WireguardInterfaceError),

	#[error("nftables error: {0}")]
	Nftables(#[from] nftables::helper::NftablesError),

	#[error("packet capture error: {0}")]
	Capture(String),

	#[error("task join error: {0}")]
	Join(#[from] tokio::task::JoinError),
}

impl EnforcerError {
	pub fn config(msg: impl Into<String>) -> Self {
		Self::Config(msg.into())
	}
}

pub type Result<T> = std::result::Result<T, EnforcerError>;
