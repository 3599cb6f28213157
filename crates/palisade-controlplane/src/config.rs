// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("missing environment variable: {0}")]
	MissingEnv(String),

	#[error("parse error: {0}")]
	Parse(String),
}

#[derive(Debug, Clone)]
pub struct Config {
	pub bind_addr: SocketAddr,
	pub database_url: String,
	pub admin_username: String,
	pub admin_password: String,
}

impl Config {
	pub fn from_env() -> Result<Self, ConfigError> {
		let bind_addr = std::env::var("BIND_ADDR")
			.unwrap_or_else(|_| "0.0.0.0:8080".to_string())
			.parse()
			.map_err(|e| ConfigError::Parse(format!("invalid BIND_ADDR: {e}")))?;

		let database_url =
			std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:palisade.db".to_string());

		let admin_username = std::env::var("ADMIN_USERNAME")
			.map_err(|_| ConfigError::MissingEnv("ADMIN_USERNAME".to_string()))?;

		let admin_password = std::env::var("ADMIN_PASSWORD")
			.map_err(|_| ConfigError::MissingEnv("ADMIN_PASSWORD".to_string()))?;

		if admin_password.is_empty() {
			return Err(ConfigError::Parse("ADMIN_PASSWORD must not be empty".to_string()));
		}

		Ok(Self {
			bind_addr,
			database_url,
			admin_username,
			admin_password,
		})
	}
}
