// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP client for the control plane.

use crate::error::{AgentError, Result};
use chrono::{DateTime, Utc};
use palisade_common::ClientConfig;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;
use url::Url;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const PATH_LOGIN: &str = "/api/client/login";
const PATH_CONFIG: &str = "/api/client/config";
const PATH_KEYS: &str = "/api/client/keys";

#[derive(Debug, Clone, Deserialize)]
pub struct Session {
	pub client_id: String,
	pub token: String,
	pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
	username: &'a str,
	password: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateKeyRequest<'a> {
	wg_public_key: &'a str,
}

#[derive(Clone)]
pub struct ControlPlaneClient {
	http: reqwest::Client,
	base_url: Url,
}

impl ControlPlaneClient {
	pub fn new(base_url: Url) -> Result<Self> {
		let http = reqwest::Client::builder()
			.timeout(HTTP_TIMEOUT)
			.user_agent(concat!("palisade-agent/", env!("CARGO_PKG_VERSION")))
			.build()?;
		Ok(Self { http, base_url })
	}

	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	#[instrument(skip(self, password), fields(username = %username))]
	pub async fn login(&self, username: &str, password: &str) -> Result<Session> {
		let response = self
			.http
			.post(self.base_url.join(PATH_LOGIN)?)
			.json(&LoginRequest { username, password })
			.send()
			.await?;

		match response.status() {
			StatusCode::UNAUTHORIZED => Err(AgentError::Unauthorized),
			status if status.is_success() => Ok(response.json().await?),
			_ => Err(AgentError::ControlPlane(response.text().await.unwrap_or_default())),
		}
	}

	#[instrument(skip_all)]
	pub async fn fetch_config(&self, token: &str) -> Result<ClientConfig> {
		let response = self
			.http
			.get(self.base_url.join(PATH_CONFIG)?)
			.bearer_auth(token)
			.send()
			.await?;

		match response.status() {
			StatusCode::UNAUTHORIZED => Err(AgentError::Unauthorized),
			status if status.is_success() => Ok(response.json().await?),
			_ => Err(AgentError::ControlPlane(response.text().await.unwrap_or_default())),
		}
	}

	#[instrument(skip_all)]
	pub async fn update_public_key(&self, token: &str, wg_public_key: &str) -> Result<()> {
		let response = self
			.http
			.put(self.base_url.join(PATH_KEYS)?)
			.bearer_auth(token)
			.json(&UpdateKeyRequest { wg_public_key })
			.send()
			.await?;

		match response.status() {
			StatusCode::UNAUTHORIZED => Err(AgentError::Unauthorized),
			status if status.is_success() => Ok(()),
			_ => Err(AgentError::ControlPlane(response.text().await.unwrap_or_default())),
		}
	}
}

impl std::fmt::Debug for ControlPlaneClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ControlPlaneClient")
			.field("base_url", &self.base_url.as_str())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn client_builds_with_base_url() {
		let client = ControlPlaneClient::new("https://cp.example.com".parse().unwrap()).unwrap();
		assert_eq!(client.base_url().as_str(), "https://cp.example.com/");
	}

	#[test]
	fn paths_join_against_base() {
		let base: Url = "https://cp.example.com".parse().unwrap();
		assert_eq!(
			base.join(PATH_LOGIN).unwrap().as_str(),
			"https://cp.example.com/api/client/login"
		);
	}
}
