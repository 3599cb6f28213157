// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP client for the control plane, authenticated by API key.

use crate::error::{EnforcerError, Result};
use palisade_common::{EnforcerConfig, FlowRecord};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use std::time::Duration;
use tracing::instrument;
use url::Url;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const PATH_CONFIG: &str = "/api/enforcer/config";
const PATH_LOGS: &str = "/api/logs";
const PATH_PUBLIC_KEY: &str = "/api/enforcer/public-key";

#[derive(Debug, Serialize)]
struct UpdatePublicKeyRequest<'a> {
	wg_public_key: &'a str,
}

pub struct ControlPlaneClient {
	http: reqwest::Client,
	base_url: Url,
}

impl ControlPlaneClient {
	pub fn new(base_url: Url, api_key: &str) -> Result<Self> {
		let mut headers = HeaderMap::new();
		let mut api_key_value = HeaderValue::from_str(api_key)
			.map_err(|_| EnforcerError::config("API key contains invalid header characters"))?;
		api_key_value.set_sensitive(true);
		headers.insert("X-API-Key", api_key_value);

		let http = reqwest::Client::builder()
			.timeout(HTTP_TIMEOUT)
			.default_headers(headers)
			.user_agent(concat!("palisade-enforcer/", env!("CARGO_PKG_VERSION")))
			.build()?;

		Ok(Self { http, base_url })
	}

	#[instrument(skip_all)]
	pub async fn fetch_config(&self) -> Result<EnforcerConfig> {
		let response = self.http.get(self.base_url.join(PATH_CONFIG)?).send().await?;
		if !response.status().is_success() {
			return Err(EnforcerError::ControlPlane(format!(
				"fetch config: {}",
				response.status()
			)));
		}
		Ok(response.json().await?)
	}

	#[instrument(skip_all, fields(count = records.len()))]
	pub async fn push_logs(&self, records: &[FlowRecord]) -> Result<()> {
		if records.is_empty() {
			return Ok(());
		}
		let response = self
			.http
			.post(self.base_url.join(PATH_LOGS)?)
			.json(records)
			.send()
			.await?;
		if !response.status().is_success() {
			return Err(EnforcerError::ControlPlane(format!(
				"push logs: {}",
				response.status()
			)));
		}
		Ok(())
	}

	#[instrument(skip_all)]
	pub async fn update_public_key(&self, wg_public_key: &str) -> Result<()> {
		let response = self
			.http
			.put(self.base_url.join(PATH_PUBLIC_KEY)?)
			.json(&UpdatePublicKeyRequest { wg_public_key })
			.send()
			.await?;
		if !response.status().is_success() {
			return Err(EnforcerError::ControlPlane(format!(
				"update public key: {}",
				response.status()
			)));
		}
		Ok(())
	}
}

impl std::fmt::Debug for ControlPlaneClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ControlPlaneClient")
			.field("base_url", &self.base_url.as_str())
			.finish()
	}
}
