// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Config polling loop.
//!
//! Every tick the agent fetches its config and re-applies only when it
//! differs from the last successfully applied one. An unauthorized fetch
//! clears the token so the next tick logs in again; every other error is
//! logged and the loop continues.

use crate::controlplane::ControlPlaneClient;
use crate::error::{AgentError, Result};
use palisade_common::ClientConfig;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

#[async_trait::async_trait]
pub trait ConfigApplier: Send + Sync {
	async fn apply(&self, config: &ClientConfig) -> Result<()>;
}

pub fn config_changed(last: Option<&ClientConfig>, new: &ClientConfig) -> bool {
	last != Some(new)
}

pub struct Poller {
	pub client: ControlPlaneClient,
	pub username: String,
	pub password: String,
	pub interval: Duration,
}

impl Poller {
	pub async fn run(
		&self,
		applier: &dyn ConfigApplier,
		mut shutdown: watch::Receiver<bool>,
		initial_token: Option<String>,
	) -> Result<()> {
		let mut token = initial_token;
		let mut last_applied: Option<ClientConfig> = None;

		loop {
			if *shutdown.borrow() {
				return Ok(());
			}

			if token.is_none() {
				match self.client.login(&self.username, &self.password).await {
					Ok(session) => token = Some(session.token),
					Err(e) => {
						warn!(error = %e, "login failed");
						if wait(&mut shutdown, self.interval).await {
							return Ok(());
						}
						continue;
					}
				}
			}

			let Some(current_token) = token.clone() else {
				continue;
			};
			match self.client.fetch_config(&current_token).await {
				Ok(config) => {
					if config_changed(last_applied.as_ref(), &config) {
						match applier.apply(&config).await {
							Ok(()) => {
								info!(enforcers = config.enforcers.len(), "applied new config");
								last_applied = Some(config);
							}
							Err(e) => error!(error = %e, "apply failed"),
						}
					}
				}
				Err(AgentError::Unauthorized) => {
					info!("token rejected, re-authenticating");
					token = None;
					if wait(&mut shutdown, self.interval).await {
						return Ok(());
					}
					continue;
				}
				Err(e) => warn!(error = %e, "fetch config failed"),
			}

			if wait(&mut shutdown, self.interval).await {
				return Ok(());
			}
		}
	}
}

/// Sleeps for `interval` unless shutdown fires first. Returns true on
/// shutdown.
async fn wait(shutdown: &mut watch::Receiver<bool>, interval: Duration) -> bool {
	tokio::select! {
		_ = tokio::time::sleep(interval) => false,
		_ = shutdown.changed() => *shutdown.borrow(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_config() -> ClientConfig {
		ClientConfig {
			client_id: "c1".into(),
			wg_public_key: "pk".into(),
			enforcers: vec![],
		}
	}

	#[test]
	fn first_config_always_applies() {
		assert!(config_changed(None, &sample_config()));
	}

	#[test]
	fn identical_config_skips() {
		let config = sample_config();
		assert!(!config_changed(Some(&config), &config.clone()));
	}

	#[test]
	fn differing_config_reapplies() {
		let old = sample_config();
		let mut new = sample_config();
		new.wg_public_key = "rotated".into();
		assert!(config_changed(Some(&old), &new));
	}
}
