// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Config polling loop.
//!
//! Fetches the enforcer config every tick and applies it only when it
//! differs from the last successfully applied one; a failed apply leaves the
//! cache untouched so the next tick retries.

use crate::controlplane::ControlPlaneClient;
use crate::error::Result;
use palisade_common::EnforcerConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[async_trait::async_trait]
pub trait ConfigApplier: Send + Sync {
	async fn apply(&self, config: &EnforcerConfig) -> Result<()>;
}

pub fn config_changed(last: Option<&EnforcerConfig>, new: &EnforcerConfig) -> bool {
	last != Some(new)
}

pub struct Poller {
	pub client: Arc<ControlPlaneClient>,
	pub interval: Duration,
}

impl Poller {
	pub async fn run(&self, applier: &dyn ConfigApplier, mut shutdown: watch::Receiver<bool>) {
		let mut last_applied: Option<EnforcerConfig> = None;

		loop {
			if *shutdown.borrow() {
				return;
			}

			match self.client.fetch_config().await {
				Ok(config) => {
					if config_changed(last_applied.as_ref(), &config) {
						match applier.apply(&config).await {
							Ok(()) => {
								info!(policies = config.policies.len(), "applied new config");
								last_applied = Some(config);
							}
							Err(e) => error!(error = %e, "apply failed"),
						}
					}
				}
				Err(e) => warn!(error = %e, "fetch config failed"),
			}

			if wait(&mut shutdown, self.interval).await {
				return;
			}
		}
	}
}

async fn wait(shutdown: &mut watch::Receiver<bool>, interval: Duration) -> bool {
	tokio::select! {
		_ = tokio::time::sleep(interval) => false,
		_ = shutdown.changed() => *shutdown.borrow(),
	}
}
