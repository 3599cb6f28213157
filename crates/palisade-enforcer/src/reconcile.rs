// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! One apply: peers, then filter rules, then lookup tables.
//!
//! Peer and filter updates must both succeed before a config counts as
//! applied; a partial application (peers changed, filter failed) is tolerated
//! because the next tick retries against the unchanged cache and converges.

use crate::error::Result;
use crate::firewall::FirewallManager;
use crate::flow::lookup::LookupTables;
use crate::poller::ConfigApplier;
use crate::tunnel::TunnelManager;
use palisade_common::EnforcerConfig;
use std::sync::Arc;
use tracing::instrument;

pub struct EnforcerReconciler {
	tunnel: Arc<TunnelManager>,
	firewall: FirewallManager,
	tables: Arc<LookupTables>,
}

impl EnforcerReconciler {
	pub fn new(tunnel: Arc<TunnelManager>, firewall: FirewallManager, tables: Arc<LookupTables>) -> Self {
		Self {
			tunnel,
			firewall,
			tables,
		}
	}
}

#[async_trait::async_trait]
impl ConfigApplier for EnforcerReconciler {
	#[instrument(skip_all, fields(policies = config.policies.len()))]
	async fn apply(&self, config: &EnforcerConfig) -> Result<()> {
		let tunnel = Arc::clone(&self.tunnel);
		let policies = config.policies.clone();
		tokio::task::spawn_blocking(move || tunnel.apply_peers(&policies)).await??;

		let firewall = self.firewall.clone();
		let policies = config.policies.clone();
		tokio::task::spawn_blocking(move || firewall.apply_policies(&policies)).await??;

		self.tables.update(&config.policies);
		Ok(())
	}
}
