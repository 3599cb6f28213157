// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! EnforcerConfig derivation.
//!
//! Resources partition by mode. When the enforcer hosts any observe-mode
//! resource, every client is seeded with a policy carrying all observe
//! targets; enforce-mode resources are then overlaid onto the clients paired
//! to them, creating policies as needed. Policies are ordered by client id
//! and each policy's targets by CIDR, so output is a pure function of the
//! inputs.

use crate::error::Result;
use crate::repository::Repository;
use crate::service::tunnel_ip::TunnelIpAllocator;
use palisade_common::{EnforcerConfig, Mode, Policy, PolicyTarget};
use std::collections::BTreeMap;
use tracing::instrument;

#[instrument(skip(repo, allocator))]
pub async fn get_enforcer_config(
	repo: &Repository,
	allocator: &TunnelIpAllocator,
	enforcer_id: &str,
) -> Result<EnforcerConfig> {
	let data = repo.enforcer_config_data(enforcer_id).await?;
	let tunnel_address = data.enforcer.tunnel_address()?;

	let mut observe_targets = Vec::new();
	let mut enforce_resources = BTreeMap::new();
	for resource in &data.resources {
		match resource.mode {
			Mode::Observe => observe_targets.push(PolicyTarget {
				cidr: resource.cidr.clone(),
				mode: resource.mode,
				resource_id: resource.id.clone(),
				resource_name: resource.name.clone(),
			}),
			Mode::Enforce => {
				enforce_resources.insert(resource.id.clone(), resource);
			}
		}
	}

	// BTreeMap keyed by client id keeps the output ordered.
	let mut policies: BTreeMap<String, Policy> = BTreeMap::new();

	if !observe_targets.is_empty() {
		for client in &data.clients {
			policies.insert(
				client.id.clone(),
				Policy {
					client_id: client.id.clone(),
					client_name: client.name.clone(),
					wg_public_key: client.wg_public_key.clone(),
					allowed_ips: Vec::new(),
					allowed_cidrs: observe_targets.clone(),
				},
			);
		}
	}

	for (pair, client) in &data.pairs {
		let Some(resource) = enforce_resources.get(&pair.resource_id) else {
			continue;
		};

		let policy = policies.entry(client.id.clone()).or_insert_with(|| Policy {
			client_id: client.id.clone(),
			client_name: client.name.clone(),
			wg_public_key: client.wg_public_key.clone(),
			allowed_ips: Vec::new(),
			allowed_cidrs: Vec::new(),
		});
		policy.allowed_cidrs.push(PolicyTarget {
			cidr: resource.cidr.clone(),
			mode: resource.mode,
			resource_id: resource.id.clone(),
			resource_name: resource.name.clone(),
		});
	}

	let policies = policies
		.into_values()
		.map(|mut policy| {
			if let Some(tunnel_ip) = allocator.lookup(&data.enforcer.id, &policy.client_id) {
				policy.allowed_ips = vec![format!("{tunnel_ip}/32")];
			}
			policy.allowed_cidrs.sort_by(|a, b| a.cidr.cmp(&b.cidr));
			policy
		})
		.collect();

	Ok(EnforcerConfig {
		enforcer_id: data.enforcer.id,
		tunnel_address,
		policies,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::db::create_test_pool;
	use crate::model::{Client, Enforcer, Resource};
	use crate::service::client_login;

	async fn test_repo() -> Repository {
		Repository::new(create_test_pool().await)
	}

	async fn seed_enforcer(repo: &Repository) -> Enforcer {
		let (enforcer, _) = Enforcer::new("e1", "enf.example.com:51820", "10.8.0.0/24").unwrap();
		repo.create_enforcer(&enforcer).await.unwrap();
		enforcer
	}

	async fn seed_client(repo: &Repository, username: &str) -> Client {
		let client = Client::new(username, username, "pw", &format!("pk-{username}")).unwrap();
		repo.create_client(&client).await.unwrap();
		client
	}

	#[tokio::test]
	async fn tunnel_address_is_subnet_first_host() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		let enforcer = seed_enforcer(&repo).await;

		let config = get_enforcer_config(&repo, &allocator, &enforcer.id).await.unwrap();
		assert_eq!(config.tunnel_address, "10.8.0.1/24");
		assert!(config.policies.is_empty());
	}

	#[tokio::test]
	async fn observe_resource_seeds_every_client() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		let enforcer = seed_enforcer(&repo).await;
		seed_client(&repo, "alice").await;
		seed_client(&repo, "bob").await;
		repo.create_resource(&Resource::new("r1", "192.168.10.0/24", &enforcer.id, Mode::Observe))
			.await
			.unwrap();

		let config = get_enforcer_config(&repo, &allocator, &enforcer.id).await.unwrap();
		assert_eq!(config.policies.len(), 2);
		for policy in &config.policies {
			assert_eq!(policy.allowed_cidrs.len(), 1);
			assert_eq!(policy.allowed_cidrs[0].cidr, "192.168.10.0/24");
			assert_eq!(policy.allowed_cidrs[0].mode, Mode::Observe);
		}
	}

	#[tokio::test]
	async fn enforce_resource_reaches_only_paired_clients() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		let enforcer = seed_enforcer(&repo).await;
		let alice = seed_client(&repo, "alice").await;
		seed_client(&repo, "bob").await;

		repo.create_resource(&Resource::new("r1", "192.168.10.0/24", &enforcer.id, Mode::Observe))
			.await
			.unwrap();
		let r2 = Resource::new("r2", "192.168.20.5/32", &enforcer.id, Mode::Enforce);
		repo.create_resource(&r2).await.unwrap();
		repo.create_pair_checked(&alice.id, &r2.id).await.unwrap();

		let config = get_enforcer_config(&repo, &allocator, &enforcer.id).await.unwrap();
		assert_eq!(config.policies.len(), 2);

		let alice_policy = config.policies.iter().find(|p| p.client_id == alice.id).unwrap();
		let targets: Vec<&str> = alice_policy.allowed_cidrs.iter().map(|t| t.cidr.as_str()).collect();
		assert_eq!(targets, vec!["192.168.10.0/24", "192.168.20.5/32"]);

		let bob_policy = config.policies.iter().find(|p| p.client_id != alice.id).unwrap();
		let targets: Vec<&str> = bob_policy.allowed_cidrs.iter().map(|t| t.cidr.as_str()).collect();
		assert_eq!(targets, vec!["192.168.10.0/24"]);
	}

	#[tokio::test]
	async fn enforce_only_enforcer_lists_only_paired_clients() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		let enforcer = seed_enforcer(&repo).await;
		let alice = seed_client(&repo, "alice").await;
		seed_client(&repo, "bob").await;

		let r = Resource::new("r", "192.168.20.5/32", &enforcer.id, Mode::Enforce);
		repo.create_resource(&r).await.unwrap();
		repo.create_pair_checked(&alice.id, &r.id).await.unwrap();

		let config = get_enforcer_config(&repo, &allocator, &enforcer.id).await.unwrap();
		assert_eq!(config.policies.len(), 1);
		assert_eq!(config.policies[0].client_id, alice.id);
	}

	#[tokio::test]
	async fn allowed_ips_come_from_the_allocation_table() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		let enforcer = seed_enforcer(&repo).await;
		seed_client(&repo, "alice").await;
		repo.create_resource(&Resource::new("r1", "192.168.10.0/24", &enforcer.id, Mode::Observe))
			.await
			.unwrap();

		// Before login: policy exists with an empty AllowedIPs.
		let config = get_enforcer_config(&repo, &allocator, &enforcer.id).await.unwrap();
		assert!(config.policies[0].allowed_ips.is_empty());

		client_login(&repo, &allocator, "alice", "pw").await.unwrap();

		let config = get_enforcer_config(&repo, &allocator, &enforcer.id).await.unwrap();
		assert_eq!(config.policies[0].allowed_ips, vec!["10.8.0.2/32"]);
	}

	#[tokio::test]
	async fn policies_are_ordered_by_client_id() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		let enforcer = seed_enforcer(&repo).await;
		for name in ["carol", "alice", "bob"] {
			seed_client(&repo, name).await;
		}
		repo.create_resource(&Resource::new("r1", "192.168.10.0/24", &enforcer.id, Mode::Observe))
			.await
			.unwrap();

		let config = get_enforcer_config(&repo, &allocator, &enforcer.id).await.unwrap();
		let ids: Vec<&str> = config.policies.iter().map(|p| p.client_id.as_str()).collect();
		let mut sorted = ids.clone();
		sorted.sort();
		assert_eq!(ids, sorted);
	}

	#[tokio::test]
	async fn mode_flip_changes_derived_config() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		let enforcer = seed_enforcer(&repo).await;
		let alice = seed_client(&repo, "alice").await;
		let r = Resource::new("r", "192.168.20.5/32", &enforcer.id, Mode::Enforce);
		repo.create_resource(&r).await.unwrap();
		repo.create_pair_checked(&alice.id, &r.id).await.unwrap();

		let before = get_enforcer_config(&repo, &allocator, &enforcer.id).await.unwrap();
		assert_eq!(before.policies[0].allowed_cidrs[0].mode, Mode::Enforce);

		repo.update_resource_mode(&r.id, Mode::Observe).await.unwrap();

		let after = get_enforcer_config(&repo, &allocator, &enforcer.id).await.unwrap();
		assert_ne!(before, after);
		assert_eq!(after.policies[0].allowed_cidrs[0].mode, Mode::Observe);
	}
}
