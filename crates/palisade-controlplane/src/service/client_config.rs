// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! ClientConfig derivation.
//!
//! A client's config contains one entry per enforcer it qualifies for:
//! enforcers hosting a resource the client is paired to, plus every enforcer
//! hosting an observe-mode resource. Per enforcer, the allowed CIDRs are the
//! union of observe resources and the client's paired resources there,
//! deduplicated and sorted, so two derivations with no intervening state
//! change produce identical output.

use crate::error::{Error, Result};
use crate::repository::Repository;
use crate::service::tunnel_ip::TunnelIpAllocator;
use ipnet::Ipv4Net;
use palisade_common::{ClientConfig, ClientEnforcerConfig, Mode};
use std::collections::BTreeSet;
use tracing::instrument;

#[instrument(skip(repo, allocator))]
pub async fn get_client_config(
	repo: &Repository,
	allocator: &TunnelIpAllocator,
	client_id: &str,
) -> Result<ClientConfig> {
	let data = repo.client_config_data(client_id).await?;
	if data.enforcers.is_empty() {
		return Err(Error::validation("no resources available for client"));
	}

	let mut enforcers = Vec::with_capacity(data.enforcers.len());
	for enforcer in &data.enforcers {
		let tunnel_ip = allocator.allocate(&enforcer.id, client_id, &enforcer.tunnel_subnet)?;

		let subnet: Ipv4Net = enforcer
			.tunnel_subnet
			.parse()
			.map_err(|_| Error::validation(format!("invalid tunnel subnet {:?}", enforcer.tunnel_subnet)))?;

		let mut cidrs = BTreeSet::new();
		if let Some(resources) = data.resources_by_enforcer.get(&enforcer.id) {
			for resource in resources {
				if resource.mode == Mode::Observe {
					cidrs.insert(resource.cidr.clone());
				}
			}
		}
		for resource in &data.paired_resources {
			if resource.enforcer_id == enforcer.id {
				cidrs.insert(resource.cidr.clone());
			}
		}

		enforcers.push(ClientEnforcerConfig {
			enforcer_id: enforcer.id.clone(),
			tunnel_ip: format!("{}/{}", tunnel_ip, subnet.prefix_len()),
			enforcer_public_key: enforcer.wg_public_key.clone(),
			enforcer_endpoint: enforcer.endpoint.clone(),
			allowed_cidrs: cidrs.into_iter().collect(),
		});
	}

	// client_config_data returns enforcers ordered by id already; keep the
	// derivation independent of that detail.
	enforcers.sort_by(|a, b| a.enforcer_id.cmp(&b.enforcer_id));

	Ok(ClientConfig {
		client_id: data.client.id,
		wg_public_key: data.client.wg_public_key,
		enforcers,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::db::create_test_pool;
	use crate::model::{Client, Enforcer, Resource};

	async fn test_repo() -> Repository {
		Repository::new(create_test_pool().await)
	}

	async fn seed(repo: &Repository) -> (Client, Enforcer) {
		let client = Client::new("Alice", "alice", "pw", "pk-alice").unwrap();
		repo.create_client(&client).await.unwrap();
		let (enforcer, _) = Enforcer::new("e1", "enf.example.com:51820", "10.8.0.0/24").unwrap();
		repo.create_enforcer(&enforcer).await.unwrap();
		(client, enforcer)
	}

	#[tokio::test]
	async fn observe_only_client_sees_observe_cidrs() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		let (client, enforcer) = seed(&repo).await;
		repo.create_resource(&Resource::new("r1", "192.168.10.0/24", &enforcer.id, Mode::Observe))
			.await
			.unwrap();

		let config = get_client_config(&repo, &allocator, &client.id).await.unwrap();
		assert_eq!(config.client_id, client.id);
		assert_eq!(config.enforcers.len(), 1);

		let entry = &config.enforcers[0];
		assert_eq!(entry.enforcer_id, enforcer.id);
		assert_eq!(entry.tunnel_ip, "10.8.0.2/24");
		assert_eq!(entry.allowed_cidrs, vec!["192.168.10.0/24"]);
	}

	#[tokio::test]
	async fn pairing_adds_enforce_cidr() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		let (client, enforcer) = seed(&repo).await;
		repo.create_resource(&Resource::new("r1", "192.168.10.0/24", &enforcer.id, Mode::Observe))
			.await
			.unwrap();
		let r2 = Resource::new("r2", "192.168.20.5/32", &enforcer.id, Mode::Enforce);
		repo.create_resource(&r2).await.unwrap();
		repo.create_pair_checked(&client.id, &r2.id).await.unwrap();

		let config = get_client_config(&repo, &allocator, &client.id).await.unwrap();
		assert_eq!(
			config.enforcers[0].allowed_cidrs,
			vec!["192.168.10.0/24", "192.168.20.5/32"]
		);
	}

	#[tokio::test]
	async fn unpaired_enforce_resource_is_excluded() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		let (client, enforcer) = seed(&repo).await;
		repo.create_resource(&Resource::new("r1", "192.168.10.0/24", &enforcer.id, Mode::Observe))
			.await
			.unwrap();
		repo.create_resource(&Resource::new("r2", "192.168.20.5/32", &enforcer.id, Mode::Enforce))
			.await
			.unwrap();

		let config = get_client_config(&repo, &allocator, &client.id).await.unwrap();
		assert_eq!(config.enforcers[0].allowed_cidrs, vec!["192.168.10.0/24"]);
	}

	#[tokio::test]
	async fn cidrs_are_sorted_and_deduplicated() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		let (client, enforcer) = seed(&repo).await;
		repo.create_resource(&Resource::new("z", "192.168.30.0/24", &enforcer.id, Mode::Observe))
			.await
			.unwrap();
		repo.create_resource(&Resource::new("a", "192.168.10.0/24", &enforcer.id, Mode::Observe))
			.await
			.unwrap();
		// A paired enforce resource sharing a CIDR with an observe one.
		let dup = Resource::new("dup", "192.168.10.0/24", &enforcer.id, Mode::Enforce);
		repo.create_resource(&dup).await.unwrap();
		repo.create_pair_checked(&client.id, &dup.id).await.unwrap();

		let config = get_client_config(&repo, &allocator, &client.id).await.unwrap();
		assert_eq!(
			config.enforcers[0].allowed_cidrs,
			vec!["192.168.10.0/24", "192.168.30.0/24"]
		);
	}

	#[tokio::test]
	async fn derivation_is_deterministic() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		let (client, enforcer) = seed(&repo).await;
		repo.create_resource(&Resource::new("r1", "192.168.10.0/24", &enforcer.id, Mode::Observe))
			.await
			.unwrap();
		let (other, _) = Enforcer::new("e2", "other.example.com:51820", "10.9.0.0/24").unwrap();
		repo.create_enforcer(&other).await.unwrap();
		repo.create_resource(&Resource::new("r3", "192.168.40.0/24", &other.id, Mode::Observe))
			.await
			.unwrap();

		let first = get_client_config(&repo, &allocator, &client.id).await.unwrap();
		let second = get_client_config(&repo, &allocator, &client.id).await.unwrap();
		assert_eq!(first, second);

		let json_a = serde_json::to_vec(&first).unwrap();
		let json_b = serde_json::to_vec(&second).unwrap();
		assert_eq!(json_a, json_b);
	}

	#[tokio::test]
	async fn no_qualifying_enforcer_is_validation_error() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		let (client, _) = seed(&repo).await;

		let err = get_client_config(&repo, &allocator, &client.id).await.unwrap_err();
		assert!(matches!(err, Error::Validation(_)));
	}

	#[tokio::test]
	async fn multi_enforcer_config_lists_all_qualifying() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		let (client, e1) = seed(&repo).await;
		repo.create_resource(&Resource::new("r1", "192.168.10.0/24", &e1.id, Mode::Observe))
			.await
			.unwrap();
		let (e2, _) = Enforcer::new("e2", "other.example.com:51820", "10.9.0.0/24").unwrap();
		repo.create_enforcer(&e2).await.unwrap();
		let r2 = Resource::new("r2", "192.168.20.5/32", &e2.id, Mode::Enforce);
		repo.create_resource(&r2).await.unwrap();
		repo.create_pair_checked(&client.id, &r2.id).await.unwrap();

		let config = get_client_config(&repo, &allocator, &client.id).await.unwrap();
		assert_eq!(config.enforcers.len(), 2);
		let ids: Vec<&str> = config.enforcers.iter().map(|e| e.enforcer_id.as_str()).collect();
		let mut sorted = ids.clone();
		sorted.sort();
		assert_eq!(ids, sorted);
	}
}
