// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identity lookup tables.
//!
//! Two read-mostly lists rebuilt on every policy update and swapped under a
//! write lock: tunnel-address CIDRs naming clients, resource CIDRs naming
//! resources. Lookups are a linear scan; table sizes are tens to low
//! hundreds. IPv6 entries stay in the tables for log visibility even though
//! the data plane never programs them.

use ipnet::IpNet;
use palisade_common::Policy;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::RwLock;

#[derive(Debug, Clone)]
struct CidrEntry {
	net: IpNet,
	id: String,
	name: String,
}

#[derive(Debug, Default)]
struct Tables {
	peers: Vec<CidrEntry>,
	resources: Vec<CidrEntry>,
}

#[derive(Debug, Default)]
pub struct LookupTables {
	inner: RwLock<Tables>,
}

impl LookupTables {
	pub fn new() -> Self {
		Self::default()
	}

	/// Rebuilds both tables from the given policies and swaps them in.
	/// Unparseable CIDRs are skipped; resources deduplicate by CIDR.
	pub fn update(&self, policies: &[Policy]) {
		let mut peers = Vec::new();
		let mut resources = Vec::new();
		let mut seen_resource_cidrs = HashSet::new();

		for policy in policies {
			for cidr in &policy.allowed_ips {
				let Ok(net) = cidr.parse::<IpNet>() else {
					continue;
				};
				peers.push(CidrEntry {
					net,
					id: policy.client_id.clone(),
					name: policy.client_name.clone(),
				});
			}
			for target in &policy.allowed_cidrs {
				if !seen_resource_cidrs.insert(target.cidr.clone()) {
					continue;
				}
				let Ok(net) = target.cidr.parse::<IpNet>() else {
					continue;
				};
				resources.push(CidrEntry {
					net,
					id: target.resource_id.clone(),
					name: target.resource_name.clone(),
				});
			}
		}

		let mut tables = self.inner.write().expect("lookup table lock poisoned");
		tables.peers = peers;
		tables.resources = resources;
	}

	pub fn match_client(&self, ip: IpAddr) -> Option<(String, String)> {
		let tables = self.inner.read().expect("lookup table lock poisoned");
		tables
			.peers
			.iter()
			.find(|entry| entry.net.contains(&ip))
			.map(|entry| (entry.id.clone(), entry.name.clone()))
	}

	pub fn match_resource(&self, ip: IpAddr) -> Option<(String, String)> {
		let tables = self.inner.read().expect("lookup table lock poisoned");
		tables
			.resources
			.iter()
			.find(|entry| entry.net.contains(&ip))
			.map(|entry| (entry.id.clone(), entry.name.clone()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use palisade_common::{Mode, PolicyTarget};

	fn sample_policies() -> Vec<Policy> {
		vec![
			Policy {
				client_id: "c1".into(),
				client_name: "alice".into(),
				wg_public_key: "pk1".into(),
				allowed_ips: vec!["10.8.0.2/32".into()],
				allowed_cidrs: vec![PolicyTarget {
					cidr: "192.168.10.0/24".into(),
					mode: Mode::Observe,
					resource_id: "r1".into(),
					resource_name: "intranet".into(),
				}],
			},
			Policy {
				client_id: "c2".into(),
				client_name: "bob".into(),
				wg_public_key: "pk2".into(),
				allowed_ips: vec!["10.8.0.3/32".into()],
				allowed_cidrs: vec![
					PolicyTarget {
						cidr: "192.168.10.0/24".into(),
						mode: Mode::Observe,
						resource_id: "r1".into(),
						resource_name: "intranet".into(),
					},
					PolicyTarget {
						cidr: "192.168.20.5/32".into(),
						mode: Mode::Enforce,
						resource_id: "r2".into(),
						resource_name: "db".into(),
					},
				],
			},
		]
	}

	#[test]
	fn matches_client_by_tunnel_ip() {
		let tables = LookupTables::new();
		tables.update(&sample_policies());

		let (id, name) = tables.match_client("10.8.0.3".parse().unwrap()).unwrap();
		assert_eq!(id, "c2");
		assert_eq!(name, "bob");
	}

	#[test]
	fn matches_resource_by_destination() {
		let tables = LookupTables::new();
		tables.update(&sample_policies());

		let (id, name) = tables.match_resource("192.168.20.5".parse().unwrap()).unwrap();
		assert_eq!(id, "r2");
		assert_eq!(name, "db");

		let (id, _) = tables.match_resource("192.168.10.77".parse().unwrap()).unwrap();
		assert_eq!(id, "r1");
	}

	#[test]
	fn unknown_addresses_have_no_identity() {
		let tables = LookupTables::new();
		tables.update(&sample_policies());

		assert!(tables.match_client("10.99.0.1".parse().unwrap()).is_none());
		assert!(tables.match_resource("8.8.8.8".parse().unwrap()).is_none());
	}

	#[test]
	fn update_replaces_previous_tables() {
		let tables = LookupTables::new();
		tables.update(&sample_policies());
		tables.update(&[]);

		assert!(tables.match_client("10.8.0.2".parse().unwrap()).is_none());
	}

	#[test]
	fn resources_deduplicate_by_cidr() {
		let tables = LookupTables::new();
		tables.update(&sample_policies());

		// Both policies carry 192.168.10.0/24; the first entry wins.
		let (id, _) = tables.match_resource("192.168.10.1".parse().unwrap()).unwrap();
		assert_eq!(id, "r1");
	}

	#[test]
	fn ipv6_entries_are_matchable() {
		let tables = LookupTables::new();
		let mut policies = sample_policies();
		policies[0].allowed_ips.push("fd00::2/128".into());
		tables.update(&policies);

		let (id, _) = tables.match_client("fd00::2".parse().unwrap()).unwrap();
		assert_eq!(id, "c1");
	}
}
