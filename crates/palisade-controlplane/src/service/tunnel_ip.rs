// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tunnel IP allocation.
//!
//! Each enforcer owns an IPv4 subnet: `.1` is the enforcer itself, `.2` and
//! up are assignable to clients. The table is process-local and keyed by
//! (enforcer, client); a restart resets assignments, so reconnecting clients
//! may receive a different address. Allocation is idempotent: the same
//! client always gets its remembered address back.

use crate::error::{Error, Result};
use ipnet::Ipv4Net;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct TunnelIpAllocator {
	// enforcer id -> client id -> address
	table: Mutex<HashMap<String, HashMap<String, Ipv4Addr>>>,
}

impl TunnelIpAllocator {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the address previously allocated to the client on this
	/// enforcer, if any.
	pub fn lookup(&self, enforcer_id: &str, client_id: &str) -> Option<Ipv4Addr> {
		let table = self.table.lock().expect("allocator mutex poisoned");
		table.get(enforcer_id)?.get(client_id).copied()
	}

	/// Allocates an address for the client within the enforcer's subnet.
	/// Existing allocations are returned unchanged; new ones take the first
	/// free address scanning from `.2`, never reaching `.255`.
	pub fn allocate(&self, enforcer_id: &str, client_id: &str, subnet: &str) -> Result<Ipv4Addr> {
		let mut table = self.table.lock().expect("allocator mutex poisoned");
		let allocations = table.entry(enforcer_id.to_string()).or_default();

		if let Some(ip) = allocations.get(client_id) {
			return Ok(*ip);
		}

		let net: Ipv4Net = subnet
			.parse()
			.map_err(|_| Error::validation(format!("invalid tunnel subnet {subnet:?}")))?;

		let base = net.network().octets();
		for host in 2..255u8 {
			let candidate = Ipv4Addr::new(base[0], base[1], base[2], host);
			if !net.contains(&candidate) {
				break;
			}
			if allocations.values().any(|used| *used == candidate) {
				continue;
			}
			allocations.insert(client_id.to_string(), candidate);
			return Ok(candidate);
		}

		Err(Error::validation("no available IP in subnet"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn allocation_starts_at_dot_two() {
		let allocator = TunnelIpAllocator::new();
		let ip = allocator.allocate("e1", "c1", "10.8.0.0/24").unwrap();
		assert_eq!(ip, Ipv4Addr::new(10, 8, 0, 2));
	}

	#[test]
	fn allocation_is_idempotent() {
		let allocator = TunnelIpAllocator::new();
		let first = allocator.allocate("e1", "c1", "10.8.0.0/24").unwrap();
		let second = allocator.allocate("e1", "c1", "10.8.0.0/24").unwrap();
		assert_eq!(first, second);
	}

	#[test]
	fn distinct_clients_get_distinct_addresses() {
		let allocator = TunnelIpAllocator::new();
		let c1 = allocator.allocate("e1", "c1", "10.8.0.0/24").unwrap();
		let c2 = allocator.allocate("e1", "c2", "10.8.0.0/24").unwrap();
		assert_eq!(c1, Ipv4Addr::new(10, 8, 0, 2));
		assert_eq!(c2, Ipv4Addr::new(10, 8, 0, 3));
	}

	#[test]
	fn enforcers_have_independent_tables() {
		let allocator = TunnelIpAllocator::new();
		let a = allocator.allocate("e1", "c1", "10.8.0.0/24").unwrap();
		let b = allocator.allocate("e2", "c1", "10.9.0.0/24").unwrap();
		assert_eq!(a, Ipv4Addr::new(10, 8, 0, 2));
		assert_eq!(b, Ipv4Addr::new(10, 9, 0, 2));
	}

	#[test]
	fn lookup_sees_only_existing_allocations() {
		let allocator = TunnelIpAllocator::new();
		assert!(allocator.lookup("e1", "c1").is_none());
		let ip = allocator.allocate("e1", "c1", "10.8.0.0/24").unwrap();
		assert_eq!(allocator.lookup("e1", "c1"), Some(ip));
	}

	#[test]
	fn subnet_exhaustion_is_a_validation_error() {
		let allocator = TunnelIpAllocator::new();
		// A /29 spans .0-.7; the scan starts at .2, so six clients fit.
		for i in 0..6 {
			allocator.allocate("e1", &format!("c{i}"), "10.8.0.0/29").unwrap();
		}
		let err = allocator.allocate("e1", "c6", "10.8.0.0/29").unwrap_err();
		assert!(matches!(err, Error::Validation(_)));
	}

	#[test]
	fn rejects_invalid_subnet() {
		let allocator = TunnelIpAllocator::new();
		assert!(allocator.allocate("e1", "c1", "garbage").is_err());
	}

	#[test]
	fn concurrent_allocations_stay_unique() {
		use std::sync::Arc;

		let allocator = Arc::new(TunnelIpAllocator::new());
		let handles: Vec<_> = (0..20)
			.map(|i| {
				let allocator = Arc::clone(&allocator);
				std::thread::spawn(move || {
					allocator
						.allocate("e1", &format!("c{i}"), "10.8.0.0/24")
						.unwrap()
				})
			})
			.collect();

		let mut ips: Vec<Ipv4Addr> = handles.into_iter().map(|h| h.join().unwrap()).collect();
		ips.sort();
		ips.dedup();
		assert_eq!(ips.len(), 20);
	}
}
