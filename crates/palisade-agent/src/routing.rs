// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Route-table inspection for conflict detection.
//!
//! For each allowed CIDR, `status` wants to know which interface the kernel
//! would actually use. The most specific covering prefix wins; any additional
//! covering route (a corporate VPN, say) is flagged as a conflict.

use crate::error::Result;
use futures::TryStreamExt;
use ipnet::Ipv4Net;
use netlink_packet_route::link::LinkAttribute;
use netlink_packet_route::route::{RouteAddress, RouteAttribute};
use rtnetlink::IpVersion;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
	pub interface: String,
	pub cidr: String,
	pub prefix_len: u8,
}

#[derive(Debug, Clone)]
pub struct ResourceRouting {
	pub resource_cidr: String,
	/// Covering routes, most specific first.
	pub routes: Vec<RouteInfo>,
	/// Interface the kernel would pick, when any route covers the CIDR.
	pub preferred: Option<String>,
	pub has_conflict: bool,
}

/// Orders covering routes by specificity, most specific prefix first.
pub fn rank_routes(mut routes: Vec<RouteInfo>) -> Vec<RouteInfo> {
	routes.sort_by(|a, b| b.prefix_len.cmp(&a.prefix_len));
	routes
}

pub fn resolve_against_table(
	allowed_cidrs: &[String],
	table: &[(Ipv4Net, String)],
) -> Vec<ResourceRouting> {
	let mut results = Vec::with_capacity(allowed_cidrs.len());

	for cidr in allowed_cidrs {
		let Ok(target) = cidr.parse::<Ipv4Net>() else {
			continue;
		};
		let target_ip = target.network();

		let covering: Vec<RouteInfo> = table
			.iter()
			.filter(|(net, _)| net.contains(&target_ip))
			.map(|(net, interface)| RouteInfo {
				interface: interface.clone(),
				cidr: net.to_string(),
				prefix_len: net.prefix_len(),
			})
			.collect();

		let routes = rank_routes(covering);
		let preferred = routes.first().map(|r| r.interface.clone());
		let has_conflict = routes.len() > 1;

		results.push(ResourceRouting {
			resource_cidr: cidr.clone(),
			routes,
			preferred,
			has_conflict,
		});
	}

	results
}

/// Reads the kernel's IPv4 routing table and resolves the preferred interface
/// for each allowed CIDR. The default route is ignored; only explicit
/// destinations count as coverage.
#[instrument(skip_all, fields(cidrs = allowed_cidrs.len()))]
pub async fn resolve_preferred_interfaces(allowed_cidrs: &[String]) -> Result<Vec<ResourceRouting>> {
	let (connection, handle, _) = rtnetlink::new_connection()?;
	tokio::spawn(connection);

	let mut interface_names: HashMap<u32, String> = HashMap::new();
	let mut links = handle.link().get().execute();
	while let Some(link) = links.try_next().await? {
		let index = link.header.index;
		for attribute in link.attributes {
			if let LinkAttribute::IfName(name) = attribute {
				interface_names.insert(index, name);
				break;
			}
		}
	}

	let mut table: Vec<(Ipv4Net, String)> = Vec::new();
	let mut routes = handle.route().get(IpVersion::V4).execute();
	while let Some(route) = routes.try_next().await? {
		let prefix_len = route.header.destination_prefix_length;

		let mut destination: Option<Ipv4Addr> = None;
		let mut out_index: Option<u32> = None;
		for attribute in &route.attributes {
			match attribute {
				RouteAttribute::Destination(RouteAddress::Inet(addr)) => destination = Some(*addr),
				RouteAttribute::Oif(index) => out_index = Some(*index),
				_ => {}
			}
		}

		// No destination attribute means the default route.
		let (Some(destination), Some(out_index)) = (destination, out_index) else {
			continue;
		};
		let Some(interface) = interface_names.get(&out_index) else {
			continue;
		};
		let Ok(net) = Ipv4Net::new(destination, prefix_len) else {
			continue;
		};
		table.push((net, interface.clone()));
	}

	Ok(resolve_against_table(allowed_cidrs, &table))
}
