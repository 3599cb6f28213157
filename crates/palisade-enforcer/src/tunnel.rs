// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Kernel tunnel ownership on the enforcer host.
//!
//! The interface binds the configured listen port and carries the subnet's
//! first usable address. Peer rebuilds replace the full set: one peer per
//! policy with a registered key, AllowedIPs drawn from the policy's tunnel
//! addresses. Calls block; run them on a blocking task.

use crate::error::{EnforcerError, Result};
use defguard_wireguard_rs::host::Peer;
use defguard_wireguard_rs::key::Key;
use defguard_wireguard_rs::net::IpAddrMask;
use defguard_wireguard_rs::{InterfaceConfiguration, Kernel, WGApi, WireguardInterfaceApi};
use palisade_common::{Policy, WgKeyPair};
use std::net::IpAddr;
use tracing::{debug, info};

pub struct TunnelManager {
	interface: String,
	listen_port: u16,
	keypair: WgKeyPair,
	address: IpAddrMask,
}

impl TunnelManager {
	pub fn new(
		interface: &str,
		listen_port: u16,
		keypair: WgKeyPair,
		tunnel_address: &str,
	) -> Result<Self> {
		let address: IpAddrMask = tunnel_address
			.parse()
			.map_err(|_| EnforcerError::config(format!("invalid tunnel address {tunnel_address:?}")))?;

		Ok(Self {
			interface: interface.to_string(),
			listen_port,
			keypair,
			address,
		})
	}

	/// Creates the interface if needed and binds key, address, and port.
	pub fn setup(&self) -> Result<()> {
		let wgapi = self.api()?;
		if wgapi.read_interface_data().is_err() {
			wgapi.create_interface()?;
		}
		wgapi.configure_interface(&self.interface_configuration(Vec::new()))?;

		info!(interface = %self.interface, address = %self.address, port = self.listen_port, "tunnel interface configured");
		Ok(())
	}

	/// Rebuilds the peer set from the given policies, evicting stale peers.
	pub fn apply_peers(&self, policies: &[Policy]) -> Result<()> {
		let peers = peers_from_policies(policies)?;
		let count = peers.len();

		let wgapi = self.api()?;
		wgapi.configure_interface(&self.interface_configuration(peers))?;

		debug!(interface = %self.interface, peers = count, "peer set replaced");
		Ok(())
	}

	pub fn down(&self) -> Result<()> {
		let wgapi = self.api()?;
		if wgapi.read_interface_data().is_err() {
			return Ok(());
		}
		wgapi.remove_interface()?;
		info!(interface = %self.interface, "tunnel removed");
		Ok(())
	}

	fn api(&self) -> Result<WGApi<Kernel>> {
		Ok(WGApi::<Kernel>::new(self.interface.clone())?)
	}

	fn interface_configuration(&self, peers: Vec<Peer>) -> InterfaceConfiguration {
		InterfaceConfiguration {
			name: self.interface.clone(),
			prvkey: self.keypair.private_key().to_base64(),
			addresses: vec![self.address.clone()],
			port: u32::from(self.listen_port),
			peers,
			mtu: None,
		}
	}
}

/// Builds the WireGuard peer list from policies. Policies without a
/// registered key are skipped; non-IPv4 allowed addresses are excluded.
pub fn peers_from_policies(policies: &[Policy]) -> Result<Vec<Peer>> {
	let mut peers = Vec::with_capacity(policies.len());

	for policy in policies {
		if policy.wg_public_key.is_empty() {
			continue;
		}

		let key = Key::try_from(policy.wg_public_key.as_str()).map_err(|_| {
			EnforcerError::config(format!(
				"invalid public key for client {}",
				policy.client_id
			))
		})?;

		let mut peer = Peer::new(key);
		for cidr in &policy.allowed_ips {
			let allowed: IpAddrMask = cidr.parse().map_err(|_| {
				EnforcerError::config(format!(
					"invalid allowed ip {:?} for client {}",
					cidr, policy.client_id
				))
			})?;
			if matches!(allowed.ip, IpAddr::V6(_)) {
				continue;
			}
			peer.allowed_ips.push(allowed);
		}
		peers.push(peer);
	}

	Ok(peers)
}
