// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Kernel tunnel reconciliation.
//!
//! One interface, one private key, one peer per enforcer. Applying a config
//! replaces the full address set, the full peer set, and the routes for every
//! allowed CIDR; more-specific routes outrank any coexisting VPN default.
//! These calls talk to the kernel and block; callers run them on a blocking
//! task.

use crate::error::{AgentError, Result};
use defguard_wireguard_rs::host::Peer;
use defguard_wireguard_rs::key::Key;
use defguard_wireguard_rs::net::IpAddrMask;
use defguard_wireguard_rs::{InterfaceConfiguration, Kernel, WGApi, WireguardInterfaceApi};
use palisade_common::{ClientConfig, WgKeyPair};
use std::net::{IpAddr, ToSocketAddrs};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct TunnelState {
	pub exists: bool,
	pub peer_count: usize,
}

/// One enforcer projected into peer form, validated and ready to install.
#[derive(Debug, Clone)]
pub struct EnforcerPeer {
	pub tunnel_ip: String,
	pub public_key: String,
	pub endpoint: String,
	pub allowed_cidrs: Vec<String>,
}

/// Projects a fetched config into peer specs, rejecting entries the kernel
/// could not be programmed with.
pub fn peers_from_config(config: &ClientConfig) -> Result<Vec<EnforcerPeer>> {
	if config.enforcers.is_empty() {
		return Err(AgentError::config("no enforcers in client config"));
	}

	let mut peers = Vec::with_capacity(config.enforcers.len());
	for enforcer in &config.enforcers {
		if enforcer.enforcer_public_key.is_empty() || enforcer.enforcer_endpoint.is_empty() {
			return Err(AgentError::config(format!(
				"enforcer {} is missing public key or endpoint",
				enforcer.enforcer_id
			)));
		}
		peers.push(EnforcerPeer {
			tunnel_ip: enforcer.tunnel_ip.clone(),
			public_key: enforcer.enforcer_public_key.clone(),
			endpoint: enforcer.enforcer_endpoint.clone(),
			allowed_cidrs: enforcer.allowed_cidrs.clone(),
		});
	}
	Ok(peers)
}

pub fn apply(interface: &str, keypair: &WgKeyPair, enforcers: &[EnforcerPeer]) -> Result<()> {
	if interface.is_empty() {
		return Err(AgentError::config("interface name is required"));
	}
	if enforcers.is_empty() {
		return Err(AgentError::config("at least one enforcer is required"));
	}

	let wgapi = WGApi::<Kernel>::new(interface.to_string())?;
	ensure_interface(&wgapi)?;

	let mut addresses = Vec::with_capacity(enforcers.len());
	for enforcer in enforcers {
		if enforcer.tunnel_ip.is_empty() {
			continue;
		}
		let address: IpAddrMask = enforcer
			.tunnel_ip
			.parse()
			.map_err(|_| AgentError::config(format!("invalid tunnel ip {:?}", enforcer.tunnel_ip)))?;
		addresses.push(address);
	}

	let mut peers = Vec::with_capacity(enforcers.len());
	for enforcer in enforcers {
		let key = Key::try_from(enforcer.public_key.as_str())
			.map_err(|_| AgentError::config(format!("invalid enforcer public key {:?}", enforcer.public_key)))?;

		let endpoint = enforcer
			.endpoint
			.to_socket_addrs()
			.map_err(|e| AgentError::config(format!("resolve endpoint {:?}: {e}", enforcer.endpoint)))?
			.next()
			.ok_or_else(|| AgentError::config(format!("endpoint {:?} resolved to nothing", enforcer.endpoint)))?;

		let mut peer = Peer::new(key);
		peer.endpoint = Some(endpoint);
		peer.persistent_keepalive_interval = Some(25);
		for cidr in &enforcer.allowed_cidrs {
			let allowed: IpAddrMask = cidr
				.parse()
				.map_err(|_| AgentError::config(format!("invalid allowed CIDR {cidr:?}")))?;
			if matches!(allowed.ip, IpAddr::V6(_)) {
				debug!(%cidr, "skipping non-IPv4 CIDR");
				continue;
			}
			peer.allowed_ips.push(allowed);
		}
		peers.push(peer);
	}

	let config = InterfaceConfiguration {
		name: interface.to_string(),
		prvkey: keypair.private_key().to_base64(),
		addresses,
		port: 0,
		peers,
		mtu: None,
	};

	wgapi.configure_interface(&config)?;
	wgapi.configure_peer_routing(&config.peers)?;

	info!(interface, peers = config.peers.len(), "tunnel configured");
	Ok(())
}

/// Removes the interface. Already-gone interfaces are a no-op.
pub fn down(interface: &str) -> Result<()> {
	if interface.is_empty() {
		return Err(AgentError::config("interface name is required"));
	}

	let wgapi = WGApi::<Kernel>::new(interface.to_string())?;
	if wgapi.read_interface_data().is_err() {
		debug!(interface, "interface already gone");
		return Ok(());
	}
	wgapi.remove_interface()?;
	info!(interface, "tunnel removed");
	Ok(())
}

pub fn read_state(interface: &str) -> Result<TunnelState> {
	if interface.is_empty() {
		return Err(AgentError::config("interface name is required"));
	}

	let wgapi = WGApi::<Kernel>::new(interface.to_string())?;
	match wgapi.read_interface_data() {
		Ok(host) => Ok(TunnelState {
			exists: true,
			peer_count: host.peers.len(),
		}),
		Err(_) => Ok(TunnelState {
			exists: false,
			peer_count: 0,
		}),
	}
}

fn ensure_interface(wgapi: &WGApi<Kernel>) -> Result<()> {
	if wgapi.read_interface_data().is_ok() {
		return Ok(());
	}
	wgapi.create_interface()?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use palisade_common::ClientEnforcerConfig;

	fn config_with(enforcers: Vec<ClientEnforcerConfig>) -> ClientConfig {
		ClientConfig {
			client_id: "c1".into(),
			wg_public_key: "pk".into(),
			enforcers,
		}
	}

	#[test]
	fn empty_config_is_rejected() {
		let err = peers_from_config(&config_with(vec![])).unwrap_err();
		assert!(matches!(err, AgentError::Config(_)));
	}

	#[test]
	fn missing_enforcer_key_is_rejected() {
		let config = config_with(vec![ClientEnforcerConfig {
			enforcer_id: "e1".into(),
			tunnel_ip: "10.8.0.2/24".into(),
			enforcer_public_key: String::new(),
			enforcer_endpoint: "enf.example.com:51820".into(),
			allowed_cidrs: vec![],
		}]);
		assert!(peers_from_config(&config).is_err());
	}

	#[test]
	fn valid_config_projects_all_enforcers() {
		let config = config_with(vec![
			ClientEnforcerConfig {
				enforcer_id: "e1".into(),
				tunnel_ip: "10.8.0.2/24".into(),
				enforcer_public_key: "k1".into(),
				enforcer_endpoint: "a.example.com:51820".into(),
				allowed_cidrs: vec!["192.168.10.0/24".into()],
			},
			ClientEnforcerConfig {
				enforcer_id: "e2".into(),
				tunnel_ip: "10.9.0.2/24".into(),
				enforcer_public_key: "k2".into(),
				enforcer_endpoint: "b.example.com:51820".into(),
				allowed_cidrs: vec!["192.168.20.5/32".into()],
			},
		]);
		let peers = peers_from_config(&config).unwrap();
		assert_eq!(peers.len(), 2);
		assert_eq!(peers[0].allowed_cidrs, vec!["192.168.10.0/24"]);
	}
}
