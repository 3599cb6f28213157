// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stored entities.
//!
//! Identifiers are opaque UUID strings assigned at creation. Credential
//! digests use Argon2; verification goes through the digest and is
//! constant-time with respect to the secret.

use crate::error::{Error, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use palisade_common::Mode;
use serde::Serialize;
use uuid::Uuid;

pub const API_KEY_PREFIX: &str = "enf";

#[derive(Debug, Clone, Serialize)]
pub struct Client {
	pub id: String,
	pub name: String,
	pub username: String,
	#[serde(skip_serializing)]
	pub password_digest: String,
	pub wg_public_key: String,
	pub created_at: DateTime<Utc>,
}

impl Client {
	pub fn new(name: &str, username: &str, password: &str, wg_public_key: &str) -> Result<Self> {
		let password_digest = hash_secret(password)?;
		Ok(Self {
			id: Uuid::new_v4().to_string(),
			name: name.to_string(),
			username: username.to_string(),
			password_digest,
			wg_public_key: wg_public_key.to_string(),
			created_at: Utc::now(),
		})
	}

	pub fn verify_password(&self, password: &str) -> bool {
		verify_secret(password, &self.password_digest)
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct Enforcer {
	pub id: String,
	pub name: String,
	/// Public endpoint clients dial, e.g. `enf.example.com:51820`.
	pub endpoint: String,
	/// IPv4 tunnel subnet owned by this enforcer. Its first usable address
	/// is the enforcer itself; the rest are assignable to clients.
	pub tunnel_subnet: String,
	pub wg_public_key: String,
	#[serde(skip_serializing)]
	pub api_key_digest: String,
	pub created_at: DateTime<Utc>,
}

impl Enforcer {
	/// Creates an enforcer and mints its API key. The cleartext key is
	/// returned exactly once; only the digest is stored.
	pub fn new(name: &str, endpoint: &str, tunnel_subnet: &str) -> Result<(Self, String)> {
		let id = Uuid::new_v4().to_string();
		let secret = Uuid::new_v4().to_string();
		let api_key = format!("{API_KEY_PREFIX}_{id}_{secret}");
		let api_key_digest = hash_secret(&api_key)?;

		let enforcer = Self {
			id,
			name: name.to_string(),
			endpoint: endpoint.to_string(),
			tunnel_subnet: tunnel_subnet.to_string(),
			wg_public_key: String::new(),
			api_key_digest,
			created_at: Utc::now(),
		};
		Ok((enforcer, api_key))
	}

	pub fn verify_api_key(&self, api_key: &str) -> bool {
		verify_secret(api_key, &self.api_key_digest)
	}

	/// The enforcer's own tunnel address: the subnet's first usable host with
	/// the subnet's prefix length, e.g. `10.8.0.1/24`.
	pub fn tunnel_address(&self) -> Result<String> {
		let net: Ipv4Net = self
			.tunnel_subnet
			.parse()
			.map_err(|_| Error::validation(format!("invalid tunnel subnet {:?}", self.tunnel_subnet)))?;
		let mut octets = net.network().octets();
		octets[3] = 1;
		Ok(format!(
			"{}.{}.{}.{}/{}",
			octets[0],
			octets[1],
			octets[2],
			octets[3],
			net.prefix_len()
		))
	}
}

/// Extracts the enforcer id from an API key of the form `enf_<id>_<secret>`.
pub fn parse_api_key(api_key: &str) -> Option<&str> {
	let mut parts = api_key.splitn(3, '_');
	let prefix = parts.next()?;
	let id = parts.next()?;
	let secret = parts.next()?;
	if prefix != API_KEY_PREFIX || id.is_empty() || secret.is_empty() {
		return None;
	}
	Some(id)
}

#[derive(Debug, Clone, Serialize)]
pub struct Resource {
	pub id: String,
	pub name: String,
	pub cidr: String,
	pub mode: Mode,
	pub enforcer_id: String,
	pub created_at: DateTime<Utc>,
}

impl Resource {
	pub fn new(name: &str, cidr: &str, enforcer_id: &str, mode: Mode) -> Self {
		Self {
			id: Uuid::new_v4().to_string(),
			name: name.to_string(),
			cidr: cidr.to_string(),
			mode,
			enforcer_id: enforcer_id.to_string(),
			created_at: Utc::now(),
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct Pair {
	pub id: String,
	pub client_id: String,
	pub resource_id: String,
	pub created_at: DateTime<Utc>,
}

impl Pair {
	pub fn new(client_id: &str, resource_id: &str) -> Self {
		Self {
			id: Uuid::new_v4().to_string(),
			client_id: client_id.to_string(),
			resource_id: resource_id.to_string(),
			created_at: Utc::now(),
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientSession {
	pub id: String,
	pub client_id: String,
	/// Enforcer the session was minted against.
	pub enforcer_id: String,
	pub token: String,
	pub tunnel_ip: String,
	pub expires_at: DateTime<Utc>,
	pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
	pub id: String,
	pub enforcer_id: String,
	pub client_id: String,
	pub client_name: String,
	pub resource_id: String,
	pub resource_name: String,
	pub src_ip: String,
	pub dst_ip: String,
	pub protocol: String,
	pub src_port: u16,
	pub dst_port: u16,
	pub length: u64,
	pub timestamp: DateTime<Utc>,
}

fn hash_secret(secret: &str) -> Result<String> {
	let salt = SaltString::generate(&mut OsRng);
	Argon2::default()
		.hash_password(secret.as_bytes(), &salt)
		.map(|hash| hash.to_string())
		.map_err(|_| Error::Internal("failed to hash secret".to_string()))
}

fn verify_secret(secret: &str, digest: &str) -> bool {
	let Ok(parsed) = PasswordHash::new(digest) else {
		return false;
	};
	Argon2::default()
		.verify_password(secret.as_bytes(), &parsed)
		.is_ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn client_password_verifies() {
		let client = Client::new("Alice", "alice", "hunter2", "").unwrap();
		assert!(client.verify_password("hunter2"));
		assert!(!client.verify_password("hunter3"));
		assert!(!client.password_digest.contains("hunter2"));
	}

	#[test]
	fn enforcer_api_key_mint_and_verify() {
		let (enforcer, api_key) = Enforcer::new("site-a", "enf.example.com:51820", "10.8.0.0/24").unwrap();
		assert!(api_key.starts_with("enf_"));
		assert!(enforcer.verify_api_key(&api_key));
		assert!(!enforcer.verify_api_key("enf_nope_nope"));
	}

	#[test]
	fn parse_api_key_extracts_id() {
		let (enforcer, api_key) = Enforcer::new("site-a", "enf.example.com:51820", "10.8.0.0/24").unwrap();
		assert_eq!(parse_api_key(&api_key), Some(enforcer.id.as_str()));
	}

	#[test]
	fn parse_api_key_rejects_malformed() {
		assert_eq!(parse_api_key("gw_abc_def"), None);
		assert_eq!(parse_api_key("enf_onlyid"), None);
		assert_eq!(parse_api_key("enf__secret"), None);
		assert_eq!(parse_api_key(""), None);
	}

	#[test]
	fn parse_api_key_keeps_underscores_in_secret() {
		assert_eq!(parse_api_key("enf_id_se_cr_et"), Some("id"));
	}

	#[test]
	fn tunnel_address_is_first_usable() {
		let (enforcer, _) = Enforcer::new("site-a", "enf.example.com:51820", "10.8.0.0/24").unwrap();
		assert_eq!(enforcer.tunnel_address().unwrap(), "10.8.0.1/24");
	}

	#[test]
	fn tunnel_address_rejects_garbage() {
		let (mut enforcer, _) = Enforcer::new("site-a", "enf.example.com:51820", "10.8.0.0/24").unwrap();
		enforcer.tunnel_subnet = "not-a-subnet".to_string();
		assert!(enforcer.tunnel_address().is_err());
	}
}
