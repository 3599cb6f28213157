// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client and enforcer authentication.
//!
//! Client sessions carry an opaque bearer token with a 24-hour expiry. Login
//! binds the session to one enforcer (the first pair's, or the first
//! qualifying one for observe-only clients) but allocates tunnel addresses on
//! every qualifying enforcer so the derived client config can span all of
//! them under a single token.

use crate::error::{Error, Result};
use crate::model::{parse_api_key, ClientSession, Enforcer};
use crate::repository::Repository;
use crate::service::tunnel_ip::TunnelIpAllocator;
use chrono::{Duration, Utc};
use tracing::instrument;
use uuid::Uuid;

pub const CLIENT_SESSION_TTL_HOURS: i64 = 24;

#[instrument(skip_all, fields(username = %username))]
pub async fn client_login(
	repo: &Repository,
	allocator: &TunnelIpAllocator,
	username: &str,
	password: &str,
) -> Result<ClientSession> {
	let username = username.trim();
	let password = password.trim();
	if username.is_empty() || password.is_empty() {
		return Err(Error::validation("username and password are required"));
	}

	let client = repo
		.get_client_by_username(username)
		.await?
		.ok_or(Error::Unauthorized)?;

	if !client.verify_password(password) {
		return Err(Error::Unauthorized);
	}

	let data = repo.client_config_data(&client.id).await?;
	if data.enforcers.is_empty() {
		return Err(Error::validation("no resources assigned to client"));
	}

	for enforcer in &data.enforcers {
		allocator.allocate(&enforcer.id, &client.id, &enforcer.tunnel_subnet)?;
	}

	// The session is minted against the first pair's enforcer; an
	// observe-only client binds to the first qualifying enforcer instead.
	let session_enforcer_id = data
		.paired_resources
		.first()
		.map(|r| r.enforcer_id.clone())
		.unwrap_or_else(|| data.enforcers[0].id.clone());

	let tunnel_ip = allocator
		.lookup(&session_enforcer_id, &client.id)
		.ok_or_else(|| Error::Internal("allocation missing for session enforcer".to_string()))?;

	let now = Utc::now();
	let session = ClientSession {
		id: Uuid::new_v4().to_string(),
		client_id: client.id.clone(),
		enforcer_id: session_enforcer_id,
		token: Uuid::new_v4().to_string(),
		tunnel_ip: tunnel_ip.to_string(),
		expires_at: now + Duration::hours(CLIENT_SESSION_TTL_HOURS),
		created_at: now,
	};
	repo.create_session(&session).await?;

	tracing::info!(client_id = %session.client_id, enforcer_id = %session.enforcer_id, "client logged in");
	Ok(session)
}

#[instrument(skip_all)]
pub async fn validate_client_token(repo: &Repository, token: &str) -> Result<ClientSession> {
	let token = token.trim();
	if token.is_empty() {
		return Err(Error::Unauthorized);
	}

	let session = repo
		.get_session_by_token(token)
		.await?
		.ok_or(Error::Unauthorized)?;

	if Utc::now() > session.expires_at {
		return Err(Error::Unauthorized);
	}

	Ok(session)
}

/// Resolves and verifies an `enf_<id>_<secret>` API key against the stored
/// digest. The digest comparison is constant-time.
#[instrument(skip_all)]
pub async fn authenticate_enforcer(repo: &Repository, api_key: &str) -> Result<Enforcer> {
	let api_key = api_key.trim();
	let enforcer_id = parse_api_key(api_key).ok_or(Error::Unauthorized)?;

	let enforcer = repo
		.get_enforcer(enforcer_id)
		.await?
		.ok_or(Error::Unauthorized)?;

	if !enforcer.verify_api_key(api_key) {
		return Err(Error::Unauthorized);
	}

	Ok(enforcer)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::db::create_test_pool;
	use crate::model::{Client, Resource};
	use palisade_common::Mode;

	async fn test_repo() -> Repository {
		Repository::new(create_test_pool().await)
	}

	async fn seed_client(repo: &Repository, username: &str, password: &str) -> Client {
		let client = Client::new(username, username, password, "").unwrap();
		repo.create_client(&client).await.unwrap();
		client
	}

	async fn seed_enforcer(repo: &Repository, name: &str, subnet: &str) -> Enforcer {
		let (enforcer, _) = Enforcer::new(name, "enf.example.com:51820", subnet).unwrap();
		repo.create_enforcer(&enforcer).await.unwrap();
		enforcer
	}

	#[tokio::test]
	async fn login_with_unknown_username_is_unauthorized() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		let err = client_login(&repo, &allocator, "ghost", "pw").await.unwrap_err();
		assert!(matches!(err, Error::Unauthorized));
	}

	#[tokio::test]
	async fn login_with_bad_password_is_unauthorized() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		seed_client(&repo, "alice", "correct").await;
		let err = client_login(&repo, &allocator, "alice", "wrong").await.unwrap_err();
		assert!(matches!(err, Error::Unauthorized));
	}

	#[tokio::test]
	async fn login_without_any_enforcer_is_validation_error() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		seed_client(&repo, "alice", "pw").await;
		let err = client_login(&repo, &allocator, "alice", "pw").await.unwrap_err();
		assert!(matches!(err, Error::Validation(_)));
	}

	#[tokio::test]
	async fn observe_only_client_binds_to_observe_enforcer() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		seed_client(&repo, "alice", "pw").await;
		let enforcer = seed_enforcer(&repo, "e1", "10.8.0.0/24").await;
		repo.create_resource(&Resource::new("r1", "192.168.10.0/24", &enforcer.id, Mode::Observe))
			.await
			.unwrap();

		let session = client_login(&repo, &allocator, "alice", "pw").await.unwrap();
		assert_eq!(session.enforcer_id, enforcer.id);
		assert_eq!(session.tunnel_ip, "10.8.0.2");
	}

	#[tokio::test]
	async fn paired_client_binds_to_first_pair_enforcer() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		let client = seed_client(&repo, "alice", "pw").await;

		let observe_enf = seed_enforcer(&repo, "e-observe", "10.8.0.0/24").await;
		repo.create_resource(&Resource::new("r1", "192.168.10.0/24", &observe_enf.id, Mode::Observe))
			.await
			.unwrap();

		let paired_enf = seed_enforcer(&repo, "e-paired", "10.9.0.0/24").await;
		let resource = Resource::new("r2", "192.168.20.5/32", &paired_enf.id, Mode::Enforce);
		repo.create_resource(&resource).await.unwrap();
		repo.create_pair_checked(&client.id, &resource.id).await.unwrap();

		let session = client_login(&repo, &allocator, "alice", "pw").await.unwrap();
		assert_eq!(session.enforcer_id, paired_enf.id);
		// Both enforcers received an allocation.
		assert!(allocator.lookup(&observe_enf.id, &client.id).is_some());
		assert!(allocator.lookup(&paired_enf.id, &client.id).is_some());
	}

	#[tokio::test]
	async fn session_ip_is_inside_subnet_and_not_the_enforcer() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		seed_client(&repo, "alice", "pw").await;
		let enforcer = seed_enforcer(&repo, "e1", "10.8.0.0/24").await;
		repo.create_resource(&Resource::new("r1", "192.168.10.0/24", &enforcer.id, Mode::Observe))
			.await
			.unwrap();

		let session = client_login(&repo, &allocator, "alice", "pw").await.unwrap();
		let ip: std::net::Ipv4Addr = session.tunnel_ip.parse().unwrap();
		let net: ipnet::Ipv4Net = enforcer.tunnel_subnet.parse().unwrap();
		assert!(net.contains(&ip));
		assert_ne!(session.tunnel_ip, "10.8.0.1");
	}

	#[tokio::test]
	async fn same_enforcer_sessions_share_ip_only_for_same_client() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		seed_client(&repo, "alice", "pw").await;
		seed_client(&repo, "bob", "pw").await;
		let enforcer = seed_enforcer(&repo, "e1", "10.8.0.0/24").await;
		repo.create_resource(&Resource::new("r1", "192.168.10.0/24", &enforcer.id, Mode::Observe))
			.await
			.unwrap();

		let alice_1 = client_login(&repo, &allocator, "alice", "pw").await.unwrap();
		let alice_2 = client_login(&repo, &allocator, "alice", "pw").await.unwrap();
		let bob = client_login(&repo, &allocator, "bob", "pw").await.unwrap();

		assert_eq!(alice_1.tunnel_ip, alice_2.tunnel_ip);
		assert_ne!(alice_1.tunnel_ip, bob.tunnel_ip);
	}

	#[tokio::test]
	async fn token_validation_round_trip() {
		let repo = test_repo().await;
		let allocator = TunnelIpAllocator::new();
		seed_client(&repo, "alice", "pw").await;
		let enforcer = seed_enforcer(&repo, "e1", "10.8.0.0/24").await;
		repo.create_resource(&Resource::new("r1", "192.168.10.0/24", &enforcer.id, Mode::Observe))
			.await
			.unwrap();

		let session = client_login(&repo, &allocator, "alice", "pw").await.unwrap();
		let validated = validate_client_token(&repo, &session.token).await.unwrap();
		assert_eq!(validated.client_id, session.client_id);

		let err = validate_client_token(&repo, "bogus").await.unwrap_err();
		assert!(matches!(err, Error::Unauthorized));
	}

	#[tokio::test]
	async fn expired_token_is_unauthorized() {
		let repo = test_repo().await;
		let client = Client::new("alice", "alice", "pw", "").unwrap();
		repo.create_client(&client).await.unwrap();
		let (enforcer, _) = Enforcer::new("e1", "enf:51820", "10.8.0.0/24").unwrap();
		repo.create_enforcer(&enforcer).await.unwrap();

		let now = Utc::now();
		let session = ClientSession {
			id: "s1".into(),
			client_id: client.id.clone(),
			enforcer_id: enforcer.id.clone(),
			token: "expired".into(),
			tunnel_ip: "10.8.0.2".into(),
			expires_at: now - Duration::minutes(1),
			created_at: now - Duration::hours(25),
		};
		repo.create_session(&session).await.unwrap();

		let err = validate_client_token(&repo, "expired").await.unwrap_err();
		assert!(matches!(err, Error::Unauthorized));
	}

	#[tokio::test]
	async fn enforcer_api_key_authenticates() {
		let repo = test_repo().await;
		let (enforcer, api_key) = Enforcer::new("e1", "enf:51820", "10.8.0.0/24").unwrap();
		repo.create_enforcer(&enforcer).await.unwrap();

		let authed = authenticate_enforcer(&repo, &api_key).await.unwrap();
		assert_eq!(authed.id, enforcer.id);

		let err = authenticate_enforcer(&repo, "enf_bogus_key").await.unwrap_err();
		assert!(matches!(err, Error::Unauthorized));

		let tampered = format!("{}x", api_key);
		let err = authenticate_enforcer(&repo, &tampered).await.unwrap_err();
		assert!(matches!(err, Error::Unauthorized));
	}
}
