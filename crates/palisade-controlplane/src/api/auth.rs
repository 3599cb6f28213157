// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request authentication extractors.
//!
//! Three credential kinds: client bearer tokens, enforcer API keys, and the
//! administrator's basic-auth credentials from the environment. All failures
//! collapse into the same generic 401.

use crate::api::{ApiError, AppState};
use crate::model::{ClientSession, Enforcer};
use crate::service;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::prelude::*;

/// An authenticated client session, extracted from `Authorization: Bearer`.
pub struct ClientAuth(pub ClientSession);

impl FromRequestParts<AppState> for ClientAuth {
	type Rejection = ApiError;

	async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
		let token = bearer_token(parts).ok_or_else(ApiError::unauthorized)?;
		let session = service::validate_client_token(&state.repo, &token).await?;
		Ok(Self(session))
	}
}

/// An authenticated enforcer, extracted from `X-API-Key`.
pub struct EnforcerAuth(pub Enforcer);

impl FromRequestParts<AppState> for EnforcerAuth {
	type Rejection = ApiError;

	async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
		let api_key = parts
			.headers
			.get("X-API-Key")
			.and_then(|v| v.to_str().ok())
			.map(str::trim)
			.filter(|v| !v.is_empty())
			.ok_or_else(ApiError::unauthorized)?;

		let enforcer = service::authenticate_enforcer(&state.repo, api_key).await?;
		Ok(Self(enforcer))
	}
}

/// Administrator basic auth against the configured credentials.
pub struct AdminAuth;

impl FromRequestParts<AppState> for AdminAuth {
	type Rejection = ApiError;

	async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
		let (username, password) = basic_credentials(parts).ok_or_else(ApiError::unauthorized)?;

		let user_ok = constant_time_eq(username.as_bytes(), state.config.admin_username.as_bytes());
		let pass_ok = constant_time_eq(password.as_bytes(), state.config.admin_password.as_bytes());
		if !(user_ok && pass_ok) {
			return Err(ApiError::unauthorized());
		}

		Ok(Self)
	}
}

fn bearer_token(parts: &Parts) -> Option<String> {
	let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
	let (scheme, token) = header.split_once(' ')?;
	if !scheme.eq_ignore_ascii_case("bearer") {
		return None;
	}
	let token = token.trim();
	if token.is_empty() {
		return None;
	}
	Some(token.to_string())
}

fn basic_credentials(parts: &Parts) -> Option<(String, String)> {
	let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
	let (scheme, encoded) = header.split_once(' ')?;
	if !scheme.eq_ignore_ascii_case("basic") {
		return None;
	}
	let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
	let decoded = String::from_utf8(decoded).ok()?;
	let (username, password) = decoded.split_once(':')?;
	Some((username.to_string(), password.to_string()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
	if a.len() != b.len() {
		return false;
	}
	let mut diff = 0u8;
	for (x, y) in a.iter().zip(b.iter()) {
		diff |= x ^ y;
	}
	diff == 0
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::http::Request;

	fn parts_with_auth(value: &str) -> Parts {
		let request = Request::builder()
			.uri("/")
			.header(AUTHORIZATION, value)
			.body(())
			.unwrap();
		request.into_parts().0
	}

	#[test]
	fn bearer_token_parses_case_insensitively() {
		let parts = parts_with_auth("bearer abc123");
		assert_eq!(bearer_token(&parts).as_deref(), Some("abc123"));

		let parts = parts_with_auth("Bearer abc123");
		assert_eq!(bearer_token(&parts).as_deref(), Some("abc123"));
	}

	#[test]
	fn bearer_token_rejects_other_schemes() {
		let parts = parts_with_auth("Basic abc123");
		assert!(bearer_token(&parts).is_none());

		let parts = parts_with_auth("Bearer ");
		assert!(bearer_token(&parts).is_none());
	}

	#[test]
	fn basic_credentials_decode() {
		let encoded = BASE64_STANDARD.encode("admin:s3cret");
		let parts = parts_with_auth(&format!("Basic {encoded}"));
		let (user, pass) = basic_credentials(&parts).unwrap();
		assert_eq!(user, "admin");
		assert_eq!(pass, "s3cret");
	}

	#[test]
	fn basic_credentials_reject_malformed() {
		let parts = parts_with_auth("Basic not-base64!!!");
		assert!(basic_credentials(&parts).is_none());

		let encoded = BASE64_STANDARD.encode("no-colon");
		let parts = parts_with_auth(&format!("Basic {encoded}"));
		assert!(basic_credentials(&parts).is_none());
	}

	#[test]
	fn constant_time_eq_compares() {
		assert!(constant_time_eq(b"same", b"same"));
		assert!(!constant_time_eq(b"same", b"different"));
		assert!(!constant_time_eq(b"same", b"sane"));
	}
}
