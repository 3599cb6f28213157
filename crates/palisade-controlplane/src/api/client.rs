// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::api::auth::ClientAuth;
use crate::api::{ApiError, AppState};
use crate::service;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use palisade_common::ClientConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
	pub username: String,
	pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
	pub client_id: String,
	pub token: String,
	pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateKeyRequest {
	pub wg_public_key: String,
}

pub async fn login(
	State(state): State<AppState>,
	Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
	let session = service::client_login(
		&state.repo,
		&state.allocator,
		&request.username,
		&request.password,
	)
	.await?;

	Ok(Json(LoginResponse {
		client_id: session.client_id,
		token: session.token,
		expires_at: session.expires_at,
	}))
}

pub async fn get_config(
	State(state): State<AppState>,
	ClientAuth(session): ClientAuth,
) -> Result<Json<ClientConfig>, ApiError> {
	let config = service::get_client_config(&state.repo, &state.allocator, &session.client_id).await?;
	Ok(Json(config))
}

pub async fn update_keys(
	State(state): State<AppState>,
	ClientAuth(session): ClientAuth,
	Json(request): Json<UpdateKeyRequest>,
) -> Result<StatusCode, ApiError> {
	service::admin::update_client_public_key(&state.repo, &session.client_id, &request.wg_public_key)
		.await?;
	Ok(StatusCode::NO_CONTENT)
}
