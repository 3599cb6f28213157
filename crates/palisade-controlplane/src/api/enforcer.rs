// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::api::auth::EnforcerAuth;
use crate::api::{ApiError, AppState};
use crate::service;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use palisade_common::{EnforcerConfig, FlowRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct UpdatePublicKeyRequest {
	pub wg_public_key: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
	pub status: String,
}

pub async fn get_config(
	State(state): State<AppState>,
	EnforcerAuth(enforcer): EnforcerAuth,
) -> Result<Json<EnforcerConfig>, ApiError> {
	let config = service::get_enforcer_config(&state.repo, &state.allocator, &enforcer.id).await?;
	Ok(Json(config))
}

pub async fn update_public_key(
	State(state): State<AppState>,
	EnforcerAuth(enforcer): EnforcerAuth,
	Json(request): Json<UpdatePublicKeyRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
	service::admin::update_enforcer_public_key(&state.repo, &enforcer.id, &request.wg_public_key)
		.await?;
	Ok(Json(StatusResponse {
		status: "ok".to_string(),
	}))
}

pub async fn ingest_logs(
	State(state): State<AppState>,
	EnforcerAuth(enforcer): EnforcerAuth,
	Json(records): Json<Vec<FlowRecord>>,
) -> Result<StatusCode, ApiError> {
	service::logs::ingest_flows(&state.repo, &enforcer.id, records).await?;
	Ok(StatusCode::ACCEPTED)
}
