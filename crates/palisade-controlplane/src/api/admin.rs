// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Administrative JSON endpoints, basic-auth protected.

use crate::api::auth::AdminAuth;
use crate::api::{ApiError, AppState};
use crate::model::{Client, Enforcer, LogEntry, Pair, Resource};
use crate::service::admin as admin_service;
use crate::service::logs as log_service;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use palisade_common::Mode;
use serde::Deserialize;

pub fn router() -> Router<AppState> {
	Router::new()
		.route("/clients", get(list_clients).post(create_client))
		.route("/clients/{id}", delete(delete_client))
		.route("/enforcers", get(list_enforcers).post(create_enforcer))
		.route("/enforcers/{id}", delete(delete_enforcer))
		.route("/resources", get(list_resources).post(create_resource))
		.route("/resources/{id}", delete(delete_resource))
		.route("/resources/{id}/mode", put(update_resource_mode))
		.route("/pairs", get(list_pairs).post(create_pair))
		.route("/pairs/{id}", delete(delete_pair))
		.route("/logs", get(list_logs))
}

#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
	pub name: String,
	pub username: String,
	pub password: String,
	#[serde(default)]
	pub wg_public_key: String,
}

async fn list_clients(
	State(state): State<AppState>,
	_auth: AdminAuth,
) -> Result<Json<Vec<Client>>, ApiError> {
	Ok(Json(state.repo.list_clients().await?))
}

async fn create_client(
	State(state): State<AppState>,
	_auth: AdminAuth,
	Json(request): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<Client>), ApiError> {
	let client = admin_service::create_client(
		&state.repo,
		&request.name,
		&request.username,
		&request.password,
		&request.wg_public_key,
	)
	.await?;
	Ok((StatusCode::CREATED, Json(client)))
}

async fn delete_client(
	State(state): State<AppState>,
	_auth: AdminAuth,
	Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
	admin_service::delete_client(&state.repo, &id).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CreateEnforcerRequest {
	pub name: String,
	pub endpoint: String,
	pub tunnel_subnet: String,
}

#[derive(Debug, serde::Serialize)]
pub struct CreateEnforcerResponse {
	#[serde(flatten)]
	pub enforcer: Enforcer,
	/// Returned exactly once at creation; only a digest is stored.
	pub api_key: String,
}

async fn list_enforcers(
	State(state): State<AppState>,
	_auth: AdminAuth,
) -> Result<Json<Vec<Enforcer>>, ApiError> {
	Ok(Json(state.repo.list_enforcers().await?))
}

async fn create_enforcer(
	State(state): State<AppState>,
	_auth: AdminAuth,
	Json(request): Json<CreateEnforcerRequest>,
) -> Result<(StatusCode, Json<CreateEnforcerResponse>), ApiError> {
	let (enforcer, api_key) = admin_service::create_enforcer(
		&state.repo,
		&request.name,
		&request.endpoint,
		&request.tunnel_subnet,
	)
	.await?;
	Ok((StatusCode::CREATED, Json(CreateEnforcerResponse { enforcer, api_key })))
}

async fn delete_enforcer(
	State(state): State<AppState>,
	_auth: AdminAuth,
	Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
	admin_service::delete_enforcer(&state.repo, &id).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CreateResourceRequest {
	pub name: String,
	pub cidr: String,
	pub enforcer_id: String,
	pub mode: Mode,
}

async fn list_resources(
	State(state): State<AppState>,
	_auth: AdminAuth,
) -> Result<Json<Vec<Resource>>, ApiError> {
	Ok(Json(state.repo.list_resources().await?))
}

async fn create_resource(
	State(state): State<AppState>,
	_auth: AdminAuth,
	Json(request): Json<CreateResourceRequest>,
) -> Result<(StatusCode, Json<Resource>), ApiError> {
	let resource = admin_service::create_resource(
		&state.repo,
		&request.name,
		&request.cidr,
		&request.enforcer_id,
		request.mode,
	)
	.await?;
	Ok((StatusCode::CREATED, Json(resource)))
}

async fn delete_resource(
	State(state): State<AppState>,
	_auth: AdminAuth,
	Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
	admin_service::delete_resource(&state.repo, &id).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct UpdateModeRequest {
	pub mode: Mode,
}

async fn update_resource_mode(
	State(state): State<AppState>,
	_auth: AdminAuth,
	Path(id): Path<String>,
	Json(request): Json<UpdateModeRequest>,
) -> Result<StatusCode, ApiError> {
	admin_service::update_resource_mode(&state.repo, &id, request.mode).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CreatePairRequest {
	pub client_id: String,
	pub resource_id: String,
}

async fn list_pairs(
	State(state): State<AppState>,
	_auth: AdminAuth,
) -> Result<Json<Vec<Pair>>, ApiError> {
	Ok(Json(state.repo.list_pairs().await?))
}

async fn create_pair(
	State(state): State<AppState>,
	_auth: AdminAuth,
	Json(request): Json<CreatePairRequest>,
) -> Result<(StatusCode, Json<Pair>), ApiError> {
	let pair =
		admin_service::create_pair(&state.repo, &request.client_id, &request.resource_id).await?;
	Ok((StatusCode::CREATED, Json(pair)))
}

async fn delete_pair(
	State(state): State<AppState>,
	_auth: AdminAuth,
	Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
	admin_service::delete_pair(&state.repo, &id).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
	pub enforcer_id: String,
	pub resource_id: Option<String>,
	pub limit: Option<u32>,
}

async fn list_logs(
	State(state): State<AppState>,
	_auth: AdminAuth,
	Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
	let logs = log_service::list_logs(
		&state.repo,
		&query.enforcer_id,
		query.resource_id.as_deref(),
		query.limit,
	)
	.await?;
	Ok(Json(logs))
}
