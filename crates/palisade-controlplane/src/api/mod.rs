// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP surface of the control plane.
//!
//! Thin mapping layer: extractors authenticate, handlers call into
//! [`crate::service`], and the error type translates the domain taxonomy to
//! status codes with `{error, message}` JSON bodies.

pub mod admin;
pub mod auth;
pub mod client;
pub mod enforcer;
pub mod error;

pub use error::ApiError;

use crate::config::Config;
use crate::repository::Repository;
use crate::service::TunnelIpAllocator;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
	pub repo: Repository,
	pub allocator: Arc<TunnelIpAllocator>,
	pub config: Arc<Config>,
}

impl AppState {
	pub fn new(repo: Repository, config: Config) -> Self {
		Self {
			repo,
			allocator: Arc::new(TunnelIpAllocator::new()),
			config: Arc::new(config),
		}
	}
}

pub fn create_router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/api/client/login", post(client::login))
		.route("/api/client/config", get(client::get_config))
		.route("/api/client/keys", put(client::update_keys))
		.route("/api/enforcer/config", get(enforcer::get_config))
		.route("/api/enforcer/public-key", put(enforcer::update_public_key))
		.route("/api/logs", post(enforcer::ingest_logs))
		.nest("/api/admin", admin::router())
		.with_state(state)
}

async fn health() -> Json<serde_json::Value> {
	Json(serde_json::json!({ "status": "ok" }))
}
