// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Palisade control-plane binary.

use clap::Parser;
use palisade_controlplane::api::{create_router, AppState};
use palisade_controlplane::{db, Config, Repository};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Palisade control plane - policy and identity for the zero-trust overlay.
#[derive(Parser, Debug)]
#[command(name = "palisade-controlplane", version)]
struct Args {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let _args = Args::parse();

	dotenvy::dotenv().ok();

	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| "info".into()),
		)
		.with(tracing_subscriber::fmt::layer())
		.init();

	let config = Config::from_env()?;

	tracing::info!(
		bind_addr = %config.bind_addr,
		database = %config.database_url,
		"starting palisade-controlplane"
	);

	let pool = db::create_pool(&config.database_url).await?;
	db::create_schema(&pool).await?;

	let repo = Repository::new(pool);
	let state = AppState::new(repo.clone(), config.clone());

	tokio::spawn(session_cleanup_loop(repo));

	let app = create_router(state)
		.layer(TraceLayer::new_for_http())
		.layer(
			CorsLayer::new()
				.allow_origin(Any)
				.allow_methods(Any)
				.allow_headers(Any),
		);

	let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
	tracing::info!("listening on {}", config.bind_addr);

	tokio::select! {
		result = axum::serve(listener, app) => {
			if let Err(e) = result {
				tracing::error!(error = %e, "server error");
			}
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("received shutdown signal");
		}
	}

	tracing::info!("server shutdown complete");
	Ok(())
}

async fn session_cleanup_loop(repo: Repository) {
	let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
	interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

	loop {
		interval.tick().await;
		match repo.delete_expired_sessions(chrono::Utc::now()).await {
			Ok(0) => {}
			Ok(count) => tracing::info!(count, "deleted expired client sessions"),
			Err(e) => tracing::warn!(error = %e, "session cleanup failed"),
		}
	}
}
