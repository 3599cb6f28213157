// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite pool and schema.
//!
//! Writes are serialised behind a single connection; SQLite's WAL mode keeps
//! readers unblocked. The schema is created with idempotent statements so
//! startup doubles as migration for a fresh database.

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::str::FromStr;

pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| crate::error::Error::Internal(format!("invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.foreign_keys(true)
		.create_if_missing(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.connect_with(options)
		.await?;

	tracing::debug!("database pool created");
	Ok(pool)
}

pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS clients (
			id TEXT PRIMARY KEY,
			name TEXT NOT NULL,
			username TEXT NOT NULL UNIQUE,
			password_digest TEXT NOT NULL,
			wg_public_key TEXT NOT NULL DEFAULT '',
			created_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		"CREATE UNIQUE INDEX IF NOT EXISTS idx_clients_wg_public_key
		 ON clients(wg_public_key) WHERE wg_public_key != ''",
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS enforcers (
			id TEXT PRIMARY KEY,
			name TEXT NOT NULL UNIQUE,
			endpoint TEXT NOT NULL,
			tunnel_subnet TEXT NOT NULL,
			wg_public_key TEXT NOT NULL DEFAULT '',
			api_key_digest TEXT NOT NULL,
			created_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS resources (
			id TEXT PRIMARY KEY,
			name TEXT NOT NULL,
			cidr TEXT NOT NULL,
			mode TEXT NOT NULL DEFAULT 'observe' CHECK (mode IN ('observe', 'enforce')),
			enforcer_id TEXT NOT NULL REFERENCES enforcers(id) ON DELETE CASCADE,
			created_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS pairs (
			id TEXT PRIMARY KEY,
			client_id TEXT NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
			resource_id TEXT NOT NULL REFERENCES resources(id) ON DELETE CASCADE,
			created_at TEXT NOT NULL,
			UNIQUE (client_id, resource_id)
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS client_sessions (
			id TEXT PRIMARY KEY,
			client_id TEXT NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
			enforcer_id TEXT NOT NULL REFERENCES enforcers(id) ON DELETE CASCADE,
			token TEXT NOT NULL UNIQUE,
			tunnel_ip TEXT NOT NULL,
			expires_at TEXT NOT NULL,
			created_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS logs (
			id TEXT PRIMARY KEY,
			enforcer_id TEXT NOT NULL,
			client_id TEXT NOT NULL DEFAULT '',
			client_name TEXT NOT NULL DEFAULT '',
			resource_id TEXT NOT NULL DEFAULT '',
			resource_name TEXT NOT NULL DEFAULT '',
			src_ip TEXT NOT NULL,
			dst_ip TEXT NOT NULL,
			protocol TEXT NOT NULL,
			src_port INTEGER NOT NULL DEFAULT 0,
			dst_port INTEGER NOT NULL DEFAULT 0,
			length INTEGER NOT NULL DEFAULT 0,
			timestamp TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query("CREATE INDEX IF NOT EXISTS idx_logs_enforcer ON logs(enforcer_id, timestamp)")
		.execute(pool)
		.await?;

	sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_token ON client_sessions(token)")
		.execute(pool)
		.await?;

	Ok(())
}

#[cfg(test)]
pub async fn create_test_pool() -> SqlitePool {
	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.connect(":memory:")
		.await
		.unwrap();
	create_schema(&pool).await.unwrap();
	pool
}
