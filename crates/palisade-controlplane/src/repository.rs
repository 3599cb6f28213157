// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Database access for the control plane.
//!
//! Besides plain CRUD, the repository exposes two query objects,
//! [`Repository::client_config_data`] and [`Repository::enforcer_config_data`],
//! returning already-joined views with a fixed query count, so the policy
//! derivation in [`crate::service`] is a pure function over their output.

use crate::error::{Error, Result};
use crate::model::{Client, ClientSession, Enforcer, LogEntry, Pair, Resource};
use chrono::{DateTime, Utc};
use palisade_common::Mode;
use sqlx::sqlite::SqlitePool;
use std::collections::HashMap;
use tracing::instrument;

type ClientRow = (String, String, String, String, String, String);
type EnforcerRow = (String, String, String, String, String, String, String);
type ResourceRow = (String, String, String, String, String, String);
type PairRow = (String, String, String, String);
type SessionRow = (String, String, String, String, String, String, String);
type LogRow = (
	String,
	String,
	String,
	String,
	String,
	String,
	String,
	String,
	String,
	i64,
	i64,
	i64,
	String,
);

/// Joined view backing `GetClientConfig` and `ClientLogin`.
#[derive(Debug)]
pub struct ClientConfigData {
	pub client: Client,
	/// Resources the client is explicitly paired to, in pair-creation order.
	pub paired_resources: Vec<Resource>,
	/// Enforcers the client qualifies for (paired or hosting an observe-mode
	/// resource), ordered by id.
	pub enforcers: Vec<Enforcer>,
	/// All resources of the qualifying enforcers, keyed by enforcer id.
	pub resources_by_enforcer: HashMap<String, Vec<Resource>>,
}

/// Joined view backing `GetEnforcerConfig`.
#[derive(Debug)]
pub struct EnforcerConfigData {
	pub enforcer: Enforcer,
	pub resources: Vec<Resource>,
	/// Pairs targeting this enforcer's resources, with the owning client.
	pub pairs: Vec<(Pair, Client)>,
	/// All clients, ordered by id.
	pub clients: Vec<Client>,
}

#[derive(Clone)]
pub struct Repository {
	pool: SqlitePool,
}

impl Repository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	// =========================================================================
	// Clients
	// =========================================================================

	#[instrument(skip(self, client), fields(client_id = %client.id))]
	pub async fn create_client(&self, client: &Client) -> Result<()> {
		sqlx::query(
			"INSERT INTO clients (id, name, username, password_digest, wg_public_key, created_at)
			 VALUES (?, ?, ?, ?, ?, ?)",
		)
		.bind(&client.id)
		.bind(&client.name)
		.bind(&client.username)
		.bind(&client.password_digest)
		.bind(&client.wg_public_key)
		.bind(client.created_at.to_rfc3339())
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn list_clients(&self) -> Result<Vec<Client>> {
		let rows: Vec<ClientRow> = sqlx::query_as(
			"SELECT id, name, username, password_digest, wg_public_key, created_at
			 FROM clients ORDER BY id",
		)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(client_from_row).collect()
	}

	#[instrument(skip(self))]
	pub async fn get_client(&self, id: &str) -> Result<Option<Client>> {
		let row: Option<ClientRow> = sqlx::query_as(
			"SELECT id, name, username, password_digest, wg_public_key, created_at
			 FROM clients WHERE id = ?",
		)
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(client_from_row).transpose()
	}

	#[instrument(skip(self))]
	pub async fn get_client_by_username(&self, username: &str) -> Result<Option<Client>> {
		let row: Option<ClientRow> = sqlx::query_as(
			"SELECT id, name, username, password_digest, wg_public_key, created_at
			 FROM clients WHERE username = ?",
		)
		.bind(username)
		.fetch_optional(&self.pool)
		.await?;

		row.map(client_from_row).transpose()
	}

	#[instrument(skip(self))]
	pub async fn delete_client(&self, id: &str) -> Result<u64> {
		let result = sqlx::query("DELETE FROM clients WHERE id = ?")
			.bind(id)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}

	#[instrument(skip(self, wg_public_key))]
	pub async fn update_client_public_key(&self, id: &str, wg_public_key: &str) -> Result<u64> {
		let result = sqlx::query("UPDATE clients SET wg_public_key = ? WHERE id = ?")
			.bind(wg_public_key)
			.bind(id)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}

	// =========================================================================
	// Enforcers
	// =========================================================================

	#[instrument(skip(self, enforcer), fields(enforcer_id = %enforcer.id))]
	pub async fn create_enforcer(&self, enforcer: &Enforcer) -> Result<()> {
		sqlx::query(
			"INSERT INTO enforcers (id, name, endpoint, tunnel_subnet, wg_public_key, api_key_digest, created_at)
			 VALUES (?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(&enforcer.id)
		.bind(&enforcer.name)
		.bind(&enforcer.endpoint)
		.bind(&enforcer.tunnel_subnet)
		.bind(&enforcer.wg_public_key)
		.bind(&enforcer.api_key_digest)
		.bind(enforcer.created_at.to_rfc3339())
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn list_enforcers(&self) -> Result<Vec<Enforcer>> {
		let rows: Vec<EnforcerRow> = sqlx::query_as(
			"SELECT id, name, endpoint, tunnel_subnet, wg_public_key, api_key_digest, created_at
			 FROM enforcers ORDER BY id",
		)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(enforcer_from_row).collect()
	}

	#[instrument(skip(self))]
	pub async fn get_enforcer(&self, id: &str) -> Result<Option<Enforcer>> {
		let row: Option<EnforcerRow> = sqlx::query_as(
			"SELECT id, name, endpoint, tunnel_subnet, wg_public_key, api_key_digest, created_at
			 FROM enforcers WHERE id = ?",
		)
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(enforcer_from_row).transpose()
	}

	#[instrument(skip(self))]
	pub async fn delete_enforcer(&self, id: &str) -> Result<u64> {
		let result = sqlx::query("DELETE FROM enforcers WHERE id = ?")
			.bind(id)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}

	#[instrument(skip(self, wg_public_key))]
	pub async fn update_enforcer_public_key(&self, id: &str, wg_public_key: &str) -> Result<u64> {
		let result = sqlx::query("UPDATE enforcers SET wg_public_key = ? WHERE id = ?")
			.bind(wg_public_key)
			.bind(id)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}

	// =========================================================================
	// Resources
	// =========================================================================

	#[instrument(skip(self, resource), fields(resource_id = %resource.id))]
	pub async fn create_resource(&self, resource: &Resource) -> Result<()> {
		sqlx::query(
			"INSERT INTO resources (id, name, cidr, mode, enforcer_id, created_at)
			 VALUES (?, ?, ?, ?, ?, ?)",
		)
		.bind(&resource.id)
		.bind(&resource.name)
		.bind(&resource.cidr)
		.bind(resource.mode.to_string())
		.bind(&resource.enforcer_id)
		.bind(resource.created_at.to_rfc3339())
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn list_resources(&self) -> Result<Vec<Resource>> {
		let rows: Vec<ResourceRow> = sqlx::query_as(
			"SELECT id, name, cidr, mode, enforcer_id, created_at FROM resources ORDER BY id",
		)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(resource_from_row).collect()
	}

	#[instrument(skip(self))]
	pub async fn get_resource(&self, id: &str) -> Result<Option<Resource>> {
		let row: Option<ResourceRow> = sqlx::query_as(
			"SELECT id, name, cidr, mode, enforcer_id, created_at FROM resources WHERE id = ?",
		)
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(resource_from_row).transpose()
	}

	#[instrument(skip(self))]
	pub async fn update_resource_mode(&self, id: &str, mode: Mode) -> Result<u64> {
		let result = sqlx::query("UPDATE resources SET mode = ? WHERE id = ?")
			.bind(mode.to_string())
			.bind(id)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}

	#[instrument(skip(self))]
	pub async fn delete_resource(&self, id: &str) -> Result<u64> {
		let result = sqlx::query("DELETE FROM resources WHERE id = ?")
			.bind(id)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}

	// =========================================================================
	// Pairs
	// =========================================================================

	/// Inserts a pair after verifying both endpoints exist, inside one
	/// transaction. The (client, resource) uniqueness constraint surfaces as
	/// a validation error.
	#[instrument(skip(self))]
	pub async fn create_pair_checked(&self, client_id: &str, resource_id: &str) -> Result<Pair> {
		let mut tx = self.pool.begin().await?;

		let client_exists: Option<(String,)> = sqlx::query_as("SELECT id FROM clients WHERE id = ?")
			.bind(client_id)
			.fetch_optional(&mut *tx)
			.await?;
		if client_exists.is_none() {
			return Err(Error::NotFound);
		}

		let resource_exists: Option<(String,)> =
			sqlx::query_as("SELECT id FROM resources WHERE id = ?")
				.bind(resource_id)
				.fetch_optional(&mut *tx)
				.await?;
		if resource_exists.is_none() {
			return Err(Error::NotFound);
		}

		let pair = Pair::new(client_id, resource_id);
		let inserted = sqlx::query(
			"INSERT INTO pairs (id, client_id, resource_id, created_at) VALUES (?, ?, ?, ?)",
		)
		.bind(&pair.id)
		.bind(&pair.client_id)
		.bind(&pair.resource_id)
		.bind(pair.created_at.to_rfc3339())
		.execute(&mut *tx)
		.await;

		match inserted {
			Ok(_) => {}
			Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
				return Err(Error::validation("pair already exists"));
			}
			Err(e) => return Err(e.into()),
		}

		tx.commit().await?;
		Ok(pair)
	}

	#[instrument(skip(self))]
	pub async fn list_pairs(&self) -> Result<Vec<Pair>> {
		let rows: Vec<PairRow> = sqlx::query_as(
			"SELECT id, client_id, resource_id, created_at FROM pairs ORDER BY created_at, id",
		)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(pair_from_row).collect()
	}

	#[instrument(skip(self))]
	pub async fn delete_pair(&self, id: &str) -> Result<u64> {
		let result = sqlx::query("DELETE FROM pairs WHERE id = ?")
			.bind(id)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}

	// =========================================================================
	// Sessions
	// =========================================================================

	#[instrument(skip(self, session), fields(session_id = %session.id))]
	pub async fn create_session(&self, session: &ClientSession) -> Result<()> {
		sqlx::query(
			"INSERT INTO client_sessions (id, client_id, enforcer_id, token, tunnel_ip, expires_at, created_at)
			 VALUES (?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(&session.id)
		.bind(&session.client_id)
		.bind(&session.enforcer_id)
		.bind(&session.token)
		.bind(&session.tunnel_ip)
		.bind(session.expires_at.to_rfc3339())
		.bind(session.created_at.to_rfc3339())
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[instrument(skip(self, token))]
	pub async fn get_session_by_token(&self, token: &str) -> Result<Option<ClientSession>> {
		let row: Option<SessionRow> = sqlx::query_as(
			"SELECT id, client_id, enforcer_id, token, tunnel_ip, expires_at, created_at
			 FROM client_sessions WHERE token = ?",
		)
		.bind(token)
		.fetch_optional(&self.pool)
		.await?;

		row.map(session_from_row).transpose()
	}

	#[instrument(skip(self))]
	pub async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query("DELETE FROM client_sessions WHERE expires_at < ?")
			.bind(now.to_rfc3339())
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}

	// =========================================================================
	// Logs
	// =========================================================================

	#[instrument(skip(self, entries), fields(count = entries.len()))]
	pub async fn insert_log_entries(&self, entries: &[LogEntry]) -> Result<()> {
		let mut tx = self.pool.begin().await?;
		for entry in entries {
			sqlx::query(
				"INSERT INTO logs (id, enforcer_id, client_id, client_name, resource_id, resource_name,
				                   src_ip, dst_ip, protocol, src_port, dst_port, length, timestamp)
				 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
			)
			.bind(&entry.id)
			.bind(&entry.enforcer_id)
			.bind(&entry.client_id)
			.bind(&entry.client_name)
			.bind(&entry.resource_id)
			.bind(&entry.resource_name)
			.bind(&entry.src_ip)
			.bind(&entry.dst_ip)
			.bind(&entry.protocol)
			.bind(entry.src_port as i64)
			.bind(entry.dst_port as i64)
			.bind(entry.length as i64)
			.bind(entry.timestamp.to_rfc3339())
			.execute(&mut *tx)
			.await?;
		}
		tx.commit().await?;

		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn list_logs(
		&self,
		enforcer_id: &str,
		resource_id: Option<&str>,
		limit: u32,
	) -> Result<Vec<LogEntry>> {
		let rows: Vec<LogRow> = match resource_id {
			Some(resource_id) => {
				sqlx::query_as(
					"SELECT id, enforcer_id, client_id, client_name, resource_id, resource_name,
					        src_ip, dst_ip, protocol, src_port, dst_port, length, timestamp
					 FROM logs WHERE enforcer_id = ? AND resource_id = ?
					 ORDER BY timestamp DESC LIMIT ?",
				)
				.bind(enforcer_id)
				.bind(resource_id)
				.bind(limit)
				.fetch_all(&self.pool)
				.await?
			}
			None => {
				sqlx::query_as(
					"SELECT id, enforcer_id, client_id, client_name, resource_id, resource_name,
					        src_ip, dst_ip, protocol, src_port, dst_port, length, timestamp
					 FROM logs WHERE enforcer_id = ?
					 ORDER BY timestamp DESC LIMIT ?",
				)
				.bind(enforcer_id)
				.bind(limit)
				.fetch_all(&self.pool)
				.await?
			}
		};

		rows.into_iter().map(log_from_row).collect()
	}

	// =========================================================================
	// Query objects
	// =========================================================================

	/// The joined view behind `ClientLogin` and `GetClientConfig`: the client,
	/// its paired resources, the enforcers it qualifies for, and every
	/// resource hosted by those enforcers.
	#[instrument(skip(self))]
	pub async fn client_config_data(&self, client_id: &str) -> Result<ClientConfigData> {
		let client = self.get_client(client_id).await?.ok_or(Error::NotFound)?;

		let paired_rows: Vec<ResourceRow> = sqlx::query_as(
			"SELECT r.id, r.name, r.cidr, r.mode, r.enforcer_id, r.created_at
			 FROM pairs p JOIN resources r ON r.id = p.resource_id
			 WHERE p.client_id = ?
			 ORDER BY p.created_at, p.id",
		)
		.bind(client_id)
		.fetch_all(&self.pool)
		.await?;
		let paired_resources: Vec<Resource> = paired_rows
			.into_iter()
			.map(resource_from_row)
			.collect::<Result<_>>()?;

		let enforcer_rows: Vec<EnforcerRow> = sqlx::query_as(
			"SELECT DISTINCT e.id, e.name, e.endpoint, e.tunnel_subnet, e.wg_public_key, e.api_key_digest, e.created_at
			 FROM enforcers e
			 WHERE e.id IN (SELECT enforcer_id FROM resources WHERE mode = 'observe')
			    OR e.id IN (SELECT r.enforcer_id
			                FROM pairs p JOIN resources r ON r.id = p.resource_id
			                WHERE p.client_id = ?)
			 ORDER BY e.id",
		)
		.bind(client_id)
		.fetch_all(&self.pool)
		.await?;
		let enforcers: Vec<Enforcer> = enforcer_rows
			.into_iter()
			.map(enforcer_from_row)
			.collect::<Result<_>>()?;

		let resource_rows: Vec<ResourceRow> = sqlx::query_as(
			"SELECT id, name, cidr, mode, enforcer_id, created_at FROM resources ORDER BY id",
		)
		.fetch_all(&self.pool)
		.await?;

		let mut resources_by_enforcer: HashMap<String, Vec<Resource>> = HashMap::new();
		for row in resource_rows {
			let resource = resource_from_row(row)?;
			if enforcers.iter().any(|e| e.id == resource.enforcer_id) {
				resources_by_enforcer
					.entry(resource.enforcer_id.clone())
					.or_default()
					.push(resource);
			}
		}

		Ok(ClientConfigData {
			client,
			paired_resources,
			enforcers,
			resources_by_enforcer,
		})
	}

	/// The joined view behind `GetEnforcerConfig`: the enforcer, its
	/// resources, the pairs targeting them (with owning clients), and the
	/// full client list for observe-mode seeding.
	#[instrument(skip(self))]
	pub async fn enforcer_config_data(&self, enforcer_id: &str) -> Result<EnforcerConfigData> {
		let enforcer = self.get_enforcer(enforcer_id).await?.ok_or(Error::NotFound)?;

		let resource_rows: Vec<ResourceRow> = sqlx::query_as(
			"SELECT id, name, cidr, mode, enforcer_id, created_at
			 FROM resources WHERE enforcer_id = ? ORDER BY id",
		)
		.bind(enforcer_id)
		.fetch_all(&self.pool)
		.await?;
		let resources: Vec<Resource> = resource_rows
			.into_iter()
			.map(resource_from_row)
			.collect::<Result<_>>()?;

		let pair_rows: Vec<(
			String,
			String,
			String,
			String,
			String,
			String,
			String,
			String,
			String,
			String,
		)> = sqlx::query_as(
			"SELECT p.id, p.client_id, p.resource_id, p.created_at,
			        c.id, c.name, c.username, c.password_digest, c.wg_public_key, c.created_at
			 FROM pairs p
			 JOIN resources r ON r.id = p.resource_id
			 JOIN clients c ON c.id = p.client_id
			 WHERE r.enforcer_id = ?
			 ORDER BY p.created_at, p.id",
		)
		.bind(enforcer_id)
		.fetch_all(&self.pool)
		.await?;

		let mut pairs = Vec::with_capacity(pair_rows.len());
		for (pid, pcid, prid, pcreated, cid, cname, cuser, cdigest, ckey, ccreated) in pair_rows {
			let pair = pair_from_row((pid, pcid, prid, pcreated))?;
			let client = client_from_row((cid, cname, cuser, cdigest, ckey, ccreated))?;
			pairs.push((pair, client));
		}

		let clients = self.list_clients().await?;

		Ok(EnforcerConfigData {
			enforcer,
			resources,
			pairs,
			clients,
		})
	}
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(s)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|_| Error::Internal(format!("invalid datetime: {s}")))
}

fn parse_mode(s: &str) -> Result<Mode> {
	s.parse().map_err(Error::Internal)
}

fn client_from_row(row: ClientRow) -> Result<Client> {
	let (id, name, username, password_digest, wg_public_key, created_at) = row;
	Ok(Client {
		id,
		name,
		username,
		password_digest,
		wg_public_key,
		created_at: parse_datetime(&created_at)?,
	})
}

fn enforcer_from_row(row: EnforcerRow) -> Result<Enforcer> {
	let (id, name, endpoint, tunnel_subnet, wg_public_key, api_key_digest, created_at) = row;
	Ok(Enforcer {
		id,
		name,
		endpoint,
		tunnel_subnet,
		wg_public_key,
		api_key_digest,
		created_at: parse_datetime(&created_at)?,
	})
}

fn resource_from_row(row: ResourceRow) -> Result<Resource> {
	let (id, name, cidr, mode, enforcer_id, created_at) = row;
	Ok(Resource {
		id,
		name,
		cidr,
		mode: parse_mode(&mode)?,
		enforcer_id,
		created_at: parse_datetime(&created_at)?,
	})
}

fn pair_from_row(row: PairRow) -> Result<Pair> {
	let (id, client_id, resource_id, created_at) = row;
	Ok(Pair {
		id,
		client_id,
		resource_id,
		created_at: parse_datetime(&created_at)?,
	})
}

fn session_from_row(row: SessionRow) -> Result<ClientSession> {
	let (id, client_id, enforcer_id, token, tunnel_ip, expires_at, created_at) = row;
	Ok(ClientSession {
		id,
		client_id,
		enforcer_id,
		token,
		tunnel_ip,
		expires_at: parse_datetime(&expires_at)?,
		created_at: parse_datetime(&created_at)?,
	})
}

fn log_from_row(row: LogRow) -> Result<LogEntry> {
	let (
		id,
		enforcer_id,
		client_id,
		client_name,
		resource_id,
		resource_name,
		src_ip,
		dst_ip,
		protocol,
		src_port,
		dst_port,
		length,
		timestamp,
	) = row;
	Ok(LogEntry {
		id,
		enforcer_id,
		client_id,
		client_name,
		resource_id,
		resource_name,
		src_ip,
		dst_ip,
		protocol,
		src_port: src_port as u16,
		dst_port: dst_port as u16,
		length: length as u64,
		timestamp: parse_datetime(&timestamp)?,
	})
}
