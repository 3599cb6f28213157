// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Flow log ingestion and queries.

use crate::error::Result;
use crate::model::LogEntry;
use crate::repository::Repository;
use palisade_common::FlowRecord;
use tracing::instrument;
use uuid::Uuid;

pub const DEFAULT_LOG_LIMIT: u32 = 100;
pub const MAX_LOG_LIMIT: u32 = 1000;

#[instrument(skip(repo, records), fields(count = records.len()))]
pub async fn ingest_flows(repo: &Repository, enforcer_id: &str, records: Vec<FlowRecord>) -> Result<usize> {
	let entries: Vec<LogEntry> = records
		.into_iter()
		.map(|record| LogEntry {
			id: Uuid::new_v4().to_string(),
			enforcer_id: enforcer_id.to_string(),
			client_id: record.client_id,
			client_name: record.client_name,
			resource_id: record.resource_id,
			resource_name: record.resource_name,
			src_ip: record.src_ip,
			dst_ip: record.dst_ip,
			protocol: record.proto,
			src_port: record.src_port,
			dst_port: record.dst_port,
			length: record.length,
			timestamp: record.timestamp,
		})
		.collect();

	let count = entries.len();
	if count > 0 {
		repo.insert_log_entries(&entries).await?;
	}
	Ok(count)
}

#[instrument(skip(repo))]
pub async fn list_logs(
	repo: &Repository,
	enforcer_id: &str,
	resource_id: Option<&str>,
	limit: Option<u32>,
) -> Result<Vec<LogEntry>> {
	let limit = limit.unwrap_or(DEFAULT_LOG_LIMIT).min(MAX_LOG_LIMIT);
	repo.list_logs(enforcer_id, resource_id, limit).await
}
