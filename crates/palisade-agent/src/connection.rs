// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persisted connection record.
//!
//! One JSON file per interface under the state directory, written through a
//! temp file and rename so readers never observe a partial record.

use crate::error::Result;
use chrono::{DateTime, Utc};
use palisade_common::ClientConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::instrument;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionState {
	pub controlplane_url: String,
	pub interface_name: String,
	pub config: ClientConfig,
	pub updated_at: DateTime<Utc>,
}

pub fn path_for_interface(state_dir: &Path, interface: &str) -> PathBuf {
	state_dir.join(format!("{interface}.connection.json"))
}

#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn load(path: impl AsRef<Path>) -> Result<ConnectionState> {
	let data = fs::read(path.as_ref()).await?;
	Ok(serde_json::from_slice(&data)?)
}

#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn save(path: impl AsRef<Path>, state: &ConnectionState) -> Result<()> {
	let path = path.as_ref();

	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).await?;
		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700)).await?;
		}
	}

	let data = serde_json::to_vec_pretty(state)?;
	let tmp_path = path.with_extension("json.tmp");

	fs::write(&tmp_path, &data).await?;
	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;
		fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600)).await?;
	}
	fs::rename(&tmp_path, path).await?;

	Ok(())
}
