// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Private-key files on disk.
//!
//! The key file holds one base64 private key and nothing else. Files are
//! created 0600 inside a 0700 directory.

use crate::keys::{KeyError, WgKeyPair, WgPrivateKey};
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum KeyFileError {
	#[error("failed to read key file: {0}")]
	Io(#[from] std::io::Error),

	#[error("invalid key format: {0}")]
	InvalidFormat(#[from] KeyError),
}

pub type Result<T> = std::result::Result<T, KeyFileError>;

#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn load_key_from_file(path: impl AsRef<Path>) -> Result<WgKeyPair> {
	let content = fs::read_to_string(path.as_ref()).await?;
	let private = WgPrivateKey::from_base64(content.trim())?;
	Ok(WgKeyPair::from_private_key(private))
}

#[instrument(skip(key), fields(path = %path.as_ref().display()))]
pub async fn save_key_to_file(key: &WgKeyPair, path: impl AsRef<Path>) -> Result<()> {
	let path = path.as_ref();

	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).await?;
		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700)).await?;
		}
	}

	let content = format!("{}\n", key.private_key().to_base64());

	#[cfg(unix)]
	{
		use tokio::io::AsyncWriteExt;

		let mut file = fs::OpenOptions::new()
			.write(true)
			.create(true)
			.truncate(true)
			.mode(0o600)
			.open(path)
			.await?;
		file.write_all(content.as_bytes()).await?;
	}

	#[cfg(not(unix))]
	{
		fs::write(path, content).await?;
	}

	Ok(())
}

/// Loads the key at `path`, generating and persisting a fresh one when the
/// file does not exist yet.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn load_or_generate_key(path: impl AsRef<Path>) -> Result<WgKeyPair> {
	let path = path.as_ref();

	if path.exists() {
		return load_key_from_file(path).await;
	}

	let keypair = WgKeyPair::generate();
	save_key_to_file(&keypair, path).await?;
	Ok(keypair)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[tokio::test]
	async fn save_and_load_key() {
		let temp_dir = TempDir::new().unwrap();
		let key_path = temp_dir.path().join("wg0.key");

		let keypair = WgKeyPair::generate();
		save_key_to_file(&keypair, &key_path).await.unwrap();

		let loaded = load_key_from_file(&key_path).await.unwrap();
		assert_eq!(keypair.public_key(), loaded.public_key());
	}

	#[tokio::test]
	#[cfg(unix)]
	async fn save_key_sets_permissions() {
		use std::os::unix::fs::PermissionsExt;

		let temp_dir = TempDir::new().unwrap();
		let key_path = temp_dir.path().join("keys").join("wg0.key");

		let keypair = WgKeyPair::generate();
		save_key_to_file(&keypair, &key_path).await.unwrap();

		let file_mode = std::fs::metadata(&key_path).unwrap().permissions().mode() & 0o777;
		assert_eq!(file_mode, 0o600);

		let dir_mode = std::fs::metadata(temp_dir.path().join("keys"))
			.unwrap()
			.permissions()
			.mode() & 0o777;
		assert_eq!(dir_mode, 0o700);
	}

	#[tokio::test]
	async fn load_or_generate_creates_new_key() {
		let temp_dir = TempDir::new().unwrap();
		let key_path = temp_dir.path().join("wg0.key");

		let keypair = load_or_generate_key(&key_path).await.unwrap();
		assert!(key_path.exists());

		let loaded = load_key_from_file(&key_path).await.unwrap();
		assert_eq!(keypair.public_key(), loaded.public_key());
	}

	#[tokio::test]
	async fn load_or_generate_reuses_existing_key() {
		let temp_dir = TempDir::new().unwrap();
		let key_path = temp_dir.path().join("wg0.key");

		let first = load_or_generate_key(&key_path).await.unwrap();
		let second = load_or_generate_key(&key_path).await.unwrap();

		assert_eq!(first.public_key(), second.public_key());
	}

	#[tokio::test]
	async fn load_rejects_garbage() {
		let temp_dir = TempDir::new().unwrap();
		let key_path = temp_dir.path().join("wg0.key");
		std::fs::write(&key_path, "definitely not a key\n").unwrap();

		assert!(load_key_from_file(&key_path).await.is_err());
	}
}
