// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! WireGuard key material.
//!
//! Keys are Curve25519 scalars/points carried as standard base64 on the wire
//! and on disk. Private keys never implement `Display` and redact their
//! `Debug` output.

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

pub const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum KeyError {
	#[error("invalid base64: {0}")]
	Base64(#[from] base64::DecodeError),

	#[error("key must be {KEY_LEN} bytes, got {0}")]
	Length(usize),
}

#[derive(Clone)]
pub struct WgPrivateKey(StaticSecret);

impl WgPrivateKey {
	pub fn generate() -> Self {
		Self(StaticSecret::random_from_rng(rand::rngs::OsRng))
	}

	pub fn from_base64(s: &str) -> Result<Self, KeyError> {
		let bytes = BASE64_STANDARD.decode(s.trim())?;
		let bytes: [u8; KEY_LEN] = bytes
			.as_slice()
			.try_into()
			.map_err(|_| KeyError::Length(bytes.len()))?;
		Ok(Self(StaticSecret::from(bytes)))
	}

	pub fn to_base64(&self) -> String {
		BASE64_STANDARD.encode(self.0.to_bytes())
	}

	pub fn public_key(&self) -> WgPublicKey {
		WgPublicKey(PublicKey::from(&self.0).to_bytes())
	}
}

impl fmt::Debug for WgPrivateKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("WgPrivateKey(..)")
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WgPublicKey([u8; KEY_LEN]);

impl WgPublicKey {
	pub fn from_base64(s: &str) -> Result<Self, KeyError> {
		let bytes = BASE64_STANDARD.decode(s.trim())?;
		let bytes: [u8; KEY_LEN] = bytes
			.as_slice()
			.try_into()
			.map_err(|_| KeyError::Length(bytes.len()))?;
		Ok(Self(bytes))
	}

	pub fn to_base64(&self) -> String {
		BASE64_STANDARD.encode(self.0)
	}

	pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
		&self.0
	}
}

impl fmt::Display for WgPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_base64())
	}
}

impl fmt::Debug for WgPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "WgPublicKey({})", self.to_base64())
	}
}

impl FromStr for WgPublicKey {
	type Err = KeyError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::from_base64(s)
	}
}

impl TryFrom<String> for WgPublicKey {
	type Error = KeyError;

	fn try_from(s: String) -> Result<Self, Self::Error> {
		Self::from_base64(&s)
	}
}

impl From<WgPublicKey> for String {
	fn from(key: WgPublicKey) -> Self {
		key.to_base64()
	}
}

#[derive(Debug, Clone)]
pub struct WgKeyPair {
	private: WgPrivateKey,
	public: WgPublicKey,
}

impl WgKeyPair {
	pub fn generate() -> Self {
		Self::from_private_key(WgPrivateKey::generate())
	}

	pub fn from_private_key(private: WgPrivateKey) -> Self {
		let public = private.public_key();
		Self { private, public }
	}

	pub fn private_key(&self) -> &WgPrivateKey {
		&self.private
	}

	pub fn public_key(&self) -> &WgPublicKey {
		&self.public
	}
}
