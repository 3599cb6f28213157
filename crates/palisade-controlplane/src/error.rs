// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	/// Malformed or missing input. Maps to HTTP 400.
	#[error("{0}")]
	Validation(String),

	/// Entity lookup miss. Maps to HTTP 404.
	#[error("not found")]
	NotFound,

	/// Bad credentials, unknown or expired token, bad API key. Maps to HTTP
	/// 401 with a generic body.
	#[error("unauthorized")]
	Unauthorized,

	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("internal error: {0}")]
	Internal(String),
}

impl Error {
	pub fn validation(msg: impl Into<String>) -> Self {
		Self::Validation(msg.into())
	}
}

pub type Result<T> = std::result::Result<T, Error>;
