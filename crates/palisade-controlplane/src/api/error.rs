// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::error::Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
	pub error: String,
	pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
	pub status: StatusCode,
	pub body: ErrorBody,
}

impl ApiError {
	pub fn unauthorized() -> Self {
		Self {
			status: StatusCode::UNAUTHORIZED,
			body: ErrorBody {
				error: "unauthorized".to_string(),
				message: "unauthorized".to_string(),
			},
		}
	}

	pub fn bad_request(message: impl Into<String>) -> Self {
		Self {
			status: StatusCode::BAD_REQUEST,
			body: ErrorBody {
				error: "validation".to_string(),
				message: message.into(),
			},
		}
	}
}

impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		match err {
			Error::Validation(message) => Self::bad_request(message),
			Error::NotFound => Self {
				status: StatusCode::NOT_FOUND,
				body: ErrorBody {
					error: "not_found".to_string(),
					message: "not found".to_string(),
				},
			},
			Error::Unauthorized => Self::unauthorized(),
			Error::Database(e) => {
				tracing::error!(error = %e, "database error");
				Self::internal()
			}
			Error::Internal(e) => {
				tracing::error!(error = %e, "internal error");
				Self::internal()
			}
		}
	}
}

impl ApiError {
	fn internal() -> Self {
		Self {
			status: StatusCode::INTERNAL_SERVER_ERROR,
			body: ErrorBody {
				error: "internal_error".to_string(),
				message: "internal error".to_string(),
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		(self.status, Json(self.body)).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn domain_errors_map_to_statuses() {
		assert_eq!(
			ApiError::from(Error::validation("bad cidr")).status,
			StatusCode::BAD_REQUEST
		);
		assert_eq!(ApiError::from(Error::NotFound).status, StatusCode::NOT_FOUND);
		assert_eq!(ApiError::from(Error::Unauthorized).status, StatusCode::UNAUTHORIZED);
		assert_eq!(
			ApiError::from(Error::Internal("boom".into())).status,
			StatusCode::INTERNAL_SERVER_ERROR
		);
	}

	#[test]
	fn internal_errors_are_opaque() {
		let err = ApiError::from(Error::Internal("secret detail".into()));
		assert_eq!(err.body.message, "internal error");
	}

	#[test]
	fn unauthorized_body_is_generic() {
		let err = ApiError::from(Error::Unauthorized);
		assert_eq!(err.body.message, "unauthorized");
	}
}
