// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The policy engine.
//!
//! Translates the stored entity graph into the two derived configurations:
//! [`client_config`] for agents and [`enforcer_config`] for enforcers.
//! Derivation is deterministic: a pure function over the repository's joined
//! views plus the tunnel-IP allocation table.

pub mod admin;
pub mod auth;
pub mod client_config;
pub mod enforcer_config;
pub mod logs;
pub mod tunnel_ip;

pub use auth::{authenticate_enforcer, client_login, validate_client_token, CLIENT_SESSION_TTL_HOURS};
pub use client_config::get_client_config;
pub use enforcer_config::get_enforcer_config;
pub use tunnel_ip::TunnelIpAllocator;
