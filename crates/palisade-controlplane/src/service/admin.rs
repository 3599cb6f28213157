// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Administrative operations over the entity graph.

use crate::error::{Error, Result};
use crate::model::{Client, Enforcer, Pair, Resource};
use crate::repository::Repository;
use ipnet::Ipv4Net;
use palisade_common::Mode;
use tracing::instrument;

fn require(value: &str, what: &str) -> Result<String> {
	let trimmed = value.trim();
	if trimmed.is_empty() {
		return Err(Error::validation(format!("{what} is required")));
	}
	Ok(trimmed.to_string())
}

fn require_ipv4_cidr(value: &str, what: &str) -> Result<String> {
	let trimmed = require(value, what)?;
	trimmed
		.parse::<Ipv4Net>()
		.map_err(|_| Error::validation(format!("{what} must be a valid IPv4 CIDR")))?;
	Ok(trimmed)
}

#[instrument(skip(repo, password))]
pub async fn create_client(
	repo: &Repository,
	name: &str,
	username: &str,
	password: &str,
	wg_public_key: &str,
) -> Result<Client> {
	let name = require(name, "name")?;
	let username = require(username, "username")?;
	let password = require(password, "password")?;

	let client = Client::new(&name, &username, &password, wg_public_key.trim())?;
	repo.create_client(&client).await?;
	Ok(client)
}

#[instrument(skip(repo))]
pub async fn delete_client(repo: &Repository, id: &str) -> Result<()> {
	if repo.delete_client(id.trim()).await? == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

#[instrument(skip(repo))]
pub async fn create_enforcer(
	repo: &Repository,
	name: &str,
	endpoint: &str,
	tunnel_subnet: &str,
) -> Result<(Enforcer, String)> {
	let name = require(name, "name")?;
	let endpoint = require(endpoint, "endpoint")?;
	let tunnel_subnet = require_ipv4_cidr(tunnel_subnet, "tunnel_subnet")?;

	let (enforcer, api_key) = Enforcer::new(&name, &endpoint, &tunnel_subnet)?;
	repo.create_enforcer(&enforcer).await?;
	Ok((enforcer, api_key))
}

#[instrument(skip(repo))]
pub async fn delete_enforcer(repo: &Repository, id: &str) -> Result<()> {
	if repo.delete_enforcer(id.trim()).await? == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

#[instrument(skip(repo))]
pub async fn create_resource(
	repo: &Repository,
	name: &str,
	cidr: &str,
	enforcer_id: &str,
	mode: Mode,
) -> Result<Resource> {
	let name = require(name, "name")?;
	let cidr = require_ipv4_cidr(cidr, "cidr")?;
	let enforcer_id = require(enforcer_id, "enforcer_id")?;

	repo.get_enforcer(&enforcer_id)
		.await?
		.ok_or_else(|| Error::validation("enforcer not found"))?;

	let resource = Resource::new(&name, &cidr, &enforcer_id, mode);
	repo.create_resource(&resource).await?;
	Ok(resource)
}

#[instrument(skip(repo))]
pub async fn update_resource_mode(repo: &Repository, id: &str, mode: Mode) -> Result<()> {
	if repo.update_resource_mode(id.trim(), mode).await? == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

#[instrument(skip(repo))]
pub async fn delete_resource(repo: &Repository, id: &str) -> Result<()> {
	if repo.delete_resource(id.trim()).await? == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

#[instrument(skip(repo))]
pub async fn create_pair(repo: &Repository, client_id: &str, resource_id: &str) -> Result<Pair> {
	let client_id = require(client_id, "client_id")?;
	let resource_id = require(resource_id, "resource_id")?;
	repo.create_pair_checked(&client_id, &resource_id).await
}

#[instrument(skip(repo))]
pub async fn delete_pair(repo: &Repository, id: &str) -> Result<()> {
	if repo.delete_pair(id.trim()).await? == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

#[instrument(skip(repo, wg_public_key))]
pub async fn update_client_public_key(
	repo: &Repository,
	client_id: &str,
	wg_public_key: &str,
) -> Result<()> {
	let key = require(wg_public_key, "wg_public_key")?;
	if repo.update_client_public_key(client_id, &key).await? == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}

#[instrument(skip(repo, wg_public_key))]
pub async fn update_enforcer_public_key(
	repo: &Repository,
	enforcer_id: &str,
	wg_public_key: &str,
) -> Result<()> {
	let key = require(wg_public_key, "wg_public_key")?;
	if repo.update_enforcer_public_key(enforcer_id, &key).await? == 0 {
		return Err(Error::NotFound);
	}
	Ok(())
}
