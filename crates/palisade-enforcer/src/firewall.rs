// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Packet-filter programming.
//!
//! Static infrastructure is created once and is idempotent: an inet `filter`
//! table with a `forward` base chain, a `wg-authz` chain receiving a jump for
//! traffic entering from the tunnel interface, and an inet `nat` table whose
//! postrouting chain masquerades tunnel traffic.
//!
//! Dynamic state lives entirely in `wg-authz` and is rebuilt on every policy
//! change: a flush, an unconditional log rule copying packets to the nflog
//! group, one accept rule per permitted (source, destination) CIDR pair, and
//! a terminal drop only when at least one accept rule exists. An enforcer
//! with zero enforce-mode rules must pass traffic.

use crate::error::Result;
use ipnet::Ipv4Net;
use nftables::batch::Batch;
use nftables::expr::{Expression, Meta, MetaKey, NamedExpression, Payload, PayloadField, Prefix};
use nftables::helper;
use nftables::schema::{Chain, FlushObject, NfCmd, NfListObject, NfObject, Nftables, Rule, Table};
use nftables::stmt::{JumpTarget, Log, Match, Operator, Statement};
use nftables::types::{NfChainPolicy, NfChainType, NfFamily, NfHook};
use palisade_common::{Mode, Policy};
use tracing::{debug, info, instrument};

pub const FILTER_TABLE: &str = "filter";
pub const NAT_TABLE: &str = "nat";
pub const FORWARD_CHAIN: &str = "forward";
pub const POLICY_CHAIN: &str = "wg-authz";
pub const POSTROUTING_CHAIN: &str = "postrouting";

const FILTER_PRIO: i32 = 0;
const NAT_SOURCE_PRIO: i32 = 100;

#[derive(Debug, Clone)]
pub struct FirewallManager {
	interface: String,
	nflog_group: u16,
}

impl FirewallManager {
	pub fn new(interface: &str, nflog_group: u16) -> Self {
		Self {
			interface: interface.to_string(),
			nflog_group,
		}
	}

	/// Creates tables, chains, the tunnel jump rule, and the masquerade rule,
	/// skipping whatever already exists. Blocking.
	#[instrument(skip(self), fields(interface = %self.interface))]
	pub fn setup(&self) -> Result<()> {
		let current = helper::get_current_ruleset()?;

		let mut batch = Batch::new();
		let mut dirty = false;

		if !has_table(&current, FILTER_TABLE) {
			batch.add(NfListObject::Table(table(FILTER_TABLE)));
			dirty = true;
		}
		if !has_chain(&current, FILTER_TABLE, FORWARD_CHAIN) {
			batch.add(NfListObject::Chain(base_chain(
				FILTER_TABLE,
				FORWARD_CHAIN,
				NfChainType::Filter,
				NfHook::Forward,
				FILTER_PRIO,
			)));
			dirty = true;
		}
		if !has_chain(&current, FILTER_TABLE, POLICY_CHAIN) {
			batch.add(NfListObject::Chain(plain_chain(FILTER_TABLE, POLICY_CHAIN)));
			dirty = true;
		}
		if !has_iif_jump(&current, &self.interface) {
			batch.add_cmd(NfCmd::Insert(NfListObject::Rule(rule(
				FILTER_TABLE,
				FORWARD_CHAIN,
				vec![
					match_iifname(&self.interface),
					Statement::Jump(JumpTarget {
						target: POLICY_CHAIN.into(),
					}),
				],
			))));
			dirty = true;
		}

		if !has_table(&current, NAT_TABLE) {
			batch.add(NfListObject::Table(table(NAT_TABLE)));
			dirty = true;
		}
		if !has_chain(&current, NAT_TABLE, POSTROUTING_CHAIN) {
			batch.add(NfListObject::Chain(base_chain(
				NAT_TABLE,
				POSTROUTING_CHAIN,
				NfChainType::NAT,
				NfHook::Postrouting,
				NAT_SOURCE_PRIO,
			)));
			dirty = true;
		}
		if !has_iif_masquerade(&current, &self.interface) {
			batch.add(NfListObject::Rule(rule(
				NAT_TABLE,
				POSTROUTING_CHAIN,
				vec![match_iifname(&self.interface), Statement::Masquerade(None)],
			)));
			dirty = true;
		}

		if dirty {
			helper::apply_ruleset(&batch.to_nftables())?;
			info!("firewall infrastructure created");
		} else {
			debug!("firewall infrastructure already present");
		}
		Ok(())
	}

	/// Flushes and rebuilds the policy chain from the given policies.
	/// Blocking.
	#[instrument(skip_all, fields(policies = policies.len()))]
	pub fn apply_policies(&self, policies: &[Policy]) -> Result<()> {
		let pairs = enforce_rule_pairs(policies)?;

		let mut batch = Batch::new();
		batch.add_cmd(NfCmd::Flush(FlushObject::Chain(plain_chain(
			FILTER_TABLE,
			POLICY_CHAIN,
		))));
		for chain_rule in policy_chain_rules(self.nflog_group, &pairs) {
			batch.add(NfListObject::Rule(chain_rule));
		}

		helper::apply_ruleset(&batch.to_nftables())?;
		info!(accept_rules = pairs.len(), "policy chain rebuilt");
		Ok(())
	}
}

/// The full rule list for `wg-authz`: the log rule first, one accept per
/// permitted pair, and a terminal drop only when at least one accept exists.
fn policy_chain_rules(nflog_group: u16, pairs: &[(Ipv4Net, Ipv4Net)]) -> Vec<Rule<'static>> {
	let mut rules = Vec::with_capacity(pairs.len() + 2);

	// Log first: both accepted and dropped traffic stays visible.
	rules.push(rule(
		FILTER_TABLE,
		POLICY_CHAIN,
		vec![Statement::Log(Some(Log {
			prefix: None,
			group: Some(u32::from(nflog_group)),
			snaplen: None,
			queue_threshold: None,
			level: None,
			flags: None,
		}))],
	));

	for (src, dst) in pairs {
		rules.push(rule(
			FILTER_TABLE,
			POLICY_CHAIN,
			vec![
				match_cidr("saddr", *src),
				match_cidr("daddr", *dst),
				Statement::Accept(None),
			],
		));
	}

	if !pairs.is_empty() {
		rules.push(rule(FILTER_TABLE, POLICY_CHAIN, vec![Statement::Drop(None)]));
	}

	rules
}

/// The permitted (source, destination) IPv4 pairs implied by the policies:
/// every allowed source crossed with every enforce-mode target. Observe-mode
/// targets emit nothing; non-IPv4 entries are skipped.
pub fn enforce_rule_pairs(policies: &[Policy]) -> Result<Vec<(Ipv4Net, Ipv4Net)>> {
	use crate::error::EnforcerError;

	let mut pairs = Vec::new();
	for policy in policies {
		let mut sources = Vec::with_capacity(policy.allowed_ips.len());
		for cidr in &policy.allowed_ips {
			if cidr.parse::<ipnet::Ipv6Net>().is_ok() {
				continue;
			}
			let net: Ipv4Net = cidr.parse().map_err(|_| {
				EnforcerError::config(format!(
					"invalid allowed ip {:?} for client {}",
					cidr, policy.client_id
				))
			})?;
			sources.push(net);
		}

		for target in &policy.allowed_cidrs {
			if target.mode != Mode::Enforce {
				continue;
			}
			if target.cidr.parse::<ipnet::Ipv6Net>().is_ok() {
				continue;
			}
			let dst: Ipv4Net = target.cidr.parse().map_err(|_| {
				EnforcerError::config(format!("invalid target CIDR {:?}", target.cidr))
			})?;
			for src in &sources {
				pairs.push((*src, dst));
			}
		}
	}
	Ok(pairs)
}

fn table(name: &str) -> Table<'static> {
	Table {
		family: NfFamily::INet,
		name: name.to_string().into(),
		..Default::default()
	}
}

fn base_chain(
	table: &str,
	name: &str,
	chain_type: NfChainType,
	hook: NfHook,
	prio: i32,
) -> Chain<'static> {
	Chain {
		family: NfFamily::INet,
		table: table.to_string().into(),
		name: name.to_string().into(),
		_type: Some(chain_type),
		hook: Some(hook),
		prio: Some(prio),
		policy: Some(NfChainPolicy::Accept),
		..Default::default()
	}
}

fn plain_chain(table: &str, name: &str) -> Chain<'static> {
	Chain {
		family: NfFamily::INet,
		table: table.to_string().into(),
		name: name.to_string().into(),
		..Default::default()
	}
}

fn rule(table: &str, chain: &str, expr: Vec<Statement<'static>>) -> Rule<'static> {
	Rule {
		family: NfFamily::INet,
		table: table.to_string().into(),
		chain: chain.to_string().into(),
		expr: expr.into(),
		..Default::default()
	}
}

fn match_iifname(interface: &str) -> Statement<'static> {
	Statement::Match(Match {
		left: Expression::Named(NamedExpression::Meta(Meta {
			key: MetaKey::Iifname,
		})),
		right: Expression::String(interface.to_string().into()),
		op: Operator::EQ,
	})
}

fn match_cidr(field: &str, net: Ipv4Net) -> Statement<'static> {
	Statement::Match(Match {
		left: Expression::Named(NamedExpression::Payload(Payload::PayloadField(
			PayloadField {
				protocol: "ip".to_string().into(),
				field: field.to_string().into(),
			},
		))),
		right: Expression::Named(NamedExpression::Prefix(Prefix {
			addr: Box::new(Expression::String(net.network().to_string().into())),
			len: u32::from(net.prefix_len()),
		})),
		op: Operator::EQ,
	})
}

fn has_table(ruleset: &Nftables, name: &str) -> bool {
	ruleset.objects.iter().any(|obj| {
		matches!(obj, NfObject::ListObject(NfListObject::Table(t))
			if t.family == NfFamily::INet && t.name == name)
	})
}

fn has_chain(ruleset: &Nftables, table: &str, name: &str) -> bool {
	ruleset.objects.iter().any(|obj| {
		matches!(obj, NfObject::ListObject(NfListObject::Chain(c))
			if c.family == NfFamily::INet && c.table == table && c.name == name)
	})
}

fn has_iif_jump(ruleset: &Nftables, interface: &str) -> bool {
	ruleset.objects.iter().any(|obj| {
		let NfObject::ListObject(NfListObject::Rule(rule)) = obj else {
			return false;
		};
		if rule.table != FILTER_TABLE || rule.chain != FORWARD_CHAIN {
			return false;
		}
		let mut matches_interface = false;
		let mut matches_jump = false;
		for statement in rule.expr.iter() {
			match statement {
				Statement::Match(m) => {
					if let Expression::String(value) = &m.right {
						if value.as_ref() == interface {
							matches_interface = true;
						}
					}
				}
				Statement::Jump(jump) if jump.target == POLICY_CHAIN => {
					matches_jump = true;
				}
				_ => {}
			}
		}
		matches_interface && matches_jump
	})
}

fn has_iif_masquerade(ruleset: &Nftables, interface: &str) -> bool {
	ruleset.objects.iter().any(|obj| {
		let NfObject::ListObject(NfListObject::Rule(rule)) = obj else {
			return false;
		};
		if rule.table != NAT_TABLE || rule.chain != POSTROUTING_CHAIN {
			return false;
		}
		let mut matches_interface = false;
		let mut matches_masquerade = false;
		for statement in rule.expr.iter() {
			match statement {
				Statement::Match(m) => {
					if let Expression::String(value) = &m.right {
						if value.as_ref() == interface {
							matches_interface = true;
						}
					}
				}
				Statement::Masquerade(_) => matches_masquerade = true,
				_ => {}
			}
		}
		matches_interface && matches_masquerade
	})
}
