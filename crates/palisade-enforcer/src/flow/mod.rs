// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Flow observation pipeline.
//!
//! Kernel packet copies flow through a bounded channel into a batching
//! pusher: capture never blocks (overflow drops the newest entry and counts
//! it), batches go out at 100 entries or every 10 seconds, and a failed push
//! discards its batch, so delivery is at most once. Policy updates swap the
//! identity lookup tables without interrupting capture.

pub mod capture;
pub mod lookup;
pub mod packet;

use crate::controlplane::ControlPlaneClient;
use crate::error::Result;
use chrono::{DateTime, Utc};
use lookup::LookupTables;
use palisade_common::FlowRecord;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub const QUEUE_CAPACITY: usize = 1024;
pub const MAX_BATCH_SIZE: usize = 100;
pub const PUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Where finished batches go. The control plane in production; tests swap in
/// a recorder.
#[async_trait::async_trait]
pub trait LogSink: Send + Sync {
	async fn push_logs(&self, records: &[FlowRecord]) -> Result<()>;
}

#[async_trait::async_trait]
impl LogSink for ControlPlaneClient {
	async fn push_logs(&self, records: &[FlowRecord]) -> Result<()> {
		ControlPlaneClient::push_logs(self, records).await
	}
}

/// Capture-side handle: parses, enriches, and enqueues packets. Sync, safe
/// to call from the capture thread.
pub struct FlowPipeline {
	tables: Arc<LookupTables>,
	tx: mpsc::Sender<FlowRecord>,
	dropped: AtomicU64,
}

impl FlowPipeline {
	pub fn new(tables: Arc<LookupTables>) -> (Arc<Self>, mpsc::Receiver<FlowRecord>) {
		let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
		(
			Arc::new(Self {
				tables,
				tx,
				dropped: AtomicU64::new(0),
			}),
			rx,
		)
	}

	/// Entries dropped because the queue was full.
	pub fn dropped(&self) -> u64 {
		self.dropped.load(Ordering::Relaxed)
	}

	pub fn ingest(&self, payload: &[u8], captured_at: Option<DateTime<Utc>>) {
		let Some(parsed) = packet::parse_ipv4_packet(payload) else {
			return;
		};

		let (client_id, client_name) = self
			.tables
			.match_client(IpAddr::V4(parsed.src_ip))
			.unwrap_or_default();
		let (resource_id, resource_name) = self
			.tables
			.match_resource(IpAddr::V4(parsed.dst_ip))
			.unwrap_or_default();

		let record = FlowRecord {
			timestamp: captured_at.unwrap_or_else(Utc::now),
			src_ip: parsed.src_ip.to_string(),
			src_port: parsed.src_port,
			dst_ip: parsed.dst_ip.to_string(),
			dst_port: parsed.dst_port,
			proto: parsed.proto,
			client_id,
			client_name,
			resource_id,
			resource_name,
			length: payload.len() as u64,
		};

		if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(record) {
			let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
			if total.is_power_of_two() {
				warn!(dropped = total, "flow queue full, dropping entries");
			}
		}
	}
}

/// Push side: drains the channel into batches and ships them.
pub struct FlowPusher<S> {
	rx: mpsc::Receiver<FlowRecord>,
	sink: Arc<S>,
}

impl<S: LogSink> FlowPusher<S> {
	pub fn new(rx: mpsc::Receiver<FlowRecord>, sink: Arc<S>) -> Self {
		Self { rx, sink }
	}

	pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
		let mut batch: Vec<FlowRecord> = Vec::with_capacity(MAX_BATCH_SIZE);
		let mut ticker = tokio::time::interval(PUSH_INTERVAL);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

		loop {
			tokio::select! {
				biased;

				changed = shutdown.changed() => {
					if changed.is_err() || *shutdown.borrow() {
						break;
					}
				}

				received = self.rx.recv() => {
					match received {
						Some(record) => {
							batch.push(record);
							if batch.len() >= MAX_BATCH_SIZE {
								self.push(&mut batch).await;
							}
						}
						None => break,
					}
				}

				_ = ticker.tick() => {
					if !batch.is_empty() {
						self.push(&mut batch).await;
					}
				}
			}
		}

		// Drain whatever is still queued so in-flight entries reach the
		// server before exit.
		while let Ok(record) = self.rx.try_recv() {
			batch.push(record);
			if batch.len() >= MAX_BATCH_SIZE {
				self.push(&mut batch).await;
			}
		}
		if !batch.is_empty() {
			self.push(&mut batch).await;
		}
		info!("flow pusher stopped");
	}

	async fn push(&self, batch: &mut Vec<FlowRecord>) {
		if let Err(e) = self.sink.push_logs(batch).await {
			warn!(error = %e, discarded = batch.len(), "log push failed");
		} else {
			debug!(count = batch.len(), "pushed log batch");
		}
		batch.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Mutex;

	struct RecordingSink {
		batches: Mutex<Vec<Vec<FlowRecord>>>,
		fail: bool,
	}

	impl RecordingSink {
		fn new(fail: bool) -> Arc<Self> {
			Arc::new(Self {
				batches: Mutex::new(Vec::new()),
				fail,
			})
		}

		fn batch_sizes(&self) -> Vec<usize> {
			self.batches.lock().unwrap().iter().map(Vec::len).collect()
		}
	}

	#[async_trait::async_trait]
	impl LogSink for RecordingSink {
		async fn push_logs(&self, records: &[FlowRecord]) -> Result<()> {
			self.batches.lock().unwrap().push(records.to_vec());
			if self.fail {
				return Err(crate::error::EnforcerError::ControlPlane("boom".into()));
			}
			Ok(())
		}
	}

	fn tcp_packet(src: [u8; 4], dst: [u8; 4]) -> Vec<u8> {
		let mut packet = vec![0u8; 20];
		packet[0] = 0x45;
		packet[9] = 6;
		packet[12..16].copy_from_slice(&src);
		packet[16..20].copy_from_slice(&dst);
		packet.extend_from_slice(&[0x94, 0xEA, 0x01, 0xBB]);
		packet
	}

	fn enriched_tables() -> Arc<LookupTables> {
		use palisade_common::{Mode, Policy, PolicyTarget};

		let tables = Arc::new(LookupTables::new());
		tables.update(&[Policy {
			client_id: "c2".into(),
			client_name: "bob".into(),
			wg_public_key: "pk".into(),
			allowed_ips: vec!["10.8.0.3/32".into()],
			allowed_cidrs: vec![PolicyTarget {
				cidr: "192.168.20.5/32".into(),
				mode: Mode::Enforce,
				resource_id: "r2".into(),
				resource_name: "db".into(),
			}],
		}]);
		tables
	}

	#[tokio::test]
	async fn ingest_enriches_with_identity() {
		let (pipeline, mut rx) = FlowPipeline::new(enriched_tables());
		pipeline.ingest(&tcp_packet([10, 8, 0, 3], [192, 168, 20, 5]), None);

		let record = rx.recv().await.unwrap();
		assert_eq!(record.client_id, "c2");
		assert_eq!(record.client_name, "bob");
		assert_eq!(record.resource_id, "r2");
		assert_eq!(record.proto, "tcp");
		assert_eq!(record.dst_port, 443);
		assert_ne!(record.src_port, 0);
		assert_eq!(record.length, 24);
	}

	#[tokio::test]
	async fn ingest_without_match_leaves_identity_empty() {
		let (pipeline, mut rx) = FlowPipeline::new(Arc::new(LookupTables::new()));
		pipeline.ingest(&tcp_packet([10, 99, 0, 1], [8, 8, 8, 8]), None);

		let record = rx.recv().await.unwrap();
		assert!(record.client_id.is_empty());
		assert!(record.resource_id.is_empty());
	}

	#[tokio::test]
	async fn non_ipv4_payloads_are_ignored() {
		let (pipeline, mut rx) = FlowPipeline::new(Arc::new(LookupTables::new()));
		pipeline.ingest(&[0x65; 40], None);
		pipeline.ingest(&[], None);

		assert!(rx.try_recv().is_err());
	}

	#[tokio::test]
	async fn overflow_drops_and_counts() {
		let (pipeline, _rx) = FlowPipeline::new(Arc::new(LookupTables::new()));
		let packet = tcp_packet([10, 8, 0, 3], [192, 168, 20, 5]);

		for _ in 0..(QUEUE_CAPACITY + 10) {
			pipeline.ingest(&packet, None);
		}
		assert_eq!(pipeline.dropped(), 10);
	}

	#[tokio::test]
	async fn pusher_batches_at_max_size() {
		let (pipeline, rx) = FlowPipeline::new(Arc::new(LookupTables::new()));
		let sink = RecordingSink::new(false);
		let (shutdown_tx, shutdown_rx) = watch::channel(false);

		let packet = tcp_packet([10, 8, 0, 3], [192, 168, 20, 5]);
		for _ in 0..(MAX_BATCH_SIZE + 5) {
			pipeline.ingest(&packet, None);
		}

		let pusher = FlowPusher::new(rx, Arc::clone(&sink));
		let handle = tokio::spawn(pusher.run(shutdown_rx));

		// Give the pusher a moment to take the full batch, then stop it; the
		// drain flushes the remainder.
		tokio::time::sleep(Duration::from_millis(50)).await;
		shutdown_tx.send(true).unwrap();
		handle.await.unwrap();

		assert_eq!(sink.batch_sizes(), vec![MAX_BATCH_SIZE, 5]);
	}

	#[tokio::test]
	async fn failed_push_discards_batch() {
		let (pipeline, rx) = FlowPipeline::new(Arc::new(LookupTables::new()));
		let sink = RecordingSink::new(true);
		let (shutdown_tx, shutdown_rx) = watch::channel(false);

		pipeline.ingest(&tcp_packet([10, 8, 0, 3], [192, 168, 20, 5]), None);

		let pusher = FlowPusher::new(rx, Arc::clone(&sink));
		let handle = tokio::spawn(pusher.run(shutdown_rx));
		tokio::time::sleep(Duration::from_millis(50)).await;
		shutdown_tx.send(true).unwrap();
		handle.await.unwrap();

		// One attempt, nothing retried.
		assert_eq!(sink.batch_sizes(), vec![1]);
	}

	#[tokio::test]
	async fn shutdown_flushes_pending_entries() {
		let (pipeline, rx) = FlowPipeline::new(Arc::new(LookupTables::new()));
		let sink = RecordingSink::new(false);
		let (shutdown_tx, shutdown_rx) = watch::channel(false);

		for _ in 0..3 {
			pipeline.ingest(&tcp_packet([10, 8, 0, 3], [192, 168, 20, 5]), None);
		}

		shutdown_tx.send(true).unwrap();
		FlowPusher::new(rx, Arc::clone(&sink)).run(shutdown_rx).await;

		assert_eq!(sink.batch_sizes(), vec![3]);
	}

	#[tokio::test]
	async fn capture_timestamp_is_preserved() {
		let (pipeline, mut rx) = FlowPipeline::new(Arc::new(LookupTables::new()));
		let ts: DateTime<Utc> = "2025-06-01T12:00:00Z".parse().unwrap();

		pipeline.ingest(&tcp_packet([10, 8, 0, 3], [192, 168, 20, 5]), Some(ts));
		assert_eq!(rx.recv().await.unwrap().timestamp, ts);
	}
}
