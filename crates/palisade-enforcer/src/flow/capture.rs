// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Kernel packet capture.
//!
//! Subscribes to the configured nflog group and feeds every packet copy into
//! the pipeline. The nflog socket loop blocks, so it runs on a dedicated
//! thread; it lives for the rest of the process.

use crate::error::{EnforcerError, Result};
use crate::flow::FlowPipeline;
use std::sync::Arc;
use std::thread;
use tracing::info;

pub fn spawn(group: u16, pipeline: Arc<FlowPipeline>) -> Result<thread::JoinHandle<()>> {
	let mut queue = nflog::Queue::open().map_err(|e| EnforcerError::Capture(e.to_string()))?;
	queue
		.bind(libc::AF_INET)
		.map_err(|e| EnforcerError::Capture(e.to_string()))?;

	let mut log_group = queue
		.bind_group(group)
		.map_err(|e| EnforcerError::Capture(e.to_string()))?;
	log_group.set_mode(nflog::CopyMode::Packet, 0xffff);
	log_group.set_callback(Box::new(move |message: &nflog::Message| {
		pipeline.ingest(message.get_payload(), None);
	}));

	info!(group, "packet capture subscribed");

	let handle = thread::Builder::new()
		.name("nflog-capture".to_string())
		.spawn(move || {
			queue.run_loop();
		})
		.map_err(|e| EnforcerError::Capture(e.to_string()))?;

	Ok(handle)
}
