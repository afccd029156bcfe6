// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Spangate - UDP ingestion front-end for a tracing collector
//!
//! Spangate accepts serialized trace/metric datagrams from many remote
//! instrumented processes, buffers them safely under bursty load, and
//! hands each datagram to a decoding/dispatch stage - without unbounded
//! memory growth or thread explosion.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spangate::{DispatchHandler, MetricsRegistry, Result, UdpReceiver};
//! use std::net::{Ipv4Addr, SocketAddr};
//! use std::sync::Arc;
//!
//! struct SpanDecoder;
//!
//! impl DispatchHandler for SpanDecoder {
//!     fn handle(&self, payload: &[u8], source: SocketAddr) -> Result<()> {
//!         println!("{} bytes from {}", payload.len(), source);
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> Result<()> {
//!     let receiver = UdpReceiver::builder("span-udp")
//!         .bind(Ipv4Addr::UNSPECIFIED.into(), 9995)
//!         .dispatch_handler(Arc::new(SpanDecoder))
//!         .metrics(Arc::new(MetricsRegistry::new()))
//!         .build()?;
//!
//!     receiver.start()?;
//!     std::thread::park();
//!     receiver.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                      Instrumented processes                        |
//! +--------------------------------------------------------------------+
//!                          | UDP datagrams
//! +--------------------------------------------------------------------+
//! |  UdpGateway (bind / receive-with-timeout / close)                  |
//! |     -> reader loops (xN, blocking recv, run-state checked)         |
//! |     -> PacketPool (fixed capacity, zero per-datagram allocation)   |
//! |     -> WorkerPool (bounded queue, reject-on-saturation)            |
//! |     -> DispatchHandler (external decode/route stage)               |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`UdpReceiver`] | The receiver: lifecycle, readers, workers, pool |
//! | [`DispatchHandler`] | External decode/route stage, one call per datagram |
//! | [`MetricsSink`] | Observational timer/counter collaborator |
//! | [`PacketPool`] | Fixed-capacity reusable receive-buffer pool |
//! | [`ReceiverConfig`] | Immutable receiver configuration |
//!
//! ## Guarantees
//!
//! - The pool holds `worker_threads + worker_queue_capacity +
//!   reader_threads` buffers: under correctly-bounded load exhaustion is
//!   never the normal case.
//! - A saturated dispatch queue rejects synchronously; readers never
//!   block on the dispatch stage.
//! - Shutdown is cooperative and bounded: one receive-timeout interval
//!   per reader at worst, plus a 10 s await per thread group.

/// Global constants and the immutable receiver configuration.
pub mod config;
/// Metrics collaborator interface and in-crate registry.
pub mod metrics;
/// The UDP receiver subsystem (gateway, pool, readers, workers, lifecycle).
pub mod receiver;

pub use config::ReceiverConfig;
pub use metrics::{MetricsRegistry, MetricsSink, TimerSnapshot};
pub use receiver::{
    DispatchHandler, Error, LifecycleState, PacketBuf, PacketPool, RecvOutcome, Result,
    StatsSnapshot, UdpGateway, UdpReceiver, UdpReceiverBuilder,
};

/// Spangate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
