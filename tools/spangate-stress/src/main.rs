// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! spangate-stress - load generator and sink for the Spangate receiver.
//!
//! `flood` blasts UDP datagrams at a receiver at a target rate;
//! `sink` runs a counting receiver until Ctrl-C and reports throughput.

use clap::{Parser, Subcommand};
use spangate::{DispatchHandler, MetricsRegistry, UdpReceiver};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Spangate stress testing tool
#[derive(Parser, Debug)]
#[command(name = "spangate-stress")]
#[command(version)]
#[command(about = "Flood a Spangate receiver or run a counting sink")]
struct Args {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Send datagrams at a fixed rate
    Flood {
        /// Receiver address
        #[arg(short, long, default_value = "127.0.0.1:9995")]
        target: SocketAddr,

        /// Datagrams per second
        #[arg(short, long, default_value = "10000")]
        rate: u64,

        /// Payload size in bytes
        #[arg(short, long, default_value = "256")]
        size: usize,

        /// Total datagrams to send (unlimited when omitted)
        #[arg(short, long)]
        count: Option<u64>,
    },

    /// Run a receiver that counts everything it dispatches
    Sink {
        /// Bind address
        #[arg(short, long, default_value = "0.0.0.0")]
        bind: IpAddr,

        /// Bind port
        #[arg(short, long, default_value = "9995")]
        port: u16,

        /// Worker threads
        #[arg(long, default_value = "128")]
        workers: usize,

        /// Worker queue capacity
        #[arg(long, default_value = "1024")]
        queue: usize,

        /// Reader threads (defaults to the logical CPU count)
        #[arg(long)]
        readers: Option<usize>,

        /// Seconds between progress reports
        #[arg(long, default_value = "1")]
        report_interval: u64,
    },
}

struct CountingHandler {
    datagrams: AtomicU64,
    bytes: AtomicU64,
}

impl DispatchHandler for CountingHandler {
    fn handle(&self, payload: &[u8], _source: SocketAddr) -> spangate::Result<()> {
        self.datagrams.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(payload.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let result = match args.mode {
        Mode::Flood {
            target,
            rate,
            size,
            count,
        } => flood(target, rate, size, count),
        Mode::Sink {
            bind,
            port,
            workers,
            queue,
            readers,
            report_interval,
        } => sink(bind, port, workers, queue, readers, report_interval),
    };

    if let Err(err) = result {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn stop_flag() -> Result<Arc<AtomicBool>, Box<dyn std::error::Error>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })?;
    Ok(flag)
}

fn flood(
    target: SocketAddr,
    rate: u64,
    size: usize,
    count: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let stop = stop_flag()?;
    let socket = UdpSocket::bind(SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0))?;

    let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    let interval = Duration::from_secs_f64(1.0 / rate.max(1) as f64);

    println!(
        "flooding {} with {} B datagrams at {}/s (Ctrl-C to stop)",
        target, size, rate
    );

    let started = Instant::now();
    let mut sent: u64 = 0;
    let mut errors: u64 = 0;
    let mut last_report = Instant::now();

    while !stop.load(Ordering::SeqCst) {
        if let Some(limit) = count {
            if sent >= limit {
                break;
            }
        }

        match socket.send_to(&payload, target) {
            Ok(_) => sent += 1,
            Err(err) => {
                errors += 1;
                log::debug!("send failed: {}", err);
            }
        }

        spin_sleep::sleep(interval);

        if last_report.elapsed() >= Duration::from_secs(1) {
            let elapsed = started.elapsed().as_secs_f64();
            println!(
                "sent {} ({:.0}/s), {} send error(s)",
                sent,
                sent as f64 / elapsed,
                errors
            );
            last_report = Instant::now();
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    println!(
        "done: {} datagrams in {:.1}s ({:.0}/s), {} send error(s)",
        sent,
        elapsed,
        sent as f64 / elapsed.max(f64::EPSILON),
        errors
    );
    Ok(())
}

fn sink(
    bind: IpAddr,
    port: u16,
    workers: usize,
    queue: usize,
    readers: Option<usize>,
    report_interval: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let stop = stop_flag()?;

    let handler = Arc::new(CountingHandler {
        datagrams: AtomicU64::new(0),
        bytes: AtomicU64::new(0),
    });
    let metrics = Arc::new(MetricsRegistry::new());

    let mut builder = UdpReceiver::builder("stress-sink")
        .bind(bind, port)
        .worker_threads(workers)
        .worker_queue_capacity(queue)
        .dispatch_handler(Arc::clone(&handler) as Arc<dyn DispatchHandler>)
        .metrics(Arc::clone(&metrics) as Arc<dyn spangate::MetricsSink>);
    if let Some(readers) = readers {
        builder = builder.reader_threads(readers);
    }

    let receiver = builder.build()?;
    receiver.start()?;
    let addr = receiver.local_addr().expect("receiver is running");
    println!("sink listening on {} (Ctrl-C to stop)", addr);

    let started = Instant::now();
    let mut last_count: u64 = 0;
    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_secs(report_interval.max(1)));

        let total = handler.datagrams.load(Ordering::Relaxed);
        let snap = receiver.stats();
        println!(
            "dispatched {} (+{}), rejected {}, pool-exhausted {}, handler errors {}",
            total,
            total - last_count,
            snap.dispatch_rejections,
            snap.pool_exhausted_drops,
            snap.handler_errors
        );
        last_count = total;
    }

    receiver.shutdown();

    let elapsed = started.elapsed().as_secs_f64();
    let total = handler.datagrams.load(Ordering::Relaxed);
    let bytes = handler.bytes.load(Ordering::Relaxed);
    println!(
        "final: {} datagrams, {} bytes in {:.1}s ({:.0}/s), rejected {}",
        total,
        bytes,
        elapsed,
        total as f64 / elapsed.max(f64::EPSILON),
        receiver.rejected_count()
    );
    if let Some(timer) = metrics.timer("stress-sink-timer") {
        println!(
            "dispatch latency: {} samples, max {:?}",
            timer.count, timer.max
        );
    }
    Ok(())
}
