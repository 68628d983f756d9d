// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! V2X loopback demo
//!
//! Runs two stations on an in-process broker, or on a real AMQP broker when
//! built with the `amqp` feature and started with `--amqp`. The sender
//! publishes a CAM every `--cam-interval-ms` and a segmented CPM every
//! `--cpm-every` CAMs; the receiver logs the end-to-end delay reconstructed from the generation
//! delta time.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: stations 101 -> 102, CAM every 100 ms
//! v2x-demo
//!
//! # Station settings from a file, verbose library logs
//! v2x-demo --config station.toml --log-level debug
//!
//! # Stop after 10 s instead of waiting for Ctrl+C
//! v2x-demo --duration 10
//!
//! # Both stations on the AMQP broker at the configured endpoint
//! cargo run -p v2x-demo --features amqp -- --amqp --config station.toml
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use v2x_bus::message::pdu::{Cam, Cpm, ItsMessage, PerceivedObject};
use v2x_bus::transport::memory::{MemoryBroker, MemoryTransport};
use v2x_bus::{time, units, BinaryMessage, BincodeCodec, BusConfig, MessageHandler, Transceiver};

/// Two-station V2X loopback demo
#[derive(Parser, Debug)]
#[command(name = "v2x-demo")]
#[command(about = "Exchange CAMs and segmented CPMs between two in-process stations")]
#[command(version)]
struct Args {
    /// Sender station configuration (TOML); the receiver uses station_id + 1
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// CAM period in milliseconds
    #[arg(long, default_value = "100")]
    cam_interval_ms: u64,

    /// Send a segmented CPM every N CAMs (0 disables)
    #[arg(long, default_value = "10")]
    cpm_every: u32,

    /// Segments per CPM
    #[arg(long, default_value = "3")]
    segments: u8,

    /// Run time in seconds (0 runs until Ctrl+C)
    #[arg(long, default_value = "0")]
    duration: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Connect both stations to the AMQP broker at the configured endpoint
    #[cfg(feature = "amqp")]
    #[arg(long)]
    amqp: bool,
}

/// Receiver side: logs delays and counts what arrives.
#[derive(Default)]
struct DelayLogger {
    cams: u64,
    cpms: u64,
    worst_delay_ms: f64,
}

impl MessageHandler for DelayLogger {
    fn on_cam(&mut self, cam: &Cam, meta: &BinaryMessage) {
        let generated = meta.generation_time(cam.generation_delta_time);
        let delay_ms = time::now_unix_ns().saturating_sub(generated) as f64 / 1e6;
        self.cams += 1;
        self.worst_delay_ms = self.worst_delay_ms.max(delay_ms);
        let speed_kmh = f64::from(cam.kinematics.speed) * 0.036;
        info!(
            station = meta.station_id,
            gdt = cam.generation_delta_time,
            speed_kmh,
            delay_ms,
            "CAM received"
        );
    }

    fn on_complete_cpm(
        &mut self,
        station_id: u32,
        segments: BTreeMap<u8, Cpm>,
        reference_time_ns: u64,
    ) {
        let objects: usize = segments.values().map(|s| s.perceived_objects.len()).sum();
        let delay_ms = time::now_unix_ns().saturating_sub(reference_time_ns) as f64 / 1e6;
        self.cpms += 1;
        info!(
            station = station_id,
            segments = segments.len(),
            objects,
            delay_ms,
            "CPM reassembled"
        );
    }
}

fn load_config(args: &Args) -> Result<BusConfig, v2x_bus::Error> {
    let config = match &args.config {
        Some(path) => BusConfig::from_file(path)?,
        None => BusConfig::new(101),
    };
    config.validate()?;
    Ok(config)
}

/// Dummy CAM of a vehicle driving north-east at 50 km/h.
fn dummy_cam(station_id: u32) -> Cam {
    let gdt = time::unix_to_generation_delta_time(time::now_unix_ns());
    let mut cam = Cam::new(station_id, gdt);
    let kinematics = &mut cam.kinematics;
    kinematics.heading = units::encode_wgs84_angle(std::f64::consts::FRAC_PI_4) as u16;
    kinematics.heading_confidence = units::encode_confidence_from_std_dev(0.5, 0.1, 126) as u8;
    kinematics.speed = units::encode_value(13.89, 0.01, 0, 16_383) as u16;
    kinematics.speed_confidence = units::encode_confidence_from_std_dev(0.2, 0.01, 126) as u8;
    cam
}

fn segmented_cpm(station_id: u32, segments: u8) -> Vec<ItsMessage> {
    let reference_time = time::unix_to_its_time(time::now_unix_ns());
    (1..=segments)
        .map(|index| {
            let mut cpm = Cpm::new(station_id, reference_time).with_segment(index, segments);
            cpm.perceived_objects = (0..4)
                .map(|id| PerceivedObject {
                    object_id: u16::from(index) * 10 + id,
                    x_distance: i32::from(id) * 250,
                    existence_probability: 90,
                    ..PerceivedObject::default()
                })
                .collect();
            ItsMessage::Cpm(cpm)
        })
        .collect()
}

/// Send every segment; returns how many were rejected.
fn send_segments<H: MessageHandler>(sender: &Transceiver<H>, segments: &[ItsMessage]) -> usize {
    segments
        .iter()
        .filter(|segment| !sender.send_message(segment, None))
        .count()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // tracing-subscriber also picks up the library's `log` records
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let sender_config = load_config(&args)?;
    let receiver_id = sender_config.station_id.wrapping_add(1);
    let mut receiver_config = sender_config.clone();
    receiver_config.station_id = receiver_id;
    let receiver_config = receiver_config.with_filter(format!("station_id <> {}", receiver_id));

    let mut sender = Transceiver::new(BincodeCodec, v2x_bus::transceiver::NoopHandler);
    let mut receiver = Transceiver::new(BincodeCodec, DelayLogger::default());
    let via = connect_stations(
        &args,
        &mut sender,
        sender_config.clone(),
        &mut receiver,
        receiver_config,
    )?;

    println!("V2X loopback demo v{}", env!("CARGO_PKG_VERSION"));
    println!("==============================");
    println!(
        "Station {} -> station {} via {}",
        sender_config.station_id, receiver_id, via
    );
    println!("Press Ctrl+C to stop...");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let period = Duration::from_millis(args.cam_interval_ms.max(1));
    let deadline = (args.duration > 0).then(|| Instant::now() + Duration::from_secs(args.duration));
    let station_id = sender_config.station_id;
    let mut tick: u64 = 0;
    let mut rejected_segments: u64 = 0;

    while running.load(Ordering::SeqCst) && deadline.map_or(true, |d| Instant::now() < d) {
        if !sender.send_message(&ItsMessage::Cam(dummy_cam(station_id)), None) {
            warn!("CAM not sent, broker not connected");
        }

        tick += 1;
        if args.cpm_every > 0 && args.segments > 0 && tick % u64::from(args.cpm_every) == 0 {
            let segments = segmented_cpm(station_id, args.segments);
            let rejected = send_segments(&sender, &segments);
            if rejected > 0 {
                warn!(
                    rejected,
                    total = segments.len(),
                    "CPM segments not sent, broker not connected"
                );
                rejected_segments += rejected as u64;
            }
        }
        thread::sleep(period);
    }

    println!("\nShutting down...");
    sender.disconnect();
    receiver.disconnect();

    if let (Some(stats), Some(logger)) = (receiver.stats(), receiver.into_handler()) {
        println!("\nFinal Statistics:");
        println!("  CAMs sent:         {}", tick);
        println!("  Rejected segments: {}", rejected_segments);
        println!("  CAMs received:     {}", logger.cams);
        println!("  CPMs reassembled:  {}", logger.cpms);
        println!("  Worst CAM delay:   {:.3} ms", logger.worst_delay_ms);
        println!("  Discarded:         {}", stats.discarded);
        println!("  Evicted segments:  {}", stats.evicted);
    }

    Ok(())
}

/// Connect receiver then sender; returns a label for the broker used.
fn connect_stations(
    args: &Args,
    sender: &mut Transceiver<v2x_bus::transceiver::NoopHandler>,
    sender_config: BusConfig,
    receiver: &mut Transceiver<DelayLogger>,
    receiver_config: BusConfig,
) -> Result<String, Box<dyn std::error::Error>> {
    #[cfg(feature = "amqp")]
    if args.amqp {
        use v2x_bus::transport::amqp::AmqpTransport;

        let via = format!("AMQP broker {}", sender_config.endpoint);
        receiver.connect(receiver_config, AmqpTransport::new()?)?;
        sender.connect(sender_config, AmqpTransport::new()?)?;
        return Ok(via);
    }
    #[cfg(not(feature = "amqp"))]
    let _ = args;

    let broker = MemoryBroker::new();
    broker.require_credentials(sender_config.credentials.clone());
    receiver.connect(receiver_config, MemoryTransport::new(broker.clone()))?;
    sender.connect(sender_config, MemoryTransport::new(broker))?;
    Ok("in-process broker".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use v2x_bus::transceiver::NoopHandler;

    #[test]
    fn test_segmented_cpm_shares_reference_time() {
        let segments = segmented_cpm(101, 3);
        assert_eq!(segments.len(), 3);
        let mut reference = None;
        for (expected, segment) in (1..=3).zip(&segments) {
            let ItsMessage::Cpm(cpm) = segment else {
                panic!("expected a CPM segment");
            };
            assert_eq!(cpm.segment(), (expected, 3));
            let time = cpm.management.reference_time;
            assert_eq!(*reference.get_or_insert(time), time);
        }
    }

    #[test]
    fn test_segments_count_as_rejected_while_disconnected() {
        let sender = Transceiver::new(BincodeCodec, NoopHandler);
        assert_eq!(send_segments(&sender, &segmented_cpm(101, 4)), 4);
    }

    #[test]
    fn test_segments_sent_on_a_live_broker() {
        let mut sender = Transceiver::new(BincodeCodec, NoopHandler);
        sender
            .connect(BusConfig::new(101), MemoryTransport::new(MemoryBroker::new()))
            .expect("connect");
        assert!(sender.wait_connected(Duration::from_secs(5)));
        assert_eq!(send_segments(&sender, &segmented_cpm(101, 4)), 0);
    }
}
