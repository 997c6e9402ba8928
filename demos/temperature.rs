#![allow(unused_crate_dependencies)]
#![allow(clippy::print_stdout)]

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use gatt_svc::sim::SimStack;
use gatt_svc::*;

/// Vendor base of the demo service.
const BASE: Uuid = match Uuid::new(0xF364_0000_0000_4B1B_8C9B_A4B2_9A3D_4E54) {
    Some(u) => u,
    None => panic!("zero base"),
};

#[derive(Clone, Debug, clap::Parser)]
struct Args {
    /// 16-bit alias of the temperature service.
    #[arg(short, long, value_parser=hex16, default_value = "ABCD")]
    service: u16,

    /// Connection handle of the simulated client.
    #[arg(short, long, default_value_t = 0)]
    conn: u16,

    /// Publish interval in milliseconds.
    #[arg(short, long, default_value_t = 250)]
    interval: u64,

    /// Number of readings to publish before the client disconnects.
    #[arg(short = 'n', long, default_value_t = 8)]
    count: u32,

    /// JSON service configuration.
    #[arg(long)]
    config: Option<String>,
}

/// Tracks client writes that recalibrate the sensor.
#[derive(Debug, Default)]
struct Sensor {
    calibrated: Option<i32>,
}

impl Handler for Sensor {
    fn on_write(&mut self, chr: &CharEntry, w: &Write<'_>) {
        if let &[b0, b1, b2, b3] = chr.value() {
            let v = i32::from_le_bytes([b0, b1, b2, b3]);
            info!("Temperature recalibrated to {v} mC by {}", w.conn);
            self.calibrated = Some(v);
        }
    }

    fn on_subscribe(&mut self, conn: ConnHandle, chr: Handle, cccd: Cccd) {
        info!("{conn} set {chr} subscription to {cccd:?}");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let cfg = match args.config {
        Some(ref s) => Config::from_json(s)?,
        None => Config::default(),
    };
    let Some(conn) = ConnHandle::new(args.conn) else {
        anyhow::bail!("invalid connection handle: {:#06X}", args.conn);
    };
    let mut stack = SimStack::new().strict().queue_size(2);
    let mut ctx = ServiceCtx::new(cfg, Sensor::default());
    let temp = register(&mut ctx, &mut stack, args.service)?;
    ctx.registry().dump();

    // Client connects, subscribes, and recalibrates the sensor
    ctx.handle_event(&stack.connect(conn));
    let cccd = ctx.registry().characteristic(temp).and_then(|c| c.handles().cccd);
    if let Some(cccd) = cccd {
        let evt = (stack.peer_write(conn, cccd, &[0x01, 0x00]))
            .map_err(|e| anyhow::anyhow!("CCCD write failed: {e}"))?;
        ctx.handle_event(&evt);
    }
    let v = 21_500_i32.to_le_bytes();
    let evt = (stack.peer_write(conn, temp, &v))
        .map_err(|e| anyhow::anyhow!("calibration write failed: {e}"))?;
    ctx.handle_event(&evt);

    let mut tick = tokio::time::interval(Duration::from_millis(args.interval));
    let mut reading: i32 = 20_000;
    for i in 0..args.count {
        tokio::select! {
            _ = tick.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }
        reading = match ctx.handler_mut().calibrated.take() {
            Some(v) => v,
            None => reading + if i % 3 == 0 { 70 } else { -30 },
        };
        match ctx.publish_with_retry(&mut stack, temp, &reading.to_le_bytes()).await {
            Ok(d) => info!("Reading {reading} mC -> {d:?}"),
            Err(e) => warn!("Reading {reading} mC dropped: {e}"),
        }
        // Radio drains the queue every other interval
        if i % 2 == 1 {
            if let Some(evt) = stack.tx_complete(conn) {
                ctx.handle_event(&evt);
            }
        }
    }

    ctx.handle_event(&stack.disconnect(conn, 0x13));
    let d = ctx.publish(&mut stack, temp, &reading.to_le_bytes())?;
    println!(
        "Submitted {} notifications; after disconnect: {d:?}",
        stack.hvx_calls().len(),
    );
    Ok(())
}

/// Registers the temperature service and returns the value handle of its
/// characteristic.
fn register(ctx: &mut ServiceCtx<Sensor>, stack: &mut SimStack, alias: u16) -> gatt_svc::Result<Handle> {
    let (_, hdls) = ctx.registry_mut().primary_service(stack, BASE, alias, |s| {
        s.characteristic(
            CharDesc::new(alias.wrapping_add(1))
                .props(Prop::READ | Prop::WRITE | Prop::NOTIFY)
                .perms(SecLevel::Open)
                .cccd(SecLevel::Open)
                .max_len(4)
                .value(20_000_i32.to_le_bytes()),
        )
    })?;
    Ok(hdls.value)
}

fn hex16(mut s: &str) -> Result<u16, String> {
    if s.starts_with("0x") || s.starts_with("0X") {
        s = &s[2..];
    }
    u16::from_str_radix(s, 16).map_err(|e| format!("{e}"))
}
