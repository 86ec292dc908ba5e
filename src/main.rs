mod args;

use crate::args::{Args, ResolverKind};
use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, Log, Metadata, Record};
use pingforge::{
    build_spoofed_packet, send_raw, DnsResolver, FragmentField, PacketOptions, PingConfig,
    Pinger, Resolve, SystemResolver,
};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: bool) -> Result<()> {
    log::set_logger(&LOGGER).map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))?;
    log::set_max_level(if verbose {
        LevelFilter::Trace
    } else {
        LevelFilter::Warn
    });
    Ok(())
}

fn resolver(args: &Args) -> Arc<dyn Resolve> {
    match (args.resolver, args.nameserver) {
        (ResolverKind::System, None) => Arc::new(SystemResolver),
        (_, nameserver) => Arc::new(DnsResolver { nameserver }),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn spoof(args: &Args, identifier: u16) -> Result<()> {
    let destination = resolver(args).resolve(&args.destination)?;
    let options = PacketOptions {
        ttl: args.ttl,
        source: args.source,
        destination,
        ip_option: args.ip_option,
        fragment: if args.legacy_fragment {
            FragmentField::LegacyEstimate
        } else {
            FragmentField::SingleFragment
        },
        ..PacketOptions::default()
    };
    let packet = build_spoofed_packet(
        args.payload.as_bytes(),
        identifier,
        args.sequence,
        &options,
    )?;
    println!("packet: {}", hex(&packet));
    send_raw(&packet, destination)
        .with_context(|| format!("sending spoofed packet to {destination}"))?;
    println!(
        "sent {} bytes {} -> {}",
        packet.len(),
        options.source,
        destination
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;
    let identifier = args
        .identifier
        .unwrap_or_else(|| rand::thread_rng().gen());

    if args.spoof {
        return spoof(&args, identifier);
    }

    let deadline = args
        .deadline
        .map(Duration::try_from_secs_f64)
        .transpose()
        .context("invalid deadline")?;
    let pinger = Pinger::new(PingConfig {
        deadline,
        verify_checksums: args.verify,
        match_identifier: !args.any_reply,
        resolver: resolver(&args),
        ..PingConfig::default()
    });

    println!(
        "PING {} {}({}) bytes of data.",
        args.destination,
        args.payload.len(),
        args.payload.len() + 28
    );
    let result = pinger
        .ping(
            &args.destination,
            args.payload.as_bytes(),
            identifier,
            args.sequence,
        )
        .with_context(|| format!("pinging {}", args.destination))?;

    println!(
        "{} bytes from {}: icmp_seq={} ttl={} time={:.3} ms",
        result.raw_reply.len(),
        result.peer,
        result.reply.icmp.sequence,
        result.reply.ip.ttl,
        result.elapsed.as_secs_f64() * 1000.0
    );
    for (name, value) in result.reply.ip.fields() {
        println!("  ip.{name}: {value}");
    }
    for (name, value) in result.reply.icmp.fields() {
        println!("  icmp.{name}: {value}");
    }
    Ok(())
}
