use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use famicore::nes::Nes;
use famicore::nes::cartridge::Cartridge;
use famicore::nes::config::Config;
use serde::Serialize;
use sha1::{Digest, Sha1};

#[derive(Debug, Clone)]
struct Args {
    rom: Option<PathBuf>,
    config: Option<PathBuf>,
    frames: u32,
    buttons: u8,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            rom: None,
            config: None,
            frames: 60,
            buttons: 0,
        }
    }
}

#[derive(Serialize)]
struct Report<'a> {
    mapper: &'a str,
    frames: u32,
    frame_sha1: String,
    fault: Option<String>,
    counters: famicore::nes::NesDebugCounters,
    ppu: famicore::nes::ppu::PpuDebugCounters,
    registers: famicore::nes::cpu::Registers,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut argv = std::env::args().skip(1);

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--rom" => {
                let value = argv.next().context("--rom requires a path, e.g. --rom game.nes")?;
                args.rom = Some(PathBuf::from(value));
            }
            "--config" => {
                let value = argv
                    .next()
                    .context("--config requires a path, e.g. --config pal.json")?;
                args.config = Some(PathBuf::from(value));
            }
            "--frames" => {
                let value = argv
                    .next()
                    .context("--frames requires an integer, e.g. --frames 600")?;
                args.frames = value
                    .parse::<u32>()
                    .with_context(|| format!("invalid --frames value: {value}"))?;
            }
            "--buttons" => {
                let value = argv
                    .next()
                    .context("--buttons requires a hex mask, e.g. --buttons 08")?;
                args.buttons = u8::from_str_radix(value.trim_start_matches("0x"), 16)
                    .with_context(|| format!("invalid --buttons value: {value}"))?;
            }
            "--help" | "-h" => {
                println!(
                    "famicore_headless\n\n\
Usage:\n\
  cargo run --release --bin famicore_headless -- --rom <path> [options]\n\n\
Options:\n\
  --rom <path>          iNES image to run\n\
  --config <path>       JSON config (region, sample_rate, audio_batch_len)\n\
  --frames <n>          Frames to run (default 60)\n\
  --buttons <hex>       Controller 1 button mask held for the whole run\n\
  -h, --help            Show this help\n"
                );
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    Ok(args)
}

fn hash_frame(frame: &[u8]) -> String {
    Sha1::digest(frame)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn main() -> Result<()> {
    env_logger::init();
    let args = parse_args()?;
    let rom = args.rom.as_ref().context("missing --rom <path>")?;

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let cart = Cartridge::from_file(rom)?;
    let mut nes = Nes::new(cart, &config)
        .with_context(|| format!("failed to start {}", rom.display()))?;
    nes.set_controller_state(0, args.buttons);

    let start = Instant::now();
    let mut frames = 0;
    let mut fault = None;
    while frames < args.frames {
        if let Err(err) = nes.run_frame() {
            fault = Some(err.to_string());
            break;
        }
        while nes.take_audio_batch().is_some() {}
        frames += 1;
    }
    let elapsed = start.elapsed();

    let report = Report {
        mapper: nes.mapper_name(),
        frames,
        frame_sha1: hash_frame(nes.frame_buffer()),
        fault,
        counters: nes.debug_counters(),
        ppu: nes.debug_ppu_counters(),
        registers: nes.registers(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    eprintln!(
        "ran {frames} frame(s) in {:.2}s; recent events:",
        elapsed.as_secs_f32()
    );
    for event in nes.debug_recent_events(8) {
        eprintln!("  {event}");
    }

    if let Some(fault) = report.fault {
        anyhow::bail!("emulation halted after {frames} frame(s): {fault}");
    }
    Ok(())
}
