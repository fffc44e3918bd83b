//! Headless frame runner. Runs a ROM for a number of frames, prints a
//! SHA-1 fingerprint of the palette-index framebuffer for regression
//! comparison, and can dump the picture as a PPM via the NTSC palette.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use famicore::nes::palette::NTSC_PALETTE;
use famicore::nes::ppu::{FRAME_HEIGHT, FRAME_WIDTH};
use famicore::Nes;
use sha1::{Digest, Sha1};

struct Config {
    rom: PathBuf,
    frames: u32,
    buttons: u8,
    ppm: Option<PathBuf>,
}

fn parse_args() -> Result<Config> {
    let mut args = std::env::args().skip(1);
    let mut rom = None;
    let mut frames = 60u32;
    let mut buttons = 0u8;
    let mut ppm = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--frames" => {
                let value = args
                    .next()
                    .context("--frames requires a count, e.g. --frames 120")?;
                frames = value
                    .parse()
                    .with_context(|| format!("invalid --frames value: {value}"))?;
            }
            "--buttons" => {
                let value = args
                    .next()
                    .context("--buttons requires a hex byte, e.g. --buttons 80 for A")?;
                buttons = u8::from_str_radix(value.trim_start_matches("0x"), 16)
                    .with_context(|| format!("invalid --buttons value: {value}"))?;
            }
            "--ppm" => {
                let value = args
                    .next()
                    .context("--ppm requires an output path, e.g. --ppm frame.ppm")?;
                ppm = Some(PathBuf::from(value));
            }
            other => {
                if rom.is_some() {
                    anyhow::bail!("unexpected argument: {other}");
                }
                rom = Some(PathBuf::from(other));
            }
        }
    }

    Ok(Config {
        rom: rom.context("usage: frame_runner <rom.nes> [--frames N] [--buttons XX] [--ppm out.ppm]")?,
        frames,
        buttons,
        ppm,
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let config = parse_args()?;

    let mut nes = Nes::new();
    nes.load_from_file(&config.rom)
        .with_context(|| format!("failed to load {}", config.rom.display()))?;
    nes.set_controller(0, config.buttons);

    for _ in 0..config.frames {
        nes.step_frame();
    }

    let frame = nes.frame();
    let mut hasher = Sha1::new();
    hasher.update(frame.as_slice());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();

    let state = nes.cpu_state();
    println!("mapper: {}", nes.mapper_name().unwrap_or("none"));
    println!("frames: {}", nes.frame_number());
    println!("frame sha1: {hex}");
    println!(
        "cpu: PC=${:04X} A={:02X} X={:02X} Y={:02X} P={:02X} SP={:02X}{}",
        state.pc,
        state.a,
        state.x,
        state.y,
        state.p,
        state.s,
        if state.stopped { " (stopped)" } else { "" },
    );

    if let Some(path) = config.ppm {
        let mut out = Vec::with_capacity(FRAME_WIDTH * FRAME_HEIGHT * 3 + 32);
        out.extend_from_slice(format!("P6\n{FRAME_WIDTH} {FRAME_HEIGHT}\n255\n").as_bytes());
        for &index in frame.iter() {
            out.extend_from_slice(&NTSC_PALETTE[(index & 0x3F) as usize]);
        }
        File::create(&path)
            .and_then(|mut f| f.write_all(&out))
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("wrote {}", path.display());
    }

    Ok(())
}
