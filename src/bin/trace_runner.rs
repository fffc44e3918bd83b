//! Headless instruction tracer. Loads a ROM, optionally forces the
//! program counter to an automation entry point, and prints one
//! nestest-style line per instruction for diffing against reference
//! logs.

use std::path::PathBuf;

use anyhow::{Context, Result};
use famicore::Nes;

struct Config {
    rom: PathBuf,
    entry_pc: Option<u16>,
    instructions: u64,
    show_result_bytes: bool,
}

fn parse_args() -> Result<Config> {
    let mut args = std::env::args().skip(1);
    let mut rom = None;
    let mut entry_pc = None;
    let mut instructions = 8991u64;
    let mut show_result_bytes = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--pc" => {
                let value = args
                    .next()
                    .context("--pc requires a hex address, e.g. --pc C000")?;
                entry_pc = Some(
                    u16::from_str_radix(value.trim_start_matches("0x"), 16)
                        .with_context(|| format!("invalid --pc value: {value}"))?,
                );
            }
            "--instructions" => {
                let value = args
                    .next()
                    .context("--instructions requires a count, e.g. --instructions 8991")?;
                instructions = value
                    .parse()
                    .with_context(|| format!("invalid --instructions value: {value}"))?;
            }
            "--result-bytes" => show_result_bytes = true,
            other => {
                if rom.is_some() {
                    anyhow::bail!("unexpected argument: {other}");
                }
                rom = Some(PathBuf::from(other));
            }
        }
    }

    Ok(Config {
        rom: rom.context("usage: trace_runner <rom.nes> [--pc C000] [--instructions N]")?,
        entry_pc,
        instructions,
        show_result_bytes,
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let config = parse_args()?;

    let mut nes = Nes::new();
    nes.load_from_file(&config.rom)
        .with_context(|| format!("failed to load {}", config.rom.display()))?;

    if let Some(pc) = config.entry_pc {
        // Automation entry: registers per the nestest convention
        nes.set_cpu_state(pc, 0, 0, 0, 0xFD, 0x24);
    }

    for _ in 0..config.instructions {
        let state = nes.cpu_state();
        if state.stopped {
            println!("CPU stopped at ${:04X}", state.pc);
            break;
        }

        println!(
            "{:04X}  {:<32} A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X} CYC:{}",
            state.pc,
            nes.disassemble_at(state.pc),
            state.a,
            state.x,
            state.y,
            state.p,
            state.s,
            nes.cpu_cycles(),
        );

        nes.step_instruction();
    }

    if config.show_result_bytes {
        println!(
            "result bytes: $02={:02X} $03={:02X}",
            nes.peek(0x0002),
            nes.peek(0x0003)
        );
    }

    Ok(())
}
