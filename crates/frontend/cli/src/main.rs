//! Headless VCS runner.
//!
//! Loads a cartridge, runs a number of frames and prints a digest per
//! frame, which is enough for regression runs and for eyeballing whether a
//! ROM boots. The final machine state can be dumped as JSON.

use std::fs;
use std::fs::File;
use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use vcs_core::logging::{LogConfig, LogLevel};
use vcs_atari2600::television::Specification;
use vcs_atari2600::Vcs;

#[derive(Parser)]
#[command(name = "vcs", about = "headless Atari 2600 emulator")]
struct Args {
    /// Path to a cartridge image (.a26 / .bin)
    rom: String,

    /// Television standard: "ntsc" or "pal"
    #[arg(long, default_value = "ntsc")]
    spec: String,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// Apply a patch file before running
    #[arg(long)]
    patch: Option<String>,

    /// Dump final machine state to this file as JSON
    #[arg(long)]
    save: Option<String>,

    /// Print a digest line for every frame instead of just the last
    #[arg(long, default_value_t = false)]
    verbose: bool,

    /// Core log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log: String,
}

/// FNV-1a over the frame pixels; stable across runs, cheap to compute.
fn frame_digest(pixels: &[u32]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for px in pixels {
        for byte in px.to_le_bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
        }
    }
    hash
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if let Some(level) = LogLevel::from_str(&args.log) {
        LogConfig::global().set_global_level(level);
    }

    let spec = match args.spec.to_lowercase().as_str() {
        "pal" => Specification::Pal,
        _ => Specification::Ntsc,
    };

    let rom = fs::read(&args.rom).with_context(|| format!("reading {}", args.rom))?;
    let mut vcs = Vcs::new(spec);
    vcs.attach_cartridge(rom)
        .with_context(|| format!("attaching {}", args.rom))?;

    if let Some(patch) = &args.patch {
        let applied = vcs
            .apply_patch_file(patch)
            .with_context(|| format!("patching with {}", patch))?;
        if !applied {
            eprintln!("warning: patch {} applied no bytes", patch);
        }
    }

    let mut last_digest = 0u64;
    for frame_num in 1..=args.frames {
        let frame = vcs.run_frame().with_context(|| format!("frame {}", frame_num))?;
        last_digest = frame_digest(&frame.pixels);

        if args.verbose {
            let lit = frame.pixels.iter().filter(|&&p| p != 0xFF00_0000).count();
            println!(
                "frame {:4}  {}x{}  digest {:016x}  lit {}",
                frame_num, frame.width, frame.height, last_digest, lit
            );
        }
    }

    println!(
        "{} frames, {} cycles, final digest {:016x}",
        args.frames,
        vcs.cycles(),
        last_digest
    );

    if let Some(path) = &args.save {
        let state = vcs.save_state();
        let mut f = File::create(path).with_context(|| format!("creating {}", path))?;
        write!(f, "{}", serde_json::to_string_pretty(&state)?)?;
        println!("state written to {}", path);
    }

    Ok(())
}
