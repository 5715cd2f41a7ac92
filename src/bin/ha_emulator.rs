//! ha_emulator - writes synthetic HA_*.dat acquisition files
//!
//! Usage:
//!   ha_emulator --output HA_test.dat                 # defaults
//!   ha_emulator --output HA_test.dat --pulses 50000  # bigger stream
//!   ha_emulator --output HA_test.dat --with-md5      # write the md5 sibling

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use dpsd_rs::emulator::{generate, EmulatorConfig};

/// Synthetic acquisition-file generator
#[derive(Parser, Debug)]
#[command(name = "ha_emulator", about = "Writes synthetic HA_*.dat files")]
#[command(version)]
struct Args {
    /// Output file path
    #[arg(short, long)]
    output: PathBuf,

    /// Number of pulses
    #[arg(short, long, default_value_t = 1000)]
    pulses: usize,

    /// Samples per window (even)
    #[arg(short, long, default_value_t = 128)]
    window: usize,

    /// Gap between events in 10 ns ticks
    #[arg(long, default_value_t = 1000)]
    tdiff: u32,

    /// Mean physics-pulse amplitude in counts
    #[arg(long, default_value_t = 2000.0)]
    amplitude: f64,

    /// Every k-th pulse is an LED reference pulse (0 disables)
    #[arg(long, default_value_t = 50)]
    led_period: usize,

    /// RNG seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Also write the (empty) md5 sibling the analyzer preflight expects
    #[arg(long)]
    with_md5: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("dpsd_rs=info".parse()?))
        .init();

    let args = Args::parse();
    if args.window % 2 != 0 {
        anyhow::bail!("window length must be even, got {}", args.window);
    }

    let config = EmulatorConfig {
        n_pulses: args.pulses,
        window_len: args.window,
        tdiff_ticks: args.tdiff,
        amplitude_mean: args.amplitude,
        led_period: args.led_period,
        seed: args.seed,
        ..Default::default()
    };

    let builder = generate(&config);
    builder.write(&args.output, args.with_md5)?;

    println!(
        "Wrote {} pulses ({} bytes) to {}",
        args.pulses,
        builder.to_bytes().len(),
        args.output.display()
    );
    Ok(())
}
