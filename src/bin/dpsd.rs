//! dpsd - offline pulse-shape discrimination analyzer
//!
//! Usage:
//!   dpsd analyze <file> [--output results.json]   - Analyze one acquisition file
//!   dpsd analyze --config dpsd.toml               - Analyze the configured shots
//!   dpsd analyze <file> -t 1.0:2.0 -t 3.0:3.5     - Restrict to time ranges
//!   dpsd info <file>                              - Decode-only stream summary
//!   dpsd scan <directory>                         - List HA_*.dat files with status

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dpsd_rs::analyzer::{AnalysisOutput, Analyzer};
use dpsd_rs::config::{Config, InputFile};
use dpsd_rs::decoder::{self, DecoderConfig};
use dpsd_rs::storage::{write_summary, AnalysisSummary};

#[derive(Parser)]
#[command(name = "dpsd")]
#[command(about = "Offline pulse-shape discrimination analyzer")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short = 'f', long = "config", default_value = "dpsd.toml", global = true)]
    config_file: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline
    Analyze {
        /// Acquisition file; omit to use the configured shots
        file: Option<PathBuf>,

        /// Restrict the analysis to a time range "beg:end" (repeatable)
        #[arg(short = 't', long = "t-range", value_parser = parse_range)]
        t_ranges: Vec<(f64, f64)>,

        /// Write the JSON result summary to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode-only summary of one acquisition file
    Info {
        /// Path to the HA_*.dat file
        file: PathBuf,
    },

    /// List acquisition files in a directory
    Scan {
        /// Directory to scan
        directory: PathBuf,

        /// Include subdirectories
        #[arg(short, long)]
        recursive: bool,
    },
}

fn parse_range(arg: &str) -> Result<(f64, f64), String> {
    let (lo, hi) = arg
        .split_once(':')
        .ok_or_else(|| format!("expected beg:end, got '{arg}'"))?;
    let lo: f64 = lo.trim().parse().map_err(|e| format!("bad start: {e}"))?;
    let hi: f64 = hi.trim().parse().map_err(|e| format!("bad end: {e}"))?;
    if hi <= lo {
        return Err(format!("empty range {lo}:{hi}"));
    }
    Ok((lo, hi))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("dpsd_rs=info".parse()?))
        .init();

    let cli = Cli::parse();

    let config = if Path::new(&cli.config_file).exists() {
        info!(config_file = %cli.config_file, "Loaded configuration");
        Config::load(&cli.config_file)?
    } else {
        Config::default()
    };

    match cli.command {
        Commands::Analyze {
            file,
            t_ranges,
            output,
        } => {
            if let Err(e) = analyze(config, file, t_ranges, output) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Info { file } => {
            if let Err(e) = show_info(&config, &file) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Scan {
            directory,
            recursive,
        } => {
            if let Err(e) = scan(&config, &directory, recursive) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn analyze(
    config: Config,
    file: Option<PathBuf>,
    t_ranges: Vec<(f64, f64)>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let inputs: Vec<InputFile> = match file {
        Some(path) => vec![InputFile {
            path,
            shot: None,
            check_md5: config.io.check_md5,
        }],
        None => config.resolve_inputs(),
    };
    if inputs.is_empty() {
        anyhow::bail!("no input file given and no shots configured");
    }

    let ranges = if t_ranges.is_empty() {
        None
    } else {
        Some(t_ranges)
    };
    let analyzer = Analyzer::new(config)?;

    for input in &inputs {
        println!("Analyzing: {}", input.path.display());
        let result = analyzer.run_with(&input.path, input.check_md5, ranges.clone())?;
        print_result(&result);

        if let Some(out) = &output {
            let out_path = match (inputs.len(), input.shot) {
                (1, _) => out.clone(),
                (_, Some(shot)) => with_suffix(out, &format!("_{shot}")),
                (_, None) => with_suffix(out, "_x"),
            };
            let summary = AnalysisSummary::new(
                input.path.display().to_string(),
                input.shot,
                analyzer.config(),
                &result,
            );
            write_summary(&out_path, &summary)?;
            println!("  Results written to {}", out_path.display());
        }
    }
    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let ext = path.extension().map(|e| e.to_string_lossy().to_string());
    let name = match ext {
        Some(ext) => format!("{stem}{suffix}.{ext}"),
        None => format!("{stem}{suffix}"),
    };
    path.with_file_name(name)
}

fn print_result(result: &AnalysisOutput) {
    let d = &result.diagnostics;
    println!();
    println!("=== Classification ===");
    println!("  Neutron:    {:>10}", d.n_neutron);
    println!("  Gamma:      {:>10}", d.n_gamma);
    println!("  LED:        {:>10}", d.n_led);
    println!("  Pile-up:    {:>10}", d.n_pileup);
    println!("  Saturated:  {:>10}", d.n_saturated);
    println!();
    println!("=== Stream ===");
    println!("  Headers:    {:>10}", d.n_headers);
    println!("  Decoded:    {:>10}", d.n_decoded);
    println!("  Selected:   {:>10}", d.n_selected);
    println!("  Repaired:   {:>10}", d.n_repaired);
    println!("  Skipped:    {:>10} odd, {} negative", d.n_skipped_odd, d.n_skipped_neg);
    println!("  Duration:   {:>10.4} s", d.duration);
    println!("  Time bins:  {:>10}", result.time_cnt.len());
    println!("  LED slots:  {:>10}", result.pmgain.len());
}

fn show_info(config: &Config, file: &Path) -> anyhow::Result<()> {
    let decoder_config = DecoderConfig {
        min_winlen: config.peak.baseline_start.max(config.peak.baseline_end),
        max_winlen: Some(config.setup.tof_window_length),
        check_md5: false,
    };
    let ha = decoder::read_ha(file, &decoder_config)?;

    println!("File: {}", file.display());
    println!("Size: {} bytes", std::fs::metadata(file)?.len());
    println!();
    println!("=== Stream ===");
    println!("  Headers:      {}", ha.n_headers);
    println!("  Pulses:       {}", ha.n_pulses());
    println!("  Repaired:     {}", ha.repaired.len());
    println!(
        "  Skipped:      {} odd, {} negative",
        ha.n_skipped_odd, ha.n_skipped_neg
    );
    if let (Some(first), Some(last)) = (ha.t_events.first(), ha.t_events.last()) {
        println!("  Time range:   {:.6} - {:.6} s", first, last);
    }
    let min_len = ha.winlen.iter().min().copied().unwrap_or(0);
    let max_len = ha.winlen.iter().max().copied().unwrap_or(0);
    println!("  Window len:   {} - {} samples", min_len, max_len);

    Ok(())
}

fn scan(config: &Config, directory: &Path, recursive: bool) -> anyhow::Result<()> {
    println!("Scanning: {}", directory.display());
    println!();

    let mut files = Vec::new();
    collect_ha_files(directory, recursive, &mut files)?;
    if files.is_empty() {
        println!("No HA_*.dat files found");
        return Ok(());
    }

    let decoder_config = DecoderConfig {
        min_winlen: config.peak.baseline_start.max(config.peak.baseline_end),
        max_winlen: Some(config.setup.tof_window_length),
        check_md5: false,
    };

    println!(
        "{:<40} {:>10} {:>10} {:>12}",
        "File", "Pulses", "Repaired", "Duration (s)"
    );
    println!("{}", "-".repeat(76));

    for path in &files {
        match decoder::read_ha(path, &decoder_config) {
            Ok(ha) => {
                let duration = match (ha.t_events.first(), ha.t_events.last()) {
                    (Some(f), Some(l)) => l - f,
                    _ => 0.0,
                };
                println!(
                    "{:<40} {:>10} {:>10} {:>12.4}",
                    display_name(path),
                    ha.n_pulses(),
                    ha.repaired.len(),
                    duration
                );
            }
            Err(e) => {
                println!("{:<40} unreadable: {}", display_name(path), e);
            }
        }
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    if name.len() > 38 {
        format!("...{}", &name[name.len() - 35..])
    } else {
        name.to_string()
    }
}

fn collect_ha_files(
    dir: &Path,
    recursive: bool,
    files: &mut Vec<PathBuf>,
) -> Result<(), std::io::Error> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() {
            let name = path.file_name().unwrap_or_default().to_string_lossy().to_string();
            if name.starts_with("HA_") && name.ends_with(".dat") {
                files.push(path);
            }
        } else if recursive && path.is_dir() {
            collect_ha_files(&path, recursive, files)?;
        }
    }
    files.sort();
    Ok(())
}
