//! Galileo CLI: replay bars through the engine and validate config files.
//!
//! Commands:
//! - `analyze`: compute every bar of a CSV file and print one JSON line per computed bar
//! - `check-config`: validate a TOML config and print the effective values

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use galileo_core::domain::{Bar, Instrument};
use galileo_core::engine::{ComputeOutcome, Engine};
use galileo_core::EngineConfig;
use serde::Deserialize;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "galileo",
    about = "Galileo CLI: physics-model trading decision engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a bar file through the engine and print per-bar decisions as JSON lines.
    Analyze {
        /// CSV with columns open_time, open, high, low, close.
        #[arg(long)]
        bars: PathBuf,

        /// Path to a TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the master seed of the noise stream.
        #[arg(long)]
        seed: Option<u64>,

        /// Instrument symbol.
        #[arg(long, default_value = "EURUSD")]
        symbol: String,

        /// Smallest price increment.
        #[arg(long, default_value_t = 0.00001)]
        tick_size: f64,

        /// Pip size for distance parameters.
        #[arg(long, default_value_t = 0.0001)]
        pip_size: f64,
    },
    /// Validate a TOML config file and print the effective configuration.
    CheckConfig {
        /// Path to the TOML config file.
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            bars,
            config,
            seed,
            symbol,
            tick_size,
            pip_size,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(seed) = seed {
                config.general.seed = seed;
            }
            let instrument = Instrument::new(symbol, tick_size, pip_size, tick_size)
                .context("invalid instrument")?;
            let bars = load_bars(&bars)?;
            let mut engine = Engine::new(config, instrument)?;

            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            let lines = analyze_bars(&mut engine, &bars, &mut out)?;
            out.flush()?;
            info!(bars = bars.len(), lines, "analysis complete");
        }
        Commands::CheckConfig { path } => {
            let config = EngineConfig::from_file(&path)
                .with_context(|| format!("config {}", path.display()))?;
            println!("# {} OK", path.display());
            println!("# fingerprint {}", config.fingerprint());
            println!("# warmup {} bars", config.warmup_bars());
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            EngineConfig::from_file(path).with_context(|| format!("config {}", path.display()))
        }
        None => Ok(EngineConfig::default()),
    }
}

/// One CSV row before timestamp parsing.
#[derive(Debug, Deserialize)]
struct CsvBar {
    open_time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

const TIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y.%m.%d %H:%M"];

fn parse_time(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    for fmt in TIME_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(t);
        }
    }
    bail!("unrecognized timestamp '{s}'")
}

/// Read bars oldest first. Rows must be strictly increasing in time.
fn load_bars(path: &Path) -> Result<Vec<Bar>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("open bar file {}", path.display()))?;
    let mut bars: Vec<Bar> = Vec::new();
    for (row, record) in reader.deserialize::<CsvBar>().enumerate() {
        let raw = record.with_context(|| format!("row {}", row + 1))?;
        let bar = Bar {
            open_time: parse_time(&raw.open_time).with_context(|| format!("row {}", row + 1))?,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
        };
        if let Some(prev) = bars.last() {
            if bar.open_time <= prev.open_time {
                bail!("row {}: open_time {} not after {}", row + 1, bar.open_time, prev.open_time);
            }
        }
        if !bar.is_sane() {
            warn!(row = row + 1, time = %bar.open_time, "bar fails OHLC sanity check");
        }
        bars.push(bar);
    }
    if bars.is_empty() {
        bail!("no bars in {}", path.display());
    }
    debug!(count = bars.len(), "bars loaded");
    Ok(bars)
}

/// Feed every bar prefix to `Engine::analyze`; write one line per computed bar.
fn analyze_bars(engine: &mut Engine, bars: &[Bar], out: &mut impl Write) -> Result<usize> {
    let plan = engine.indicator_plan();
    let values = plan.precompute(bars);
    let full = plan.view(bars, &values)?;
    let mut lines = 0;

    for end in 1..=bars.len() {
        let view = galileo_core::MarketView::new(
            &full.bars[..end],
            &full.atr[..end],
            &full.ema[..end],
            &full.engine_atr[..end],
        )?;
        let Some(report) = engine.analyze(&view) else {
            continue;
        };
        match &report.compute {
            ComputeOutcome::Computed => {
                serde_json::to_writer(&mut *out, &report)?;
                out.write_all(b"\n")?;
                lines += 1;
            }
            ComputeOutcome::Cached => {}
            ComputeOutcome::Failed(e) => debug!(bar = end - 1, error = %e, "bar not computed"),
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_csv(rows: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "open_time,open,high,low,close").unwrap();
        for i in 0..rows {
            let close = 1.1 + 0.0005 * ((i as f64) * 0.2).sin();
            let minutes = 5 * i;
            writeln!(
                file,
                "2024-01-02 {:02}:{:02}:00,{close:.5},{:.5},{:.5},{close:.5}",
                minutes / 60,
                minutes % 60,
                close + 0.0003,
                close - 0.0003
            )
            .unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn parses_supported_timestamps() {
        assert!(parse_time("2024-01-02 10:05:00").is_ok());
        assert!(parse_time("2024-01-02T10:05:00").is_ok());
        assert!(parse_time("2024.01.02 10:05").is_ok());
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn loads_bars_in_order() {
        let file = write_csv(10);
        let bars = load_bars(file.path()).unwrap();
        assert_eq!(bars.len(), 10);
        assert!(bars.windows(2).all(|w| w[0].open_time < w[1].open_time));
    }

    #[test]
    fn rejects_out_of_order_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "open_time,open,high,low,close").unwrap();
        writeln!(file, "2024-01-02 10:05:00,1.1,1.1002,1.0998,1.1").unwrap();
        writeln!(file, "2024-01-02 10:00:00,1.1,1.1002,1.0998,1.1").unwrap();
        file.flush().unwrap();
        let err = load_bars(file.path()).unwrap_err();
        assert!(err.to_string().contains("not after"), "{err}");
    }

    #[test]
    fn analyze_emits_one_line_per_computed_bar() {
        let file = write_csv(120);
        let bars = load_bars(file.path()).unwrap();
        let mut config = EngineConfig::default();
        config.general.ema_period = 20;
        let warmup = config.warmup_bars();
        let mut engine = Engine::new(config, Instrument::fx_major("EURUSD")).unwrap();

        let mut out = Vec::new();
        let lines = analyze_bars(&mut engine, &bars, &mut out).unwrap();
        assert_eq!(lines, 120 - warmup + 1);

        let text = String::from_utf8(out).unwrap();
        let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first["bar_index"], warmup - 1);
        assert_eq!(first["compute"], "Computed");
        assert!(first["state"]["x"].is_number());
    }

    #[test]
    fn check_config_round_trips_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[physics]\nsub_steps = 2\n\n[risk]\ncooldown_bars = 3").unwrap();
        file.flush().unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.physics.sub_steps, 2);
        assert_eq!(config.risk.cooldown_bars, 3);
        assert!(EngineConfig::from_toml(&config.to_toml().unwrap()).is_ok());
    }
}
