//! Replays recorded tracker output through the pipeline.
//!
//! The input holds one JSON object per frame:
//!
//! ```text
//! {"ts": 0.033, "detections": [{"id": 1, "ltrb": [10, 20, 50, 120]}], "lost": [4]}
//! ```
//!
//! `ts` defaults to `frame_index / fps`, `lost` to an empty list. Frames are
//! replayed as blank images, so clips only carry timing.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use clap::Parser;
use serde_derive::Deserialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use qwatch::{Config, Detection, Frame, Pipeline, StopToken, TrackId};

#[derive(Parser, Debug)]
#[command(name = "qwatch-replay", version, about = "Replay tracker output", long_about = None)]
struct Args {
    /// JSON-lines file with one tracker result per frame.
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// YAML configuration; defaults are used when absent.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 640)]
    width: u32,

    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Stop after this many frames.
    #[arg(long)]
    limit: Option<u64>,
}

#[derive(Deserialize, Debug)]
struct FrameRecord {
    ts: Option<f64>,
    #[serde(default)]
    detections: Vec<Detection>,
    #[serde(default)]
    lost: Vec<TrackId>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("qwatch=info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    if let Err(err) = run(args) {
        error!("{}", err);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match args.config.as_deref() {
        Some(path) => {
            info!("loading configuration from {}", path.display());
            Config::load(path)?
        }
        None => Config::default(),
    };

    let fps = config.frame_rate;
    let dims = (args.width, args.height);
    let mut pipeline = Pipeline::from_config(config)?;

    let stop = StopToken::new();
    let limit = args.limit;
    let limiter = stop.clone();

    let reader = BufReader::new(File::open(&args.input)?);
    let frames = reader
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!("read failed at line {}: {}", idx + 1, err);
                    return None;
                }
            };

            if line.trim().is_empty() {
                return None;
            }

            match serde_json::from_str::<FrameRecord>(&line) {
                Ok(rec) => Some((idx, rec)),
                Err(err) => {
                    warn!("skipping line {}: {}", idx + 1, err);
                    None
                }
            }
        })
        .enumerate()
        .map(move |(n, (idx, rec))| {
            if limit.map_or(false, |l| n as u64 >= l) {
                limiter.stop();
            }

            let ts = rec.ts.unwrap_or(idx as f64 / fps);
            Frame::blank(ts, dims, rec.detections).with_lost(rec.lost)
        });

    let ticks = pipeline.run(frames, &stop);

    println!("ticks: {}", ticks);
    println!("stats: {}", serde_json::to_string(&pipeline.snapshot())?);

    for entry in pipeline.audit_entries() {
        println!("{}", entry.to_line());
    }

    for name in pipeline.clip_files()? {
        println!("clip: {}", name);
    }

    Ok(())
}
