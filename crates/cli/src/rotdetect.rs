//! rotdetect - Detect the cardinal rotation and skew of page images
//!
//! Runs the heuristic rotation cascade on each image and prints one JSON
//! line per image. With `--output-dir` the upright image is written too.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use ibextract_core::raster::Raster;
use ibextract_core::rotation::{Rotation, RotationDetector, RotationOutcome, RotationParams};
use rayon::prelude::*;
use serde::Serialize;

/// Detect the rotation and skew of page images.
#[derive(Parser, Debug)]
#[command(name = "rotdetect")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// One or more page images
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Long side, in pixels, of the raster the heuristics look at
    #[arg(long = "reference-long-side")]
    reference_long_side: Option<u32>,

    /// Rotate each image clockwise by this many degrees before detection
    #[arg(short = 'R', long, default_value = "0")]
    rotation: i32,

    /// Directory receiving the upright images
    #[arg(short = 'O', long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// Use debug logging level
    #[arg(short = 'd', long, action = ArgAction::SetTrue)]
    debug: bool,
}

#[derive(Serialize)]
struct FileOut<'a> {
    file: &'a Path,
    #[serde(flatten)]
    outcome: RotationOutcome,
}

fn init_logging(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();
}

fn process_file(
    path: &Path,
    detector: &RotationDetector,
    pre: Rotation,
    output_dir: Option<&Path>,
) -> Result<RotationOutcome> {
    let img = Raster::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let img = if pre == Rotation::Deg0 {
        img
    } else {
        img.rotated(pre)
    };
    let outcome = detector.detect(&img);
    if let Some(dir) = output_dir {
        let upright = match outcome.angle {
            Some(r) if r != Rotation::Deg0 => img.rotated(r),
            _ => img,
        };
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "page".to_string());
        let out = dir.join(format!("{name}.png"));
        upright
            .pixels()
            .save(&out)
            .with_context(|| format!("failed to write {}", out.display()))?;
    }
    Ok(outcome)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let Some(pre) = Rotation::from_degrees(args.rotation) else {
        bail!("rotation must be a multiple of 90, got {}", args.rotation);
    };
    let mut params = RotationParams::default();
    if let Some(side) = args.reference_long_side {
        params.reference_long_side = side;
    }
    let detector = RotationDetector::with_defaults(&params, None, None);
    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let outcomes: Vec<RotationOutcome> = args
        .files
        .par_iter()
        .map(|f| process_file(f, &detector, pre, args.output_dir.as_deref()))
        .collect::<Result<_>>()?;

    let mut out = BufWriter::new(io::stdout());
    for (file, outcome) in args.files.iter().zip(outcomes) {
        serde_json::to_writer(
            &mut out,
            &FileOut {
                file,
                outcome,
            },
        )?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse() {
        let args = Args::try_parse_from(["rotdetect", "a.png", "b.png", "-R", "180"]).unwrap();
        assert_eq!(args.files.len(), 2);
        assert_eq!(Rotation::from_degrees(args.rotation), Some(Rotation::Deg180));
        assert!(args.output_dir.is_none());
    }
}
