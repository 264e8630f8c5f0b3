//! ib2json - Extract itemized-billing line items as JSON
//!
//! Reads a document of OCR'd pages (JSON), runs the report pipeline on
//! every selected page and writes one JSON object per page.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use ibextract_core::document::Document;
use ibextract_core::forms::{
    CheckpointSink, JsonDirCheckpointStore, LineItem, PAGE_IMAGE_KEY, PipelineStep, Report,
    StepOutcome, TemplateSet,
};
use ibextract_core::geometry::BBox;
use ibextract_core::layout::ColumnType;
use ibextract_core::raster::Raster;
use rayon::prelude::*;
use serde::Serialize;

/// Extract itemized-billing line items from OCR'd pages.
#[derive(Parser, Debug)]
#[command(name = "ib2json")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the document JSON
    document: PathBuf,

    /// Template file; the template matching the document is applied
    #[arg(short = 't', long)]
    template: Option<PathBuf>,

    /// Rendered page image, attached to every selected page
    #[arg(short = 'i', long)]
    image: Option<PathBuf>,

    /// Minimum number of columns a table must have
    #[arg(long = "min-cols")]
    min_cols: Option<usize>,

    /// A space-separated list of page numbers to process (1-indexed)
    #[arg(short = 'p', long = "page-numbers")]
    page_numbers: Option<String>,

    /// Write a checkpoint after every completed step into this directory
    #[arg(long = "checkpoint-dir")]
    checkpoint_dir: Option<PathBuf>,

    /// Path to file where output is written, or "-" for stdout
    #[arg(short = 'o', long, default_value = "-")]
    outfile: String,

    /// Pretty-print the JSON output
    #[arg(long, action = ArgAction::SetTrue)]
    pretty: bool,

    /// Use debug logging level and log every grid row
    #[arg(short = 'd', long, action = ArgAction::SetTrue)]
    debug: bool,
}

#[derive(Serialize)]
struct ColumnOut {
    #[serde(rename = "type")]
    tp: ColumnType,
    bbox: BBox,
    confidence: f64,
    enabled: bool,
}

#[derive(Serialize)]
struct StepOut {
    step: PipelineStep,
    outcome: &'static str,
    count: usize,
}

#[derive(Serialize)]
struct PageOut {
    page: usize,
    template: Option<String>,
    steps: Vec<StepOut>,
    columns: Vec<ColumnOut>,
    orphans: usize,
    items: Vec<LineItem>,
}

/// Parse 1-indexed page numbers into 0-indexed indices.
fn parse_page_numbers(s: &str) -> Result<Vec<usize>> {
    s.split_whitespace()
        .map(|p| {
            let n: usize = p.parse().with_context(|| format!("invalid page number: {p}"))?;
            if n == 0 {
                bail!("page numbers start at 1");
            }
            Ok(n - 1)
        })
        .collect()
}

fn outcome_name(outcome: StepOutcome) -> &'static str {
    match outcome {
        StepOutcome::Skipped => "skipped",
        StepOutcome::NoResult => "no-result",
        StepOutcome::Completed { .. } => "completed",
    }
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

fn process_page(
    doc: &Arc<Document>,
    idx: usize,
    templates: Option<&TemplateSet>,
    sink: Option<&Arc<JsonDirCheckpointStore>>,
    args: &Args,
) -> Result<PageOut> {
    let template = templates.and_then(|t| t.select(doc)).cloned();
    let mut report = Report::for_page(Arc::clone(doc), idx, template)
        .with_context(|| format!("page {}", idx + 1))?;
    let mut params = report.params().clone();
    if let Some(min_cols) = args.min_cols {
        params.min_cols = min_cols;
    }
    params.checkpoint_each_step |= sink.is_some();
    report = report.with_params(params);
    if let Some(sink) = sink {
        report = report.with_checkpoint_sink(Arc::clone(sink) as Arc<dyn CheckpointSink>);
    }
    report.set_text_debug(args.debug);

    let steps = report
        .run()
        .into_iter()
        .map(|(step, outcome)| StepOut {
            step,
            outcome: outcome_name(outcome),
            count: outcome.count(),
        })
        .collect();
    let columns = report
        .columns()
        .iter()
        .map(|c| ColumnOut {
            tp: c.tp(),
            bbox: c.bbox(),
            confidence: c.confidence(),
            enabled: c.enabled(),
        })
        .collect();
    Ok(PageOut {
        page: idx + 1,
        template: report.template().map(|t| t.id().to_string()),
        steps,
        columns,
        orphans: report.orphans().len(),
        items: report.items().to_vec(),
    })
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let mut doc = Document::from_path(&args.document)
        .with_context(|| format!("failed to load {}", args.document.display()))?;

    let pages: Vec<usize> = match &args.page_numbers {
        Some(s) => parse_page_numbers(s)?,
        None => (0..doc.pages.len()).collect(),
    };
    if let Some(&bad) = pages.iter().find(|&&p| p >= doc.pages.len()) {
        bail!(
            "page {} out of range, document has {} pages",
            bad + 1,
            doc.pages.len()
        );
    }

    if let Some(path) = &args.image {
        let img = Arc::new(
            Raster::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        );
        for &p in &pages {
            doc.pages[p].set_image(PAGE_IMAGE_KEY, Arc::clone(&img));
        }
    }

    let templates = args
        .template
        .as_ref()
        .map(|p| {
            TemplateSet::from_path(p).with_context(|| format!("failed to load {}", p.display()))
        })
        .transpose()?;

    let sink = match &args.checkpoint_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            Some(Arc::new(JsonDirCheckpointStore::new(dir)))
        }
        None => None,
    };

    let doc = Arc::new(doc);
    let results: Vec<PageOut> = pages
        .par_iter()
        .map(|&idx| process_page(&doc, idx, templates.as_ref(), sink.as_ref(), &args))
        .collect::<Result<_>>()?;

    let mut output: Box<dyn Write> = if args.outfile == "-" {
        Box::new(BufWriter::new(io::stdout()))
    } else {
        let file = File::create(&args.outfile)
            .with_context(|| format!("failed to create output file {}", args.outfile))?;
        Box::new(BufWriter::new(file))
    };
    if args.pretty {
        serde_json::to_writer_pretty(&mut output, &results)?;
    } else {
        serde_json::to_writer(&mut output, &results)?;
    }
    writeln!(output)?;
    output.flush()?;
    Ok(())
}
