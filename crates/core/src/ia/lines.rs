//! Ruling-line extraction from a binary raster.
//!
//! Long ink runs are collected per scan line and runs on neighbouring scan
//! lines that overlap are merged into one ruling segment. Segments thicker
//! than a fraction of the letter height are filled areas, not rulings.

use smallvec::SmallVec;

use super::binarize::binarize_otsu;
use crate::geometry::BBox;
use crate::raster::Raster;

/// Horizontal and vertical ruling lines found on a raster.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinesInfo {
    pub hlines: Vec<BBox>,
    pub vlines: Vec<BBox>,
}

#[derive(Clone, Copy, Debug)]
struct Run {
    outer: u32,
    start: u32,
    end: u32,
}

#[derive(Clone, Copy, Debug)]
struct Segment {
    outer_first: u32,
    outer_last: u32,
    start: u32,
    end: u32,
}

/// Minimal ruling length for a given letter height.
pub fn min_line_length(letter_h: u32) -> u32 {
    (letter_h * 5).max(20)
}

/// Extract ruling lines; non-binary rasters are binarized first.
pub fn extract(img: &Raster, letter_h: u32) -> LinesInfo {
    if !img.is_binary() {
        let binary = binarize_otsu(img);
        return extract_binary(&binary, letter_h);
    }
    extract_binary(img, letter_h)
}

fn extract_binary(img: &Raster, letter_h: u32) -> LinesInfo {
    let min_len = min_line_length(letter_h);
    let max_thickness = (letter_h / 2).max(3);

    let h_runs = scan_runs(img.height(), img.width(), min_len, |outer, inner| {
        img.is_ink(inner, outer)
    });
    let v_runs = scan_runs(img.width(), img.height(), min_len, |outer, inner| {
        img.is_ink(outer, inner)
    });

    let hlines = merge_runs(h_runs)
        .into_iter()
        .filter(|s| s.outer_last - s.outer_first < max_thickness)
        .map(|s| {
            BBox::new(
                s.start as f64,
                s.outer_first as f64,
                s.end as f64,
                (s.outer_last + 1) as f64,
            )
        })
        .collect();
    let vlines = merge_runs(v_runs)
        .into_iter()
        .filter(|s| s.outer_last - s.outer_first < max_thickness)
        .map(|s| {
            BBox::new(
                s.outer_first as f64,
                s.start as f64,
                (s.outer_last + 1) as f64,
                s.end as f64,
            )
        })
        .collect();

    let info = LinesInfo { hlines, vlines };
    tracing::debug!(
        hlines = info.hlines.len(),
        vlines = info.vlines.len(),
        min_len,
        "ruling lines extracted"
    );
    info
}

fn scan_runs<F: Fn(u32, u32) -> bool>(
    outer_len: u32,
    inner_len: u32,
    min_len: u32,
    is_ink: F,
) -> Vec<Run> {
    let mut runs = Vec::new();
    for outer in 0..outer_len {
        let mut start: Option<u32> = None;
        for inner in 0..=inner_len {
            let ink = inner < inner_len && is_ink(outer, inner);
            match (ink, start) {
                (true, None) => start = Some(inner),
                (false, Some(s)) => {
                    if inner - s >= min_len {
                        runs.push(Run {
                            outer,
                            start: s,
                            end: inner,
                        });
                    }
                    start = None;
                }
                _ => {}
            }
        }
    }
    runs
}

fn merge_runs(runs: Vec<Run>) -> Vec<Segment> {
    let mut done: Vec<Segment> = Vec::new();
    let mut active: Vec<Segment> = Vec::new();
    for run in runs {
        let (stale, live): (Vec<Segment>, Vec<Segment>) = active
            .into_iter()
            .partition(|s| s.outer_last + 1 < run.outer);
        done.extend(stale);
        active = live;

        let hits: SmallVec<[usize; 4]> = active
            .iter()
            .enumerate()
            .filter(|(_, s)| s.outer_last < run.outer && s.start < run.end && run.start < s.end)
            .map(|(i, _)| i)
            .collect();
        match hits.first() {
            Some(&i) => {
                let seg = &mut active[i];
                seg.outer_last = run.outer;
                seg.start = seg.start.min(run.start);
                seg.end = seg.end.max(run.end);
            }
            None => active.push(Segment {
                outer_first: run.outer,
                outer_last: run.outer,
                start: run.start,
                end: run.end,
            }),
        }
    }
    done.extend(active);
    done.sort_by_key(|s| (s.outer_first, s.start));
    done
}
