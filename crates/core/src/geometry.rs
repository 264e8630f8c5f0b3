//! Geometry primitives shared by the document model and the layout code.
//!
//! Page coordinates use a top-left origin: `xlt`/`ylt` is the left-top
//! corner and `xrb`/`yrb` the right-bottom one, so `ylt <= yrb` for any
//! well-formed box.

use std::collections::HashMap;
use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

pub(crate) type KeyF64 = OrderedFloat<f64>;

pub(crate) fn key_f64(v: f64) -> KeyF64 {
    OrderedFloat(v)
}

/// Axis-aligned rectangle in page coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub xlt: f64,
    pub ylt: f64,
    pub xrb: f64,
    pub yrb: f64,
}

impl BBox {
    pub const fn new(xlt: f64, ylt: f64, xrb: f64, yrb: f64) -> Self {
        Self { xlt, ylt, xrb, yrb }
    }

    pub fn width(&self) -> f64 {
        self.xrb - self.xlt
    }

    pub fn height(&self) -> f64 {
        self.yrb - self.ylt
    }

    pub fn x_mid(&self) -> f64 {
        (self.xlt + self.xrb) / 2.0
    }

    pub fn y_mid(&self) -> f64 {
        (self.ylt + self.yrb) / 2.0
    }

    /// A box with positive area.
    pub fn valid(&self) -> bool {
        self.xrb > self.xlt && self.yrb > self.ylt
    }

    /// Smallest box covering both.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            xlt: self.xlt.min(other.xlt),
            ylt: self.ylt.min(other.ylt),
            xrb: self.xrb.max(other.xrb),
            yrb: self.yrb.max(other.yrb),
        }
    }

    /// Overlap length on the x axis (0 when disjoint).
    pub fn x_overlap(&self, other: &BBox) -> f64 {
        (self.xrb.min(other.xrb) - self.xlt.max(other.xlt)).max(0.0)
    }

    /// Overlap length on the y axis (0 when disjoint).
    pub fn y_overlap(&self, other: &BBox) -> f64 {
        (self.yrb.min(other.yrb) - self.ylt.max(other.ylt)).max(0.0)
    }

    /// True when `x` lies strictly inside the horizontal span.
    pub fn contains_x(&self, x: f64) -> bool {
        x > self.xlt && x < self.xrb
    }

    /// True when `y` lies inside the vertical span (inclusive).
    pub fn contains_y(&self, y: f64) -> bool {
        y >= self.ylt && y <= self.yrb
    }

    pub fn scaled(&self, sx: f64, sy: f64) -> BBox {
        BBox {
            xlt: self.xlt * sx,
            ylt: self.ylt * sy,
            xrb: self.xrb * sx,
            yrb: self.yrb * sy,
        }
    }
}

impl fmt::Display for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.0},{:.0},{:.0},{:.0}]",
            self.xlt, self.ylt, self.xrb, self.yrb
        )
    }
}

/// Compute the covering box of an iterator of boxes.
pub fn bbox_union<'a, I: IntoIterator<Item = &'a BBox>>(boxes: I) -> Option<BBox> {
    boxes.into_iter().fold(None, |acc, b| match acc {
        None => Some(*b),
        Some(a) => Some(a.union(b)),
    })
}

/// Compute the overlap between two bounding boxes.
pub fn bbox_overlap(a: BBox, b: BBox) -> Option<BBox> {
    let o_left = a.xlt.max(b.xlt);
    let o_right = a.xrb.min(b.xrb);
    let o_top = a.ylt.max(b.ylt);
    let o_bottom = a.yrb.min(b.yrb);
    let o_width = o_right - o_left;
    let o_height = o_bottom - o_top;
    if o_height >= 0.0 && o_width >= 0.0 && (o_height + o_width) > 0.0 {
        Some(BBox::new(o_left, o_top, o_right, o_bottom))
    } else {
        None
    }
}

/// Cluster a list of f64 values based on tolerance.
pub fn cluster_list(mut xs: Vec<f64>, tolerance: f64) -> Vec<Vec<f64>> {
    xs.sort_by(|a, b| a.total_cmp(b));
    if tolerance == 0.0 || xs.len() < 2 {
        return xs.into_iter().map(|x| vec![x]).collect();
    }
    let mut groups: Vec<Vec<f64>> = Vec::new();
    let mut current: Vec<f64> = Vec::new();
    let mut last = xs[0];
    current.push(xs[0]);
    for x in xs.into_iter().skip(1) {
        if x <= last + tolerance {
            current.push(x);
        } else {
            groups.push(current);
            current = vec![x];
        }
        last = x;
    }
    groups.push(current);
    groups
}

/// Cluster values and return the mean of every cluster, ascending.
pub fn cluster_means(xs: Vec<f64>, tolerance: f64) -> Vec<f64> {
    cluster_list(xs, tolerance)
        .into_iter()
        .map(|c| c.iter().sum::<f64>() / c.len() as f64)
        .collect()
}

/// Create a mapping from values to their cluster indices.
fn make_cluster_dict(values: Vec<f64>, tolerance: f64) -> HashMap<KeyF64, usize> {
    let mut unique: Vec<f64> = values;
    unique.sort_by(|a, b| a.total_cmp(b));
    unique.dedup();
    let clusters = cluster_list(unique, tolerance);
    let mut dict = HashMap::new();
    for (i, cluster) in clusters.into_iter().enumerate() {
        for val in cluster {
            dict.insert(key_f64(val), i);
        }
    }
    dict
}

/// Cluster objects based on a key function and tolerance.
///
/// Groups come back ordered by key; members keep their input order.
pub fn cluster_objects<T: Clone, F: Fn(&T) -> f64>(
    xs: &[T],
    key_fn: F,
    tolerance: f64,
) -> Vec<Vec<T>> {
    let values: Vec<f64> = xs.iter().map(&key_fn).collect();
    let cluster_dict = make_cluster_dict(values, tolerance);

    let mut tuples: Vec<(T, usize)> = xs
        .iter()
        .map(|x| {
            (
                x.clone(),
                *cluster_dict.get(&key_f64(key_fn(x))).unwrap_or(&0),
            )
        })
        .collect();
    tuples.sort_by_key(|t| t.1);

    let mut groups: Vec<Vec<T>> = Vec::new();
    let mut current: Vec<T> = Vec::new();
    let mut last_idx: Option<usize> = None;
    for (item, idx) in tuples {
        if last_idx.is_none_or(|last| last == idx) {
            current.push(item);
        } else {
            groups.push(std::mem::take(&mut current));
            current.push(item);
        }
        last_idx = Some(idx);
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}
