//! Report parser parameters.
//!
//! Contains ReportParams for controlling column detection and row parsing.

use std::str::FromStr;

use crate::document::DocConfig;

/// Minimal number of column bands a billing table must have.
pub const MIN_COLS: usize = 3;

/// Parameters for column detection and line-item parsing.
///
/// Lengths given as factors are relative to the page's mean line or word
/// height (see [`crate::document::PageStatistics`]).
#[derive(Debug, Clone, PartialEq)]
pub struct ReportParams {
    /// Detection yields no columns below this many bands.
    pub min_cols: usize,

    /// Ruling positions closer than this are snapped together.
    pub snap_tolerance: f64,

    /// Collinear ruling segments closer than this are joined when the
    /// gridline allows joining.
    pub join_tolerance: f64,

    /// A vertical ruling must be at least this many line heights long.
    pub min_ruling_len_factor: f64,

    /// Text-based detection needs this many aligned words per column.
    pub min_words_vertical: usize,

    /// A band narrower than this many word heights is a collapsed ruling.
    pub min_band_width_factor: f64,

    /// Largest gap, in line heights, between a wrapped line and the line
    /// it continues.
    pub continuation_gap_factor: f64,

    /// Largest distance, in row spacings, over which the grid is extended.
    pub extend_gap_factor: f64,

    /// A column type is only assigned with at least this score.
    pub min_type_score: f64,

    /// A word straddles a boundary when both sides hold this share of it.
    pub straddle_ratio: f64,

    /// Save a checkpoint after each completed step.
    pub checkpoint_each_step: bool,

    /// Year for dates printed without one, when the page gives no hint.
    pub default_year: Option<i32>,
}

impl Default for ReportParams {
    fn default() -> Self {
        Self {
            min_cols: MIN_COLS,
            snap_tolerance: 3.0,
            join_tolerance: 3.0,
            min_ruling_len_factor: 3.0,
            min_words_vertical: 3,
            min_band_width_factor: 0.8,
            continuation_gap_factor: 1.6,
            extend_gap_factor: 1.5,
            min_type_score: 0.3,
            straddle_ratio: 0.3,
            checkpoint_each_step: false,
            default_year: None,
        }
    }
}

impl ReportParams {
    /// Defaults overlaid with `ib.*` keys from a document configuration.
    ///
    /// Values that fail to parse are ignored.
    pub fn from_config(config: &DocConfig) -> Self {
        let mut params = Self::default();
        set_from(config, "ib.min_cols", &mut params.min_cols);
        if params.min_cols == 0 {
            tracing::warn!("ib.min_cols must be at least 1");
            params.min_cols = 1;
        }
        set_from(config, "ib.snap_tolerance", &mut params.snap_tolerance);
        set_from(config, "ib.join_tolerance", &mut params.join_tolerance);
        set_from(
            config,
            "ib.min_ruling_len_factor",
            &mut params.min_ruling_len_factor,
        );
        set_from(config, "ib.min_words_vertical", &mut params.min_words_vertical);
        set_from(
            config,
            "ib.min_band_width_factor",
            &mut params.min_band_width_factor,
        );
        set_from(
            config,
            "ib.continuation_gap",
            &mut params.continuation_gap_factor,
        );
        set_from(config, "ib.extend_gap", &mut params.extend_gap_factor);
        set_from(config, "ib.min_type_score", &mut params.min_type_score);
        set_from(config, "ib.straddle_ratio", &mut params.straddle_ratio);
        set_from(
            config,
            "ib.checkpoint_each_step",
            &mut params.checkpoint_each_step,
        );
        let mut year = 0i32;
        set_from(config, "ib.year", &mut year);
        if year > 0 {
            params.default_year = Some(year);
        }
        params
    }
}

fn set_from<T: FromStr>(config: &DocConfig, key: &str, slot: &mut T) {
    let Some(raw) = config.get(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring malformed config value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_overrides_defaults() {
        let mut config = DocConfig::new();
        config.insert("ib.min_cols".into(), "4".into());
        config.insert("ib.continuation_gap".into(), "2.5".into());
        config.insert("ib.snap_tolerance".into(), "wide".into());
        config.insert("ib.checkpoint_each_step".into(), "true".into());
        config.insert("ib.year".into(), "2021".into());
        let params = ReportParams::from_config(&config);
        assert_eq!(params.min_cols, 4);
        assert_eq!(params.continuation_gap_factor, 2.5);
        assert_eq!(params.snap_tolerance, 3.0);
        assert!(params.checkpoint_each_step);
        assert_eq!(params.default_year, Some(2021));
        assert_eq!(ReportParams::default().default_year, None);
    }

    #[test]
    fn zero_min_cols_is_raised_to_one() {
        let mut config = DocConfig::new();
        config.insert("ib.min_cols".into(), "0".into());
        assert_eq!(ReportParams::from_config(&config).min_cols, 1);
    }
}
