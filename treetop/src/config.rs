//! Run configuration.
//!
//! A `PipelineConfig` is built once per run from JSON or from untyped text
//! parameters and handed explicitly to the workflow tools.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TreeTopError};
use crate::geometric::grid_filter::{FocalStatistic, Window};
use crate::geometric::tree_detector::{DetectorParams, METERS_TO_FEET};
use crate::geometric::zonal::{HeightBand, ZonalAggregator};

/// Statistic used by the optional smoothing pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmoothStatistic {
    #[default]
    Percentile,
    Mean,
}

fn default_unit_factor() -> f64 {
    METERS_TO_FEET
}

fn default_smooth_window() -> [usize; 2] {
    [3, 3]
}

fn default_smooth_percentile() -> f64 {
    90.0
}

fn default_local_max_window() -> [usize; 2] {
    [5, 5]
}

/// Parameters of one detection and summary run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub smooth: bool,
    #[serde(default)]
    pub convert_meters_to_feet: bool,
    pub min_tree_height_ft: f64,
    pub regen_min: f64,
    #[serde(default)]
    pub regen_max: Option<f64>,
    pub ct_min: f64,
    #[serde(default)]
    pub ct_max: Option<f64>,
    #[serde(default = "default_unit_factor")]
    pub unit_factor: f64,
    /// [width, height] in cells
    #[serde(default = "default_smooth_window")]
    pub smooth_window: [usize; 2],
    #[serde(default = "default_smooth_percentile")]
    pub smooth_percentile: f64,
    #[serde(default)]
    pub smooth_statistic: SmoothStatistic,
    /// Keep smoothed heights inside the boundary only
    #[serde(default)]
    pub clip_smoothed: bool,
    #[serde(default = "default_local_max_window")]
    pub local_max_window: [usize; 2],
}

impl PipelineConfig {
    /// Config with the required values and every extended key at its default
    pub fn new(min_tree_height_ft: f64, regen: HeightBand, ct: HeightBand) -> Self {
        PipelineConfig {
            smooth: false,
            convert_meters_to_feet: false,
            min_tree_height_ft,
            regen_min: regen.min,
            regen_max: regen.max,
            ct_min: ct.min,
            ct_max: ct.max,
            unit_factor: default_unit_factor(),
            smooth_window: default_smooth_window(),
            smooth_percentile: default_smooth_percentile(),
            smooth_statistic: SmoothStatistic::default(),
            clip_smoothed: false,
            local_max_window: default_local_max_window(),
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(text)
            .map_err(|e| TreeTopError::Configuration(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Build from untyped text parameters keyed by their camelCase names.
    ///
    /// Booleans accept `true`/`false` in any case, an empty value is false.
    /// Optional maxima accept an empty value as absent. Unknown keys and
    /// unparseable values are configuration errors.
    pub fn from_text_params<'a, I>(params: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut params: HashMap<&str, &str> = params
            .into_iter()
            .map(|(k, v)| (k.trim(), v.trim()))
            .collect();

        let mut config = PipelineConfig::new(
            parse_number(required(&mut params, "minTreeHeightFt")?, "minTreeHeightFt")?,
            HeightBand {
                min: parse_number(required(&mut params, "regenMin")?, "regenMin")?,
                max: optional_number(params.remove("regenMax"), "regenMax")?,
            },
            HeightBand {
                min: parse_number(required(&mut params, "ctMin")?, "ctMin")?,
                max: optional_number(params.remove("ctMax"), "ctMax")?,
            },
        );

        if let Some(v) = params.remove("smooth") {
            config.smooth = parse_bool(v, "smooth")?;
        }
        if let Some(v) = params.remove("clipSmoothed") {
            config.clip_smoothed = parse_bool(v, "clipSmoothed")?;
        }
        if let Some(v) = params.remove("convertMetersToFeet") {
            config.convert_meters_to_feet = parse_bool(v, "convertMetersToFeet")?;
        }
        if let Some(v) = params.remove("unitFactor") {
            config.unit_factor = parse_number(v, "unitFactor")?;
        }
        if let Some(v) = params.remove("smoothPercentile") {
            config.smooth_percentile = parse_number(v, "smoothPercentile")?;
        }
        if let Some(v) = params.remove("smoothStatistic") {
            config.smooth_statistic = match v.to_ascii_lowercase().as_str() {
                "percentile" => SmoothStatistic::Percentile,
                "mean" => SmoothStatistic::Mean,
                _ => return Err(unparseable("smoothStatistic", v)),
            };
        }
        if let Some(v) = params.remove("smoothWindow") {
            config.smooth_window = parse_window(v, "smoothWindow")?;
        }
        if let Some(v) = params.remove("localMaxWindow") {
            config.local_max_window = parse_window(v, "localMaxWindow")?;
        }

        if let Some(key) = params.keys().next() {
            return Err(TreeTopError::Configuration(format!(
                "unknown parameter {}",
                key
            )));
        }

        config.validate()?;
        Ok(config)
    }

    /// Check every value; the first problem is reported
    pub fn validate(&self) -> Result<()> {
        self.detector_params()?;
        self.aggregator()?;
        Ok(())
    }

    /// Detection parameters for this run
    pub fn detector_params(&self) -> Result<DetectorParams> {
        let smooth_statistic = match self.smooth_statistic {
            SmoothStatistic::Percentile => FocalStatistic::Percentile(self.smooth_percentile),
            SmoothStatistic::Mean => FocalStatistic::Mean,
        };
        let params = DetectorParams {
            smooth: self.smooth,
            smooth_window: Window::new(self.smooth_window[0], self.smooth_window[1])?,
            smooth_statistic,
            clip_smoothed: self.clip_smoothed,
            convert_units: self.convert_meters_to_feet,
            unit_factor: self.unit_factor,
            min_height: self.min_tree_height_ft,
            local_max_window: Window::new(self.local_max_window[0], self.local_max_window[1])?,
            local_max_statistic: FocalStatistic::Maximum,
        };
        // percentile is checked even when smoothing is off
        if !(0.0..=100.0).contains(&self.smooth_percentile) {
            return Err(TreeTopError::InvalidParameter {
                name: "smoothPercentile",
                value: self.smooth_percentile.to_string(),
                reason: "must be between 0 and 100".to_string(),
            });
        }
        params.validate()?;
        Ok(params)
    }

    pub fn regen_band(&self) -> HeightBand {
        HeightBand {
            min: self.regen_min,
            max: self.regen_max,
        }
    }

    pub fn ct_band(&self) -> HeightBand {
        HeightBand {
            min: self.ct_min,
            max: self.ct_max,
        }
    }

    /// Stand aggregator for the configured bands
    pub fn aggregator(&self) -> Result<ZonalAggregator> {
        ZonalAggregator::new(self.regen_band(), self.ct_band())
    }
}

fn unparseable(name: &str, value: &str) -> TreeTopError {
    TreeTopError::Configuration(format!("cannot parse {} from {:?}", name, value))
}

fn required<'a>(params: &mut HashMap<&str, &'a str>, name: &str) -> Result<&'a str> {
    match params.remove(name) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(TreeTopError::Configuration(format!(
            "missing required parameter {}",
            name
        ))),
    }
}

fn parse_number(value: &str, name: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| unparseable(name, value))
}

fn optional_number(value: Option<&str>, name: &str) -> Result<Option<f64>> {
    match value {
        None | Some("") => Ok(None),
        Some(v) => parse_number(v, name).map(Some),
    }
}

fn parse_bool(value: &str, name: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" | "" => Ok(false),
        _ => Err(unparseable(name, value)),
    }
}

/// `"5"` for a square window or `"5x3"` / `"5 3"` for width and height
fn parse_window(value: &str, name: &str) -> Result<[usize; 2]> {
    let parts: Vec<&str> = value
        .split(|c: char| c == 'x' || c == 'X' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect();
    let sizes = parts
        .iter()
        .map(|s| s.parse::<usize>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| unparseable(name, value))?;
    match sizes.as_slice() {
        [n] => Ok([*n, *n]),
        [w, h] => Ok([*w, *h]),
        _ => Err(unparseable(name, value)),
    }
}
