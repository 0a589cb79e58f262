//! Explicit parameters for parsers, extractors and ring builders.

use crate::{
    classifier::PredictionClass,
    error::{BrickError, Result},
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_RING_COLOR: &str = "#d3d3d3";
pub const DEFAULT_RING_HEIGHT: u32 = 20;
pub const DEFAULT_SLICE_SIZE: usize = 10_000;

/// Filters applied to tabular alignment rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlastFilter {
    /// Rows with a lower percent identity are dropped
    pub min_identity: f64,
    /// Rows with a shorter alignment are dropped
    pub min_alignment: u64,
    /// Rows with a larger e-value are dropped
    #[serde(alias = "min_evalue")]
    pub max_evalue: f64,
}

impl Default for BlastFilter {
    fn default() -> Self {
        Self {
            min_identity: 0.0,
            min_alignment: 0,
            max_evalue: 10.0,
        }
    }
}

impl BlastFilter {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.min_identity) {
            return Err(BrickError::configuration(format!(
                "min_identity must be between 0 and 100, found {}",
                self.min_identity
            )));
        }
        if self.max_evalue.is_nan() || self.max_evalue < 0.0 {
            return Err(BrickError::configuration(format!(
                "max_evalue must be non-negative, found {}",
                self.max_evalue
            )));
        }
        Ok(())
    }
}

/// How sliced sequence names encode `{id}{name_separator}{start}{range_separator}{end}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeqNameFormat {
    pub name_separator: String,
    pub range_separator: String,
}

impl Default for SeqNameFormat {
    fn default() -> Self {
        Self {
            name_separator: "__".to_string(),
            range_separator: "..".to_string(),
        }
    }
}

impl SeqNameFormat {
    pub fn encode(&self, sequence_id: &str, start: usize, end: usize) -> String {
        format!(
            "{sequence_id}{}{start}{}{end}",
            self.name_separator, self.range_separator
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierThresholds {
    /// Minimum probability for a window to join a contiguous region
    pub min_window_score: f64,
    /// Minimum mean probability across a region for it to be kept
    pub min_segment_score: f64,
    /// Minimum region length in reference coordinates
    pub min_segment_length: usize,
    pub prediction_classes: Vec<PredictionClass>,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            min_window_score: 0.5,
            min_segment_score: 0.7,
            min_segment_length: 10_000,
            prediction_classes: vec![PredictionClass::Virus, PredictionClass::Plasmid],
        }
    }
}

impl ClassifierThresholds {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("min_window_score", self.min_window_score),
            ("min_segment_score", self.min_segment_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(BrickError::configuration(format!(
                    "{name} must be between 0 and 1, found {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn requests(&self, class: PredictionClass) -> bool {
        self.prediction_classes.contains(&class)
    }
}

/// Presentation attributes applied to a newly built ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingStyle {
    pub color: String,
    pub height: u32,
    pub visible: bool,
    pub title: Option<String>,
}

impl Default for RingStyle {
    fn default() -> Self {
        Self {
            color: DEFAULT_RING_COLOR.to_string(),
            height: DEFAULT_RING_HEIGHT,
            visible: true,
            title: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blast_filter_accepts_legacy_evalue_name() {
        let filter: BlastFilter =
            serde_json::from_str(r#"{"min_identity": 90, "min_evalue": 0.001}"#).unwrap();
        assert_eq!(filter.min_identity, 90.0);
        assert_eq!(filter.max_evalue, 0.001);
        assert_eq!(filter.min_alignment, 0);
    }

    #[test]
    fn test_blast_filter_rejects_out_of_range_identity() {
        let filter = BlastFilter {
            min_identity: 120.0,
            ..Default::default()
        };
        assert!(filter.validate().is_err());
    }

    #[test]
    fn test_classifier_defaults() {
        let thresholds: ClassifierThresholds = serde_json::from_str("{}").unwrap();
        assert_eq!(thresholds, ClassifierThresholds::default());
        assert!(thresholds.requests(PredictionClass::Virus));
        assert!(!thresholds.requests(PredictionClass::Chromosome));
    }

    #[test]
    fn test_seq_name_encoding() {
        assert_eq!(SeqNameFormat::default().encode("chr", 0, 100), "chr__0..100");
    }
}
