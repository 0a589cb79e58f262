//! Merges runs of high-scoring classifier windows into one region per
//! prediction class.

use crate::{
    classifier::{ClassifierEntry, PredictionClass},
    config::ClassifierThresholds,
    error::{BrickError, Result},
    segment::{LabelSegment, PlainSegment, Segment, SegmentKind},
};
use itertools::Itertools;
use log::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct ContiguousRegion {
    pub class: PredictionClass,
    pub sequence_id: String,
    pub start: usize,
    pub end: usize,
    pub probabilities: Vec<f64>,
}

impl ContiguousRegion {
    fn open(class: PredictionClass, entry: &ClassifierEntry, probability: f64) -> Self {
        Self {
            class,
            sequence_id: entry.sequence_id.clone(),
            start: entry.start,
            end: entry.end,
            probabilities: vec![probability],
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mean_probability(&self) -> f64 {
        if self.probabilities.is_empty() {
            return 0.0;
        }
        self.probabilities.iter().sum::<f64>() / self.probabilities.len() as f64
    }

    pub fn label(&self) -> String {
        format!(
            "{} ({:.2})",
            self.class.display_name(),
            self.mean_probability()
        )
    }

    fn is_kept(&self, thresholds: &ClassifierThresholds) -> bool {
        thresholds.requests(self.class)
            && self.len() >= thresholds.min_segment_length
            && self.mean_probability() >= thresholds.min_segment_score
    }

    pub fn to_segment(&self, kind: SegmentKind) -> Result<Segment> {
        match kind {
            SegmentKind::Segment => {
                Ok(PlainSegment::new(self.start, self.end, self.label())?.into())
            }
            SegmentKind::Label => {
                Ok(LabelSegment::new(self.start, self.end, self.label())?.into())
            }
            SegmentKind::Classifier => Err(BrickError::configuration(
                "Contiguous regions are produced as plain or label segments only",
            )),
        }
    }
}

/// Every run of windows whose `class` probability reaches `min_window_score`,
/// before any length or mean-score test. A window below the threshold, or a
/// window on another sequence, ends the open run.
pub fn candidate_regions(
    entries: &[ClassifierEntry],
    class: PredictionClass,
    min_window_score: f64,
) -> Vec<ContiguousRegion> {
    let mut regions = vec![];
    let mut current: Option<ContiguousRegion> = None;
    for entry in entries {
        let probability = entry.score(class);
        if probability < min_window_score {
            if let Some(region) = current.take() {
                regions.push(region);
            }
            continue;
        }
        match current.as_mut() {
            Some(region) if region.sequence_id == entry.sequence_id => {
                region.end = entry.end;
                region.probabilities.push(probability);
            }
            _ => {
                let opened = ContiguousRegion::open(class, entry, probability);
                if let Some(region) = current.replace(opened) {
                    regions.push(region);
                }
            }
        }
    }
    if let Some(region) = current {
        regions.push(region);
    }
    regions
}

/// Regions of every requested class that pass the length and mean-score
/// thresholds, ordered by start (stable on ties, classes in column order).
pub fn extract_regions(
    entries: &[ClassifierEntry],
    thresholds: &ClassifierThresholds,
) -> Vec<ContiguousRegion> {
    let regions: Vec<ContiguousRegion> = PredictionClass::ALL
        .iter()
        .flat_map(|class| candidate_regions(entries, *class, thresholds.min_window_score))
        .filter(|region| region.is_kept(thresholds))
        .sorted_by_key(|region| region.start)
        .collect();
    debug!(
        "Kept {} contiguous regions from {} windows",
        regions.len(),
        entries.len()
    );
    regions
}

pub fn extract_contiguous_segments(
    entries: &[ClassifierEntry],
    thresholds: &ClassifierThresholds,
    kind: SegmentKind,
) -> Result<Vec<Segment>> {
    extract_regions(entries, thresholds)
        .iter()
        .map(|region| region.to_segment(kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(start: usize, end: usize, scores: (f64, f64, f64)) -> ClassifierEntry {
        ClassifierEntry {
            sequence_id: "chr".to_string(),
            start,
            end,
            chromosome_score: scores.0,
            plasmid_score: scores.1,
            virus_score: scores.2,
        }
    }

    fn virus_windows(scores: &[f64]) -> Vec<ClassifierEntry> {
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| window(i * 100, (i + 1) * 100, (1.0 - s, 0.0, *s)))
            .collect()
    }

    #[test]
    fn test_sub_threshold_window_breaks_region() {
        let entries = virus_windows(&[0.9, 0.9, 0.2, 0.9]);
        let regions = candidate_regions(&entries, PredictionClass::Virus, 0.5);
        assert_eq!(regions.len(), 2);
        assert_eq!((regions[0].start, regions[0].end), (0, 200));
        assert_eq!((regions[1].start, regions[1].end), (300, 400));
        assert_eq!(regions[0].probabilities, vec![0.9, 0.9]);
    }

    #[test]
    fn test_candidates_are_tested_independently() {
        let entries = virus_windows(&[0.9, 0.9, 0.2, 0.9]);
        let thresholds = ClassifierThresholds {
            min_window_score: 0.5,
            min_segment_score: 0.7,
            min_segment_length: 200,
            prediction_classes: vec![PredictionClass::Virus],
        };
        let regions = extract_regions(&entries, &thresholds);
        assert_eq!(regions.len(), 1);
        assert_eq!((regions[0].start, regions[0].end), (0, 200));

        let thresholds = ClassifierThresholds {
            min_segment_length: 100,
            ..thresholds
        };
        assert_eq!(extract_regions(&entries, &thresholds).len(), 2);
    }

    #[test]
    fn test_mean_score_threshold_applies_to_trailing_region() {
        let entries = virus_windows(&[0.2, 0.6, 0.6]);
        let thresholds = ClassifierThresholds {
            min_window_score: 0.5,
            min_segment_score: 0.7,
            min_segment_length: 0,
            prediction_classes: vec![PredictionClass::Virus],
        };
        assert!(extract_regions(&entries, &thresholds).is_empty());
    }

    #[test]
    fn test_unrequested_classes_are_discarded() {
        let entries = virus_windows(&[0.9, 0.9]);
        let thresholds = ClassifierThresholds {
            min_segment_length: 0,
            prediction_classes: vec![PredictionClass::Plasmid],
            ..Default::default()
        };
        assert!(extract_regions(&entries, &thresholds).is_empty());
    }

    #[test]
    fn test_regions_sorted_across_classes_with_labels() {
        let entries = vec![
            window(0, 100, (0.1, 0.1, 0.9)),
            window(100, 200, (0.1, 0.9, 0.1)),
            window(200, 300, (0.1, 0.8, 0.1)),
            window(300, 400, (0.9, 0.1, 0.1)),
        ];
        let thresholds = ClassifierThresholds {
            min_window_score: 0.5,
            min_segment_score: 0.5,
            min_segment_length: 0,
            prediction_classes: PredictionClass::ALL.to_vec(),
        };
        let segments =
            extract_contiguous_segments(&entries, &thresholds, SegmentKind::Segment).unwrap();
        let spans: Vec<(usize, usize, &str)> = segments
            .iter()
            .map(|s| (s.start(), s.end(), s.text()))
            .collect();
        assert_eq!(
            spans,
            vec![
                (0, 100, "Phage (0.90)"),
                (100, 300, "Plasmid (0.85)"),
                (300, 400, "Chromosome (0.90)"),
            ]
        );
    }

    #[test]
    fn test_label_target_kind() {
        let entries = virus_windows(&[0.9]);
        let thresholds = ClassifierThresholds {
            min_segment_length: 0,
            ..Default::default()
        };
        let segments =
            extract_contiguous_segments(&entries, &thresholds, SegmentKind::Label).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].kind(), SegmentKind::Label);
        assert!(
            extract_contiguous_segments(&entries, &thresholds, SegmentKind::Classifier).is_err()
        );
    }

    #[test]
    fn test_sequence_change_closes_region() {
        let mut entries = virus_windows(&[0.9, 0.9]);
        entries[1].sequence_id = "plasmid".to_string();
        entries[1].start = 0;
        entries[1].end = 100;
        let regions = candidate_regions(&entries, PredictionClass::Virus, 0.5);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[1].sequence_id, "plasmid");
    }
}
