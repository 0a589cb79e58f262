//! Parser for windowed sequence-classifier output.
//!
//! The classifier is run over non-overlapping fixed-size slices of a sequence
//! (see [`crate::slicing`]); every row carries one probability per
//! prediction class and encodes its window in `seq_name`.

use crate::{
    config::{ClassifierThresholds, SeqNameFormat},
    error::{BrickError, Result},
    io_util,
    segment::{ClassifierSegment, Segment},
};
use csv::{ReaderBuilder, Trim};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{fmt, io::Read, path::Path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionClass {
    Chromosome,
    Plasmid,
    Virus,
}

impl PredictionClass {
    /// Column order of the classifier output.
    pub const ALL: [PredictionClass; 3] = [
        PredictionClass::Chromosome,
        PredictionClass::Plasmid,
        PredictionClass::Virus,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            PredictionClass::Chromosome => "Chromosome",
            PredictionClass::Plasmid => "Plasmid",
            PredictionClass::Virus => "Phage",
        }
    }

    pub fn score_column(&self) -> &'static str {
        match self {
            PredictionClass::Chromosome => "chromosome_score",
            PredictionClass::Plasmid => "plasmid_score",
            PredictionClass::Virus => "virus_score",
        }
    }
}

impl fmt::Display for PredictionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PredictionClass::Chromosome => "chromosome",
            PredictionClass::Plasmid => "plasmid",
            PredictionClass::Virus => "virus",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierEntry {
    pub sequence_id: String,
    pub start: usize,
    pub end: usize,
    pub chromosome_score: f64,
    pub plasmid_score: f64,
    pub virus_score: f64,
}

#[derive(Debug, Deserialize)]
struct AggregatedRow {
    seq_name: String,
    chromosome_score: f64,
    plasmid_score: f64,
    virus_score: f64,
}

/// Splits `{id}{sep}{start}{range_sep}{end}` into `(start, end, id)`.
pub fn decode_seq_name(seq_name: &str, format: &SeqNameFormat) -> Result<(usize, usize, String)> {
    let parts: Vec<&str> = seq_name.split(format.name_separator.as_str()).collect();
    let [sequence_id, range] = parts.as_slice() else {
        return Err(BrickError::validation(format!(
            "Could not split sequence name '{seq_name}' into id and range at '{}' - was the sequence sliced?",
            format.name_separator
        )));
    };
    let bounds: Vec<&str> = range.split(format.range_separator.as_str()).collect();
    let [start, end] = bounds.as_slice() else {
        return Err(BrickError::validation(format!(
            "Could not split range '{range}' of sequence name '{seq_name}' at '{}'",
            format.range_separator
        )));
    };
    let parse = |value: &str| {
        value.trim().parse::<usize>().map_err(|_| {
            BrickError::validation(format!(
                "Range bound '{value}' in sequence name '{seq_name}' is not an integer"
            ))
        })
    };
    let (start, end) = (parse(*start)?, parse(*end)?);
    if start > end {
        return Err(BrickError::validation(format!(
            "Sequence name '{seq_name}' has start greater than end"
        )));
    }
    Ok((start, end, sequence_id.to_string()))
}

impl ClassifierEntry {
    pub fn score(&self, class: PredictionClass) -> f64 {
        match class {
            PredictionClass::Chromosome => self.chromosome_score,
            PredictionClass::Plasmid => self.plasmid_score,
            PredictionClass::Virus => self.virus_score,
        }
    }

    /// Per-window segment: classes that are not requested or fall below the
    /// window threshold are zeroed and left out of the label.
    pub fn to_segment(&self, thresholds: &ClassifierThresholds) -> Result<ClassifierSegment> {
        let mut labels = vec![];
        let mut scores = [0.0; 3];
        for (i, class) in PredictionClass::ALL.iter().enumerate() {
            let score = self.score(*class);
            if thresholds.requests(*class) && score >= thresholds.min_window_score {
                labels.push(format!("{} ({score:.2})", class.display_name()));
                scores[i] = score;
            }
        }
        ClassifierSegment::new(
            self.start,
            self.end,
            labels.join(" "),
            scores[0],
            scores[1],
            scores[2],
        )
    }
}

pub fn parse_classifier_reader<R: Read>(
    reader: R,
    format: &SeqNameFormat,
) -> Result<Vec<ClassifierEntry>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b'\t')
        .trim(Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let required = std::iter::once("seq_name")
        .chain(PredictionClass::ALL.iter().map(|c| c.score_column()));
    for column in required {
        if !headers.iter().any(|h| h == column) {
            return Err(BrickError::validation(format!(
                "Classifier output is missing the '{column}' column"
            )));
        }
    }

    let mut entries = vec![];
    for (line, row) in rdr.deserialize::<AggregatedRow>().enumerate() {
        let row = row.map_err(|e| {
            BrickError::validation(format!("Classifier row {} is malformed: {e}", line + 1))
        })?;
        for (name, score) in [
            ("chromosome_score", row.chromosome_score),
            ("plasmid_score", row.plasmid_score),
            ("virus_score", row.virus_score),
        ] {
            if !(0.0..=1.0).contains(&score) {
                return Err(BrickError::validation(format!(
                    "Classifier row {}: {name} {score} is outside [0, 1]",
                    line + 1
                )));
            }
        }
        let (start, end, sequence_id) = decode_seq_name(&row.seq_name, format)?;
        entries.push(ClassifierEntry {
            sequence_id,
            start,
            end,
            chromosome_score: row.chromosome_score,
            plasmid_score: row.plasmid_score,
            virus_score: row.virus_score,
        });
    }
    debug!("Parsed {} classifier windows", entries.len());
    Ok(entries)
}

pub fn parse_classifier_output(
    path: &Path,
    format: &SeqNameFormat,
) -> Result<Vec<ClassifierEntry>> {
    parse_classifier_reader(io_util::open_reader(path)?, format)
}

/// One classifier segment per window, without merging.
pub fn window_segments(
    entries: &[ClassifierEntry],
    thresholds: &ClassifierThresholds,
) -> Result<Vec<Segment>> {
    entries
        .iter()
        .map(|entry| entry.to_segment(thresholds).map(Segment::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    const OUTPUT: &str = "\
seq_name\tchromosome_score\tplasmid_score\tvirus_score
chr__0..100\t0.9500\t0.0300\t0.0200
chr__100..200\t0.1000\t0.8000\t0.1000
chr__200..250\t0.2000\t0.1000\t0.7000
";

    #[test]
    fn test_decode_seq_name() {
        let format = SeqNameFormat::default();
        assert_eq!(
            decode_seq_name("NC_000913.3__10000..20000", &format).unwrap(),
            (10000, 20000, "NC_000913.3".to_string())
        );
    }

    #[test]
    fn test_decode_seq_name_custom_separators() {
        let format = SeqNameFormat {
            name_separator: "_".to_string(),
            range_separator: ":".to_string(),
        };
        assert_eq!(
            decode_seq_name("contig_5:10", &format).unwrap(),
            (5, 10, "contig".to_string())
        );
    }

    #[test]
    fn test_decode_seq_name_failures() {
        let format = SeqNameFormat::default();
        for bad in ["chr", "chr__1-2", "chr__a..2", "chr__1..2..3", "a__b__1..2", "chr__5..1"] {
            let err = decode_seq_name(bad, &format).unwrap_err();
            assert!(err.is(ErrorCode::Validation), "{bad}");
        }
    }

    #[test]
    fn test_parse_rows() {
        let entries =
            parse_classifier_reader(OUTPUT.as_bytes(), &SeqNameFormat::default()).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].sequence_id, "chr");
        assert_eq!((entries[2].start, entries[2].end), (200, 250));
        assert_eq!(entries[1].plasmid_score, 0.8);
    }

    #[test]
    fn test_per_window_labels_and_zeroing() {
        let entries =
            parse_classifier_reader(OUTPUT.as_bytes(), &SeqNameFormat::default()).unwrap();
        let thresholds = ClassifierThresholds {
            min_window_score: 0.5,
            prediction_classes: vec![PredictionClass::Chromosome, PredictionClass::Virus],
            ..Default::default()
        };
        let segments: Vec<ClassifierSegment> = entries
            .iter()
            .map(|e| e.to_segment(&thresholds).unwrap())
            .collect();
        assert_eq!(segments[0].text, "Chromosome (0.95)");
        assert_eq!(segments[0].chromosome, 0.95);
        assert_eq!(segments[0].plasmid, 0.0);
        // plasmid clears the threshold but was not requested
        assert_eq!(segments[1].text, "");
        assert_eq!(segments[1].plasmid, 0.0);
        assert_eq!(segments[2].text, "Phage (0.70)");
        assert_eq!(segments[2].virus, 0.7);
    }

    #[test]
    fn test_window_segments_keep_row_count() {
        let entries =
            parse_classifier_reader(OUTPUT.as_bytes(), &SeqNameFormat::default()).unwrap();
        let segments = window_segments(&entries, &ClassifierThresholds::default()).unwrap();
        assert_eq!(segments.len(), entries.len());
    }

    #[test]
    fn test_missing_score_column() {
        let err = parse_classifier_reader(
            "seq_name\tchromosome_score\tplasmid_score\nchr__0..1\t0.1\t0.2\n".as_bytes(),
            &SeqNameFormat::default(),
        )
        .unwrap_err();
        assert!(err.message.contains("virus_score"));
    }

    #[test]
    fn test_out_of_range_score() {
        let text = "seq_name\tchromosome_score\tplasmid_score\tvirus_score\nchr__0..1\t1.5\t0\t0\n";
        assert!(parse_classifier_reader(text.as_bytes(), &SeqNameFormat::default()).is_err());
    }
}
