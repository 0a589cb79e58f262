//! Parser for tabular alignment output (`blastn -outfmt 6`).

use crate::{
    config::BlastFilter,
    error::{BrickError, Result},
    io_util,
    ring::Reference,
    segment::{PlainSegment, Segment},
};
use csv::{ReaderBuilder, Trim};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{io::Read, path::Path};

/// One row of `-outfmt 6` output, in column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlastEntry {
    pub query_id: String,
    pub subject_id: String,
    pub perc_identity: f64,
    pub alignment_length: u64,
    pub mismatches: u64,
    pub gap_opens: u64,
    pub query_start: usize,
    pub query_end: usize,
    pub subject_start: usize,
    pub subject_end: usize,
    pub e_value: f64,
    pub bit_score: f64,
}

impl BlastEntry {
    fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.perc_identity) {
            return Err(BrickError::validation(format!(
                "Percentage identity must be between 0 and 100, found {}",
                self.perc_identity
            )));
        }
        if self.e_value.is_nan() || self.e_value < 0.0 {
            return Err(BrickError::validation(format!(
                "E-value must be non-negative, found {}",
                self.e_value
            )));
        }
        Ok(())
    }

    pub fn passes(&self, filter: &BlastFilter, reference: Option<&Reference>) -> bool {
        if self.perc_identity < filter.min_identity
            || self.alignment_length < filter.min_alignment
            || self.e_value > filter.max_evalue
        {
            return false;
        }
        match reference {
            Some(reference) => self.subject_id == reference.sequence.id,
            None => true,
        }
    }

    /// Converts the 1-based inclusive subject range (reversed on the minus
    /// strand) into a 0-based half-open segment.
    pub fn to_segment(&self) -> Segment {
        let low = self.subject_start.min(self.subject_end);
        let high = self.subject_start.max(self.subject_end);
        Segment::Plain(PlainSegment {
            start: low.saturating_sub(1),
            end: high,
            text: format!("{:.2}% nucleotide identity", self.perc_identity),
        })
    }
}

pub fn parse_blast_reader<R: Read>(
    reader: R,
    reference: Option<&Reference>,
    filter: &BlastFilter,
) -> Result<Vec<BlastEntry>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .trim(Trim::All)
        .from_reader(reader);

    let mut total = 0usize;
    let mut entries = vec![];
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        if record.len() != 12 {
            return Err(BrickError::validation(format!(
                "Alignment row {} has {} columns, expected 12",
                line + 1,
                record.len()
            )));
        }
        let entry: BlastEntry = record.deserialize(None).map_err(|e| {
            BrickError::validation(format!("Alignment row {} is malformed: {e}", line + 1))
        })?;
        entry.validate()?;
        total += 1;
        if entry.passes(filter, reference) {
            entries.push(entry);
        }
    }
    debug!(
        "Parsed {total} alignment rows, {} passed the filters",
        entries.len()
    );
    Ok(entries)
}

pub fn parse_blast_output(
    path: &Path,
    reference: Option<&Reference>,
    filter: &BlastFilter,
) -> Result<Vec<BlastEntry>> {
    parse_blast_reader(io_util::open_reader(path)?, reference, filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use rstest::rstest;

    const HITS: &str = "\
q1\tchr\t99.50\t1000\t5\t0\t1\t1000\t101\t1100\t0.0\t1800
q1\tchr\t85.00\t400\t60\t2\t2000\t2400\t5400\t5001\t1e-50\t500
q2\tchr\t70.25\t80\t24\t1\t1\t80\t9001\t9080\t0.5\t40
q2\tplasmid\t98.00\t500\t10\t0\t1\t500\t1\t500\t1e-100\t900
";

    fn parse(filter: &BlastFilter) -> Vec<BlastEntry> {
        parse_blast_reader(HITS.as_bytes(), None, filter).unwrap()
    }

    #[test]
    fn test_parses_all_columns() {
        let entries = parse(&BlastFilter::default());
        assert_eq!(entries.len(), 4);
        let e = &entries[1];
        assert_eq!(e.query_id, "q1");
        assert_eq!(e.subject_id, "chr");
        assert_eq!(e.alignment_length, 400);
        assert_eq!(e.gap_opens, 2);
        assert_eq!(e.subject_start, 5400);
        assert_eq!(e.subject_end, 5001);
        assert_eq!(e.e_value, 1e-50);
    }

    #[test]
    fn test_segment_is_sorted_and_half_open() {
        let entries = parse(&BlastFilter::default());
        let forward = entries[0].to_segment();
        assert_eq!((forward.start(), forward.end()), (100, 1100));
        assert_eq!(forward.text(), "99.50% nucleotide identity");
        let reverse = entries[1].to_segment();
        assert_eq!((reverse.start(), reverse.end()), (5000, 5400));
    }

    #[test]
    fn test_reference_restricts_subject() {
        let reference = Reference::new("s", "r", "plasmid", 5000);
        let entries =
            parse_blast_reader(HITS.as_bytes(), Some(&reference), &BlastFilter::default())
                .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].subject_id, "plasmid");
    }

    #[rstest]
    #[case(BlastFilter { min_identity: 80.0, ..Default::default() }, 3)]
    #[case(BlastFilter { min_alignment: 450, ..Default::default() }, 2)]
    #[case(BlastFilter { max_evalue: 1e-60, ..Default::default() }, 2)]
    #[case(BlastFilter { min_identity: 99.0, min_alignment: 0, max_evalue: 0.0 }, 1)]
    fn test_filters(#[case] filter: BlastFilter, #[case] expected: usize) {
        assert_eq!(parse(&filter).len(), expected);
    }

    #[test]
    fn test_tightening_filters_never_adds_rows() {
        let mut previous = usize::MAX;
        for min_identity in [0.0, 50.0, 75.0, 90.0, 99.0, 100.0] {
            for max_evalue in [10.0, 1.0, 1e-10, 0.0] {
                let count = parse(&BlastFilter {
                    min_identity,
                    min_alignment: 0,
                    max_evalue,
                })
                .len();
                let looser = parse(&BlastFilter {
                    min_identity,
                    min_alignment: 0,
                    max_evalue: 10.0,
                })
                .len();
                assert!(count <= looser);
            }
            let count = parse(&BlastFilter {
                min_identity,
                ..Default::default()
            })
            .len();
            assert!(count <= previous);
            previous = count;
        }
        let mut previous = usize::MAX;
        for min_alignment in [0, 80, 81, 400, 1000, 1001] {
            let count = parse(&BlastFilter {
                min_alignment,
                ..Default::default()
            })
            .len();
            assert!(count <= previous);
            previous = count;
        }
    }

    #[test]
    fn test_malformed_row_fails_whole_parse() {
        let text = format!("{HITS}q3\tchr\tninety\t10\t0\t0\t1\t10\t1\t10\t0.1\t20\n");
        let err = parse_blast_reader(text.as_bytes(), None, &BlastFilter::default()).unwrap_err();
        assert!(err.is(ErrorCode::Validation));
    }

    #[test]
    fn test_short_row_fails() {
        let text = "q1\tchr\t99.0\t10\t0\t0\t1\t10\t1\t10\t0.1\n";
        let err = parse_blast_reader(text.as_bytes(), None, &BlastFilter::default()).unwrap_err();
        assert!(err.is(ErrorCode::Validation));
    }

    #[test]
    fn test_identity_out_of_range_fails() {
        let text = "q1\tchr\t101.0\t10\t0\t0\t1\t10\t1\t10\t0.1\t20\n";
        assert!(parse_blast_reader(text.as_bytes(), None, &BlastFilter::default()).is_err());
    }

    #[test]
    fn test_empty_input_gives_no_entries() {
        let entries = parse_blast_reader("".as_bytes(), None, &BlastFilter::default()).unwrap();
        assert!(entries.is_empty());
    }
}
