//! Parser for user-supplied segment tables (`start`, `end`, `text`, optional `color`).

use crate::{
    error::{BrickError, Result},
    io_util,
    sanitize::{SanitizeOptions, sanitize},
    segment::{LabelSegment, PlainSegment, Segment, SegmentKind},
};
use csv::{ReaderBuilder, Trim};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{io::Read, path::Path};

pub const REQUIRED_COLUMNS: [&str; 3] = ["start", "end", "text"];
pub const CUSTOM_ANNOTATION_COLUMNS: [&str; 4] = ["start", "end", "text", "color"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelimitedEntry {
    pub start: usize,
    pub end: usize,
    pub text: String,
    #[serde(default)]
    pub color: Option<String>,
}

pub fn parse_segment_reader<R: Read>(
    reader: R,
    kind: SegmentKind,
    options: SanitizeOptions,
) -> Result<Vec<Segment>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b'\t')
        .trim(Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(BrickError::validation(format!(
                "Segment table is missing the '{column}' column"
            )));
        }
    }

    let mut segments = vec![];
    for (row, entry) in rdr.deserialize::<DelimitedEntry>().enumerate() {
        let entry = entry.map_err(|e| {
            BrickError::validation(format!("Segment table row {} is malformed: {e}", row + 1))
        })?;
        if entry.start > entry.end {
            return Err(BrickError::validation(format!(
                "Segment table row {}: start ({}) is greater than end ({})",
                row + 1,
                entry.start,
                entry.end
            )));
        }
        let text = sanitize(&entry.text, options);
        let segment: Segment = match kind {
            SegmentKind::Segment => PlainSegment::new(entry.start, entry.end, text)?.into(),
            SegmentKind::Label => LabelSegment::new(entry.start, entry.end, text)?.into(),
            SegmentKind::Classifier => {
                return Err(BrickError::configuration(
                    "Segment tables cannot produce classifier segments",
                ));
            }
        };
        segments.push(segment);
    }

    if segments.is_empty() {
        return Err(BrickError::validation("Segment table contains no data rows"));
    }
    debug!("Parsed {} segments from segment table", segments.len());
    Ok(segments)
}

pub fn parse_tsv_segments(
    path: &Path,
    kind: SegmentKind,
    options: SanitizeOptions,
) -> Result<Vec<Segment>> {
    parse_segment_reader(io_util::open_reader(path)?, kind, options)
}
