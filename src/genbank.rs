//! Feature extraction from GenBank flat files.

use crate::{
    error::{BrickError, Result},
    io_util,
    sanitize::{SanitizeOptions, sanitize},
    segment::{LabelSegment, PlainSegment, Segment, SegmentKind},
};
use gb_io::{
    reader::SeqReader,
    seq::{Feature, Location, Seq},
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

const RECORD_HEADER: &str = "LOCUS";
const RECORD_TERMINATOR: &str = "//";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEntry {
    pub start: usize,
    pub end: usize,
    pub annotation: String,
}

impl FeatureEntry {
    pub fn to_segment(&self, kind: SegmentKind, options: SanitizeOptions) -> Result<Segment> {
        let text = sanitize(&self.annotation, options);
        match kind {
            SegmentKind::Segment => Ok(PlainSegment::new(self.start, self.end, text)?.into()),
            SegmentKind::Label => Ok(LabelSegment::new(self.start, self.end, text)?.into()),
            SegmentKind::Classifier => Err(BrickError::configuration(
                "Feature annotations cannot be converted to classifier segments",
            )),
        }
    }
}

/// Cheap structural check run before the full parse: the first non-blank
/// line must be a record header and a record terminator line must exist.
pub fn check_structure(text: &str) -> Result<()> {
    let first = text.lines().find(|line| !line.trim().is_empty());
    match first {
        Some(line) if line.starts_with(RECORD_HEADER) => {}
        _ => {
            return Err(BrickError::validation(format!(
                "GenBank file must start with a {RECORD_HEADER} record header"
            )));
        }
    }
    if !text.lines().any(|line| line.trim_end() == RECORD_TERMINATOR) {
        return Err(BrickError::validation(format!(
            "GenBank file is missing the '{RECORD_TERMINATOR}' record terminator"
        )));
    }
    Ok(())
}

pub fn parse_records(text: &str) -> Result<Vec<Seq>> {
    check_structure(text)?;
    SeqReader::new(text.as_bytes())
        .map(|seq| seq.map_err(|e| BrickError::validation(format!("Invalid GenBank record: {e}"))))
        .collect()
}

fn collect_location_ranges(location: &Location, ranges: &mut Vec<(i64, i64)>) {
    match location {
        Location::Range((from, _), (to, _)) | Location::Between(from, to) => {
            ranges.push(((*from).min(*to), (*from).max(*to)));
        }
        Location::Complement(inner) => collect_location_ranges(inner, ranges),
        Location::Join(parts)
        | Location::Order(parts)
        | Location::Bond(parts)
        | Location::OneOf(parts) => {
            for part in parts {
                collect_location_ranges(part, ranges);
            }
        }
        Location::External(_, maybe_loc) => {
            if let Some(loc) = maybe_loc {
                collect_location_ranges(loc, ranges);
            }
        }
        Location::Gap(_) => {}
    }
}

/// Outer 0-based half-open bounds of a feature location.
pub fn feature_bounds(feature: &Feature) -> Option<(usize, usize)> {
    let (start, end) = match feature.location.find_bounds() {
        Ok(bounds) => bounds,
        Err(_) => {
            let mut ranges = vec![];
            collect_location_ranges(&feature.location, &mut ranges);
            let start = ranges.iter().map(|r| r.0).min()?;
            let end = ranges.iter().map(|r| r.1).max()?;
            (start, end)
        }
    };
    Some((usize::try_from(start).ok()?, usize::try_from(end).ok()?))
}

fn first_qualifier(feature: &Feature, key: &str) -> Option<String> {
    feature
        .qualifier_values(key.into())
        .next()
        .map(|s| s.to_string())
        .filter(|s| !s.trim().is_empty())
}

fn feature_annotation(feature: &Feature) -> String {
    let mut annotation = feature.kind.to_string();
    for key in ["gene", "product"] {
        if let Some(value) = first_qualifier(feature, key) {
            annotation.push(' ');
            annotation.push_str(&value);
        }
    }
    annotation
}

pub fn extract_features(records: &[Seq], feature_types: &[String]) -> Vec<FeatureEntry> {
    let mut entries = vec![];
    for record in records {
        for feature in &record.features {
            let kind = feature.kind.to_string();
            if !feature_types.iter().any(|t| *t == kind) {
                continue;
            }
            let Some((start, end)) = feature_bounds(feature) else {
                warn!("Skipping {kind} feature with unresolvable location");
                continue;
            };
            entries.push(FeatureEntry {
                start,
                end,
                annotation: feature_annotation(feature),
            });
        }
    }
    entries
}

pub fn parse_genbank_features(path: &Path, feature_types: &[String]) -> Result<Vec<FeatureEntry>> {
    let text = io_util::read_to_string(path)?;
    let records = parse_records(&text)?;
    let entries = extract_features(&records, feature_types);
    debug!(
        "Extracted {} features of types {:?} from {} GenBank records in '{}'",
        entries.len(),
        feature_types,
        records.len(),
        path.display()
    );
    Ok(entries)
}
