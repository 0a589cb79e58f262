//! Cuts sequences into fixed-size windows for the sequence classifier.
//!
//! Each window is written as its own FASTA record named with
//! [`SeqNameFormat::encode`], which is what
//! [`crate::classifier::decode_seq_name`] reads back.

use crate::{
    config::SeqNameFormat,
    error::{BrickError, Result},
    io_util,
};
use bio::io::fasta;
use log::info;
use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufWriter, path::Path};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceSummary {
    pub records: usize,
    pub slices: usize,
}

/// Half-open windows `[start, end)` covering `0..length`; the last one may be shorter.
pub fn window_bounds(length: usize, slice_size: usize) -> Vec<(usize, usize)> {
    if slice_size == 0 {
        return vec![];
    }
    (0..length)
        .step_by(slice_size)
        .map(|start| (start, (start + slice_size).min(length)))
        .collect()
}

pub fn slice_fasta(
    input: &Path,
    output: &Path,
    slice_size: usize,
    format: &SeqNameFormat,
) -> Result<SliceSummary> {
    if slice_size == 0 {
        return Err(BrickError::configuration("Slice size must be greater than zero"));
    }
    let reader = fasta::Reader::new(io_util::open_reader(input)?);
    let mut writer = fasta::Writer::new(BufWriter::new(File::create(output)?));
    let mut summary = SliceSummary::default();
    for record in reader.records() {
        let record = record.map_err(|e| {
            BrickError::validation(format!("Invalid FASTA record in '{}': {e}", input.display()))
        })?;
        let seq = record.seq();
        for (start, end) in window_bounds(seq.len(), slice_size) {
            let name = format.encode(record.id(), start, end);
            writer.write(&name, None, &seq[start..end])?;
            summary.slices += 1;
        }
        summary.records += 1;
    }
    writer.flush()?;
    info!(
        "Sliced {} records into {} windows of {slice_size} bp",
        summary.records, summary.slices
    );
    Ok(summary)
}
