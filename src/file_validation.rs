//! Checks uploaded files before they join a session.

use crate::{
    error::{BrickError, Result},
    genbank, io_util,
    tsv::CUSTOM_ANNOTATION_COLUMNS,
};
use bio::io::fasta;
use csv::ReaderBuilder;
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Fasta,
    Genbank,
    Tsv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Reference,
    Genome,
    AnnotationGenbank,
    AnnotationCustom,
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileFormat::Fasta => "fasta",
            FileFormat::Genbank => "genbank",
            FileFormat::Tsv => "tsv",
        };
        write!(f, "{name}")
    }
}

/// An uploaded file that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFile {
    /// Name as uploaded by the user
    pub name: String,
    /// Stored file name
    pub file: String,
    pub id: String,
    pub path: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub format: FileFormat,
    pub records: usize,
    #[serde(default)]
    pub length: usize,
}

/// A file to validate, as passed to [`validate_files`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRequest {
    pub path: String,
    pub format: FileFormat,
    pub file_type: FileType,
    #[serde(default)]
    pub original_name: Option<String>,
}

fn fasta_stats(path: &Path) -> Result<(usize, usize)> {
    let reader = fasta::Reader::new(io_util::open_reader(path)?);
    let mut records = 0;
    let mut length = 0;
    for record in reader.records() {
        let record =
            record.map_err(|e| BrickError::validation(format!("Invalid FASTA record: {e}")))?;
        record.check().map_err(|e| {
            BrickError::validation(format!("Invalid FASTA record '{}': {e}", record.id()))
        })?;
        records += 1;
        length += record.seq().len();
    }
    Ok((records, length))
}

fn tsv_rows(path: &Path, file_type: FileType) -> Result<usize> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b'\t')
        .from_reader(io_util::open_reader(path)?);
    let headers = rdr.headers()?.clone();
    if file_type == FileType::AnnotationCustom {
        let names: Vec<&str> = headers.iter().map(str::trim).collect();
        if names != CUSTOM_ANNOTATION_COLUMNS {
            return Err(BrickError::validation(format!(
                "Custom annotation files must have the four columns {} in this order, found {}",
                CUSTOM_ANNOTATION_COLUMNS.join(", "),
                names.join(", ")
            )));
        }
    }
    let mut rows = 0;
    for record in rdr.records() {
        record?;
        rows += 1;
    }
    Ok(rows)
}

pub fn validate_file(
    path: &Path,
    format: FileFormat,
    file_type: FileType,
    original_name: Option<&str>,
) -> Result<SessionFile> {
    let (records, length) = match format {
        FileFormat::Fasta => {
            let (records, length) = fasta_stats(path)?;
            if records == 0 {
                return Err(BrickError::validation(format!(
                    "No sequences found in FASTA file '{}'",
                    path.display()
                )));
            }
            if file_type == FileType::Reference && records > 1 {
                return Err(BrickError::validation(format!(
                    "Reference files must contain a single sequence, '{}' has {records}",
                    path.display()
                )));
            }
            (records, length)
        }
        FileFormat::Genbank => {
            let text = io_util::read_to_string(path)?;
            let seqs = genbank::parse_records(&text)?;
            let length = seqs.iter().map(|seq| seq.len() as usize).sum();
            (seqs.len(), length)
        }
        FileFormat::Tsv => (tsv_rows(path, file_type)?, 0),
    };

    let file = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let id = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    if records == 0 {
        warn!("File '{}' passed validation but has no records", path.display());
    }
    info!(
        "Validated {format} file '{}': {records} records, {length} bases",
        path.display()
    );
    Ok(SessionFile {
        name: original_name.map(str::to_string).unwrap_or_else(|| file.clone()),
        file,
        id,
        path: path.to_string_lossy().to_string(),
        file_type,
        format,
        records,
        length,
    })
}

/// Validates every request independently and in parallel. Results keep the
/// order of `requests`.
pub fn validate_files(requests: &[FileRequest]) -> Vec<Result<SessionFile>> {
    requests
        .par_iter()
        .map(|request| {
            validate_file(
                Path::new(&request.path),
                request.format,
                request.file_type,
                request.original_name.as_deref(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::io::Write;

    #[test]
    fn test_reference_fasta() {
        let file = validate_file(
            Path::new("test_files/reference.fasta"),
            FileFormat::Fasta,
            FileType::Reference,
            Some("my reference.fa"),
        )
        .unwrap();
        assert_eq!(file.records, 1);
        assert_eq!(file.length, 1400);
        assert_eq!(file.id, "reference");
        assert_eq!(file.file, "reference.fasta");
        assert_eq!(file.name, "my reference.fa");
    }

    #[test]
    fn test_reference_must_have_single_record() {
        let path = Path::new("test_files/two_contigs.fasta");
        let err = validate_file(path, FileFormat::Fasta, FileType::Reference, None).unwrap_err();
        assert!(err.is(ErrorCode::Validation));
        let file = validate_file(path, FileFormat::Fasta, FileType::Genome, None).unwrap();
        assert_eq!((file.records, file.length), (2, 16));
    }

    #[test]
    fn test_empty_fasta_is_rejected() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp).unwrap();
        let err = validate_file(tmp.path(), FileFormat::Fasta, FileType::Genome, None).unwrap_err();
        assert!(err.is(ErrorCode::Validation));
    }

    #[test]
    fn test_genbank_file() {
        let file = validate_file(
            Path::new("test_files/annotation.gbk"),
            FileFormat::Genbank,
            FileType::AnnotationGenbank,
            None,
        )
        .unwrap();
        assert_eq!(file.records, 1);
        assert_eq!(file.length, 1400);
    }

    #[test]
    fn test_fasta_passed_as_genbank_is_rejected() {
        let err = validate_file(
            Path::new("test_files/reference.fasta"),
            FileFormat::Genbank,
            FileType::AnnotationGenbank,
            None,
        )
        .unwrap_err();
        assert!(err.is(ErrorCode::Validation));
    }

    #[test]
    fn test_custom_annotation_columns() {
        let file = validate_file(
            Path::new("test_files/labels.tsv"),
            FileFormat::Tsv,
            FileType::AnnotationCustom,
            None,
        )
        .unwrap();
        assert_eq!(file.records, 3);

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "start\tend\ttext").unwrap();
        writeln!(tmp, "1\t2\tx").unwrap();
        let err = validate_file(tmp.path(), FileFormat::Tsv, FileType::AnnotationCustom, None)
            .unwrap_err();
        assert!(err.message.contains("four columns"));
    }

    #[test]
    fn test_validate_files_in_parallel() {
        let requests = vec![
            FileRequest {
                path: "test_files/reference.fasta".to_string(),
                format: FileFormat::Fasta,
                file_type: FileType::Reference,
                original_name: None,
            },
            FileRequest {
                path: "test_files/missing.fasta".to_string(),
                format: FileFormat::Fasta,
                file_type: FileType::Genome,
                original_name: None,
            },
            FileRequest {
                path: "test_files/labels.tsv".to_string(),
                format: FileFormat::Tsv,
                file_type: FileType::AnnotationCustom,
                original_name: None,
            },
        ];
        let results = validate_files(&requests);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].as_ref().unwrap_err().is(ErrorCode::Io));
        assert_eq!(results[2].as_ref().unwrap().records, 3);
    }

    #[test]
    fn test_session_file_type_field_name() {
        let file = validate_file(
            Path::new("test_files/reference.fasta"),
            FileFormat::Fasta,
            FileType::Reference,
            None,
        )
        .unwrap();
        let value = serde_json::to_value(&file).unwrap();
        assert_eq!(value["type"], "reference");
        assert_eq!(value["format"], "fasta");
    }
}
