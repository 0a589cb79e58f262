//! Rings and the factories that build them from parsed tool output.
//!
//! Every factory is a plain function of parsed data, an optional
//! [`Reference`] and explicit parameters. The returned ring carries a fresh
//! id and the unassigned index `-1`; [`crate::index`] places it in its group.

use crate::{
    blast::{self, BlastEntry},
    classifier::{self, ClassifierEntry},
    config::{BlastFilter, ClassifierThresholds, RingStyle, SeqNameFormat},
    contiguous,
    error::{BrickError, Result},
    genbank, io_util,
    sanitize::{SanitizeOptions, sanitize},
    segment::{LabelSegment, Segment, SegmentKind},
    tsv,
};
use bio::io::fasta;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
};
use uuid::Uuid;

pub type RingId = String;

pub const UNASSIGNED_INDEX: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RingType {
    Generic,
    Reference,
    Blast,
    Annotation,
    Label,
    #[serde(alias = "genomad")]
    Classifier,
}

impl RingType {
    pub fn default_title(&self) -> &'static str {
        match self {
            RingType::Generic => "Ring",
            RingType::Reference => "Reference Ring",
            RingType::Blast => "BLAST Ring",
            RingType::Annotation => "Annotation Ring",
            RingType::Label => "Label Ring",
            RingType::Classifier => "Classifier Ring",
        }
    }
}

impl fmt::Display for RingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RingType::Generic => "generic",
            RingType::Reference => "reference",
            RingType::Blast => "blast",
            RingType::Annotation => "annotation",
            RingType::Label => "label",
            RingType::Classifier => "classifier",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceSequence {
    pub id: String,
    pub length: usize,
}

/// The sequence a ring is drawn against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Reference {
    pub session_id: String,
    pub reference_id: String,
    pub sequence: ReferenceSequence,
}

/// Rings with equal keys share one index space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RingGroupKey {
    pub reference_id: String,
    pub sequence_id: String,
}

impl fmt::Display for RingGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.reference_id, self.sequence_id)
    }
}

impl Reference {
    pub fn new(
        session_id: impl Into<String>,
        reference_id: impl Into<String>,
        sequence_id: impl Into<String>,
        length: usize,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            reference_id: reference_id.into(),
            sequence: ReferenceSequence {
                id: sequence_id.into(),
                length,
            },
        }
    }

    /// One reference per FASTA record of an uploaded reference file.
    pub fn from_fasta_file(session_id: &str, reference_id: &str, path: &Path) -> Result<Vec<Self>> {
        let reader = fasta::Reader::new(io_util::open_reader(path)?);
        let mut references = vec![];
        for record in reader.records() {
            let record = record.map_err(|e| {
                BrickError::validation(format!("Invalid FASTA record in '{}': {e}", path.display()))
            })?;
            references.push(Self::new(
                session_id,
                reference_id,
                record.id(),
                record.seq().len(),
            ));
        }
        if references.is_empty() {
            return Err(BrickError::validation(format!(
                "No sequences found in reference file '{}'",
                path.display()
            )));
        }
        Ok(references)
    }

    pub fn group_key(&self) -> RingGroupKey {
        RingGroupKey {
            reference_id: self.reference_id.clone(),
            sequence_id: self.sequence.id.clone(),
        }
    }
}

fn unassigned_index() -> i64 {
    UNASSIGNED_INDEX
}

fn default_visible() -> bool {
    true
}

fn default_color() -> String {
    crate::config::DEFAULT_RING_COLOR.to_string()
}

fn default_height() -> u32 {
    crate::config::DEFAULT_RING_HEIGHT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ring {
    pub id: RingId,
    #[serde(default = "unassigned_index")]
    pub index: i64,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(rename = "type")]
    pub ring_type: RingType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub reference: Option<Reference>,
    #[serde(default)]
    pub data: Vec<Segment>,
}

/// A user-authored label that does not come from any file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomLabel {
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub text: String,
}

/// Where annotation segments come from. Exactly one source is allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum AnnotationSource {
    GenBank {
        path: PathBuf,
        feature_types: Vec<String>,
    },
    Tsv {
        path: PathBuf,
    },
}

impl AnnotationSource {
    pub fn select(
        genbank: Option<PathBuf>,
        tsv: Option<PathBuf>,
        feature_types: &[String],
    ) -> Result<Self> {
        match (genbank, tsv) {
            (Some(path), None) => Ok(AnnotationSource::GenBank {
                path,
                feature_types: feature_types.to_vec(),
            }),
            (None, Some(path)) => Ok(AnnotationSource::Tsv { path }),
            (None, None) => Err(BrickError::configuration(
                "Either a GenBank file or a TSV file must be provided",
            )),
            (Some(_), Some(_)) => Err(BrickError::configuration(
                "Exactly one of a GenBank file or a TSV file must be provided, not both",
            )),
        }
    }

    /// Like [`AnnotationSource::select`] but supplying no file at all is allowed.
    pub fn optional(
        genbank: Option<PathBuf>,
        tsv: Option<PathBuf>,
        feature_types: &[String],
    ) -> Result<Option<Self>> {
        if genbank.is_none() && tsv.is_none() {
            return Ok(None);
        }
        Self::select(genbank, tsv, feature_types).map(Some)
    }

    pub fn segments(&self, kind: SegmentKind, options: SanitizeOptions) -> Result<Vec<Segment>> {
        match self {
            AnnotationSource::GenBank {
                path,
                feature_types,
            } => {
                if feature_types.is_empty() {
                    return Err(BrickError::configuration(
                        "At least one feature type must be requested from a GenBank file",
                    ));
                }
                let entries = genbank::parse_genbank_features(path, feature_types)?;
                if entries.is_empty() {
                    return Err(BrickError::empty_result(format!(
                        "No features of type {} found in '{}'; check the requested feature types",
                        feature_types.join(", "),
                        path.display()
                    )));
                }
                entries
                    .iter()
                    .map(|entry| entry.to_segment(kind, options))
                    .collect()
            }
            AnnotationSource::Tsv { path } => tsv::parse_tsv_segments(path, kind, options),
        }
    }
}

/// Inputs of a label ring: an optional annotation file plus hand-written labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSource {
    pub file: Option<AnnotationSource>,
    pub custom_labels: Vec<CustomLabel>,
}

impl LabelSource {
    pub fn select(file: Option<AnnotationSource>, custom_labels: Vec<CustomLabel>) -> Result<Self> {
        if file.is_none() && custom_labels.is_empty() {
            return Err(BrickError::configuration(
                "Either an annotation file or custom labels must be provided",
            ));
        }
        Ok(Self {
            file,
            custom_labels,
        })
    }
}

/// Which ring a classifier output turns into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierRingKind {
    /// Contiguous regions as label segments
    Label,
    /// Contiguous regions as plain segments
    Annotation,
    /// One scored segment per window
    #[default]
    #[serde(alias = "genomad")]
    Classifier,
}

impl Ring {
    pub fn new(
        ring_type: RingType,
        reference: Option<Reference>,
        data: Vec<Segment>,
        style: &RingStyle,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            index: UNASSIGNED_INDEX,
            visible: style.visible,
            color: style.color.clone(),
            height: style.height,
            ring_type,
            title: style
                .title
                .clone()
                .unwrap_or_else(|| ring_type.default_title().to_string()),
            reference,
            data,
        }
    }

    pub fn is_label(&self) -> bool {
        self.ring_type == RingType::Label
    }

    pub fn group_key(&self) -> Option<RingGroupKey> {
        self.reference.as_ref().map(Reference::group_key)
    }

    /// True when both rings are drawn against the same reference sequence.
    /// Unreferenced rings share one group.
    pub fn same_group(&self, other: &Ring) -> bool {
        self.group_key() == other.group_key()
    }

    /// A single segment spanning the whole reference sequence.
    pub fn reference(reference: &Reference, style: &RingStyle) -> Result<Self> {
        let segment = Segment::plain(0, reference.sequence.length, reference.sequence.id.clone())?;
        Ok(Self::new(
            RingType::Reference,
            Some(reference.clone()),
            vec![segment],
            style,
        ))
    }

    /// Builds an alignment ring from already filtered rows. An empty row set
    /// means the filters removed every hit.
    pub fn blast(
        entries: &[BlastEntry],
        reference: Option<&Reference>,
        filter: &BlastFilter,
        style: &RingStyle,
    ) -> Result<Self> {
        if entries.is_empty() {
            return Err(BrickError::empty_result(format!(
                "Alignment succeeded but no hits passed the filters (min_identity {}, \
                 min_alignment {}, max_evalue {}); the filters are likely too strict",
                filter.min_identity, filter.min_alignment, filter.max_evalue
            )));
        }
        let data = entries.iter().map(BlastEntry::to_segment).collect();
        Ok(Self::new(RingType::Blast, reference.cloned(), data, style))
    }

    pub fn blast_from_file(
        path: &Path,
        reference: Option<&Reference>,
        filter: &BlastFilter,
        style: &RingStyle,
    ) -> Result<Self> {
        filter.validate()?;
        let entries = blast::parse_blast_output(path, reference, filter)?;
        Self::blast(&entries, reference, filter, style)
    }

    pub fn annotation(
        source: &AnnotationSource,
        reference: Option<&Reference>,
        options: SanitizeOptions,
        style: &RingStyle,
    ) -> Result<Self> {
        let data = source.segments(SegmentKind::Segment, options)?;
        Ok(Self::new(RingType::Annotation, reference.cloned(), data, style))
    }

    pub fn label(
        source: &LabelSource,
        reference: Option<&Reference>,
        options: SanitizeOptions,
        style: &RingStyle,
    ) -> Result<Self> {
        let data = match &source.file {
            Some(file) => file.segments(SegmentKind::Label, options)?,
            None => vec![],
        };
        let mut ring = Self::new(RingType::Label, reference.cloned(), data, style);
        ring.add_custom_labels(&source.custom_labels, options)?;
        Ok(ring)
    }

    /// Appends hand-written labels, each with a fresh identifier, and
    /// returns the new identifiers.
    pub fn add_custom_labels(
        &mut self,
        labels: &[CustomLabel],
        options: SanitizeOptions,
    ) -> Result<Vec<String>> {
        if !self.is_label() {
            return Err(BrickError::validation(format!(
                "Custom labels can only be added to label rings, ring '{}' is a {} ring",
                self.id, self.ring_type
            )));
        }
        let segments = labels
            .iter()
            .map(|label| LabelSegment::new(label.start, label.end, sanitize(&label.text, options)))
            .collect::<Result<Vec<_>>>()?;
        let identifiers = segments
            .iter()
            .map(|segment| segment.label_identifier.clone())
            .collect();
        self.data.extend(segments.into_iter().map(Segment::from));
        Ok(identifiers)
    }

    /// Builds a ring from classifier windows. Windows on other sequences
    /// than the reference are ignored.
    pub fn classifier(
        entries: &[ClassifierEntry],
        kind: ClassifierRingKind,
        reference: Option<&Reference>,
        thresholds: &ClassifierThresholds,
        style: &RingStyle,
    ) -> Result<Self> {
        thresholds.validate()?;
        let selected: Vec<ClassifierEntry> = match reference {
            Some(reference) => entries
                .iter()
                .filter(|entry| entry.sequence_id == reference.sequence.id)
                .cloned()
                .collect(),
            None => entries.to_vec(),
        };
        debug!(
            "{} of {} classifier windows belong to the reference",
            selected.len(),
            entries.len()
        );
        let (ring_type, data) = match kind {
            ClassifierRingKind::Classifier => (
                RingType::Classifier,
                classifier::window_segments(&selected, thresholds)?,
            ),
            ClassifierRingKind::Label => (
                RingType::Label,
                contiguous::extract_contiguous_segments(&selected, thresholds, SegmentKind::Label)?,
            ),
            ClassifierRingKind::Annotation => (
                RingType::Annotation,
                contiguous::extract_contiguous_segments(
                    &selected,
                    thresholds,
                    SegmentKind::Segment,
                )?,
            ),
        };
        if data.is_empty() {
            return Err(BrickError::empty_result(format!(
                "No classifier regions passed the thresholds (min_window_score {}, \
                 min_segment_score {}, min_segment_length {}); \
                 the thresholds are likely too strict",
                thresholds.min_window_score,
                thresholds.min_segment_score,
                thresholds.min_segment_length
            )));
        }
        Ok(Self::new(ring_type, reference.cloned(), data, style))
    }

    pub fn classifier_from_file(
        path: &Path,
        format: &SeqNameFormat,
        kind: ClassifierRingKind,
        reference: Option<&Reference>,
        thresholds: &ClassifierThresholds,
        style: &RingStyle,
    ) -> Result<Self> {
        let entries = classifier::parse_classifier_output(path, format)?;
        Self::classifier(&entries, kind, reference, thresholds, style)
    }
}

fn default_sanitize() -> SanitizeOptions {
    SanitizeOptions::default()
}

/// A ring to compute, as submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "ring", rename_all = "lowercase")]
pub enum RingRequest {
    Reference {
        reference: Reference,
        #[serde(default)]
        style: RingStyle,
    },
    Blast {
        path: PathBuf,
        #[serde(default)]
        reference: Option<Reference>,
        #[serde(default)]
        filter: BlastFilter,
        #[serde(default)]
        style: RingStyle,
    },
    Annotation {
        #[serde(default)]
        genbank: Option<PathBuf>,
        #[serde(default)]
        tsv: Option<PathBuf>,
        #[serde(default)]
        feature_types: Vec<String>,
        #[serde(default)]
        reference: Option<Reference>,
        #[serde(default = "default_sanitize")]
        sanitize: SanitizeOptions,
        #[serde(default)]
        style: RingStyle,
    },
    Label {
        #[serde(default)]
        genbank: Option<PathBuf>,
        #[serde(default)]
        tsv: Option<PathBuf>,
        #[serde(default)]
        feature_types: Vec<String>,
        #[serde(default)]
        custom_labels: Vec<CustomLabel>,
        #[serde(default)]
        reference: Option<Reference>,
        #[serde(default = "default_sanitize")]
        sanitize: SanitizeOptions,
        #[serde(default)]
        style: RingStyle,
    },
    #[serde(alias = "genomad")]
    Classifier {
        path: PathBuf,
        #[serde(default)]
        kind: ClassifierRingKind,
        #[serde(default)]
        reference: Option<Reference>,
        #[serde(default)]
        thresholds: ClassifierThresholds,
        #[serde(default)]
        seq_name_format: SeqNameFormat,
        #[serde(default)]
        style: RingStyle,
    },
}

impl RingRequest {
    pub fn reference(&self) -> Option<&Reference> {
        match self {
            RingRequest::Reference { reference, .. } => Some(reference),
            RingRequest::Blast { reference, .. }
            | RingRequest::Annotation { reference, .. }
            | RingRequest::Label { reference, .. }
            | RingRequest::Classifier { reference, .. } => reference.as_ref(),
        }
    }

    /// Checks source selection without reading any file.
    pub fn validate(&self) -> Result<()> {
        match self {
            RingRequest::Reference { .. } => Ok(()),
            RingRequest::Blast { filter, .. } => filter.validate(),
            RingRequest::Annotation {
                genbank,
                tsv,
                feature_types,
                ..
            } => AnnotationSource::select(genbank.clone(), tsv.clone(), feature_types).map(|_| ()),
            RingRequest::Label {
                genbank,
                tsv,
                feature_types,
                custom_labels,
                ..
            } => {
                let file = AnnotationSource::optional(genbank.clone(), tsv.clone(), feature_types)?;
                LabelSource::select(file, custom_labels.clone()).map(|_| ())
            }
            RingRequest::Classifier { thresholds, .. } => thresholds.validate(),
        }
    }

    pub fn build(&self) -> Result<Ring> {
        self.validate()?;
        let ring = match self {
            RingRequest::Reference { reference, style } => Ring::reference(reference, style)?,
            RingRequest::Blast {
                path,
                reference,
                filter,
                style,
            } => Ring::blast_from_file(path, reference.as_ref(), filter, style)?,
            RingRequest::Annotation {
                genbank,
                tsv,
                feature_types,
                reference,
                sanitize,
                style,
            } => {
                let source = AnnotationSource::select(genbank.clone(), tsv.clone(), feature_types)?;
                Ring::annotation(&source, reference.as_ref(), *sanitize, style)?
            }
            RingRequest::Label {
                genbank,
                tsv,
                feature_types,
                custom_labels,
                reference,
                sanitize,
                style,
            } => {
                let file = AnnotationSource::optional(genbank.clone(), tsv.clone(), feature_types)?;
                let source = LabelSource::select(file, custom_labels.clone())?;
                Ring::label(&source, reference.as_ref(), *sanitize, style)?
            }
            RingRequest::Classifier {
                path,
                kind,
                reference,
                thresholds,
                seq_name_format,
                style,
            } => Ring::classifier_from_file(
                path,
                seq_name_format,
                *kind,
                reference.as_ref(),
                thresholds,
                style,
            )?,
        };
        info!(
            "Built {} ring '{}' with {} segments",
            ring.ring_type,
            ring.id,
            ring.data.len()
        );
        Ok(ring)
    }
}
