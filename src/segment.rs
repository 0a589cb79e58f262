//! Segment records: one drawable arc on a ring.
//!
//! Coordinates are 0-based and half-open (`[start, end)`) for every variant,
//! whatever the parser they came from.

use crate::{
    classifier::PredictionClass,
    error::{BrickError, Result},
};
use serde::{Deserialize, Deserializer, Serialize, de};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Segment,
    Label,
    Classifier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlainSegment {
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSegment {
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub text: String,
    pub label_identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_angle: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_opacity: Option<f64>,
}

/// Partial update of the visual style of a label segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LabelStylePatch {
    pub line_length: Option<f64>,
    pub line_width: Option<f64>,
    pub line_opacity: Option<f64>,
    pub line_angle: Option<f64>,
    pub line_color: Option<String>,
    pub text_size: Option<f64>,
    pub text_color: Option<String>,
    pub text_opacity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSegment {
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub text: String,
    pub chromosome: f64,
    pub plasmid: f64,
    pub virus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "segment_type", rename_all = "lowercase")]
pub enum Segment {
    #[serde(rename = "segment")]
    Plain(PlainSegment),
    Label(LabelSegment),
    Classifier(ClassifierSegment),
}

fn check_range(start: usize, end: usize) -> Result<()> {
    if start > end {
        return Err(BrickError::validation(format!(
            "Segment start ({start}) must not be greater than end ({end})"
        )));
    }
    Ok(())
}

fn check_score(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(BrickError::validation(format!(
            "{name} score must be between 0 and 1, found {value}"
        )));
    }
    Ok(())
}

impl PlainSegment {
    pub fn new(start: usize, end: usize, text: impl Into<String>) -> Result<Self> {
        check_range(start, end)?;
        Ok(Self {
            start,
            end,
            text: text.into(),
        })
    }
}

impl LabelSegment {
    /// Creates a label segment with a fresh identifier and no style overrides.
    pub fn new(start: usize, end: usize, text: impl Into<String>) -> Result<Self> {
        check_range(start, end)?;
        Ok(Self {
            start,
            end,
            text: text.into(),
            label_identifier: Uuid::new_v4().to_string(),
            line_length: None,
            line_width: None,
            line_opacity: None,
            line_angle: None,
            line_color: None,
            text_size: None,
            text_color: None,
            text_opacity: None,
        })
    }

    pub fn apply_style(&mut self, patch: &LabelStylePatch) {
        let patch = patch.clone();
        if patch.line_length.is_some() {
            self.line_length = patch.line_length;
        }
        if patch.line_width.is_some() {
            self.line_width = patch.line_width;
        }
        if patch.line_opacity.is_some() {
            self.line_opacity = patch.line_opacity;
        }
        if patch.line_angle.is_some() {
            self.line_angle = patch.line_angle;
        }
        if patch.line_color.is_some() {
            self.line_color = patch.line_color;
        }
        if patch.text_size.is_some() {
            self.text_size = patch.text_size;
        }
        if patch.text_color.is_some() {
            self.text_color = patch.text_color;
        }
        if patch.text_opacity.is_some() {
            self.text_opacity = patch.text_opacity;
        }
    }
}

impl ClassifierSegment {
    pub fn new(
        start: usize,
        end: usize,
        text: impl Into<String>,
        chromosome: f64,
        plasmid: f64,
        virus: f64,
    ) -> Result<Self> {
        check_range(start, end)?;
        check_score("Chromosome", chromosome)?;
        check_score("Plasmid", plasmid)?;
        check_score("Virus", virus)?;
        Ok(Self {
            start,
            end,
            text: text.into(),
            chromosome,
            plasmid,
            virus,
        })
    }

    pub fn score(&self, class: PredictionClass) -> f64 {
        match class {
            PredictionClass::Chromosome => self.chromosome,
            PredictionClass::Plasmid => self.plasmid,
            PredictionClass::Virus => self.virus,
        }
    }
}

impl Segment {
    pub fn plain(start: usize, end: usize, text: impl Into<String>) -> Result<Self> {
        Ok(Segment::Plain(PlainSegment::new(start, end, text)?))
    }

    pub fn label(start: usize, end: usize, text: impl Into<String>) -> Result<Self> {
        Ok(Segment::Label(LabelSegment::new(start, end, text)?))
    }

    pub fn kind(&self) -> SegmentKind {
        match self {
            Segment::Plain(_) => SegmentKind::Segment,
            Segment::Label(_) => SegmentKind::Label,
            Segment::Classifier(_) => SegmentKind::Classifier,
        }
    }

    pub fn start(&self) -> usize {
        match self {
            Segment::Plain(s) => s.start,
            Segment::Label(s) => s.start,
            Segment::Classifier(s) => s.start,
        }
    }

    pub fn end(&self) -> usize {
        match self {
            Segment::Plain(s) => s.end,
            Segment::Label(s) => s.end,
            Segment::Classifier(s) => s.end,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Segment::Plain(s) => &s.text,
            Segment::Label(s) => &s.text,
            Segment::Classifier(s) => &s.text,
        }
    }

    pub fn len(&self) -> usize {
        self.end() - self.start()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_label_mut(&mut self) -> Option<&mut LabelSegment> {
        match self {
            Segment::Label(s) => Some(s),
            _ => None,
        }
    }

    pub fn label_identifier(&self) -> Option<&str> {
        match self {
            Segment::Label(s) => Some(&s.label_identifier),
            _ => None,
        }
    }
}

impl From<PlainSegment> for Segment {
    fn from(s: PlainSegment) -> Self {
        Segment::Plain(s)
    }
}

impl From<LabelSegment> for Segment {
    fn from(s: LabelSegment) -> Self {
        Segment::Label(s)
    }
}

impl From<ClassifierSegment> for Segment {
    fn from(s: ClassifierSegment) -> Self {
        Segment::Classifier(s)
    }
}

/// Storage form of a segment. Documents written by older clients lack the
/// `segment_type` discriminator, so the variant is then inferred from the
/// variant-only fields.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSegment {
    #[serde(default, rename = "segment_type")]
    segment_type: Option<SegmentKind>,
    start: usize,
    end: usize,
    #[serde(default)]
    text: String,
    #[serde(default)]
    label_identifier: Option<String>,
    #[serde(default)]
    line_length: Option<f64>,
    #[serde(default)]
    line_width: Option<f64>,
    #[serde(default)]
    line_opacity: Option<f64>,
    #[serde(default)]
    line_angle: Option<f64>,
    #[serde(default)]
    line_color: Option<String>,
    #[serde(default)]
    text_size: Option<f64>,
    #[serde(default)]
    text_color: Option<String>,
    #[serde(default)]
    text_opacity: Option<f64>,
    #[serde(default)]
    chromosome: Option<f64>,
    #[serde(default)]
    plasmid: Option<f64>,
    #[serde(default)]
    virus: Option<f64>,
}

impl StoredSegment {
    fn inferred_kind(&self) -> SegmentKind {
        if self.label_identifier.is_some() {
            SegmentKind::Label
        } else if self.chromosome.is_some() || self.plasmid.is_some() || self.virus.is_some() {
            SegmentKind::Classifier
        } else {
            SegmentKind::Segment
        }
    }
}

impl TryFrom<StoredSegment> for Segment {
    type Error = BrickError;

    fn try_from(stored: StoredSegment) -> Result<Self> {
        check_range(stored.start, stored.end)?;
        let kind = stored.segment_type.unwrap_or_else(|| stored.inferred_kind());
        let segment = match kind {
            SegmentKind::Segment => Segment::Plain(PlainSegment {
                start: stored.start,
                end: stored.end,
                text: stored.text,
            }),
            SegmentKind::Label => Segment::Label(LabelSegment {
                start: stored.start,
                end: stored.end,
                text: stored.text,
                label_identifier: stored.label_identifier.ok_or_else(|| {
                    BrickError::validation("Label segment is missing its labelIdentifier")
                })?,
                line_length: stored.line_length,
                line_width: stored.line_width,
                line_opacity: stored.line_opacity,
                line_angle: stored.line_angle,
                line_color: stored.line_color,
                text_size: stored.text_size,
                text_color: stored.text_color,
                text_opacity: stored.text_opacity,
            }),
            SegmentKind::Classifier => Segment::Classifier(ClassifierSegment::new(
                stored.start,
                stored.end,
                stored.text,
                stored.chromosome.unwrap_or(0.0),
                stored.plasmid.unwrap_or(0.0),
                stored.virus.unwrap_or(0.0),
            )?),
        };
        Ok(segment)
    }
}

impl<'de> Deserialize<'de> for Segment {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let stored = StoredSegment::deserialize(deserializer)?;
        Segment::try_from(stored).map_err(|e| de::Error::custom(e.message))
    }
}
