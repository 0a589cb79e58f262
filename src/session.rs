//! The session document: uploaded files plus every ring of every reference.

use crate::{
    error::{BrickError, ErrorCode, Result},
    file_validation::SessionFile,
    index::{self, IndexPlan},
    ring::{Ring, RingGroupKey},
    sanitize::sanitize_text,
    segment::LabelStylePatch,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, io::Write, path::Path};
use tempfile::NamedTempFile;
use uuid::Uuid;

pub(crate) fn now_unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// Creation time in milliseconds since the Unix epoch
    #[serde(default)]
    pub date: u64,
    #[serde(default)]
    pub files: Vec<SessionFile>,
    #[serde(default)]
    pub rings: Vec<Ring>,
}

/// Partial update of ring presentation. The index is never patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingPatch {
    pub visible: Option<bool>,
    pub color: Option<String>,
    pub height: Option<u32>,
    pub title: Option<String>,
}

impl RingPatch {
    pub fn is_empty(&self) -> bool {
        self.visible.is_none()
            && self.color.is_none()
            && self.height.is_none()
            && self.title.is_none()
    }
}

impl Session {
    pub fn new(id: Option<String>) -> Self {
        Self {
            id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            date: now_unix_ms(),
            files: vec![],
            rings: vec![],
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            BrickError::new(
                ErrorCode::Io,
                format!("Could not read session file '{}': {e}", path.display()),
            )
        })?;
        serde_json::from_str(&text).map_err(|e| {
            BrickError::validation(format!(
                "Could not parse session JSON '{}': {e}",
                path.display()
            ))
        })
    }

    /// Writes the session next to `path` and renames it into place.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| BrickError::internal(format!("Could not serialize session: {e}")))?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(text.as_bytes())?;
        tmp.persist(path).map_err(|e| {
            BrickError::new(
                ErrorCode::Io,
                format!("Could not write session file '{}': {}", path.display(), e.error),
            )
        })?;
        Ok(())
    }

    pub fn ring(&self, id: &str) -> Result<&Ring> {
        self.rings
            .iter()
            .find(|ring| ring.id == id)
            .ok_or_else(|| {
                BrickError::not_found(format!("Ring '{id}' not found in session '{}'", self.id))
            })
    }

    fn ring_mut(&mut self, id: &str) -> Result<&mut Ring> {
        let session_id = self.id.clone();
        self.rings
            .iter_mut()
            .find(|ring| ring.id == id)
            .ok_or_else(|| {
                BrickError::not_found(format!("Ring '{id}' not found in session '{session_id}'"))
            })
    }

    pub fn group(&self, key: Option<&RingGroupKey>) -> Vec<&Ring> {
        index::group(&self.rings, key)
    }

    pub fn group_keys(&self) -> Vec<Option<RingGroupKey>> {
        let mut keys: Vec<Option<RingGroupKey>> = self.rings.iter().map(Ring::group_key).collect();
        keys.sort();
        keys.dedup();
        keys
    }

    pub fn file(&self, id: &str) -> Option<&SessionFile> {
        self.files.iter().find(|file| file.id == id)
    }

    pub fn add_file(&mut self, file: SessionFile) -> Result<()> {
        if self.file(&file.id).is_some() {
            return Err(BrickError::validation(format!(
                "File '{}' is already part of session '{}'",
                file.id, self.id
            )));
        }
        self.files.push(file);
        Ok(())
    }

    pub fn patch_ring(&mut self, id: &str, patch: &RingPatch) -> Result<&Ring> {
        let ring = self.ring_mut(id)?;
        if let Some(visible) = patch.visible {
            ring.visible = visible;
        }
        if let Some(color) = &patch.color {
            ring.color = sanitize_text(color);
        }
        if let Some(height) = patch.height {
            ring.height = height;
        }
        if let Some(title) = &patch.title {
            ring.title = sanitize_text(title);
        }
        Ok(&*ring)
    }

    /// Updates the style of one label segment in place.
    pub fn update_label_segment(
        &mut self,
        ring_id: &str,
        label_identifier: &str,
        patch: &LabelStylePatch,
    ) -> Result<&Ring> {
        let ring = self.ring_mut(ring_id)?;
        let label = ring
            .data
            .iter_mut()
            .filter_map(|segment| segment.as_label_mut())
            .find(|label| label.label_identifier == label_identifier)
            .ok_or_else(|| {
                BrickError::not_found(format!(
                    "Label '{label_identifier}' not found in ring '{ring_id}'"
                ))
            })?;
        label.apply_style(patch);
        Ok(&*ring)
    }

    pub fn apply_plan(&mut self, plan: &IndexPlan) {
        plan.apply_to(&mut self.rings);
    }

    /// Checks ring id uniqueness and the per-group index invariants.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for ring in &self.rings {
            if !seen.insert(ring.id.as_str()) {
                return Err(BrickError::internal(format!(
                    "Ring id '{}' appears more than once in session '{}'",
                    ring.id, self.id
                )));
            }
        }
        index::check_group_invariants(&self.rings)
    }
}
