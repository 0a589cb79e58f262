//! Operations on a session, applied one at a time and journaled.

use crate::{
    error::{BrickError, Result},
    file_validation::{self, FileFormat, FileType},
    index::{self, IndexPlan},
    ring::{CustomLabel, RingId, RingRequest},
    sanitize::SanitizeOptions,
    segment::LabelStylePatch,
    session::{RingPatch, Session},
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub type OpId = String;
pub type RunId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    AddRing {
        request: RingRequest,
    },
    /// Moves a ring within `index_group`, or within its whole group when no
    /// scope is given.
    Reorder {
        #[serde(default)]
        index_group: Option<Vec<RingId>>,
        id: RingId,
        index: usize,
    },
    Delete {
        #[serde(default)]
        index_group: Option<Vec<RingId>>,
        id: RingId,
    },
    PatchRing {
        id: RingId,
        patch: RingPatch,
    },
    AddLabels {
        ring_id: RingId,
        labels: Vec<CustomLabel>,
    },
    UpdateLabel {
        ring_id: RingId,
        label_identifier: String,
        patch: LabelStylePatch,
    },
    AddFile {
        path: String,
        format: FileFormat,
        file_type: FileType,
        #[serde(default)]
        original_name: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub run_id: RunId,
    pub ops: Vec<Operation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpResult {
    pub op_id: OpId,
    pub created_ring_ids: Vec<RingId>,
    pub changed_ring_ids: Vec<RingId>,
    pub removed_ring_ids: Vec<RingId>,
    pub warnings: Vec<String>,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub run_id: RunId,
    pub op: Operation,
    pub result: OpResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    pub protocol_version: String,
    pub supported_operations: Vec<String>,
    pub supported_rings: Vec<String>,
}

pub trait Engine {
    fn apply(&mut self, op: Operation) -> Result<OpResult>;
    fn apply_workflow(&mut self, wf: Workflow) -> Result<Vec<OpResult>>;
    fn snapshot(&self) -> &Session;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrickEngine {
    session: Session,
    journal: Vec<OperationRecord>,
    op_counter: u64,
}

impl Default for BrickEngine {
    fn default() -> Self {
        Self::from_session(Session::new(None))
    }
}

impl BrickEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_session(session: Session) -> Self {
        Self {
            session,
            journal: vec![],
            op_counter: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    pub fn capabilities() -> Capabilities {
        Capabilities {
            protocol_version: "v1".to_string(),
            supported_operations: [
                "AddRing",
                "Reorder",
                "Delete",
                "PatchRing",
                "AddLabels",
                "UpdateLabel",
                "AddFile",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            supported_rings: ["reference", "blast", "annotation", "label", "classifier"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn operation_log(&self) -> &[OperationRecord] {
        &self.journal
    }

    fn next_op_id(&mut self) -> OpId {
        self.op_counter += 1;
        format!("op-{}", self.op_counter)
    }

    fn scope(session: &Session, index_group: Option<Vec<RingId>>, id: &str) -> Result<Vec<RingId>> {
        match index_group {
            Some(group) => Ok(group),
            None => index::group_ids(&session.rings, id),
        }
    }

    fn record_plan(result: &mut OpResult, plan: &IndexPlan, created: Option<&str>) {
        for ring_id in plan.upserted_ids() {
            if Some(ring_id.as_str()) == created {
                result.created_ring_ids.push(ring_id);
            } else {
                result.changed_ring_ids.push(ring_id);
            }
        }
        if let Some(removed) = &plan.removed {
            result.removed_ring_ids.push(removed.clone());
        }
    }

    /// Runs `op` against a copy of the session so a failing operation leaves
    /// the session untouched.
    fn apply_internal(&mut self, op: Operation) -> Result<OpResult> {
        let mut draft = self.session.clone();
        let mut result = OpResult {
            op_id: self.next_op_id(),
            ..Default::default()
        };

        match op {
            Operation::AddRing { request } => {
                if let Some(reference) = request.reference() {
                    if !reference.session_id.is_empty() && reference.session_id != draft.id {
                        result.warnings.push(format!(
                            "Reference belongs to session '{}', not '{}'",
                            reference.session_id, draft.id
                        ));
                    }
                }
                let ring = request.build()?;
                let ring_id = ring.id.clone();
                let ring_type = ring.ring_type;
                let plan = index::insert_ring(&draft.rings, ring)?;
                draft.apply_plan(&plan);
                Self::record_plan(&mut result, &plan, Some(ring_id.as_str()));
                if result.created_ring_ids.is_empty() {
                    result.messages.push(format!(
                        "Merged new labels into existing label ring '{}'",
                        result.changed_ring_ids.join(", ")
                    ));
                } else {
                    result
                        .messages
                        .push(format!("Added {ring_type} ring '{ring_id}'"));
                }
            }
            Operation::Reorder {
                index_group,
                id,
                index,
            } => {
                let group = Self::scope(&draft, index_group, &id)?;
                let plan = index::reorder_ring(&draft.rings, &group, &id, index)?;
                if plan.is_noop() {
                    result
                        .messages
                        .push(format!("Ring '{id}' is already at its requested position"));
                } else {
                    draft.apply_plan(&plan);
                    Self::record_plan(&mut result, &plan, None);
                    result.messages.push(format!("Reordered ring '{id}'"));
                    if let Err(e) = index::check_group_invariants(&draft.rings) {
                        warn!("Ring group left uneven after moving '{id}': {}", e.message);
                        result.warnings.push(e.message);
                    }
                }
            }
            Operation::Delete { index_group, id } => {
                let group = Self::scope(&draft, index_group, &id)?;
                let plan = index::delete_ring(&draft.rings, &group, &id)?;
                draft.apply_plan(&plan);
                Self::record_plan(&mut result, &plan, None);
                result.messages.push(format!("Deleted ring '{id}'"));
                if let Err(e) = index::check_group_invariants(&draft.rings) {
                    warn!("Ring group left uneven after deleting '{id}': {}", e.message);
                    result.warnings.push(e.message);
                }
            }
            Operation::PatchRing { id, patch } => {
                if patch.is_empty() {
                    return Err(BrickError::validation(format!(
                        "Patch for ring '{id}' does not change anything"
                    )));
                }
                draft.patch_ring(&id, &patch)?;
                result.changed_ring_ids.push(id.clone());
                result.messages.push(format!("Updated ring '{id}'"));
            }
            Operation::AddLabels { ring_id, labels } => {
                let mut ring = draft.ring(&ring_id)?.clone();
                let added = ring.add_custom_labels(&labels, SanitizeOptions::default())?;
                let plan = IndexPlan {
                    upserts: vec![ring],
                    removed: None,
                };
                draft.apply_plan(&plan);
                result.changed_ring_ids.push(ring_id.clone());
                result
                    .messages
                    .push(format!("Added {} labels to ring '{ring_id}'", added.len()));
            }
            Operation::UpdateLabel {
                ring_id,
                label_identifier,
                patch,
            } => {
                draft.update_label_segment(&ring_id, &label_identifier, &patch)?;
                result.changed_ring_ids.push(ring_id.clone());
                result.messages.push(format!(
                    "Updated label '{label_identifier}' of ring '{ring_id}'"
                ));
            }
            Operation::AddFile {
                path,
                format,
                file_type,
                original_name,
            } => {
                let file = file_validation::validate_file(
                    Path::new(&path),
                    format,
                    file_type,
                    original_name.as_deref(),
                )?;
                result.messages.push(format!(
                    "Added {format} file '{}' with {} records",
                    file.name, file.records
                ));
                draft.add_file(file)?;
            }
        }

        self.session = draft;
        info!("{}: {}", result.op_id, result.messages.join("; "));
        Ok(result)
    }
}

impl Engine for BrickEngine {
    fn apply(&mut self, op: Operation) -> Result<OpResult> {
        let run_id = "interactive".to_string();
        let result = self.apply_internal(op.clone())?;
        self.journal.push(OperationRecord {
            run_id,
            op,
            result: result.clone(),
        });
        Ok(result)
    }

    fn apply_workflow(&mut self, wf: Workflow) -> Result<Vec<OpResult>> {
        let mut results = Vec::new();
        for op in &wf.ops {
            let result = self.apply_internal(op.clone())?;
            self.journal.push(OperationRecord {
                run_id: wf.run_id.clone(),
                op: op.clone(),
                result: result.clone(),
            });
            results.push(result);
        }
        Ok(results)
    }

    fn snapshot(&self) -> &Session {
        &self.session
    }
}
