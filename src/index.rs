//! Index management for rings drawn against the same reference sequence.
//!
//! Rings are partitioned into groups by [`RingGroupKey`]; inside a group
//! the `index` values are dense (`0..n`) and a label ring, if any, sits last.
//! The functions here never touch the ring list they are given. They return
//! an [`IndexPlan`] which the caller applies in one step.

use crate::{
    error::{BrickError, Result},
    ring::{Ring, RingGroupKey, RingId},
};
use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Rings to write back and at most one ring to remove.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexPlan {
    pub upserts: Vec<Ring>,
    pub removed: Option<RingId>,
}

impl IndexPlan {
    pub fn is_noop(&self) -> bool {
        self.upserts.is_empty() && self.removed.is_none()
    }

    pub fn upserted_ids(&self) -> Vec<RingId> {
        self.upserts.iter().map(|ring| ring.id.clone()).collect()
    }

    /// Replaces rings by id, appends rings that are new, then drops the
    /// removed ring.
    pub fn apply_to(&self, rings: &mut Vec<Ring>) {
        for ring in &self.upserts {
            match rings.iter_mut().find(|r| r.id == ring.id) {
                Some(existing) => *existing = ring.clone(),
                None => rings.push(ring.clone()),
            }
        }
        if let Some(removed) = &self.removed {
            rings.retain(|ring| &ring.id != removed);
        }
    }
}

/// Members of the group `key`, ordered by index.
pub fn group<'a>(rings: &'a [Ring], key: Option<&RingGroupKey>) -> Vec<&'a Ring> {
    rings
        .iter()
        .filter(|ring| ring.group_key().as_ref() == key)
        .sorted_by_key(|ring| ring.index)
        .collect()
}

/// Ids of every ring sharing a group with `id`, ordered by index.
pub fn group_ids(rings: &[Ring], id: &str) -> Result<Vec<RingId>> {
    let target = find(rings, id)?;
    Ok(group(rings, target.group_key().as_ref())
        .into_iter()
        .map(|ring| ring.id.clone())
        .collect())
}

fn find<'a>(rings: &'a [Ring], id: &str) -> Result<&'a Ring> {
    rings
        .iter()
        .find(|ring| ring.id == id)
        .ok_or_else(|| BrickError::scope(format!("Ring '{id}' is not present in the session")))
}

/// Adds `ring` to its group. A label ring arriving in a group that already
/// has one is merged into the existing label ring instead.
pub fn insert_ring(rings: &[Ring], ring: Ring) -> Result<IndexPlan> {
    if rings.iter().any(|r| r.id == ring.id) {
        return Err(BrickError::validation(format!(
            "Ring '{}' is already present in the session",
            ring.id
        )));
    }
    let key = ring.group_key();
    let members = group(rings, key.as_ref());
    let existing_label = members.iter().find(|r| r.is_label());

    if let (true, Some(label)) = (ring.is_label(), existing_label) {
        let mut merged = (*label).clone();
        debug!(
            "Merging {} label segments into existing label ring '{}'",
            ring.data.len(),
            merged.id
        );
        merged.data.extend(ring.data);
        return Ok(IndexPlan {
            upserts: vec![merged],
            removed: None,
        });
    }
    Ok(append_ring(&members, ring))
}

/// Places a new ring at the end of `members`, keeping a label ring last.
pub fn append_ring(members: &[&Ring], mut ring: Ring) -> IndexPlan {
    let n = members.len() as i64;
    let existing_label = members.iter().find(|r| r.is_label());
    let mut upserts = vec![];
    match existing_label {
        Some(label) if !ring.is_label() => {
            ring.index = n - 1;
            if label.index != n {
                let mut label = (*label).clone();
                label.index = n;
                upserts.push(label);
            }
        }
        _ => ring.index = n,
    }
    info!("Appending ring '{}' at index {}", ring.id, ring.index);
    upserts.insert(0, ring);
    IndexPlan {
        upserts,
        removed: None,
    }
}

/// Resolves `index_group` to rings of the target's group, ordered by index.
fn scoped_subset<'a>(rings: &'a [Ring], index_group: &[RingId], id: &str) -> Result<Vec<&'a Ring>> {
    let target = find(rings, id)?;
    if !index_group.iter().any(|member| member == id) {
        return Err(BrickError::scope(format!(
            "Ring '{id}' is not part of the given index group"
        )));
    }
    let mut seen = HashSet::new();
    let mut subset = vec![];
    for member in index_group {
        if !seen.insert(member.as_str()) {
            continue;
        }
        let ring = find(rings, member)?;
        if !ring.same_group(target) {
            return Err(BrickError::scope(format!(
                "Ring '{member}' is drawn against a different reference than ring '{id}'"
            )));
        }
        subset.push(ring);
    }
    subset.sort_by_key(|ring| ring.index);
    Ok(subset)
}

fn renormalize(subset: &mut [Ring]) {
    subset.sort_by_key(|ring| ring.index);
    for (i, ring) in subset.iter_mut().enumerate() {
        ring.index = i as i64;
    }
}

/// Moves ring `id` to position `index` among the rings named in
/// `index_group`. Rings outside the scope are not touched.
pub fn reorder_ring(
    rings: &[Ring],
    index_group: &[RingId],
    id: &str,
    index: usize,
) -> Result<IndexPlan> {
    let subset = scoped_subset(rings, index_group, id)?;
    let m = subset.len() as i64;
    let has_label = subset.iter().any(|ring| ring.is_label());
    let mut subset: Vec<Ring> = subset.into_iter().cloned().collect();
    let Some(position) = subset.iter().position(|ring| ring.id == id) else {
        return Err(BrickError::scope(format!("Ring '{id}' is not part of the index group")));
    };

    let mut new = i64::try_from(index).unwrap_or(i64::MAX).min(m - 1);
    if subset[position].is_label() {
        new = m - 1;
    } else if has_label && new >= m - 1 {
        new = m - 2;
    }
    let cur = subset[position].index;
    if cur == new {
        debug!("Ring '{id}' already at index {new}");
        return Ok(IndexPlan::default());
    }

    for (i, ring) in subset.iter_mut().enumerate() {
        if i == position {
            continue;
        }
        if new > cur && ring.index > cur && ring.index <= new {
            ring.index -= 1;
        } else if new < cur && ring.index >= new {
            ring.index += 1;
        }
    }
    subset[position].index = new;
    renormalize(&mut subset);
    info!("Moved ring '{id}' from index {cur} to {new}");
    Ok(IndexPlan {
        upserts: subset,
        removed: None,
    })
}

/// Removes ring `id` and closes the gap among the remaining members of
/// `index_group`. Group members outside `index_group` keep their index.
pub fn delete_ring(rings: &[Ring], index_group: &[RingId], id: &str) -> Result<IndexPlan> {
    let subset = scoped_subset(rings, index_group, id)?;
    let mut remaining: Vec<Ring> = subset
        .into_iter()
        .filter(|ring| ring.id != id)
        .cloned()
        .collect();
    renormalize(&mut remaining);
    info!(
        "Deleted ring '{id}', reindexed {} remaining rings",
        remaining.len()
    );
    Ok(IndexPlan {
        upserts: remaining,
        removed: Some(id.to_string()),
    })
}

/// Reports the first group whose indices are not exactly `0..n`, or whose
/// label ring is not last.
pub fn check_group_invariants(rings: &[Ring]) -> Result<()> {
    let mut groups: BTreeMap<Option<RingGroupKey>, Vec<&Ring>> = BTreeMap::new();
    for ring in rings {
        groups.entry(ring.group_key()).or_default().push(ring);
    }
    for (key, members) in groups {
        let name = key.map_or_else(|| "unreferenced".to_string(), |k| k.to_string());
        let n = members.len() as i64;
        let indices: Vec<i64> = members.iter().map(|ring| ring.index).sorted().collect();
        if indices != (0..n).collect::<Vec<i64>>() {
            return Err(BrickError::internal(format!(
                "Ring group {name} has indices {indices:?}, expected 0..{n}"
            )));
        }
        let labels: Vec<&&Ring> = members.iter().filter(|ring| ring.is_label()).collect();
        if labels.len() > 1 {
            return Err(BrickError::internal(format!(
                "Ring group {name} has {} label rings",
                labels.len()
            )));
        }
        if let Some(label) = labels.first() {
            if label.index != n - 1 {
                return Err(BrickError::internal(format!(
                    "Label ring '{}' of group {name} is at index {}, expected {}",
                    label.id,
                    label.index,
                    n - 1
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RingStyle,
        error::ErrorCode,
        ring::{Reference, RingType},
        segment::Segment,
    };

    fn reference(sequence_id: &str) -> Reference {
        Reference::new("session", "ref1", sequence_id, 1000)
    }

    fn ring(id: &str, index: i64, label: bool) -> Ring {
        let ring_type = if label { RingType::Label } else { RingType::Blast };
        let mut ring = Ring::new(ring_type, Some(reference("seq1")), vec![], &RingStyle::default());
        ring.id = id.to_string();
        ring.index = index;
        ring
    }

    fn ids(names: &[&str]) -> Vec<RingId> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn indices(rings: &[Ring]) -> Vec<(String, i64)> {
        rings
            .iter()
            .sorted_by_key(|r| r.index)
            .map(|r| (r.id.clone(), r.index))
            .collect()
    }

    fn apply(rings: &mut Vec<Ring>, plan: IndexPlan) {
        plan.apply_to(rings);
    }

    fn pairs(names: &[(&str, i64)]) -> Vec<(String, i64)> {
        names.iter().map(|(n, i)| (n.to_string(), *i)).collect()
    }

    #[test]
    fn test_append_to_empty_group() {
        let mut rings = vec![];
        let plan = insert_ring(&rings, ring("A", -1, false)).unwrap();
        apply(&mut rings, plan);
        assert_eq!(indices(&rings), pairs(&[("A", 0)]));
    }

    #[test]
    fn test_append_pushes_label_ring_last() {
        let mut rings = vec![ring("A", 0, false), ring("L", 1, true)];
        let plan = insert_ring(&rings, ring("B", -1, false)).unwrap();
        assert_eq!(plan.upserts.len(), 2);
        apply(&mut rings, plan);
        assert_eq!(indices(&rings), pairs(&[("A", 0), ("B", 1), ("L", 2)]));
        check_group_invariants(&rings).unwrap();
    }

    #[test]
    fn test_append_label_ring_goes_last() {
        let mut rings = vec![ring("A", 0, false), ring("B", 1, false)];
        let plan = insert_ring(&rings, ring("L", -1, true)).unwrap();
        apply(&mut rings, plan);
        assert_eq!(indices(&rings), pairs(&[("A", 0), ("B", 1), ("L", 2)]));
    }

    #[test]
    fn test_groups_are_independent() {
        let mut rings = vec![ring("A", 0, false), ring("L", 1, true)];
        let mut other = ring("X", -1, false);
        other.reference = Some(reference("seq2"));
        let plan = insert_ring(&rings, other).unwrap();
        assert_eq!(plan.upserts.len(), 1);
        apply(&mut rings, plan);
        assert_eq!(rings.iter().find(|r| r.id == "X").unwrap().index, 0);
        assert_eq!(rings.iter().find(|r| r.id == "L").unwrap().index, 1);
        check_group_invariants(&rings).unwrap();
    }

    #[test]
    fn test_unreferenced_rings_form_their_own_group() {
        let mut rings = vec![ring("A", 0, false)];
        let loose = Ring::new(RingType::Generic, None, vec![], &RingStyle::default());
        let loose_id = loose.id.clone();
        let plan = insert_ring(&rings, loose).unwrap();
        apply(&mut rings, plan);
        assert_eq!(rings.iter().find(|r| r.id == loose_id).unwrap().index, 0);
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let rings = vec![ring("A", 0, false)];
        assert!(insert_ring(&rings, ring("A", -1, false)).is_err());
    }

    #[test]
    fn test_label_ring_merge_on_insert() {
        let mut label = ring("L", 2, true);
        label.data = vec![Segment::label(0, 1, "a").unwrap(), Segment::label(1, 2, "b").unwrap()];
        let mut rings = vec![ring("A", 0, false), ring("B", 1, false), label];

        let mut incoming = ring("N", -1, true);
        incoming.data = (0..3)
            .map(|i| Segment::label(i, i + 1, format!("new {i}")).unwrap())
            .collect();
        let plan = insert_ring(&rings, incoming).unwrap();
        assert_eq!(plan.upserted_ids(), ids(&["L"]));
        apply(&mut rings, plan);

        assert_eq!(rings.len(), 3);
        let label = rings.iter().find(|r| r.id == "L").unwrap();
        assert_eq!(label.data.len(), 5);
        assert_eq!(label.index, 2);
        assert_eq!(indices(&rings), pairs(&[("A", 0), ("B", 1), ("L", 2)]));
    }

    #[test]
    fn test_reorder_clamps_before_label_ring() {
        let mut rings = vec![ring("A", 0, false), ring("B", 1, false), ring("C", 2, true)];
        let plan = reorder_ring(&rings, &ids(&["A", "B", "C"]), "A", 2).unwrap();
        apply(&mut rings, plan);
        assert_eq!(indices(&rings), pairs(&[("B", 0), ("A", 1), ("C", 2)]));
    }

    #[test]
    fn test_reorder_backward() {
        let mut rings = vec![
            ring("A", 0, false),
            ring("B", 1, false),
            ring("C", 2, false),
            ring("D", 3, false),
        ];
        let plan = reorder_ring(&rings, &ids(&["A", "B", "C", "D"]), "D", 1).unwrap();
        apply(&mut rings, plan);
        assert_eq!(
            indices(&rings),
            pairs(&[("A", 0), ("D", 1), ("B", 2), ("C", 3)])
        );
    }

    #[test]
    fn test_reorder_forward_without_label() {
        let mut rings = vec![ring("A", 0, false), ring("B", 1, false), ring("C", 2, false)];
        let plan = reorder_ring(&rings, &ids(&["A", "B", "C"]), "A", 2).unwrap();
        apply(&mut rings, plan);
        assert_eq!(indices(&rings), pairs(&[("B", 0), ("C", 1), ("A", 2)]));
    }

    #[test]
    fn test_reorder_to_current_index_is_noop() {
        let rings = vec![ring("A", 0, false), ring("B", 1, false), ring("L", 2, true)];
        assert!(reorder_ring(&rings, &ids(&["A", "B", "L"]), "B", 1).unwrap().is_noop());
        // index 2 is clamped to 1
        assert!(reorder_ring(&rings, &ids(&["A", "B", "L"]), "B", 2).unwrap().is_noop());
    }

    #[test]
    fn test_reorder_label_ring_stays_last() {
        let rings = vec![ring("A", 0, false), ring("B", 1, false), ring("L", 2, true)];
        let plan = reorder_ring(&rings, &ids(&["A", "B", "L"]), "L", 0).unwrap();
        assert!(plan.is_noop());
    }

    #[test]
    fn test_reorder_index_beyond_group_is_clamped() {
        let mut rings = vec![ring("A", 0, false), ring("B", 1, false)];
        let plan = reorder_ring(&rings, &ids(&["A", "B"]), "A", 99).unwrap();
        apply(&mut rings, plan);
        assert_eq!(indices(&rings), pairs(&[("B", 0), ("A", 1)]));
    }

    #[test]
    fn test_reorder_index_above_i64_range_is_clamped() {
        let mut rings = vec![
            ring("A", 0, false),
            ring("B", 1, false),
            ring("C", 2, false),
        ];
        let plan = reorder_ring(&rings, &ids(&["A", "B", "C"]), "A", usize::MAX).unwrap();
        apply(&mut rings, plan);
        assert_eq!(indices(&rings), pairs(&[("B", 0), ("C", 1), ("A", 2)]));
    }

    #[test]
    fn test_reorder_leaves_rings_outside_scope_untouched() {
        let rings = vec![
            ring("A", 0, false),
            ring("B", 1, false),
            ring("C", 2, false),
        ];
        let plan = reorder_ring(&rings, &ids(&["A", "B"]), "A", 1).unwrap();
        assert_eq!(plan.upserted_ids().len(), 2);
        assert!(!plan.upserted_ids().contains(&"C".to_string()));
    }

    #[test]
    fn test_reorder_scope_errors() {
        let mut other = ring("X", 0, false);
        other.reference = Some(reference("seq2"));
        let rings = vec![ring("A", 0, false), ring("B", 1, false), other];

        let err = reorder_ring(&rings, &ids(&["A", "B"]), "missing", 0).unwrap_err();
        assert!(err.is(ErrorCode::Scope));
        let err = reorder_ring(&rings, &ids(&["A", "B", "ghost"]), "A", 1).unwrap_err();
        assert!(err.is(ErrorCode::Scope));
        let err = reorder_ring(&rings, &ids(&["B"]), "A", 1).unwrap_err();
        assert!(err.is(ErrorCode::Scope));
        let err = reorder_ring(&rings, &ids(&["A", "B", "X"]), "A", 1).unwrap_err();
        assert!(err.is(ErrorCode::Scope));
    }

    #[test]
    fn test_delete_closes_gap() {
        let mut rings = vec![ring("A", 0, false), ring("B", 1, false), ring("C", 2, true)];
        let plan = delete_ring(&rings, &ids(&["A", "B", "C"]), "B").unwrap();
        assert_eq!(plan.removed.as_deref(), Some("B"));
        apply(&mut rings, plan);
        assert_eq!(indices(&rings), pairs(&[("A", 0), ("C", 1)]));
        check_group_invariants(&rings).unwrap();
    }

    #[test]
    fn test_delete_only_renormalizes_the_given_scope() {
        let mut rings = vec![
            ring("A", 0, false),
            ring("B", 1, false),
            ring("C", 2, false),
            ring("D", 3, false),
        ];
        let plan = delete_ring(&rings, &ids(&["A", "B"]), "A").unwrap();
        apply(&mut rings, plan);
        assert_eq!(indices(&rings), pairs(&[("B", 0), ("C", 2), ("D", 3)]));
        assert!(check_group_invariants(&rings).is_err());
    }

    #[test]
    fn test_delete_scope_errors() {
        let rings = vec![ring("A", 0, false), ring("B", 1, false)];
        let err = delete_ring(&rings, &ids(&["A", "B"]), "Z").unwrap_err();
        assert!(err.is(ErrorCode::Scope));
        let err = delete_ring(&rings, &ids(&["A"]), "B").unwrap_err();
        assert!(err.is(ErrorCode::Scope));
    }

    #[test]
    fn test_invariants_hold_across_mixed_operations() {
        let mut rings: Vec<Ring> = vec![];
        for i in 0..6 {
            let label = i == 2;
            let plan = insert_ring(&rings, ring(&format!("R{i}"), -1, label)).unwrap();
            apply(&mut rings, plan);
            check_group_invariants(&rings).unwrap();
        }
        assert_eq!(rings.len(), 6);
        for step in 0..20usize {
            let group = group_ids(&rings, "R0").unwrap();
            let target = group[step % group.len()].clone();
            let index = (step * 7) % (group.len() + 1);
            let plan = reorder_ring(&rings, &group, &target, index).unwrap();
            apply(&mut rings, plan);
            check_group_invariants(&rings).unwrap();
        }
        for name in ["R3", "R2", "R5"] {
            let group = group_ids(&rings, name).unwrap();
            let plan = delete_ring(&rings, &group, name).unwrap();
            apply(&mut rings, plan);
            check_group_invariants(&rings).unwrap();
        }
        assert_eq!(rings.len(), 3);
        let plan = insert_ring(&rings, ring("L2", -1, true)).unwrap();
        apply(&mut rings, plan);
        check_group_invariants(&rings).unwrap();
        assert_eq!(rings.iter().find(|r| r.id == "L2").unwrap().index, 3);
    }

    #[test]
    fn test_invariant_check_reports_label_not_last() {
        let rings = vec![ring("L", 0, true), ring("A", 1, false)];
        let err = check_group_invariants(&rings).unwrap_err();
        assert!(err.message.contains("Label ring"));
    }
}
