//! Element reconciliation for translation updates.
//!
//! Reconciliation runs in two phases. [`plan`] is pure: it rebuilds the
//! element array from the request and computes which stored media keys are
//! no longer referenced. [`sweep`] deletes those keys through the file
//! gateway and reports per-key outcomes. Callers persist the planned
//! elements before sweeping, so a key still referenced by stored state is
//! never deleted.

use crate::error::WikiResult;
use crate::gateway::FileGateway;
use crate::model::{
    Element, ElementContent, ElementInput, MediaKind, MediaRef, PictureItem, Wiki,
};
use crate::validation::validate_elements;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};

/// What happened to one element number during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Unchanged,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementChange {
    pub number: i64,
    pub kind: ChangeKind,
}

/// Result of the pure reconciliation phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Replacement element array, in request order.
    pub elements: Vec<Element>,
    /// Stored keys no longer referenced anywhere in the request.
    pub orphans: Vec<MediaRef>,
    /// Per-number change events, requested numbers first, then removals.
    pub changes: Vec<ElementChange>,
}

impl ReconcilePlan {
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.changes.iter().filter(|c| c.kind == kind).count()
    }
}

/// Outcome of deleting one orphaned key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub key: String,
    pub kind: MediaKind,
    pub error: Option<String>,
}

impl DeleteOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Reconcile a stored element array against a requested batch.
///
/// The batch is validated first; an invalid batch yields an error and no
/// plan. Element numbers are the only join key between the two sides.
pub fn plan(stored: &[Element], requested: &[ElementInput]) -> WikiResult<ReconcilePlan> {
    validate_elements(requested)?;

    let retain: HashSet<String> = requested
        .iter()
        .flat_map(ElementInput::referenced_keys)
        .collect();

    let stored_by_number: HashMap<i64, &Element> =
        stored.iter().map(|e| (e.number, e)).collect();

    let elements: Vec<Element> = requested.iter().map(Element::from_input).collect();

    let mut changes: Vec<ElementChange> = elements
        .iter()
        .map(|new| {
            let kind = match stored_by_number.get(&new.number) {
                None => ChangeKind::Added,
                Some(old) if element_changed(old, new) => ChangeKind::Modified,
                Some(_) => ChangeKind::Unchanged,
            };
            ElementChange {
                number: new.number,
                kind,
            }
        })
        .collect();

    let requested_numbers: HashSet<i64> = requested.iter().map(|e| e.number).collect();
    changes.extend(
        stored
            .iter()
            .filter(|e| !requested_numbers.contains(&e.number))
            .map(|e| ElementChange {
                number: e.number,
                kind: ChangeKind::Removed,
            }),
    );

    let mut seen = HashSet::new();
    let orphans = stored
        .iter()
        .flat_map(Element::media_refs)
        .filter(|media| !retain.contains(&media.key))
        .filter(|media| seen.insert(media.key.clone()))
        .collect();

    Ok(ReconcilePlan {
        elements,
        orphans,
        changes,
    })
}

fn element_changed(old: &Element, new: &Element) -> bool {
    if old.element_type != new.element_type || old.video_id != new.video_id {
        return true;
    }
    match new.content() {
        ElementContent::Gallery { items, .. } => {
            gallery_changed(&old.picture_keys, items) || old.value != new.value
        }
        ElementContent::Scalar { value, .. } => old.value.as_deref() != value,
    }
}

/// Compare two galleries by `(key, order)` after sorting each by order.
pub fn gallery_changed(old: &[PictureItem], new: &[PictureItem]) -> bool {
    if old.len() != new.len() {
        return true;
    }
    sorted_pairs(old) != sorted_pairs(new)
}

fn sorted_pairs(items: &[PictureItem]) -> Vec<(i32, &str)> {
    let mut pairs: Vec<(i32, &str)> = items.iter().map(|i| (i.order, i.key.as_str())).collect();
    pairs.sort_unstable();
    pairs
}

/// Drop the orphans that `record` still references, through any of its
/// translations or its cover image. Only keys nothing in the record points
/// at may be swept.
pub fn unreferenced(orphans: Vec<MediaRef>, record: &Wiki) -> Vec<MediaRef> {
    let mut live: HashSet<String> = record
        .translation
        .iter()
        .flat_map(|t| t.elements.iter())
        .flat_map(Element::media_refs)
        .map(|media| media.key)
        .collect();
    if !record.image_wiki.is_empty() {
        live.insert(record.image_wiki.clone());
    }
    orphans
        .into_iter()
        .filter(|media| !live.contains(&media.key))
        .collect()
}

/// Delete every orphaned key concurrently. A failed delete never cancels
/// its siblings; all outcomes are returned once every call has finished.
pub async fn sweep<F: FileGateway>(files: &F, orphans: &[MediaRef]) -> Vec<DeleteOutcome> {
    join_all(orphans.iter().map(|orphan| async move {
        let result = match orphan.kind {
            MediaKind::Image => files.delete_image(&orphan.key).await,
            MediaKind::Pdf => files.delete_pdf(&orphan.key).await,
        };
        DeleteOutcome {
            key: orphan.key.clone(),
            kind: orphan.kind,
            error: result.err().map(|e| format!("{:#}", e)),
        }
    }))
    .await
}
