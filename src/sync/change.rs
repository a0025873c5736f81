//! Snapshot change detection
//!
//! Structural comparison over the typed [`Snapshot`]; an update that compares
//! equal to the held snapshot is dropped before any notification goes out.

use crate::types::{FieldGroup, Snapshot};

/// Whether two snapshots describe the same remote state
///
/// Deep comparison including the nested profile. An absent profile only
/// equals another absent profile.
pub fn snapshots_equal(a: &Snapshot, b: &Snapshot) -> bool {
    a == b
}

/// Field groups whose values differ between `before` and `after`
pub fn changed_groups(before: &Snapshot, after: &Snapshot) -> Vec<FieldGroup> {
    FieldGroup::ALL
        .into_iter()
        .filter(|group| !group_equal(*group, before, after))
        .collect()
}

/// Compare a single field group
pub fn group_equal(group: FieldGroup, a: &Snapshot, b: &Snapshot) -> bool {
    match group {
        FieldGroup::Connectivity => a.connected == b.connected,
        FieldGroup::Phase => a.phase == b.phase,
        FieldGroup::Profile => a.profile == b.profile,
        FieldGroup::Automation => a.automation_enabled == b.automation_enabled,
    }
}
