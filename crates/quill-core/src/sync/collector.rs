//! Local change collection against the last synchronized baseline.

use std::collections::HashMap;

use super::change::{ChangeKey, ChangePayload, ChangeRecord, EntityKind, Tombstone};
use super::store::EntityStore;
use crate::error::Result;

/// Produces the local change set for a session.
pub struct LocalChangeCollector<'a> {
    store: &'a dyn EntityStore,
}

impl<'a> LocalChangeCollector<'a> {
    pub fn new(store: &'a dyn EntityStore) -> Self {
        Self { store }
    }

    /// Local changes after `since`; everything when no baseline exists yet.
    ///
    /// Records are unique per `(entity_kind, id)`. An entity that is both
    /// modified and tombstoned in the window yields only its deletion.
    pub async fn collect_since(&self, since: Option<i64>) -> Result<Vec<ChangeRecord>> {
        let mut modified = Vec::new();
        for kind in EntityKind::ALL {
            modified.extend(self.store.modified_since(kind, since).await?);
        }
        let tombstones = self.store.tombstones_since(since).await?;

        let changes = merge_changes(modified, tombstones, since);
        tracing::debug!(
            "Collected {} local change(s) since {:?}",
            changes.len(),
            since
        );
        Ok(changes)
    }
}

/// Combine modified entities and tombstones into one record per entity.
pub fn merge_changes(
    modified: Vec<ChangePayload>,
    tombstones: Vec<Tombstone>,
    since: Option<i64>,
) -> Vec<ChangeRecord> {
    let mut records: HashMap<ChangeKey, ChangeRecord> = HashMap::new();

    for payload in modified {
        let timestamp = payload.updated_at();
        let is_new = !matches!(since, Some(baseline) if payload.created_at() <= baseline);
        let record = if is_new {
            ChangeRecord::created(payload, timestamp)
        } else {
            ChangeRecord::updated(payload, timestamp)
        };
        keep_latest(&mut records, record);
    }

    for tombstone in tombstones {
        let record = tombstone.into_record();
        match records.get(&record.key()) {
            Some(existing) if existing.is_deletion() && existing.timestamp() >= record.timestamp() => {}
            _ => {
                records.insert(record.key(), record);
            }
        }
    }

    records.into_values().collect()
}

/// Collapse a change list to the newest record per entity.
pub fn latest_per_entity(changes: Vec<ChangeRecord>) -> Vec<ChangeRecord> {
    let mut records = HashMap::new();
    for record in changes {
        keep_latest(&mut records, record);
    }
    records.into_values().collect()
}

fn keep_latest(records: &mut HashMap<ChangeKey, ChangeRecord>, record: ChangeRecord) {
    match records.get(&record.key()) {
        Some(existing) if existing.timestamp() >= record.timestamp() => {}
        _ => {
            records.insert(record.key(), record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Folder, Note};
    use crate::sync::ChangeKind;

    fn note_at(created_at: i64, updated_at: i64) -> Note {
        let mut note = Note::new("t", "c");
        note.created_at = created_at;
        note.updated_at = updated_at;
        note
    }

    #[test]
    fn classifies_created_and_updated_against_baseline() {
        let fresh = note_at(150, 150);
        let edited = note_at(50, 160);

        let records = merge_changes(
            vec![
                ChangePayload::Note(fresh.clone()),
                ChangePayload::Note(edited.clone()),
            ],
            Vec::new(),
            Some(100),
        );

        let kind_of = |id: String| {
            records
                .iter()
                .find(|record| record.id() == id)
                .map(ChangeRecord::change_kind)
        };
        assert_eq!(kind_of(fresh.id.as_str()), Some(ChangeKind::Created));
        assert_eq!(kind_of(edited.id.as_str()), Some(ChangeKind::Updated));
    }

    #[test]
    fn everything_is_created_without_baseline() {
        let records = merge_changes(
            vec![ChangePayload::Folder(Folder::new("Inbox"))],
            Vec::new(),
            None,
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].change_kind(), ChangeKind::Created);
    }

    #[test]
    fn deletion_wins_over_modification_of_same_entity() {
        let note = note_at(10, 200);
        let tombstone = Tombstone {
            entity_kind: EntityKind::Note,
            id: note.id.as_str(),
            deleted_at: 150,
        };

        let records = merge_changes(vec![ChangePayload::Note(note)], vec![tombstone], Some(0));
        assert_eq!(records.len(), 1);
        assert!(records[0].is_deletion());
        assert_eq!(records[0].timestamp(), 150);
    }

    #[test]
    fn same_id_in_different_kinds_stays_distinct() {
        let note = note_at(10, 20);
        let tombstone = Tombstone {
            entity_kind: EntityKind::Media,
            id: note.id.as_str(),
            deleted_at: 30,
        };

        let records = merge_changes(vec![ChangePayload::Note(note)], vec![tombstone], None);
        assert_eq!(records.len(), 2);
    }
}
