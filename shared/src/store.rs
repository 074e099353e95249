//! Complaints of the current listing, indexed by id and bucketed by status.

use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;
use thiserror::Error;

use crate::model::{Complaint, ComplaintId, ComplaintUpdate};
use crate::status::CanonicalStatus;
use crate::{AppError, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("complaint {0} is not in the current listing")]
    NotFound(ComplaintId),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        let StoreError::NotFound(id) = &e;
        AppError::new(ErrorKind::NotFound, e.to_string()).with_context("complaint_id", id.to_string())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    complaint: Complaint,
    seq: u64,
}

type SortKey = (Option<DateTime<FixedOffset>>, u64);

fn sort_key(entries: &HashMap<ComplaintId, Entry>, id: ComplaintId) -> SortKey {
    entries
        .get(&id)
        .map_or((None, u64::MAX), |e| (e.complaint.created_at(), e.seq))
}

/// Buckets hold ids ordered by creation time, oldest first; complaints
/// without a timestamp sort before all others and ties keep fetch order.
/// Complaints with an unknown status are indexed but never bucketed.
#[derive(Debug, Clone, Default)]
pub struct ComplaintStore {
    entries: HashMap<ComplaintId, Entry>,
    fetch_order: Vec<ComplaintId>,
    buckets: [Vec<ComplaintId>; 5],
}

impl ComplaintStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_all(&mut self, complaints: impl IntoIterator<Item = Complaint>) {
        self.clear();

        for complaint in complaints {
            let id = complaint.id;
            if let Some(existing) = self.entries.get_mut(&id) {
                // the same id on two pages: keep the first position, newest data
                existing.complaint = complaint;
                continue;
            }
            let seq = self.fetch_order.len() as u64;
            self.fetch_order.push(id);
            self.entries.insert(id, Entry { complaint, seq });
        }

        for id in &self.fetch_order {
            if let Some(status) = self.entries[id].complaint.status().canonical() {
                self.buckets[status.index()].push(*id);
            }
        }

        let entries = &self.entries;
        for bucket in &mut self.buckets {
            bucket.sort_by_key(|id| sort_key(entries, *id));
        }
    }

    /// Merges `update` into the stored complaint and moves it to the bucket
    /// of its new status.
    pub fn apply_mutation_result(
        &mut self,
        id: ComplaintId,
        update: ComplaintUpdate,
    ) -> Result<&Complaint, StoreError> {
        let entry = self.entries.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let before = entry.complaint.status().canonical();
        update.apply_to(&mut entry.complaint);
        let after = entry.complaint.status().canonical();

        if before != after {
            if let Some(old) = before {
                self.buckets[old.index()].retain(|other| *other != id);
            }
            if let Some(new) = after {
                let key = sort_key(&self.entries, id);
                let entries = &self.entries;
                let bucket = &mut self.buckets[new.index()];
                let at = bucket.partition_point(|other| sort_key(entries, *other) < key);
                bucket.insert(at, id);
            }
        }

        Ok(&self.entries[&id].complaint)
    }

    #[must_use]
    pub fn get(&self, id: ComplaintId) -> Option<&Complaint> {
        self.entries.get(&id).map(|e| &e.complaint)
    }

    pub fn bucket(&self, status: CanonicalStatus) -> impl Iterator<Item = &Complaint> + '_ {
        self.buckets[status.index()]
            .iter()
            .filter_map(|id| self.get(*id))
    }

    #[must_use]
    pub fn bucket_ids(&self, status: CanonicalStatus) -> &[ComplaintId] {
        &self.buckets[status.index()]
    }

    /// Every complaint, in fetch order.
    pub fn iter(&self) -> impl Iterator<Item = &Complaint> + '_ {
        self.fetch_order.iter().filter_map(|id| self.get(*id))
    }

    /// Complaints whose status could not be recognized.
    pub fn unknown(&self) -> impl Iterator<Item = &Complaint> + '_ {
        self.iter().filter(|c| c.status().is_unknown())
    }

    #[must_use]
    pub fn count(&self, status: CanonicalStatus) -> usize {
        self.buckets[status.index()].len()
    }

    #[must_use]
    pub fn counts(&self) -> Vec<(CanonicalStatus, usize)> {
        CanonicalStatus::ALL
            .into_iter()
            .map(|status| (status, self.count(status)))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.fetch_order.clear();
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complaint(id: u64, status: &str, created_at: Option<&str>) -> Complaint {
        let mut c = Complaint::new(ComplaintId(id), status);
        c.created_at_raw = created_at.map(str::to_string);
        c
    }

    fn ids(store: &ComplaintStore, status: CanonicalStatus) -> Vec<u64> {
        store.bucket(status).map(|c| c.id.0).collect()
    }

    const T1: &str = "2024-03-01T08:00:00-03:00";
    const T2: &str = "2024-03-02T08:00:00-03:00";
    const T3: &str = "2024-03-03T08:00:00-03:00";

    #[test]
    fn test_replace_all_sorts_by_creation_time() {
        let mut store = ComplaintStore::new();
        store.replace_all(vec![
            complaint(3, "pendiente", Some(T3)),
            complaint(1, "pendiente", Some(T1)),
            complaint(2, "pendiente", Some(T2)),
        ]);
        assert_eq!(ids(&store, CanonicalStatus::Pending), vec![1, 2, 3]);
        assert_eq!(store.iter().map(|c| c.id.0).collect::<Vec<_>>(), vec![3, 1, 2]);
    }

    #[test]
    fn test_missing_timestamps_first_and_ties_keep_fetch_order() {
        let mut store = ComplaintStore::new();
        store.replace_all(vec![
            complaint(1, "pendiente", Some(T2)),
            complaint(2, "pendiente", None),
            complaint(3, "pendiente", Some(T1)),
            complaint(4, "pendiente", Some("no es fecha")),
            complaint(5, "pendiente", Some(T1)),
        ]);
        assert_eq!(ids(&store, CanonicalStatus::Pending), vec![2, 4, 3, 5, 1]);
    }

    #[test]
    fn test_offsets_compare_as_instants() {
        let mut store = ComplaintStore::new();
        store.replace_all(vec![
            complaint(1, "pendiente", Some("2024-03-01T12:00:00+00:00")),
            complaint(2, "pendiente", Some("2024-03-01T08:30:00-03:00")),
        ]);
        // 08:30 at -03:00 is 11:30 UTC
        assert_eq!(ids(&store, CanonicalStatus::Pending), vec![2, 1]);
    }

    #[test]
    fn test_buckets_by_normalized_status() {
        let mut store = ComplaintStore::new();
        store.replace_all(vec![
            complaint(1, "Resuelta", None),
            complaint(2, "en_proceso", None),
            complaint(3, "en revisión", None),
            complaint(4, "rechazada", None),
        ]);
        assert_eq!(store.len(), 4);
        assert_eq!(ids(&store, CanonicalStatus::Finalized), vec![1]);
        assert_eq!(ids(&store, CanonicalStatus::InManagement), vec![2]);
        assert_eq!(ids(&store, CanonicalStatus::Rejected), vec![4]);
        assert_eq!(store.counts().iter().map(|(_, n)| n).sum::<usize>(), 3);

        // unknown status: indexed, not bucketed
        assert!(store.get(ComplaintId(3)).is_some());
        assert_eq!(store.unknown().map(|c| c.id.0).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_replace_all_discards_previous_contents() {
        let mut store = ComplaintStore::new();
        store.replace_all(vec![complaint(1, "pendiente", None)]);
        store.replace_all(vec![complaint(2, "finalizado", None)]);
        assert!(store.get(ComplaintId(1)).is_none());
        assert_eq!(store.count(CanonicalStatus::Pending), 0);
        assert_eq!(store.count(CanonicalStatus::Finalized), 1);
    }

    #[test]
    fn test_duplicate_ids_keep_first_position() {
        let mut store = ComplaintStore::new();
        store.replace_all(vec![
            complaint(1, "pendiente", Some(T1)),
            complaint(2, "pendiente", Some(T2)),
            complaint(1, "en_gestion", Some(T1)),
        ]);
        assert_eq!(store.len(), 2);
        assert_eq!(ids(&store, CanonicalStatus::Pending), vec![2]);
        assert_eq!(ids(&store, CanonicalStatus::InManagement), vec![1]);
    }

    #[test]
    fn test_mutation_moves_between_buckets_in_order() {
        let mut store = ComplaintStore::new();
        store.replace_all(vec![
            complaint(1, "pendiente", Some(T2)),
            complaint(2, "en_gestion", Some(T1)),
            complaint(3, "en_gestion", Some(T3)),
        ]);

        let updated = store
            .apply_mutation_result(
                ComplaintId(1),
                ComplaintUpdate {
                    raw_status: Some("en_gestion".into()),
                    crew_label: Some("Cuadrilla 4".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.crew_label, "Cuadrilla 4");

        assert!(ids(&store, CanonicalStatus::Pending).is_empty());
        assert_eq!(ids(&store, CanonicalStatus::InManagement), vec![2, 1, 3]);
        assert_eq!(
            store.get(ComplaintId(1)).unwrap().status().canonical(),
            Some(CanonicalStatus::InManagement)
        );
    }

    #[test]
    fn test_mutation_without_status_change_keeps_position() {
        let mut store = ComplaintStore::new();
        store.replace_all(vec![
            complaint(1, "pendiente", Some(T1)),
            complaint(2, "pendiente", Some(T2)),
        ]);
        store
            .apply_mutation_result(
                ComplaintId(1),
                ComplaintUpdate {
                    crew_label: Some("Cuadrilla 1".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(ids(&store, CanonicalStatus::Pending), vec![1, 2]);
    }

    #[test]
    fn test_mutation_from_unknown_status_enters_bucket() {
        let mut store = ComplaintStore::new();
        store.replace_all(vec![complaint(1, "archivada", None)]);
        store
            .apply_mutation_result(
                ComplaintId(1),
                ComplaintUpdate {
                    raw_status: Some("finalizado".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(ids(&store, CanonicalStatus::Finalized), vec![1]);
        assert_eq!(store.unknown().count(), 0);
    }

    #[test]
    fn test_mutation_unknown_id() {
        let mut store = ComplaintStore::new();
        assert_eq!(
            store
                .apply_mutation_result(ComplaintId(9), ComplaintUpdate::default())
                .unwrap_err(),
            StoreError::NotFound(ComplaintId(9))
        );
        let error: AppError = StoreError::NotFound(ComplaintId(9)).into();
        assert_eq!(error.kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_clear() {
        let mut store = ComplaintStore::new();
        store.replace_all(vec![complaint(1, "pendiente", None)]);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.count(CanonicalStatus::Pending), 0);
    }
}
