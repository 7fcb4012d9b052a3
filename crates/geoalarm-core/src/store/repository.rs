// ── Alarm repository ──
//
// The single authoritative copy of every alarm. Readers get `Arc`
// snapshots; only the controller's command processor mutates it.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::warn;

use super::collection::EntityCollection;
use crate::error::CoreError;
use crate::model::{Alarm, AlarmId};
use crate::stream::AlarmStream;

/// Ordered, id-unique set of alarms.
pub struct AlarmRepository {
    alarms: EntityCollection<AlarmId, Alarm>,
}

impl AlarmRepository {
    pub fn new() -> Self {
        Self {
            alarms: EntityCollection::new(),
        }
    }

    /// Replace the contents with records read from storage. Invalid
    /// records and repeated ids are skipped. Returns how many were kept.
    pub fn load(&self, records: Vec<Alarm>) -> usize {
        let mut kept: Vec<(AlarmId, Alarm)> = Vec::with_capacity(records.len());
        for alarm in records {
            if let Err(e) = alarm.validate() {
                warn!(alarm_id = %alarm.id, error = %e, "skipping invalid stored alarm");
                continue;
            }
            if kept.iter().any(|(id, _)| *id == alarm.id) {
                warn!(alarm_id = %alarm.id, "skipping duplicate stored alarm");
                continue;
            }
            kept.push((alarm.id, alarm));
        }
        let count = kept.len();
        self.alarms.replace_all(kept);
        count
    }

    /// Append a new alarm.
    pub fn insert(&self, alarm: Alarm) -> Result<Arc<Alarm>, CoreError> {
        alarm.validate()?;
        if self.alarms.contains(&alarm.id) {
            return Err(CoreError::ValidationFailed {
                field: "id".into(),
                reason: format!("alarm {} already exists", alarm.id),
            });
        }
        let id = alarm.id;
        self.alarms.upsert(id, alarm);
        self.alarms
            .get(&id)
            .ok_or_else(|| CoreError::Internal(format!("alarm {id} vanished after insert")))
    }

    /// Replace an existing alarm in place.
    pub fn replace(&self, alarm: Alarm) -> Result<Arc<Alarm>, CoreError> {
        alarm.validate()?;
        let id = alarm.id;
        if !self.alarms.contains(&id) {
            return Err(CoreError::AlarmNotFound { id });
        }
        self.alarms.upsert(id, alarm);
        self.alarms
            .get(&id)
            .ok_or(CoreError::AlarmNotFound { id })
    }

    pub fn remove(&self, id: &AlarmId) -> Result<Arc<Alarm>, CoreError> {
        self.alarms
            .remove(id)
            .ok_or(CoreError::AlarmNotFound { id: *id })
    }

    pub fn get(&self, id: &AlarmId) -> Option<Arc<Alarm>> {
        self.alarms.get(id)
    }

    /// Like [`get`](Self::get), but a missing id is an error.
    pub fn require(&self, id: &AlarmId) -> Result<Arc<Alarm>, CoreError> {
        self.get(id).ok_or(CoreError::AlarmNotFound { id: *id })
    }

    /// Current list in insertion order.
    pub fn snapshot(&self) -> Arc<Vec<Arc<Alarm>>> {
        self.alarms.snapshot()
    }

    /// Owned copy of the current list, as written to storage.
    pub fn records(&self) -> Vec<Alarm> {
        self.snapshot().iter().map(|a| Alarm::clone(a)).collect()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Alarm>>>> {
        self.alarms.subscribe()
    }

    pub fn stream(&self) -> AlarmStream {
        AlarmStream::new(self.subscribe())
    }

    /// Mutation counter, useful to detect unsaved changes.
    pub fn version(&self) -> u64 {
        self.alarms.version()
    }

    pub fn len(&self) -> usize {
        self.alarms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }
}

impl Default for AlarmRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{AlarmDraft, Coordinate, TimeOfDay};

    fn alarm(name: &str) -> Alarm {
        Alarm::from_draft(AlarmDraft::new(
            name,
            TimeOfDay::new(7, 0).unwrap(),
            Coordinate::new(35.68, 139.76).unwrap(),
        ))
        .unwrap()
    }

    #[test]
    fn insert_rejects_duplicate_id() {
        let repo = AlarmRepository::new();
        let a = alarm("a");
        repo.insert(a.clone()).unwrap();
        assert!(matches!(
            repo.insert(a).unwrap_err(),
            CoreError::ValidationFailed { .. }
        ));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn replace_requires_existing() {
        let repo = AlarmRepository::new();
        let a = alarm("a");
        assert!(matches!(
            repo.replace(a.clone()).unwrap_err(),
            CoreError::AlarmNotFound { .. }
        ));
        repo.insert(a.clone()).unwrap();
        let renamed = Alarm {
            name: "renamed".into(),
            ..a
        };
        assert_eq!(repo.replace(renamed).unwrap().name, "renamed");
    }

    #[test]
    fn load_skips_invalid_and_duplicate_records() {
        let repo = AlarmRepository::new();
        let good = alarm("good");
        let mut bad = alarm("bad");
        bad.latitude = 123.0;
        let kept = repo.load(vec![good.clone(), bad, good.clone()]);
        assert_eq!(kept, 1);
        assert_eq!(repo.records(), vec![good]);
    }

    #[test]
    fn records_follow_insertion_order() {
        let repo = AlarmRepository::new();
        let (a, b, c) = (alarm("a"), alarm("b"), alarm("c"));
        for x in [&a, &b, &c] {
            repo.insert(x.clone()).unwrap();
        }
        repo.replace(Alarm {
            enabled: false,
            ..a.clone()
        })
        .unwrap();
        repo.remove(&b.id).unwrap();
        let names: Vec<_> = repo.records().into_iter().map(|x| x.name).collect();
        assert_eq!(names, ["a", "c"]);
    }
}
