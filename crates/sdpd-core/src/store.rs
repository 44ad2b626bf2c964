//! Record store abstraction
//!
//! The store is shared and read-mostly. Handlers only hold `Arc` snapshots of
//! records while building one response; iteration resumes from a handle
//! cursor so a record deleted between frames never dangles.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::protocol::request::UuidMatchSet;
use crate::record::ServiceRecord;
use crate::types::RecordHandle;

// ----------------------------------------------------------------------------
// Record Store Trait
// ----------------------------------------------------------------------------

/// Read interface the query handlers consume
pub trait RecordStore: Send + Sync {
    /// Look up a record by handle
    fn find(&self, handle: RecordHandle) -> Option<Arc<ServiceRecord>>;

    /// Next record matching `uuids` strictly after the `after` cursor
    ///
    /// Iteration order is ascending handle order. A cursor whose record has
    /// been deleted still has a well-defined successor.
    fn next_matching(
        &self,
        after: Option<RecordHandle>,
        uuids: &UuidMatchSet,
    ) -> Option<Arc<ServiceRecord>>;

    /// Whether a record with this handle currently exists
    fn contains(&self, handle: RecordHandle) -> bool {
        self.find(handle).is_some()
    }
}

/// Iterate every record matching `uuids` in store order
pub fn matching_records<'a>(
    store: &'a dyn RecordStore,
    uuids: &'a UuidMatchSet,
) -> impl Iterator<Item = Arc<ServiceRecord>> + 'a {
    let mut cursor = None;
    std::iter::from_fn(move || {
        let record = store.next_matching(cursor, uuids)?;
        cursor = Some(record.handle());
        Some(record)
    })
}

// ----------------------------------------------------------------------------
// In-Memory Store
// ----------------------------------------------------------------------------

/// Thread-safe in-memory record store
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<BTreeMap<RecordHandle, Arc<ServiceRecord>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a set of records
    pub fn with_records(records: impl IntoIterator<Item = ServiceRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Insert or replace a record, returning the previous one
    pub fn insert(&self, record: ServiceRecord) -> Option<Arc<ServiceRecord>> {
        let handle = record.handle();
        debug!("Storing service record {}", handle);
        self.write().insert(handle, Arc::new(record))
    }

    /// Remove a record
    pub fn remove(&self, handle: RecordHandle) -> Option<Arc<ServiceRecord>> {
        debug!("Removing service record {}", handle);
        self.write().remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Handles of all stored records in store order
    pub fn handles(&self) -> Vec<RecordHandle> {
        self.read().keys().copied().collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<RecordHandle, Arc<ServiceRecord>>> {
        // A poisoned lock still holds a consistent map: writers only insert or remove.
        self.records.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<RecordHandle, Arc<ServiceRecord>>> {
        self.records.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RecordStore for InMemoryRecordStore {
    fn find(&self, handle: RecordHandle) -> Option<Arc<ServiceRecord>> {
        self.read().get(&handle).cloned()
    }

    fn next_matching(
        &self,
        after: Option<RecordHandle>,
        uuids: &UuidMatchSet,
    ) -> Option<Arc<ServiceRecord>> {
        let lower = match after {
            Some(handle) => Bound::Excluded(handle),
            None => Bound::Unbounded,
        };
        self.read()
            .range((lower, Bound::Unbounded))
            .map(|(_, record)| record)
            .find(|record| record.matches(uuids))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::service_classes;
    use crate::types::uuid16;

    fn record(handle: u32, class: u16) -> ServiceRecord {
        ServiceRecord::new(RecordHandle::new(handle)).with_service_classes(&[class])
    }

    #[test]
    fn test_iteration_follows_handle_order() {
        let store = InMemoryRecordStore::with_records([
            record(0x10003, service_classes::SERIAL_PORT),
            record(0x10001, service_classes::SERIAL_PORT),
            record(0x10002, service_classes::AUDIO_SINK),
        ]);
        let uuids = UuidMatchSet::new([uuid16(service_classes::SERIAL_PORT)]).unwrap();
        let handles: Vec<u32> = matching_records(&store, &uuids)
            .map(|r| r.handle().value())
            .collect();
        assert_eq!(handles, vec![0x10001, 0x10003]);
    }

    #[test]
    fn test_cursor_survives_deletion() {
        let store = InMemoryRecordStore::with_records([
            record(1, service_classes::SERIAL_PORT),
            record(2, service_classes::SERIAL_PORT),
            record(3, service_classes::SERIAL_PORT),
        ]);
        let uuids = UuidMatchSet::new([uuid16(service_classes::SERIAL_PORT)]).unwrap();
        store.remove(RecordHandle::new(2));
        assert!(!store.contains(RecordHandle::new(2)));
        let next = store.next_matching(Some(RecordHandle::new(2)), &uuids);
        assert_eq!(next.map(|r| r.handle()), Some(RecordHandle::new(3)));
        assert_eq!(store.len(), 2);
    }
}
