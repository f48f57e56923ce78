use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use crate::{
    table::{SessionTable, StoredRecord},
    Result,
};

/// A session table kept in memory.
///
/// Records live as long as the table; nothing expires on its own. Cloning
/// shares the records.
#[derive(Default, Clone)]
pub struct MemoryTable {
    records: Arc<Mutex<HashMap<String, StoredRecord>>>,
}

impl MemoryTable {
    /// Create a `MemoryTable`.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns `true` if no record is stored.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait::async_trait]
impl SessionTable for MemoryTable {
    async fn get_record(&self, id: &str) -> Result<Option<StoredRecord>> {
        Ok(self.records.lock().get(id).cloned())
    }

    async fn put_record(&self, record: &StoredRecord) -> Result<()> {
        self.records
            .lock()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete_record(&self, id: &str) -> Result<()> {
        self.records.lock().remove(id);
        Ok(())
    }
}
