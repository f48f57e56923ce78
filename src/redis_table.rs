use std::collections::HashMap;

use redis::{aio::ConnectionLike, AsyncCommands, Cmd};

use crate::{
    table::{SessionTable, StoredRecord},
    Error, Result, TableConfig,
};

const FIELD_VALUES: &str = "values";
const FIELD_OPTIONS: &str = "options";

/// Session table using redis.
///
/// Each session is a hash at `{table_name}:{id}` with the fields `values`
/// and `options` (JSON).
///
/// # Errors
///
/// - [`redis::RedisError`]
#[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
pub struct RedisTable<T> {
    connection: T,
    table_name: String,
}

impl<T> RedisTable<T> {
    /// Create a `RedisTable`.
    pub fn new(config: TableConfig, connection: T) -> Self {
        Self {
            connection,
            table_name: config.table_name,
        }
    }

    fn key(&self, id: &str) -> String {
        format!("{}:{}", self.table_name, id)
    }
}

#[async_trait::async_trait]
impl<T: ConnectionLike + Clone + Sync + Send> SessionTable for RedisTable<T> {
    async fn get_record(&self, id: &str) -> Result<Option<StoredRecord>> {
        let mut fields: HashMap<String, String> = self
            .connection
            .clone()
            .hgetall(self.key(id))
            .await
            .map_err(Error::store_read)?;
        if fields.is_empty() {
            return Ok(None);
        }

        let values = fields
            .remove(FIELD_VALUES)
            .ok_or_else(|| Error::Deserialize("missing `values` field".to_string()))?;
        let options = match fields.get(FIELD_OPTIONS) {
            Some(options) => serde_json::from_str(options)
                .map_err(|err| Error::Deserialize(err.to_string()))?,
            None => Default::default(),
        };

        Ok(Some(StoredRecord {
            id: id.to_string(),
            values,
            options,
        }))
    }

    async fn put_record(&self, record: &StoredRecord) -> Result<()> {
        let key = self.key(&record.id);
        let options =
            serde_json::to_string(&record.options).map_err(|err| Error::Serialize(err.to_string()))?;

        redis::pipe()
            .atomic()
            .del(&key)
            .ignore()
            .hset_multiple(
                &key,
                &[
                    (FIELD_VALUES, record.values.as_str()),
                    (FIELD_OPTIONS, options.as_str()),
                ],
            )
            .ignore()
            .query_async::<_, ()>(&mut self.connection.clone())
            .await
            .map_err(Error::store_write)?;
        Ok(())
    }

    async fn delete_record(&self, id: &str) -> Result<()> {
        Cmd::del(self.key(id))
            .query_async::<_, ()>(&mut self.connection.clone())
            .await
            .map_err(Error::store_delete)?;
        Ok(())
    }
}
