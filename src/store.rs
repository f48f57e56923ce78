use std::{future::Future, sync::Arc};

use poem::web::cookie::CookieJar;

use crate::{
    id::generate_session_id,
    table::{SessionTable, StoredRecord},
    CookieCodec, Error, Result, Session, StoreConfig, TypeRegistry, ValueSerializer,
};

/// A server-side session store.
///
/// Only the session identifier travels in the cookie, authenticated (and
/// optionally encrypted) by a [`CookieCodec`]. Values and options live in a
/// [`SessionTable`].
///
/// Cloning is cheap, all clones share the same table and keys.
///
/// # Example
///
/// ```
/// use poem::web::cookie::CookieJar;
/// use poem_dynamosession::{CookieCodec, KeyPair, MemoryTable, SessionStore};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let codec = CookieCodec::new([KeyPair::new([7u8; 32]).unwrap()]).unwrap();
/// let store = SessionStore::new(MemoryTable::new(), codec);
///
/// let cookie_jar = CookieJar::default();
/// let session = store.new_session(&cookie_jar, "session").await.unwrap();
/// assert!(session.is_new());
///
/// session.insert("user", "alice");
/// store.save(&cookie_jar, &session).await.unwrap();
/// assert!(cookie_jar.get("session").is_some());
/// # });
/// ```
#[derive(Clone)]
pub struct SessionStore {
    config: Arc<StoreConfig>,
    codec: Arc<CookieCodec>,
    serializer: ValueSerializer,
    table: Arc<dyn SessionTable>,
}

impl SessionStore {
    /// Create a `SessionStore` with the default configuration and no custom
    /// value types.
    pub fn new(table: impl SessionTable + 'static, codec: CookieCodec) -> Self {
        Self {
            config: Arc::new(StoreConfig::default()),
            codec: Arc::new(codec),
            serializer: ValueSerializer::default(),
            table: Arc::new(table),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(self, config: StoreConfig) -> Self {
        Self {
            config: Arc::new(config),
            ..self
        }
    }

    /// Sets the custom value types sessions may contain.
    #[must_use]
    pub fn with_registry(self, registry: TypeRegistry) -> Self {
        Self {
            serializer: ValueSerializer::new(registry),
            ..self
        }
    }

    /// Resolves the session named `name` from the request cookies.
    ///
    /// A fresh session is returned if there is no cookie, the cookie does not
    /// authenticate, the table has no such record, or the record cannot be
    /// decoded. Table read failures are treated the same way unless
    /// [`StoreConfig::surface_read_errors`] is enabled.
    pub async fn new_session(&self, cookie_jar: &CookieJar, name: &str) -> Result<Session> {
        if !is_cookie_name_valid(name) {
            return Err(Error::InvalidCookieName(name.to_string()));
        }

        let token = match cookie_jar.get(name) {
            Some(cookie) => cookie.value_str().to_string(),
            None => return self.fresh_session(name),
        };
        let session_id = match self.codec.decode(name, &token) {
            Ok(session_id) => session_id,
            Err(_) => return self.fresh_session(name),
        };

        match self.load(&session_id).await {
            Ok(Some(record)) => match self.serializer.decode_base64(&record.values) {
                Ok(values) => Ok(Session::loaded(record.id, name, values, record.options)),
                Err(err) => {
                    tracing::warn!(cookie = name, error = %err, "failed to decode session values");
                    self.fresh_session(name)
                }
            },
            Ok(None) => {
                tracing::debug!(cookie = name, "session not found");
                self.fresh_session(name)
            }
            Err(err @ (Error::StoreRead(_) | Error::Timeout)) if self.config.surface_read_errors => {
                Err(err)
            }
            Err(err) => {
                tracing::warn!(cookie = name, error = %err, "failed to load session");
                self.fresh_session(name)
            }
        }
    }

    /// Persists the session and sets its cookie.
    ///
    /// A session whose `max_age` is negative is deleted from the table and
    /// its cookie cleared instead. The handle then loses its identifier and
    /// values, so saving it again with a positive `max_age` fails with
    /// [`Error::IllegalSession`]. On any failure no cookie is set.
    pub async fn save(&self, cookie_jar: &CookieJar, session: &Session) -> Result<()> {
        let name = session.name();
        let session_id = session.id();
        let options = session.options();

        if options.is_removal() {
            if !session_id.is_empty() {
                self.with_deadline(self.table.delete_record(&session_id))
                    .await?;
            }
            cookie_jar.add(options.to_removal_cookie(&name));
            session.mark_deleted();
            tracing::debug!(cookie = %name, "session deleted");
            return Ok(());
        }

        if session_id.is_empty() {
            return Err(Error::IllegalSession);
        }

        let record = StoredRecord {
            id: session_id,
            values: self.serializer.encode_base64(&session.values())?,
            options,
        };
        self.with_deadline(self.table.put_record(&record)).await?;

        let token = self.codec.encode(&name, &record.id)?;
        cookie_jar.add(record.options.to_cookie(&name, &token));
        session.mark_saved();
        tracing::debug!(cookie = %name, "session saved");
        Ok(())
    }

    /// Deletes the session from the table and clears its cookie.
    pub async fn delete(&self, cookie_jar: &CookieJar, session: &Session) -> Result<()> {
        session.set_max_age(-1);
        self.save(cookie_jar, session).await
    }

    fn fresh_session(&self, name: &str) -> Result<Session> {
        Ok(Session::fresh(
            generate_session_id()?,
            name,
            self.config.options.clone(),
        ))
    }

    async fn load(&self, session_id: &str) -> Result<Option<StoredRecord>> {
        self.with_deadline(self.table.get_record(session_id)).await
    }

    async fn with_deadline<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.config.operation_timeout {
            Some(timeout) => tokio::time::timeout(timeout, fut)
                .await
                .map_err(|_| Error::Timeout)?,
            None => fut.await,
        }
    }
}

/// RFC 6265 `token`.
fn is_cookie_name_valid(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#'
                        | b'$'
                        | b'%'
                        | b'&'
                        | b'\''
                        | b'*'
                        | b'+'
                        | b'-'
                        | b'.'
                        | b'^'
                        | b'_'
                        | b'`'
                        | b'|'
                        | b'~'
                )
        })
}
