use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use poem::{
    middleware::{CookieJarManager, CookieJarManagerEndpoint},
    web::cookie::CookieJar,
    Endpoint, FromRequest, Middleware, Request, RequestBody,
};

use crate::{Error, Result, Session, SessionStatus, SessionStore};

/// Middleware that makes the sessions of a [`SessionStore`] available to
/// handlers through the [`Sessions`] extractor.
///
/// Sessions that changed while the request was handled are saved before the
/// response is sent.
///
/// # Example
///
/// ```
/// use poem::{get, handler, EndpointExt, Route};
/// use poem_dynamosession::{CookieCodec, KeyPair, MemoryTable, SessionManager, SessionStore, Sessions};
///
/// #[handler]
/// async fn index(sessions: &Sessions) -> poem::Result<String> {
///     let session = sessions.get("session").await?;
///     let count = session.get::<i64>("count").unwrap_or(0) + 1;
///     session.insert("count", count);
///     Ok(count.to_string())
/// }
///
/// let codec = CookieCodec::new([KeyPair::new([7u8; 32]).unwrap()]).unwrap();
/// let app = Route::new()
///     .at("/", get(index))
///     .with(SessionManager::new(SessionStore::new(MemoryTable::new(), codec)));
/// ```
pub struct SessionManager {
    store: SessionStore,
}

impl SessionManager {
    /// Create a `SessionManager` middleware.
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }
}

impl<E: Endpoint> Middleware<E> for SessionManager {
    type Output = CookieJarManagerEndpoint<SessionManagerEndpoint<E>>;

    fn transform(&self, ep: E) -> Self::Output {
        CookieJarManager::new().transform(SessionManagerEndpoint {
            inner: ep,
            store: self.store.clone(),
        })
    }
}

/// Endpoint for `SessionManager` middleware.
pub struct SessionManagerEndpoint<E> {
    inner: E,
    store: SessionStore,
}

#[async_trait::async_trait]
impl<E: Endpoint> Endpoint for SessionManagerEndpoint<E> {
    type Output = E::Output;

    async fn call(&self, mut req: Request) -> poem::Result<Self::Output> {
        let sessions = Sessions::new(self.store.clone(), req.cookie().clone());
        req.extensions_mut().insert(sessions.clone());

        let resp = self.inner.call(req).await?;
        sessions.save_changed().await?;
        Ok(resp)
    }
}

struct SessionsInner {
    store: SessionStore,
    cookie_jar: CookieJar,
    cache: Mutex<HashMap<String, Session>>,
}

/// The sessions of one request.
///
/// Each session is resolved at most once per request: asking for the same
/// name again returns the same handle.
#[derive(Clone)]
pub struct Sessions {
    inner: Arc<SessionsInner>,
}

impl Sessions {
    /// Create the sessions of a request whose cookies are in `cookie_jar`.
    pub fn new(store: SessionStore, cookie_jar: CookieJar) -> Self {
        Self {
            inner: Arc::new(SessionsInner {
                store,
                cookie_jar,
                cache: Default::default(),
            }),
        }
    }

    /// Returns the session named `name`, resolving it on first use.
    pub async fn get(&self, name: &str) -> Result<Session> {
        let cached = self.inner.cache.lock().get(name).cloned();
        if let Some(session) = cached {
            return Ok(session);
        }

        let session = self
            .inner
            .store
            .new_session(&self.inner.cookie_jar, name)
            .await?;
        Ok(self
            .inner
            .cache
            .lock()
            .entry(name.to_string())
            .or_insert(session)
            .clone())
    }

    /// Saves the session now.
    pub async fn save(&self, session: &Session) -> Result<()> {
        self.inner.store.save(&self.inner.cookie_jar, session).await
    }

    /// Deletes the session now.
    pub async fn delete(&self, session: &Session) -> Result<()> {
        self.inner.store.delete(&self.inner.cookie_jar, session).await
    }

    /// Saves every session resolved during this request.
    pub async fn save_all(&self) -> Result<()> {
        for session in self.sessions() {
            self.save(&session).await?;
        }
        Ok(())
    }

    async fn save_changed(&self) -> Result<()> {
        for session in self.sessions() {
            if session.status() == SessionStatus::Changed {
                self.save(&session).await?;
            }
        }
        Ok(())
    }

    fn sessions(&self) -> Vec<Session> {
        self.inner.cache.lock().values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl<'a> FromRequest<'a> for &'a Sessions {
    async fn from_request(req: &'a Request, _body: &mut RequestBody) -> poem::Result<Self> {
        Ok(req
            .extensions()
            .get::<Sessions>()
            .ok_or(Error::MissingSessionManager)?)
    }
}

#[cfg(test)]
mod tests {
    use poem::{get, handler, http::StatusCode, web::Path, EndpointExt, Route};

    use super::*;
    use crate::{
        test_harness::{TestClient, SECRET},
        CookieCodec, KeyPair, MemoryTable, Value,
    };

    const NAME: &str = "session-key";

    #[handler]
    async fn index(Path(action): Path<i32>, sessions: &Sessions) -> poem::Result<()> {
        let session = sessions.get(NAME).await?;
        match action {
            1 => {
                assert!(session.is_new());
                session.insert("a", "foo");
                session.insert("b", "bar");
            }
            2 => {
                assert!(!session.is_new());
                assert_eq!(session.get::<String>("a").as_deref(), Some("foo"));
                assert_eq!(session.get::<String>("b").as_deref(), Some("bar"));
                session.add_flash("hello");
            }
            3 => {
                assert_eq!(session.flashes(), vec![Value::from("hello")]);
                sessions.delete(&session).await?;
            }
            4 => {
                assert!(session.is_new());
                assert!(session.is_empty());
            }
            _ => {}
        }
        Ok(())
    }

    fn store(table: MemoryTable) -> SessionStore {
        SessionStore::new(
            table,
            CookieCodec::new([KeyPair::new(SECRET).unwrap()]).unwrap(),
        )
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let table = MemoryTable::new();
        let ep = Route::new()
            .at("/:action", get(index))
            .with(SessionManager::new(store(table.clone())));
        let mut client = TestClient::default();

        assert_eq!(client.call(&ep, 1).await, StatusCode::OK);
        assert!(client.cookie(NAME).is_some());
        assert_eq!(table.len(), 1);

        assert_eq!(client.call(&ep, 2).await, StatusCode::OK);
        assert!(client.cookie(NAME).is_some());
        // the flash was saved under the same identifier
        assert_eq!(table.len(), 1);

        assert_eq!(client.call(&ep, 3).await, StatusCode::OK);
        assert!(client.cookie(NAME).is_none());
        assert!(table.is_empty());

        assert_eq!(client.call(&ep, 4).await, StatusCode::OK);
        assert!(client.cookie(NAME).is_none());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn unchanged_sessions_are_not_saved() {
        let table = MemoryTable::new();
        let ep = Route::new()
            .at("/:action", get(index))
            .with(SessionManager::new(store(table.clone())));
        let mut client = TestClient::default();

        assert_eq!(client.call(&ep, 0).await, StatusCode::OK);
        assert!(client.cookie(NAME).is_none());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn one_session_per_name() {
        #[handler]
        async fn multiple(sessions: &Sessions) -> poem::Result<()> {
            let a = sessions.get("a").await?;
            let b = sessions.get("b").await?;
            assert_ne!(a.id(), b.id());

            a.insert("n", 1);
            assert_eq!(sessions.get("a").await?.get::<i32>("n"), Some(1));
            sessions.save_all().await?;
            assert!(!b.is_new());
            Ok(())
        }

        let table = MemoryTable::new();
        let ep = Route::new()
            .at("/", get(multiple))
            .with(SessionManager::new(store(table.clone())));
        let mut client = TestClient::default();

        assert_eq!(client.call_uri(&ep, "/").await, StatusCode::OK);
        assert!(client.cookie("a").is_some());
        assert!(client.cookie("b").is_some());
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn invalid_cookie_name() {
        #[handler]
        async fn invalid(sessions: &Sessions) -> poem::Result<()> {
            sessions.get("session:key").await?;
            Ok(())
        }

        let ep = Route::new()
            .at("/", get(invalid))
            .with(SessionManager::new(store(MemoryTable::new())));
        let mut client = TestClient::default();
        assert_eq!(client.call_uri(&ep, "/").await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_session_manager() {
        let ep = Route::new().at("/:action", get(index));
        let mut client = TestClient::default();
        assert_eq!(
            client.call(&ep, 1).await,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
