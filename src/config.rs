use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use poem::web::cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};

const DEFAULT_MAX_AGE: i64 = 86400 * 30;

/// The `SameSite` policy of the session cookie.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSitePolicy {
    /// `SameSite=Lax`
    Lax,
    /// `SameSite=Strict`
    Strict,
    /// `SameSite=None`
    None,
}

impl From<SameSitePolicy> for SameSite {
    fn from(policy: SameSitePolicy) -> Self {
        match policy {
            SameSitePolicy::Lax => SameSite::Lax,
            SameSitePolicy::Strict => SameSite::Strict,
            SameSitePolicy::None => SameSite::None,
        }
    }
}

/// Cookie attributes of a session, persisted together with its values.
///
/// `max_age` is in seconds: a positive value sets `Max-Age` and `Expires`,
/// zero makes a browser-session cookie, and a negative value deletes the
/// session when it is saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SessionOptions {
    /// The `Path` attribute. Default is `/`.
    pub path: String,
    /// The `Domain` attribute.
    pub domain: Option<String>,
    /// Lifetime in seconds. Default is 30 days.
    pub max_age: i64,
    /// The `Secure` attribute. Default is `true`.
    pub secure: bool,
    /// The `HttpOnly` attribute. Default is `true`.
    pub http_only: bool,
    /// The `SameSite` attribute.
    pub same_site: Option<SameSitePolicy>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            max_age: DEFAULT_MAX_AGE,
            secure: true,
            http_only: true,
            same_site: None,
        }
    }
}

impl SessionOptions {
    /// Returns `true` if saving the session must delete it.
    #[inline]
    pub fn is_removal(&self) -> bool {
        self.max_age < 0
    }

    /// Builds the cookie carrying `value` with these attributes.
    pub(crate) fn to_cookie(&self, name: &str, value: &str) -> Cookie {
        let mut cookie = Cookie::new_with_str(name, value);

        cookie.set_path(&self.path);
        if let Some(domain) = &self.domain {
            cookie.set_domain(domain);
        }
        cookie.set_secure(self.secure);
        cookie.set_http_only(self.http_only);
        cookie.set_same_site(self.same_site.map(SameSite::from));

        if self.max_age > 0 {
            cookie.set_max_age(Duration::from_secs(self.max_age as u64));
            if let Some(expires) = TimeDelta::try_seconds(self.max_age)
                .and_then(|max_age| Utc::now().checked_add_signed(max_age))
            {
                cookie.set_expires(expires);
            }
        } else if self.max_age < 0 {
            cookie.set_max_age(Duration::ZERO);
            if let Some(expires) = DateTime::<Utc>::from_timestamp(1, 0) {
                cookie.set_expires(expires);
            }
        }

        cookie
    }

    /// Builds the cookie that clears the client-side session value.
    pub(crate) fn to_removal_cookie(&self, name: &str) -> Cookie {
        Self {
            max_age: -1,
            ..self.clone()
        }
        .to_cookie(name, "")
    }
}

/// A configuration for [`SessionStore`](crate::SessionStore).
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    pub(crate) options: SessionOptions,
    pub(crate) operation_timeout: Option<Duration>,
    pub(crate) surface_read_errors: bool,
}

impl StoreConfig {
    /// Create a [`StoreConfig`].
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the options given to new sessions.
    #[must_use]
    pub fn options(self, options: SessionOptions) -> Self {
        Self { options, ..self }
    }

    /// Sets the deadline of every backing store operation.
    ///
    /// Default is no deadline. An operation that exceeds it fails with
    /// [`Error::Timeout`](crate::Error::Timeout).
    #[must_use]
    pub fn operation_timeout(self, timeout: impl Into<Option<Duration>>) -> Self {
        Self {
            operation_timeout: timeout.into(),
            ..self
        }
    }

    /// Return backing store read failures from
    /// [`SessionStore::new_session`](crate::SessionStore::new_session)
    /// instead of issuing a fresh session.
    ///
    /// Default is `false`: an unreachable store is indistinguishable from a
    /// missing session.
    #[must_use]
    pub fn surface_read_errors(self, value: bool) -> Self {
        Self {
            surface_read_errors: value,
            ..self
        }
    }
}

/// A configuration for the backing store tables.
#[derive(Debug, Clone)]
pub struct TableConfig {
    pub(crate) table_name: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            table_name: "poem_sessions".to_string(),
        }
    }
}

impl TableConfig {
    /// Create a [`TableConfig`].
    pub fn new() -> Self {
        Default::default()
    }

    /// Specifies the table name.
    #[must_use]
    pub fn table_name(self, table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }
}
