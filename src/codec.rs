use std::time::Duration;

use chrono::Utc;
use poem::web::cookie::{Cookie, CookieJar, CookieKey};

use crate::{Error, Result};

/// Secrets shorter than this are rejected.
pub const MIN_SECRET_LEN: usize = 32;

const DEFAULT_TOKEN_MAX_AGE: Duration = Duration::from_secs(86400 * 30);

/// A signing key and an optional encryption key.
#[derive(Clone)]
pub struct KeyPair {
    signing: CookieKey,
    encryption: Option<CookieKey>,
}

impl KeyPair {
    /// Create a key pair that only signs the cookie value.
    ///
    /// The secret must be at least [`MIN_SECRET_LEN`] bytes long.
    pub fn new(signing_secret: impl AsRef<[u8]>) -> Result<Self> {
        Ok(Self {
            signing: derive_key(signing_secret.as_ref())?,
            encryption: None,
        })
    }

    /// Also encrypt the cookie value before it is signed.
    ///
    /// The secret must be at least [`MIN_SECRET_LEN`] bytes long.
    pub fn with_encryption(self, encryption_secret: impl AsRef<[u8]>) -> Result<Self> {
        Ok(Self {
            encryption: Some(derive_key(encryption_secret.as_ref())?),
            ..self
        })
    }

    /// Create a key pair with random signing and encryption keys.
    pub fn generate() -> Self {
        Self {
            signing: CookieKey::generate(),
            encryption: Some(CookieKey::generate()),
        }
    }
}

fn derive_key(secret: &[u8]) -> Result<CookieKey> {
    if secret.len() < MIN_SECRET_LEN {
        return Err(Error::InvalidKey("secret must be at least 32 bytes"));
    }
    Ok(CookieKey::derive_from(secret))
}

/// Authenticates, and optionally encrypts, the session identifier carried
/// by the session cookie.
///
/// Tokens are always produced with the first key pair. Decoding tries every
/// pair in order, so prepending a new pair rotates keys without
/// invalidating cookies issued under the older ones.
///
/// The cookie name is part of the authenticated payload: a token issued for
/// one cookie never decodes under another name.
#[derive(Clone)]
pub struct CookieCodec {
    key_pairs: Vec<KeyPair>,
    max_age: Option<Duration>,
}

impl CookieCodec {
    /// Create a codec from key pairs ordered newest first.
    pub fn new(key_pairs: impl IntoIterator<Item = KeyPair>) -> Result<Self> {
        let key_pairs = key_pairs.into_iter().collect::<Vec<_>>();
        if key_pairs.is_empty() {
            return Err(Error::InvalidKey("at least one key pair is required"));
        }
        Ok(Self {
            key_pairs,
            max_age: Some(DEFAULT_TOKEN_MAX_AGE),
        })
    }

    /// Sets the maximum age of tokens accepted by [`CookieCodec::decode`].
    /// Default is 30 days, `None` accepts tokens of any age.
    #[must_use]
    pub fn max_age(self, value: impl Into<Option<Duration>>) -> Self {
        Self {
            max_age: value.into(),
            ..self
        }
    }

    /// Encode the session identifier into a cookie value.
    pub fn encode(&self, name: &str, value: &str) -> Result<String> {
        self.encode_at(name, value, Utc::now().timestamp())
    }

    pub(crate) fn encode_at(&self, name: &str, value: &str, timestamp: i64) -> Result<String> {
        let pair = self.key_pairs.first().ok_or(Error::EncodeCookie)?;
        let mut token = format!("{name}|{timestamp}|{value}");

        if let Some(key) = &pair.encryption {
            token = seal(name, token, |jar, cookie| {
                jar.private_with_key(key).add(cookie)
            })?;
        }
        seal(name, token, |jar, cookie| {
            jar.signed_with_key(&pair.signing).add(cookie)
        })
    }

    /// Decode a cookie value back into the session identifier.
    ///
    /// Every failure (bad signature, failed decryption, wrong cookie name,
    /// malformed or expired token) is reported as [`Error::DecodeCookie`].
    pub fn decode(&self, name: &str, token: &str) -> Result<String> {
        let payload = self
            .key_pairs
            .iter()
            .find_map(|pair| open_with(pair, name, token))
            .ok_or_else(|| {
                tracing::debug!(cookie = name, "cookie value failed authentication");
                Error::DecodeCookie
            })?;

        let mut parts = payload.rsplitn(3, '|');
        let (value, timestamp, token_name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(value), Some(timestamp), Some(token_name)) => (value, timestamp, token_name),
            _ => {
                tracing::debug!(cookie = name, "malformed cookie payload");
                return Err(Error::DecodeCookie);
            }
        };

        if token_name != name {
            tracing::debug!(cookie = name, "cookie value was issued for another name");
            return Err(Error::DecodeCookie);
        }

        let timestamp = timestamp.parse::<i64>().map_err(|_| {
            tracing::debug!(cookie = name, "malformed cookie timestamp");
            Error::DecodeCookie
        })?;
        if let Some(max_age) = self.max_age {
            let age = Utc::now().timestamp().saturating_sub(timestamp);
            if age > max_age.as_secs() as i64 {
                tracing::debug!(cookie = name, age, "cookie value expired");
                return Err(Error::DecodeCookie);
            }
        }

        Ok(value.to_string())
    }
}

fn seal(name: &str, value: String, add: impl FnOnce(&CookieJar, Cookie)) -> Result<String> {
    let jar = CookieJar::default();
    add(&jar, Cookie::new_with_str(name, value));
    jar.get(name)
        .map(|cookie| cookie.value_str().to_string())
        .ok_or(Error::EncodeCookie)
}

fn open(name: &str, token: &str, get: impl FnOnce(&CookieJar) -> Option<Cookie>) -> Option<String> {
    let jar = CookieJar::default();
    jar.add(Cookie::new_with_str(name, token));
    get(&jar).map(|cookie| cookie.value_str().to_string())
}

fn open_with(pair: &KeyPair, name: &str, token: &str) -> Option<String> {
    let verified = open(name, token, |jar| jar.signed_with_key(&pair.signing).get(name))?;
    match &pair.encryption {
        Some(key) => open(name, &verified, |jar| jar.private_with_key(key).get(name)),
        None => Some(verified),
    }
}
