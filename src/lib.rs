//! Server-side session storage for Poem
//!
//! The client only ever holds an authenticated (and optionally encrypted)
//! session identifier in a cookie. Session values and cookie options live in
//! a key-value table, DynamoDB by default.
//!
//! # Crate features
//!
//! | feature   | table                            |
//! |-----------|----------------------------------|
//! | dynamodb  | [`DynamoTable`] (default)        |
//! | redis     | [`RedisTable`]                   |
//!
//! [`MemoryTable`] is always available.
//!
//! ## Example
//!
//! ```rust,ignore
//! use poem::{get, handler, EndpointExt, Route};
//! use poem_dynamosession::{
//!     CookieCodec, DynamoTable, KeyPair, SessionManager, SessionStore, Sessions, TableConfig,
//! };
//!
//! #[handler]
//! async fn index(sessions: &Sessions) -> poem::Result<()> {
//!     let session = sessions.get("session").await?;
//!     session.insert("user", "alice");
//!     Ok(())
//! }
//!
//! let table = DynamoTable::from_env(TableConfig::new().table_name("sessions")).await;
//! let codec = CookieCodec::new([KeyPair::new(signing_secret)?])?;
//! let route = Route::new()
//!     .at("/", get(index))
//!     .with(SessionManager::new(SessionStore::new(table, codec)));
//! ```

#![doc(html_favicon_url = "https://poem.rs/assets/favicon.ico")]
#![doc(html_logo_url = "https://poem.rs/assets/logo.png")]
#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

mod codec;
mod config;
#[cfg(feature = "dynamodb")]
mod dynamodb;
mod error;
mod id;
mod memory;
mod middleware;
#[cfg(feature = "redis")]
mod redis_table;
mod serializer;
mod session;
mod store;
mod table;
#[cfg(test)]
mod test_harness;
mod value;

pub use codec::{CookieCodec, KeyPair, MIN_SECRET_LEN};
pub use config::{SameSitePolicy, SessionOptions, StoreConfig, TableConfig};
#[cfg(feature = "dynamodb")]
pub use dynamodb::DynamoTable;
pub use error::{Error, Result};
pub use memory::MemoryTable;
pub use middleware::{SessionManager, SessionManagerEndpoint, Sessions};
#[cfg(feature = "redis")]
pub use redis_table::RedisTable;
pub use serializer::ValueSerializer;
pub use session::{Session, SessionStatus, FLASH_KEY};
pub use store::SessionStore;
pub use table::{SessionTable, StoredRecord};
pub use value::{SessionType, TypeRegistry, Value};
