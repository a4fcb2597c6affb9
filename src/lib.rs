//! Live audio relay server
//!
//! `relay-rs` registers upstream audio URLs under short generated ids and
//! relays each registered stream to any number of simultaneous HTTP
//! listeners through a single upstream connection.
//!
//! - [`store`] persists the id → URL mapping and a per-session connection log
//!   in sqlite.
//! - [`relay`] is the core: one producer task per id fetches the upstream
//!   stream and fans chunks out to sessions over a broadcast channel, with a
//!   bounded catchup buffer so late joiners start hearing audio immediately.
//! - [`http`] exposes `GET /{id}` (stream) and `POST /add` (register).
//!
//! # Example
//!
//! ```no_run
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//!
//! use relay_rs::http::{router, AppState};
//! use relay_rs::relay::{RelayConfig, RelayManager};
//! use relay_rs::store::{SqliteStore, StreamStore};
//!
//! # async fn example() -> relay_rs::Result<()> {
//! let store = SqliteStore::open("urls.db")?;
//! store.init()?;
//!
//! let manager = Arc::new(RelayManager::new(
//!     RelayConfig::default(),
//!     reqwest::Client::builder().build()?,
//! ));
//!
//! let app = router(AppState {
//!     manager,
//!     store: Arc::new(store),
//! });
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(
//!     listener,
//!     app.into_make_service_with_connect_info::<SocketAddr>(),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod id;
pub mod relay;
pub mod store;

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use relay::{RelayBuffer, RelayConfig, RelayManager};
pub use store::{SqliteStore, StreamStore};
