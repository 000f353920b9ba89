//! QC offline sync client
//!
//! Offline-first request layer for the QC checklist API. Reads are served from
//! a local response cache when the network is gone; mutations are queued in a
//! durable store and replayed in order once connectivity returns.
//!
//! # Example
//!
//! ```rust,no_run
//! use qcsync::{ClientConfig, Method, OfflineClientBuilder, OfflineOptions};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), qcsync::OfflineError> {
//!     let client = OfflineClientBuilder::new(ClientConfig::default())
//!         .build()
//!         .await?;
//!
//!     // Cached for offline use
//!     let templates: Value = client
//!         .request("/templates", Method::Get, None, None, OfflineOptions::cached("templates"))
//!         .await?;
//!     println!("{} templates", templates.as_array().map_or(0, |t| t.len()));
//!
//!     // Queued if the server cannot be reached
//!     let result: Value = client
//!         .request(
//!             "/checklists/7/results",
//!             Method::Post,
//!             Some(json!({"step_id": 1, "ok_flag": true})),
//!             None,
//!             OfflineOptions::queued().with_offline_data(json!({"id": -1})),
//!         )
//!         .await?;
//!     println!("result: {}", result);
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod store;
pub mod sync;

pub use cache::ResponseCache;
pub use client::{
    ApiRequest, Delivery, HttpTransport, OfflineClient, OfflineClientBuilder, OfflineOptions,
    RequestConfig, SharedToken, TokenProvider, Transport,
};
pub use config::{ClientConfig, WriteBackPolicy};
pub use connectivity::{ConnectivityEvent, ConnectivityMonitor};
pub use error::{OfflineError, OfflineResult};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use sync::{DrainReport, Method, QueueItem, SyncEngine, SyncQueue, SyncState};
