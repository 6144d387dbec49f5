//! # Timberline
//!
//! Named, pausable message queues on top of a key-value store with list and
//! set primitives (Redis).
//!
//! Every payload travels inside an [`Envelope`] that carries the value plus
//! any metadata you attach. Queues are addressed by name, can be paused and
//! resumed, and are torn down completely with [`Queue::delete`].
//!
//! ## Quick Start
//!
//! ```
//! use timberline::Timberline;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let timberline = Timberline::in_memory();
//!
//! let queue = timberline
//!     .queue("thumbnails")
//!     .await?
//!     .with_read_timeout(Duration::from_millis(100));
//!
//! queue.push("cat.png").await?;
//!
//! while let Some(envelope) = queue.pop().await? {
//!     println!("Resizing {} (job {})", envelope.contents, envelope["job_id"]);
//! }
//! # Ok::<(), timberline::TimberlineError>(())
//! # }).unwrap();
//! ```
//!
//! ## Features
//!
//! - **Envelopes** - payload plus free-form metadata, read through one accessor
//! - **Blocking pops** - wait up to a per-queue read timeout for work to arrive
//! - **Pause flags** - stored alongside the queue, shared by every worker
//! - **Registry** - every queue name is tracked in a store-side set
//! - **Namespaces** - prefix every key to share a database between apps
//! - **Pluggable store** - [`MemoryStore`](store::MemoryStore) for tests,
//!   `RedisStore` with the `redis` feature
//!
//! ## Configuration
//!
//! [`ConfigBuilder`] resolves connection settings from, in order: values set
//! on the builder, an explicit YAML file, the file named by `TIMBERLINE_YAML`,
//! and `config/timberline.yaml` under an application root.
//!
//! ```no_run
//! use timberline::ConfigBuilder;
//!
//! # fn example() -> Result<(), timberline::TimberlineError> {
//! let config = ConfigBuilder::new()
//!     .database(15)
//!     .framework_root("/srv/app")
//!     .build()?;
//!
//! let params = config.redis_config();
//! assert_eq!(params.db, Some(15));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod queue;
pub mod store;

pub use client::Timberline;
pub use config::{discover_framework_config, Config, ConfigBuilder, ConnectionParams};
pub use envelope::{Envelope, Metadata};
pub use error::{Result, TimberlineError};
pub use queue::{KeySpace, Queue};
pub use store::{MemoryStore, Store};
