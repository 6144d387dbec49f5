use crate::{
    config::Config,
    envelope::{Envelope, Metadata},
    error::{Result, TimberlineError},
    queue::{KeySpace, Queue},
    store::{MemoryStore, Store},
};
use std::sync::Arc;
use tracing::{Instrument, Span};

/// Entry point to a set of queues sharing one store connection.
///
/// A `Timberline` bundles the store handle, the key namespace and the span
/// used for logging. It is cheap to clone; every clone talks to the same
/// store.
///
/// # Examples
///
/// ```
/// use timberline::Timberline;
///
/// # tokio_test::block_on(async {
/// let timberline = Timberline::in_memory();
///
/// let queue = timberline.queue("emails").await?;
/// queue.push("welcome@example.com").await?;
///
/// if let Some(envelope) = queue.pop().await? {
///     println!("Sending to {}", envelope.contents);
/// }
/// # Ok::<(), timberline::TimberlineError>(())
/// # }).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct Timberline {
    store: Arc<dyn Store>,
    keys: KeySpace,
    span: Span,
}

impl Timberline {
    /// Connects to Redis with the resolved configuration.
    ///
    /// ```no_run
    /// use timberline::{Config, Timberline};
    ///
    /// # async fn example() -> Result<(), timberline::TimberlineError> {
    /// let config = Config::load()?;
    /// let timberline = Timberline::connect(&config).await?;
    /// let queue = timberline.queue("reports").await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Any connection failure reported by the store adapter, unmodified.
    #[cfg(feature = "redis")]
    pub async fn connect(config: &Config) -> Result<Self> {
        let keys = KeySpace::new(config.namespace.clone())?;
        let store = crate::store::RedisStore::connect(&config.redis_config()).await?;
        Ok(Self::from_parts(Arc::new(store), keys, config.logger.clone()))
    }

    /// Uses an already constructed store. Only `namespace` and `logger` are
    /// read from `config`; connection settings are the store's business.
    ///
    /// # Errors
    ///
    /// [`TimberlineError::InvalidNamespace`] if the namespace is empty or contains `:`.
    pub fn with_store(store: Arc<dyn Store>, config: &Config) -> Result<Self> {
        let keys = KeySpace::new(config.namespace.clone())?;
        Ok(Self::from_parts(store, keys, config.logger.clone()))
    }

    /// A handle over a fresh [`MemoryStore`], without a namespace.
    pub fn in_memory() -> Self {
        Self::from_parts(Arc::new(MemoryStore::new()), KeySpace::default(), None)
    }

    fn from_parts(store: Arc<dyn Store>, keys: KeySpace, logger: Option<Span>) -> Self {
        let span = logger.unwrap_or_else(|| {
            tracing::info_span!("timberline", namespace = keys.namespace().unwrap_or(""))
        });
        Self { store, keys, span }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.keys.namespace()
    }

    /// Direct access to the underlying store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Opens the queue called `name`, registering it if needed.
    /// See [`Queue::open`].
    pub async fn queue(&self, name: impl Into<String>) -> Result<Queue> {
        Queue::open(
            Arc::clone(&self.store),
            self.keys.clone(),
            name,
            self.span.clone(),
        )
        .await
    }

    /// Pushes onto the named queue in one call, returning the new length.
    pub async fn push(
        &self,
        queue_name: impl Into<String>,
        value: impl Into<Envelope>,
        metadata: Metadata,
    ) -> Result<u64> {
        self.queue(queue_name)
            .await?
            .push_with_metadata(value, metadata)
            .await
    }

    /// Names of every registered queue, sorted.
    pub async fn queue_names(&self) -> Result<Vec<String>> {
        let mut names = self
            .store
            .members(&self.keys.registry_key())
            .instrument(self.span.clone())
            .await?;
        names.sort();
        Ok(names)
    }

    /// A handle for every registered queue.
    pub async fn all_queues(&self) -> Result<Vec<Queue>> {
        let mut queues = Vec::new();
        for name in self.queue_names().await? {
            queues.push(self.queue(name).await?);
        }
        Ok(queues)
    }

    /// Wipes the store. Meant for tests and operational resets.
    pub async fn flush(&self) -> Result<()> {
        async {
            self.store.flush_all().await?;
            tracing::warn!("Flushed store");
            Ok::<_, TimberlineError>(())
        }
        .instrument(self.span.clone())
        .await
    }

    /// Releases this handle's share of the store connection. The connection
    /// itself closes once the last clone and every [`Queue`] from it are gone.
    pub fn close(self) {
        let handles = Arc::strong_count(&self.store);
        self.span
            .in_scope(|| tracing::debug!(handles, "Closing timberline handle"));
    }
}
