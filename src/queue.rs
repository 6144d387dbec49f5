use crate::envelope::{Envelope, Metadata};
use crate::error::{Result, TimberlineError};
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, Span};
use uuid::Uuid;

/// Set holding the name of every queue that exists.
pub const REGISTRY_KEY: &str = "timberline_queue_names";

/// Attribute suffix of the item list.
pub const ITEMS_SUFFIX: &str = "queue";

/// Attribute suffix of the pause flag.
pub const PAUSED_SUFFIX: &str = "paused";

/// Metadata field stamped with a unique id on push, unless already present.
pub const JOB_ID_FIELD: &str = "job_id";

/// Metadata field stamped with the queue name on push, unless already present.
pub const ORIGIN_QUEUE_FIELD: &str = "origin_queue";

const PAUSED_FLAG: &[u8] = b"true";

/// Prefixes store keys with an optional namespace.
///
/// A namespace must be non-empty and free of `:`, otherwise deleting queue
/// `b` under namespace `a` would also match the keys of namespace `a:b`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySpace {
    namespace: Option<String>,
}

impl KeySpace {
    /// # Errors
    ///
    /// [`TimberlineError::InvalidNamespace`] for an empty namespace or one containing `:`
    pub fn new(namespace: Option<String>) -> Result<Self> {
        if let Some(namespace) = &namespace {
            if namespace.is_empty() || namespace.contains(':') {
                return Err(TimberlineError::InvalidNamespace(namespace.clone()));
            }
        }
        Ok(Self { namespace })
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// `<namespace>:<key>`, or `key` alone without a namespace.
    pub fn key(&self, key: &str) -> String {
        match &self.namespace {
            Some(namespace) => format!("{}:{}", namespace, key),
            None => key.to_string(),
        }
    }

    pub fn registry_key(&self) -> String {
        self.key(REGISTRY_KEY)
    }
}

/// A named queue living in the store.
///
/// The handle itself only holds the name and the read timeout; the items
/// and the pause flag live in the store, so any number of handles (in this
/// process or another) can work on the same queue.
///
/// Queue names must be non-empty and must not contain `:`, which keeps the
/// keys returned by [`attr`](Self::attr) unique across queues.
#[derive(Debug, Clone)]
pub struct Queue {
    store: Arc<dyn Store>,
    keys: KeySpace,
    name: String,
    read_timeout: Duration,
    span: Span,
}

impl Queue {
    /// Attaches to the queue called `name`, registering it if it is new.
    ///
    /// Items and the pause flag left by an earlier session are kept. The
    /// returned handle does not wait on [`pop`](Self::pop).
    ///
    /// # Errors
    ///
    /// * [`TimberlineError::InvalidQueueName`] for an empty name or one containing `:`
    /// * any store error while registering the name
    pub async fn open(
        store: Arc<dyn Store>,
        keys: KeySpace,
        name: impl Into<String>,
        span: Span,
    ) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;

        store
            .add_member(&keys.registry_key(), &name)
            .instrument(span.clone())
            .await?;
        span.in_scope(|| tracing::debug!(queue = %name, "Opened queue"));

        Ok(Self {
            store,
            keys,
            name,
            read_timeout: Duration::ZERO,
            span,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// How long [`pop`](Self::pop) waits for an item. Zero means no waiting.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn set_read_timeout(&mut self, read_timeout: Duration) {
        self.read_timeout = read_timeout;
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Full store key for a per-queue attribute:
    /// `<namespace>:<queue name>:<suffix>`.
    ///
    /// ```
    /// # use timberline::Timberline;
    /// # tokio_test::block_on(async {
    /// let timberline = Timberline::in_memory();
    /// let queue = timberline.queue("test_queue").await?;
    /// assert_eq!(queue.attr("paused"), "test_queue:paused");
    /// # Ok::<(), timberline::TimberlineError>(())
    /// # }).unwrap();
    /// ```
    pub fn attr(&self, suffix: &str) -> String {
        self.keys.key(&format!("{}:{}", self.name, suffix))
    }

    /// Appends `value` to the queue and returns the new length.
    ///
    /// Plain values are wrapped in a fresh [`Envelope`]; an envelope is
    /// queued as it is. Pausing does not stop producers.
    pub async fn push(&self, value: impl Into<Envelope>) -> Result<u64> {
        self.push_with_metadata(value, Metadata::new()).await
    }

    /// Like [`push`](Self::push), merging `metadata` into the envelope first.
    pub async fn push_with_metadata(
        &self,
        value: impl Into<Envelope>,
        metadata: Metadata,
    ) -> Result<u64> {
        let mut envelope = Envelope::wrap(value);
        envelope.attach_metadata(metadata);
        if !envelope.contains(JOB_ID_FIELD) {
            envelope.set(JOB_ID_FIELD, Uuid::now_v7().to_string());
        }
        if !envelope.contains(ORIGIN_QUEUE_FIELD) {
            envelope.set(ORIGIN_QUEUE_FIELD, self.name.as_str());
        }
        let bytes = envelope.serialize()?;

        async {
            let length = self.store.append(&self.attr(ITEMS_SUFFIX), bytes).await?;
            tracing::debug!(queue = %self.name, length, "Pushed item");
            Ok::<_, TimberlineError>(length)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Removes and returns the item at the head of the queue.
    ///
    /// With a zero read timeout this returns `Ok(None)` straight away when
    /// the queue is empty. Otherwise it waits up to the read timeout and
    /// returns as soon as an item shows up.
    ///
    /// # Errors
    ///
    /// [`TimberlineError::Decode`] if the stored bytes are not an envelope.
    /// The undecodable item has already been taken off the queue at that
    /// point.
    pub async fn pop(&self) -> Result<Option<Envelope>> {
        async {
            let key = self.attr(ITEMS_SUFFIX);
            let raw = if self.read_timeout.is_zero() {
                self.store.pop(&key).await?
            } else {
                self.store.pop_blocking(&key, self.read_timeout).await?
            };

            let Some(bytes) = raw else {
                return Ok::<_, TimberlineError>(None);
            };
            match Envelope::deserialize(&bytes) {
                Ok(envelope) => Ok(Some(envelope)),
                Err(err) => {
                    tracing::warn!(queue = %self.name, error = %err, "Dropped undecodable item");
                    Err(err)
                }
            }
        }
        .instrument(self.span.clone())
        .await
    }

    /// Number of items waiting in the queue.
    pub async fn length(&self) -> Result<u64> {
        self.store
            .length(&self.attr(ITEMS_SUFFIX))
            .instrument(self.span.clone())
            .await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.length().await? == 0)
    }

    /// Marks the queue as paused. Workers are expected to check
    /// [`is_paused`](Self::is_paused) before popping.
    pub async fn pause(&self) -> Result<()> {
        async {
            self.store
                .set(&self.attr(PAUSED_SUFFIX), PAUSED_FLAG.to_vec())
                .await?;
            tracing::info!(queue = %self.name, "Paused queue");
            Ok::<_, TimberlineError>(())
        }
        .instrument(self.span.clone())
        .await
    }

    pub async fn unpause(&self) -> Result<()> {
        async {
            self.store
                .delete_keys(&[self.attr(PAUSED_SUFFIX)])
                .await?;
            tracing::info!(queue = %self.name, "Unpaused queue");
            Ok::<_, TimberlineError>(())
        }
        .instrument(self.span.clone())
        .await
    }

    pub async fn is_paused(&self) -> Result<bool> {
        let flag = self
            .store
            .get(&self.attr(PAUSED_SUFFIX))
            .instrument(self.span.clone())
            .await?;
        Ok(flag.as_deref() == Some(PAUSED_FLAG))
    }

    /// Removes every key belonging to this queue (items, pause flag and any
    /// other attribute) and drops the name from the registry.
    ///
    /// The keys are removed one command after another, so an interrupted
    /// delete can leave some of them behind.
    pub async fn delete(&self) -> Result<()> {
        async {
            let keys = self.store.keys_with_prefix(&self.attr("")).await?;
            self.store.delete_keys(&keys).await?;
            self.store
                .remove_member(&self.keys.registry_key(), &self.name)
                .await?;
            tracing::info!(queue = %self.name, keys = keys.len(), "Deleted queue");
            Ok::<_, TimberlineError>(())
        }
        .instrument(self.span.clone())
        .await
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(':') {
        return Err(TimberlineError::InvalidQueueName(name.to_string()));
    }
    Ok(())
}
