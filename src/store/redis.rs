use super::Store;
use crate::config::ConnectionParams;
use crate::error::{Result, TimberlineError};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::fmt;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 6379;
const SCAN_BATCH: usize = 250;
/// Longer waits are sent to `BLPOP` as 0, its "no deadline" value.
const MAX_BLPOP_SECS: f64 = 1_000_000_000.0;

/// A [`Store`] backed by a Redis server.
///
/// Regular commands share one multiplexed connection. Each blocking pop
/// opens its own connection, because `BLPOP` parks the connection it runs on
/// and would otherwise hold up every other queue using the shared one.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    connection: MultiplexedConnection,
    connect_timeout: Option<Duration>,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("addr", &self.client.get_connection_info().addr)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl RedisStore {
    /// Connects using resolved connection parameters. Unset fields fall back
    /// to Redis' own defaults (`127.0.0.1:6379`, database 0, no password).
    ///
    /// # Errors
    ///
    /// * [`TimberlineError::Timeout`] if `timeout` is set and the connection
    ///   is not established in time
    /// * [`TimberlineError::Redis`] for any failure reported by the client
    pub async fn connect(params: &ConnectionParams) -> Result<Self> {
        let url = connection_url(params)?;
        let client = Client::open(url.as_str())?;
        let connection = open_connection(&client, params.timeout).await?;

        tracing::debug!(
            host = params.host.as_deref().unwrap_or(DEFAULT_HOST),
            port = params.port.unwrap_or(DEFAULT_PORT),
            db = params.db.unwrap_or(0),
            "Connected to redis"
        );

        Ok(Self {
            client,
            connection,
            connect_timeout: params.timeout,
        })
    }

    fn shared(&self) -> MultiplexedConnection {
        self.connection.clone()
    }
}

async fn open_connection(
    client: &Client,
    connect_timeout: Option<Duration>,
) -> Result<MultiplexedConnection> {
    match connect_timeout {
        Some(limit) => timeout(limit, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| TimberlineError::Timeout(limit.as_millis() as u64))?
            .map_err(Into::into),
        None => Ok(client.get_multiplexed_async_connection().await?),
    }
}

fn connection_url(params: &ConnectionParams) -> Result<Url> {
    let host = params.host.as_deref().unwrap_or(DEFAULT_HOST);
    let port = params.port.unwrap_or(DEFAULT_PORT);
    let mut url = Url::parse(&format!("redis://{}:{}", host, port))
        .map_err(|e| TimberlineError::Connection(format!("Invalid redis host {host:?}: {e}")))?;

    if let Some(password) = params.password.as_deref() {
        url.set_password(Some(password))
            .map_err(|_| TimberlineError::Connection("Unable to encode redis password".to_string()))?;
    }
    if let Some(db) = params.db {
        url.set_path(&db.to_string());
    }
    Ok(url)
}

fn blpop_timeout(timeout: Duration) -> f64 {
    let secs = timeout.as_secs_f64();
    if secs > MAX_BLPOP_SECS {
        0.0
    } else {
        secs
    }
}

/// Escapes glob metacharacters so a key prefix matches literally in `SCAN MATCH`.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[async_trait]
impl Store for RedisStore {
    async fn append(&self, key: &str, value: Vec<u8>) -> Result<u64> {
        let length: u64 = self.shared().rpush(key, value).await?;
        Ok(length)
    }

    async fn pop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let item: Option<Vec<u8>> = self.shared().lpop(key, None).await?;
        Ok(item)
    }

    async fn pop_blocking(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        // BLPOP treats 0 as "wait forever".
        if timeout.is_zero() {
            return self.pop(key).await;
        }

        let mut dedicated = open_connection(&self.client, self.connect_timeout).await?;
        let popped: Option<(String, Vec<u8>)> = redis::cmd("BLPOP")
            .arg(key)
            .arg(blpop_timeout(timeout))
            .query_async(&mut dedicated)
            .await?;
        Ok(popped.map(|(_, item)| item))
    }

    async fn length(&self, key: &str) -> Result<u64> {
        let length: u64 = self.shared().llen(key).await?;
        Ok(length)
    }

    async fn is_member(&self, set_key: &str, member: &str) -> Result<bool> {
        let found: bool = self.shared().sismember(set_key, member).await?;
        Ok(found)
    }

    async fn add_member(&self, set_key: &str, member: &str) -> Result<()> {
        let _: () = self.shared().sadd(set_key, member).await?;
        Ok(())
    }

    async fn remove_member(&self, set_key: &str, member: &str) -> Result<()> {
        let _: () = self.shared().srem(set_key, member).await?;
        Ok(())
    }

    async fn members(&self, set_key: &str) -> Result<Vec<String>> {
        let members: Vec<String> = self.shared().smembers(set_key).await?;
        Ok(members)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value: Option<Vec<u8>> = self.shared().get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let _: () = self.shared().set(key, value).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let found: bool = self.shared().exists(key).await?;
        Ok(found)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut connection = self.shared();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut connection)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may report a key more than once.
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let _: () = self.shared().del(keys).await?;
        Ok(())
    }

    /// Flushes the selected database only (`FLUSHDB`), not the whole server.
    async fn flush_all(&self) -> Result<()> {
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut self.shared())
            .await?;
        Ok(())
    }
}
