//! Result caching for analytics outputs.
//!
//! [`CacheStore`] is the in-process backend and [`WarehouseCache`] keeps
//! entries in the DuckDB warehouse so they outlive one CLI process.
//! [`ResultCache`] layers typed access and per-key single-flight on top of any
//! [`CacheBackend`].

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use paperfolio_warehouse::Warehouse;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{CalendarDate, Symbol, ValidationError};

/// Read/write behaviour of the result cache for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Serve a fresh entry when present, otherwise compute and store. (Default)
    #[default]
    Use,
    /// Always compute and overwrite the stored entry.
    Refresh,
    /// Always compute; never read or write.
    Bypass,
}

impl CacheMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Use => "use",
            Self::Refresh => "refresh",
            Self::Bypass => "bypass",
        }
    }
}

impl Display for CacheMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheMode {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "use" => Ok(Self::Use),
            "refresh" => Ok(Self::Refresh),
            "bypass" => Ok(Self::Bypass),
            _ => Err(ValidationError::InvalidCacheMode {
                value: value.to_owned(),
            }),
        }
    }
}

pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Storage for serialized results keyed by string.
pub trait CacheBackend: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>>;

    /// `ttl = None` uses the backend default.
    fn put<'a>(&'a self, key: &'a str, body: String, ttl: Option<Duration>) -> CacheFuture<'a, ()>;

    fn invalidate<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    body: String,
    expires_at: Instant,
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
    default_ttl: Duration,
}

impl CacheInner {
    fn get(&self, key: &str) -> Option<String> {
        self.map
            .get(key)
            .filter(|entry| Instant::now() <= entry.expires_at)
            .map(|entry| entry.body.clone())
    }

    fn put(&mut self, key: String, body: String, ttl_override: Option<Duration>) {
        let ttl = ttl_override.unwrap_or(self.default_ttl);
        let expires_at = Instant::now() + ttl;
        self.map.insert(key, CacheEntry { body, expires_at });
    }
}

/// In-process TTL map.
#[derive(Debug, Clone)]
pub struct CacheStore {
    inner: Arc<tokio::sync::RwLock<CacheInner>>,
}

impl CacheStore {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(CacheInner {
                map: HashMap::new(),
                default_ttl,
            })),
        }
    }

    /// A store with TTL zero; nothing is ever kept.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.inner.read().await.get(key)
    }

    pub async fn put(&self, key: String, body: String, ttl_override: Option<Duration>) {
        let mut store = self.inner.write().await;
        if store.default_ttl == Duration::ZERO {
            return;
        }
        store.put(key, body, ttl_override);
    }

    pub async fn remove(&self, key: &str) {
        self.inner.write().await.map.remove(key);
    }

    pub async fn clear_expired(&self) {
        let now = Instant::now();
        self.inner
            .write()
            .await
            .map
            .retain(|_, entry| entry.expires_at > now);
    }

    pub async fn clear(&self) {
        self.inner.write().await.map.clear();
    }

    /// Number of entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_disabled(&self) -> bool {
        self.inner.read().await.default_ttl == Duration::ZERO
    }
}

impl CacheBackend for CacheStore {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>> {
        Box::pin(CacheStore::get(self, key))
    }

    fn put<'a>(&'a self, key: &'a str, body: String, ttl: Option<Duration>) -> CacheFuture<'a, ()> {
        Box::pin(CacheStore::put(self, key.to_owned(), body, ttl))
    }

    fn invalidate<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
        Box::pin(self.remove(key))
    }
}

/// Entries stored in the warehouse `result_cache` table.
///
/// Storage failures are logged and read as misses; a broken cache never fails
/// the computation it wraps.
#[derive(Clone)]
pub struct WarehouseCache {
    warehouse: Warehouse,
    default_ttl: Duration,
}

impl WarehouseCache {
    pub fn new(warehouse: Warehouse, default_ttl: Duration) -> Self {
        Self {
            warehouse,
            default_ttl,
        }
    }

    /// Drops expired rows; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let warehouse = self.warehouse.clone();
        let now = now_ms();
        match tokio::task::spawn_blocking(move || warehouse.purge_expired_results(now)).await {
            Ok(Ok(removed)) => removed,
            Ok(Err(error)) => {
                warn!(%error, "result cache purge failed");
                0
            }
            Err(error) => {
                warn!(%error, "result cache purge task failed");
                0
            }
        }
    }

    async fn load(&self, key: String) -> Option<String> {
        let warehouse = self.warehouse.clone();
        let now = now_ms();
        let lookup = key.clone();
        match tokio::task::spawn_blocking(move || warehouse.load_cached_result(&lookup, now)).await {
            Ok(Ok(body)) => body,
            Ok(Err(error)) => {
                warn!(key = %key, %error, "result cache read failed; treating as miss");
                None
            }
            Err(error) => {
                warn!(key = %key, %error, "result cache read task failed");
                None
            }
        }
    }

    async fn store(&self, key: String, body: String, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            return;
        }

        let warehouse = self.warehouse.clone();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now_ms().saturating_add(ttl_ms);
        let target = key.clone();
        match tokio::task::spawn_blocking(move || warehouse.store_cached_result(&target, &body, expires_at))
            .await
        {
            Ok(Ok(())) => debug!(key = %key, "result cached in warehouse"),
            Ok(Err(error)) => warn!(key = %key, %error, "result cache write failed"),
            Err(error) => warn!(key = %key, %error, "result cache write task failed"),
        }
    }

    async fn remove(&self, key: String) {
        let warehouse = self.warehouse.clone();
        let target = key.clone();
        match tokio::task::spawn_blocking(move || warehouse.remove_cached_result(&target)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(key = %key, %error, "result cache invalidation failed"),
            Err(error) => warn!(key = %key, %error, "result cache invalidation task failed"),
        }
    }
}

impl CacheBackend for WarehouseCache {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>> {
        Box::pin(self.load(key.to_owned()))
    }

    fn put<'a>(&'a self, key: &'a str, body: String, ttl: Option<Duration>) -> CacheFuture<'a, ()> {
        Box::pin(self.store(key.to_owned(), body, ttl))
    }

    fn invalidate<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
        Box::pin(self.remove(key.to_owned()))
    }
}

fn now_ms() -> i64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(nanos).unwrap_or(i64::MAX)
}

/// A cached or freshly computed value.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup<T> {
    pub value: T,
    pub cache_hit: bool,
}

type KeyGate = Arc<tokio::sync::Mutex<()>>;

/// Typed memoization with one in-flight computation per key.
#[derive(Clone)]
pub struct ResultCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    in_flight: Arc<Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>>,
}

impl ResultCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// In-process cache holding entries for `ttl`.
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(CacheStore::new(ttl)), ttl)
    }

    /// Cache persisted in the warehouse, shared by every process using it.
    pub fn persistent(warehouse: Warehouse, ttl: Duration) -> Self {
        Self::new(Arc::new(WarehouseCache::new(warehouse, ttl)), ttl)
    }

    pub async fn get<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let body = self.backend.get(key).await?;
        match serde_json::from_str(&body) {
            Ok(value) => Some(value),
            Err(error) => {
                debug!(key, %error, "cached body did not deserialize; treating as miss");
                None
            }
        }
    }

    pub async fn invalidate(&self, key: &str) {
        self.backend.invalidate(key).await;
    }

    /// Return the cached value for `key`, or run `compute` and store its output.
    ///
    /// Concurrent callers for the same key wait for the first computation and
    /// then read its stored value instead of computing again.
    pub async fn compute_if_absent<T, F, Fut>(
        &self,
        key: &str,
        mode: CacheMode,
        compute: F,
    ) -> CacheLookup<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lookup = self
            .try_compute_if_absent(key, mode, move || async move {
                Ok::<T, Infallible>(compute().await)
            })
            .await;
        match lookup {
            Ok(lookup) => lookup,
            Err(never) => match never {},
        }
    }

    /// Like [`ResultCache::compute_if_absent`], but errors are returned to the
    /// caller and never stored.
    pub async fn try_compute_if_absent<T, E, F, Fut>(
        &self,
        key: &str,
        mode: CacheMode,
        compute: F,
    ) -> Result<CacheLookup<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if mode == CacheMode::Bypass {
            return Ok(CacheLookup {
                value: compute().await?,
                cache_hit: false,
            });
        }

        if mode == CacheMode::Use {
            if let Some(value) = self.get(key).await {
                return Ok(CacheLookup {
                    value,
                    cache_hit: true,
                });
            }
        }

        let gate = self.gate_for(key);
        let _guard = gate.lock().await;

        if mode == CacheMode::Use {
            if let Some(value) = self.get(key).await {
                debug!(key, "served by concurrent computation");
                return Ok(CacheLookup {
                    value,
                    cache_hit: true,
                });
            }
        }

        let value = compute().await?;
        match serde_json::to_string(&value) {
            Ok(body) => self.backend.put(key, body, Some(self.ttl)).await,
            Err(error) => warn!(key, %error, "result not cached; serialization failed"),
        }

        Ok(CacheLookup {
            value,
            cache_hit: false,
        })
    }

    fn gate_for(&self, key: &str) -> KeyGate {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        in_flight.retain(|_, gate| gate.strong_count() > 0);

        if let Some(gate) = in_flight.get(key).and_then(Weak::upgrade) {
            return gate;
        }

        let gate = Arc::new(tokio::sync::Mutex::new(()));
        in_flight.insert(key.to_owned(), Arc::downgrade(&gate));
        gate
    }
}

pub fn beta_key(asset: &Symbol, benchmark: &Symbol, as_of: CalendarDate) -> String {
    format!("beta:{asset}:{benchmark}:{as_of}")
}

pub fn cagr_key(asset: &Symbol, as_of: CalendarDate) -> String {
    format!("cagr:{asset}:{as_of}")
}

pub fn npv_key(
    asset: &Symbol,
    benchmark: &Symbol,
    as_of: CalendarDate,
    investment: f64,
    horizon_years: u32,
) -> String {
    format!("npv:{asset}:{benchmark}:{as_of}:{investment}:{horizon_years}")
}
