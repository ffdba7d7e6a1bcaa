//! Read-only backend mirroring a remote published dataset.
//!
//! [`SnapshotCache`] holds one immutable `Arc<Vec<Document>>` per table. A
//! refresh fetches every table first and only then publishes the new `Arc`s,
//! so a failed cycle changes nothing and readers always see a whole table.
//! The lock around each slot is held just long enough to copy or replace the
//! pointer; filtering runs on the reader's own `Arc`.
//!
//! [`RefreshScheduler`] re-runs the refresh on a timer from its own tokio task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use nt_core::config::MAX_REFRESH_SECS;
use nt_core::document::parse_timestamp;
use nt_core::filter::matches;
use nt_core::{DbDriver, Document, Error, Filter, Result, Settings, SnapshotSettings};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::source::{HttpSnapshotSource, SnapshotSource};
use crate::StorageBackend;

const DRIVER_NAME: &str = "snapshot";

type Table = Arc<Vec<Document>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Every table was replaced; carries the total document count.
    Completed(usize),
    /// Another refresh was already running.
    Skipped,
}

pub struct SnapshotCache {
    source: Arc<dyn SnapshotSource>,
    settings: SnapshotSettings,
    tables: HashMap<String, RwLock<Table>>,
    refreshing: AtomicBool,
    generation: AtomicU64,
}

/// Clears the in-progress flag however the refresh ends.
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SnapshotCache {
    /// Creates an empty cache for the configured tables. Nothing is fetched
    /// until [`SnapshotCache::refresh`] runs.
    pub fn new(source: Arc<dyn SnapshotSource>, settings: SnapshotSettings) -> Self {
        let tables = settings
            .tables
            .iter()
            .map(|name| (name.clone(), RwLock::new(Table::default())))
            .collect();
        Self {
            source,
            settings,
            tables,
            refreshing: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &SnapshotSettings {
        &self.settings
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    /// Number of completed refresh cycles.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Fetch all tables and swap them in. A refresh already in progress makes
    /// this call a no-op returning [`RefreshOutcome::Skipped`].
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Snapshot refresh already running, skipping");
            return Ok(RefreshOutcome::Skipped);
        }
        let _guard = RefreshGuard(&self.refreshing);

        let fetched = self.fetch_all().await?;
        let mut total = 0;
        for (name, documents) in fetched {
            total += documents.len();
            if let Some(slot) = self.tables.get(&name) {
                *slot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(documents);
            }
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(RefreshOutcome::Completed(total))
    }

    async fn fetch_all(&self) -> Result<Vec<(String, Vec<Document>)>> {
        let mut fetched = Vec::with_capacity(self.settings.tables.len());
        for table in &self.settings.tables {
            debug!("Trying to get db data for `{}`", table);
            let documents = self
                .source
                .fetch_table(table)
                .await
                .and_then(|documents| self.parse_datetimes(table, documents))
                .map_err(|e| {
                    let desc = format!("Error getting snapshot data for `{}`, except: {}", table, e);
                    error!("{}", desc);
                    Error::Connect(desc)
                })?;
            info!("Done collect data from snapshot for `{}`, Got {}", table, documents.len());
            fetched.push((table.clone(), documents));
        }
        Ok(fetched)
    }

    /// Normalizes the registered timestamp fields of `table` to RFC 3339.
    /// Other fields pass through untouched.
    fn parse_datetimes(&self, table: &str, mut documents: Vec<Document>) -> Result<Vec<Document>> {
        let Some(fields) = self.settings.datetime_fields.get(table) else {
            return Ok(documents);
        };
        for document in &mut documents {
            for field in fields {
                let Some(Value::String(text)) = document.get(field) else {
                    continue;
                };
                if text.is_empty() {
                    continue;
                }
                let parsed = parse_timestamp(text).ok_or_else(|| {
                    Error::Database(format!("Malformed timestamp `{}` in field `{}`", text, field))
                })?;
                document.insert(
                    field.clone(),
                    Value::String(parsed.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
                );
            }
        }
        Ok(documents)
    }

    fn table(&self, name: &str) -> Result<Table> {
        self.tables
            .get(name)
            .map(|slot| slot.read().unwrap_or_else(PoisonError::into_inner).clone())
            .ok_or_else(|| Error::NotFound(format!("Unknown snapshot table: '{}'", name)))
    }

    pub fn get_one(&self, table: &str, filter: &Filter) -> Result<Document> {
        debug!("Trying to get one data from table: '{}', db: '{}'", table, DRIVER_NAME);
        let documents = self.table(table)?;
        match documents.iter().find(|document| matches(document, filter)) {
            Some(document) => {
                info!("Got data from db: '{}', table_name: '{}'", DRIVER_NAME, table);
                Ok(document.clone())
            }
            None => {
                let desc = format!("Error find data with filter: {:?}, table: '{}', db: '{}'", filter, table, DRIVER_NAME);
                warn!("{}", desc);
                Err(Error::NotFound(desc))
            }
        }
    }

    pub fn get_many(&self, table: &str, filter: &Filter) -> Result<Vec<Document>> {
        debug!("Trying to get many data from table: '{}', db: '{}'", table, DRIVER_NAME);
        let documents: Vec<Document> = self
            .table(table)?
            .iter()
            .filter(|document| matches(document, filter))
            .cloned()
            .collect();
        if documents.is_empty() {
            let desc = format!("Error find data with filter: {:?}, table: '{}', db: '{}'", filter, table, DRIVER_NAME);
            warn!("{}", desc);
            return Err(Error::NotFound(desc));
        }
        info!("Got {} data from db: '{}', table_name: '{}'", documents.len(), DRIVER_NAME, table);
        Ok(documents)
    }

    pub fn count(&self, table: &str, filter: &Filter) -> Result<u64> {
        match self.get_many(table, filter) {
            Ok(documents) => Ok(documents.len() as u64),
            Err(Error::NotFound(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    pub fn exists(&self, table: &str, filter: &Filter) -> Result<bool> {
        match self.get_many(table, filter) {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Current document count per configured table.
    pub fn table_sizes(&self) -> Vec<(String, usize)> {
        self.settings
            .tables
            .iter()
            .filter_map(|name| self.table(name).ok().map(|table| (name.clone(), table.len())))
            .collect()
    }
}

/// Background task that keeps a [`SnapshotCache`] warm.
pub struct RefreshScheduler {
    handle: JoinHandle<()>,
}

impl RefreshScheduler {
    /// Starts ticking one `period` from now. Ticks that fall inside a running
    /// refresh are dropped rather than queued. `period` is capped at
    /// [`MAX_REFRESH_SECS`].
    pub fn spawn(cache: Arc<SnapshotCache>, period: Duration) -> Self {
        let period = period.min(Duration::from_secs(MAX_REFRESH_SECS));
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match cache.refresh().await {
                    Ok(RefreshOutcome::Completed(total)) => {
                        info!("Snapshot refreshed, {} documents cached", total)
                    }
                    Ok(RefreshOutcome::Skipped) => debug!("Snapshot tick skipped, refresh in progress"),
                    Err(e) => error!("Background snapshot refresh failed, keeping cached data: {}", e),
                }
            }
        });
        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct SnapshotDriver {
    cache: Arc<SnapshotCache>,
    scheduler: RefreshScheduler,
}

impl SnapshotDriver {
    /// Loads every table once, then starts the refresh timer. A failed initial
    /// load is returned as [`Error::Connect`].
    pub async fn connect_with_source(settings: SnapshotSettings, source: Arc<dyn SnapshotSource>) -> Result<Self> {
        let max = Duration::from_secs(MAX_REFRESH_SECS);
        if settings.refresh_interval.is_zero() || settings.refresh_interval > max {
            return Err(Error::Config(format!(
                "Snapshot refresh interval must be between 1s and {}s, got {:?}",
                MAX_REFRESH_SECS, settings.refresh_interval
            )));
        }
        let period = settings.refresh_interval;
        let cache = Arc::new(SnapshotCache::new(source, settings));
        cache.refresh().await?;
        info!("Connected to snapshot db");
        let scheduler = RefreshScheduler::spawn(cache.clone(), period);
        Ok(Self { cache, scheduler })
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    fn unsupported<T>(operation: &str) -> Result<T> {
        Err(Error::Unsupported(format!("Cannot {} using the snapshot driver", operation)))
    }
}

#[async_trait]
impl StorageBackend for SnapshotDriver {
    fn get_error_message() -> &'static str {
        "Snapshot source should be reachable at SNAPSHOT_BASE_URL"
    }

    async fn connect(settings: &Settings) -> Result<Self> {
        let source = HttpSnapshotSource::new(&settings.snapshot.base_url)?;
        Self::connect_with_source(settings.snapshot.clone(), Arc::new(source)).await
    }
}

#[async_trait]
impl DbDriver for SnapshotDriver {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    async fn insert_one(&self, _table: &str, _data: Document) -> Result<String> {
        Self::unsupported("insert_one")
    }

    async fn insert_many(&self, _table: &str, _data: Vec<Document>) -> Result<Vec<String>> {
        Self::unsupported("insert_many")
    }

    async fn get_one(&self, table: &str, filter: &Filter) -> Result<Document> {
        self.cache.get_one(table, filter)
    }

    async fn get_many(&self, table: &str, filter: &Filter) -> Result<Vec<Document>> {
        self.cache.get_many(table, filter)
    }

    async fn update_one(&self, _table: &str, _filter: &Filter, _new_data: Document) -> Result<u64> {
        Self::unsupported("update_one")
    }

    async fn update_many(&self, _table: &str, _filter: &Filter, _new_data: Document) -> Result<u64> {
        Self::unsupported("update_many")
    }

    async fn delete_one(&self, _table: &str, _filter: &Filter) -> Result<bool> {
        Self::unsupported("delete_one")
    }

    async fn delete_many(&self, _table: &str, _filter: &Filter) -> Result<u64> {
        Self::unsupported("delete_many")
    }

    async fn count(&self, table: &str, filter: &Filter) -> Result<u64> {
        self.cache.count(table, filter)
    }

    async fn exists(&self, table: &str, filter: &Filter) -> Result<bool> {
        self.cache.exists(table, filter)
    }
}
