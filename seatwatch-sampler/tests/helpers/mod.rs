//! Shared fixtures for seatwatch-sampler integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use seatwatch_common::db::create_schema;
use seatwatch_sampler::config::SamplerConfig;
use seatwatch_sampler::error::ProviderError;
use seatwatch_sampler::provider::{CapacityProbe, ProbeRequest, Provider, ProviderRegistry, SeatProbe};
use seatwatch_sampler::scheduler::{QuietHours, SchedulerContext, Window, WindowPolicy};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const VENUE_ID: i64 = 1;
pub const VENUE_NAME: &str = "Kino Lichtburg";
pub const VENUE_URL: &str = "https://lichtburg.test";
pub const MOVIE_ID: i64 = 10;

/// Fixed reference instant for scenario tests
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 20, 0, 0).unwrap()
}

/// Single-connection in-memory store with schema, one venue and one movie
pub async fn setup_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    create_schema(&pool).await.unwrap();

    insert_venue(&pool, VENUE_ID, VENUE_NAME, Some(VENUE_URL)).await;
    sqlx::query("INSERT INTO movies (id, title) VALUES (?, 'Heat')")
        .bind(MOVIE_ID)
        .execute(&pool)
        .await
        .unwrap();

    pool
}

pub async fn insert_venue(pool: &SqlitePool, id: i64, name: &str, url: Option<&str>) {
    sqlx::query("INSERT INTO theaters (id, name, url) VALUES (?, ?, ?)")
        .bind(id)
        .bind(name)
        .bind(url)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn insert_screen(pool: &SqlitePool, id: i64, theater_id: i64, name: &str, seat_count: i64) {
    sqlx::query("INSERT INTO screens (id, theater_id, name, seat_count) VALUES (?, ?, ?, ?)")
        .bind(id)
        .bind(theater_id)
        .bind(name)
        .bind(seat_count)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn insert_showing(
    pool: &SqlitePool,
    id: i64,
    theater_id: i64,
    starts_at: DateTime<Utc>,
    detail_url: Option<&str>,
) {
    sqlx::query("INSERT INTO showings (id, movie_id, theater_id, starts_at, detail_url) VALUES (?, ?, ?, ?, ?)")
        .bind(id)
        .bind(MOVIE_ID)
        .bind(theater_id)
        .bind(starts_at.timestamp())
        .bind(detail_url)
        .execute(pool)
        .await
        .unwrap();
}

/// `(seats_sold, screen_id)` of one showing
pub async fn showing_state(pool: &SqlitePool, id: i64) -> (Option<i64>, Option<i64>) {
    sqlx::query_as("SELECT seats_sold, screen_id FROM showings WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub fn test_config() -> SamplerConfig {
    SamplerConfig::default()
}

/// Context with the default -10m/+5m window and quiet hours disabled
pub fn context(pool: SqlitePool, providers: Vec<Arc<dyn Provider>>, config: SamplerConfig) -> SchedulerContext {
    let windows = WindowPolicy::new(Window::new(-600, 300), config.min_window_span_secs());
    context_with(pool, providers, config, windows, QuietHours::disabled())
}

pub fn context_with(
    pool: SqlitePool,
    providers: Vec<Arc<dyn Provider>>,
    config: SamplerConfig,
    windows: WindowPolicy,
    quiet_hours: QuietHours,
) -> SchedulerContext {
    let mut registry = ProviderRegistry::new();
    for provider in providers {
        registry.register(provider);
    }
    SchedulerContext::with_parts(pool, config, registry, windows, quiet_hours)
}

/// Provider whose answers are scripted per showing and per capacity candidate
pub struct ScriptedProvider {
    pub tag: String,
    pub needle: String,
    pub priority: u8,
    pub requires_credential: bool,
    pub capacity_probe: bool,
    /// Seat answers by show id; missing ids fail with a network error
    pub seats: Mutex<HashMap<i64, SeatProbe>>,
    /// Candidates answered with `ok = true`
    pub accepted_capacities: Mutex<HashSet<i64>>,
    /// Detail URLs whose capacity probes fail
    pub failing_capacity_urls: Mutex<HashSet<String>>,
    pub credential: Mutex<Option<String>>,
    /// Show ids in probe order; may be shared between providers
    pub probed_shows: Arc<Mutex<Vec<i64>>>,
    pub probed_capacities: Mutex<Vec<i64>>,
    pub seen_credentials: Mutex<Vec<Option<String>>>,
    pub credential_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(tag: &str, needle: &str) -> Self {
        Self {
            tag: tag.to_string(),
            needle: needle.to_string(),
            priority: 100,
            requires_credential: false,
            capacity_probe: false,
            seats: Mutex::new(HashMap::new()),
            accepted_capacities: Mutex::new(HashSet::new()),
            failing_capacity_urls: Mutex::new(HashSet::new()),
            credential: Mutex::new(None),
            probed_shows: Arc::new(Mutex::new(Vec::new())),
            probed_capacities: Mutex::new(Vec::new()),
            seen_credentials: Mutex::new(Vec::new()),
            credential_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_shared_log(mut self, log: Arc<Mutex<Vec<i64>>>) -> Self {
        self.probed_shows = log;
        self
    }

    pub fn with_credential(mut self, token: Option<&str>) -> Self {
        self.requires_credential = true;
        self.credential = Mutex::new(token.map(str::to_string));
        self
    }

    pub fn with_capacity_probe(mut self, accepted: &[i64]) -> Self {
        self.capacity_probe = true;
        self.accepted_capacities = Mutex::new(accepted.iter().copied().collect());
        self
    }

    pub fn answer(&self, show_id: i64, auditorium: Option<&str>, seats_remaining: i64) {
        self.seats.lock().unwrap().insert(
            show_id,
            SeatProbe {
                auditorium: auditorium.map(str::to_string),
                seats_remaining: Some(seats_remaining),
                seats_sold: None,
                capacity: None,
                source: self.tag.clone(),
            },
        );
    }

    pub fn probed_shows(&self) -> Vec<i64> {
        self.probed_shows.lock().unwrap().clone()
    }

    pub fn probed_capacities(&self) -> Vec<i64> {
        self.probed_capacities.lock().unwrap().clone()
    }

    pub fn credential_calls(&self) -> usize {
        self.credential_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn classify(&self, venue_name: &str) -> bool {
        venue_name.contains(&self.needle)
    }

    async fn probe_seats(&self, request: &ProbeRequest) -> Result<SeatProbe, ProviderError> {
        self.probed_shows.lock().unwrap().push(request.show_id);
        self.seen_credentials
            .lock()
            .unwrap()
            .push(request.credential.clone());
        self.seats
            .lock()
            .unwrap()
            .get(&request.show_id)
            .cloned()
            .ok_or_else(|| ProviderError::Network(format!("no answer for show {}", request.show_id)))
    }

    fn supports_capacity_probe(&self) -> bool {
        self.capacity_probe
    }

    async fn probe_capacity_candidate(&self, detail_url: &str, candidate: i64) -> Result<CapacityProbe, ProviderError> {
        self.probed_capacities.lock().unwrap().push(candidate);
        if self.failing_capacity_urls.lock().unwrap().contains(detail_url) {
            return Err(ProviderError::Http(503, "unavailable".to_string()));
        }
        Ok(CapacityProbe {
            ok: self.accepted_capacities.lock().unwrap().contains(&candidate),
        })
    }

    fn requires_credential(&self) -> bool {
        self.requires_credential
    }

    async fn fetch_credential(&self, _venue_url: &str) -> Result<String, ProviderError> {
        self.credential_calls.fetch_add(1, Ordering::SeqCst);
        self.credential
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ProviderError::Http(401, "denied".to_string()))
    }
}
