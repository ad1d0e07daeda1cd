//! Geocoding abstraction layer with safety features
//!
//! - MockGeocoder for tests and development (deterministic, no network)
//! - RateLimitedNominatimGeocoder for production (rate limit + circuit breaker)
//! - CachedGeocoder in front of either, so repeated addresses never hit the provider
//!
//! Selected by the GEOCODER_BACKEND setting ("mock" or "nominatim").

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::services::nominatim::NominatimClient;
use crate::types::Coordinates;

/// Geocoder trait - abstraction for all geocoding implementations
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Geocode a free-form address to coordinates.
    /// Returns None if the address cannot be resolved.
    async fn geocode(&self, address: &str) -> Result<Option<GeocodingResult>>;

    /// Get the name of this geocoder implementation
    fn name(&self) -> &'static str;
}

/// Result of geocoding operation
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodingResult {
    pub coordinates: Coordinates,
    /// Confidence score 0.0-1.0
    pub confidence: f64,
    /// Display name returned by geocoder
    pub display_name: String,
}

// ==========================================================================
// MockGeocoder
// ==========================================================================

/// Mock geocoder for testing - returns deterministic fake coordinates
pub struct MockGeocoder;

impl MockGeocoder {
    pub fn new() -> Self {
        Self
    }

    /// Generate deterministic coordinates from the address hash, inside the
    /// contiguous United States with a margin off the borders and coasts.
    fn hash_to_coordinates(address: &str) -> Coordinates {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        normalize(address).hash(&mut hasher);
        let hash = hasher.finish();

        const LAT_MIN: f64 = 32.0;
        const LAT_MAX: f64 = 45.0;
        const LNG_MIN: f64 = -117.0;
        const LNG_MAX: f64 = -80.0;

        let lat_normalized = ((hash >> 32) as f64) / (u32::MAX as f64);
        let lng_normalized = ((hash & 0xFFFFFFFF) as f64) / (u32::MAX as f64);

        Coordinates {
            lat: LAT_MIN + lat_normalized * (LAT_MAX - LAT_MIN),
            lng: LNG_MIN + lng_normalized * (LNG_MAX - LNG_MIN),
        }
    }
}

impl Default for MockGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeocodingResult>> {
        if address.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(GeocodingResult {
            coordinates: Self::hash_to_coordinates(address),
            confidence: 0.95,
            display_name: format!("{}, United States", address.trim()),
        }))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

fn normalize(address: &str) -> String {
    address.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

// ==========================================================================
// RateLimiter
// ==========================================================================

/// Rate limiter that enforces minimum interval between calls
pub struct RateLimiter {
    last_call: Arc<Mutex<Option<Instant>>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_call: Arc::new(Mutex::new(None)),
            min_interval,
        }
    }

    /// Wait until it's safe to make another call
    pub async fn wait(&self) {
        let mut last = self.last_call.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }

        *last = Some(Instant::now());
    }
}

// ==========================================================================
// CircuitBreaker
// ==========================================================================

/// Circuit breaker to prevent hammering a failing service
pub struct CircuitBreaker {
    failure_count: AtomicU32,
    threshold: u32,
    last_failure: parking_lot::Mutex<Option<Instant>>,
    recovery_time: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, recovery_time: Duration) -> Self {
        Self {
            failure_count: AtomicU32::new(0),
            threshold,
            last_failure: parking_lot::Mutex::new(None),
            recovery_time,
        }
    }

    /// Check if circuit is open (blocking calls)
    pub fn is_open(&self) -> bool {
        if self.failure_count.load(Ordering::Relaxed) < self.threshold {
            return false;
        }
        match *self.last_failure.lock() {
            // Half-open once the recovery time has passed
            Some(last_time) => last_time.elapsed() < self.recovery_time,
            None => true,
        }
    }

    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        *self.last_failure.lock() = Some(Instant::now());
    }

    /// Record a success (resets failure count)
    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
    }
}

// ==========================================================================
// RateLimitedNominatimGeocoder
// ==========================================================================

/// Default rate limit interval (1.5 seconds - Nominatim allows 1 req/s)
const DEFAULT_RATE_LIMIT_MS: u64 = 1500;

const DEFAULT_CIRCUIT_BREAKER_THRESHOLD: u32 = 3;

const DEFAULT_CIRCUIT_BREAKER_RECOVERY_SECS: u64 = 300;

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

/// Rate-limited Nominatim geocoder with circuit breaker protection
pub struct RateLimitedNominatimGeocoder {
    client: NominatimClient,
    rate_limiter: RateLimiter,
    pub(crate) circuit_breaker: CircuitBreaker,
}

impl RateLimitedNominatimGeocoder {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(
            base_url,
            Duration::from_millis(DEFAULT_RATE_LIMIT_MS),
            DEFAULT_CIRCUIT_BREAKER_THRESHOLD,
            Duration::from_secs(DEFAULT_CIRCUIT_BREAKER_RECOVERY_SECS),
        )
    }

    pub fn with_config(
        base_url: &str,
        rate_limit_interval: Duration,
        circuit_breaker_threshold: u32,
        circuit_breaker_recovery: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: NominatimClient::new(base_url)?,
            rate_limiter: RateLimiter::new(rate_limit_interval),
            circuit_breaker: CircuitBreaker::new(circuit_breaker_threshold, circuit_breaker_recovery),
        })
    }
}

#[async_trait]
impl Geocoder for RateLimitedNominatimGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeocodingResult>> {
        if self.circuit_breaker.is_open() {
            warn!("Circuit breaker is open, rejecting geocoding request");
            anyhow::bail!("Geocoding service temporarily unavailable (circuit breaker open)");
        }

        self.rate_limiter.wait().await;

        match self.client.geocode(address).await {
            Ok(Some(place)) => {
                self.circuit_breaker.record_success();
                Ok(Some(GeocodingResult {
                    coordinates: place.coordinates,
                    confidence: 0.8, // Nominatim doesn't provide confidence
                    display_name: place.display_name,
                }))
            }
            Ok(None) => {
                // No result found is not a failure
                self.circuit_breaker.record_success();
                Ok(None)
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                error!("Geocoding failed: {}", e);
                Err(e)
            }
        }
    }

    fn name(&self) -> &'static str {
        "nominatim"
    }
}

// ==========================================================================
// CachedGeocoder
// ==========================================================================

/// Addresses kept before the oldest entries are evicted
const MAX_CACHED_ADDRESSES: usize = 10_000;

/// Insertion-ordered map that drops its oldest entry once full.
struct AddressCache {
    entries: HashMap<String, GeocodingResult>,
    order: VecDeque<String>,
    capacity: usize,
}

impl AddressCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, key: &str) -> Option<GeocodingResult> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: String, value: GeocodingResult) {
        if self.entries.insert(key.clone(), value).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Memoizes successful lookups of any geocoder, keyed by normalized address.
pub struct CachedGeocoder {
    inner: Box<dyn Geocoder>,
    cache: parking_lot::Mutex<AddressCache>,
}

impl CachedGeocoder {
    pub fn new(inner: Box<dyn Geocoder>) -> Self {
        Self::with_capacity(inner, MAX_CACHED_ADDRESSES)
    }

    fn with_capacity(inner: Box<dyn Geocoder>, capacity: usize) -> Self {
        Self {
            inner,
            cache: parking_lot::Mutex::new(AddressCache::new(capacity)),
        }
    }
}

#[async_trait]
impl Geocoder for CachedGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeocodingResult>> {
        let key = normalize(address);
        let cached = self.cache.lock().get(&key);
        if let Some(hit) = cached {
            debug!("Geocode cache hit for '{}'", key);
            return Ok(Some(hit));
        }

        let result = self.inner.geocode(address).await?;
        if let Some(found) = &result {
            let mut cache = self.cache.lock();
            cache.insert(key, found.clone());
            debug!("Geocode cache holds {} addresses", cache.len());
        }
        Ok(result)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

// ==========================================================================
// Factory
// ==========================================================================

/// Create the configured geocoder, wrapped in the cache.
pub fn create_geocoder(backend: &str, nominatim_url: Option<&str>) -> Result<Box<dyn Geocoder>> {
    let inner: Box<dyn Geocoder> = match backend {
        "mock" => {
            info!("Using MockGeocoder");
            Box::new(MockGeocoder::new())
        }
        "nominatim" => {
            let url = nominatim_url.unwrap_or(DEFAULT_NOMINATIM_URL);
            info!("Using RateLimitedNominatimGeocoder at {}", url);
            Box::new(RateLimitedNominatimGeocoder::new(url)?)
        }
        other => {
            warn!("Unknown GEOCODER_BACKEND '{}', using mock", other);
            Box::new(MockGeocoder::new())
        }
    };
    Ok(Box::new(CachedGeocoder::new(inner)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn mock_geocoder_is_deterministic() {
        let geocoder = MockGeocoder::new();
        let a = geocoder.geocode("Chicago, IL").await.unwrap().unwrap();
        let b = geocoder.geocode("  chicago,   IL ").await.unwrap().unwrap();
        assert_eq!(a.coordinates, b.coordinates);
    }

    #[tokio::test]
    async fn mock_geocoder_separates_addresses() {
        let geocoder = MockGeocoder::new();
        let chicago = geocoder.geocode("Chicago, IL").await.unwrap().unwrap();
        let dallas = geocoder.geocode("Dallas, TX").await.unwrap().unwrap();
        assert_ne!(chicago.coordinates, dallas.coordinates);
    }

    #[tokio::test]
    async fn mock_geocoder_stays_inside_us() {
        let geocoder = MockGeocoder::new();
        for address in ["Denver, CO", "Atlanta, GA", "Reno, NV", "Boise, ID"] {
            let c = geocoder.geocode(address).await.unwrap().unwrap().coordinates;
            assert!((32.0..=45.0).contains(&c.lat), "lat {} for {}", c.lat, address);
            assert!((-117.0..=-80.0).contains(&c.lng), "lng {} for {}", c.lng, address);
        }
    }

    #[tokio::test]
    async fn mock_geocoder_rejects_blank_address() {
        assert!(MockGeocoder::new().geocode("   ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rate_limiter_enforces_minimum_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        let start = Instant::now();

        limiter.wait().await;
        assert!(start.elapsed() < Duration::from_millis(50));

        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn circuit_breaker_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        assert!(!breaker.is_open());
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
        breaker.record_failure();
        assert!(breaker.is_open());
    }

    #[test]
    fn circuit_breaker_resets_on_success() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert!(!breaker.is_open());
    }

    #[tokio::test]
    async fn circuit_breaker_half_opens_after_recovery_time() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(50));
        breaker.record_failure();
        assert!(breaker.is_open());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!breaker.is_open());
    }

    #[tokio::test]
    async fn nominatim_rejects_when_circuit_breaker_open() {
        let geocoder = RateLimitedNominatimGeocoder::with_config(
            DEFAULT_NOMINATIM_URL,
            Duration::from_millis(100),
            1,
            Duration::from_secs(300),
        )
        .unwrap();
        geocoder.circuit_breaker.record_failure();

        let result = geocoder.geocode("Chicago, IL").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("circuit breaker"));
    }

    struct CountingGeocoder(Arc<AtomicUsize>);

    #[async_trait]
    impl Geocoder for CountingGeocoder {
        async fn geocode(&self, address: &str) -> Result<Option<GeocodingResult>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            MockGeocoder::new().geocode(address).await
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[tokio::test]
    async fn cache_serves_repeated_addresses() {
        let calls = Arc::new(AtomicUsize::new(0));
        let geocoder = CachedGeocoder::new(Box::new(CountingGeocoder(calls.clone())));

        let first = geocoder.geocode("Chicago, IL").await.unwrap();
        let second = geocoder.geocode("CHICAGO,  IL").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(geocoder.cache.lock().len(), 1);
    }

    #[tokio::test]
    async fn cache_evicts_oldest_address_when_full() {
        let calls = Arc::new(AtomicUsize::new(0));
        let geocoder = CachedGeocoder::with_capacity(Box::new(CountingGeocoder(calls.clone())), 2);

        for address in ["Chicago, IL", "Dallas, TX", "Denver, CO"] {
            geocoder.geocode(address).await.unwrap();
        }
        assert_eq!(geocoder.cache.lock().len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // Denver is still cached, Chicago was evicted
        geocoder.geocode("Denver, CO").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        geocoder.geocode("Chicago, IL").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(geocoder.cache.lock().len(), 2);
    }

    #[tokio::test]
    async fn cache_does_not_store_misses() {
        let calls = Arc::new(AtomicUsize::new(0));
        let geocoder = CachedGeocoder::new(Box::new(CountingGeocoder(calls.clone())));

        assert!(geocoder.geocode("").await.unwrap().is_none());
        assert!(geocoder.geocode("").await.unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn factory_wraps_backend_in_cache() {
        let geocoder = create_geocoder("mock", None).unwrap();
        assert_eq!(geocoder.name(), "mock");
        let fallback = create_geocoder("carrier-pigeon", None).unwrap();
        assert_eq!(fallback.name(), "mock");
    }
}
