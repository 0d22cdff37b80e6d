// 💲 Price feed - marginal cost per barra
//
// The feed is a flat JSON list re-fetched on a timer. Every successful
// fetch replaces the previous snapshot wholesale; a failed fetch keeps it.

use crate::color::{color_for_price, PriceBucket, Rgba};
use crate::error::{LoadError, Result};
use crate::lenient;
use crate::lookups::Lookups;
use crate::normalize::fold_name;
use crate::source::Source;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ============================================================================
// RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub barra: String,
    #[serde(rename = "ts", alias = "timestamp")]
    pub timestamp: String,
    #[serde(deserialize_with = "lenient::f64_or_string")]
    pub price: f64,
    #[serde(deserialize_with = "lenient::f64_or_string")]
    pub lat: f64,
    #[serde(deserialize_with = "lenient::f64_or_string")]
    pub lon: f64,
}

impl PriceRecord {
    /// Tooltip text for the price marker
    pub fn describe(&self) -> String {
        format!(
            "<b>{}</b><br/>{}<br/>${} USD/MWh",
            self.barra, self.timestamp, self.price
        )
    }
}

/// Parse the timestamp formats seen in the feed
pub fn parse_timestamp(ts: &str) -> Option<DateTime<FixedOffset>> {
    let ts = ts.trim();
    DateTime::parse_from_rfc3339(ts)
        .or_else(|_| DateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S%:z"))
        .or_else(|_| DateTime::parse_from_str(ts, "%Y-%m-%d %H:%M%:z"))
        .or_else(|_| DateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M%:z"))
        .ok()
}

/// Order two timestamps by instant when both parse, as text otherwise
fn compare_timestamps(a: &str, b: &str) -> Ordering {
    match (parse_timestamp(a), parse_timestamp(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

// ============================================================================
// SNAPSHOT + STORE
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct PriceSnapshot {
    pub records: Vec<PriceRecord>,
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Shared, swappable price snapshot. Readers get an Arc to an immutable
/// snapshot and never observe a half-applied refresh.
#[derive(Clone, Default)]
pub struct PriceStore {
    current: Arc<RwLock<Arc<PriceSnapshot>>>,
}

impl PriceStore {
    pub fn new() -> Self {
        PriceStore::default()
    }

    pub fn current(&self) -> Arc<PriceSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the snapshot wholesale
    pub fn replace(&self, records: Vec<PriceRecord>) {
        let snapshot = Arc::new(PriceSnapshot {
            records,
            fetched_at: Some(Utc::now()),
        });

        match self.current.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }

    /// Fetch the feed and swap it in. On error the previous snapshot stays.
    pub async fn refresh(&self, source: &Source) -> Result<usize> {
        let busted = source.cache_busted(Utc::now().timestamp_millis());
        let records: Vec<PriceRecord> = busted.fetch_json().await?;
        let count = records.len();
        self.replace(records);
        Ok(count)
    }

    /// Fail-open refresh used by the timer loop
    pub async fn refresh_or_keep(&self, source: &Source) {
        match self.refresh(source).await {
            Ok(count) => info!(%source, records = count, "price feed refreshed"),
            Err(e) => warn!(
                %source,
                error = %e,
                kept = self.current().records.len(),
                "price refresh failed, keeping previous snapshot"
            ),
        }
    }
}

/// Refresh now, then every `period`. Runs until the handle is aborted.
pub fn spawn_refresh_loop(store: PriceStore, source: Source, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            store.refresh_or_keep(&source).await;
        }
    })
}

// ============================================================================
// INDEX (canonical barra → latest record)
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct PriceIndex {
    latest: HashMap<String, PriceRecord>,
}

impl PriceIndex {
    pub fn build(records: &[PriceRecord], lookups: &Lookups) -> Self {
        let mut latest: HashMap<String, PriceRecord> = HashMap::new();

        for record in records {
            let key = lookups.normalize(&record.barra);
            if key.is_empty() {
                continue;
            }
            let newer = latest
                .get(&key)
                .map(|current| {
                    compare_timestamps(&record.timestamp, &current.timestamp) != Ordering::Less
                })
                .unwrap_or(true);
            if newer {
                latest.insert(key, record.clone());
            }
        }

        debug!(barras = latest.len(), "price index built");
        PriceIndex { latest }
    }

    pub fn latest(&self, canonical: &str) -> Option<&PriceRecord> {
        self.latest.get(canonical)
    }

    pub fn price_for(&self, canonical: &str) -> Option<f64> {
        self.latest(canonical).map(|r| r.price)
    }

    /// Mean of whichever endpoints have a price
    pub fn line_price(&self, start: &str, end: &str) -> Option<f64> {
        match (self.price_for(start), self.price_for(end)) {
            (Some(a), Some(b)) => Some((a + b) / 2.0),
            (Some(p), None) | (None, Some(p)) => Some(p),
            (None, None) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

// ============================================================================
// RENDER HAND-OFF
// ============================================================================

/// Longitude/latitude in degrees, height in meters above the ellipsoid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lon: f64,
    pub lat: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PricePoint {
    pub barra: String,
    pub position: Position,
    pub bucket: PriceBucket,
    pub color: Rgba,
    /// Same color as `#rrggbbaa` for point primitives that take CSS colors
    pub hex: String,
    pub description: String,
}

impl From<&PriceRecord> for PricePoint {
    fn from(record: &PriceRecord) -> Self {
        let bucket = color_for_price(record.price);
        let color = bucket.color();
        PricePoint {
            barra: record.barra.clone(),
            position: Position {
                lon: record.lon,
                lat: record.lat,
                height: 0.0,
            },
            bucket,
            color,
            hex: color.to_hex(),
            description: record.describe(),
        }
    }
}

pub fn price_points(records: &[PriceRecord]) -> Vec<PricePoint> {
    records.iter().map(PricePoint::from).collect()
}

// ============================================================================
// SAMPLE BUILDER (raw marginal costs + coordinate lookup → feed records)
// ============================================================================

/// One row of the monthly marginal-cost export
#[derive(Debug, Clone, Deserialize)]
pub struct MarginalCostRow {
    pub barra: String,
    pub fecha: String,
    #[serde(deserialize_with = "lenient::f64_or_string")]
    pub cmg: f64,
}

/// Folded barra name → (lat, lon)
#[derive(Debug, Clone, Default)]
pub struct BarraLocations {
    coords: HashMap<String, (f64, f64)>,
}

#[derive(Debug, Deserialize)]
struct LocationRow {
    barra: String,
    #[serde(deserialize_with = "lenient::f64_or_string")]
    lat: f64,
    #[serde(deserialize_with = "lenient::f64_or_string")]
    lon: f64,
}

impl BarraLocations {
    /// Parse a `barra,lat,lon` CSV with header
    pub fn from_csv_str(text: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut coords = HashMap::new();
        for result in reader.deserialize::<LocationRow>() {
            let row = result?;
            coords.insert(fold_name(&row.barra), (row.lat, row.lon));
        }

        Ok(BarraLocations { coords })
    }

    pub fn get(&self, barra: &str) -> Option<(f64, f64)> {
        self.coords.get(&fold_name(barra)).copied()
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}

/// Build a one-day feed sample: rows from the first calendar day present,
/// joined to coordinates, with `utc_offset` appended to each timestamp.
/// Barras without coordinates are skipped.
pub fn build_price_sample(
    rows: &[MarginalCostRow],
    locations: &BarraLocations,
    utc_offset: &str,
) -> Result<Vec<PriceRecord>> {
    let first = rows
        .first()
        .ok_or_else(|| LoadError::InvalidSource("marginal cost export is empty".to_string()))?;
    let first_day: String = first.fecha.chars().take(10).collect();

    let mut sample = Vec::new();
    let mut unlocated = 0usize;

    for row in rows.iter().filter(|r| r.fecha.starts_with(&first_day)) {
        let Some((lat, lon)) = locations.get(&row.barra) else {
            unlocated += 1;
            continue;
        };
        sample.push(PriceRecord {
            barra: row.barra.clone(),
            timestamp: format!("{}{}", row.fecha, utc_offset),
            price: row.cmg,
            lat,
            lon,
        });
    }

    info!(day = %first_day, records = sample.len(), unlocated, "price sample built");
    Ok(sample)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationSet;
    use crate::normalize::AliasTable;

    fn record(barra: &str, ts: &str, price: f64) -> PriceRecord {
        PriceRecord {
            barra: barra.to_string(),
            timestamp: ts.to_string(),
            price,
            lat: -33.5,
            lon: -70.7,
        }
    }

    #[test]
    fn test_record_from_feed_json() {
        let json = r#"[{"barra":"Quillota 220","ts":"2025-03-01 01:00-04:00","price":"52.3","lat":-32.9,"lon":-71.2}]"#;
        let records: Vec<PriceRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records[0].price, 52.3);
        assert_eq!(records[0].timestamp, "2025-03-01 01:00-04:00");

        let out = serde_json::to_value(&records[0]).unwrap();
        assert!(out.get("ts").is_some());
    }

    #[test]
    fn test_describe() {
        let r = record("Crucero", "2025-03-01 01:00-04:00", 45.0);
        assert_eq!(
            r.describe(),
            "<b>Crucero</b><br/>2025-03-01 01:00-04:00<br/>$45 USD/MWh"
        );
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2025-03-01T01:00:00-04:00").is_some());
        assert!(parse_timestamp("2025-03-01 01:00-04:00").is_some());
        assert!(parse_timestamp("2025-03-01 01:00:30-03:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_price_points_colors() {
        let points = price_points(&[record("A", "t", 39.9), record("B", "t", 85.0)]);
        assert_eq!(points[0].bucket, PriceBucket::Cheap);
        assert_eq!(points[1].bucket, PriceBucket::Expensive);
        assert_eq!(points[1].color, PriceBucket::Expensive.color());
        assert!(points[1].hex.starts_with("#ff0000"));
        assert_eq!(points[1].hex.len(), 9);
        assert_eq!(points[0].position.height, 0.0);
    }

    #[test]
    fn test_index_keeps_latest_per_canonical_barra() {
        let aliases = AliasTable::from_pairs([("quillota nueva", "quillota")]);
        let lookups = Lookups::new(aliases, GenerationSet::new());

        let records = vec![
            record("Quillota 220kV", "2025-03-01 02:00-04:00", 50.0),
            record("Quillota Nueva", "2025-03-01 03:00-04:00", 70.0),
            record("Quillota", "2025-03-01 01:00-04:00", 10.0),
        ];
        let index = PriceIndex::build(&records, &lookups);

        assert_eq!(index.len(), 1);
        assert_eq!(index.price_for("quillota"), Some(70.0));
    }

    #[test]
    fn test_line_price() {
        let lookups = Lookups::empty();
        let index = PriceIndex::build(&[record("A", "t", 40.0), record("B", "t", 60.0)], &lookups);

        assert_eq!(index.line_price("a", "b"), Some(50.0));
        assert_eq!(index.line_price("a", "zzz"), Some(40.0));
        assert_eq!(index.line_price("x", "y"), None);
    }

    #[test]
    fn test_store_replace_is_wholesale() {
        let store = PriceStore::new();
        assert!(store.current().records.is_empty());
        assert!(store.current().fetched_at.is_none());

        store.replace(vec![record("A", "t", 1.0), record("B", "t", 2.0)]);
        let before = store.current();
        store.replace(vec![record("C", "t", 3.0)]);

        assert_eq!(before.records.len(), 2);
        assert_eq!(store.current().records.len(), 1);
        assert_eq!(store.current().records[0].barra, "C");
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous() {
        let store = PriceStore::new();
        store.replace(vec![record("A", "t", 1.0)]);

        let missing = Source::parse("/no/such/prices.json").unwrap();
        assert!(store.refresh(&missing).await.is_err());
        store.refresh_or_keep(&missing).await;

        assert_eq!(store.current().records.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_from_file() {
        let path = std::env::temp_dir().join("gridflow_prices_refresh.json");
        std::fs::write(
            &path,
            r#"[{"barra":"A","ts":"t","price":12.5,"lat":-30,"lon":-71}]"#,
        )
        .unwrap();

        let store = PriceStore::new();
        let count = store.refresh(&Source::File(path.clone())).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.current().records[0].price, 12.5);
        assert!(store.current().fetched_at.is_some());

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_refresh_loop_populates_store() {
        let path = std::env::temp_dir().join("gridflow_prices_loop.json");
        std::fs::write(&path, r#"[{"barra":"A","ts":"t","price":1,"lat":0,"lon":0}]"#).unwrap();

        let store = PriceStore::new();
        let handle = spawn_refresh_loop(
            store.clone(),
            Source::File(path.clone()),
            Duration::from_secs(3600),
        );

        for _ in 0..100 {
            if !store.current().records.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert_eq!(store.current().records.len(), 1);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_build_price_sample() {
        let locations = BarraLocations::from_csv_str(
            "barra,lat,lon\nCrucero 220,-22.27,-69.56\nPolpaico,-33.16,-70.88\n",
        )
        .unwrap();
        assert_eq!(locations.len(), 2);

        let rows: Vec<MarginalCostRow> = serde_json::from_str(
            r#"[
                {"barra":"CRUCERO 220","fecha":"2020-05-04 01:00","cmg":41.2},
                {"barra":"Desconocida","fecha":"2020-05-04 01:00","cmg":10},
                {"barra":"Polpaico","fecha":"2020-05-04 02:00","cmg":"55.0"},
                {"barra":"Polpaico","fecha":"2020-05-05 01:00","cmg":60}
            ]"#,
        )
        .unwrap();

        let sample = build_price_sample(&rows, &locations, "-04:00").unwrap();
        assert_eq!(sample.len(), 2);
        assert_eq!(sample[0].barra, "CRUCERO 220");
        assert_eq!(sample[0].timestamp, "2020-05-04 01:00-04:00");
        assert_eq!((sample[0].lat, sample[0].lon), (-22.27, -69.56));
        assert_eq!(sample[1].price, 55.0);
        assert!(parse_timestamp(&sample[1].timestamp).is_some());
    }

    #[test]
    fn test_build_price_sample_empty_is_error() {
        let result = build_price_sample(&[], &BarraLocations::default(), "-04:00");
        assert!(result.is_err());
    }
}
