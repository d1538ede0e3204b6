//! End-to-end pipeline tests: mock providers → caches → margins → queries,
//! through both the service API and the HTTP router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use gem_profit::api::build_router;
use gem_profit::api::routes::ApiState;
use gem_profit::config::{AppConfig, ServerConfig};
use gem_profit::engine::query::RawParams;
use gem_profit::engine::{LevelTableCache, ListingSnapshotCache, MarginDeriver, ProfitService};
use gem_profit::storage::TableStore;
use gem_profit::types::{ListingRecord, ProfitError};

use crate::mock_sources::{MockLevels, MockListings};

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("gem_profit_it_{}", uuid::Uuid::new_v4()))
}

fn build_service(listings: Arc<MockListings>, levels: Arc<MockLevels>, dir: &Path) -> ProfitService {
    let cfg = AppConfig::default();
    let levels = LevelTableCache::new(levels, dir, cfg.levels.fetch_interval()).unwrap();
    let listings = ListingSnapshotCache::new(listings, cfg.listings.ttl());
    ProfitService::new(MarginDeriver::new(listings, levels, cfg.margins.ttl()))
}

/// Same wiring with a short fetch interval, for real-clock tests.
fn build_fast_service(listings: Arc<MockListings>, levels: Arc<MockLevels>, dir: &Path) -> ProfitService {
    let cfg = AppConfig::default();
    let levels = LevelTableCache::new(levels, dir, Duration::from_millis(5)).unwrap();
    let listings = ListingSnapshotCache::new(listings, cfg.listings.ttl());
    ProfitService::new(MarginDeriver::new(listings, levels, cfg.margins.ttl()))
}

fn params(pairs: &[(&str, Value)]) -> RawParams {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[tokio::test(start_paused = true)]
async fn test_full_pipeline_ranks_by_gain_margin() {
    let dir = temp_dir();
    let listings = Arc::new(MockListings::new());
    let levels = Arc::new(MockLevels::new());
    let service = build_service(listings.clone(), levels.clone(), &dir);

    let ranked = service.query(&RawParams::new()).await.unwrap();
    assert_eq!(
        ranked.names().collect::<Vec<_>>(),
        vec!["Enlighten Support", "Empower Support", "Spark"]
    );

    let (_, enlighten) = &ranked.0[0];
    assert_eq!(enlighten.min.level, 1);
    assert_eq!(enlighten.max.level, 3);
    assert_eq!(enlighten.max.experience, 2_000_000.0);
    assert!((enlighten.gain_margin - 400.0).abs() < 1e-9);

    let (_, spark) = &ranked.0[2];
    assert!((spark.gain_margin - 28.0 / 1.9).abs() < 1e-9);

    // One fetch per gem; the gem without a table is dropped from the result
    assert_eq!(levels.fetched().len(), 4);
    assert!(levels.fetched().contains(&"Unreleased Gem".to_string()));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cold_queries_fetch_once() {
    let dir = temp_dir();
    let listings = Arc::new(MockListings::new());
    let levels = Arc::new(MockLevels::new());
    let service = Arc::new(build_fast_service(listings.clone(), levels.clone(), &dir));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.query(&RawParams::new()).await })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(listings.fetch_count(), 1);
    let mut fetched = levels.fetched();
    fetched.sort();
    assert_eq!(
        fetched,
        vec!["Empower Support", "Enlighten Support", "Spark", "Unreleased Gem"]
    );
    assert!(results.iter().all(|ranked| *ranked == results[0]));
    assert_eq!(results[0].len(), 3);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_filters_compose() {
    let dir = temp_dir();
    let service = build_service(Arc::new(MockListings::new()), Arc::new(MockLevels::new()), &dir);

    let sell = service
        .query(&params(&[("min_sell_price_chaos", json!("500"))]))
        .await
        .unwrap();
    assert_eq!(sell.names().collect::<Vec<_>>(), vec!["Enlighten Support"]);

    let buy = service
        .query(&params(&[("max_buy_price_chaos", json!(60))]))
        .await
        .unwrap();
    assert_eq!(buy.names().collect::<Vec<_>>(), vec!["Empower Support", "Spark"]);

    let exp = service
        .query(&params(&[
            ("min_experience_delta", json!(1_500_000)),
            ("gem_name", json!("S*")),
        ]))
        .await
        .unwrap();
    assert_eq!(exp.names().collect::<Vec<_>>(), vec!["Spark"]);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_pagination_windows_concatenate() {
    let dir = temp_dir();
    let service = build_service(Arc::new(MockListings::new()), Arc::new(MockLevels::new()), &dir);

    let all = service.query(&RawParams::new()).await.unwrap();
    let first = service
        .query(&params(&[("items_count", json!(2))]))
        .await
        .unwrap();
    let rest = service
        .query(&params(&[("items_offset", json!(2)), ("items_count", json!(2))]))
        .await
        .unwrap();

    let mut joined = first.0.clone();
    joined.extend(rest.0.clone());
    assert_eq!(joined, all.0);
    assert_eq!(rest.len(), 1);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_ttls_govern_refreshes() {
    let dir = temp_dir();
    let listings = Arc::new(MockListings::new());
    let levels = Arc::new(MockLevels::new());
    let service = build_service(listings.clone(), levels.clone(), &dir);

    service.query(&RawParams::new()).await.unwrap();
    service.query(&RawParams::new()).await.unwrap();
    assert_eq!(listings.fetch_count(), 1);

    // Margins expire, the listing snapshot does not
    tokio::time::advance(Duration::from_secs(31)).await;
    service.query(&RawParams::new()).await.unwrap();
    assert_eq!(listings.fetch_count(), 1);
    assert_eq!(service.status().await.margin_entries, Some(3));

    // New prices only show up once the snapshot lapses
    listings.set_records(vec![
        ListingRecord::new("Spark", 1, 1.0, 100),
        ListingRecord::new("Spark", 20, 1000.0, 100),
    ]);
    tokio::time::advance(Duration::from_secs(1800)).await;
    let ranked = service.query(&RawParams::new()).await.unwrap();
    assert_eq!(listings.fetch_count(), 2);
    assert_eq!(ranked.names().collect::<Vec<_>>(), vec!["Spark"]);

    // Level tables were never refetched, failures included
    assert_eq!(levels.fetched().len(), 4);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_listing_outage_after_expiry() {
    let dir = temp_dir();
    let listings = Arc::new(MockListings::new());
    let service = build_service(listings.clone(), Arc::new(MockLevels::new()), &dir);

    service.query(&RawParams::new()).await.unwrap();
    listings.set_error("502 Bad Gateway");

    // Cached margins still answer
    assert!(service.query(&RawParams::new()).await.is_ok());

    tokio::time::advance(Duration::from_secs(1801)).await;
    let err = service.query(&RawParams::new()).await.unwrap_err();
    assert!(matches!(err, ProfitError::ListingsUnavailable(_)));
    assert!(err.to_string().contains("mock-ninja"));

    listings.clear_error();
    assert_eq!(service.query(&RawParams::new()).await.unwrap().len(), 3);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_level_tables_survive_restart() {
    let dir = temp_dir();
    let first = build_service(Arc::new(MockListings::new()), Arc::new(MockLevels::new()), &dir);
    first.query(&RawParams::new()).await.unwrap();
    drop(first);

    let levels = Arc::new(MockLevels::new());
    let second = build_service(Arc::new(MockListings::new()), levels.clone(), &dir);
    let ranked = second.query(&RawParams::new()).await.unwrap();

    assert_eq!(ranked.len(), 3);
    // Only the gem that failed last time is asked for again
    assert_eq!(levels.fetched(), vec!["Unreleased Gem".to_string()]);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_clear_level_cache_removes_files() {
    let dir = temp_dir();
    let levels = Arc::new(MockLevels::new());
    let service = build_service(Arc::new(MockListings::new()), levels.clone(), &dir);

    service.query(&RawParams::new()).await.unwrap();
    let store = TableStore::new(&dir);
    assert!(store.path_for("Enlighten Support").exists());

    assert_eq!(service.clear_level_cache().await.unwrap(), 3);
    assert!(!store.path_for("Enlighten Support").exists());

    service.query(&RawParams::new()).await.unwrap();
    assert_eq!(levels.fetched().len(), 8);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_http_round_trip() {
    let dir = temp_dir();
    let service = build_service(Arc::new(MockListings::new()), Arc::new(MockLevels::new()), &dir);
    let state = Arc::new(ApiState::new(Arc::new(service), None));

    let app = build_router(state.clone(), &ServerConfig::default());
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/gem-profit?items_count=2&max_buy_price_chaos=100")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    let json: Value = serde_json::from_str(&text).unwrap();
    let data = json["data"].as_object().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data["Enlighten Support"]["max"]["exp"], 2_000_000.0);
    assert!(text.find("Enlighten Support").unwrap() < text.find("Empower Support").unwrap());

    let app = build_router(state, &ServerConfig::default());
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/gem-profit?items_count=1000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    std::fs::remove_dir_all(&dir).unwrap();
}
