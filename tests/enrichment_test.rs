mod common;

use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{fast_settings, key, standard_geocoder, FakeGeocoder};
use london_etl::domain::Coordinate;
use london_etl::pipeline::enrich::{EnricherSettings, GeoEnricher};
use london_etl::retry::RetryPolicy;
use london_etl::EnrichmentFailure;

#[tokio::test]
async fn duplicate_postcodes_are_looked_up_once() -> Result<()> {
    let geocoder = Arc::new(standard_geocoder().with_delay(Duration::from_millis(20)));
    let enricher = GeoEnricher::new(geocoder.clone(), fast_settings(4));

    let requested = vec![
        key("SW1A 1AA"),
        key("sw1a1aa"),
        key("E1 6AN"),
        key("SW1A1AA"),
        key("E16AN"),
    ];
    let outcome = enricher.enrich(requested).await;

    assert_eq!(geocoder.calls(), 2);
    assert_eq!(outcome.coordinates.len(), 2);
    assert_eq!(outcome.stats.requested, 2);
    assert_eq!(outcome.stats.outbound_requests, 2);
    Ok(())
}

#[tokio::test]
async fn concurrent_lookups_share_one_request() -> Result<()> {
    let geocoder = Arc::new(standard_geocoder().with_delay(Duration::from_millis(50)));
    let enricher = GeoEnricher::new(geocoder.clone(), fast_settings(1));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let enricher = enricher.clone();
        handles.push(tokio::spawn(async move { enricher.lookup(&key("N1 9GU")).await }));
    }
    for handle in handles {
        assert_eq!(handle.await?, Coordinate::new(51.5362, -0.1033));
    }
    assert_eq!(geocoder.calls_for("N19GU"), 1);

    // Later callers in the same run are served from the cache.
    assert_eq!(enricher.cached(&key("N19GU")), Some(Coordinate::new(51.5362, -0.1033)));
    enricher.enrich(vec![key("N19GU")]).await;
    assert_eq!(geocoder.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn failures_become_absent_and_are_counted() -> Result<()> {
    let geocoder = Arc::new(
        standard_geocoder()
            .failing("E16AN", EnrichmentFailure::MissingFields)
            .failing("N19GU", EnrichmentFailure::Malformed("not json".to_string())),
    );
    let enricher = GeoEnricher::new(geocoder, fast_settings(2));

    let order = vec![key("ZZ1 1ZZ"), key("SW1A 1AA"), key("E1 6AN"), key("N1 9GU")];
    let outcome = enricher.enrich(order.clone()).await;

    assert_eq!(outcome.coordinates.len(), 4, "every requested postcode keeps an entry");
    assert!(outcome.coordinates[&key("ZZ11ZZ")].is_absent());
    assert!(outcome.coordinates[&key("E16AN")].is_absent());
    assert_eq!(outcome.stats.resolved, 1);
    assert_eq!(outcome.stats.absent, 3);
    assert_eq!(outcome.stats.failures["status"], 1);
    assert_eq!(outcome.stats.failures["missing_fields"], 1);
    assert_eq!(outcome.stats.failures["malformed"], 1);

    let enriched = outcome.enriched_in_order(&order);
    assert_eq!(enriched.len(), 1);
    assert_eq!(enriched[0].postcode, key("SW1A1AA"));
    Ok(())
}

#[tokio::test]
async fn mapping_does_not_depend_on_worker_count() -> Result<()> {
    let order = vec![key("N1 9GU"), key("ZZ1 1ZZ"), key("E1 6AN"), key("SW1A 1AA")];

    let sequential = GeoEnricher::new(Arc::new(standard_geocoder()), fast_settings(1))
        .enrich(order.clone())
        .await;
    let pooled = GeoEnricher::new(
        Arc::new(standard_geocoder().with_delay(Duration::from_millis(5))),
        fast_settings(8),
    )
    .enrich(order.into_iter().rev())
    .await;

    assert_eq!(sequential.coordinates, pooled.coordinates);
    Ok(())
}

#[tokio::test]
async fn slow_lookups_time_out_as_absent() -> Result<()> {
    let geocoder = Arc::new(standard_geocoder().with_delay(Duration::from_millis(500)));
    let settings = EnricherSettings {
        timeout: Duration::from_millis(20),
        ..fast_settings(1)
    };
    let enricher = GeoEnricher::new(geocoder, settings);

    let started = Instant::now();
    let outcome = enricher.enrich(vec![key("SW1A 1AA")]).await;
    assert!(started.elapsed() < Duration::from_millis(400));
    assert!(outcome.coordinates[&key("SW1A1AA")].is_absent());
    assert_eq!(outcome.stats.failures["timeout"], 1);
    Ok(())
}

#[tokio::test]
async fn each_worker_paces_its_requests() -> Result<()> {
    let settings = EnricherSettings {
        min_delay: Duration::from_millis(40),
        ..fast_settings(1)
    };
    let enricher = GeoEnricher::new(Arc::new(standard_geocoder()), settings);

    let started = Instant::now();
    enricher
        .enrich(vec![key("SW1A 1AA"), key("E1 6AN"), key("N1 9GU")])
        .await;
    // Three requests on one stream need at least two gaps.
    assert!(started.elapsed() >= Duration::from_millis(80));
    Ok(())
}

#[tokio::test]
async fn workers_pace_independently() -> Result<()> {
    let settings = EnricherSettings {
        min_delay: Duration::from_millis(40),
        ..fast_settings(2)
    };
    let enricher = GeoEnricher::new(Arc::new(standard_geocoder()), settings);

    let started = Instant::now();
    let outcome = enricher
        .enrich(vec![key("SW1A 1AA"), key("E1 6AN"), key("N1 9GU"), key("ZZ1 1ZZ")])
        .await;
    let elapsed = started.elapsed();

    assert_eq!(outcome.stats.outbound_requests, 4);
    // Two requests per stream need one gap each; a single shared stream
    // would need three.
    assert!(elapsed >= Duration::from_millis(40), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(120), "{:?}", elapsed);
    Ok(())
}

#[tokio::test]
async fn transient_failures_use_the_retry_budget() -> Result<()> {
    let geocoder =
        Arc::new(FakeGeocoder::new(&[]).failing("E16AN", EnrichmentFailure::Status(503)));
    let settings = EnricherSettings {
        retry: RetryPolicy::new(3, Duration::from_millis(1)),
        ..fast_settings(1)
    };
    let outcome = GeoEnricher::new(geocoder.clone(), settings)
        .enrich(vec![key("E1 6AN"), key("ZZ1 1ZZ")])
        .await;

    // 503 is retried up to the budget, 404 is not retried.
    assert_eq!(geocoder.calls_for("E16AN"), 3);
    assert_eq!(geocoder.calls_for("ZZ11ZZ"), 1);
    assert_eq!(outcome.stats.absent, 2);
    Ok(())
}
