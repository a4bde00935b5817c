use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde_json::json;
use solar_forecast::domain::Site;
use solar_forecast::forecast::{
    DiskCache, FixedClock, MemoryCache, NwpError, NwpProvider, OpenMeteoClient, OpenMeteoConfig,
    ResponseCache,
};
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MAIN_VARIABLES: &str = "temperature_2m,precipitation,cloud_cover_low,cloud_cover_mid,\
cloud_cover_high,wind_speed_10m,shortwave_radiation,direct_radiation";

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 10, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn site() -> Site {
    Site::new(51.5, -0.1, 4.0)
}

fn hours(start: NaiveDateTime, n: usize) -> Vec<i64> {
    let midnight = start.date().and_hms_opt(0, 0, 0).unwrap();
    (0..n)
        .map(|h| (midnight + Duration::hours(h as i64)).and_utc().timestamp())
        .collect()
}

fn main_body(ts: NaiveDateTime, n: usize) -> serde_json::Value {
    let series = |v: f64| vec![v; n];
    json!({
        "latitude": 51.5,
        "longitude": -0.1,
        "hourly_units": {"time": "unixtime"},
        "hourly": {
            "time": hours(ts, n),
            "temperature_2m": series(14.5),
            "precipitation": series(0.0),
            "cloud_cover_low": series(20.0),
            "cloud_cover_mid": series(10.0),
            "cloud_cover_high": series(5.0),
            "wind_speed_10m": series(3.2),
            "shortwave_radiation": series(450.0),
            "direct_radiation": series(300.0)
        }
    })
}

fn visibility_body(ts: NaiveDateTime, n: usize) -> serde_json::Value {
    json!({
        "hourly": {
            "time": hours(ts, n),
            "visibility": vec![18000.0; n]
        }
    })
}

fn config(server: &MockServer) -> OpenMeteoConfig {
    OpenMeteoConfig {
        forecast_base_url: server.uri(),
        archive_base_url: server.uri(),
        max_retries: 2,
        backoff_base: std::time::Duration::from_millis(1),
        ..OpenMeteoConfig::default()
    }
}

fn client(server: &MockServer, cache: Arc<dyn ResponseCache>) -> OpenMeteoClient {
    OpenMeteoClient::new(config(server), cache)
        .unwrap()
        .with_clock(Arc::new(FixedClock(now())))
}

async fn mount_visibility(server: &MockServer, ts: NaiveDateTime, n: usize, times: u64) {
    Mock::given(method("GET"))
        .and(path("/v1/gfs"))
        .and(query_param("hourly", "visibility"))
        .respond_with(ResponseTemplate::new(200).set_body_json(visibility_body(ts, n)))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_recent_icon_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/dwd-icon"))
        .and(query_param("hourly", MAIN_VARIABLES))
        .and(query_param("start_date", "2024-10-01"))
        .and(query_param("end_date", "2024-10-08"))
        .and(query_param("timeformat", "unixtime"))
        .respond_with(ResponseTemplate::new(200).set_body_json(main_body(now(), 24)))
        .expect(1)
        .mount(&server)
        .await;
    mount_visibility(&server, now(), 24, 1).await;

    let nwp = client(&server, Arc::new(MemoryCache::new()));
    let ds = nwp.fetch_nwp(&site(), now(), "icon").await.unwrap();

    assert_eq!(ds.name(), "icon");
    assert_eq!(ds.x(), -0.1);
    assert_eq!(ds.y(), 51.5);
    assert_eq!(ds.time(), now().date().and_hms_opt(0, 0, 0).unwrap());
    assert_eq!(ds.step().len(), 24);
    assert_eq!(ds.step()[3], Duration::hours(3));
    assert_eq!(
        ds.variables().to_vec(),
        vec!["t", "prate", "lcc", "mcc", "hcc", "si10", "dswrf", "dlwrf", "vis"]
    );
    assert!(ds.sel("vis").unwrap().iter().all(|v| *v == 18000.0));
    assert!(ds.sel("dswrf").unwrap().iter().all(|v| *v == 450.0));
}

#[tokio::test]
async fn test_repeated_request_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/gfs"))
        .and(query_param("hourly", MAIN_VARIABLES))
        .respond_with(ResponseTemplate::new(200).set_body_json(main_body(now(), 24)))
        .expect(1)
        .mount(&server)
        .await;
    mount_visibility(&server, now(), 24, 1).await;

    let nwp = client(&server, Arc::new(MemoryCache::new()));
    let first = nwp.fetch_nwp(&site(), now(), "gfs").await.unwrap();
    let second = nwp.fetch_nwp(&site(), now(), "gfs").await.unwrap();

    assert_eq!(first.to_frame(), second.to_frame());
}

#[tokio::test]
async fn test_disk_cache_survives_new_client() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/dwd-icon"))
        .respond_with(ResponseTemplate::new(200).set_body_json(main_body(now(), 24)))
        .expect(1)
        .mount(&server)
        .await;
    mount_visibility(&server, now(), 24, 1).await;

    let dir = std::env::temp_dir().join(format!("nwp-cache-{}", uuid::Uuid::new_v4()));
    let first = client(&server, Arc::new(DiskCache::new(&dir)))
        .fetch_nwp(&site(), now(), "icon")
        .await
        .unwrap();
    let second = client(&server, Arc::new(DiskCache::new(&dir)))
        .fetch_nwp(&site(), now(), "icon")
        .await
        .unwrap();

    assert_eq!(first.to_frame(), second.to_frame());
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_old_timestamp_uses_archive_without_visibility() {
    let server = MockServer::start().await;
    let ts = now() - Duration::days(120);
    Mock::given(method("GET"))
        .and(path("/v1/archive"))
        .and(query_param("hourly", MAIN_VARIABLES))
        .respond_with(ResponseTemplate::new(200).set_body_json(main_body(ts, 48)))
        .expect(1)
        .mount(&server)
        .await;
    mount_visibility(&server, ts, 48, 0).await;

    let nwp = client(&server, Arc::new(MemoryCache::new()));
    let ds = nwp.fetch_nwp(&site(), ts, "icon").await.unwrap();

    assert_eq!(ds.name(), "icon");
    let vis = ds.sel("vis").unwrap();
    assert_eq!(vis.len(), 48);
    assert!(vis.iter().all(|v| *v == 24000.0));
}

#[tokio::test]
async fn test_old_timestamp_accepts_any_source() {
    let server = MockServer::start().await;
    let ts = now() - Duration::days(200);
    Mock::given(method("GET"))
        .and(path("/v1/archive"))
        .respond_with(ResponseTemplate::new(200).set_body_json(main_body(ts, 24)))
        .mount(&server)
        .await;

    let nwp = client(&server, Arc::new(MemoryCache::new()));
    let ds = nwp.fetch_nwp(&site(), ts, "ukmo").await.unwrap();
    assert_eq!(ds.name(), "ukmo");
}

#[tokio::test]
async fn test_unknown_source_rejected_before_any_request() {
    let server = MockServer::start().await;

    let nwp = client(&server, Arc::new(MemoryCache::new()));
    let err = nwp.fetch_nwp(&site(), now(), "ukmo").await.unwrap_err();

    assert!(matches!(err, NwpError::InvalidSource(ref s) if s == "ukmo"));
    assert_eq!(
        err.to_string(),
        r#"Source (ukmo) must be either "icon" or "gfs""#
    );
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/dwd-icon"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/dwd-icon"))
        .respond_with(ResponseTemplate::new(200).set_body_json(main_body(now(), 24)))
        .expect(1)
        .mount(&server)
        .await;
    mount_visibility(&server, now(), 24, 1).await;

    let nwp = client(&server, Arc::new(MemoryCache::new()));
    let ds = nwp.fetch_nwp(&site(), now(), "icon").await.unwrap();
    assert_eq!(ds.step().len(), 24);
}

#[tokio::test]
async fn test_exhausted_retries_surface_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/dwd-icon"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let nwp = client(&server, Arc::new(MemoryCache::new()));
    let err = nwp.fetch_nwp(&site(), now(), "icon").await.unwrap_err();
    assert!(matches!(err, NwpError::UpstreamUnavailable(ref m) if m.contains("500")));
}

#[tokio::test]
async fn test_client_error_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/dwd-icon"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": true,
            "reason": "Latitude must be in range of -90 to 90°."
        })))
        .expect(2)
        .mount(&server)
        .await;

    let nwp = client(&server, Arc::new(MemoryCache::new()));
    for _ in 0..2 {
        let err = nwp.fetch_nwp(&site(), now(), "icon").await.unwrap_err();
        assert!(
            matches!(err, NwpError::UpstreamUnavailable(ref m) if m.contains("400") && m.contains("Latitude"))
        );
    }
}

#[tokio::test]
async fn test_missing_hourly_block_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/dwd-icon"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"latitude": 51.5})))
        .mount(&server)
        .await;

    let nwp = client(&server, Arc::new(MemoryCache::new()));
    let err = nwp.fetch_nwp(&site(), now(), "icon").await.unwrap_err();
    assert!(matches!(err, NwpError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_empty_time_axis_is_empty_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/dwd-icon"))
        .respond_with(ResponseTemplate::new(200).set_body_json(main_body(now(), 0)))
        .mount(&server)
        .await;
    mount_visibility(&server, now(), 0, 0).await;

    let nwp = client(&server, Arc::new(MemoryCache::new()));
    let err = nwp.fetch_nwp(&site(), now(), "icon").await.unwrap_err();
    assert!(matches!(err, NwpError::EmptyData));
}
