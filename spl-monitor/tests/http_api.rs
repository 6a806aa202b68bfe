use std::{net::SocketAddr, sync::Arc};

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

use spl_monitor::{
    api::{serve_http, ApiSettings},
    db::{RollupSettings, SoundData},
};

struct TestServer {
    _temp_dir: TempDir,
    base: String,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let data = Arc::new(
            SoundData::open(temp_dir.path().join("spl.db"), RollupSettings::default())
                .await
                .unwrap(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(serve_http(listener, data, ApiSettings::default()));

        Self {
            _temp_dir: temp_dir,
            base: format!("http://{}", addr),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;

    let (status, body) = server.get("/api/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
    assert!(body["timestamp"].is_string());

    let response = server
        .client
        .head(server.url("/api/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn test_calibration_round_trip() {
    let server = TestServer::start().await;

    let (status, body) = server.get("/api/calibration").await;
    assert_eq!(status, 200);
    assert_eq!(body["offset"], 0.0);

    let (status, body) = server
        .post(
            "/api/calibration",
            json!({ "spl_reading": 94.0, "dbfs_reading": -26.0 }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["offset"], 120.0);

    let (status, body) = server.get("/api/calibration").await;
    assert_eq!(status, 200);
    assert_eq!(body["spl_value"], 94.0);
    assert_eq!(body["dbfs_value"], -26.0);
    assert_eq!(body["offset"], 120.0);

    let (status, body) = server
        .post("/api/audio-reading", json!({ "dbfs": -60.0 }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["spl"], 60.0);
    assert_eq!(body["status"], "saved");
}

#[tokio::test]
async fn test_readings_feed_daily_and_range_views() {
    let server = TestServer::start().await;

    for (dbfs, timestamp) in [(55.0, "2024-01-01T10:15:00"), (65.0, "2024-01-01T10:45:00")] {
        let (status, body) = server
            .post(
                "/api/audio-reading",
                json!({ "dbfs": dbfs, "timestamp": timestamp }),
            )
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["timestamp"], timestamp);
    }

    let (status, body) = server.get("/api/daily-data?date=2024-01-01").await;
    assert_eq!(status, 200);
    let hours = body.as_array().unwrap();
    assert_eq!(hours.len(), 24);
    assert_eq!(hours[10]["hour"], "10AM");
    assert_eq!(hours[10]["level"], 60.0);
    assert_eq!(hours[10]["duration"], 0.0006);
    assert_eq!(hours[9]["level"], 0.0);

    let (status, body) = server
        .get("/api/time-by-range?date=2024-01-01&period=day")
        .await;
    assert_eq!(status, 200);
    let ranges = body.as_array().unwrap();
    assert_eq!(ranges.len(), 6);
    assert_eq!(ranges[1]["range"], "40-60dB");
    assert_eq!(ranges[1]["avgLevel"], 55.0);
    assert_eq!(ranges[2]["range"], "60-80dB");
    assert_eq!(ranges[2]["avgLevel"], 65.0);

    let (status, body) = server.get("/api/daily-summary?date=2024-01-01").await;
    assert_eq!(status, 200);
    assert_eq!(body["date"], "2024-01-01");
    assert_eq!(body["max_level"], 65.0);

    let (status, body) = server.get("/api/daily-summary?date=2023-12-31").await;
    assert_eq!(status, 200);
    assert!(body.is_null());
}

#[tokio::test]
async fn test_weekly_data_shape() {
    let server = TestServer::start().await;

    let (status, body) = server.get("/api/weekly-data").await;
    assert_eq!(status, 200);
    let days = body.as_array().unwrap();
    assert_eq!(days.len(), 7);
    for day in days {
        assert_eq!(day["level"], 0.0);
        assert_eq!(day["totalExposure"], 0.0);
        assert!(day["date"].is_string());
    }
}

#[tokio::test]
async fn test_validation_errors_are_bad_requests() {
    let server = TestServer::start().await;

    let (status, body) = server.get("/api/daily-data?date=01/02/2024").await;
    assert_eq!(status, 400);
    assert!(body["detail"].is_string());

    let (status, _) = server.get("/api/time-by-range?period=month").await;
    assert_eq!(status, 400);

    let (status, _) = server
        .post(
            "/api/audio-reading",
            json!({ "dbfs": 50.0, "timestamp": "yesterday" }),
        )
        .await;
    assert_eq!(status, 400);

    let (status, _) = server
        .post("/api/audio-reading", json!({ "level": 50.0 }))
        .await;
    assert_eq!(status, 400);

    let response = server
        .client
        .delete(server.url("/api/clear-old-data?days=-3"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let response = server
        .client
        .get(server.url("/api/unknown"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn test_clear_old_data() {
    let server = TestServer::start().await;

    server
        .post(
            "/api/audio-reading",
            json!({ "dbfs": 70.0, "timestamp": "2000-01-01T12:00:00" }),
        )
        .await;
    server.post("/api/audio-reading", json!({ "dbfs": 70.0 })).await;

    let response = server
        .client
        .delete(server.url("/api/clear-old-data"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["deleted"]["hourly"], 1);
    assert_eq!(body["deleted"]["ranges"], 1);
    assert_eq!(body["deleted"]["daily"], 1);
    assert!(body["cutoff"].is_string());

    let (_, body) = server.get("/api/daily-data?date=2000-01-01").await;
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .all(|hour| hour["level"] == 0.0));

    let (_, body) = server.get("/api/daily-data").await;
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .any(|hour| hour["level"] == 70.0));
}
