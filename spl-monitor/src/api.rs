use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{
    body::Incoming,
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::http1,
    service::service_fn,
    Method, Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{collections::HashMap, convert::Infallible, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use spl_rollup::{
    retention::DEFAULT_DAYS_TO_KEEP,
    windowing::{format_timestamp, now_local},
    Period, RollupError,
};

use crate::db::SoundData;

#[derive(Debug, Deserialize)]
struct CalibrationRequest {
    spl_reading: f64,
    dbfs_reading: f64,
}

#[derive(Debug, Deserialize)]
struct AudioReadingRequest {
    dbfs: f64,
    #[serde(default)]
    timestamp: Option<String>,
}

/// Server-wide defaults the HTTP layer needs.
#[derive(Debug, Clone, Copy)]
pub struct ApiSettings {
    pub default_days_to_keep: i64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            default_days_to_keep: DEFAULT_DAYS_TO_KEEP,
        }
    }
}

pub async fn run_http_server(
    address: String,
    data: Arc<SoundData>,
    settings: ApiSettings,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(&address).await?;
    info!("HTTP API listening on http://{}", address);
    serve_http(listener, data, settings).await
}

pub async fn serve_http(
    listener: TcpListener,
    data: Arc<SoundData>,
    settings: ApiSettings,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let data = data.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let data = data.clone();
                async move { handle_request(req, data, settings).await }
            });

            if let Err(err) = http1::Builder::new()
                .keep_alive(true)
                .serve_connection(io, service)
                .await
            {
                error!("Error serving connection: {:?}", err);
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    data: Arc<SoundData>,
    settings: ApiSettings,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = parse_query(req.uri().query().unwrap_or(""));

    let response = match (&method, path.as_str()) {
        (&Method::POST, "/api/calibration") => match read_json::<CalibrationRequest>(req).await {
            Ok(body) => save_calibration(&data, body).await,
            Err(e) => error_response(&e),
        },
        (&Method::GET, "/api/calibration") => get_calibration(&data).await,
        (&Method::POST, "/api/audio-reading") => {
            match read_json::<AudioReadingRequest>(req).await {
                Ok(body) => save_audio_reading(&data, body).await,
                Err(e) => error_response(&e),
            }
        }
        (&Method::GET, "/api/daily-data") => {
            respond(data.daily_series(query.get("date").map(String::as_str)).await)
        }
        (&Method::GET, "/api/weekly-data") => respond(data.weekly_series().await),
        (&Method::GET, "/api/time-by-range") => time_by_range(&data, &query).await,
        (&Method::GET, "/api/daily-summary") => {
            respond(data.daily_summary(query.get("date").map(String::as_str)).await)
        }
        (&Method::DELETE, "/api/clear-old-data") => clear_old_data(&data, &query, settings).await,
        (&Method::GET, "/api/health") | (&Method::HEAD, "/api/health") => serve_health(&data).await,
        _ => {
            let mut response = Response::new(Full::new(Bytes::from("Not Found")));
            *response.status_mut() = StatusCode::NOT_FOUND;
            response
        }
    };

    Ok(response)
}

async fn save_calibration(data: &SoundData, body: CalibrationRequest) -> Response<Full<Bytes>> {
    match data
        .save_calibration(body.spl_reading, body.dbfs_reading)
        .await
    {
        Ok(offset) => json_response(
            StatusCode::OK,
            &json!({
                "offset": offset,
                "message": format!("Calibration saved successfully. Offset: {:.2} dB", offset),
            }),
        ),
        Err(e) => error_response(&e),
    }
}

async fn get_calibration(data: &SoundData) -> Response<Full<Bytes>> {
    match data.latest_calibration().await {
        Ok(Some(record)) => json_response(
            StatusCode::OK,
            &json!({
                "spl_value": record.spl_value,
                "dbfs_value": record.dbfs_value,
                "offset": record.offset(),
                "timestamp": format_timestamp(&record.timestamp),
            }),
        ),
        Ok(None) => json_response(
            StatusCode::OK,
            &json!({ "message": "No calibration data found", "offset": 0.0 }),
        ),
        Err(e) => error_response(&e),
    }
}

async fn save_audio_reading(data: &SoundData, body: AudioReadingRequest) -> Response<Full<Bytes>> {
    match data.submit(body.dbfs, body.timestamp.as_deref()).await {
        Ok(reading) => json_response(
            StatusCode::OK,
            &json!({
                "spl": reading.spl,
                "timestamp": reading.timestamp,
                "status": "saved",
            }),
        ),
        Err(e) => error_response(&e),
    }
}

async fn time_by_range(data: &SoundData, query: &HashMap<String, String>) -> Response<Full<Bytes>> {
    let period = match query.get("period").map(|p| p.parse::<Period>()) {
        Some(Ok(period)) => period,
        Some(Err(e)) => return error_response(&e),
        None => Period::Day,
    };

    respond(
        data.range_series(query.get("date").map(String::as_str), period)
            .await,
    )
}

async fn clear_old_data(
    data: &SoundData,
    query: &HashMap<String, String>,
    settings: ApiSettings,
) -> Response<Full<Bytes>> {
    let days = match query.get("days") {
        Some(raw) => match raw.parse::<i64>() {
            Ok(days) => days,
            Err(_) => {
                return error_response(&RollupError::validation(format!(
                    "days must be an integer, got {:?}",
                    raw
                )))
            }
        },
        None => settings.default_days_to_keep,
    };

    match data.prune(days).await {
        Ok(report) => json_response(
            StatusCode::OK,
            &json!({
                "message": format!("Cleared data older than {} days", days),
                "cutoff": report.cutoff,
                "deleted": report.deleted,
            }),
        ),
        Err(e) => error_response(&e),
    }
}

async fn serve_health(data: &SoundData) -> Response<Full<Bytes>> {
    let connected = match data.ping().await {
        Ok(()) => true,
        Err(e) => {
            error!("Health check failed: {}", e);
            false
        }
    };

    let status_code = if connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json_response(
        status_code,
        &json!({
            "status": if connected { "healthy" } else { "unhealthy" },
            "timestamp": format_timestamp(&now_local()),
            "database": if connected { "connected" } else { "unavailable" },
        }),
    )
}

async fn read_json<T: for<'de> Deserialize<'de>>(req: Request<Incoming>) -> Result<T, RollupError> {
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| RollupError::validation(format!("failed to read request body: {}", e)))?
        .to_bytes();

    serde_json::from_slice(&body)
        .map_err(|e| RollupError::validation(format!("malformed request body: {}", e)))
}

/// Parse `a=1&b=2` into a map. Values are taken verbatim.
fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|param| param.split_once('='))
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn respond<T: Serialize>(result: Result<T, RollupError>) -> Response<Full<Bytes>> {
    match result {
        Ok(body) => json_response(StatusCode::OK, &body),
        Err(e) => error_response(&e),
    }
}

fn error_response(err: &RollupError) -> Response<Full<Bytes>> {
    let status = if err.is_validation() {
        warn!("Rejected request: {}", err);
        StatusCode::BAD_REQUEST
    } else {
        error!("Request failed: {}", err);
        StatusCode::INTERNAL_SERVER_ERROR
    };

    json_response(status, &json!({ "detail": err.to_string() }))
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body)
        .unwrap_or_else(|_| r#"{"detail":"serialization failed"}"#.to_string());

    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
