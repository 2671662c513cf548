//! HTTP front end for the detection pipeline.
//!
//! - `GET /health` reports liveness.
//! - `POST /detect?drone_lat=..&drone_lon=..&altitude=..&fov_h=..&fov_v=..`
//!   takes the image as the raw body or as the `file` part of a multipart form
//!   and answers with the geolocated detections.

mod multipart;

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::GeoError;
use crate::frame::DecodedImage;
use crate::geometry::{CameraFov, DronePose};
use crate::pipeline::{DetectionPipeline, DetectionResult, SkippedDetection};

const MAX_HEADER_BYTES: usize = 8192;
const REJECT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);
const TELEMETRY_PARAMS: [&str; 5] = ["drone_lat", "drone_lon", "altitude", "fov_h", "fov_v"];

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub max_upload_bytes: usize,
    /// Connections served at once; further ones get `503`.
    pub max_connections: usize,
    /// Wall-clock budget for reading one request, headers and body together.
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8000".to_string(),
            max_upload_bytes: 20 * 1024 * 1024,
            max_connections: 16,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

/// Response body of `POST /detect`.
#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub detections: Vec<DetectionResult>,
    pub skipped: Vec<SkippedDetection>,
}

pub struct ApiServer {
    cfg: ApiConfig,
    pipeline: Arc<DetectionPipeline>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, pipeline: Arc<DetectionPipeline>) -> Self {
        Self { cfg, pipeline }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg.clone();
        let pipeline = self.pipeline.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, cfg, pipeline, shutdown_thread) {
                log::error!("detection api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: ApiConfig,
    pipeline: Arc<DetectionPipeline>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let cfg = Arc::new(cfg);
    let active = Arc::new(AtomicUsize::new(0));
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let Some(slot) = ConnectionSlot::acquire(&active, cfg.max_connections) else {
                    log::warn!(
                        "rejecting {}: {} connections already in flight",
                        peer,
                        cfg.max_connections
                    );
                    if let Err(err) = reject_busy(stream) {
                        log::debug!("busy response to {} failed: {}", peer, err);
                    }
                    continue;
                };
                let cfg = cfg.clone();
                let pipeline = pipeline.clone();
                std::thread::spawn(move || {
                    let _slot = slot;
                    if let Err(err) = handle_connection(stream, &pipeline, &cfg) {
                        log::warn!("detection api request from {} failed: {}", peer, err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// One unit of the in-flight connection budget, released on drop.
struct ConnectionSlot {
    active: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    fn acquire(active: &Arc<AtomicUsize>, limit: usize) -> Option<Self> {
        active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < limit).then_some(n + 1)
            })
            .ok()?;
        Some(Self {
            active: active.clone(),
        })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

fn reject_busy(mut stream: TcpStream) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_write_timeout(Some(REJECT_WRITE_TIMEOUT))?;
    write_error(
        &mut stream,
        503,
        "busy",
        "too many concurrent requests, retry later",
    )?;
    stream.shutdown(Shutdown::Write)?;
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    pipeline: &DetectionPipeline,
    cfg: &ApiConfig,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_write_timeout(Some(cfg.request_timeout))?;
    let deadline = Instant::now() + cfg.request_timeout;

    let (mut request, leftover) = read_head(&mut stream, deadline)?;
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => {
            return write_json_response(&mut stream, 200, r#"{"status":"healthy"}"#);
        }
        ("POST", "/detect") => {}
        (_, "/health") | (_, "/detect") => {
            return write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#);
        }
        _ => return write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }

    let content_length = match request.content_length() {
        Ok(len) => len,
        Err(err) => return write_error(&mut stream, 400, "bad_request", &err.to_string()),
    };
    if content_length > cfg.max_upload_bytes {
        return write_error(
            &mut stream,
            413,
            "payload_too_large",
            &format!("upload exceeds {} bytes", cfg.max_upload_bytes),
        );
    }
    request.body = read_body(&mut stream, leftover, content_length, deadline)?;

    let (pose, fov) = match telemetry(&request.query) {
        Ok(values) => values,
        Err(err) => return write_error(&mut stream, 422, "invalid_parameter", &err.to_string()),
    };
    let image = match request.image_bytes() {
        Ok(bytes) => bytes,
        Err(err) => return write_error(&mut stream, 400, "bad_request", &err.to_string()),
    };

    let report = DecodedImage::decode(image)
        .and_then(|decoded| pipeline.run_image(&decoded, &pose, &fov));
    match report {
        Ok(report) => {
            log::info!(
                "detect: {} located, {} skipped (lat={} lon={} alt={})",
                report.results().len(),
                report.skipped().len(),
                pose.lat,
                pose.lon,
                pose.altitude
            );
            let response = DetectResponse {
                detections: report.results(),
                skipped: report.skipped(),
            };
            let payload = serde_json::to_vec(&response)?;
            write_response(&mut stream, 200, "application/json", &payload)
        }
        Err(err) => {
            let status = match err {
                GeoError::Decode(_) => 400,
                _ => 500,
            };
            log::warn!("detect request rejected: {}", err);
            write_error(&mut stream, status, err.kind(), &err.to_string())
        }
    }
}

/// Parse the five telemetry query parameters. Missing values default to `0.0`.
fn telemetry(query: &HashMap<String, String>) -> Result<(DronePose, CameraFov)> {
    let mut values = [0.0f64; 5];
    for (slot, name) in values.iter_mut().zip(TELEMETRY_PARAMS) {
        if let Some(raw) = query.get(name) {
            let value: f64 = raw
                .trim()
                .parse()
                .map_err(|_| anyhow!("{} must be a number, got '{}'", name, raw))?;
            if !value.is_finite() {
                return Err(anyhow!("{} must be finite", name));
            }
            *slot = value;
        }
    }
    let [lat, lon, altitude, fov_h, fov_v] = values;
    Ok((
        DronePose::new(lat, lon, altitude),
        CameraFov::new(fov_h, fov_v),
    ))
}

/// Read into `buf`, failing once `deadline` has passed.
fn read_before(stream: &mut TcpStream, buf: &mut [u8], deadline: Instant) -> Result<usize> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(anyhow!("request not received within the deadline"));
    }
    stream.set_read_timeout(Some(remaining))?;
    Ok(stream.read(buf)?)
}

fn read_head(stream: &mut TcpStream, deadline: Instant) -> Result<(HttpRequest, Vec<u8>)> {
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let head_end = loop {
        let n = read_before(stream, &mut buf, deadline)?;
        if n == 0 {
            return Err(anyhow!("connection closed before request headers"));
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request headers too large"));
        }
    };
    let leftover = data.split_off(head_end + 4);

    let text = String::from_utf8_lossy(&data[..head_end]);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let (path, query) = match raw_path.split_once('?') {
        Some((path, query)) => (path, parse_query(query)),
        None => (raw_path, HashMap::new()),
    };
    Ok((
        HttpRequest {
            method: method.to_string(),
            path: path.to_string(),
            query,
            headers,
            body: Vec::new(),
        },
        leftover,
    ))
}

fn read_body(
    stream: &mut TcpStream,
    mut body: Vec<u8>,
    content_length: usize,
    deadline: Instant,
) -> Result<Vec<u8>> {
    body.truncate(content_length);
    let mut buf = [0u8; 16 * 1024];
    while body.len() < content_length {
        let want = (content_length - body.len()).min(buf.len());
        let n = read_before(stream, &mut buf[..want], deadline)?;
        if n == 0 {
            return Err(anyhow!(
                "request body truncated: expected {} bytes, received {}",
                content_length,
                body.len()
            ));
        }
        body.extend_from_slice(&buf[..n]);
    }
    Ok(body)
}

/// Decode an `application/x-www-form-urlencoded` query string.
fn parse_query(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

fn write_error(stream: &mut TcpStream, status: u16, kind: &str, detail: &str) -> Result<()> {
    let payload = serde_json::to_vec(&serde_json::json!({ "error": kind, "detail": detail }))?;
    write_response(stream, status, "application/json", &payload)
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        422 => "HTTP/1.1 422 Unprocessable Entity",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl HttpRequest {
    fn content_length(&self) -> Result<usize> {
        match self.headers.get("content-length") {
            Some(value) => value
                .parse()
                .map_err(|_| anyhow!("invalid Content-Length '{}'", value)),
            None => Ok(0),
        }
    }

    /// Image payload: the `file` form part for multipart uploads, else the raw body.
    fn image_bytes(&self) -> Result<&[u8]> {
        let content_type = self
            .headers
            .get("content-type")
            .map(String::as_str)
            .unwrap_or("");
        if content_type
            .to_ascii_lowercase()
            .starts_with("multipart/form-data")
        {
            let boundary = multipart::boundary(content_type)
                .ok_or_else(|| anyhow!("multipart upload without boundary"))?;
            return multipart::extract_part(&self.body, &boundary, "file");
        }
        Ok(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn telemetry_defaults_to_zero() {
        let (pose, fov) = telemetry(&HashMap::new()).unwrap();
        assert_eq!(pose, DronePose::new(0.0, 0.0, 0.0));
        assert_eq!(fov, CameraFov::new(0.0, 0.0));
    }

    #[test]
    fn telemetry_parses_all_parameters() {
        let (pose, fov) = telemetry(&query(&[
            ("drone_lat", "27.7"),
            ("drone_lon", "-85.3"),
            ("altitude", "120"),
            ("fov_h", "84"),
            ("fov_v", "62.5"),
        ]))
        .unwrap();
        assert_eq!(pose, DronePose::new(27.7, -85.3, 120.0));
        assert_eq!(fov, CameraFov::new(84.0, 62.5));
    }

    #[test]
    fn telemetry_rejects_garbage() {
        assert!(telemetry(&query(&[("altitude", "high")])).is_err());
        assert!(telemetry(&query(&[("fov_h", "NaN")])).is_err());
    }

    #[test]
    fn parses_query_pairs() {
        let parsed = parse_query("a=1&b=&c");
        assert_eq!(parsed.get("a").map(String::as_str), Some("1"));
        assert_eq!(parsed.get("b").map(String::as_str), Some(""));
        assert_eq!(parsed.get("c").map(String::as_str), Some(""));
    }

    #[test]
    fn decodes_percent_encoded_values() {
        let parsed = parse_query("fov_h=8.4e%2B1&drone_lat=%2D12.5&note=two+words");
        assert_eq!(parsed.get("fov_h").map(String::as_str), Some("8.4e+1"));
        assert_eq!(parsed.get("drone_lat").map(String::as_str), Some("-12.5"));
        assert_eq!(parsed.get("note").map(String::as_str), Some("two words"));

        let (pose, fov) = telemetry(&parsed).unwrap();
        assert_eq!(pose.lat, -12.5);
        assert_eq!(fov.horizontal, 84.0);
    }
}
