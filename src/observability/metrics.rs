//! Metrics collection and Prometheus export module.
//!
//! This module provides:
//! - Per-IP rate limiting and bearer-token auth for the metrics endpoint
//! - Prometheus metrics server setup
//! - Recording functions for pipeline, stage, transfer and request metrics

use anyhow::Result;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

use crate::config::StoreConfig;
use crate::observability_config::ObservabilityConfig;

/// Simple rate limiter for HTTP requests
#[derive(Debug)]
pub struct RateLimiter {
    requests: Mutex<HashMap<String, Vec<Instant>>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    /// Check if request is allowed for the given IP
    pub fn is_allowed(&self, ip: &str) -> bool {
        let now = Instant::now();

        let mut requests = match self.requests.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                record_error_metrics("mutex_poisoned", "rate_limiter");
                poisoned.into_inner()
            }
        };
        let client_requests = requests.entry(ip.to_string()).or_default();

        client_requests.retain(|&time| now.duration_since(time) < self.window);

        if client_requests.len() >= self.max_requests as usize {
            return false;
        }

        client_requests.push(now);
        true
    }
}

/// Check the bearer token against `METRICS_AUTH_TOKEN`, if one is set
pub fn check_auth(req: &hyper::Request<hyper::body::Incoming>) -> bool {
    let expected_token = match std::env::var("METRICS_AUTH_TOKEN") {
        Ok(token) if !token.is_empty() => token,
        _ => return true,
    };

    req.headers()
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token == expected_token)
        .unwrap_or(false)
}

/// Initialize metrics collection with Prometheus exporter and configuration
pub fn init_metrics_with_config(config: &ObservabilityConfig) -> Result<PrometheusHandle> {
    let mut builder = PrometheusBuilder::new();
    for (key, value) in &config.tags {
        builder = builder.add_global_label(key.clone(), value.clone());
    }
    let handle = builder.install_recorder()?;

    tracing::info!(
        metrics_enabled = %config.enable_metrics_export,
        "Metrics collection initialized"
    );
    Ok(handle)
}

fn metrics_bind_address(port: u16) -> SocketAddr {
    // Localhost only unless explicitly opened up
    let bind_all = std::env::var("METRICS_BIND_ALL_INTERFACES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    if bind_all {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port)
    } else {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }
}

/// Start the metrics server with liveness and readiness probes.
///
/// Readiness checks the store directories when a [`StoreConfig`] is given.
pub async fn start_metrics_server(
    metrics_handle: PrometheusHandle,
    port: u16,
    store_config: Option<StoreConfig>,
) -> Result<SocketAddr> {
    let addr = metrics_bind_address(port);

    // 10 requests per minute per IP
    let rate_limiter = Arc::new(RateLimiter::new(10, 60));
    let store_config = store_config.map(Arc::new);

    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("Metrics server listening on {}", local_addr);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let metrics_handle = metrics_handle.clone();
                    let rate_limiter = rate_limiter.clone();
                    let store_config = store_config.clone();

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = hyper::service::service_fn(
                            move |req: hyper::Request<hyper::body::Incoming>| {
                                let metrics_handle = metrics_handle.clone();
                                let rate_limiter = rate_limiter.clone();
                                let store_config = store_config.clone();
                                let peer_ip = peer_addr.ip().to_string();
                                async move {
                                    if !rate_limiter.is_allowed(&peer_ip) {
                                        let mut response =
                                            hyper::Response::new("Rate limit exceeded".to_string());
                                        *response.status_mut() =
                                            hyper::StatusCode::TOO_MANY_REQUESTS;
                                        return Ok::<_, std::convert::Infallible>(response);
                                    }

                                    if !check_auth(&req) {
                                        let mut response =
                                            hyper::Response::new("Unauthorized".to_string());
                                        *response.status_mut() = hyper::StatusCode::UNAUTHORIZED;
                                        response.headers_mut().insert(
                                            "www-authenticate",
                                            hyper::header::HeaderValue::from_static("Bearer"),
                                        );
                                        return Ok(response);
                                    }

                                    match (req.method(), req.uri().path()) {
                                        (&hyper::Method::GET, "/metrics") => {
                                            let mut response =
                                                hyper::Response::new(metrics_handle.render());
                                            response.headers_mut().insert(
                                                "content-type",
                                                hyper::header::HeaderValue::from_static(
                                                    "text/plain; version=0.0.4; charset=utf-8",
                                                ),
                                            );
                                            Ok(response)
                                        }
                                        (&hyper::Method::GET, "/health/live") => {
                                            Ok(hyper::Response::new("OK".to_string()))
                                        }
                                        (&hyper::Method::GET, "/health/ready") => {
                                            match crate::observability::health_checks::perform_readiness_checks(
                                                store_config.as_deref(),
                                            ) {
                                                Ok(_) => Ok(hyper::Response::new("OK".to_string())),
                                                Err(e) => {
                                                    let mut response = hyper::Response::new(
                                                        format!("NOT READY: {}", e),
                                                    );
                                                    *response.status_mut() =
                                                        hyper::StatusCode::SERVICE_UNAVAILABLE;
                                                    Ok(response)
                                                }
                                            }
                                        }
                                        _ => {
                                            let mut response =
                                                hyper::Response::new("Not Found".to_string());
                                            *response.status_mut() = hyper::StatusCode::NOT_FOUND;
                                            Ok(response)
                                        }
                                    }
                                }
                            },
                        );

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await
                        {
                            crate::errors::error_logging::log_network_error(
                                &err,
                                "serve_metrics_connection",
                                Some(&peer_addr.to_string()),
                                None,
                            );
                        }
                    });
                }
                Err(e) => {
                    crate::errors::error_logging::log_network_error(
                        &e,
                        "accept_tcp_connection",
                        Some(&local_addr.to_string()),
                        None,
                    );
                }
            }
        }
    });

    Ok(local_addr)
}

fn outcome_label(success: bool) -> String {
    if success { "success" } else { "failure" }.to_string()
}

/// Record the outcome of one orchestration run
pub fn record_pipeline_metrics(mode: &str, success: bool, duration: Duration) {
    let mode = mode.to_string();
    metrics::counter!("pipeline_runs_total", "mode" => mode.clone(), "result" => outcome_label(success))
        .increment(1);
    metrics::histogram!("pipeline_duration_seconds", "mode" => mode).record(duration.as_secs_f64());
}

/// Record the duration of a single pipeline stage
pub fn record_stage_metrics(stage: &str, success: bool, duration: Duration) {
    let stage = stage.to_string();
    metrics::counter!("pipeline_stage_total", "stage" => stage.clone(), "result" => outcome_label(success))
        .increment(1);
    metrics::histogram!("pipeline_stage_duration_seconds", "stage" => stage)
        .record(duration.as_secs_f64());
}

/// Record the threshold picked for an image and its foreground share
pub fn record_threshold_metrics(threshold: u8, foreground_ratio: f64, pixel_count: u64) {
    metrics::histogram!("otsu_threshold").record(f64::from(threshold));
    metrics::histogram!("otsu_foreground_ratio").record(foreground_ratio);
    metrics::histogram!("otsu_image_pixels").record(pixel_count as f64);
}

/// Record bytes moved to or from the store
pub fn record_transfer_metrics(direction: &str, bytes: u64, duration: Duration) {
    let direction = direction.to_string();
    metrics::counter!("blob_transfer_bytes_total", "direction" => direction.clone()).increment(bytes);
    metrics::histogram!("blob_transfer_duration_seconds", "direction" => direction)
        .record(duration.as_secs_f64());
}

/// Record request metrics
pub fn record_request_metrics(method: &str, route: &str, status: u16, duration: Duration) {
    let method = method.to_string();
    let route = route.to_string();
    let status = status.to_string();
    metrics::counter!("requests_total", "method" => method, "route" => route.clone(), "status" => status)
        .increment(1);
    metrics::histogram!("request_duration_seconds", "route" => route).record(duration.as_secs_f64());
}

/// Record a blob written by the store
pub fn record_blob_stored(area: &str, bytes: u64) {
    let area = area.to_string();
    metrics::counter!("blobs_stored_total", "area" => area.clone()).increment(1);
    metrics::histogram!("blob_size_bytes", "area" => area).record(bytes as f64);
}

/// Record health check metrics
pub fn record_health_check_metrics(check_type: &str, success: bool, duration: Duration) {
    let check_type = check_type.to_string();
    metrics::counter!("health_checks_total", "type" => check_type.clone(), "result" => outcome_label(success))
        .increment(1);
    metrics::histogram!("health_check_duration_seconds", "type" => check_type.clone())
        .record(duration.as_secs_f64());

    metrics::gauge!("health_check_status", "type" => check_type).set(if success {
        1.0
    } else {
        0.0
    });
}

/// Record error rate metrics
pub fn record_error_metrics(error_type: &str, component: &str) {
    let error_type = error_type.to_string();
    let component = component.to_string();
    metrics::counter!("errors_total", "type" => error_type, "component" => component).increment(1);
}

/// Record application startup metrics
pub fn record_startup_metrics(duration: Duration) {
    metrics::histogram!("application_startup_duration_seconds").record(duration.as_secs_f64());
    metrics::counter!("application_starts_total").increment(1);
}
