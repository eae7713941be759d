//! Status and metrics HTTP endpoint
//!
//! - `GET /status` - current `StatusView` as JSON (what the UI renders)
//! - `GET /metrics` - Prometheus text format
//! - `GET /health` - liveness

use crate::domain::status::StatusView;
use crate::infra::metrics::{
    Metrics, MetricsSummary, DISPATCH_BUCKET_BOUNDS, DISPATCH_NUM_BUCKETS,
};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; DISPATCH_NUM_BUCKETS],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, bound) in DISPATCH_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[DISPATCH_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics and availability in Prometheus text exposition format
fn format_prometheus_metrics(summary: &MetricsSummary, view: &StatusView, site: &str) -> String {
    let mut output = String::with_capacity(4096);

    let counters: [(&str, &str, u64); 10] = [
        ("tunnel_location_batches_total", "Location batches received", summary.location_batches_total),
        ("tunnel_samples_evaluated_total", "Samples run through the geofence", summary.samples_evaluated_total),
        ("tunnel_samples_throttled_total", "Samples skipped by the distance/time throttle", summary.samples_throttled_total),
        ("tunnel_location_errors_total", "Location errors reported by the device", summary.location_errors_total),
        ("tunnel_feed_snapshots_total", "Lift status snapshots applied", summary.feed_snapshots_total),
        ("tunnel_feed_errors_total", "Lift status feed errors", summary.feed_errors_total),
        ("tunnel_alerts_dispatched_total", "Alerts delivered", summary.alerts_dispatched_total),
        ("tunnel_alerts_failed_total", "Alerts the channel failed to deliver", summary.alerts_failed_total),
        ("tunnel_alerts_suppressed_total", "In-range entrances suppressed by cooldown", summary.alerts_suppressed_total),
        ("tunnel_events_dropped_total", "Inbound events dropped due to channel full", summary.events_dropped_total),
    ];
    for (name, help, val) in counters {
        write_metric(&mut output, name, help, MetricType::Counter, site, val);
    }

    write_histogram(
        &mut output,
        "tunnel_dispatch_latency_ms",
        "Alert dispatch latency in milliseconds",
        site,
        &summary.dispatch_latency_buckets_total,
        summary.dispatch_latency_sum_ms_total,
    );
    write_metric(
        &mut output,
        "tunnel_dispatch_latency_max_ms",
        "Maximum alert dispatch latency since last report",
        MetricType::Gauge,
        site,
        summary.dispatch_latency_max_ms,
    );

    let _ = writeln!(output, "# HELP tunnel_status_availability Lift status availability (1 = current state)");
    let _ = writeln!(output, "# TYPE tunnel_status_availability gauge");
    for state in ["loading", "live", "stale", "unavailable"] {
        let val = u8::from(view.availability.as_str() == state);
        let _ = writeln!(
            output,
            "tunnel_status_availability{{site=\"{site}\",state=\"{state}\"}} {val}"
        );
    }

    output
}

fn response(status: StatusCode, content_type: &str, body: String) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from(body)));
    *resp.status_mut() = status;
    if let Ok(value) = content_type.parse::<hyper::header::HeaderValue>() {
        resp.headers_mut().insert(hyper::header::CONTENT_TYPE, value);
    }
    resp
}

fn route(
    method: &Method,
    path: &str,
    metrics: &Metrics,
    view: &watch::Receiver<StatusView>,
    site_id: &str,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/status") => {
            let view = view.borrow().clone();
            match serde_json::to_string(&view) {
                Ok(body) => response(StatusCode::OK, "application/json", body),
                Err(e) => {
                    error!(error = %e, "status_serialize_failed");
                    response(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "error".to_string())
                }
            }
        }
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&metrics.snapshot(), &view.borrow(), site_id);
            response(StatusCode::OK, "text/plain; version=0.0.4; charset=utf-8", body)
        }
        (&Method::GET, "/health") => response(StatusCode::OK, "text/plain", "ok".to_string()),
        _ => response(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    view: watch::Receiver<StatusView>,
    site_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(route(req.method(), req.uri().path(), &metrics, &view, &site_id))
}

/// Start the status HTTP server
pub async fn start_status_server(
    port: u16,
    metrics: Arc<Metrics>,
    view: watch::Receiver<StatusView>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "status_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let view = view.clone();
                        let site_id = site_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                handle_request(req, metrics.clone(), view.clone(), site_id.clone())
                            });

                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                error!(error = %e, "status_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "status_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("status_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
