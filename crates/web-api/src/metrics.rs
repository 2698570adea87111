//! Prometheus 指标
//!
//! 进程内安装一次全局 recorder，`/metrics` 直接渲染其快照；
//! HTTP 中间件按 method/path/status 统计请求量与耗时。

use std::sync::OnceLock;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use metrics::Label;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// 安装全局 recorder，重复调用是无害的。
pub fn install() -> Result<(), BuildError> {
    if HANDLE.get().is_some() {
        return Ok(());
    }
    match PrometheusBuilder::new()
        .set_buckets(DURATION_BUCKETS)?
        .install_recorder()
    {
        Ok(handle) => {
            describe_metrics();
            let _ = HANDLE.set(handle);
            Ok(())
        }
        // 与并发安装竞争失败：已有可用的 recorder 即视为成功
        Err(err) => match HANDLE.get() {
            Some(_) => Ok(()),
            None => Err(err),
        },
    }
}

fn describe_metrics() {
    metrics::describe_gauge!(
        "chat_ws_connections",
        "Current number of active websocket connections"
    );
    metrics::describe_counter!("chat_ws_messages_total", "Total number of chat messages sent");
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
}

/// 渲染 Prometheus 文本格式快照。
pub fn render() -> String {
    HANDLE.get().map(|handle| handle.render()).unwrap_or_default()
}

/// 统计基础请求指标，路径使用路由模板而非原始 URL。
pub async fn track_http(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());

    let start = Instant::now();
    let response = next.run(req).await;

    let labels = vec![
        Label::new("method", method),
        Label::new("path", path),
        Label::new("status", response.status().as_u16().to_string()),
    ];
    metrics::counter!("http_requests_total", labels.clone()).increment(1);
    metrics::histogram!("http_request_duration_seconds", labels)
        .record(start.elapsed().as_secs_f64());

    response
}
