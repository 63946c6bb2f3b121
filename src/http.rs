//! HTTP 辅助工具：请求路径、内容协商、客户端 IP 与请求日志层。

use axum::body::Body as AxumBody;
use axum::extract::{Path, connect_info::ConnectInfo};
use axum::http::{HeaderMap, Request, header};
use std::net::{IpAddr, SocketAddr};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, Span, info_span};

/// 通配路由捕获的剩余路径；根路由没有捕获时返回 `/`。
pub fn request_path(path: Option<Path<String>>) -> String {
    match path {
        Some(Path(path)) => format!("/{}", path.trim_start_matches('/')),
        None => "/".to_string(),
    }
}

/// 仅当 Accept 的首选类型为 JSON 时返回 JSON 列表。
pub fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().starts_with("application/json"))
        .unwrap_or(false)
}

/// 从 `x-forwarded-for` 解析客户端 IP。
pub fn extract_forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<IpAddr>().ok())
}

/// 综合转发头与连接信息计算客户端 IP。
pub fn resolve_client_ip(headers: &HeaderMap, connect_ip: Option<IpAddr>) -> Option<IpAddr> {
    extract_forwarded_ip(headers).or(connect_ip)
}

/// 请求日志层：每个请求与响应记录一条 INFO 日志。
pub fn request_trace_layer() -> TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    impl Fn(&Request<AxumBody>) -> Span + Clone,
> {
    TraceLayer::new_for_http()
        .make_span_with(|request: &Request<AxumBody>| {
            let connect_ip = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip());
            let client_ip = resolve_client_ip(request.headers(), connect_ip)
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "unknown".to_string());

            info_span!(
                "request",
                client_ip,
                method = %request.method(),
                path = request.uri().path(),
            )
        })
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO))
}
