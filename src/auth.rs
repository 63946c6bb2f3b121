//! Basic 认证闸门：启动时固定的一组用户名/密码。

use axum::extract::Extension;
use axum::http::{HeaderMap, HeaderValue, Request, header};
use axum::{body::Body as AxumBody, middleware, response::Response};
use axum_extra::extract::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Basic};
use axum_extra::typed_header::TypedHeaderRejection;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::config::{AUTH_REALM, ConfigError, ServerConfig};
use crate::error::ApiError;

/// 认证状态：要么全部放行，要么要求唯一的一组凭据。
#[derive(Clone)]
pub enum AuthGate {
    Disabled,
    Enabled { username: String, password: String },
}

impl fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthGate::Disabled => f.write_str("Disabled"),
            AuthGate::Enabled { username, .. } => f
                .debug_struct("Enabled")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

impl AuthGate {
    /// 解析 `username:password`，密码部分允许包含冒号。
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let (username, password) = value.split_once(':').ok_or(ConfigError::InvalidAuth)?;
        if username.is_empty() {
            return Err(ConfigError::InvalidAuth);
        }
        Ok(AuthGate::Enabled {
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// 校验凭据；未启用时任何请求都通过。
    pub fn permits(&self, credentials: Option<&Basic>) -> bool {
        match self {
            AuthGate::Disabled => true,
            AuthGate::Enabled { username, password } => credentials.is_some_and(|basic| {
                // 两项都比较，避免按字段短路
                let user_ok = constant_time_eq(basic.username(), username);
                let pass_ok = constant_time_eq(basic.password(), password);
                user_ok & pass_ok
            }),
        }
    }
}

/// 认证中间件：不通过时返回 401 与质询头，不进入处理器。
pub async fn auth_middleware(
    Extension(config): Extension<Arc<ServerConfig>>,
    auth_header: Result<TypedHeader<Authorization<Basic>>, TypedHeaderRejection>,
    req: Request<AxumBody>,
    next: middleware::Next,
) -> Result<Response, ApiError> {
    let credentials = auth_header.ok().map(|TypedHeader(Authorization(basic))| basic);
    if config.auth.permits(credentials.as_ref()) {
        return Ok(next.run(req).await);
    }

    warn!(
        path = req.uri().path(),
        has_credentials = credentials.is_some(),
        "unauthorized request"
    );
    Err(ApiError::Unauthorized(challenge_headers()))
}

fn challenge_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format!(r#"Basic realm="{AUTH_REALM}""#)) {
        headers.insert(header::WWW_AUTHENTICATE, value);
    }
    headers
}

fn constant_time_eq(left: &str, right: &str) -> bool {
    let left = left.as_bytes();
    let right = right.as_bytes();
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
