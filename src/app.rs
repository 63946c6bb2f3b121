//! Router assembly: one method router mounted on `/` and on the wildcard path.

use axum::extract::{DefaultBodyLimit, Extension};
use axum::routing::get;
use axum::{Router, middleware};
use std::sync::Arc;

use crate::auth::auth_middleware;
use crate::config::ServerConfig;
use crate::files::{delete_entry, list_or_download};
use crate::http::request_trace_layer;
use crate::storage::Storage;
use crate::upload::{request_body_limit, upload_file};

/// Builds the application router for an already validated configuration.
pub fn build_router(config: Arc<ServerConfig>) -> Router {
    let storage = Arc::new(Storage::new(config.root.clone()));
    let methods = get(list_or_download)
        .post(upload_file)
        .delete(delete_entry);

    let mut app = Router::new()
        .route("/", methods.clone())
        .route("/{*path}", methods)
        .layer(DefaultBodyLimit::max(request_body_limit(config.upload_limit)))
        .layer(middleware::from_fn(auth_middleware))
        .layer(Extension(storage))
        .layer(Extension(config.clone()));

    if config.log_file.is_some() {
        app = app.layer(request_trace_layer());
    }
    app
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body as AxumBody;
    use axum::http::{Request, StatusCode, header};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::auth::AuthGate;

    const BOUNDARY: &str = "router-test-boundary";
    // "admin:secret"
    const GOOD_CREDENTIALS: &str = "Basic YWRtaW46c2VjcmV0";
    // "admin:wrong"
    const BAD_CREDENTIALS: &str = "Basic YWRtaW46d3Jvbmc=";

    fn make_app(auth: AuthGate, upload_limit: u64) -> (tempfile::TempDir, std::path::PathBuf, Router) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("root");
        std::fs::create_dir_all(&root).expect("create root");
        let config = Arc::new(ServerConfig {
            bind: [127, 0, 0, 1].into(),
            port: 0,
            root: root.clone(),
            auth,
            upload_limit,
            log_file: None,
        });
        (temp, root, build_router(config))
    }

    fn enabled_auth() -> AuthGate {
        AuthGate::parse("admin:secret").expect("parse auth")
    }

    fn request(method: &str, uri: &str, authorization: Option<&str>) -> Request<AxumBody> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(AxumBody::empty()).expect("request")
    }

    fn upload_request(uri: &str, file_name: &str, contents: &[u8]) -> Request<AxumBody> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\r\n")
                .as_bytes(),
        );
        body.extend_from_slice(contents);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(AxumBody::from(body))
            .expect("request")
    }

    async fn body_text(response: Response) -> String {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        String::from_utf8_lossy(&bytes).to_string()
    }

    #[tokio::test]
    async fn root_and_nested_paths_are_routed() {
        let (_temp, root, app) = make_app(AuthGate::Disabled, 1024);
        std::fs::create_dir(root.join("docs")).expect("mkdir");
        std::fs::write(root.join("docs/a.txt"), b"alpha").expect("write");

        let response = app
            .clone()
            .oneshot(request("GET", "/", None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains(r#"href="/docs/""#));

        let response = app
            .oneshot(request("GET", "/docs/a.txt", None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "alpha");
    }

    #[tokio::test]
    async fn encoded_traversal_stays_inside_root() {
        let (temp, _root, app) = make_app(AuthGate::Disabled, 1024);
        std::fs::write(temp.path().join("secret.txt"), b"top secret").expect("write");

        let response = app
            .oneshot(request("GET", "/..%2Fsecret.txt", None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body_text(response).await.contains("top secret"));
    }

    #[tokio::test]
    async fn auth_accepts_matching_credentials() {
        let (_temp, _root, app) = make_app(enabled_auth(), 1024);
        let response = app
            .oneshot(request("GET", "/", Some(GOOD_CREDENTIALS)))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn auth_challenges_missing_or_wrong_credentials() {
        let (_temp, _root, app) = make_app(enabled_auth(), 1024);
        for authorization in [None, Some(BAD_CREDENTIALS), Some("Bearer token")] {
            let response = app
                .clone()
                .oneshot(request("GET", "/", authorization))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(
                response
                    .headers()
                    .get(header::WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok()),
                Some(r#"Basic realm="Authorization Required""#)
            );
        }
    }

    #[tokio::test]
    async fn rejected_requests_never_touch_the_filesystem() {
        let (_temp, root, app) = make_app(enabled_auth(), 1024);
        std::fs::write(root.join("keep.txt"), b"k").expect("write");

        let response = app
            .clone()
            .oneshot(request("DELETE", "/keep.txt", Some(BAD_CREDENTIALS)))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(root.join("keep.txt").exists());

        let response = app
            .oneshot(upload_request("/", "new.txt", b"n"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(!root.join("new.txt").exists());
    }

    #[tokio::test]
    async fn upload_then_delete_round_trip() {
        let (_temp, root, app) = make_app(AuthGate::Disabled, 1024);

        let response = app
            .clone()
            .oneshot(upload_request("/", "note.txt", b"remember"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "File uploaded successfully");
        assert_eq!(std::fs::read(root.join("note.txt")).expect("read"), b"remember");

        let response = app
            .clone()
            .oneshot(request("DELETE", "/note.txt", None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "File deleted successfully");

        let response = app
            .oneshot(request("DELETE", "/note.txt", None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn oversized_body_is_cut_off() {
        let (_temp, root, app) = make_app(AuthGate::Disabled, 8);
        let contents = vec![b'x'; 200 * 1024];
        let response = app
            .oneshot(upload_request("/", "huge.bin", &contents))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(std::fs::read_dir(&root).expect("read dir").count(), 0);
    }

    #[tokio::test]
    async fn disabled_uploads_are_forbidden() {
        let (_temp, root, app) = make_app(AuthGate::Disabled, 0);
        let response = app
            .oneshot(upload_request("/", "a.txt", b"a"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(!root.join("a.txt").exists());
    }
}
