//! 目录列表、文件下载与删除处理器。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Json as JsonResponse, Response};
use httpdate::fmt_http_date;
use std::io::SeekFrom;
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::disk::disk_usage;
use crate::error::ApiError;
use crate::etag::{etag_from_metadata, if_range_allows, is_not_modified};
use crate::http::{request_path, wants_json};
use crate::listing::{ListingView, render_html};
use crate::storage::{Storage, Target};

/// GET：目录返回列表页，普通文件直接下载。
pub async fn list_or_download(
    path: Option<Path<String>>,
    headers: HeaderMap,
    Extension(config): Extension<Arc<ServerConfig>>,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<Response, ApiError> {
    let path = request_path(path);
    match storage.classify(&path).await? {
        Target::File(target) => download_file(&path, &target, &headers).await,
        Target::Directory(listing) => {
            let usage = disk_usage(storage.root_path()).await?;
            info!(
                path,
                dirs = listing.dirs.len(),
                files = listing.files.len(),
                "list directory"
            );
            let view = ListingView::new(&path, &listing, usage, config.upload_limit);
            if wants_json(&headers) {
                return Ok(JsonResponse(view).into_response());
            }
            Ok(Html(render_html(&view)?).into_response())
        }
    }
}

/// DELETE：删除单个条目，目录仅在为空时可删除。
pub async fn delete_entry(
    path: Option<Path<String>>,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<Response, ApiError> {
    let path = request_path(path);
    storage
        .delete_entry(&path)
        .await
        .map_err(|err| match ApiError::from(err) {
            ApiError::Internal(msg) => ApiError::Internal(format!("Failed to delete file: {msg}")),
            other => other,
        })?;
    info!(path, "delete entry");
    Ok((StatusCode::OK, "File deleted successfully").into_response())
}

/// 下载文件，支持 Range 请求与缓存相关头。
async fn download_file(
    path: &str,
    target: &FsPath,
    request_headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let metadata = fs::metadata(target)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    let file_size = metadata.len();
    let modified = metadata.modified().ok();
    let etag = etag_from_metadata(&metadata);
    let mime = mime_guess::from_path(target).first_or_octet_stream();

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.essence_str())
            .map_err(|_| ApiError::Internal("invalid mime type".into()))?,
    );
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Some(value) = modified.map(fmt_http_date) {
        response_headers.insert(
            header::LAST_MODIFIED,
            HeaderValue::from_str(&value)
                .map_err(|_| ApiError::Internal("failed to build header".into()))?,
        );
    }
    response_headers.insert(
        header::ETAG,
        HeaderValue::from_str(&etag)
            .map_err(|_| ApiError::Internal("failed to build header".into()))?,
    );

    if is_not_modified(request_headers, &etag, modified) {
        debug!(path, "download not modified");
        response_headers.remove(header::CONTENT_TYPE);
        return Ok((StatusCode::NOT_MODIFIED, response_headers).into_response());
    }

    let range = if if_range_allows(request_headers, &etag, modified) {
        parse_range(request_headers.get(header::RANGE), file_size)?
    } else {
        None
    };

    let file = File::open(target)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    if let Some((start, end)) = range {
        let length = end - start + 1;
        debug!(path, start, end, length, "download range request accepted");
        let mut file = file;
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        let stream = ReaderStream::new(file.take(length));
        response_headers.insert(
            header::CONTENT_RANGE,
            HeaderValue::from_str(&format!("bytes {}-{}/{}", start, end, file_size))
                .map_err(|_| ApiError::Internal("failed to build header".into()))?,
        );
        response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        return Ok((
            StatusCode::PARTIAL_CONTENT,
            response_headers,
            AxumBody::from_stream(stream),
        )
            .into_response());
    }

    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(file_size));
    info!(path, size = file_size, "download file");
    let stream = ReaderStream::new(file);
    Ok((
        StatusCode::OK,
        response_headers,
        AxumBody::from_stream(stream),
    )
        .into_response())
}

/// 解析单段 Range 头；多段请求按完整下载处理。
fn parse_range(
    value: Option<&HeaderValue>,
    file_size: u64,
) -> Result<Option<(u64, u64)>, ApiError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let Ok(value) = value.to_str() else {
        return Ok(None);
    };
    let Some(range) = value.strip_prefix("bytes=") else {
        return Ok(None);
    };
    if range.contains(',') {
        return Ok(None);
    }
    if file_size == 0 {
        return Err(ApiError::RangeNotSatisfiable(file_size));
    }

    let (start_part, end_part) = range.split_once('-').unwrap_or((range, ""));
    let start_part = start_part.trim();
    let end_part = end_part.trim();

    let (start, end) = if start_part.is_empty() {
        let suffix: u64 = end_part
            .parse()
            .map_err(|_| ApiError::BadRequest("invalid Range header".into()))?;
        if suffix == 0 {
            return Err(ApiError::RangeNotSatisfiable(file_size));
        }
        (file_size.saturating_sub(suffix), file_size - 1)
    } else {
        let start: u64 = start_part
            .parse()
            .map_err(|_| ApiError::BadRequest("invalid Range header".into()))?;
        let end: u64 = if end_part.is_empty() {
            file_size - 1
        } else {
            end_part
                .parse()
                .map_err(|_| ApiError::BadRequest("invalid Range header".into()))?
        };
        (start, end.min(file_size - 1))
    };

    if start > end || start >= file_size {
        return Err(ApiError::RangeNotSatisfiable(file_size));
    }

    Ok(Some((start, end)))
}
