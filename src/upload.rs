//! 表单上传处理器：单个 `file` 字段，超出上限即中止读取。

use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{Extension, Multipart, Path};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{info, warn};

use crate::atomic::StagedFile;
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::http::request_path;
use crate::storage::Storage;

pub const UPLOAD_FIELD: &str = "file";
/// 为 multipart 边界与字段头预留的请求体余量。
pub const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// 整个请求体的上限：文件上限加上表单开销。
pub fn request_body_limit(upload_limit: u64) -> usize {
    usize::try_from(upload_limit.saturating_add(MULTIPART_OVERHEAD)).unwrap_or(usize::MAX)
}

/// POST：把上传文件以原文件名写入目标目录，同名文件直接覆盖。
pub async fn upload_file(
    path: Option<Path<String>>,
    Extension(config): Extension<Arc<ServerConfig>>,
    Extension(storage): Extension<Arc<Storage>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    if !config.uploads_enabled() {
        return Err(ApiError::Forbidden("Uploads are disabled".into()));
    }
    let path = request_path(path);
    let mut multipart = multipart
        .map_err(|err| ApiError::BadRequest(format!("Failed to upload file: {}", err.body_text())))?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        return save_field(&path, field, &config, &storage).await;
    }
    Err(ApiError::BadRequest(format!(
        "Failed to upload file: missing field `{UPLOAD_FIELD}`"
    )))
}

async fn save_field(
    path: &str,
    field: Field<'_>,
    config: &ServerConfig,
    storage: &Storage,
) -> Result<Response, ApiError> {
    let file_name = field
        .file_name()
        .and_then(sanitize_file_name)
        .ok_or_else(|| ApiError::BadRequest("Failed to upload file: missing filename".into()))?;
    let target = storage.resolve(path).join(&file_name);

    let staged = StagedFile::create(&target)
        .await
        .map_err(|err| ApiError::Internal(format!("Failed to save file: {err}")))?;
    let size = copy_field(field, staged, config.upload_limit).await?;

    info!(path, name = file_name, size, "upload file");
    Ok((StatusCode::OK, "File uploaded successfully").into_response())
}

// 任何失败都会删除暂存文件，目标不会出现半截内容。
async fn copy_field(
    mut field: Field<'_>,
    mut staged: StagedFile,
    limit: u64,
) -> Result<u64, ApiError> {
    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(err) => {
                staged.discard().await;
                return Err(multipart_error(err));
            }
        };
        if staged.written() + chunk.len() as u64 > limit {
            warn!(limit, "upload exceeds limit");
            staged.discard().await;
            return Err(ApiError::PayloadTooLarge(format!(
                "Failed to upload file: exceeds limit of {limit} bytes"
            )));
        }
        if let Err(err) = staged.write_chunk(&chunk).await {
            staged.discard().await;
            return Err(ApiError::Internal(format!("Failed to save file: {err}")));
        }
    }

    staged
        .commit()
        .await
        .map_err(|err| ApiError::Internal(format!("Failed to save file: {err}")))
}

fn multipart_error(err: MultipartError) -> ApiError {
    let message = format!("Failed to upload file: {}", err.body_text());
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(message)
    } else {
        ApiError::BadRequest(message)
    }
}

/// 只保留客户端文件名的最后一段。
fn sanitize_file_name(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next()?.trim();
    match name {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}
