//! 目录列表视图：嵌入式 minijinja 模板渲染与 JSON 表示。

use minijinja::value::Value;
use minijinja::{Environment, context};
use rust_embed::RustEmbed;
use serde::Serialize;

use crate::disk::{DiskUsage, human_readable_bytes};
use crate::error::ApiError;
use crate::storage::{FileMetadata, Listing, clean_segments};

#[derive(RustEmbed)]
#[folder = "templates"]
/// 嵌入式页面模板。
pub struct Templates;

// `.html` 后缀让 minijinja 对所有插值做 HTML 转义
const LISTING_TEMPLATE: &str = "index.html";

/// 列表页所需的全部数据。
#[derive(Serialize)]
pub struct ListingView<'a> {
    pub path: String,
    pub dirs: &'a [FileMetadata],
    pub files: &'a [FileMetadata],
    pub used_space: String,
    pub total_space: String,
    pub upload_limit: u64,
}

impl<'a> ListingView<'a> {
    /// `path` 取清理后的路径，与实际列出的目录一致。
    pub fn new(
        request_path: &str,
        listing: &'a Listing,
        usage: DiskUsage,
        upload_limit: u64,
    ) -> Self {
        Self {
            path: format!("/{}", clean_segments(request_path).join("/")),
            dirs: &listing.dirs,
            files: &listing.files,
            used_space: usage.used_display(),
            total_space: usage.total_display(),
            upload_limit,
        }
    }
}

/// 渲染 HTML 列表页。
pub fn render_html(view: &ListingView<'_>) -> Result<String, ApiError> {
    let asset = Templates::get(LISTING_TEMPLATE)
        .ok_or_else(|| ApiError::Internal("listing template missing".into()))?;
    let source = std::str::from_utf8(&asset.data)
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let mut env = Environment::new();
    env.add_template(LISTING_TEMPLATE, source)
        .map_err(template_error)?;
    let template = env.get_template(LISTING_TEMPLATE).map_err(template_error)?;

    let segments = clean_segments(&view.path);
    let base = href_base(&segments);
    let rows: Vec<Value> = view
        .dirs
        .iter()
        .map(|entry| {
            let href = format!("{base}{}/", urlencoding::encode(&entry.name));
            row(href, entry, "-".into())
        })
        .chain(view.files.iter().map(|entry| {
            row(
                format!("{base}{}", urlencoding::encode(&entry.name)),
                entry,
                human_readable_bytes(entry.size),
            )
        }))
        .collect();
    let parent_href = segments
        .split_last()
        .map(|(_, parent)| Value::from_safe_string(href_base(parent)));

    template
        .render(context! {
            segments => &segments,
            used_space => &view.used_space,
            total_space => &view.total_space,
            upload_limit => view.upload_limit,
            upload_limit_display => human_readable_bytes(view.upload_limit),
            parent_href => &parent_href,
            rows => &rows,
        })
        .map_err(template_error)
}

// 链接只由百分号编码后的段与 `/` 组成，可直接标记为安全字符串
fn row(href: String, entry: &FileMetadata, size: String) -> Value {
    context! {
        href => Value::from_safe_string(href),
        label => &entry.name,
        is_dir => entry.is_dir,
        size => size,
        modified => &entry.modified,
    }
}

fn href_base(segments: &[&str]) -> String {
    let mut base = String::from("/");
    for segment in segments {
        base.push_str(&urlencoding::encode(segment));
        base.push('/');
    }
    base
}

fn template_error(err: minijinja::Error) -> ApiError {
    ApiError::Internal(format!("failed to render listing: {err}"))
}
