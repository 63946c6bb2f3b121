use chrono::{DateTime, Local};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;

use crate::atomic::is_staged_name;

#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Joins the cleaned request path onto the root.
    ///
    /// The result always lies under the root. Resolution itself never fails.
    pub fn resolve(&self, request_path: &str) -> PathBuf {
        let mut target = self.root.clone();
        target.extend(clean_segments(request_path));
        target
    }

    /// Resolves the path and decides whether it names a file or a directory.
    pub async fn classify(&self, request_path: &str) -> Result<Target, StorageError> {
        let target = self.resolve(request_path);
        let metadata = fs::metadata(&target).await?;
        if !metadata.is_dir() {
            return Ok(Target::File(target));
        }
        let listing = read_listing(&target).await?;
        Ok(Target::Directory(listing))
    }

    /// Removes a single entry. Directories are only removed when empty.
    pub async fn delete_entry(&self, request_path: &str) -> Result<PathBuf, StorageError> {
        let target = self.resolve(request_path);
        if target == self.root {
            return Err(StorageError::RootProtected);
        }
        let metadata = fs::symlink_metadata(&target).await?;
        if metadata.is_dir() {
            fs::remove_dir(&target).await?;
        } else {
            fs::remove_file(&target).await?;
        }
        Ok(target)
    }
}

/// Lexically cleans a URL path into its segments.
///
/// `.` and empty segments are dropped, `..` pops the previous segment and is
/// ignored at the top. Both `/` and `\` separate segments.
pub fn clean_segments(request_path: &str) -> Vec<&str> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in request_path.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments
}

/// Outcome of resolving a request path against the tree.
#[derive(Debug)]
pub enum Target {
    File(PathBuf),
    Directory(Listing),
}

/// Immediate children of a directory, directories first.
#[derive(Debug, Default, Serialize)]
pub struct Listing {
    pub dirs: Vec<FileMetadata>,
    pub files: Vec<FileMetadata>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FileMetadata {
    pub name: String,
    pub size: u64,
    pub modified: String,
    pub is_dir: bool,
}

// A single failing child aborts the whole listing.
async fn read_listing(dir_path: &Path) -> Result<Listing, StorageError> {
    let mut dir = fs::read_dir(dir_path).await?;
    let mut listing = Listing::default();

    while let Some(entry) = dir.next_entry().await? {
        let metadata = entry.metadata().await?;
        let name = entry.file_name().to_string_lossy().to_string();
        if is_staged_name(&name) {
            continue;
        }
        let modified = metadata
            .modified()
            .map(format_timestamp)
            .unwrap_or_default();

        if metadata.is_dir() {
            listing.dirs.push(FileMetadata {
                name,
                size: 0,
                modified,
                is_dir: true,
            });
        } else {
            listing.files.push(FileMetadata {
                name,
                size: metadata.len(),
                modified,
                is_dir: false,
            });
        }
    }

    listing.dirs.sort_by_key(|entry| entry.name.to_lowercase());
    listing.files.sort_by_key(|entry| entry.name.to_lowercase());
    Ok(listing)
}

fn format_timestamp(timestamp: SystemTime) -> String {
    let datetime: DateTime<Local> = timestamp.into();
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[derive(Debug)]
pub enum StorageError {
    RootProtected,
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}
