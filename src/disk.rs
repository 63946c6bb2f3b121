//! Space accounting for the filesystem that holds the served root.

use std::io;
use std::path::{Path, PathBuf};

use crate::storage::StorageError;

const UNIT: u64 = 1024;
const PREFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiskUsage {
    pub used: u64,
    pub total: u64,
}

impl DiskUsage {
    pub fn used_display(&self) -> String {
        human_readable_bytes(self.used)
    }

    pub fn total_display(&self) -> String {
        human_readable_bytes(self.total)
    }
}

/// Queries statvfs on the blocking pool; used space counts blocks that are not free.
pub async fn disk_usage(root: &Path) -> Result<DiskUsage, StorageError> {
    let root: PathBuf = root.to_path_buf();
    let usage = tokio::task::spawn_blocking(move || -> io::Result<DiskUsage> {
        let total = fs2::total_space(&root)?;
        let free = fs2::free_space(&root)?;
        Ok(DiskUsage {
            used: total.saturating_sub(free),
            total,
        })
    })
    .await
    .map_err(|err| io::Error::other(err.to_string()))??;
    Ok(usage)
}

/// Formats a byte count with binary prefixes: `512 B`, `1.5 KB`, `2.0 MB`.
pub fn human_readable_bytes(bytes: u64) -> String {
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.1} {}B", bytes as f64 / div as f64, PREFIXES[exp])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn formats_fixed_points() {
        assert_eq!(human_readable_bytes(0), "0 B");
        assert_eq!(human_readable_bytes(512), "512 B");
        assert_eq!(human_readable_bytes(1023), "1023 B");
        assert_eq!(human_readable_bytes(1024), "1.0 KB");
        assert_eq!(human_readable_bytes(1536), "1.5 KB");
        assert_eq!(human_readable_bytes(2 * 1024 * 1024), "2.0 MB");
        assert_eq!(human_readable_bytes(1073741824), "1.0 GB");
    }

    #[test]
    fn formats_largest_unit() {
        assert_eq!(human_readable_bytes(1 << 60), "1.0 EB");
        assert_eq!(human_readable_bytes(u64::MAX), "16.0 EB");
    }

    #[tokio::test]
    async fn reports_used_within_total() {
        let temp = tempdir().expect("tempdir");
        let usage = disk_usage(temp.path()).await.expect("disk usage");
        assert!(usage.total > 0);
        assert!(usage.used <= usage.total);
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let temp = tempdir().expect("tempdir");
        let result = disk_usage(&temp.path().join("missing")).await;
        assert!(matches!(result, Err(StorageError::Io(_))));
    }
}
