//! 上传暂存文件：写满后原子重命名到目标，失败时删除。

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const STAGED_MARKER: &str = ".part.";

/// 目标同目录下的隐藏暂存文件。
///
/// 未提交就被丢弃时（例如客户端中途断开导致处理器 future 被取消），
/// `Drop` 会同步删除暂存文件。
pub struct StagedFile {
    target: PathBuf,
    temp_path: PathBuf,
    file: Option<File>,
    written: u64,
    armed: bool,
}

impl StagedFile {
    /// 在目标所在目录创建暂存文件；目录不存在时返回错误。
    pub async fn create(target: &Path) -> io::Result<Self> {
        let parent = target
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid target path"))?;
        let base = target
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| "upload".into());
        let temp_path = parent.join(format!(".{base}{STAGED_MARKER}{}", Uuid::new_v4()));
        let file = File::create(&temp_path).await?;
        Ok(Self {
            target: target.to_path_buf(),
            temp_path,
            file: Some(file),
            written: 0,
            armed: true,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("staged file already closed"))?;
        file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// 放弃写入并删除暂存文件。
    pub async fn discard(mut self) {
        self.file.take();
        if fs::remove_file(&self.temp_path).await.is_ok() {
            self.armed = false;
        }
    }

    /// 刷盘后重命名覆盖目标，返回写入字节数。失败时暂存文件随 `Drop` 删除。
    pub async fn commit(mut self) -> io::Result<u64> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| io::Error::other("staged file already closed"))?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Err(err) = fs::rename(&self.temp_path, &self.target).await {
            #[cfg(windows)]
            {
                if fs::remove_file(&self.target).await.is_ok()
                    && fs::rename(&self.temp_path, &self.target).await.is_ok()
                {
                    self.armed = false;
                    return Ok(self.written);
                }
            }
            return Err(err);
        }

        self.armed = false;
        Ok(self.written)
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.armed {
            self.file.take();
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

/// 判断目录项是否为上传中的暂存文件：`.<name>.part.<uuid>`。
pub fn is_staged_name(name: &str) -> bool {
    name.starts_with('.')
        && name
            .rsplit_once(STAGED_MARKER)
            .is_some_and(|(_, id)| Uuid::parse_str(id).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entries(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().to_string())
            .collect()
    }

    #[tokio::test]
    async fn commit_replaces_target() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("report.csv");
        std::fs::write(&target, b"old contents").expect("write");

        let mut staged = StagedFile::create(&target).await.expect("create");
        staged.write_chunk(b"new").await.expect("write");
        staged.write_chunk(b"!").await.expect("write");
        assert_eq!(staged.written(), 4);
        assert_eq!(staged.commit().await.expect("commit"), 4);

        assert_eq!(std::fs::read(&target).expect("read"), b"new!");
        assert_eq!(entries(temp.path()), ["report.csv"]);
    }

    #[tokio::test]
    async fn discard_leaves_nothing_behind() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("partial.bin");

        let mut staged = StagedFile::create(&target).await.expect("create");
        staged.write_chunk(b"half").await.expect("write");
        staged.discard().await;

        assert!(entries(temp.path()).is_empty());
    }

    #[tokio::test]
    async fn dropping_uncommitted_file_removes_it() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("abandoned.bin");

        let mut staged = StagedFile::create(&target).await.expect("create");
        staged.write_chunk(b"partial").await.expect("write");
        assert_eq!(entries(temp.path()).len(), 1);
        drop(staged);

        assert!(entries(temp.path()).is_empty());
    }

    #[test]
    fn staged_names_are_recognised() {
        assert!(is_staged_name(".a.txt.part.67e55044-10b1-426f-9247-bb680e5fe0c8"));
        assert!(!is_staged_name("a.txt.part.67e55044-10b1-426f-9247-bb680e5fe0c8"));
        assert!(!is_staged_name(".notes.part.two"));
        assert!(!is_staged_name(".bashrc"));
    }

    #[tokio::test]
    async fn create_fails_for_missing_directory() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("missing").join("file.txt");
        assert!(StagedFile::create(&target).await.is_err());
    }
}
