// Atomic file replacement and record-file naming shared by the stores.

use std::path::Path;

use tokio::io::AsyncWriteExt;

use wikitrends_common::{Result, TrendsError};

pub(crate) const RECORD_EXT: &str = ".json";

/// Write `bytes` to `path` via a temp file in the same directory, fsync, rename.
/// Readers never observe a partial file; on failure the temp file is removed.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| TrendsError::Config(format!("path has no parent: {}", path.display())))?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| TrendsError::write(dir, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{file_name}.{:016x}.tmp", rand::random::<u64>()));

    if let Err(e) = write_and_sync(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(TrendsError::write(path, e));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(TrendsError::write(path, e));
    }
    Ok(())
}

async fn write_and_sync(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// Record id for a landed record file; `None` for temp files and anything else.
pub(crate) fn record_file_id(file_name: &str) -> Option<&str> {
    if file_name.starts_with('.') {
        return None;
    }
    file_name.strip_suffix(RECORD_EXT).filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_and_foreign_files_are_not_records() {
        assert_eq!(record_file_id("20240101T000000.000000Z.json"), Some("20240101T000000.000000Z"));
        assert_eq!(record_file_id(".20240101T000000.000000Z.json.00ff.tmp"), None);
        assert_eq!(record_file_id(".hidden.json"), None);
        assert_eq!(record_file_id("notes.txt"), None);
        assert_eq!(record_file_id(".json"), None);
    }

    #[tokio::test]
    async fn atomic_write_replaces_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");

        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1, "temp files left behind: {entries:?}");
    }

    #[tokio::test]
    async fn failed_write_reports_write_error() {
        let dir = tempfile::tempdir().unwrap();
        // The "directory" is a regular file, so create_dir_all fails.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let err = write_atomic(&blocker.join("out.json"), b"data").await.unwrap_err();
        assert!(matches!(err, TrendsError::WriteError { .. }));
    }
}
