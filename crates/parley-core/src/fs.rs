//! Atomic file replacement.
//!
//! Every persistent write in Parley goes through [`write_atomic`]: the bytes
//! land in a uniquely named sibling temp file, are synced, and are then
//! renamed over the target. Readers see either the old or the new content,
//! never a prefix.

use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Atomically replace `path` with `content`, creating parent directories.
pub async fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    if !dir.as_os_str().is_empty() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = dir.join(format!(
        ".{}.{}.tmp",
        file_name,
        uuid::Uuid::new_v4().simple()
    ));

    let write_result = async {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(content).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        match tokio::fs::rename(&tmp_path, path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                tokio::fs::remove_file(path).await?;
                tokio::fs::rename(&tmp_path, path).await?;
            }
            Err(e) => return Err(e),
        }
        Ok::<(), std::io::Error>(())
    }
    .await;

    if let Err(e) = write_result {
        if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
            tracing::debug!(path = %tmp_path.display(), error = %cleanup, "temp file cleanup failed");
        }
        return Err(e);
    }
    Ok(())
}

/// True for the temp files [`write_atomic`] leaves behind on a crash.
pub fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') && n.ends_with(".tmp"))
}
