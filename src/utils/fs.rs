//! Filesystem helpers shared across subsystems
//!
//! All durable writes go through the temp-file-then-rename pattern so a
//! crash mid-write can never leave a torn file behind.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Write bytes to `path` atomically via a sibling temp file and rename.
///
/// The parent directory is created if missing. The rename is atomic at the
/// OS level, so readers observe either the old content or the new content,
/// never a partial write.
pub async fn atomic_write(path: &Path, content: Vec<u8>) -> Result<()> {
    let path = path.to_path_buf();

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    tokio::task::spawn_blocking(move || -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Path has no parent directory"))?;
        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(&content)?;
        temp.persist(&path)
            .map_err(|e| anyhow::anyhow!("Failed to persist {}: {}", path.display(), e.error))?;
        Ok(())
    })
    .await
    .context("Atomic write task panicked")?
}

/// Create a symlink alias from `link` to `target`, falling back to a
/// recursive directory copy on platforms or filesystems without symlink
/// support.
///
/// Returns true when a symlink was created, false when the copy fallback ran.
pub async fn symlink_or_copy_dir(target: &Path, link: &Path) -> Result<bool> {
    if tokio::fs::try_exists(link).await.unwrap_or(false) {
        return Ok(true);
    }

    if let Some(parent) = link.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    #[cfg(unix)]
    {
        match tokio::fs::symlink(target, link).await {
            Ok(()) => return Ok(true),
            Err(e) => {
                log::debug!(
                    "Symlink {} -> {} failed ({e}), falling back to copy",
                    link.display(),
                    target.display()
                );
            }
        }
    }

    copy_dir_recursive(target, link).await?;
    Ok(false)
}

/// Recursively copy a directory tree.
async fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    let mut pending = vec![(src.to_path_buf(), dst.to_path_buf())];

    while let Some((from, to)) = pending.pop() {
        tokio::fs::create_dir_all(&to).await?;
        let mut entries = tokio::fs::read_dir(&from)
            .await
            .with_context(|| format!("Failed to read directory {}", from.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let from_path = entry.path();
            let to_path = to.join(entry.file_name());
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push((from_path, to_path));
            } else {
                tokio::fs::copy(&from_path, &to_path).await.with_context(|| {
                    format!("Failed to copy {} to {}", from_path.display(), to_path.display())
                })?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn atomic_write_creates_parents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a/b/c.txt");

        atomic_write(&path, b"hello".to_vec()).await.expect("write");

        let content = tokio::fs::read(&path).await.expect("read back");
        assert_eq!(content, b"hello");
    }

    #[tokio::test]
    async fn atomic_write_replaces_existing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("file.json");

        atomic_write(&path, b"old".to_vec()).await.expect("first write");
        atomic_write(&path, b"new".to_vec()).await.expect("second write");

        let content = tokio::fs::read(&path).await.expect("read back");
        assert_eq!(content, b"new");
    }
}
