use std::path::Path;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;

/// Append `line` plus a newline to `path`, creating the file if needed.
///
/// The write is a single `write_all` on a freshly opened append handle; callers
/// that share a file between tasks must still serialize calls themselves.
pub async fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open for append: {}", path.display()))?;

    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');
    file.write_all(buf.as_bytes())
        .await
        .with_context(|| format!("Failed to append to {}", path.display()))?;
    file.flush().await?;
    Ok(())
}

/// Read `path` as trimmed lines, skipping blank ones.
///
/// Returns `Ok(None)` if the file does not exist.
pub async fn read_nonblank_lines(path: &Path) -> Result<Option<Vec<String>>> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(anyhow::Error::new(e))
                .with_context(|| format!("Failed to read {}", path.display()))
        }
    };

    Ok(Some(
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect(),
    ))
}
