use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use eyre::{Context, Result};
use tokio::{
    fs::{OpenOptions, create_dir_all, remove_dir_all},
    io::AsyncWriteExt,
};
use tracing::debug;

/// Builds `<base>/<segment>/.../<segment>/<file_name>`
pub fn result_file<S: AsRef<str>>(base: &Path, segments: &[S], file_name: &str) -> PathBuf {
    let mut path = base.to_path_buf();
    for segment in segments {
        path.push(segment.as_ref());
    }
    path.push(file_name);
    path
}

/// Same as [`result_file`], creating the directories on the way
pub async fn ensure_result_file<S: AsRef<str>>(
    base: &Path,
    segments: &[S],
    file_name: &str,
) -> Result<PathBuf> {
    let path = result_file(base, segments, file_name);
    if let Some(parent) = path.parent() {
        create_dir_all(parent)
            .await
            .context(format!("Create result dir {}", parent.display()))?;
    }
    Ok(path)
}

/// Recursively deletes a directory and creates it again, empty
pub async fn reset_dir(path: &Path) -> Result<()> {
    match remove_dir_all(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(err).context(format!("Remove {}", path.display())),
    }
    create_dir_all(path)
        .await
        .context(format!("Create {}", path.display()))
}

/// Whole numbers keep a trailing `.0`, so every stat reads as a float
pub fn format_row(x: &str, stat: f64) -> String {
    format!("{x} , {stat:?}\n")
}

/// Appends one `<x> , <stat>` row, never touching earlier rows
pub async fn append_row(path: &Path, x: &str, stat: f64) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .context(format!("Open result file {}", path.display()))?;
    file.write_all(format_row(x, stat).as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
