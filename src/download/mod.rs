use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Errors terminal to a download. Unlike registry lookups these propagate
/// to the caller; a failed transfer is not an "absence" signal.
#[derive(Debug)]
pub enum DownloadError {
    Request(reqwest::Error),
    Status(reqwest::StatusCode),
    Io(std::io::Error),
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DownloadError::Request(e) => write!(f, "request failed: {}", e),
            DownloadError::Status(code) => write!(f, "server returned {}", code),
            DownloadError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl Error for DownloadError {}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        DownloadError::Request(err)
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(err: std::io::Error) -> Self {
        DownloadError::Io(err)
    }
}

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Temporary path beside `dest`: same directory so the final rename stays
/// on one filesystem and is atomic, uniquely suffixed so racing downloads
/// never clobber each other's partial data.
fn temp_download_path(dest: &Path) -> PathBuf {
    let filename = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    dest.with_file_name(format!(
        ".{}.{}-{}.part",
        filename,
        std::process::id(),
        seq
    ))
}

/// Streams `url` to `dest` in chunks through a temporary file, renaming it
/// into place only once the whole body has arrived. On any mid-stream
/// failure the temporary file is removed; nothing partial ever sits at
/// `dest`. There is no resume: a retry restarts from zero.
pub async fn fetch(url: &str, dest: &Path, show_progress: bool) -> Result<(), DownloadError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // Deliberately no overall timeout: large transfers run as long as they
    // need, and chunked reads keep partial progress observable.
    let client = reqwest::Client::new();
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(DownloadError::Status(response.status()));
    }

    let total = response.content_length();
    let bar = match (show_progress, total) {
        (true, Some(total)) => {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::with_template(
                    "{bar:40.cyan/blue} {percent}% ({bytes}/{total_bytes}, {bytes_per_sec})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            Some(bar)
        }
        // Without a Content-Length there is no percentage to report.
        _ => None,
    };

    let temp = temp_download_path(dest);
    let result = stream_to_file(response, &temp, bar.as_ref()).await;

    if let Err(e) = result {
        if let Some(bar) = bar {
            bar.abandon();
        }
        remove_quietly(&temp).await;
        return Err(e);
    }

    if let Err(e) = tokio::fs::rename(&temp, dest).await {
        warn!("failed to move download into place: {}", e);
        remove_quietly(&temp).await;
        return Err(DownloadError::Io(e));
    }

    if let Some(bar) = bar {
        bar.finish();
    }
    info!("downloaded {} to {}", url, dest.display());
    Ok(())
}

async fn stream_to_file(
    response: reqwest::Response,
    temp: &Path,
    bar: Option<&ProgressBar>,
) -> Result<(), DownloadError> {
    let mut file = File::create(temp).await?;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        if let Some(bar) = bar {
            bar.inc(chunk.len() as u64);
        }
    }

    file.flush().await?;
    Ok(())
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("failed to remove partial download {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_path_sits_beside_destination() {
        let temp = temp_download_path(Path::new("/models/ns/name/model.gguf"));
        assert_eq!(temp.parent(), Some(Path::new("/models/ns/name")));
        let name = temp.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".model.gguf."));
        assert!(name.ends_with(".part"));
    }

    #[test]
    fn temp_paths_are_unique_per_call() {
        let dest = Path::new("/models/model.gguf");
        assert_ne!(temp_download_path(dest), temp_download_path(dest));
    }
}
