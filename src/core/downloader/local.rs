use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::core::error::{LoaderError, LoaderResult};

/// Read a bundle from the local source, waiting for the file to appear.
///
/// Retries every `poll_interval` while the file is missing. Without a
/// `timeout` the wait only ends when the caller drops the future.
pub async fn open_local_bundle(
    path: &Path,
    poll_interval: Duration,
    timeout: Option<Duration>,
) -> LoaderResult<Vec<u8>> {
    let started = Instant::now();
    let mut logged = false;

    loop {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                debug!("Opened local bundle {:?} ({} bytes)", path, bytes.len());
                return Ok(bytes);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if timeout.is_some_and(|limit| started.elapsed() >= limit) {
                    return Err(LoaderError::NotFound(path.display().to_string()));
                }
                if !logged {
                    debug!("Waiting for local bundle {:?}", path);
                    logged = true;
                }
                tokio::time::sleep(poll_interval).await;
            }
            Err(source) => {
                return Err(LoaderError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }
}
