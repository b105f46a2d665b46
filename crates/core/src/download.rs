use std::path::Path;

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::history::MediaDescriptor;
use crate::telegram::{DOWNLOAD_CHUNK_SIZE, TelegramApi, cancellable};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded { bytes: u64 },
    AlreadyExists,
}

/// Streams one document into `target_dir`. An existing file with the same name is left
/// untouched; an interrupted transfer leaves a partial file behind.
pub async fn download_document<A: TelegramApi>(
    api: &A,
    descriptor: &MediaDescriptor,
    target_dir: &Path,
    cancel: Option<&CancellationToken>,
) -> Result<DownloadOutcome> {
    let path = target_dir.join(&descriptor.file_name);

    if tokio::fs::try_exists(&path).await? {
        info!(
            event = "download.skip",
            file = %descriptor.file_name,
            "File already exists: {}",
            descriptor.file_name
        );
        return Ok(DownloadOutcome::AlreadyExists);
    }

    info!(
        event = "download.start",
        file = %descriptor.file_name,
        size = descriptor.file_size,
        "Downloading: {} ({})",
        descriptor.file_name,
        format_file_size(descriptor.file_size)
    );

    let mut out = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await
        .map_err(|e| Error::Download {
            message: format!("failed to create file {}: {e}", path.display()),
        })?;

    let stride = i64::from(DOWNLOAD_CHUNK_SIZE);
    let mut offset: i64 = 0;

    while offset < descriptor.file_size {
        let chunk = cancellable(
            cancel,
            api.get_file_chunk(&descriptor.location, offset, DOWNLOAD_CHUNK_SIZE),
        )
        .await;
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                if let Err(flush_err) = out.flush().await {
                    debug!(
                        event = "download.flush_failed",
                        file = %descriptor.file_name,
                        error = %flush_err,
                        "partial file not flushed"
                    );
                }
                return Err(e);
            }
        };

        out.write_all(&chunk).await.map_err(|e| Error::Download {
            message: format!("failed to write chunk: {e}"),
        })?;

        let len = chunk.len() as i64;
        offset += len;
        if len < stride {
            break;
        }
    }

    out.flush().await.map_err(|e| Error::Download {
        message: format!("failed to write chunk: {e}"),
    })?;

    info!(
        event = "download.finish",
        file = %descriptor.file_name,
        bytes = offset,
        "Successfully downloaded: {}",
        descriptor.file_name
    );
    Ok(DownloadOutcome::Downloaded {
        bytes: offset as u64,
    })
}

/// Human-readable size with 1024-based units.
pub fn format_file_size(size: i64) -> String {
    const KIB: i64 = 1024;
    const MIB: i64 = 1024 * 1024;

    if size < KIB {
        format!("{size} B")
    } else if size < MIB {
        format!("{:.1} KB", size as f64 / KIB as f64)
    } else {
        format!("{:.1} MB", size as f64 / MIB as f64)
    }
}
