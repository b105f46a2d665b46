use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::authenticate;
use crate::config::RunConfig;
use crate::download::{DownloadOutcome, download_document};
use crate::history::fetch_recent_media;
use crate::prompt::Prompt;
use crate::resolve::resolve_peer;
use crate::telegram::{GrammersConnection, TelegramApi};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct ChannelDownload {
    pub channel: String,
    /// Upper bound on history size and on successful downloads; `0` means no cap.
    pub limit: i32,
    pub target_dir: PathBuf,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelDownloadResult {
    pub documents_found: u64,
    pub downloaded: u64,
    pub skipped_existing: u64,
    pub failed: u64,
    pub bytes_written: u64,
}

impl ChannelDownloadResult {
    /// Downloads plus already-present files; what the limit is counted against.
    pub fn succeeded(&self) -> u64 {
        self.downloaded + self.skipped_existing
    }
}

#[derive(Default)]
pub struct DownloadOptions<'a> {
    pub cancel: Option<&'a CancellationToken>,
}

pub async fn download_channel_media<A: TelegramApi>(
    api: &A,
    request: &ChannelDownload,
) -> Result<ChannelDownloadResult> {
    download_channel_media_with(api, request, DownloadOptions::default()).await
}

/// Resolve, scan once, then download sequentially. Per-document failures are logged and
/// skipped; everything else aborts the run.
pub async fn download_channel_media_with<A: TelegramApi>(
    api: &A,
    request: &ChannelDownload,
    options: DownloadOptions<'_>,
) -> Result<ChannelDownloadResult> {
    info!(
        event = "run.start",
        channel = %request.channel,
        limit = request.limit,
        "Starting download from channel: @{}",
        request.channel.trim_start_matches('@')
    );

    tokio::fs::create_dir_all(&request.target_dir)
        .await
        .map_err(|e| Error::Download {
            message: format!(
                "failed to create download directory {}: {e}",
                request.target_dir.display()
            ),
        })?;

    let peer = resolve_peer(api, &request.channel, options.cancel).await?;
    let media = fetch_recent_media(api, &peer, request.limit, options.cancel).await?;

    let mut result = ChannelDownloadResult {
        documents_found: media.len() as u64,
        ..ChannelDownloadResult::default()
    };

    for descriptor in &media {
        match download_document(api, descriptor, &request.target_dir, options.cancel).await {
            Ok(DownloadOutcome::Downloaded { bytes }) => {
                result.downloaded += 1;
                result.bytes_written += bytes;
            }
            Ok(DownloadOutcome::AlreadyExists) => result.skipped_existing += 1,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                result.failed += 1;
                warn!(
                    event = "download.failed",
                    message_id = descriptor.message_id,
                    file = %descriptor.file_name,
                    error = %e,
                    "Error processing message: {e}"
                );
            }
        }

        if request.limit > 0 && result.succeeded() >= request.limit as u64 {
            break;
        }
    }

    info!(
        event = "run.finish",
        downloaded = result.downloaded,
        skipped_existing = result.skipped_existing,
        failed = result.failed,
        bytes = result.bytes_written,
        "Downloaded {} audio files",
        result.succeeded()
    );
    Ok(result)
}

/// Login (if needed) followed by the channel download, all on one connection.
pub async fn authenticate_and_download<A: TelegramApi>(
    api: &A,
    phone: &str,
    prompt: Arc<dyn Prompt>,
    request: &ChannelDownload,
    options: DownloadOptions<'_>,
) -> Result<ChannelDownloadResult> {
    authenticate(api, phone, prompt, options.cancel).await?;
    download_channel_media_with(api, request, options).await
}

/// Entry point for a real run: connects, does the work inside the connection scope and
/// always tears the connection down afterwards.
pub async fn run_telegram_download(
    config: &RunConfig,
    channel: &str,
    limit: i32,
    prompt: Arc<dyn Prompt>,
    cancel: Option<&CancellationToken>,
) -> Result<ChannelDownloadResult> {
    let phone = config.require_phone_number()?;
    let request = ChannelDownload {
        channel: channel.to_string(),
        limit,
        target_dir: config.download_path.clone(),
    };

    let conn = GrammersConnection::connect(config, cancel).await?;
    let res =
        authenticate_and_download(&conn, phone, prompt, &request, DownloadOptions { cancel }).await;

    if let Err(e) = conn.close().await {
        warn!(event = "telegram.close_failed", error = %e, "failed to persist session");
    }
    res
}
