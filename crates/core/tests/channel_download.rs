use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use social_content_dl_core::{
    ChannelDownload, ChatEntry, DOWNLOAD_CHUNK_SIZE, Document, DocumentAttribute,
    DocumentLocation, DownloadOptions, Error, HistoryMessage, InMemoryTelegram, MessageMedia,
    PeerHandle, ResolvedUsername, Result, ScriptedPrompt, SignIn, TelegramApi,
    authenticate_and_download, download_channel_media, download_channel_media_with,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const CHUNK: usize = DOWNLOAD_CHUNK_SIZE as usize;
const CHANNEL: &str = "musicchannel";

fn channel_lookup() -> ResolvedUsername {
    ResolvedUsername {
        users: vec![],
        chats: vec![ChatEntry::Channel {
            id: 1001,
            access_hash: Some(77),
        }],
    }
}

fn doc_message(message_id: i32, doc_id: i64, name: Option<&str>, size: usize) -> HistoryMessage {
    let attributes = name
        .map(|n| vec![DocumentAttribute::Filename(n.to_string())])
        .unwrap_or_default();
    HistoryMessage::Message {
        id: message_id,
        media: Some(MessageMedia::Document(Some(Document {
            id: doc_id,
            access_hash: doc_id * 3,
            file_reference: vec![0xAB],
            size: size as i64,
            mime_type: "audio/mpeg".to_string(),
            attributes,
        }))),
    }
}

fn photo_message(message_id: i32) -> HistoryMessage {
    HistoryMessage::Message {
        id: message_id,
        media: Some(MessageMedia::Photo),
    }
}

fn content(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

fn request(dir: &TempDir, limit: i32) -> ChannelDownload {
    ChannelDownload {
        channel: format!("@{CHANNEL}"),
        limit,
        target_dir: dir.path().join("downloads"),
    }
}

/// Serves the whole history whatever limit is asked for.
struct IgnoresHistoryLimit<'a> {
    inner: &'a InMemoryTelegram,
}

impl TelegramApi for IgnoresHistoryLimit<'_> {
    type LoginToken = <InMemoryTelegram as TelegramApi>::LoginToken;
    type PasswordToken = <InMemoryTelegram as TelegramApi>::PasswordToken;

    fn is_authorized(&self) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        self.inner.is_authorized()
    }

    fn request_login_code<'b>(
        &'b self,
        phone: &'b str,
    ) -> Pin<Box<dyn Future<Output = Result<Self::LoginToken>> + Send + 'b>> {
        self.inner.request_login_code(phone)
    }

    fn sign_in<'b>(
        &'b self,
        token: &'b Self::LoginToken,
        code: &'b str,
    ) -> Pin<Box<dyn Future<Output = Result<SignIn<Self::PasswordToken>>> + Send + 'b>> {
        self.inner.sign_in(token, code)
    }

    fn check_password<'b>(
        &'b self,
        token: Self::PasswordToken,
        password: &'b str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'b>> {
        self.inner.check_password(token, password)
    }

    fn resolve_username<'b>(
        &'b self,
        username: &'b str,
    ) -> Pin<Box<dyn Future<Output = Result<ResolvedUsername>> + Send + 'b>> {
        self.inner.resolve_username(username)
    }

    fn get_history<'b>(
        &'b self,
        peer: &'b PeerHandle,
        _limit: i32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<HistoryMessage>>> + Send + 'b>> {
        self.inner.get_history(peer, 0)
    }

    fn get_file_chunk<'b>(
        &'b self,
        location: &'b DocumentLocation,
        offset: i64,
        limit: i32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'b>> {
        self.inner.get_file_chunk(location, offset, limit)
    }
}

#[tokio::test]
async fn downloads_documents_and_skips_photos() {
    let dir = TempDir::new().unwrap();
    let a = content(1500, 1);
    let b = content(CHUNK + 10, 2);
    let api = InMemoryTelegram::new()
        .with_username(CHANNEL, channel_lookup())
        .with_history(vec![
            doc_message(3, 30, Some("song_a.mp3"), a.len()),
            photo_message(2),
            doc_message(1, 10, Some("song_b.mp3"), b.len()),
        ])
        .with_file(30, a.clone())
        .with_file(10, b.clone());

    let req = request(&dir, 10);
    let result = download_channel_media(&api, &req).await.unwrap();

    assert_eq!(result.documents_found, 2);
    assert_eq!(result.downloaded, 2);
    assert_eq!(result.succeeded(), 2);
    assert_eq!(result.failed, 0);
    assert_eq!(result.bytes_written, (a.len() + b.len()) as u64);

    assert_eq!(std::fs::read(req.target_dir.join("song_a.mp3")).unwrap(), a);
    assert_eq!(std::fs::read(req.target_dir.join("song_b.mp3")).unwrap(), b);
    assert_eq!(std::fs::read_dir(&req.target_dir).unwrap().count(), 2);

    assert_eq!(
        api.history_requests(),
        vec![(
            PeerHandle::Channel {
                id: 1001,
                access_hash: 77
            },
            10
        )]
    );
}

#[tokio::test]
async fn existing_file_is_left_untouched() {
    let dir = TempDir::new().unwrap();
    let req = request(&dir, 0);
    std::fs::create_dir_all(&req.target_dir).unwrap();
    std::fs::write(req.target_dir.join("kept.mp3"), b"local copy").unwrap();

    let api = InMemoryTelegram::new()
        .with_username(CHANNEL, channel_lookup())
        .with_history(vec![doc_message(5, 50, Some("kept.mp3"), 4096)])
        .with_file(50, content(4096, 9));

    let result = download_channel_media(&api, &req).await.unwrap();

    assert_eq!(result.skipped_existing, 1);
    assert_eq!(result.downloaded, 0);
    assert_eq!(result.succeeded(), 1);
    assert!(api.chunk_requests().is_empty());
    assert_eq!(
        std::fs::read(req.target_dir.join("kept.mp3")).unwrap(),
        b"local copy"
    );
}

#[tokio::test]
async fn rerun_downloads_nothing_new() {
    let dir = TempDir::new().unwrap();
    let api = InMemoryTelegram::new()
        .with_username(CHANNEL, channel_lookup())
        .with_history(vec![doc_message(1, 10, Some("a.bin"), 64)])
        .with_file(10, content(64, 3));
    let req = request(&dir, 0);

    let first = download_channel_media(&api, &req).await.unwrap();
    let second = download_channel_media(&api, &req).await.unwrap();

    assert_eq!(first.downloaded, 1);
    assert_eq!(second.downloaded, 0);
    assert_eq!(second.skipped_existing, 1);
    assert_eq!(api.chunk_requests_for(10).len(), 1);
}

#[tokio::test]
async fn chunk_requests_step_through_declared_size() {
    let dir = TempDir::new().unwrap();
    let size = 2 * CHUNK + 100;
    let bytes = content(size, 4);
    let api = InMemoryTelegram::new()
        .with_username(CHANNEL, channel_lookup())
        .with_history(vec![doc_message(1, 10, Some("big.flac"), size)])
        .with_file(10, bytes.clone());
    let req = request(&dir, 0);

    download_channel_media(&api, &req).await.unwrap();

    let requests = api.chunk_requests_for(10);
    let offsets: Vec<i64> = requests.iter().map(|r| r.offset).collect();
    assert_eq!(offsets, [0, CHUNK as i64, 2 * CHUNK as i64]);
    assert!(requests.iter().all(|r| r.limit == DOWNLOAD_CHUNK_SIZE));
    assert_eq!(std::fs::read(req.target_dir.join("big.flac")).unwrap(), bytes);
}

#[tokio::test]
async fn exact_multiple_of_chunk_size_needs_no_extra_request() {
    let dir = TempDir::new().unwrap();
    let size = 2 * CHUNK;
    let api = InMemoryTelegram::new()
        .with_username(CHANNEL, channel_lookup())
        .with_history(vec![doc_message(1, 10, Some("even.bin"), size)])
        .with_file(10, content(size, 5));
    let req = request(&dir, 0);

    download_channel_media(&api, &req).await.unwrap();

    assert_eq!(api.chunk_requests_for(10).len(), 2);
    let written = std::fs::metadata(req.target_dir.join("even.bin")).unwrap();
    assert_eq!(written.len(), size as u64);
}

#[tokio::test]
async fn short_chunk_ends_transfer_early() {
    let dir = TempDir::new().unwrap();
    let actual = content(CHUNK + 10, 6);
    let api = InMemoryTelegram::new()
        .with_username(CHANNEL, channel_lookup())
        .with_history(vec![doc_message(1, 10, Some("short.bin"), 3 * CHUNK)])
        .with_file(10, actual.clone());
    let req = request(&dir, 0);

    let result = download_channel_media(&api, &req).await.unwrap();

    assert_eq!(api.chunk_requests_for(10).len(), 2);
    assert_eq!(result.bytes_written, actual.len() as u64);
    assert_eq!(std::fs::read(req.target_dir.join("short.bin")).unwrap(), actual);
}

#[tokio::test]
async fn zero_size_document_creates_empty_file() {
    let dir = TempDir::new().unwrap();
    let api = InMemoryTelegram::new()
        .with_username(CHANNEL, channel_lookup())
        .with_history(vec![doc_message(1, 10, Some("empty.txt"), 0)]);
    let req = request(&dir, 0);

    let result = download_channel_media(&api, &req).await.unwrap();

    assert_eq!(result.downloaded, 1);
    assert!(api.chunk_requests().is_empty());
    let written = std::fs::metadata(req.target_dir.join("empty.txt")).unwrap();
    assert_eq!(written.len(), 0);
}

#[tokio::test]
async fn nameless_documents_get_distinct_fallback_names() {
    let dir = TempDir::new().unwrap();
    let api = InMemoryTelegram::new()
        .with_username(CHANNEL, channel_lookup())
        .with_history(vec![
            doc_message(41, 1, None, 8),
            doc_message(42, 2, None, 8),
        ])
        .with_file(1, content(8, 1))
        .with_file(2, content(8, 2));
    let req = request(&dir, 0);

    download_channel_media(&api, &req).await.unwrap();

    assert!(req.target_dir.join("file_41").exists());
    assert!(req.target_dir.join("file_42").exists());
}

#[tokio::test]
async fn failed_document_does_not_stop_siblings() {
    let dir = TempDir::new().unwrap();
    let good = content(2048, 8);
    let api = InMemoryTelegram::new()
        .with_username(CHANNEL, channel_lookup())
        .with_history(vec![
            doc_message(2, 20, Some("broken.mp3"), 2048),
            doc_message(1, 10, Some("fine.mp3"), 2048),
        ])
        .with_file(20, content(2048, 7))
        .with_file(10, good.clone())
        .fail_chunk(20, 0);
    let req = request(&dir, 0);

    let result = download_channel_media(&api, &req).await.unwrap();

    assert_eq!(result.failed, 1);
    assert_eq!(result.downloaded, 1);
    assert_eq!(std::fs::read(req.target_dir.join("fine.mp3")).unwrap(), good);
}

#[tokio::test]
async fn limit_counts_successes_not_attempts() {
    let dir = TempDir::new().unwrap();
    let inner = InMemoryTelegram::new()
        .with_username(CHANNEL, channel_lookup())
        .with_history(vec![
            doc_message(4, 40, Some("d.mp3"), 16),
            doc_message(3, 30, Some("c.mp3"), 16),
            doc_message(2, 20, Some("b.mp3"), 16),
            doc_message(1, 10, Some("a.mp3"), 16),
        ])
        .with_file(40, content(16, 4))
        .with_file(30, content(16, 3))
        .with_file(20, content(16, 2))
        .with_file(10, content(16, 1))
        .fail_chunk(40, 0);
    let api = IgnoresHistoryLimit { inner: &inner };
    let req = request(&dir, 2);

    let result = download_channel_media(&api, &req).await.unwrap();

    assert_eq!(result.documents_found, 4);
    assert_eq!(result.failed, 1);
    assert_eq!(result.downloaded, 2);
    assert!(req.target_dir.join("c.mp3").exists());
    assert!(req.target_dir.join("b.mp3").exists());
    assert!(inner.chunk_requests_for(10).is_empty());
    assert!(!req.target_dir.join("a.mp3").exists());
}

#[tokio::test]
async fn existing_files_count_towards_limit() {
    let dir = TempDir::new().unwrap();
    let req = request(&dir, 1);
    std::fs::create_dir_all(&req.target_dir).unwrap();
    std::fs::write(req.target_dir.join("b.mp3"), b"old").unwrap();

    let inner = InMemoryTelegram::new()
        .with_username(CHANNEL, channel_lookup())
        .with_history(vec![
            doc_message(2, 20, Some("b.mp3"), 16),
            doc_message(1, 10, Some("a.mp3"), 16),
        ])
        .with_file(10, content(16, 1));
    let api = IgnoresHistoryLimit { inner: &inner };

    let result = download_channel_media(&api, &req).await.unwrap();

    assert_eq!(result.skipped_existing, 1);
    assert_eq!(result.downloaded, 0);
    assert!(inner.chunk_requests().is_empty());
}

#[tokio::test]
async fn cancellation_mid_transfer_leaves_partial_file() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let size = 3 * CHUNK;
    let api = InMemoryTelegram::new()
        .with_username(CHANNEL, channel_lookup())
        .with_history(vec![
            doc_message(2, 20, Some("partial.bin"), size),
            doc_message(1, 10, Some("never.bin"), 16),
        ])
        .with_file(20, content(size, 1))
        .with_file(10, content(16, 2))
        .cancel_on_chunk(20, 1, cancel.clone());
    let req = request(&dir, 0);

    let err = download_channel_media_with(
        &api,
        &req,
        DownloadOptions {
            cancel: Some(&cancel),
        },
    )
    .await
    .unwrap_err();

    assert!(err.is_cancelled(), "{err:?}");
    let partial = std::fs::metadata(req.target_dir.join("partial.bin")).unwrap();
    assert!(partial.len() < size as u64);
    assert_eq!(partial.len(), CHUNK as u64);
    assert!(!req.target_dir.join("never.bin").exists());
}

#[tokio::test]
async fn history_failure_aborts_run() {
    let dir = TempDir::new().unwrap();
    let api = InMemoryTelegram::new()
        .with_username(CHANNEL, channel_lookup())
        .with_history_error("CHANNEL_PRIVATE");
    let req = request(&dir, 5);

    let err = download_channel_media(&api, &req).await.unwrap_err();

    assert!(matches!(err, Error::History { .. }), "{err:?}");
    assert!(err.to_string().starts_with("failed to get messages"));
    assert!(api.chunk_requests().is_empty());
}

#[tokio::test]
async fn unknown_channel_aborts_before_history() {
    let dir = TempDir::new().unwrap();
    let api = InMemoryTelegram::new();
    let req = request(&dir, 5);

    let err = download_channel_media(&api, &req).await.unwrap_err();

    assert!(matches!(err, Error::Resolve { .. }), "{err:?}");
    assert!(api.history_requests().is_empty());
}

#[tokio::test]
async fn login_with_second_factor_then_download() {
    let dir = TempDir::new().unwrap();
    let api = InMemoryTelegram::unauthorized("12345", Some("hunter2"))
        .with_username(CHANNEL, channel_lookup())
        .with_history(vec![doc_message(1, 10, Some("a.mp3"), 32)])
        .with_file(10, content(32, 1));
    let prompt = Arc::new(ScriptedPrompt::new(["hunter2"], ["12345"]));
    let req = request(&dir, 0);

    let result = authenticate_and_download(
        &api,
        "+15550100",
        prompt.clone(),
        &req,
        DownloadOptions::default(),
    )
    .await
    .unwrap();

    assert!(api.is_authorized_now());
    assert_eq!(prompt.remaining(), (0, 0));
    assert_eq!(result.downloaded, 1);
}

#[tokio::test]
async fn wrong_second_factor_stops_before_resolving() {
    let dir = TempDir::new().unwrap();
    let api = InMemoryTelegram::unauthorized("12345", Some("hunter2"))
        .with_username(CHANNEL, channel_lookup())
        .with_history(vec![doc_message(1, 10, Some("a.mp3"), 32)]);
    let prompt = Arc::new(ScriptedPrompt::new(["letmein"], ["12345"]));
    let req = request(&dir, 0);

    let err = authenticate_and_download(
        &api,
        "+15550100",
        prompt.clone(),
        &req,
        DownloadOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::InvalidPassword), "{err:?}");
    assert!(!api.is_authorized_now());
    assert!(api.history_requests().is_empty());
}

#[tokio::test]
async fn authorized_session_skips_prompts() {
    let dir = TempDir::new().unwrap();
    let api = InMemoryTelegram::new()
        .with_username(CHANNEL, channel_lookup())
        .with_history(vec![]);
    let prompt = Arc::new(ScriptedPrompt::new(Vec::<String>::new(), Vec::<String>::new()));
    let req = request(&dir, 0);

    let result = authenticate_and_download(
        &api,
        "+15550100",
        prompt.clone(),
        &req,
        DownloadOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(result.documents_found, 0);
    assert_eq!(
        api.login_codes_requested
            .load(std::sync::atomic::Ordering::Relaxed),
        0
    );
    assert!(req.target_dir.is_dir());
}

#[tokio::test]
async fn unusable_download_dir_is_a_download_error() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("downloads");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let api = InMemoryTelegram::new().with_username(CHANNEL, channel_lookup());
    let req = request(&dir, 0);

    let err = download_channel_media(&api, &req).await.unwrap_err();

    assert!(matches!(err, Error::Download { .. }), "{err:?}");
    assert!(err.to_string().contains("failed to create download directory"));
    assert!(api.history_requests().is_empty());
}
