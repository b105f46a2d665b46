mod auth;
mod config;
mod download;
mod error;
mod history;
mod logging;
mod prompt;
mod resolve;
mod run;
mod telegram;

pub const APP_NAME: &str = "social-content-dl";

pub use auth::{AuthOutcome, AuthState, TWO_FACTOR_HINT, authenticate};
pub use config::{
    DEFAULT_APP_HASH, DEFAULT_APP_ID, DEFAULT_DOWNLOAD_PATH, DEFAULT_SESSION_FILE, ENV_APP_HASH,
    ENV_APP_ID, ENV_DOWNLOAD_PATH, ENV_PHONE, ENV_PHONE_FALLBACK, ENV_SESSION_FILE, RunConfig,
    load_config, load_config_from,
};
pub use download::{DownloadOutcome, download_document, format_file_size};
pub use error::{Error, Result};
pub use history::{MediaDescriptor, describe_message, fallback_file_name, fetch_recent_media};
pub use logging::{LOG_ENV, LogFormat, init_logging};
pub use prompt::{Prompt, ScriptedPrompt, TerminalPrompt};
pub use resolve::{peer_from_resolved, resolve_peer};
pub use run::{
    ChannelDownload, ChannelDownloadResult, DownloadOptions, authenticate_and_download,
    download_channel_media, download_channel_media_with, run_telegram_download,
};
pub use telegram::{
    ChatEntry, ChunkRequest, DOWNLOAD_CHUNK_SIZE, Document, DocumentAttribute, DocumentLocation,
    GrammersConnection, HistoryMessage, InMemoryTelegram, MessageMedia, PeerHandle,
    ResolvedUsername, SignIn, TelegramApi, UserEntry, cancellable,
};
