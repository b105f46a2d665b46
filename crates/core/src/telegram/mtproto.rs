use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use grammers_client::grammers_tl_types as tl;
use grammers_client::session::storages::TlSession;
use grammers_client::types::{LoginToken, PasswordToken};
use grammers_client::{Client, SignInError};
use grammers_mtsender::{SenderPool, SenderPoolHandle};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    ChatEntry, Document, DocumentAttribute, DocumentLocation, HistoryMessage, MessageMedia,
    PeerHandle, ResolvedUsername, SignIn, TelegramApi, UserEntry, cancellable,
};
use crate::config::RunConfig;
use crate::{Error, Result};

const MTPROTO_DIAL_TIMEOUT: Duration = Duration::from_secs(30);
const MTPROTO_MAX_CONNECT_ATTEMPTS: u32 = 3;
const MTPROTO_CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(5);
const RUNNER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A live MTProto connection. Only [`GrammersConnection::connect`] produces one, and every
/// RPC goes through it; teardown persists the session and stops the sender pool.
pub struct GrammersConnection {
    client: Client,
    session: Arc<TlSession>,
    session_path: PathBuf,
    app_hash: String,
    pool_handle: Option<SenderPoolHandle>,
    runner: Option<JoinHandle<()>>,
}

impl GrammersConnection {
    pub async fn connect(config: &RunConfig, cancel: Option<&CancellationToken>) -> Result<Self> {
        let session = Arc::new(load_session(&config.session_path)?);

        let pool = SenderPool::new(Arc::clone(&session), config.app_id);
        let client = Client::new(&pool);
        let SenderPool { runner, handle, .. } = pool;
        let runner = tokio::spawn(runner.run());

        let conn = Self {
            client,
            session,
            session_path: config.session_path.clone(),
            app_hash: config.app_hash.clone(),
            pool_handle: Some(handle),
            runner: Some(runner),
        };

        // Dropping `conn` on failure tears the pool down again.
        conn.probe(cancel).await?;
        info!(
            event = "telegram.connected",
            session = %conn.session_path.display(),
            "connected to telegram"
        );
        Ok(conn)
    }

    /// First round-trip, bounded by the dial timeout and retried a fixed number of times.
    async fn probe(&self, cancel: Option<&CancellationToken>) -> Result<()> {
        let mut attempt = 1;
        loop {
            let res = cancellable(cancel, async {
                timeout(MTPROTO_DIAL_TIMEOUT, self.client.is_authorized())
                    .await
                    .map_err(|_| Error::Telegram {
                        message: format!(
                            "connect timed out after {}s (check network / MTProto reachability)",
                            MTPROTO_DIAL_TIMEOUT.as_secs()
                        ),
                    })?
                    .map_err(|e| Error::Telegram {
                        message: format!("connect failed: {e}"),
                    })
            })
            .await;

            match res {
                Ok(_) => return Ok(()),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) if attempt < MTPROTO_MAX_CONNECT_ATTEMPTS => {
                    warn!(
                        event = "telegram.connect_retry",
                        attempt,
                        error = %e,
                        "connect attempt failed; retrying"
                    );
                    cancellable(cancel, async {
                        tokio::time::sleep(MTPROTO_CONNECT_RETRY_INTERVAL).await;
                        Ok(())
                    })
                    .await?;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    pub fn save_session(&self) -> Result<()> {
        write_session(&self.session_path, &self.session.save())
    }

    /// Persists the session, stops the sender pool and waits briefly for the runner.
    pub async fn close(mut self) -> Result<()> {
        let saved = self.save_session();
        if let Some(handle) = self.pool_handle.take() {
            handle.quit();
        }
        if let Some(runner) = self.runner.take()
            && timeout(RUNNER_SHUTDOWN_TIMEOUT, runner).await.is_err()
        {
            warn!(event = "telegram.runner_stuck", "sender pool did not stop in time");
        }
        debug!(event = "telegram.closed", "telegram connection closed");
        saved
    }
}

impl Drop for GrammersConnection {
    fn drop(&mut self) {
        let Some(handle) = self.pool_handle.take() else {
            return;
        };
        if let Err(e) = self.save_session() {
            warn!(event = "telegram.session_save_failed", error = %e, "session not persisted");
        }
        handle.quit();
        if let Some(runner) = self.runner.take() {
            runner.abort();
        }
    }
}

fn load_session(path: &Path) -> Result<TlSession> {
    match std::fs::read(path) {
        Ok(bytes) if !bytes.is_empty() => {
            TlSession::load(&bytes).map_err(|e| Error::InvalidConfig {
                message: format!("session load failed ({}): {e}", path.display()),
            })
        }
        Ok(_) => Ok(TlSession::new()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TlSession::new()),
        Err(e) => Err(Error::Io(e)),
    }
}

fn write_session(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn input_peer(peer: &PeerHandle) -> tl::enums::InputPeer {
    match *peer {
        PeerHandle::User { id, access_hash } => {
            tl::enums::InputPeer::User(tl::types::InputPeerUser {
                user_id: id,
                access_hash,
            })
        }
        PeerHandle::Channel { id, access_hash } => {
            tl::enums::InputPeer::Channel(tl::types::InputPeerChannel {
                channel_id: id,
                access_hash,
            })
        }
    }
}

/// Keeps every user and chat the server returned, in order; the pointed-at `peer` is ignored.
fn resolved_from_raw(raw: tl::types::contacts::ResolvedPeer) -> ResolvedUsername {
    let users = raw
        .users
        .into_iter()
        .map(|user| match user {
            tl::enums::User::User(user) => UserEntry::User {
                id: user.id,
                access_hash: user.access_hash,
            },
            tl::enums::User::Empty(empty) => UserEntry::Empty { id: empty.id },
        })
        .collect();
    let chats = raw
        .chats
        .into_iter()
        .map(|chat| match chat {
            tl::enums::Chat::Channel(channel) => ChatEntry::Channel {
                id: channel.id,
                access_hash: channel.access_hash,
            },
            tl::enums::Chat::Empty(c) => ChatEntry::Other { id: c.id },
            tl::enums::Chat::Chat(c) => ChatEntry::Other { id: c.id },
            tl::enums::Chat::Forbidden(c) => ChatEntry::Other { id: c.id },
            tl::enums::Chat::ChannelForbidden(c) => ChatEntry::Other { id: c.id },
        })
        .collect();
    ResolvedUsername { users, chats }
}

fn history_from_raw(raw: tl::enums::Message) -> HistoryMessage {
    match raw {
        tl::enums::Message::Message(m) => HistoryMessage::Message {
            id: m.id,
            media: m.media.map(media_from_raw),
        },
        tl::enums::Message::Service(m) => HistoryMessage::Service { id: m.id },
        tl::enums::Message::Empty(m) => HistoryMessage::Empty { id: m.id },
    }
}

fn media_from_raw(raw: tl::enums::MessageMedia) -> MessageMedia {
    match raw {
        tl::enums::MessageMedia::Document(m) => {
            MessageMedia::Document(m.document.and_then(|doc| match doc {
                tl::enums::Document::Document(d) => Some(Document {
                    id: d.id,
                    access_hash: d.access_hash,
                    file_reference: d.file_reference,
                    size: d.size,
                    mime_type: d.mime_type,
                    attributes: d.attributes.into_iter().map(attribute_from_raw).collect(),
                }),
                tl::enums::Document::Empty(_) => None,
            }))
        }
        tl::enums::MessageMedia::Photo(_) => MessageMedia::Photo,
        other => MessageMedia::Other(media_kind(&other)),
    }
}

/// Variant name only, e.g. `Geo` or `WebPage`.
fn media_kind(media: &tl::enums::MessageMedia) -> String {
    format!("{media:?}")
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect()
}

fn attribute_from_raw(raw: tl::enums::DocumentAttribute) -> DocumentAttribute {
    match raw {
        tl::enums::DocumentAttribute::Filename(f) => DocumentAttribute::Filename(f.file_name),
        tl::enums::DocumentAttribute::Audio(a) => DocumentAttribute::Audio {
            title: a.title,
            performer: a.performer,
            duration_secs: a.duration,
        },
        _ => DocumentAttribute::Other,
    }
}

impl TelegramApi for GrammersConnection {
    type LoginToken = LoginToken;
    type PasswordToken = PasswordToken;

    fn is_authorized(&self) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        Box::pin(async move {
            self.client.is_authorized().await.map_err(|e| Error::Auth {
                message: format!("failed to get auth status: {e}"),
            })
        })
    }

    fn request_login_code<'a>(
        &'a self,
        phone: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Self::LoginToken>> + Send + 'a>> {
        Box::pin(async move {
            self.client
                .request_login_code(phone, &self.app_hash)
                .await
                .map_err(|e| Error::Auth {
                    message: format!("send code: {e}"),
                })
        })
    }

    fn sign_in<'a>(
        &'a self,
        token: &'a Self::LoginToken,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<SignIn<Self::PasswordToken>>> + Send + 'a>> {
        Box::pin(async move {
            match self.client.sign_in(token, code).await {
                Ok(_) => {
                    self.save_session()?;
                    Ok(SignIn::Authorized)
                }
                Err(SignInError::PasswordRequired(password_token)) => {
                    Ok(SignIn::PasswordRequired(password_token))
                }
                Err(e) => Err(Error::Auth {
                    message: format!("sign in: {e}"),
                }),
            }
        })
    }

    fn check_password<'a>(
        &'a self,
        token: Self::PasswordToken,
        password: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            match self.client.check_password(token, password).await {
                Ok(_) => {
                    self.save_session()?;
                    Ok(())
                }
                Err(SignInError::InvalidPassword) => Err(Error::InvalidPassword),
                Err(e) => Err(Error::Auth {
                    message: format!("sign in with password: {e}"),
                }),
            }
        })
    }

    fn resolve_username<'a>(
        &'a self,
        username: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ResolvedUsername>> + Send + 'a>> {
        Box::pin(async move {
            let res = self
                .client
                .invoke(&tl::functions::contacts::ResolveUsername {
                    username: username.to_string(),
                    referer: None,
                })
                .await;
            match res {
                Ok(tl::enums::contacts::ResolvedPeer::Peer(raw)) => Ok(resolved_from_raw(raw)),
                Err(e) if e.is("USERNAME_NOT_OCCUPIED") => Ok(ResolvedUsername::default()),
                Err(e) => Err(Error::Resolve {
                    message: e.to_string(),
                }),
            }
        })
    }

    fn get_history<'a>(
        &'a self,
        peer: &'a PeerHandle,
        limit: i32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<HistoryMessage>>> + Send + 'a>> {
        Box::pin(async move {
            let res = self
                .client
                .invoke(&tl::functions::messages::GetHistory {
                    peer: input_peer(peer),
                    offset_id: 0,
                    offset_date: 0,
                    add_offset: 0,
                    limit,
                    max_id: 0,
                    min_id: 0,
                    hash: 0,
                })
                .await
                .map_err(|e| Error::History {
                    message: e.to_string(),
                })?;

            let messages = match res {
                tl::enums::messages::Messages::Messages(m) => m.messages,
                tl::enums::messages::Messages::Slice(m) => m.messages,
                tl::enums::messages::Messages::ChannelMessages(m) => m.messages,
                tl::enums::messages::Messages::NotModified(_) => Vec::new(),
            };
            Ok(messages.into_iter().map(history_from_raw).collect())
        })
    }

    fn get_file_chunk<'a>(
        &'a self,
        location: &'a DocumentLocation,
        offset: i64,
        limit: i32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>> {
        Box::pin(async move {
            let res = self
                .client
                .invoke(&tl::functions::upload::GetFile {
                    precise: false,
                    cdn_supported: false,
                    location: tl::enums::InputFileLocation::InputDocumentFileLocation(
                        tl::types::InputDocumentFileLocation {
                            id: location.id,
                            access_hash: location.access_hash,
                            file_reference: location.file_reference.clone(),
                            thumb_size: String::new(),
                        },
                    ),
                    offset,
                    limit,
                })
                .await
                .map_err(|e| Error::Download {
                    message: format!("failed to download chunk: {e}"),
                })?;

            match res {
                tl::enums::upload::File::File(f) => Ok(f.bytes),
                tl::enums::upload::File::CdnRedirect(_) => Err(Error::Download {
                    message: "unexpected response type (cdn redirect)".to_string(),
                }),
            }
        })
    }
}
