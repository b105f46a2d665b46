use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

mod memory;
mod mtproto;

pub use memory::{ChunkRequest, InMemoryTelegram};
pub use mtproto::GrammersConnection;

/// Byte-range stride for `upload.getFile`.
pub const DOWNLOAD_CHUNK_SIZE: i32 = 512 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerHandle {
    User { id: i64, access_hash: i64 },
    Channel { id: i64, access_hash: i64 },
}

impl PeerHandle {
    pub fn kind(&self) -> &'static str {
        match self {
            PeerHandle::User { .. } => "user",
            PeerHandle::Channel { .. } => "channel",
        }
    }

    pub fn id(&self) -> i64 {
        match *self {
            PeerHandle::User { id, .. } | PeerHandle::Channel { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEntry {
    User { id: i64, access_hash: Option<i64> },
    Empty { id: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEntry {
    Channel { id: i64, access_hash: Option<i64> },
    /// Basic groups and forbidden/empty chats; not addressable for history here.
    Other { id: i64 },
}

/// `contacts.resolveUsername` result: users first, then chats, as delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedUsername {
    pub users: Vec<UserEntry>,
    pub chats: Vec<ChatEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryMessage {
    Message {
        id: i32,
        media: Option<MessageMedia>,
    },
    Service {
        id: i32,
    },
    Empty {
        id: i32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageMedia {
    /// `None` when the server sent an empty document.
    Document(Option<Document>),
    Photo,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: i64,
    pub access_hash: i64,
    pub file_reference: Vec<u8>,
    pub size: i64,
    pub mime_type: String,
    pub attributes: Vec<DocumentAttribute>,
}

impl Document {
    pub fn location(&self) -> DocumentLocation {
        DocumentLocation {
            id: self.id,
            access_hash: self.access_hash,
            file_reference: self.file_reference.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentAttribute {
    Filename(String),
    Audio {
        title: Option<String>,
        performer: Option<String>,
        duration_secs: i32,
    },
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentLocation {
    pub id: i64,
    pub access_hash: i64,
    pub file_reference: Vec<u8>,
}

pub enum SignIn<P> {
    Authorized,
    PasswordRequired(P),
}

/// The subset of the MTProto client this tool drives. Implementations must only
/// be usable while connected.
pub trait TelegramApi: Send + Sync {
    type LoginToken: Send + Sync;
    type PasswordToken: Send + Sync;

    fn is_authorized(&self) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>>;

    fn request_login_code<'a>(
        &'a self,
        phone: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Self::LoginToken>> + Send + 'a>>;

    fn sign_in<'a>(
        &'a self,
        token: &'a Self::LoginToken,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<SignIn<Self::PasswordToken>>> + Send + 'a>>;

    fn check_password<'a>(
        &'a self,
        token: Self::PasswordToken,
        password: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    fn resolve_username<'a>(
        &'a self,
        username: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ResolvedUsername>> + Send + 'a>>;

    fn get_history<'a>(
        &'a self,
        peer: &'a PeerHandle,
        limit: i32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<HistoryMessage>>> + Send + 'a>>;

    fn get_file_chunk<'a>(
        &'a self,
        location: &'a DocumentLocation,
        offset: i64,
        limit: i32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>>;
}

/// Races `fut` against `cancel`, returning [`Error::Cancelled`] if the token fires first.
pub async fn cancellable<T>(
    cancel: Option<&CancellationToken>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    let Some(cancel) = cancel else {
        return fut.await;
    };
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = fut => res,
    }
}
