use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::telegram::{
    ChatEntry, PeerHandle, ResolvedUsername, TelegramApi, UserEntry, cancellable,
};
use crate::{Error, Result};

/// Resolves `@handle` (or `handle`) to the peer its history is read from.
pub async fn resolve_peer<A: TelegramApi>(
    api: &A,
    handle: &str,
    cancel: Option<&CancellationToken>,
) -> Result<PeerHandle> {
    let username = normalize_handle(handle)?;
    let resolved = cancellable(cancel, api.resolve_username(username))
        .await
        .map_err(|e| match e {
            Error::Cancelled | Error::Resolve { .. } => e,
            other => Error::Resolve {
                message: other.to_string(),
            },
        })?;

    let peer = peer_from_resolved(&resolved)?;
    debug!(
        event = "resolve.finish",
        handle = username,
        kind = peer.kind(),
        id = peer.id(),
        "resolved channel"
    );
    Ok(peer)
}

fn normalize_handle(handle: &str) -> Result<&str> {
    let username = handle.trim();
    let username = username.strip_prefix('@').unwrap_or(username);
    if username.is_empty() {
        return Err(Error::Resolve {
            message: "channel handle is empty".to_string(),
        });
    }
    Ok(username)
}

/// First user wins over first chat; only channel-type chats are addressable.
pub fn peer_from_resolved(resolved: &ResolvedUsername) -> Result<PeerHandle> {
    if let Some(UserEntry::User { id, access_hash }) = resolved.users.first() {
        return Ok(PeerHandle::User {
            id: *id,
            access_hash: access_hash.unwrap_or_default(),
        });
    }
    if let Some(ChatEntry::Channel { id, access_hash }) = resolved.chats.first() {
        return Ok(PeerHandle::Channel {
            id: *id,
            access_hash: access_hash.unwrap_or_default(),
        });
    }
    Err(Error::Resolve {
        message: "no input peer".to_string(),
    })
}
