use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::telegram::{
    DocumentAttribute, DocumentLocation, HistoryMessage, MessageMedia, PeerHandle, TelegramApi,
    cancellable,
};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescriptor {
    pub message_id: i32,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub location: DocumentLocation,
}

/// One `messages.getHistory` call; returns a descriptor for every document message, in
/// delivery order. `limit == 0` leaves the page size to the server.
pub async fn fetch_recent_media<A: TelegramApi>(
    api: &A,
    peer: &PeerHandle,
    limit: i32,
    cancel: Option<&CancellationToken>,
) -> Result<Vec<MediaDescriptor>> {
    let messages = cancellable(cancel, api.get_history(peer, limit))
        .await
        .map_err(|e| match e {
            Error::Cancelled | Error::History { .. } => e,
            other => Error::History {
                message: other.to_string(),
            },
        })?;

    let total = messages.len();
    let media: Vec<MediaDescriptor> = messages.iter().filter_map(describe_message).collect();
    info!(
        event = "history.scan",
        peer = peer.id(),
        messages = total,
        documents = media.len(),
        "scanned channel history"
    );
    Ok(media)
}

/// `None` for anything that is not a message carrying a document.
pub fn describe_message(message: &HistoryMessage) -> Option<MediaDescriptor> {
    let HistoryMessage::Message { id, media } = message else {
        return None;
    };
    let document = match media.as_ref()? {
        MessageMedia::Document(Some(document)) => document,
        MessageMedia::Document(None) => return None,
        other => {
            debug!(event = "history.skip", message_id = id, media = ?other, "not a document");
            return None;
        }
    };

    let declared = document.attributes.iter().find_map(|attr| match attr {
        DocumentAttribute::Filename(name) => Some(name.as_str()),
        _ => None,
    });

    Some(MediaDescriptor {
        message_id: *id,
        file_name: local_file_name(declared, *id),
        file_size: document.size,
        mime_type: (!document.mime_type.is_empty()).then(|| document.mime_type.clone()),
        location: document.location(),
    })
}

pub fn fallback_file_name(message_id: i32) -> String {
    format!("file_{message_id}")
}

/// Keeps the declared name usable as a single path component inside the download dir.
fn local_file_name(declared: Option<&str>, message_id: i32) -> String {
    let Some(name) = declared else {
        return fallback_file_name(message_id);
    };
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => fallback_file_name(message_id),
        _ => cleaned,
    }
}
