use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio_util::sync::CancellationToken;

use super::{DocumentLocation, HistoryMessage, PeerHandle, ResolvedUsername, SignIn, TelegramApi};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRequest {
    pub document_id: i64,
    pub offset: i64,
    pub limit: i32,
}

#[derive(Debug)]
enum ChunkFault {
    Fail {
        document_id: i64,
        call: usize,
    },
    Cancel {
        document_id: i64,
        call: usize,
        token: CancellationToken,
    },
}

/// Scripted stand-in for a Telegram account, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryTelegram {
    authorized: AtomicBool,
    login_code: String,
    two_factor_password: Option<String>,
    usernames: HashMap<String, ResolvedUsername>,
    history: Vec<HistoryMessage>,
    history_error: Option<String>,
    files: HashMap<i64, Vec<u8>>,
    faults: Vec<ChunkFault>,
    pub login_codes_requested: AtomicUsize,
    history_requests: Mutex<Vec<(PeerHandle, i32)>>,
    chunk_requests: Mutex<Vec<ChunkRequest>>,
}

impl InMemoryTelegram {
    /// An account whose session is already authorized.
    pub fn new() -> Self {
        Self {
            authorized: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// An account that needs a login code (and optionally a second-factor password).
    pub fn unauthorized(login_code: &str, two_factor_password: Option<&str>) -> Self {
        Self {
            authorized: AtomicBool::new(false),
            login_code: login_code.to_string(),
            two_factor_password: two_factor_password.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn with_username(mut self, username: &str, resolved: ResolvedUsername) -> Self {
        self.usernames.insert(username.to_string(), resolved);
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_history_error(mut self, message: &str) -> Self {
        self.history_error = Some(message.to_string());
        self
    }

    pub fn with_file(mut self, document_id: i64, bytes: Vec<u8>) -> Self {
        self.files.insert(document_id, bytes);
        self
    }

    /// The `call`-th (0-based) chunk request for `document_id` fails.
    pub fn fail_chunk(mut self, document_id: i64, call: usize) -> Self {
        self.faults.push(ChunkFault::Fail { document_id, call });
        self
    }

    /// The `call`-th (0-based) chunk request for `document_id` cancels `token` and never returns.
    pub fn cancel_on_chunk(
        mut self,
        document_id: i64,
        call: usize,
        token: CancellationToken,
    ) -> Self {
        self.faults.push(ChunkFault::Cancel {
            document_id,
            call,
            token,
        });
        self
    }

    pub fn is_authorized_now(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }

    pub fn history_requests(&self) -> Vec<(PeerHandle, i32)> {
        self.history_requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn chunk_requests(&self) -> Vec<ChunkRequest> {
        self.chunk_requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn chunk_requests_for(&self, document_id: i64) -> Vec<ChunkRequest> {
        self.chunk_requests()
            .into_iter()
            .filter(|r| r.document_id == document_id)
            .collect()
    }

    fn record_chunk(&self, request: ChunkRequest) -> Result<usize> {
        let mut requests = self.chunk_requests.lock().map_err(|_| Error::Telegram {
            message: "chunk log lock poisoned".to_string(),
        })?;
        let call = requests
            .iter()
            .filter(|r| r.document_id == request.document_id)
            .count();
        requests.push(request);
        Ok(call)
    }
}

impl TelegramApi for InMemoryTelegram {
    type LoginToken = String;
    type PasswordToken = ();

    fn is_authorized(&self) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        Box::pin(async move { Ok(self.is_authorized_now()) })
    }

    fn request_login_code<'a>(
        &'a self,
        phone: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Self::LoginToken>> + Send + 'a>> {
        Box::pin(async move {
            self.login_codes_requested.fetch_add(1, Ordering::Relaxed);
            Ok(phone.to_string())
        })
    }

    fn sign_in<'a>(
        &'a self,
        _token: &'a Self::LoginToken,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<SignIn<Self::PasswordToken>>> + Send + 'a>> {
        Box::pin(async move {
            if code != self.login_code {
                return Err(Error::Auth {
                    message: "sign in: invalid code".to_string(),
                });
            }
            if self.two_factor_password.is_some() {
                return Ok(SignIn::PasswordRequired(()));
            }
            self.authorized.store(true, Ordering::SeqCst);
            Ok(SignIn::Authorized)
        })
    }

    fn check_password<'a>(
        &'a self,
        _token: Self::PasswordToken,
        password: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if self.two_factor_password.as_deref() != Some(password) {
                return Err(Error::InvalidPassword);
            }
            self.authorized.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn resolve_username<'a>(
        &'a self,
        username: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ResolvedUsername>> + Send + 'a>> {
        Box::pin(async move {
            self.usernames
                .get(username)
                .cloned()
                .ok_or_else(|| Error::Resolve {
                    message: format!("USERNAME_NOT_OCCUPIED: {username}"),
                })
        })
    }

    fn get_history<'a>(
        &'a self,
        peer: &'a PeerHandle,
        limit: i32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<HistoryMessage>>> + Send + 'a>> {
        Box::pin(async move {
            if let Ok(mut requests) = self.history_requests.lock() {
                requests.push((*peer, limit));
            }
            if let Some(message) = &self.history_error {
                return Err(Error::History {
                    message: message.clone(),
                });
            }
            let mut history = self.history.clone();
            if limit > 0 {
                history.truncate(limit as usize);
            }
            Ok(history)
        })
    }

    fn get_file_chunk<'a>(
        &'a self,
        location: &'a DocumentLocation,
        offset: i64,
        limit: i32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>> {
        Box::pin(async move {
            let call = self.record_chunk(ChunkRequest {
                document_id: location.id,
                offset,
                limit,
            })?;

            for fault in &self.faults {
                match fault {
                    ChunkFault::Fail {
                        document_id,
                        call: at,
                    } if *document_id == location.id && *at == call => {
                        return Err(Error::Download {
                            message: format!(
                                "failed to download chunk: FILE_REFERENCE_EXPIRED (offset {offset})"
                            ),
                        });
                    }
                    ChunkFault::Cancel {
                        document_id,
                        call: at,
                        token,
                    } if *document_id == location.id && *at == call => {
                        token.cancel();
                        std::future::pending::<()>().await;
                    }
                    _ => {}
                }
            }

            let bytes = self.files.get(&location.id).ok_or_else(|| Error::Download {
                message: format!("failed to download chunk: no such document {}", location.id),
            })?;
            let start = usize::try_from(offset).unwrap_or(usize::MAX).min(bytes.len());
            let end = start.saturating_add(limit.max(0) as usize).min(bytes.len());
            Ok(bytes[start..end].to_vec())
        })
    }
}
