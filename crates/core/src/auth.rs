use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::prompt::Prompt;
use crate::telegram::{SignIn, TelegramApi, cancellable};
use crate::{Error, Result};

pub const TWO_FACTOR_HINT: &str = "\
2FA is enabled. Please temporarily disable 2FA in Telegram Settings → Privacy and Security → \
Two-Step Verification
Or try using a different account without 2FA.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    CredentialsPending,
    Authenticated,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The stored session was still valid; nothing was prompted.
    AlreadyAuthorized,
    SignedIn,
}

/// Logs in if the session is not authorized yet, prompting for the password and code.
pub async fn authenticate<A: TelegramApi>(
    api: &A,
    phone: &str,
    prompt: Arc<dyn Prompt>,
    cancel: Option<&CancellationToken>,
) -> Result<AuthOutcome> {
    let mut state = AuthState::Unauthenticated;
    let res = run_flow(api, phone, prompt, cancel, &mut state).await;

    match res {
        Ok(outcome) => {
            state = AuthState::Authenticated;
            info!(event = "auth.finish", state = ?state, outcome = ?outcome, "authenticated");
            Ok(outcome)
        }
        Err(Error::InvalidPassword) => {
            state = AuthState::Failed;
            warn!(event = "auth.failed", state = ?state, "invalid two-factor password");
            println!("{TWO_FACTOR_HINT}");
            Err(Error::InvalidPassword)
        }
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(e @ Error::Auth { .. }) => {
            state = AuthState::Failed;
            warn!(event = "auth.failed", state = ?state, error = %e, "authentication failed");
            Err(e)
        }
        Err(other) => {
            state = AuthState::Failed;
            warn!(event = "auth.failed", state = ?state, error = %other, "authentication failed");
            Err(Error::Auth {
                message: other.to_string(),
            })
        }
    }
}

async fn run_flow<A: TelegramApi>(
    api: &A,
    phone: &str,
    prompt: Arc<dyn Prompt>,
    cancel: Option<&CancellationToken>,
    state: &mut AuthState,
) -> Result<AuthOutcome> {
    if cancellable(cancel, api.is_authorized()).await? {
        return Ok(AuthOutcome::AlreadyAuthorized);
    }

    *state = AuthState::CredentialsPending;
    info!(event = "auth.start", phone = %mask_phone(phone), "session not authorized; signing in");

    let password = ask(&prompt, cancel, |p| p.password()).await?;
    let token = cancellable(cancel, api.request_login_code(phone)).await?;
    let code = ask(&prompt, cancel, |p| p.login_code()).await?;

    match cancellable(cancel, api.sign_in(&token, &code)).await? {
        SignIn::Authorized => Ok(AuthOutcome::SignedIn),
        SignIn::PasswordRequired(password_token) => {
            if password.is_empty() {
                return Err(Error::InvalidPassword);
            }
            cancellable(cancel, api.check_password(password_token, &password)).await?;
            Ok(AuthOutcome::SignedIn)
        }
    }
}

/// Terminal reads block, so they run off the runtime and are raced against `cancel`. A
/// cancelled read is abandoned; its thread stays parked on stdin until the process exits.
async fn ask(
    prompt: &Arc<dyn Prompt>,
    cancel: Option<&CancellationToken>,
    read: fn(&dyn Prompt) -> Result<String>,
) -> Result<String> {
    let prompt = Arc::clone(prompt);
    cancellable(cancel, async move {
        tokio::task::spawn_blocking(move || read(prompt.as_ref()))
            .await
            .map_err(|e| Error::Auth {
                message: format!("prompt task failed: {e}"),
            })?
    })
    .await
}

fn mask_phone(phone: &str) -> String {
    let digits = phone.chars().count();
    if digits <= 4 {
        return "*".repeat(digits);
    }
    let tail: String = phone.chars().skip(digits - 4).collect();
    format!("{}{tail}", "*".repeat(digits - 4))
}
