use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::Mutex;

use crate::{Error, Result};

/// Source of the interactive answers needed during login.
pub trait Prompt: Send + Sync {
    fn password(&self) -> Result<String>;

    fn login_code(&self) -> Result<String>;
}

/// Reads from the controlling terminal. The password is read without echo.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn password(&self) -> Result<String> {
        let password =
            rpassword::prompt_password("Enter your Telegram password (leave empty if not set): ")?;
        Ok(password.trim().to_string())
    }

    fn login_code(&self) -> Result<String> {
        read_line("Enter the code you received: ")
    }
}

fn read_line(message: &str) -> Result<String> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(message.as_bytes())?;
    stdout.flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Replays canned answers; used where no terminal is available.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    passwords: Mutex<VecDeque<String>>,
    codes: Mutex<VecDeque<String>>,
}

impl ScriptedPrompt {
    pub fn new(
        passwords: impl IntoIterator<Item = impl Into<String>>,
        codes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            passwords: Mutex::new(passwords.into_iter().map(Into::into).collect()),
            codes: Mutex::new(codes.into_iter().map(Into::into).collect()),
        }
    }

    pub fn remaining(&self) -> (usize, usize) {
        let p = self.passwords.lock().map(|q| q.len()).unwrap_or(0);
        let c = self.codes.lock().map(|q| q.len()).unwrap_or(0);
        (p, c)
    }
}

impl Prompt for ScriptedPrompt {
    fn password(&self) -> Result<String> {
        pop(&self.passwords, "password")
    }

    fn login_code(&self) -> Result<String> {
        pop(&self.codes, "login code")
    }
}

fn pop(queue: &Mutex<VecDeque<String>>, what: &str) -> Result<String> {
    queue
        .lock()
        .map_err(|_| Error::Auth {
            message: "prompt lock poisoned".to_string(),
        })?
        .pop_front()
        .ok_or_else(|| Error::Auth {
            message: format!("no scripted {what} left"),
        })
}
