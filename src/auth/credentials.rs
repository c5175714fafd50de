//! Credential file handling.
//!
//! The file holds one `identifier:hash` record per line, where `hash` is the
//! Digest HA1 value `MD5(identifier:realm:secret)` in lowercase hex. MD5 is
//! dictated by Digest compatibility with browsers.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

const MAX_PROMPT_ATTEMPTS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("malformed credential record on line {line}")]
    MalformedRecord { line: usize },

    #[error("I/O error on credential file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("credential setup aborted: {0}")]
    Prompt(String),
}

/// Identifier to HA1 mapping, immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    entries: HashMap<String, String>,
}

impl CredentialStore {
    pub fn load(path: &Path) -> Result<Self, CredentialError> {
        let text = std::fs::read_to_string(path).map_err(|source| CredentialError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::parse(&text)?;
        if store.is_empty() {
            tracing::warn!(path = %path.display(), "Credential file has no records; editing is impossible");
        }
        tracing::info!(path = %path.display(), users = store.len(), "Loaded credentials");
        Ok(store)
    }

    /// Parses record lines. Blank lines are ignored and a repeated
    /// identifier replaces the earlier record.
    pub fn parse(text: &str) -> Result<Self, CredentialError> {
        let mut entries = HashMap::new();

        for (index, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let (identifier, hash) = line
                .split_once(':')
                .filter(|(id, hash)| !id.is_empty() && !hash.is_empty())
                .ok_or(CredentialError::MalformedRecord { line: index + 1 })?;

            entries.insert(identifier.to_string(), hash.to_string());
        }

        Ok(Self { entries })
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// The stored HA1 for `identifier`.
    pub fn secret_hash(&self, identifier: &str) -> Option<&str> {
        self.entries.get(identifier).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// HA1 as stored in the credential file.
pub fn hash_secret(identifier: &str, realm: &str, secret: &str) -> String {
    format!("{:x}", md5::compute(format!("{identifier}:{realm}:{secret}")))
}

/// Source of the answers the setup flow asks for.
pub trait Prompt {
    fn identifier(&mut self) -> io::Result<String>;
    fn secret(&mut self, label: &str) -> io::Result<String>;
}

/// Reads the identifier from stdin and secrets without echo.
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn identifier(&mut self) -> io::Result<String> {
        eprint!("ID: ");
        io::stderr().flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(line.trim().to_string())
    }

    fn secret(&mut self, label: &str) -> io::Result<String> {
        rpassword::prompt_password(format!("{label}: "))
    }
}

/// Creates the credential file interactively unless it already exists.
///
/// An existing file is never touched.
pub fn bootstrap<P: Prompt>(path: &Path, realm: &str, prompt: &mut P) -> Result<(), CredentialError> {
    if path.is_file() {
        return Ok(());
    }

    let io_err = |source| CredentialError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut identifier = None;
    for _ in 0..MAX_PROMPT_ATTEMPTS {
        let answer = prompt.identifier().map_err(io_err)?;
        if !answer.is_empty() {
            identifier = Some(answer);
            break;
        }
    }
    let identifier = identifier.ok_or_else(|| CredentialError::Prompt("no identifier given".into()))?;

    let mut secret = None;
    for _ in 0..MAX_PROMPT_ATTEMPTS {
        let first = prompt.secret("Password").map_err(io_err)?;
        if first.is_empty() {
            continue;
        }
        let confirm = prompt.secret("Confirm").map_err(io_err)?;
        if first == confirm {
            secret = Some(first);
            break;
        }
        eprintln!("Passwords do not match");
    }
    let secret = secret.ok_or_else(|| CredentialError::Prompt("no matching password".into()))?;

    let record = format!("{identifier}:{}\n", hash_secret(&identifier, realm, &secret));

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        // Lost a race with another setup; keep theirs.
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(()),
        Err(e) => return Err(io_err(e)),
    };
    file.write_all(record.as_bytes()).map_err(io_err)?;

    tracing::info!(path = %path.display(), "Created credential file");
    Ok(())
}

/// Runs the interactive setup if needed, then loads the store.
pub fn ensure(path: &Path, realm: &str) -> Result<CredentialStore, CredentialError> {
    bootstrap(path, realm, &mut TerminalPrompt)?;
    CredentialStore::load(path)
}
