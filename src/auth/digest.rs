//! HTTP Digest authentication (RFC 2617, MD5).
//!
//! Nonces are stateless: `"{unix_seconds}:{MD5(unix_seconds:key)}"` with the
//! key derived from the process id, so any nonce this process issued
//! verifies without a server-side table. A restarted process rejects old
//! nonces and browsers silently retry. Nonces can be replayed for the
//! lifetime of the process; this trades replay protection for the simple
//! one-shot-per-request model.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::auth::credentials::CredentialStore;
use crate::http::request::Request;

/// Outcome of checking a request's credentials.
#[derive(Debug, Clone)]
pub enum Authorization {
    Granted { identifier: String },
    Denied(Challenge),
}

/// The `WWW-Authenticate` challenge sent with a 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: String,
    pub stale: bool,
}

impl Challenge {
    pub fn header_value(&self) -> String {
        let mut value = format!(
            "Digest realm=\"{}\", nonce=\"{}\", opaque=\"{}\", algorithm=MD5, qop=\"auth\"",
            escape_quoted(&self.realm),
            self.nonce,
            self.opaque
        );
        if self.stale {
            value.push_str(", stale=true");
        }
        value
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header_value())
    }
}

/// Fields of an `Authorization: Digest ...` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestCredentials {
    pub username: String,
    pub realm: String,
    pub nonce: String,
    pub uri: String,
    pub response: String,
    pub opaque: Option<String>,
    pub algorithm: Option<String>,
    pub qop: Option<String>,
    pub nc: Option<String>,
    pub cnonce: Option<String>,
}

impl DigestCredentials {
    /// Parses the header value. Returns `None` for other schemes or when a
    /// required field is missing.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim_start();
        let (scheme, rest) = header.split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("Digest") {
            return None;
        }

        let mut creds = DigestCredentials::default();
        let (mut username, mut realm, mut nonce, mut uri, mut response) =
            (None, None, None, None, None);

        for (key, value) in parse_params(rest)? {
            match key.to_ascii_lowercase().as_str() {
                "username" => username = Some(value),
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "uri" => uri = Some(value),
                "response" => response = Some(value),
                "opaque" => creds.opaque = Some(value),
                "algorithm" => creds.algorithm = Some(value),
                "qop" => creds.qop = Some(value),
                "nc" => creds.nc = Some(value),
                "cnonce" => creds.cnonce = Some(value),
                _ => {}
            }
        }

        creds.username = username?;
        creds.realm = realm?;
        creds.nonce = nonce?;
        creds.uri = uri?;
        creds.response = response?;
        Some(creds)
    }
}

/// Splits `k=v, k="quoted, value"` pairs.
fn parse_params(input: &str) -> Option<Vec<(String, String)>> {
    let mut params = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            chars.next();
        }
        if chars.peek().is_none() {
            return Some(params);
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' {
                break;
            }
            key.push(c);
            chars.next();
        }
        chars.next()?; // '='

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            loop {
                match chars.next()? {
                    '\\' => value.push(chars.next()?),
                    '"' => break,
                    c => value.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }

        params.push((key.trim().to_string(), value.trim().to_string()));
    }
}

fn escape_quoted(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input))
}

/// Expected `response` value for the given HA1 and request.
///
/// `qop` carries `(nc, cnonce)` when the client used `qop=auth`; without it
/// the RFC 2069 form is used.
pub fn compute_response(
    ha1: &str,
    method: &str,
    uri: &str,
    nonce: &str,
    qop: Option<(&str, &str)>,
) -> String {
    let ha2 = md5_hex(&format!("{method}:{uri}"));
    match qop {
        Some((nc, cnonce)) => md5_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:auth:{ha2}")),
        None => md5_hex(&format!("{ha1}:{nonce}:{ha2}")),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, PartialEq, Eq)]
enum NonceState {
    Valid,
    Stale,
    Invalid,
}

/// Checks Digest credentials against the credential store.
#[derive(Debug, Clone)]
pub struct DigestAuthenticator {
    realm: String,
    opaque: String,
    nonce_key: String,
    nonce_lifetime: Option<Duration>,
    store: Arc<CredentialStore>,
}

impl DigestAuthenticator {
    pub fn new(realm: impl Into<String>, store: Arc<CredentialStore>) -> Self {
        let pid = std::process::id();
        Self {
            realm: realm.into(),
            opaque: md5_hex(&format!("opaque:{pid}")),
            nonce_key: format!("nonce:{pid}"),
            nonce_lifetime: None,
            store,
        }
    }

    pub fn with_nonce_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.nonce_lifetime = lifetime;
        self
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// A fresh challenge for a 401 response.
    pub fn challenge(&self, stale: bool) -> Challenge {
        Challenge {
            realm: self.realm.clone(),
            nonce: self.issue_nonce(unix_now()),
            opaque: self.opaque.clone(),
            stale,
        }
    }

    pub fn authorize(&self, req: &Request) -> Authorization {
        let Some(creds) = req.header("Authorization").and_then(DigestCredentials::parse) else {
            return Authorization::Denied(self.challenge(false));
        };

        match self.verify(req, &creds) {
            Ok(()) => Authorization::Granted {
                identifier: creds.username,
            },
            Err(stale) => {
                tracing::debug!(username = %creds.username, stale, "Digest verification failed");
                Authorization::Denied(self.challenge(stale))
            }
        }
    }

    /// `Err(true)` means the digest was right but the nonce expired.
    fn verify(&self, req: &Request, creds: &DigestCredentials) -> Result<(), bool> {
        if creds.realm != self.realm
            || creds.opaque.as_deref() != Some(self.opaque.as_str())
            || creds.uri != req.target
        {
            return Err(false);
        }
        if let Some(algorithm) = &creds.algorithm {
            if !algorithm.eq_ignore_ascii_case("MD5") {
                return Err(false);
            }
        }

        let qop = match creds.qop.as_deref() {
            None => None,
            Some("auth") => match (&creds.nc, &creds.cnonce) {
                (Some(nc), Some(cnonce)) => Some((nc.as_str(), cnonce.as_str())),
                _ => return Err(false),
            },
            Some(_) => return Err(false),
        };

        let nonce_state = self.check_nonce(&creds.nonce, unix_now());
        if nonce_state == NonceState::Invalid {
            return Err(false);
        }

        // Unknown identifiers still hash so both failures look alike.
        let ha1 = self.store.secret_hash(&creds.username).unwrap_or("");
        let expected = compute_response(ha1, req.method.as_str(), &creds.uri, &creds.nonce, qop);
        let known = self.store.secret_hash(&creds.username).is_some();

        if !(known && constant_time_eq(expected.as_bytes(), creds.response.as_bytes())) {
            return Err(false);
        }
        if nonce_state == NonceState::Stale {
            return Err(true);
        }
        Ok(())
    }

    fn issue_nonce(&self, now: u64) -> String {
        format!("{now}:{}", md5_hex(&format!("{now}:{}", self.nonce_key)))
    }

    fn check_nonce(&self, nonce: &str, now: u64) -> NonceState {
        let Some((issued, _)) = nonce.split_once(':') else {
            return NonceState::Invalid;
        };
        let Ok(issued_at) = issued.parse::<u64>() else {
            return NonceState::Invalid;
        };
        if !constant_time_eq(self.issue_nonce(issued_at).as_bytes(), nonce.as_bytes()) {
            return NonceState::Invalid;
        }

        match self.nonce_lifetime {
            Some(lifetime) if now.saturating_sub(issued_at) > lifetime.as_secs() => {
                NonceState::Stale
            }
            _ => NonceState::Valid,
        }
    }
}
