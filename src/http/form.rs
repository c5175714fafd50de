//! Decoding of POST bodies.
//!
//! The editor submits `multipart/form-data` with an optional `file` part and a
//! `body` text field. Plain `application/x-www-form-urlencoded` bodies are
//! accepted too so the wiki can be scripted with curl.

use std::collections::HashMap;

use url::form_urlencoded;

use crate::http::request::Request;

#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("multipart body without a boundary parameter")]
    MissingBoundary,
    #[error("malformed multipart body")]
    MalformedMultipart,
}

/// A file part that carried a non-empty filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub filename: String,
    pub content: Vec<u8>,
}

/// Decoded form fields plus uploaded files, keyed by field name.
#[derive(Debug, Default, Clone)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, Upload>,
}

impl FormData {
    /// Decodes the body of `req` according to its Content-Type.
    ///
    /// Unknown or missing content types decode to an empty form.
    pub fn from_request(req: &Request) -> Result<Self, FormError> {
        let content_type = req.header("Content-Type").unwrap_or("");
        let (mime, params) = split_content_type(content_type);

        if mime.eq_ignore_ascii_case("multipart/form-data") {
            let boundary = params
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("boundary"))
                .map(|(_, v)| v.as_str())
                .filter(|b| !b.is_empty())
                .ok_or(FormError::MissingBoundary)?;
            parse_multipart(&req.body, boundary)
        } else if mime.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
            Ok(Self {
                fields: form_urlencoded::parse(&req.body).into_owned().collect(),
                files: HashMap::new(),
            })
        } else {
            Ok(Self::default())
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn file(&self, name: &str) -> Option<&Upload> {
        self.files.get(name)
    }
}

/// Splits `type/subtype; k=v; k="v"` into the media type and its parameters.
fn split_content_type(value: &str) -> (&str, Vec<(String, String)>) {
    let mut pieces = value.split(';');
    let mime = pieces.next().unwrap_or("").trim();
    let params = pieces
        .filter_map(|p| p.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), unquote(v.trim()).to_string()))
        .collect();
    (mime, params)
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_multipart(body: &[u8], boundary: &str) -> Result<FormData, FormError> {
    let delimiter = format!("--{boundary}").into_bytes();
    let mut close = b"\r\n".to_vec();
    close.extend_from_slice(&delimiter);

    let mut form = FormData::default();
    let start = find(body, &delimiter).ok_or(FormError::MalformedMultipart)?;
    let mut rest = &body[start + delimiter.len()..];

    loop {
        if rest.starts_with(b"--") {
            return Ok(form);
        }
        rest = rest
            .strip_prefix(b"\r\n")
            .ok_or(FormError::MalformedMultipart)?;

        let headers_end = find(rest, b"\r\n\r\n").ok_or(FormError::MalformedMultipart)?;
        let headers = std::str::from_utf8(&rest[..headers_end])
            .map_err(|_| FormError::MalformedMultipart)?;
        let content_start = headers_end + 4;
        let content_len =
            find(&rest[content_start..], &close).ok_or(FormError::MalformedMultipart)?;
        let content = &rest[content_start..content_start + content_len];

        let disposition = headers
            .split("\r\n")
            .filter_map(|line| line.split_once(':'))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("Content-Disposition"))
            .map(|(_, v)| v.trim())
            .ok_or(FormError::MalformedMultipart)?;
        let (_, params) = split_content_type(disposition);
        let param = |name: &str| {
            params
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        };

        if let Some(name) = param("name") {
            match param("filename") {
                // Browsers send an empty file part when nothing was chosen.
                Some(filename) if filename.is_empty() => {}
                Some(filename) => {
                    form.files.insert(
                        name,
                        Upload {
                            filename,
                            content: content.to_vec(),
                        },
                    );
                }
                None => {
                    form.fields
                        .insert(name, String::from_utf8_lossy(content).into_owned());
                }
            }
        }

        rest = &rest[content_start + content_len + close.len()..];
    }
}
