use crate::http::request::{Method, Request};
use std::collections::HashMap;

/// Largest header block accepted before the request is rejected.
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed request line")]
    InvalidRequest,
    #[error("unknown method")]
    InvalidMethod,
    #[error("malformed header line")]
    InvalidHeader,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("both Content-Length and Transfer-Encoding present")]
    AmbiguousLength,
    #[error("malformed chunked body")]
    InvalidChunk,
    #[error("unsupported Transfer-Encoding: {0}")]
    UnsupportedTransferEncoding(String),
    #[error("request exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("incomplete request")]
    Incomplete,
}

/// Parses one request from the front of `buf` with no body size limit.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    parse_http_request_limited(buf, usize::MAX)
}

/// Parses one request from the front of `buf`.
///
/// Returns the request and the number of bytes it consumed. A declared
/// Content-Length above `max_body` fails with `TooLarge` as soon as the
/// headers are complete, without waiting for the body.
pub fn parse_http_request_limited(
    buf: &[u8],
    max_body: usize,
) -> Result<(Request, usize), ParseError> {
    let headers_end = match find_headers_end(buf) {
        Some(end) => end,
        None if buf.len() > MAX_HEADER_BYTES => {
            return Err(ParseError::TooLarge {
                limit: MAX_HEADER_BYTES,
            });
        }
        None => return Err(ParseError::Incomplete),
    };
    let header_bytes = &buf[..headers_end];
    let body_bytes = &buf[headers_end + 4..];

    let headers_str =
        std::str::from_utf8(header_bytes).map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = headers_str.split("\r\n");

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let target = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    let method = Method::from_str(method_str).ok_or(ParseError::InvalidMethod)?;

    let mut headers: HashMap<String, String> = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() {
            return Err(ParseError::InvalidHeader);
        }
        insert_header(&mut headers, key, value)?;
    }

    let content_length = header_value(&headers, "Content-Length")
        .map(|v| {
            v.parse::<usize>()
                .map_err(|_| ParseError::InvalidContentLength)
        })
        .transpose()?;

    let (body, body_len) = match header_value(&headers, "Transfer-Encoding") {
        Some(_) if content_length.is_some() => return Err(ParseError::AmbiguousLength),
        Some(coding) if coding.eq_ignore_ascii_case("chunked") => {
            match decode_chunked(body_bytes, max_body) {
                Err(ParseError::Incomplete)
                    if body_bytes.len() > max_body.saturating_add(MAX_HEADER_BYTES) =>
                {
                    return Err(ParseError::TooLarge { limit: max_body });
                }
                result => result?,
            }
        }
        Some(coding) => return Err(ParseError::UnsupportedTransferEncoding(coding.to_string())),
        None => {
            let content_length = content_length.unwrap_or(0);
            if content_length > max_body {
                return Err(ParseError::TooLarge { limit: max_body });
            }
            if body_bytes.len() < content_length {
                return Err(ParseError::Incomplete);
            }
            (body_bytes[..content_length].to_vec(), content_length)
        }
    };

    let request = Request {
        method,
        target: target.to_string(),
        version: version.to_string(),
        headers,
        body,
    };

    Ok((request, headers_end + 4 + body_len))
}

/// Adds a header, folding repeats of the same name (in any case) into one
/// comma-separated value. Repeated Content-Length values must agree.
fn insert_header(
    headers: &mut HashMap<String, String>,
    key: &str,
    value: &str,
) -> Result<(), ParseError> {
    let existing = headers
        .keys()
        .find(|k| k.eq_ignore_ascii_case(key))
        .cloned();

    match existing {
        Some(name) if key.eq_ignore_ascii_case("Content-Length") => {
            if headers.get(&name).map(String::as_str) != Some(value) {
                return Err(ParseError::InvalidContentLength);
            }
        }
        Some(name) => {
            if let Some(current) = headers.get_mut(&name) {
                current.push_str(", ");
                current.push_str(value);
            }
        }
        None => {
            headers.insert(key.to_string(), value.to_string());
        }
    }
    Ok(())
}

fn header_value<'a>(headers: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

/// Decodes a chunked body from the front of `buf`.
///
/// Returns the body and the number of bytes consumed, trailers included.
/// Chunk extensions and trailer fields are skipped.
fn decode_chunked(buf: &[u8], max_body: usize) -> Result<(Vec<u8>, usize), ParseError> {
    let mut body = Vec::new();
    let mut pos = 0;

    loop {
        let line_end = find_crlf(&buf[pos..]).ok_or(ParseError::Incomplete)?;
        let line =
            std::str::from_utf8(&buf[pos..pos + line_end]).map_err(|_| ParseError::InvalidChunk)?;
        let size_field = line.split(';').next().unwrap_or("").trim();
        if size_field.is_empty() || !size_field.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseError::InvalidChunk);
        }
        let size = usize::from_str_radix(size_field, 16).map_err(|_| ParseError::InvalidChunk)?;
        pos += line_end + 2;

        if size == 0 {
            break;
        }
        if body.len().saturating_add(size) > max_body {
            return Err(ParseError::TooLarge { limit: max_body });
        }

        let data_end = pos.checked_add(size).ok_or(ParseError::InvalidChunk)?;
        let chunk_end = data_end.checked_add(2).ok_or(ParseError::InvalidChunk)?;
        if buf.len() < chunk_end {
            return Err(ParseError::Incomplete);
        }
        if &buf[data_end..chunk_end] != b"\r\n" {
            return Err(ParseError::InvalidChunk);
        }
        body.extend_from_slice(&buf[pos..data_end]);
        pos = chunk_end;
    }

    // Trailer section ends with an empty line.
    loop {
        let line_end = find_crlf(&buf[pos..]).ok_or(ParseError::Incomplete)?;
        pos += line_end + 2;
        if line_end == 0 {
            return Ok((body, pos));
        }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
