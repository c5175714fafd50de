use std::collections::HashMap;

/// HTTP status codes the wiki answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 303 See Other, used after every successful write or delete
    SeeOther,
    /// 400 Bad Request
    BadRequest,
    /// 401 Unauthorized, carries a Digest challenge
    Unauthorized,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 405 Method Not Allowed
    MethodNotAllowed,
    /// 413 Payload Too Large
    PayloadTooLarge,
    /// 500 Internal Server Error
    InternalServerError,
    /// 501 Not Implemented, for transfer codings other than chunked
    NotImplemented,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// ```
    /// # use onewiki::http::response::StatusCode;
    /// assert_eq!(StatusCode::Unauthorized.as_u16(), 401);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::SeeOther => 303,
            StatusCode::BadRequest => 400,
            StatusCode::Unauthorized => 401,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::PayloadTooLarge => 413,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::SeeOther => "See Other",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.as_u16() >= 500
    }
}

/// A complete HTTP response ready to be sent to a client.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// ```ignore
/// let response = ResponseBuilder::new(StatusCode::Ok)
///     .header("Content-Type", "text/plain")
///     .body(b"hello".to_vec())
///     .build();
/// ```
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl ResponseBuilder {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Adds or replaces a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Builds the final Response.
    ///
    /// Adds a Content-Length header matching the body unless one was set.
    pub fn build(mut self) -> Response {
        self.headers
            .entry("Content-Length".to_string())
            .or_insert_with(|| self.body.len().to_string());

        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl Response {
    /// A 200 response with the given body and no Content-Type.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        ResponseBuilder::new(StatusCode::Ok)
            .body(body.into())
            .build()
    }

    /// A 200 rendered HTML document.
    pub fn html(body: impl Into<String>) -> Self {
        ResponseBuilder::new(StatusCode::Ok)
            .header("Content-Type", "text/html; charset=utf-8")
            .body(body.into().into_bytes())
            .build()
    }

    /// A plain-text response with the given status.
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        ResponseBuilder::new(status)
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body.into().into_bytes())
            .build()
    }

    /// A 303 redirect to `location`.
    pub fn see_other(location: impl Into<String>) -> Self {
        ResponseBuilder::new(StatusCode::SeeOther)
            .header("Location", location)
            .build()
    }

    pub fn not_found() -> Self {
        Self::text(StatusCode::NotFound, "404 Not Found")
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::text(StatusCode::BadRequest, reason)
    }

    pub fn method_not_allowed() -> Self {
        ResponseBuilder::new(StatusCode::MethodNotAllowed)
            .header("Allow", "GET, POST")
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(b"405 Method Not Allowed".to_vec())
            .build()
    }

    pub fn payload_too_large() -> Self {
        ResponseBuilder::new(StatusCode::PayloadTooLarge)
            .header("Content-Type", "text/plain; charset=utf-8")
            .header("Connection", "close")
            .body(b"413 Payload Too Large".to_vec())
            .build()
    }

    pub fn not_implemented() -> Self {
        ResponseBuilder::new(StatusCode::NotImplemented)
            .header("Content-Type", "text/plain; charset=utf-8")
            .header("Connection", "close")
            .body(b"501 Not Implemented".to_vec())
            .build()
    }

    pub fn internal_error() -> Self {
        Self::text(StatusCode::InternalServerError, "500 Internal Server Error")
    }

    /// Looks up a header ignoring ASCII case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}
