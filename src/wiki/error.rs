use std::io;
use std::path::PathBuf;

use crate::auth::Challenge;
use crate::http::form::FormError;
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::wiki::path::PathError;
use crate::wiki::template::RenderError;

/// Everything that stops a wiki request short of its normal response.
#[derive(Debug, thiserror::Error)]
pub enum WikiError {
    #[error("authentication required")]
    AuthRequired(Challenge),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("bad form data: {0}")]
    Form(#[from] FormError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("{} is outside the data root", .0.display())]
    OutsideRoot(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl WikiError {
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> WikiError {
        let path = path.into();
        move |source| WikiError::Io { path, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            WikiError::AuthRequired(_) => StatusCode::Unauthorized,
            WikiError::Forbidden(_) => StatusCode::Forbidden,
            WikiError::Path(_) | WikiError::Form(_) => StatusCode::BadRequest,
            WikiError::Render(_) | WikiError::OutsideRoot(_) | WikiError::Io { .. } => {
                StatusCode::InternalServerError
            }
        }
    }

    /// The response shown to the client. Server-side details stay in the log.
    pub fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        match self {
            WikiError::AuthRequired(challenge) => ResponseBuilder::new(status)
                .header("WWW-Authenticate", challenge.header_value())
                .header("Content-Type", "text/plain; charset=utf-8")
                .body(b"401 Unauthorized".to_vec())
                .build(),
            WikiError::Forbidden(reason) => Response::text(status, reason),
            WikiError::Path(_) | WikiError::Form(_) => {
                Response::text(status, format!("400 Bad Request: {message}"))
            }
            _ => Response::internal_error(),
        }
    }
}
