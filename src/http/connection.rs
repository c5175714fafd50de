use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::http::parser::{parse_http_request_limited, ParseError};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::wiki::Wiki;

const READ_CHUNK: usize = 8192;

pub struct Connection<S> {
    stream: S,
    buffer: BytesMut,
    state: ConnectionState,
    wiki: Arc<Wiki>,
    max_body: usize,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, wiki: Arc<Wiki>, max_body: usize) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            state: ConnectionState::Reading,
            wiki,
            max_body,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            let state = std::mem::replace(&mut self.state, ConnectionState::Closed);

            self.state = match state {
                ConnectionState::Reading => match self.read_request().await {
                    Ok(Some(req)) => ConnectionState::Processing(req),
                    Ok(None) => ConnectionState::Closed,
                    Err(ParseError::TooLarge { limit }) => {
                        tracing::warn!(limit, "Request too large, closing connection");
                        let writer = ResponseWriter::new(&Response::payload_too_large());
                        ConnectionState::Writing(writer, false)
                    }
                    Err(ParseError::UnsupportedTransferEncoding(coding)) => {
                        tracing::warn!(coding = %coding, "Unsupported transfer coding, closing connection");
                        let writer = ResponseWriter::new(&Response::not_implemented());
                        ConnectionState::Writing(writer, false)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Malformed request, closing connection");
                        let response = Response::bad_request(format!("400 Bad Request: {e}"));
                        ConnectionState::Writing(ResponseWriter::new(&response), false)
                    }
                },

                ConnectionState::Processing(req) => {
                    let keep_alive = req.keep_alive();
                    let response = self.handle_request(req).await?;
                    ConnectionState::Writing(ResponseWriter::new(&response), keep_alive)
                }

                ConnectionState::Writing(mut writer, keep_alive) => {
                    writer.write_to_stream(&mut self.stream).await?;

                    if keep_alive {
                        ConnectionState::Reading // go back for next request
                    } else {
                        ConnectionState::Closed
                    }
                }

                ConnectionState::Closed => break,
            };
        }

        Ok(())
    }

    /// Reads until a full request is buffered.
    ///
    /// `Ok(None)` means the peer went away, either cleanly or through a
    /// read error; either way no response can be delivered.
    pub async fn read_request(&mut self) -> Result<Option<Request>, ParseError> {
        loop {
            match parse_http_request_limited(&self.buffer, self.max_body) {
                Ok((request, consumed)) => {
                    let _ = self.buffer.split_to(consumed);
                    return Ok(Some(request));
                }
                Err(ParseError::Incomplete) => {}
                Err(e) => return Err(e),
            }

            self.buffer.reserve(READ_CHUNK);
            let n = match self.stream.read_buf(&mut self.buffer).await {
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!(error = %e, "Read failed");
                    return Ok(None);
                }
            };

            if n == 0 {
                if !self.buffer.is_empty() {
                    tracing::debug!(
                        buffered = self.buffer.len(),
                        "Peer closed mid-request"
                    );
                }
                return Ok(None);
            }
        }
    }

    /// Runs the wiki on the blocking pool; every handler touches the
    /// filesystem synchronously.
    async fn handle_request(&self, req: Request) -> anyhow::Result<Response> {
        let wiki = Arc::clone(&self.wiki);
        let response = tokio::task::spawn_blocking(move || wiki.handle(&req)).await?;
        Ok(response)
    }
}
