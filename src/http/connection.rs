use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::watch;

use crate::http::parser::{ParseError, parse_http_request};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseWriter;

const READ_CHUNK: usize = 8192;

/// How long a connection may sit between requests before it is closed.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Turns one parsed request into one response.
///
/// Implementations must not panic or fail: every fault is expressed as a
/// response status.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, request: Request) -> Response;
}

pub struct Connection<S, H> {
    stream: S,
    handler: Arc<H>,
    buffer: BytesMut,
    state: ConnectionState,
    closing: watch::Receiver<bool>,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

impl<S, H> Connection<S, H>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: Handler,
{
    /// Once `closing` turns true (or its sender is dropped) the connection
    /// finishes the response in progress and reads no further requests.
    pub fn new(stream: S, handler: Arc<H>, closing: watch::Receiver<bool>) -> Self {
        Self {
            stream,
            handler,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            state: ConnectionState::Reading,
            closing,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match &mut self.state {
                ConnectionState::Reading => {
                    let mut closing = self.closing.clone();
                    let read = tokio::select! {
                        biased;
                        _ = closing.wait_for(|stopped| *stopped) => None,
                        read = tokio::time::timeout(IDLE_TIMEOUT, self.read_request()) => Some(read),
                    };

                    match read {
                        None => {
                            tracing::debug!("listener stopped; closing connection");
                            self.state = ConnectionState::Closed;
                        }
                        Some(Err(_)) => {
                            tracing::debug!("idle timeout; closing connection");
                            self.state = ConnectionState::Closed;
                        }
                        Some(Ok(Ok(Some(req)))) => {
                            self.state = ConnectionState::Processing(req);
                        }
                        Some(Ok(Ok(None))) => {
                            self.state = ConnectionState::Closed;
                        }
                        Some(Ok(Err(e))) => {
                            tracing::debug!(error = ?e, "rejecting malformed request");
                            let response = match e {
                                ParseError::BodyTooLarge => {
                                    Response::text(StatusCode::PayloadTooLarge, "413 Payload Too Large")
                                }
                                _ => Response::text(StatusCode::BadRequest, "400 Bad Request"),
                            };
                            let writer = ResponseWriter::new(&response, true);
                            self.state = ConnectionState::Writing(writer, false);
                        }
                    }
                }

                ConnectionState::Processing(_) => {
                    let ConnectionState::Processing(req) =
                        std::mem::replace(&mut self.state, ConnectionState::Closed)
                    else {
                        unreachable!("state checked by the enclosing match")
                    };
                    let keep_alive = req.keep_alive();
                    let include_body = req.method != Method::HEAD;
                    let response = self.handler.handle(req).await;

                    let writer = ResponseWriter::new(&response, include_body);
                    self.state = ConnectionState::Writing(writer, keep_alive);
                }

                ConnectionState::Writing(writer, keep_alive) => {
                    writer.write_to_stream(&mut self.stream).await?;

                    if *keep_alive && !*self.closing.borrow() {
                        self.state = ConnectionState::Reading;
                    } else {
                        self.state = ConnectionState::Closed;
                    }
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        Ok(())
    }

    /// Reads until one full request is buffered.
    ///
    /// `Ok(None)` means the peer closed the connection cleanly; I/O errors
    /// are treated the same way since there is nobody left to answer.
    pub async fn read_request(&mut self) -> Result<Option<Request>, ParseError> {
        loop {
            match parse_http_request(&self.buffer) {
                Ok((request, consumed)) => {
                    let _ = self.buffer.split_to(consumed);
                    return Ok(Some(request));
                }
                Err(ParseError::Incomplete) => {}
                Err(e) => return Err(e),
            }

            self.buffer.reserve(READ_CHUNK);
            match self.stream.read_buf(&mut self.buffer).await {
                Ok(0) => return Ok(None),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "read failed");
                    return Ok(None);
                }
            }
        }
    }
}
