use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::http::connection::{Connection, Handler};

const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepts connections until `shutdown` fires (or its sender is dropped).
///
/// Each connection runs on its own task, so a slow or failing client never
/// blocks the accept loop. The listener is dropped, and the port released,
/// when this function returns. Accepted connections are told to close at the
/// same time: a request already being handled is answered, nothing further
/// is read.
pub async fn run<H: Handler>(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    handler: Arc<H>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let local = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "?".into());
    let (closing, closing_rx) = watch::channel(false);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => {
                let (socket, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        // usually fd exhaustion; back off instead of spinning
                        warn!(addr = %local, error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                };
                debug!(addr = %local, %peer, "accepted connection");

                let handler = Arc::clone(&handler);
                let stopped = closing_rx.clone();
                match tls.clone() {
                    Some(acceptor) => {
                        tokio::spawn(async move {
                            let mut stopped = stopped;
                            let handshake = tokio::select! {
                                biased;
                                _ = stopped.wait_for(|s| *s) => return,
                                handshake = tokio::time::timeout(
                                    TLS_HANDSHAKE_TIMEOUT,
                                    acceptor.accept(socket),
                                ) => handshake,
                            };
                            match handshake {
                                Ok(Ok(stream)) => serve(stream, handler, peer, stopped).await,
                                Ok(Err(e)) => debug!(%peer, error = %e, "TLS handshake failed"),
                                Err(_) => debug!(%peer, "TLS handshake timed out"),
                            }
                        });
                    }
                    None => {
                        tokio::spawn(serve(socket, handler, peer, stopped));
                    }
                }
            }
        }
    }

    let _ = closing.send(true);
    info!(addr = %local, "listener closed");
}

async fn serve<S, H>(
    stream: S,
    handler: Arc<H>,
    peer: std::net::SocketAddr,
    closing: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
    H: Handler,
{
    let mut conn = Connection::new(stream, handler, closing);
    if let Err(e) = conn.run().await {
        debug!(%peer, error = %e, "connection error");
    }
}
