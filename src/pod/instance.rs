//! One pod: a root directory served on one port.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::PodError;
use crate::http::connection::Handler;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::ldp::{PathResolver, ProtocolAdapter, ResponseFilter};
use crate::pod::cert::Certificate;
use crate::server::listener;

const CORS_ALLOW_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";
const CORS_EXPOSE_HEADERS: &str = "Location, Allow, Accept-Post";

/// Static description of a pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodConfig {
    pub name: String,
    pub port: u16,
    pub base_path: PathBuf,
    pub uri_prefix: Option<String>,
}

struct Running {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// A pod and its listener, if any.
///
/// `listening` is not stored separately: it is whether a listener task is
/// held, so the reported state cannot drift from the socket.
pub struct PodInstance {
    config: PodConfig,
    bind_ip: IpAddr,
    certificate: Option<Arc<Certificate>>,
    running: Option<Running>,
}

impl PodInstance {
    pub fn new(config: PodConfig, bind_ip: IpAddr, certificate: Option<Arc<Certificate>>) -> Self {
        Self {
            config,
            bind_ip,
            certificate,
            running: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn base_path(&self) -> &Path {
        &self.config.base_path
    }

    pub fn config(&self) -> &PodConfig {
        &self.config
    }

    pub fn is_listening(&self) -> bool {
        self.running.is_some()
    }

    /// Bound address while listening; differs from `port()` when port 0 was
    /// requested.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// Binds and starts serving. Calling this on a listening pod does nothing.
    pub async fn start(&mut self) -> Result<(), PodError> {
        if self.running.is_some() {
            tracing::debug!(pod = %self.config.name, "already listening");
            return Ok(());
        }

        let tls = match &self.certificate {
            Some(cert) => Some(cert.tls_acceptor()?),
            None => {
                tracing::warn!(
                    pod = %self.config.name,
                    "only running on http because no certificate was supplied"
                );
                None
            }
        };

        let port = self.config.port;
        let socket = TcpListener::bind((self.bind_ip, port))
            .await
            .map_err(|source| PodError::Bind { port, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| PodError::Bind { port, source })?;

        let service = Arc::new(PodService::new(&self.config));
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(listener::run(socket, tls, service, shutdown_rx));

        tracing::info!(
            pod = %self.config.name,
            addr = %local_addr,
            root = %self.config.base_path.display(),
            tls = self.certificate.is_some(),
            "pod listening"
        );
        self.running = Some(Running {
            shutdown,
            task,
            local_addr,
        });
        Ok(())
    }

    /// Closes the listener and tells its open connections to close. A request
    /// already being handled is still answered; kept-alive connections read
    /// nothing further. Calling this on a stopped pod does nothing.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.shutdown.send(());
        if let Err(e) = running.task.await {
            tracing::error!(pod = %self.config.name, error = %e, "listener task failed");
        }
        tracing::info!(pod = %self.config.name, "pod stopped");
    }
}

/// Request pipeline of a pod: CORS, path resolution, root protection,
/// adapter, header filter.
pub struct PodService {
    name: String,
    resolver: PathResolver,
    adapter: Arc<ProtocolAdapter>,
    filter: ResponseFilter,
}

impl PodService {
    pub fn new(config: &PodConfig) -> Self {
        Self {
            name: config.name.clone(),
            resolver: PathResolver::new(&config.base_path),
            adapter: Arc::new(ProtocolAdapter::new(config.uri_prefix.clone())),
            filter: ResponseFilter,
        }
    }

    async fn dispatch(&self, request: Request) -> Response {
        let target = match self.resolver.resolve(&request.path) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(pod = %self.name, path = %request.path, error = %e, "rejected request path");
                return e.into_response();
            }
        };

        if request.method == Method::DELETE && target.is_root() {
            return Response::text(StatusCode::Forbidden, "the pod root cannot be deleted");
        }

        // The adapter runs on its own task so that even a panic inside it
        // surfaces as a 500 on this connection only.
        let adapter = Arc::clone(&self.adapter);
        let outcome = tokio::spawn(async move { adapter.handle(&target, &request).await }).await;
        match outcome {
            Ok(response) => self.filter.apply(response),
            Err(e) => {
                tracing::error!(pod = %self.name, error = %e, "request handler aborted");
                Response::internal_error()
            }
        }
    }
}

#[async_trait]
impl Handler for PodService {
    async fn handle(&self, request: Request) -> Response {
        let method = request.method;
        let path = request.path.clone();

        let mut response = if is_preflight(&request) {
            preflight(&request)
        } else {
            self.dispatch(request).await
        };
        response.set_header("Access-Control-Allow-Origin", "*");
        response.set_header("Access-Control-Expose-Headers", CORS_EXPOSE_HEADERS);

        tracing::info!(
            pod = %self.name,
            %method,
            %path,
            status = response.status.as_u16(),
            "request handled"
        );
        response
    }
}

fn is_preflight(request: &Request) -> bool {
    request.method == Method::OPTIONS && request.header("Access-Control-Request-Method").is_some()
}

fn preflight(request: &Request) -> Response {
    let mut builder = ResponseBuilder::new(StatusCode::NoContent)
        .header("Access-Control-Allow-Methods", CORS_ALLOW_METHODS)
        .header("Vary", "Access-Control-Request-Headers");
    if let Some(headers) = request.header("Access-Control-Request-Headers") {
        builder = builder.header("Access-Control-Allow-Headers", headers);
    }
    builder.build()
}
