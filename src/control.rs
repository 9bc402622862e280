//! Operator-facing HTTP API for managing pods.
//!
//! | Route | Body | Effect |
//! |-------|------|--------|
//! | `GET /get_pods` | | JSON list of pods |
//! | `POST /add_pod` | `{"name", "port", "basePath", "uriPrefix"?}` | create and start |
//! | `POST /activate_pod` | `{"name"}` | start |
//! | `POST /deactivate_pod` | `{"name"}` | stop |
//! | `POST /delete_pod` | `{"name"}` | stop and remove |

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::RegistryError;
use crate::http::connection::Handler;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::pod::{PodConfig, PodRegistry};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPodRequest {
    pub name: String,
    pub port: u16,
    pub base_path: PathBuf,
    #[serde(default)]
    pub uri_prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PodNameRequest {
    pub name: String,
}

pub struct ControlService {
    registry: Arc<PodRegistry>,
    allowed_host: String,
}

impl ControlService {
    /// Requests are only served when their `Host` header equals
    /// `allowed_host` (e.g. `localhost:2700`).
    pub fn new(registry: Arc<PodRegistry>, allowed_host: impl Into<String>) -> Self {
        Self {
            registry,
            allowed_host: allowed_host.into(),
        }
    }

    async fn route(&self, request: &Request) -> Response {
        let path = request.path.split('?').next().unwrap_or_default();
        match (request.method, path) {
            (Method::GET, "/get_pods") => json(StatusCode::Ok, &self.registry.list().await),
            (Method::POST, "/add_pod") => match parse_body::<AddPodRequest>(request) {
                Ok(body) => {
                    let config = PodConfig {
                        name: body.name,
                        port: body.port,
                        base_path: body.base_path,
                        uri_prefix: body.uri_prefix,
                    };
                    outcome(self.registry.add(config).await)
                }
                Err(response) => response,
            },
            (Method::POST, "/activate_pod") => match parse_body::<PodNameRequest>(request) {
                Ok(body) => outcome(self.registry.activate(&body.name).await),
                Err(response) => response,
            },
            (Method::POST, "/deactivate_pod") => match parse_body::<PodNameRequest>(request) {
                Ok(body) => outcome(self.registry.deactivate(&body.name).await),
                Err(response) => response,
            },
            (Method::POST, "/delete_pod") => match parse_body::<PodNameRequest>(request) {
                Ok(body) => outcome(self.registry.delete(&body.name).await),
                Err(response) => response,
            },
            (_, "/get_pods") | (_, "/add_pod") | (_, "/activate_pod") | (_, "/deactivate_pod")
            | (_, "/delete_pod") => Response::text(StatusCode::MethodNotAllowed, "method not allowed"),
            _ => Response::not_found(),
        }
    }
}

#[async_trait]
impl Handler for ControlService {
    async fn handle(&self, request: Request) -> Response {
        if request.header("Host") != Some(self.allowed_host.as_str()) {
            tracing::warn!(host = ?request.header("Host"), "control request with unexpected host");
            return Response::text(StatusCode::Forbidden, "Invalid host");
        }
        let response = self.route(&request).await;
        tracing::info!(
            method = %request.method,
            path = %request.path,
            status = response.status.as_u16(),
            "control request"
        );
        response
    }
}

fn parse_body<T: DeserializeOwned>(request: &Request) -> Result<T, Response> {
    serde_json::from_slice(&request.body)
        .map_err(|e| Response::text(StatusCode::BadRequest, format!("invalid request body: {e}")))
}

fn outcome<T>(result: Result<T, RegistryError>) -> Response {
    match result {
        Ok(_) => ResponseBuilder::new(StatusCode::Ok).build(),
        Err(e) => {
            if e.status() == StatusCode::InternalServerError {
                tracing::error!(error = %e, "control operation failed");
            }
            Response::text(e.status(), e.to_string())
        }
    }
}

fn json<T: serde::Serialize>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => ResponseBuilder::new(status)
            .header("Content-Type", "application/json")
            .body(body)
            .build(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode response");
            Response::internal_error()
        }
    }
}
