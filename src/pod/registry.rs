//! Named pods, their lifecycle, and their persistence.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::{RegistryError, StoreError};
use crate::pod::cert::{Certificate, CertificateCache};
use crate::pod::instance::{PodConfig, PodInstance};
use crate::pod::store::{PersistedCertificate, PersistedPodConfig, PersistedState, StateStore};

/// What `list()` reports for one pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodInfo {
    pub name: String,
    pub port: u16,
    pub base_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri_prefix: Option<String>,
    #[serde(rename = "isActive")]
    pub listening: bool,
}

impl From<&PodInstance> for PodInfo {
    fn from(pod: &PodInstance) -> Self {
        Self {
            name: pod.name().to_string(),
            port: pod.port(),
            base_path: pod.base_path().to_path_buf(),
            uri_prefix: pod.config().uri_prefix.clone(),
            listening: pod.is_listening(),
        }
    }
}

struct Inner {
    pods: BTreeMap<String, PodInstance>,
    // certificate read at startup, kept so saves never drop it
    stored_cert: Option<PersistedCertificate>,
}

/// Owns every pod.
///
/// Mutations are serialized by one async mutex, and each persists the full
/// state before releasing it, so the file on disk always reflects the most
/// recently completed mutation. A failed save is logged and the in-memory
/// change stands.
pub struct PodRegistry {
    inner: Mutex<Inner>,
    store: Arc<dyn StateStore>,
    certificates: Option<Arc<CertificateCache>>,
    bind_ip: IpAddr,
}

impl PodRegistry {
    /// `certificates: None` runs every pod over plain HTTP.
    pub fn new(
        store: Arc<dyn StateStore>,
        certificates: Option<Arc<CertificateCache>>,
        bind_ip: IpAddr,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                pods: BTreeMap::new(),
                stored_cert: None,
            }),
            store,
            certificates,
            bind_ip,
        }
    }

    /// Rebuilds pods from the store and starts those marked active.
    ///
    /// Entries with an unusable base path are skipped; pods whose listener
    /// fails to start are kept, stopped. Returns the number of pods loaded.
    pub async fn load_at_startup(&self) -> Result<usize, RegistryError> {
        let store = Arc::clone(&self.store);
        let state = tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;
        let mut inner = self.inner.lock().await;

        if let Some(stored) = &state.cert {
            if let Some(cache) = &self.certificates {
                cache.seed(Certificate::from(stored.clone()));
            }
        }
        inner.stored_cert = state.cert.clone();

        for (name, entry) in state.pods {
            if inner.pods.contains_key(&name) {
                continue;
            }
            if !entry.base_path.is_absolute() {
                tracing::warn!(pod = %name, path = %entry.base_path.display(), "skipping pod with relative base path");
                continue;
            }
            let config = PodConfig {
                name: name.clone(),
                port: entry.port,
                base_path: entry.base_path,
                uri_prefix: entry.uri_prefix,
            };
            let certificate = self.certificate().await?;
            let mut pod = PodInstance::new(config, self.bind_ip, certificate);
            if entry.is_active {
                if let Err(e) = pod.start().await {
                    tracing::error!(pod = %name, error = %e, "failed to start pod; leaving it stopped");
                }
            }
            inner.pods.insert(name, pod);
        }

        tracing::info!(pods = inner.pods.len(), "finished loading pods");
        Ok(inner.pods.len())
    }

    /// Registers and starts a new pod. Nothing is stored if it cannot start.
    pub async fn add(&self, config: PodConfig) -> Result<PodInfo, RegistryError> {
        validate(&config)?;
        let mut inner = self.inner.lock().await;
        if inner.pods.contains_key(&config.name) {
            return Err(RegistryError::AlreadyExists(config.name));
        }

        let certificate = self.certificate().await?;
        let mut pod = PodInstance::new(config, self.bind_ip, certificate);
        pod.start().await?;

        let info = PodInfo::from(&pod);
        inner.pods.insert(info.name.clone(), pod);
        tracing::info!(pod = %info.name, port = info.port, "pod added");
        self.persist(&inner).await;
        Ok(info)
    }

    pub async fn activate(&self, name: &str) -> Result<PodInfo, RegistryError> {
        let mut inner = self.inner.lock().await;
        let pod = inner
            .pods
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        pod.start().await?;
        let info = PodInfo::from(&*pod);
        self.persist(&inner).await;
        Ok(info)
    }

    pub async fn deactivate(&self, name: &str) -> Result<PodInfo, RegistryError> {
        let mut inner = self.inner.lock().await;
        let pod = inner
            .pods
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        pod.stop().await;
        let info = PodInfo::from(&*pod);
        self.persist(&inner).await;
        Ok(info)
    }

    /// Stops (if needed) and forgets a pod. Its directory is left untouched.
    pub async fn delete(&self, name: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        let mut pod = inner
            .pods
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        pod.stop().await;
        tracing::info!(pod = %name, "pod deleted");
        self.persist(&inner).await;
        Ok(())
    }

    pub async fn list(&self) -> Vec<PodInfo> {
        let inner = self.inner.lock().await;
        inner.pods.values().map(PodInfo::from).collect()
    }

    /// Bound address of a listening pod.
    pub async fn local_addr(&self, name: &str) -> Option<std::net::SocketAddr> {
        let inner = self.inner.lock().await;
        inner.pods.get(name).and_then(PodInstance::local_addr)
    }

    /// Stops every pod without touching persisted state, so the active flags
    /// on disk still describe what to restart next time.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        for pod in inner.pods.values_mut() {
            pod.stop().await;
        }
    }

    async fn certificate(&self) -> Result<Option<Arc<Certificate>>, RegistryError> {
        match &self.certificates {
            Some(cache) => Ok(Some(cache.get().await?)),
            None => Ok(None),
        }
    }

    /// Saves the full state on the blocking pool. Callers hold the registry
    /// lock across the save, which keeps the file in call order.
    async fn persist(&self, inner: &Inner) {
        let pods = inner
            .pods
            .iter()
            .map(|(name, pod)| {
                (
                    name.clone(),
                    PersistedPodConfig {
                        port: pod.port(),
                        base_path: pod.base_path().to_path_buf(),
                        is_active: pod.is_listening(),
                        uri_prefix: pod.config().uri_prefix.clone(),
                    },
                )
            })
            .collect();
        let cert = self
            .certificates
            .as_ref()
            .and_then(|c| c.peek())
            .map(|c| PersistedCertificate::from(c.as_ref()))
            .or_else(|| inner.stored_cert.clone());
        let state = PersistedState { pods, cert };

        let store = Arc::clone(&self.store);
        let saved = tokio::task::spawn_blocking(move || store.save(&state))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)));
        match saved.and_then(|result| result) {
            Ok(()) => tracing::debug!(pods = inner.pods.len(), "pod configuration saved"),
            Err(e) => tracing::error!(
                error = %e,
                "failed to save pod configuration; on-disk state now lags the running pods"
            ),
        }
    }
}

fn validate(config: &PodConfig) -> Result<(), RegistryError> {
    if config.name.trim().is_empty() {
        return Err(RegistryError::Invalid("pod name must not be empty".into()));
    }
    if !config.base_path.is_absolute() {
        return Err(RegistryError::Invalid(format!(
            "base path {} must be absolute",
            config.base_path.display()
        )));
    }
    Ok(())
}
