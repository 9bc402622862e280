//! The TLS identity shared by every pod.

use std::sync::Arc;

use rustls::pki_types::CertificateDer;
use tokio::sync::OnceCell;
use tokio_rustls::TlsAcceptor;

use crate::error::{CertificateError, PodError};

/// PEM-encoded private key and certificate.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    pub key: Vec<u8>,
    pub cert: Vec<u8>,
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("key", &"<redacted>")
            .field("cert_len", &self.cert.len())
            .finish()
    }
}

impl Certificate {
    /// Builds a TLS acceptor serving this certificate, HTTP/1.1 only.
    pub fn tls_acceptor(&self) -> Result<TlsAcceptor, PodError> {
        let chain: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut self.cert.as_slice())
            .collect::<Result<_, _>>()
            .map_err(|e| PodError::Tls(format!("certificate PEM: {e}")))?;
        if chain.is_empty() {
            return Err(PodError::Tls("no certificate in PEM data".into()));
        }
        let key = rustls_pemfile::private_key(&mut self.key.as_slice())
            .map_err(|e| PodError::Tls(format!("key PEM: {e}")))?
            .ok_or_else(|| PodError::Tls("no private key in PEM data".into()))?;

        let mut config = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| PodError::Tls(format!("protocol versions: {e}")))?
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .map_err(|e| PodError::Tls(format!("server certificate: {e}")))?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

/// Source of fresh certificates. Generation is treated as opaque.
pub trait CertificateProvider: Send + Sync + 'static {
    fn generate(&self) -> Result<Certificate, CertificateError>;
}

/// Self-signed certificate for a fixed list of host names.
#[derive(Debug, Clone)]
pub struct SelfSignedProvider {
    hosts: Vec<String>,
}

impl SelfSignedProvider {
    pub fn new(hosts: Vec<String>) -> Self {
        Self { hosts }
    }
}

impl CertificateProvider for SelfSignedProvider {
    fn generate(&self) -> Result<Certificate, CertificateError> {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(self.hosts.clone())
                .map_err(|e| CertificateError::Generation(e.to_string()))?;
        Ok(Certificate {
            key: key_pair.serialize_pem().into_bytes(),
            cert: cert.pem().into_bytes(),
        })
    }
}

/// Process-wide holder of the shared certificate.
///
/// The certificate is produced at most once: concurrent first callers of
/// [`CertificateCache::get`] wait on the same initialization and all receive
/// the same `Arc`. A failed generation leaves the cache empty so a later call
/// can retry.
pub struct CertificateCache {
    provider: Arc<dyn CertificateProvider>,
    cell: OnceCell<Arc<Certificate>>,
}

impl CertificateCache {
    pub fn new(provider: Arc<dyn CertificateProvider>) -> Self {
        Self {
            provider,
            cell: OnceCell::new(),
        }
    }

    /// Installs a previously persisted certificate. Returns false when the
    /// cache already holds one, which is then kept.
    pub fn seed(&self, certificate: Certificate) -> bool {
        self.cell.set(Arc::new(certificate)).is_ok()
    }

    pub fn peek(&self) -> Option<Arc<Certificate>> {
        self.cell.get().cloned()
    }

    pub async fn get(&self) -> Result<Arc<Certificate>, CertificateError> {
        self.cell
            .get_or_try_init(|| async {
                tracing::info!("generating new certificate");
                let provider = Arc::clone(&self.provider);
                let certificate = tokio::task::spawn_blocking(move || provider.generate())
                    .await
                    .map_err(|e| CertificateError::Generation(e.to_string()))??;
                Ok::<_, CertificateError>(Arc::new(certificate))
            })
            .await
            .cloned()
    }
}
