//! Pod lifecycle management
//!
//! A pod is a directory served as an LDP endpoint on its own port. The
//! registry owns every pod, persists their configuration, and hands the one
//! shared TLS certificate to each of them.

pub mod cert;
pub mod instance;
pub mod registry;
pub mod store;

pub use cert::{Certificate, CertificateCache, CertificateProvider, SelfSignedProvider};
pub use instance::{PodConfig, PodInstance, PodService};
pub use registry::{PodInfo, PodRegistry};
pub use store::{MemoryStore, PersistedState, StateStore, YamlFileStore};
