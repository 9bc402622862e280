//! TCP/TLS accept loop shared by pods and the control plane.

pub mod listener;
