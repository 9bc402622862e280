//! localpod - directories served as Linked Data Platform pods
//!
//! Each pod maps one directory onto one port; the control plane adds,
//! starts, stops and removes pods and keeps their configuration on disk.

pub mod config;
pub mod control;
pub mod error;
pub mod http;
pub mod ldp;
pub mod pod;
pub mod server;
