//! Turtle rendering of container listings.

use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat, Utc};

pub const LDP: &str = "http://www.w3.org/ns/ldp#";
pub const DCT: &str = "http://purl.org/dc/terms/";
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
pub const POSIX_STAT: &str = "http://www.w3.org/ns/posix/stat#";

pub const TURTLE_CONTENT_TYPE: &str = "text/turtle; charset=utf-8";

/// Metadata for one item of a listing. Built per request, never stored.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    /// Name relative to the listed container; empty for the container itself.
    pub name: String,
    pub is_container: bool,
    pub size_bytes: u64,
    pub modified: SystemTime,
}

impl DirectoryEntry {
    pub fn from_metadata(name: impl Into<String>, meta: &std::fs::Metadata) -> Self {
        Self {
            name: name.into(),
            is_container: meta.is_dir(),
            size_bytes: meta.len(),
            modified: meta.modified().unwrap_or(UNIX_EPOCH),
        }
    }

    fn subject(&self) -> String {
        format!("<{}>", urlencoding::encode(&self.name))
    }

    fn modified_iso(&self) -> String {
        DateTime::<Utc>::from(self.modified).to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn modified_millis(&self) -> u128 {
        self.modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0)
    }
}

/// Renders a container and its direct children.
///
/// `base_uri` is the container's URL path; it becomes `@base` so the
/// relative child IRIs resolve under it. Children are emitted in name order.
pub fn render_container(base_uri: &str, container: &DirectoryEntry, children: &[DirectoryEntry]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "@prefix ldp: <{LDP}>.");
    let _ = writeln!(out, "@prefix dct: <{DCT}>.");
    let _ = writeln!(out, "@prefix xsd: <{XSD}>.");
    let _ = writeln!(out, "@prefix posix-stat: <{POSIX_STAT}>.");
    let base = if base_uri.ends_with('/') {
        base_uri.to_string()
    } else {
        format!("{base_uri}/")
    };
    let _ = writeln!(out, "@base <{base}>.");
    out.push('\n');

    let mut children: Vec<&DirectoryEntry> = children.iter().collect();
    children.sort_by(|a, b| a.name.cmp(&b.name));

    write_entry(&mut out, container, &children);
    for child in children {
        write_entry(&mut out, child, &[]);
    }
    out
}

fn write_entry(out: &mut String, entry: &DirectoryEntry, contains: &[&DirectoryEntry]) {
    let types = if entry.is_container {
        "ldp:BasicContainer, ldp:Container, ldp:Resource"
    } else {
        "ldp:Resource"
    };
    let _ = writeln!(out, "{} a {};", entry.subject(), types);
    for child in contains {
        let _ = writeln!(out, "    ldp:contains {};", child.subject());
    }
    let _ = writeln!(out, "    dct:modified \"{}\"^^xsd:dateTime;", entry.modified_iso());
    let _ = writeln!(out, "    posix-stat:mtime {};", entry.modified_millis());
    let _ = writeln!(out, "    posix-stat:size {}.", entry.size_bytes);
    out.push('\n');
}
