//! Request-path to filesystem-path mapping, confined to a pod root.

use std::path::PathBuf;

use crate::error::LdpError;

/// A request target mapped into a pod's root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Absolute filesystem location; always `base` or a descendant of it.
    pub fs_path: PathBuf,
    /// Normalized URL path, always starting with `/`.
    pub uri_path: String,
    segments: usize,
}

impl ResolvedPath {
    /// True when the path is exactly the pod root.
    pub fn is_root(&self) -> bool {
        self.segments == 0
    }

    /// URL path of a direct child of this path.
    pub fn child_uri(&self, name: &str) -> String {
        let encoded = urlencoding::encode(name);
        if self.uri_path.ends_with('/') {
            format!("{}{}", self.uri_path, encoded)
        } else {
            format!("{}/{}", self.uri_path, encoded)
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    base: PathBuf,
}

impl PathResolver {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Maps a request target (`/a/b.txt?x#y`) below the pod root.
    ///
    /// Segments are percent-decoded before `.` and `..` are applied, so an
    /// encoded `%2e%2e` cannot slip past. Popping above the root is a
    /// [`LdpError::PathViolation`]. No filesystem access happens here.
    pub fn resolve(&self, target: &str) -> Result<ResolvedPath, LdpError> {
        let path = target
            .split(['?', '#'])
            .next()
            .unwrap_or_default();

        let decoded = urlencoding::decode(path)
            .map_err(|_| LdpError::Validation("request path is not valid UTF-8".into()))?;
        if decoded.contains('\0') {
            return Err(LdpError::PathViolation);
        }

        let mut segments: Vec<&str> = Vec::new();
        for segment in decoded.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(LdpError::PathViolation);
                    }
                }
                s if s.contains('\\') => return Err(LdpError::PathViolation),
                s => segments.push(s),
            }
        }

        let mut fs_path = self.base.clone();
        fs_path.extend(&segments);

        let mut uri_path = String::from("/");
        let encoded: Vec<_> = segments.iter().map(|s| urlencoding::encode(s)).collect();
        uri_path.push_str(&encoded.join("/"));
        if !segments.is_empty() && decoded.ends_with('/') {
            uri_path.push('/');
        }

        Ok(ResolvedPath {
            fs_path,
            uri_path,
            segments: segments.len(),
        })
    }
}
