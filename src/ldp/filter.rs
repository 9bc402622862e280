//! Header filtering between the adapter and the network.

use crate::http::response::{Response, StatusCode};

/// Content-type value that means "unknown" inside the adapter layer.
pub const UNKNOWN_CONTENT_TYPE: &str = "false";

/// Decides which adapter headers reach the client.
///
/// `location` is relayed only on creation responses, where the adapter set it
/// deliberately. A content-type equal to [`UNKNOWN_CONTENT_TYPE`] is dropped so
/// the client sees no content-type instead of a bogus one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseFilter;

impl ResponseFilter {
    pub fn allows(&self, name: &str, value: &str, creation: bool) -> bool {
        if name.eq_ignore_ascii_case("location") {
            return creation;
        }
        if name.eq_ignore_ascii_case("content-type") && value.trim() == UNKNOWN_CONTENT_TYPE {
            return false;
        }
        true
    }

    pub fn apply(&self, mut response: Response) -> Response {
        let creation = response.status == StatusCode::Created;
        response
            .headers
            .retain(|name, value| self.allows(name, value, creation));
        response
    }
}
