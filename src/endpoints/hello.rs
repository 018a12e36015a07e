#![forbid(unsafe_code)]

use poem::Request;
use poem_openapi::{ OpenApi, param::Query, payload::PlainText };

use crate::utils::nms_utils::{self, RequestDebug};

// ***************************************************************************
//                                Constants
// ***************************************************************************
// Substituted when the caller doesn't supply a name.
pub const DEFAULT_NAME: &str = "World";

// Route and query parameter, which must match the oai attribute below.
pub const GREETING_PATH: &str = "/hello";
pub const NAME_PARAM: &str = "name";

// ***************************************************************************
//                          Request/Response Definiions
// ***************************************************************************
pub struct HelloApi;

struct ReqHello
{
    name: Option<String>,
}

// Implement the debug record trait for logging.
impl RequestDebug for ReqHello {
    fn get_request_info(&self) -> String {
        let mut s = String::with_capacity(64);
        s.push_str("  Request parameters:");
        s.push_str("\n    name: ");
        match &self.name {
            Some(name) => s.push_str(&format!("{:?}", name)),
            None => s.push_str("<absent>"),
        }
        s
    }
}

// ***************************************************************************
//                             OpenAPI Endpoint
// ***************************************************************************
#[OpenApi]
impl HelloApi {
    /// Greet the caller by name, or the world when no name is given.
    #[oai(path = "/hello", method = "get")]
    async fn greeting(&self, http_req: &Request, name: Query<Option<String>>) -> PlainText<String> {
        let req = ReqHello {name: name.0};

        // Conditional logging depending on log level.
        nms_utils::debug_request(http_req, &req);

        PlainText(greeting_text(req.name.as_deref()))
    }
}

// ***************************************************************************
//                          Public Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// greeting_text:
// ---------------------------------------------------------------------------
/** Compose the greeting.  An empty name is treated the same as an absent one;
 * any other value is substituted verbatim.
 */
pub fn greeting_text(name: Option<&str>) -> String {
    let name = match name {
        Some(n) if !n.is_empty() => n,
        _ => DEFAULT_NAME,
    };
    format!("Hello {}", name)
}
