#![forbid(unsafe_code)]

use poem_openapi::{ OpenApi, payload::Json, Object };

use crate::endpoints::hello::{DEFAULT_NAME, GREETING_PATH, NAME_PARAM};

// ***************************************************************************
//                          Request/Response Definiions
// ***************************************************************************
pub struct InfoApi;

/// What this server greets with and the build it came from.
#[derive(Object, Debug, PartialEq)]
struct RespInfo
{
    server: String,
    version: String,
    greeting_path: String,
    name_param: String,
    default_name: String,
    build_commit: String,
}

// ***************************************************************************
//                             OpenAPI Endpoint
// ***************************************************************************
#[OpenApi]
impl InfoApi {
    /// Describe the greeting route and the running build.
    #[oai(path = "/info", method = "get")]
    async fn get_info(&self) -> Json<RespInfo> {
        Json(RespInfo::current())
    }
}

// ***************************************************************************
//                          Request/Response Methods
// ***************************************************************************
impl RespInfo {
    fn current() -> Self {
        Self {
            server: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            greeting_path: GREETING_PATH.to_string(),
            name_param: NAME_PARAM.to_string(),
            default_name: DEFAULT_NAME.to_string(),
            build_commit: build_commit(env!("GIT_COMMIT_SHORT"), env!("GIT_DIRTY")),
        }
    }
}

// ---------------------------------------------------------------------------
// build_commit:
// ---------------------------------------------------------------------------
/** Short commit id, marked when the working tree had local changes. */
fn build_commit(commit: &str, dirty: &str) -> String {
    if dirty == "true" {
        format!("{}-dirty", commit)
    } else {
        commit.to_string()
    }
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use super::*;
    use poem::test::TestClient;
    use poem::Route;
    use poem_openapi::OpenApiService;

    use crate::endpoints::hello::HelloApi;

    #[test]
    fn dirty_builds_are_marked() {
        assert_eq!(build_commit("1a2b3c4", "true"), "1a2b3c4-dirty");
        assert_eq!(build_commit("1a2b3c4", "false"), "1a2b3c4");
        assert_eq!(build_commit("unknown", "unknown"), "unknown");
    }

    #[tokio::test]
    async fn info_describes_greeting() {
        let api_service = OpenApiService::new((HelloApi, InfoApi), "Info", "1.0");
        let cli = TestClient::new(Route::new().nest("/", api_service));

        let resp = cli.get("/info").send().await;
        resp.assert_status_is_ok();
        let json = resp.json().await;
        json.value().object().get("server").assert_string("nms_server");
        json.value().object().get("greeting_path").assert_string("/hello");
        json.value().object().get("name_param").assert_string("name");
        json.value().object().get("default_name").assert_string("World");

        // The advertised route answers with the advertised default.
        let path = json.value().object().get("greeting_path").string().to_string();
        let resp = cli.get(path).send().await;
        resp.assert_status_is_ok();
        resp.assert_text(format!("Hello {}", DEFAULT_NAME)).await;
    }
}
