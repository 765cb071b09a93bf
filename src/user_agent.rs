//! User-Agent sent with every transfer request.

/// Project URL advertised in the User-Agent.
const PROJECT_UA_URL: &str = "https://github.com/fierce/model-fetch";

/// `model-fetch/<version> (+<project url>)`.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("model-fetch/{version} (+{PROJECT_UA_URL})")
}
