use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

/// Set `MODEL_FETCH_REQUIRE_SOCKET_TESTS=1` in CI to turn a silent skip into a failure.
#[must_use]
pub fn socket_tests_required() -> bool {
    std::env::var("MODEL_FETCH_REQUIRE_SOCKET_TESTS")
        .ok()
        .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

#[track_caller]
#[must_use]
pub fn should_skip_socket_bound_test() -> bool {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return false;
    }

    let location = Location::caller();
    let message = format!(
        "[socket-bound-test] cannot bind a localhost socket at {}:{}",
        location.file(),
        location.line()
    );
    assert!(
        !socket_tests_required(),
        "{message}; unset MODEL_FETCH_REQUIRE_SOCKET_TESTS to allow skipping"
    );

    eprintln!("{message}; skipping");
    true
}

pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if should_skip_socket_bound_test() {
        None
    } else {
        Some(MockServer::start().await)
    }
}
