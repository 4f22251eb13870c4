//! `test-utils` is used for testing `netgate-lib`.
//! This crate does not depend on `netgate-lib`, else we would get dependency cycles.
//! Macros are used instead, so that the importer is responsible for providing the dependencies
//! (`wiremock` and `serde_json`).

/// Create a mock JSON DNS API server that answers queries for `$hostname`
/// with a single A record pointing to `$address`.
///
/// Requests for other names, record types or without the
/// `Accept: application/dns-json` header get a 404.
#[macro_export]
macro_rules! mock_dns_json_server {
    ($hostname:expr, $address:expr $(,)?) => {{
        let mock_server = wiremock::MockServer::start().await;
        let body = serde_json::json!({
            "Status": 0,
            "Answer": [
                { "name": $hostname, "type": 1, "TTL": 300, "data": $address }
            ]
        });
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/dns-query"))
            .and(wiremock::matchers::query_param("name", $hostname))
            .and(wiremock::matchers::query_param("type", "A"))
            .and(wiremock::matchers::header("accept", "application/dns-json"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(body))
            .mount(&mock_server)
            .await;
        mock_server
    }};
}

/// Create a mock JSON DNS API server whose answer has no A record
/// (NXDOMAIN style response).
#[macro_export]
macro_rules! mock_empty_dns_json_server {
    () => {{
        let mock_server = wiremock::MockServer::start().await;
        let body = serde_json::json!({ "Status": 3 });
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(body))
            .mount(&mock_server)
            .await;
        mock_server
    }};
}

/// Create a mock web server, which responds with a predefined status to
/// every GET request. `expect` limits and verifies the number of calls.
#[macro_export]
macro_rules! mock_failing_server {
    ($status:expr $(, expect = $expected:expr)? $(,)?) => {{
        let mock_server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new($status))
            $(.expect($expected))?
            .mount(&mock_server)
            .await;
        mock_server
    }};
}

/// Get the root path of the project.
#[macro_export]
macro_rules! root_path {
    () => {
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .unwrap()
            .to_path_buf()
    };
}

/// Get the path to the `fixtures` directory.
#[macro_export]
macro_rules! fixtures_path {
    () => {
        $crate::root_path!().join("fixtures")
    };
}
