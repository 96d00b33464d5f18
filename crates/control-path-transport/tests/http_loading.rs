// crates/control-path-transport/tests/http_loading.rs
// ============================================================================
// Module: HTTP Loading Tests
// Description: Redirects, conditional GET, limits, and failure modes.
// Purpose: Pin the manual redirect and bounded-read behavior.
// Dependencies: control-path-transport, tiny_http
// ============================================================================

//! HTTP fetch tests against a local single-purpose server.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::thread;
use std::time::Duration;

use control_path_transport::FetchOutcome;
use control_path_transport::FetchRequest;
use control_path_transport::TransportError;
use control_path_transport::fetch_url;
use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;

/// Starts a server and returns its base URL.
fn spawn<F>(handler: F) -> String
where
    F: FnMut(tiny_http::Request) + Send + 'static,
{
    let server = Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    let mut handler = handler;
    thread::spawn(move || {
        for request in server.incoming_requests() {
            handler(request);
        }
    });
    format!("http://127.0.0.1:{port}")
}

/// Request with test defaults against the given URL.
fn request(url: &str) -> FetchRequest<'_> {
    FetchRequest {
        url,
        timeout: Duration::from_secs(5),
        max_bytes: 1024,
        etag: None,
        expected_content_types: &[],
    }
}

fn location_header(target: &str) -> Header {
    Header::from_bytes(&b"Location"[..], target.as_bytes()).unwrap()
}

#[test]
fn plain_fetch_returns_bytes_and_etag() {
    let base = spawn(|req| {
        let response = Response::from_data(b"artifact-bytes".to_vec())
            .with_header(Header::from_bytes(&b"ETag"[..], &b"\"v1\""[..]).unwrap());
        req.respond(response).ok();
    });
    let url = format!("{base}/artifact");
    let outcome = fetch_url(&request(&url)).unwrap();
    let FetchOutcome::Fetched(payload) = outcome else {
        panic!("expected fetched payload");
    };
    assert_eq!(payload.bytes, b"artifact-bytes");
    assert_eq!(payload.etag.as_deref(), Some("\"v1\""));
}

#[test]
fn five_redirects_are_followed() {
    let base = spawn(|req| {
        let path = req.url().to_string();
        let hop: u32 = path.trim_start_matches("/r").parse().unwrap_or(0);
        if hop < 5 {
            let next = format!("/r{}", hop + 1);
            let response =
                Response::from_data(Vec::new()).with_status_code(302).with_header(location_header(&next));
            req.respond(response).ok();
        } else {
            req.respond(Response::from_data(b"made-it".to_vec())).ok();
        }
    });
    let url = format!("{base}/r0");
    let FetchOutcome::Fetched(payload) = fetch_url(&request(&url)).unwrap() else {
        panic!("expected fetched payload");
    };
    assert_eq!(payload.bytes, b"made-it");
}

#[test]
fn six_redirects_exceed_the_cap() {
    let base = spawn(|req| {
        let response = Response::from_data(Vec::new())
            .with_status_code(302)
            .with_header(location_header("/again"));
        req.respond(response).ok();
    });
    let url = format!("{base}/start");
    let err = fetch_url(&request(&url)).unwrap_err();
    assert!(matches!(err, TransportError::TooManyRedirects(5)));
}

#[test]
fn redirect_without_location_fails() {
    let base = spawn(|req| {
        req.respond(Response::from_data(Vec::new()).with_status_code(302)).ok();
    });
    let url = format!("{base}/broken");
    let err = fetch_url(&request(&url)).unwrap_err();
    assert!(matches!(err, TransportError::Failed(message) if message.contains("Location")));
}

#[test]
fn non_success_status_fails() {
    let base = spawn(|req| {
        req.respond(Response::from_data(b"gone".to_vec()).with_status_code(404)).ok();
    });
    let url = format!("{base}/missing");
    let err = fetch_url(&request(&url)).unwrap_err();
    assert!(matches!(err, TransportError::Failed(message) if message.contains("404")));
}

#[test]
fn oversized_bodies_are_rejected() {
    let base = spawn(|req| {
        req.respond(Response::from_data(vec![0_u8; 2048])).ok();
    });
    let url = format!("{base}/big");
    let err = fetch_url(&request(&url)).unwrap_err();
    assert!(matches!(err, TransportError::Failed(message) if message.contains("1024")));
}

#[test]
fn not_modified_is_reported_when_an_etag_rides_along() {
    let base = spawn(|req| {
        let revalidated = req
            .headers()
            .iter()
            .any(|header| header.field.equiv("If-None-Match"));
        if revalidated {
            req.respond(Response::from_data(Vec::new()).with_status_code(304)).ok();
        } else {
            req.respond(Response::from_data(b"fresh".to_vec())).ok();
        }
    });
    let url = format!("{base}/doc");
    let mut conditional = request(&url);
    conditional.etag = Some("\"v1\"");
    assert_eq!(fetch_url(&conditional).unwrap(), FetchOutcome::NotModified);
    // Without an ETag the same endpoint serves bytes.
    let FetchOutcome::Fetched(payload) = fetch_url(&request(&url)).unwrap() else {
        panic!("expected fetched payload");
    };
    assert_eq!(payload.bytes, b"fresh");
}

#[test]
fn unexpected_content_types_are_tolerated() {
    let base = spawn(|req| {
        let response = Response::from_data(b"bytes".to_vec())
            .with_header(Header::from_bytes(&b"Content-Type"[..], &b"text/html"[..]).unwrap());
        req.respond(response).ok();
    });
    let url = format!("{base}/artifact");
    let mut checked = request(&url);
    checked.expected_content_types = &["application/octet-stream", "application/x-msgpack"];
    assert!(fetch_url(&checked).is_ok());
}

#[test]
fn unsupported_schemes_fail_before_any_request() {
    let err = fetch_url(&request("ftp://example.com/artifact")).unwrap_err();
    assert!(matches!(err, TransportError::Failed(message) if message.contains("scheme")));
}

#[test]
fn slow_responses_time_out() {
    let base = spawn(|req| {
        thread::sleep(Duration::from_secs(3));
        req.respond(Response::from_data(b"late".to_vec())).ok();
    });
    let url = format!("{base}/slow");
    let mut impatient = request(&url);
    impatient.timeout = Duration::from_millis(250);
    let err = fetch_url(&impatient).unwrap_err();
    assert!(matches!(err, TransportError::Timeout(_)));
}
