//! End-to-end tests for the gateway pipeline.

use fetch_gateway::config::{EngineKind, GatewayConfig};
use serde_json::json;

mod common;

fn plain_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.engine.default = EngineKind::Plain;
    config
}

#[tokio::test]
async fn test_options_preflight_bypasses_auth() {
    let mut config = plain_config();
    config.auth.secret = Some("secret123".into());
    let (addr, shutdown) = common::spawn_gateway(config).await;

    // No token anywhere, yet the preflight succeeds.
    let res = common::test_client()
        .request(reqwest::Method::OPTIONS, format!("http://{addr}/proxy"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 204);
    assert!(res.headers().contains_key("access-control-allow-methods"));
    assert_eq!(res.headers().get("access-control-allow-origin").unwrap(), "*");

    shutdown.trigger();
}

#[tokio::test]
async fn test_missing_url_is_400() {
    let (addr, shutdown) = common::spawn_gateway(plain_config()).await;

    let res = common::test_client()
        .get(format!("http://{addr}/proxy"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 400);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(
        body["error"],
        r#"A valid "url" parameter starting with http(s) is required."#
    );

    shutdown.trigger();
}

#[tokio::test]
async fn test_invalid_token_is_401_regardless_of_url() {
    let mut config = plain_config();
    config.auth.secret = Some("secret123".into());
    let (addr, shutdown) = common::spawn_gateway(config).await;

    // The url is invalid too; auth must still decide first.
    let res = common::test_client()
        .get(format!("http://{addr}/proxy?url=not-a-url"))
        .header("x-proxy-token", "wrong")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 401);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Unauthorized. Invalid or missing token.");

    shutdown.trigger();
}

#[tokio::test]
async fn test_post_json_payload_proxied() {
    let upstream = common::start_mock_upstream(
        common::MockResponse::new(200, r#"{"hello":"world"}"#)
            .header("Content-Type", "application/json"),
    )
    .await;

    let mut config = plain_config();
    config.auth.secret = Some("secret123".into());
    let (addr, shutdown) = common::spawn_gateway(config).await;

    let res = common::test_client()
        .post(format!("http://{addr}/proxy"))
        .json(&json!({
            "url": format!("http://{upstream}/a.json"),
            "method": "GET",
            "token": "secret123"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(
        res.headers().get("content-type").unwrap(),
        "application/json"
    );
    assert_eq!(res.text().await.unwrap(), r#"{"hello":"world"}"#);

    shutdown.trigger();
}

#[tokio::test]
async fn test_png_round_trip_buffered() {
    let png: Vec<u8> = vec![0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0xff, 0x10];
    let upstream = common::start_mock_upstream(
        common::MockResponse::new(200, png.clone()).header("Content-Type", "image/png"),
    )
    .await;

    let mut config = plain_config();
    config.relay.streaming = false;
    let (addr, shutdown) = common::spawn_gateway(config).await;

    let res = common::test_client()
        .get(format!("http://{addr}/proxy?url=http://{upstream}/img.png"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers().get("content-type").unwrap(), "image/png");
    assert!(res.headers().get("content-encoding").is_none());
    assert_eq!(res.bytes().await.unwrap().as_ref(), png.as_slice());

    shutdown.trigger();
}

#[tokio::test]
async fn test_streamed_matches_buffered() {
    let body: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
    let upstream = common::start_mock_upstream(
        common::MockResponse::new(200, body.clone())
            .header("Content-Type", "application/octet-stream"),
    )
    .await;
    let target = format!("http://{upstream}/blob.bin");

    let mut streamed_config = plain_config();
    streamed_config.relay.streaming = true;
    let (streamed_addr, s1) = common::spawn_gateway(streamed_config).await;

    let mut buffered_config = plain_config();
    buffered_config.relay.streaming = false;
    let (buffered_addr, s2) = common::spawn_gateway(buffered_config).await;

    let client = common::test_client();
    let streamed = client
        .get(format!("http://{streamed_addr}/proxy?url={target}"))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let buffered = client
        .get(format!("http://{buffered_addr}/proxy?url={target}"))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();

    assert_eq!(streamed.as_ref(), body.as_slice());
    assert_eq!(streamed, buffered);

    s1.trigger();
    s2.trigger();
}

#[tokio::test]
async fn test_range_response_passthrough() {
    let upstream = common::start_mock_upstream(
        common::MockResponse::new(206, vec![1u8; 100])
            .header("Content-Type", "video/mp4")
            .header("Content-Range", "bytes 0-99/100000")
            .header("Accept-Ranges", "bytes"),
    )
    .await;

    let (addr, shutdown) = common::spawn_gateway(plain_config()).await;

    let res = common::test_client()
        .get(format!("http://{addr}/proxy?url=http://{upstream}/clip.mp4"))
        .header("range", "bytes=0-99")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 206);
    assert_eq!(
        res.headers().get("content-range").unwrap(),
        "bytes 0-99/100000"
    );
    assert_eq!(res.headers().get("accept-ranges").unwrap(), "bytes");

    shutdown.trigger();
}

#[tokio::test]
async fn test_upstream_error_status_passthrough() {
    let upstream =
        common::start_mock_upstream(common::MockResponse::new(404, "not here")).await;
    let (addr, shutdown) = common::spawn_gateway(plain_config()).await;

    // Upstream 404 is not a gateway error: status and body pass through.
    let res = common::test_client()
        .get(format!("http://{addr}/proxy?url=http://{upstream}/missing"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 404);
    assert_eq!(res.text().await.unwrap(), "not here");

    shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_upstream_is_502() {
    let (addr, shutdown) = common::spawn_gateway(plain_config()).await;

    let res = common::test_client()
        .get(format!("http://{addr}/proxy?url=http://127.0.0.1:1/whatever"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 502);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Proxy request failed.");
    assert!(body["details"].is_string());

    shutdown.trigger();
}

#[tokio::test]
async fn test_stalled_upstream_is_408() {
    let upstream = common::start_stalling_upstream().await;

    let mut config = plain_config();
    config.engine.timeout_secs = 1;
    let (addr, shutdown) = common::spawn_gateway(config).await;

    let res = common::test_client()
        .get(format!("http://{addr}/proxy?url=http://{upstream}/slow"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 408);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Request timed out.");

    shutdown.trigger();
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let mut config = plain_config();
    config.listener.max_body_bytes = 512;
    let (addr, shutdown) = common::spawn_gateway(config).await;

    let res = common::test_client()
        .post(format!("http://{addr}/proxy"))
        .json(&json!({
            "url": "https://example.com",
            "body": "x".repeat(4096)
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 413);

    shutdown.trigger();
}

#[tokio::test]
async fn test_request_id_on_responses() {
    let (addr, shutdown) = common::spawn_gateway(plain_config()).await;
    let client = common::test_client();

    // Generated when the caller doesn't supply one.
    let res = client
        .get(format!("http://{addr}/proxy"))
        .send()
        .await
        .unwrap();
    assert!(res.headers().contains_key("x-request-id"));

    // Echoed back when the caller does.
    let res = client
        .get(format!("http://{addr}/proxy"))
        .header("x-request-id", "caller-supplied-id")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers().get("x-request-id").unwrap(), "caller-supplied-id");

    shutdown.trigger();
}

#[tokio::test]
async fn test_disallowed_method_is_405() {
    let (addr, shutdown) = common::spawn_gateway(plain_config()).await;

    let res = common::test_client()
        .post(format!("http://{addr}/proxy"))
        .json(&json!({"url": "https://example.com", "method": "DELETE"}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 405);

    shutdown.trigger();
}

#[tokio::test]
async fn test_v1_flag_selects_plain_engine() {
    let upstream =
        common::start_mock_upstream(common::MockResponse::new(200, "light")).await;

    // Default engine is the browser renderer, which has no devtools endpoint
    // in tests; only the v1 path can succeed. That proves selection.
    let mut config = GatewayConfig::default();
    config.engine.default = EngineKind::Browser;
    config.engine.browser.devtools_url = "http://127.0.0.1:1".into();
    let (addr, shutdown) = common::spawn_gateway(config).await;

    let client = common::test_client();
    let target = format!("http://{upstream}/page");

    let via_v1 = client
        .get(format!("http://{addr}/proxy?url={target}"))
        .header("x-proxy-version", "v1")
        .send()
        .await
        .unwrap();
    assert_eq!(via_v1.status(), 200);
    assert_eq!(via_v1.text().await.unwrap(), "light");

    let default_engine = client
        .get(format!("http://{addr}/proxy?url={target}"))
        .send()
        .await
        .unwrap();
    assert_eq!(default_engine.status(), 502);

    shutdown.trigger();
}

#[tokio::test]
async fn test_dynamic_cors_policy_end_to_end() {
    let mut config = plain_config();
    config.cors.allowed_origins = vec!["https://app.example.com".into(), ".trusted.net".into()];
    let (addr, shutdown) = common::spawn_gateway(config).await;

    let client = common::test_client();

    let trusted = client
        .request(reqwest::Method::OPTIONS, format!("http://{addr}/proxy"))
        .header("origin", "https://sub.trusted.net")
        .send()
        .await
        .unwrap();
    assert_eq!(
        trusted.headers().get("access-control-allow-origin").unwrap(),
        "https://sub.trusted.net"
    );
    assert_eq!(trusted.headers().get("vary").unwrap(), "Origin");

    let untrusted = client
        .request(reqwest::Method::OPTIONS, format!("http://{addr}/proxy"))
        .header("origin", "https://evil.example")
        .send()
        .await
        .unwrap();
    assert_eq!(untrusted.status(), 204);
    assert!(untrusted
        .headers()
        .get("access-control-allow-origin")
        .is_none());

    shutdown.trigger();
}

#[tokio::test]
async fn test_token_in_query_accepted() {
    let upstream = common::start_mock_upstream(common::MockResponse::new(200, "ok")).await;

    let mut config = plain_config();
    config.auth.secret = Some("secret123".into());
    let (addr, shutdown) = common::spawn_gateway(config).await;

    let res = common::test_client()
        .get(format!(
            "http://{addr}/proxy?url=http://{upstream}/&token=secret123"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    shutdown.trigger();
}
