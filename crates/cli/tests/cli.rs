// ABOUTME: Smoke tests for the trawler binary: decode, fetch and indexers subcommands.
// ABOUTME: Network commands run against local mock servers.

use std::io::Write;

use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::prelude::*;
use serde_json::Value;

const FEED: &str = r#"<rss version="2.0" xmlns:torznab="http://torznab.com/schemas/2015/feed"><channel>
  <item><title>a</title><guid>1</guid><torznab:attr name="category" value="5040"/></item>
  <item><title>b</title><guid>2</guid><torznab:attr name="category" value="5040"/></item>
  <item><title>c</title><guid>3</guid><torznab:attr name="category" value="5040"/></item>
</channel></rss>"#;

fn trawler() -> Command {
    let mut cmd = Command::cargo_bin("trawler").unwrap();
    cmd.env_remove("TRAWLER_API_KEY").env_remove("RUST_LOG");
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn decode_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FEED.as_bytes()).unwrap();

    let output = trawler()
        .args(["decode", file.path().to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    let items = json.as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["category_id"], 5040);
    assert_eq!(items[2]["title"], "c");
}

#[test]
fn decode_stdin_compact() {
    trawler()
        .args(["decode", "-", "--compact"])
        .write_stdin(FEED)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[{\"guid\":\"1\""));
}

#[test]
fn decode_rejects_dtd() {
    trawler()
        .args(["decode", "-"])
        .write_stdin(r#"<!DOCTYPE rss [<!ENTITY x "y">]><rss/>"#)
        .assert()
        .failure()
        .stderr(predicate::str::contains("DTD"));
}

#[test]
fn decode_missing_file() {
    trawler()
        .args(["decode", "/nonexistent/feed.xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("file not found"));
}

#[test]
fn fetch_with_env_api_key() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/api").query_param("apikey", "from-env");
        then.status(200).body(FEED);
    });

    let output = trawler()
        .env("TRAWLER_API_KEY", "from-env")
        .args(["fetch", &server.url("/api"), "--allow-private-networks"])
        .output()
        .unwrap();

    mock.assert();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output).as_array().unwrap().len(), 3);
}

#[test]
fn fetch_header_auth() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/api").header("x-api-key", "k");
        then.status(200).body(FEED);
    });

    trawler()
        .args([
            "fetch",
            &server.url("/api"),
            "--api-key",
            "k",
            "--auth-mode",
            "header",
            "--allow-private-networks",
        ])
        .assert()
        .success();
    mock.assert();
}

#[test]
fn fetch_loopback_is_blocked() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/api");
        then.status(200).body(FEED);
    });

    trawler()
        .args(["fetch", &server.url("/api")])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "request blocked: target host 127.0.0.1 resolves to a restricted address",
        ));
    assert_eq!(mock.calls(), 0);
}

#[test]
fn indexers_lists_proxy_feeds() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/v2.0/indexers").query_param("apikey", "k");
        then.status(200)
            .body(r#"[{"id":"nyaa","name":"Nyaa","configured":true},{"id":"off","configured":false}]"#);
    });

    let output = trawler()
        .args([
            "indexers",
            &server.base_url(),
            "--api-key",
            "k",
            "--allow-private-networks",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    let indexers = json.as_array().unwrap();
    assert_eq!(indexers.len(), 1);
    assert_eq!(indexers[0]["id"], "nyaa");
    assert_eq!(indexers[0]["display_name"], "Nyaa");
}

#[test]
fn indexers_requires_api_key() {
    trawler()
        .args(["indexers", "http://proxy.example"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--api-key"));
}
