//! End-to-end tests for the `oai-harvester` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OAI: &str = "http://www.openarchives.org/OAI/2.0/";

#[test]
fn test_help_lists_subcommands() {
    let mut cmd = Command::cargo_bin("oai-harvester").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("identifiers"))
        .stdout(predicate::str::contains("records"))
        .stdout(predicate::str::contains("collection"));
}

#[test]
fn test_invalid_datestamp_fails_without_network() {
    let mut cmd = Command::cargo_bin("oai-harvester").unwrap();
    cmd.args(["identifiers", "http://127.0.0.1:9/oai", "--from", "yesterday"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid datestamp: 'yesterday'"));
}

#[test]
fn test_malformed_namespace_is_rejected() {
    let mut cmd = Command::cargo_bin("oai-harvester").unwrap();
    cmd.args(["identifiers", "http://127.0.0.1:9/oai", "--namespace", "dc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("PREFIX=URI"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_identifiers_and_records_commands() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/oai"))
        .and(query_param("verb", "ListIdentifiers"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<OAI-PMH xmlns="{OAI}"><ListIdentifiers><header><identifier>oai:x:1</identifier></header><header><identifier>oai:x:2</identifier></header></ListIdentifiers></OAI-PMH>"#
        )))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/oai"))
        .and(query_param("verb", "ListRecords"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<OAI-PMH xmlns="{OAI}"><ListRecords><record><header><identifier>oai:x:1</identifier></header></record><record><header><identifier>oai:x:2</identifier></header></record></ListRecords></OAI-PMH>"#
        )))
        .mount(&server)
        .await;

    let url = format!("{}/oai", server.uri());
    let output = tempfile::tempdir().unwrap();
    let dir = output.path().to_path_buf();

    tokio::task::spawn_blocking(move || {
        Command::cargo_bin("oai-harvester")
            .unwrap()
            .args(["identifiers", &url])
            .assert()
            .success()
            .stdout("oai:x:1\noai:x:2\n");

        Command::cargo_bin("oai-harvester")
            .unwrap()
            .args(["records", &url, "--output"])
            .arg(&dir)
            .assert()
            .success()
            .stdout(predicate::str::contains("2 records"));
    })
    .await
    .unwrap();

    assert!(output.path().join("oai_x_1.xml").exists());
    assert!(output.path().join("oai_x_2.xml").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_records_command_fails_on_unwritable_output() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/oai"))
        .and(query_param("verb", "ListRecords"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<OAI-PMH xmlns="{OAI}"><ListRecords><record><header><identifier>oai:x:1</identifier></header></record></ListRecords></OAI-PMH>"#
        )))
        .mount(&server)
        .await;

    let url = format!("{}/oai", server.uri());
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("taken");
    std::fs::write(&output, "not a directory").unwrap();

    tokio::task::spawn_blocking(move || {
        Command::cargo_bin("oai-harvester")
            .unwrap()
            .args(["records", &url, "--output"])
            .arg(&output)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"))
            .stdout(predicate::str::contains("Saved").not());
    })
    .await
    .unwrap();
}
