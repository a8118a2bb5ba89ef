//! The three harvesting verbs against a mock OAI server.

use std::time::Duration;

use oai_harvester::endpoint::Endpoint;
use oai_harvester::pacing::RecordingSleeper;
use oai_harvester::{EndpointConfig, HarvestOptions, Harvester, Namespaces};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OAI: &str = "http://www.openarchives.org/OAI/2.0/";
const UNTL: &str = "http://digital2.library.unt.edu/untl/";

fn oai_page(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="{OAI}"><responseDate>2025-01-01T00:00:00Z</responseDate>{body}</OAI-PMH>"#
    )
}

fn record(id: &str, title: &str) -> String {
    format!(
        r#"<record><header><identifier>{id}</identifier><datestamp>2025-01-01</datestamp></header><metadata><untl:metadata xmlns:untl="{UNTL}"><untl:title>{title}</untl:title></untl:metadata></metadata></record>"#
    )
}

fn harvester(base_url: &str, options: &HarvestOptions) -> Harvester {
    let namespaces = Namespaces::new().with("untl", UNTL);
    let endpoint = Endpoint::with_sleeper(
        &format!("{base_url}/oai"),
        namespaces,
        EndpointConfig::default().with_recovery_wait(Duration::from_secs(1)),
        RecordingSleeper::new(),
    )
    .unwrap();
    Harvester::from_endpoint(endpoint, options).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_ids_sends_options() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/oai"))
        .and(query_param("verb", "ListIdentifiers"))
        .and(query_param("metadataPrefix", "untl_raw"))
        .and(query_param("set", "access_rights:public"))
        .and(query_param("from", "2024-01-01"))
        .and(query_param_is_missing("until"))
        .respond_with(ResponseTemplate::new(200).set_body_string(oai_page(
            "<ListIdentifiers>\
             <header><identifier>ark:/67531/metadc1</identifier></header>\
             <header><identifier>ark:/67531/metadc2</identifier></header>\
             </ListIdentifiers>",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let options = HarvestOptions::default()
        .with_metadata_prefix("untl_raw")
        .with_set("access_rights:public")
        .with_from("2024-01-01");
    let base_url = server.uri();
    let ids = tokio::task::spawn_blocking(move || harvester(&base_url, &options).get_ids())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(ids, vec!["ark:/67531/metadc1", "ark:/67531/metadc2"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_records_across_pages() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/oai"))
        .and(query_param("verb", "ListRecords"))
        .and(query_param("metadataPrefix", "oai_dc"))
        .respond_with(ResponseTemplate::new(200).set_body_string(oai_page(&format!(
            "<ListRecords>{}<resumptionToken>page2</resumptionToken></ListRecords>",
            record("id1", "First")
        ))))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/oai"))
        .and(query_param("verb", "ListRecords"))
        .and(query_param("resumptionToken", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(oai_page(&format!(
            "<ListRecords>{}{}<resumptionToken></resumptionToken></ListRecords>",
            record("id2", "Second"),
            record("id3", "Third")
        ))))
        .expect(1)
        .mount(&server)
        .await;

    let base_url = server.uri();
    let titles = tokio::task::spawn_blocking(move || {
        let records = harvester(&base_url, &HarvestOptions::default()).list_records()?;
        records
            .iter()
            .map(|r| {
                Ok(r.find_first_by_tag("untl:title", None)?
                    .and_then(|t| t.text().map(str::to_owned))
                    .unwrap_or_default())
            })
            .collect::<oai_harvester::Result<Vec<String>>>()
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(titles, vec!["First", "Second", "Third"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_record_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/oai"))
        .and(query_param("verb", "GetRecord"))
        .and(query_param("metadataPrefix", "untl_raw"))
        .and(query_param("identifier", "ark:/67531/metadc9"))
        .respond_with(ResponseTemplate::new(200).set_body_string(oai_page(&format!(
            "<GetRecord>{}</GetRecord>",
            record("ark:/67531/metadc9", "Ninth")
        ))))
        .expect(1)
        .mount(&server)
        .await;

    let options = HarvestOptions::default().with_metadata_prefix("untl_raw");
    let base_url = server.uri();
    let found = tokio::task::spawn_blocking(move || {
        harvester(&base_url, &options).get_record("ark:/67531/metadc9")
    })
    .await
    .unwrap()
    .unwrap()
    .unwrap();

    assert_eq!(found.tag().local_name(), "record");
    let id = found.find_first_by_tag("oai:identifier", None).unwrap().unwrap();
    assert_eq!(id.text(), Some("ark:/67531/metadc9"));
    assert!(found
        .find_first_by_tag("untl:title", Some("Ninth"))
        .unwrap()
        .is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_record_missing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/oai"))
        .and(query_param("verb", "GetRecord"))
        .respond_with(ResponseTemplate::new(200).set_body_string(oai_page("<GetRecord/>")))
        .mount(&server)
        .await;

    let base_url = server.uri();
    let found = tokio::task::spawn_blocking(move || {
        harvester(&base_url, &HarvestOptions::default()).get_record("nothing")
    })
    .await
    .unwrap()
    .unwrap();

    assert!(found.is_none());
}

#[test]
fn test_invalid_options_fail_before_any_request() {
    let options = HarvestOptions::default()
        .with_from("2025-02-01")
        .with_until("2025-01-01");
    let err = Harvester::new("http://127.0.0.1:9/oai", &options, Namespaces::new()).unwrap_err();
    assert!(matches!(
        err,
        oai_harvester::HarvesterError::InvalidDateRange { .. }
    ));
}
