//! Incremental-diff synchronization tests against a mock distribution
//! server.

use std::sync::Arc;

use serde_json::json;

use certkit_core::http_request::Request;
use certkit_core::rules::local::LocalStore;
use certkit_core::rules::remote::{RulesRemoteDataSource, ValueSetsRemoteDataSource};
use certkit_core::rules::sync::{RulesRepository, ValueSetsRepository};
use certkit_core::rules::{CovRule, RuleCertificateType, RuleType, ValueSet};
use certkit_core::storage::{InMemoryStore, UpdateStore};

fn local_rule(identifier: &str, hash: &str) -> CovRule {
    CovRule {
        identifier: identifier.to_string(),
        rule_type: RuleType::Acceptance,
        country: "DE".to_string(),
        region: None,
        version: "1.0.0".to_string(),
        schema_version: "1.0.0".to_string(),
        engine: "CERTLOGIC".to_string(),
        engine_version: "0.7.5".to_string(),
        certificate_type: RuleCertificateType::General,
        descriptions: Vec::new(),
        valid_from: "2021-07-01T00:00:00Z".parse().unwrap(),
        valid_to: "2030-06-01T00:00:00Z".parse().unwrap(),
        affected_fields: Vec::new(),
        logic: json!({"and": []}),
        hash: hash.to_string(),
    }
}

fn rule_body(identifier: &str) -> serde_json::Value {
    json!({
        "Identifier": identifier,
        "Type": "Acceptance",
        "Country": "DE",
        "Version": "1.0.0",
        "SchemaVersion": "1.0.0",
        "Engine": "CERTLOGIC",
        "EngineVersion": "0.7.5",
        "CertificateType": "General",
        "Description": [{"lang": "en", "desc": "rule"}],
        "ValidFrom": "2021-07-01T00:00:00Z",
        "ValidTo": "2030-06-01T00:00:00Z",
        "AffectedFields": [],
        "Logic": {"and": []}
    })
}

fn manifest_entry(identifier: &str, hash: &str) -> serde_json::Value {
    json!({
        "identifier": identifier,
        "version": "1.0.0",
        "country": "DE",
        "hash": hash
    })
}

async fn rules_repository(
    server_url: &str,
    seeded: Vec<CovRule>,
) -> (RulesRepository, Arc<UpdateStore>) {
    let backend: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
    let local = Arc::new(LocalStore::new("rules", backend.clone()));
    local.replace_all(seeded).await.expect("seed");
    let updates = Arc::new(UpdateStore::new(backend));
    let repository = RulesRepository::new(
        Arc::new(RulesRemoteDataSource::new(
            Arc::new(Request::new()),
            server_url,
        )),
        local,
        updates.clone(),
    );
    (repository, updates)
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_fetches_only_added_and_changed_rules() {
    let mut server = mockito::Server::new_async().await;
    let manifest = server
        .mock("GET", "/rules")
        .with_header("content-type", "application/json")
        .with_body(
            json!([manifest_entry("A", "h1"), manifest_entry("B", "h2")]).to_string(),
        )
        .create_async()
        .await;
    // Only B is fetched: A is unchanged, C is removed.
    let body_b = server
        .mock("GET", "/rules/de/h2")
        .with_header("content-type", "application/json")
        .with_body(rule_body("B").to_string())
        .expect(1)
        .create_async()
        .await;

    let (repository, updates) = rules_repository(
        &server.url(),
        vec![local_rule("A", "h1"), local_rule("C", "h3")],
    )
    .await;
    repository.load_rules().await.expect("sync");

    manifest.assert_async().await;
    body_b.assert_async().await;

    let mut identifiers: Vec<String> = repository
        .all_rules()
        .await
        .into_iter()
        .map(|rule| rule.identifier)
        .collect();
    identifiers.sort_unstable();
    assert_eq!(identifiers, vec!["A", "B"]);
    assert!(updates
        .last_updated(UpdateStore::RULES)
        .expect("timestamps")
        .is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn changed_hash_refetches_the_rule_body() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/rules")
        .with_header("content-type", "application/json")
        .with_body(json!([manifest_entry("A", "h1-new")]).to_string())
        .create_async()
        .await;
    let body = server
        .mock("GET", "/rules/de/h1-new")
        .with_header("content-type", "application/json")
        .with_body(rule_body("A").to_string())
        .expect(1)
        .create_async()
        .await;

    let (repository, _) = rules_repository(&server.url(), vec![local_rule("A", "h1")]).await;
    repository.load_rules().await.expect("sync");

    body.assert_async().await;
    let rules = repository.all_rules().await;
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].hash, "h1-new");
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_body_fetch_drops_the_entry_without_aborting() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/rules")
        .with_header("content-type", "application/json")
        .with_body(
            json!([manifest_entry("A", "h1"), manifest_entry("B", "h2")]).to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", "/rules/de/h1")
        .with_header("content-type", "application/json")
        .with_body(rule_body("A").to_string())
        .create_async()
        .await;
    // B's body is permanently unavailable.
    server
        .mock("GET", "/rules/de/h2")
        .with_status(404)
        .create_async()
        .await;

    let (repository, updates) = rules_repository(&server.url(), Vec::new()).await;
    repository.load_rules().await.expect("sync succeeds");

    let identifiers: Vec<String> = repository
        .all_rules()
        .await
        .into_iter()
        .map(|rule| rule.identifier)
        .collect();
    assert_eq!(identifiers, vec!["A"]);
    // The sync as a whole still completed.
    assert!(updates
        .last_updated(UpdateStore::RULES)
        .expect("timestamps")
        .is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_manifest_fetch_aborts_without_local_mutation() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/rules")
        .with_status(404)
        .create_async()
        .await;

    let (repository, updates) =
        rules_repository(&server.url(), vec![local_rule("A", "h1")]).await;
    assert!(repository.load_rules().await.is_err());

    // Prior state retained, no timestamp written.
    let rules = repository.all_rules().await;
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].identifier, "A");
    assert!(updates
        .last_updated(UpdateStore::RULES)
        .expect("timestamps")
        .is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn value_set_sync_round_trip() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/valuesets")
        .with_header("content-type", "application/json")
        .with_body(json!([{"id": "covid-19-lab-test-type", "hash": "v1"}]).to_string())
        .create_async()
        .await;
    server
        .mock("GET", "/valuesets/v1")
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "valueSetId": "covid-19-lab-test-type",
                "valueSetDate": "2021-04-27",
                "valueSetValues": {"LP6464-4": {"display": "PCR"}}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let backend: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
    let repository = ValueSetsRepository::new(
        Arc::new(ValueSetsRemoteDataSource::new(
            Arc::new(Request::new()),
            server.url(),
        )),
        Arc::new(LocalStore::<ValueSet>::new("value_sets", backend.clone())),
        Arc::new(UpdateStore::new(backend)),
    );
    repository.load_value_sets().await.expect("sync");

    let value_sets = repository.all_value_sets().await;
    assert_eq!(value_sets.len(), 1);
    assert_eq!(value_sets[0].codes(), vec!["LP6464-4"]);

    let external = repository.external_value().await;
    assert_eq!(
        external["covid-19-lab-test-type"],
        json!(["LP6464-4"])
    );
}
