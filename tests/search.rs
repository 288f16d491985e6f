use std::sync::Arc;

use azure_commons::auth::AzureIdentityCredential;
use azure_commons::{ CompressionType, ErrorKind, IndexScenario, SearchCredential, SearchIndexManager };
use serde_json::{ json, Value };
use wiremock::matchers::{ body_partial_json, header, method, path, query_param };
use wiremock::{ Mock, MockServer, Request, ResponseTemplate };

fn manager(server: &MockServer) -> SearchIndexManager {
    SearchIndexManager::new(&server.uri(), SearchCredential::ApiKey("admin-key".into()), "docs", 1536).unwrap()
}

fn echo_body(request: &Request) -> ResponseTemplate {
    let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
    ResponseTemplate::new(201).set_body_json(body)
}

#[tokio::test]
async fn create_index_puts_the_compressed_definition() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/indexes('docs-scalar-trunc')"))
        .and(query_param("api-version", "2025-09-01"))
        .and(header("api-key", "admin-key"))
        .and(
            body_partial_json(
                json!({
                    "name": "docs-scalar-trunc",
                    "vectorSearch": {
                        "compressions": [{
                            "name": "scalar-compression",
                            "kind": "scalarQuantization",
                            "truncationDimension": 512,
                            "rescoringOptions": {
                                "enableRescoring": true,
                                "defaultOversampling": 10.0,
                                "rescoreStorageMethod": "preserveOriginals"
                            }
                        }],
                        "profiles": [{ "name": "default-profile", "compression": "scalar-compression" }]
                    }
                })
            )
        )
        .respond_with(echo_body)
        .expect(1)
        .mount(&server).await;

    let scenario = IndexScenario::new("scalar-trunc", Some(CompressionType::Scalar)).with_truncate_dims(512);
    let name = manager(&server).create_index(&scenario).await.unwrap();
    assert_eq!(name, "docs-scalar-trunc");
}

#[tokio::test]
async fn discarding_originals_disables_rescoring() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(
            body_partial_json(
                json!({
                    "vectorSearch": {
                        "compressions": [{
                            "kind": "binaryQuantization",
                            "rescoringOptions": {
                                "enableRescoring": false,
                                "rescoreStorageMethod": "discardOriginals"
                            }
                        }]
                    }
                })
            )
        )
        .respond_with(echo_body)
        .expect(1)
        .mount(&server).await;

    let scenario = IndexScenario::new("binary-lean", Some(CompressionType::Binary)).with_discard_originals(true);
    manager(&server).create_index(&scenario).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let rescoring = &body["vectorSearch"]["compressions"][0]["rescoringOptions"];
    assert!(rescoring.get("defaultOversampling").is_none());
}

#[tokio::test]
async fn existing_index_is_reported_as_created() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(
                json!({ "error": { "code": "ResourceNameAlreadyInUse", "message": "Index already exists." } })
            )
        )
        .mount(&server).await;

    let scenario = IndexScenario::new("baseline", None);
    let name = manager(&server).create_index(&scenario).await.unwrap();
    assert_eq!(name, "docs-baseline");
}

#[tokio::test]
async fn service_errors_are_returned() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(
                json!({ "error": { "code": "InvalidRequestParameter", "message": "truncationDimension is invalid" } })
            )
        )
        .mount(&server).await;

    let scenario = IndexScenario::new("bad", Some(CompressionType::Scalar)).with_truncate_dims(4096);
    let err = manager(&server).create_index(&scenario).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RemoteServiceError);
    assert!(err.to_string().contains("truncationDimension"));
}

#[tokio::test]
async fn invalid_scenario_never_reaches_the_service() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server).await;

    let scenario = IndexScenario::new("", None);
    let err = manager(&server).create_index(&scenario).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn token_credential_is_sent_as_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(
                json!({
                        "access_token": "search-token",
                        "expires_in": 3600,
                        "ext_expires_in": 3600,
                        "token_type": "Bearer"
                    })
            )
        )
        .mount(&server).await;
    Mock::given(method("PUT"))
        .and(path("/indexes('docs-baseline')"))
        .and(header("Authorization", "Bearer search-token"))
        .respond_with(echo_body)
        .expect(1)
        .mount(&server).await;

    let credential = AzureIdentityCredential::client_secret(
        "tenant-1",
        "app-1",
        "s3cret",
        Some(&server.uri())
    ).unwrap();
    let manager = SearchIndexManager::new(
        &server.uri(),
        SearchCredential::Token(Arc::new(credential)),
        "docs",
        768
    ).unwrap();

    manager.create_index(&IndexScenario::new("baseline", None)).await.unwrap();
}

#[tokio::test]
async fn get_and_delete_round_trip() {
    let server = MockServer::start().await;
    let scenario = IndexScenario::new("scalar", Some(CompressionType::Scalar));
    let definition = serde_json::to_value(manager(&server).build_index(&scenario).unwrap()).unwrap();

    Mock::given(method("GET"))
        .and(path("/indexes('docs-scalar')"))
        .respond_with(ResponseTemplate::new(200).set_body_json(definition))
        .mount(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/indexes('docs-scalar')"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/indexes('docs-missing')"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(
                json!({ "error": { "code": "", "message": "No index with the name 'docs-missing' was found" } })
            )
        )
        .mount(&server).await;

    let manager = manager(&server);
    let index = manager.get_index("docs-scalar").await.unwrap();
    assert_eq!(index.name, "docs-scalar");
    assert_eq!(index.field("embedding").and_then(|f| f.dimensions), Some(1536));

    manager.delete_index("docs-scalar").await.unwrap();

    let err = manager.get_index("docs-missing").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn unsafe_index_names_never_reach_the_service() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server).await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server).await;

    let manager = manager(&server);
    let err = manager.get_index("docs')?api-version=1#").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    let err = manager.delete_index("Docs-V1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
