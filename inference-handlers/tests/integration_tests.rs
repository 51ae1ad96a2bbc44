//! Integration Tests for the Inference Handlers
//!
//! Handlers are driven end to end with in-memory collaborators and a
//! temporary artifact cache directory.
//!
//! # Test Categories
//!
//! 1. **Anomaly pipeline**: normalization, reconciliation, dispatch, envelope
//! 2. **Positional predictors**: failure and occupancy variants
//! 3. **Error rendering**: status codes and failure bodies
//! 4. **LLM handlers**: SQL assistant and chat with fake collaborators

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

use inference_handlers::artifacts::{
    ArtifactCache, ArtifactLocation, ArtifactSpec, ArtifactStore, ModelArtifacts, ModelLoader, StoreError,
};
use inference_handlers::clients::{
    ChatMessage, Database, DatabaseError, DbCredentials, LanguageModel, LlmError, QueryRow, SecretsError,
    SecretsProvider,
};
use inference_handlers::handlers::{
    AnomalyHandler, ChatHandler, FailureHandler, Handler, OccupancyHandler, SqlAssistantHandler,
};
use inference_handlers::models::FormatVersion;
use inference_handlers::LambdaResponse;

// ============================================================================
// TEST FIXTURES
// ============================================================================

/// Remote store keyed by the location's display form.
struct MapStore {
    objects: HashMap<String, Vec<u8>>,
    calls: AtomicUsize,
}

impl MapStore {
    fn new(objects: Vec<(String, Value)>) -> Arc<Self> {
        Arc::new(Self {
            objects: objects
                .into_iter()
                .map(|(k, v)| (k, serde_json::to_vec(&v).unwrap()))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactStore for MapStore {
    async fn fetch(&self, location: &ArtifactLocation) -> Result<Vec<u8>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.objects
            .get(&location.to_string())
            .cloned()
            .ok_or(StoreError::Status { status: 404 })
    }
}

const ANOMALY_COLUMNS: [&str; 5] = ["power_w", "voltage_v", "is_110v", "Month", "area"];

fn anomaly_scaler() -> Value {
    json!({
        "format_version": "1.0",
        "kind": "standard",
        "mean": [0.0, 0.0, 0.0, 0.0, 0.0],
        "scale": [1.0, 1.0, 1.0, 1.0, 1.0]
    })
}

fn anomaly_classifier() -> Value {
    json!({
        "format_version": "1.2",
        "kind": "logistic_regression",
        "classes": [0, 1],
        "coef": [[0.01, 0.0, 1.0, 0.0, 0.0]],
        "intercept": [-0.5]
    })
}

fn anomaly_handler(objects: Vec<(&str, Value)>, with_features: bool) -> (AnomalyHandler, Arc<MapStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = MapStore::new(
        objects
            .into_iter()
            .map(|(key, v)| (format!("s3://models/{key}"), v))
            .collect(),
    );
    let artifacts = ModelArtifacts {
        classifier: ArtifactSpec::object("model", "models", "rf.json"),
        scaler: Some(ArtifactSpec::object("scaler", "models", "scaler.json")),
        feature_list: with_features.then(|| ArtifactSpec::object("features", "models", "features.json")),
    };
    let cache = ArtifactCache::new(store.clone(), dir.path());
    let loader = ModelLoader::new(cache, artifacts, FormatVersion::new(1, 0));
    (AnomalyHandler::new(loader), store, dir)
}

fn default_anomaly_handler() -> (AnomalyHandler, Arc<MapStore>, tempfile::TempDir) {
    anomaly_handler(
        vec![
            ("rf.json", anomaly_classifier()),
            ("scaler.json", anomaly_scaler()),
            ("features.json", json!(ANOMALY_COLUMNS)),
        ],
        true,
    )
}

fn positional_loader(
    classifier: Value,
    scaler: Value,
    spec: fn(&str, &str) -> ArtifactSpec,
    prefix: &str,
) -> (ModelLoader, Arc<MapStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let model = spec("model", "model.json");
    let scaler_spec = spec("scaler", "scaler.json");
    let store = MapStore::new(vec![
        (format!("{prefix}model.json"), classifier),
        (format!("{prefix}scaler.json"), scaler),
    ]);
    let cache = ArtifactCache::new(store.clone(), dir.path());
    let artifacts = ModelArtifacts {
        classifier: model,
        scaler: Some(scaler_spec),
        feature_list: None,
    };
    (ModelLoader::new(cache, artifacts, FormatVersion::new(1, 0)), store, dir)
}

fn url_spec(name: &str, file: &str) -> ArtifactSpec {
    let url = Url::parse(&format!("https://models.example.com/Models/{file}")).unwrap();
    ArtifactSpec::url(name, url)
}

fn object_spec(name: &str, file: &str) -> ArtifactSpec {
    ArtifactSpec::object(name, "models", format!("Models/occupancy_{file}"))
}

fn three_column_scaler() -> Value {
    json!({
        "format_version": "1.0",
        "kind": "min_max",
        "data_min": [0.0, 0.0, 0.0],
        "data_max": [10.0, 10.0, 10.0]
    })
}

fn three_column_forest() -> Value {
    json!({
        "format_version": "1.0",
        "kind": "random_forest",
        "classes": [0, 1],
        "n_features_in": 3,
        "trees": [{
            "children_left": [1, -1, -1],
            "children_right": [2, -1, -1],
            "feature": [0, -2, -2],
            "threshold": [0.5, -2.0, -2.0],
            "value": [[5.0, 5.0], [4.0, 1.0], [1.0, 3.0]]
        }]
    })
}

fn body(response: &LambdaResponse) -> Value {
    response.body_json().unwrap()
}

// ============================================================================
// ANOMALY PIPELINE
// ============================================================================

#[tokio::test]
async fn test_anomaly_batch_with_probabilities() {
    let (handler, _, _dir) = default_anomaly_handler();
    let event = json!({"records": [{
        "power_w": 10,
        "voltage_v": 120,
        "area_2": 1,
        "timestamp": "2024-03-15T10:00:00Z"
    }]});

    let response = handler.handle(event).await;
    assert_eq!(response.status_code, 200);
    assert_eq!(response.headers["Content-Type"], "application/json");

    let body = body(&response);
    assert_eq!(body["ok"], true);
    assert_eq!(body["count"], 1);
    let result = &body["results"][0];
    assert_eq!(result["label"], 1);
    assert_eq!(result["label_name"], "anormal");
    let total = result["prob_normal"].as_f64().unwrap() + result["prob_anormal"].as_f64().unwrap();
    assert!((total - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_anomaly_envelope_body() {
    let (handler, _, _dir) = default_anomaly_handler();
    let inner = json!({"features": {"power_w": "0", "voltage_v": 230, "Month": 1, "area": 0}});
    let event = json!({"body": inner.to_string()});

    let response = handler.handle(event).await;
    assert_eq!(response.status_code, 200);
    let body = body(&response);
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["label"], 0);
    assert_eq!(body["results"][0]["label_name"], "normal");
}

#[tokio::test]
async fn test_anomaly_alias_matches_canonical() {
    let (handler, _, _dir) = anomaly_handler(
        vec![
            (
                "rf.json",
                json!({
                    "format_version": "1.0",
                    "kind": "logistic_regression",
                    "classes": [0, 1],
                    "coef": [[0.01, 0.1]],
                    "intercept": [0.0]
                }),
            ),
            (
                "scaler.json",
                json!({"format_version": "1.0", "kind": "standard", "mean": [0.0, 0.0], "scale": [1.0, 1.0]}),
            ),
            ("features.json", json!(["power_w", "Bracker_amp"])),
        ],
        true,
    );

    let canonical = handler.handle(json!({"power_w": 5, "Bracker_amp": 16})).await;
    let aliased = handler.handle(json!({"power_w": 5, "breaker_amp": 16})).await;

    assert_eq!(canonical.status_code, 200);
    assert_eq!(aliased.status_code, 200);
    let canonical = body(&canonical);
    assert_eq!(canonical["results"][0]["label"], 1);
    assert_eq!(body(&aliased)["results"], canonical["results"]);
}

#[tokio::test]
async fn test_anomaly_models_load_once() {
    let (handler, store, _dir) = default_anomaly_handler();
    let event = json!({"records": [{"power_w": 1, "voltage_v": 120, "Month": 2, "area": 1}]});

    assert_eq!(handler.handle(event.clone()).await.status_code, 200);
    assert_eq!(handler.handle(event).await.status_code, 200);
    assert_eq!(store.calls(), 3);
}

#[tokio::test]
async fn test_anomaly_malformed_json_is_client_error() {
    let (handler, _, _dir) = default_anomaly_handler();
    let response = handler.handle(json!("{\"records\": [")).await;

    assert_eq!(response.status_code, 400);
    let body = body(&response);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error_code"], "INVALID_INPUT_SHAPE");
    assert!(body["error"].as_str().unwrap().contains("malformed JSON"));
    assert!(body["runtime"]["version"].is_string());
}

#[tokio::test]
async fn test_anomaly_static_feature_list_reports_sorted_missing() {
    let (handler, _, _dir) = anomaly_handler(
        vec![("rf.json", anomaly_classifier()), ("scaler.json", anomaly_scaler())],
        false,
    );
    let response = handler.handle(json!({"voltage_v": 120, "power_w": 3})).await;

    assert_eq!(response.status_code, 400);
    let body = body(&response);
    assert_eq!(body["error_code"], "MISSING_FEATURES");
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("Bracker_amp"));
    assert!(!error.contains("\"power_w\""));
    assert!(error.find("area_1").unwrap() < error.find("weekday").unwrap());
}

#[tokio::test]
async fn test_anomaly_missing_artifact_is_server_error() {
    let (handler, store, _dir) = anomaly_handler(vec![("scaler.json", anomaly_scaler())], true);
    let event = json!({"records": [{"power_w": 1}]});

    let response = handler.handle(event.clone()).await;
    assert_eq!(response.status_code, 500);
    let body = body(&response);
    assert_eq!(body["error_code"], "ARTIFACT_UNAVAILABLE");
    assert!(body["error_chain"].as_array().unwrap().len() >= 2);

    // Nothing was memoized, so the next request fetches again.
    handler.handle(event).await;
    assert_eq!(store.calls(), 2);
}

#[tokio::test]
async fn test_anomaly_bad_value_names_feature() {
    let (handler, _, _dir) = default_anomaly_handler();
    let event = json!({"records": [{"power_w": "a lot", "voltage_v": 120, "Month": 1, "area": 1}]});

    let response = handler.handle(event).await;
    assert_eq!(response.status_code, 400);
    let body = body(&response);
    assert_eq!(body["error_code"], "INVALID_FEATURE_VALUE");
    assert!(body["error"].as_str().unwrap().contains("power_w"));
}

// ============================================================================
// POSITIONAL PREDICTORS
// ============================================================================

#[tokio::test]
async fn test_failure_first_record_in_document_order() {
    let (loader, _, _dir) = positional_loader(
        three_column_forest(),
        three_column_scaler(),
        url_spec,
        "https://models.example.com/Models/",
    );
    let handler = FailureHandler::new(loader);

    let event = json!({"records": [{"z": 9, "a": 0, "m": 0}, {"z": 0, "a": 0, "m": 0}]});
    let response = handler.handle(event).await;
    assert_eq!(response.status_code, 200);

    let body = body(&response);
    let result = &body["results"][0];
    assert_eq!(result["label"], 1);
    assert_eq!(result["prob_anormal"].as_f64().unwrap(), 0.75);
    assert_eq!(result["prob_normal"].as_f64().unwrap(), 0.25);
    assert!(result.get("label_name").is_none());
}

#[tokio::test]
async fn test_failure_wrong_width_reaches_model_and_is_client_error() {
    let (loader, _, _dir) = positional_loader(
        three_column_forest(),
        three_column_scaler(),
        url_spec,
        "https://models.example.com/Models/",
    );
    let handler = FailureHandler::new(loader);

    let response = handler.handle(json!({"features": [1.0, 2.0]})).await;
    assert_eq!(response.status_code, 400);
    let body = body(&response);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error_code"], "SCALING_ERROR");
    assert!(body["error"].as_str().unwrap().contains("expecting 3 features"));
}

#[tokio::test]
async fn test_failure_without_probabilities_reports_null() {
    let svc = json!({
        "format_version": "1.0",
        "kind": "linear_svc",
        "classes": [0, 1],
        "coef": [[1.0, 0.0, 0.0]],
        "intercept": [0.0]
    });
    let (loader, _, _dir) = positional_loader(svc, three_column_scaler(), url_spec, "https://models.example.com/Models/");
    let handler = FailureHandler::new(loader);

    let response = handler.handle(json!("[5, 5, 5]")).await;
    assert_eq!(response.status_code, 200);
    let body = body(&response);
    assert_eq!(body["results"][0]["label"], 1);
    assert!(body["results"][0]["prob_normal"].is_null());
    assert!(body["results"][0]["prob_anormal"].is_null());
}

#[tokio::test]
async fn test_failure_empty_records() {
    let (loader, _, _dir) = positional_loader(
        three_column_forest(),
        three_column_scaler(),
        url_spec,
        "https://models.example.com/Models/",
    );
    let response = FailureHandler::new(loader).handle(json!({"records": []})).await;
    assert_eq!(response.status_code, 400);
    assert_eq!(body(&response)["error_code"], "INVALID_INPUT_SHAPE");
}

#[tokio::test]
async fn test_occupancy_labels() {
    let (loader, _, _dir) = positional_loader(
        three_column_forest(),
        three_column_scaler(),
        object_spec,
        "s3://models/Models/occupancy_",
    );
    let handler = OccupancyHandler::new(loader);

    let response = handler.handle(json!([0, 1, 1])).await;
    assert_eq!(response.status_code, 200);
    let body = body(&response);
    let result = &body["results"][0];
    assert_eq!(result["label"], 0);
    assert_eq!(result["label_name"], "Unoccupied");
    assert_eq!(result["prob_unoccupied"].as_f64().unwrap(), 0.8);

    let response = handler.handle(json!({"records": [{"a": 1}]})).await;
    assert_eq!(response.status_code, 400);
}

// ============================================================================
// LLM HANDLERS
// ============================================================================

#[derive(Default)]
struct FakeLlm {
    reply: Option<String>,
    seen: Mutex<Vec<(Vec<ChatMessage>, Option<f32>)>>,
}

impl FakeLlm {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            ..Default::default()
        })
    }
}

#[async_trait]
impl LanguageModel for FakeLlm {
    async fn complete(&self, messages: &[ChatMessage], temperature: Option<f32>) -> Result<String, LlmError> {
        self.seen.lock().unwrap().push((messages.to_vec(), temperature));
        self.reply.clone().ok_or(LlmError::Timeout)
    }
}

struct FakeSecrets;

#[async_trait]
impl SecretsProvider for FakeSecrets {
    async fn database_credentials(&self, secret_name: &str) -> Result<DbCredentials, SecretsError> {
        assert_eq!(secret_name, "prod/smart-db");
        Ok(DbCredentials::from_secret_string(
            secret_name,
            r#"{"host": "db", "username": "reader", "password": "pw", "dbname": "Smart"}"#,
        )
        .unwrap())
    }
}

#[derive(Default)]
struct FakeDatabase {
    queries: Mutex<Vec<String>>,
}

#[async_trait]
impl Database for FakeDatabase {
    async fn query(&self, credentials: &DbCredentials, sql: &str) -> Result<Vec<QueryRow>, DatabaseError> {
        assert_eq!(credentials.dbname, "Smart");
        self.queries.lock().unwrap().push(sql.to_string());
        let row = json!({"Site_id": 1, "Site": "Campus"});
        Ok(vec![row.as_object().unwrap().clone()])
    }
}

fn sql_handler(llm: Arc<FakeLlm>, database: Arc<FakeDatabase>) -> SqlAssistantHandler {
    SqlAssistantHandler::new(llm, Arc::new(FakeSecrets), database, "prod/smart-db")
}

#[tokio::test]
async fn test_sql_generates_and_runs_query() {
    let llm = FakeLlm::replying("```sql\nSELECT * FROM Smart.T_Site LIMIT 10;\n```");
    let database = Arc::new(FakeDatabase::default());
    let handler = sql_handler(llm.clone(), database.clone());

    let event = json!({"body": "{\"question\": \"Which sites exist?\"}"});
    let response = handler.handle(event).await;
    assert_eq!(response.status_code, 200);

    let body = body(&response);
    assert_eq!(body["generated_sql"], "SELECT * FROM Smart.T_Site LIMIT 10;");
    assert_eq!(body["result"][0]["Site"], "Campus");

    let seen = llm.seen.lock().unwrap();
    assert_eq!(seen[0].1, Some(0.0));
    assert!(seen[0].0[0].content.contains("\"Which sites exist?\""));
    assert_eq!(database.queries.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_sql_unsafe_query_is_never_executed() {
    let database = Arc::new(FakeDatabase::default());
    let handler = sql_handler(FakeLlm::replying("DELETE FROM T_Site"), database.clone());

    let response = handler.handle(json!({"body": "{\"question\": \"wipe sites\"}"})).await;
    assert_eq!(response.status_code, 500);
    assert!(body(&response)["error"].as_str().unwrap().contains("Unsafe"));
    assert!(database.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_sql_missing_question() {
    let handler = sql_handler(FakeLlm::replying("SELECT 1"), Arc::new(FakeDatabase::default()));
    let response = handler.handle(json!({"body": "{\"question\": \"  \"}"})).await;
    assert_eq!(response.status_code, 400);
    assert_eq!(body(&response), json!({"error": "Missing question"}));
}

#[tokio::test]
async fn test_sql_body_of_wrong_shape_is_server_error() {
    let database = Arc::new(FakeDatabase::default());
    let llm = FakeLlm::replying("SELECT 1");
    let handler = sql_handler(llm.clone(), database.clone());

    let response = handler.handle(json!({"body": "[\"Which sites exist?\"]"})).await;
    assert_eq!(response.status_code, 500);
    assert_ne!(body(&response), json!({"error": "Missing question"}));
    assert!(llm.seen.lock().unwrap().is_empty());
    assert!(database.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_sql_model_failure_is_server_error() {
    let handler = sql_handler(Arc::new(FakeLlm::default()), Arc::new(FakeDatabase::default()));
    let response = handler.handle(json!({"body": "{\"question\": \"q\"}"})).await;
    assert_eq!(response.status_code, 500);
    assert!(body(&response)["error"].is_string());
}

#[tokio::test]
async fn test_chat_answers_question() {
    let llm = FakeLlm::replying("Paris");
    let handler = ChatHandler::new(llm.clone());

    let response = handler.handle(json!({"pregunta": "¿Cuál es la capital de Francia?"})).await;
    assert_eq!(response.status_code, 200);
    assert_eq!(
        body(&response),
        json!({"question": "¿Cuál es la capital de Francia?", "answer": "Paris"})
    );
    assert_eq!(llm.seen.lock().unwrap()[0].1, None);
}

#[tokio::test]
async fn test_chat_model_failure() {
    let handler = ChatHandler::new(Arc::new(FakeLlm::default()));
    let response = handler.handle(json!({"question": "hi"})).await;
    assert_eq!(response.status_code, 500);
    assert_eq!(body(&response)["error"], "Language model error: Timeout error");
}

#[tokio::test]
async fn test_chat_non_string_question_is_client_error() {
    let llm = FakeLlm::replying("Hola");
    let handler = ChatHandler::new(llm.clone());

    let response = handler.handle(json!({"question": 5})).await;
    assert_eq!(response.status_code, 400);
    assert!(llm.seen.lock().unwrap().is_empty());
}
