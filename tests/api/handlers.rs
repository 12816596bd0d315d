use crate::common::{registry_with, topology_for};
use serde_json::json;
use tome_core::api::{ApiRequest, TopologyApi};
use tome_core::registry::HttpMethod;

fn api_for(ids: &[&str]) -> TopologyApi {
    TopologyApi::new(topology_for(&registry_with(ids)))
}

#[tokio::test]
async fn test_create_and_fetch_connection() {
    let api = api_for(&["a", "b"]);

    let created = api
        .handle(
            ApiRequest::post(
                "/api/connections",
                json!({ "sourceTome": "a", "targetTome": "b", "config": { "eventMapping": { "OPEN": "OPEN" } } }),
            )
            .with_header("x-trace-id", "trace_api"),
        )
        .await;

    assert!(created.success);
    assert_eq!(created.trace_id, "trace_api");
    let id = created.data_field("connectionId").and_then(|v| v.as_str()).unwrap().to_string();

    let fetched = api.handle(ApiRequest::get(format!("/connections/{id}"))).await;
    assert!(fetched.success);
    assert_eq!(fetched.data_field("connection").unwrap()["sourceTomeId"], json!("a"));

    let listed = api.handle(ApiRequest::get("/connections")).await;
    assert_eq!(listed.data_field("connections").unwrap().as_array().map(Vec::len), Some(1));

    let trace = api.topology().broker().get_trace_messages("trace_api");
    assert_eq!(trace.len(), 1);
    assert_eq!(trace[0].action, "connection_created_via_api");
}

#[tokio::test]
async fn test_missing_fields_are_bad_requests() {
    let api = api_for(&["a", "b"]);

    let response = api
        .handle(ApiRequest::post("/connections", json!({ "sourceTome": "a" })))
        .await;

    assert!(!response.success);
    assert_eq!(response.status_code, 400);
    assert_eq!(response.error.as_deref(), Some("sourceTome and targetTome are required"));

    let ring = api
        .handle(ApiRequest::post("/networks/ring", json!({ "tomes": ["a"] })))
        .await;
    assert_eq!(ring.error.as_deref(), Some("At least 2 tomes are required for ring network"));

    let hub = api
        .handle(ApiRequest::post("/networks/hub", json!({ "hubTome": "a", "spokeTomes": [] })))
        .await;
    assert_eq!(hub.error.as_deref(), Some("hubTome and spokeTomes array are required"));

    let broadcast = api.handle(ApiRequest::post("/broadcast", json!({ "event": "OPEN" }))).await;
    assert_eq!(broadcast.error.as_deref(), Some("event and sourceTome are required"));
}

#[tokio::test]
async fn test_networks_broadcast_and_delete() {
    let api = api_for(&["hub", "s1", "s2"]);

    let hub = api
        .handle(ApiRequest::post(
            "/networks/hub",
            json!({ "hubTome": "hub", "spokeTomes": ["s1", "s2"], "config": { "eventMapping": { "OPEN": "OPEN" } } }),
        ))
        .await;
    assert!(hub.success);
    assert_eq!(hub.data_field("networkType"), Some(&json!("hub-and-spoke")));
    let ids: Vec<String> = serde_json::from_value(hub.data_field("connectionIds").unwrap().clone()).unwrap();
    assert_eq!(ids.len(), 2);

    let broadcast = api
        .handle(ApiRequest::post("/broadcast", json!({ "event": "OPEN", "sourceTome": "hub" })))
        .await;
    assert!(broadcast.success);
    assert_eq!(
        broadcast.data_field("report").unwrap()["deliveries"].as_array().map(Vec::len),
        Some(2)
    );
    assert_eq!(broadcast.data_field("report").unwrap()["pending"], json!([]));

    let deleted = api.handle(ApiRequest::delete(format!("/connections/{}", ids[0]))).await;
    assert_eq!(deleted.data_field("disconnected"), Some(&json!(true)));
    let again = api.handle(ApiRequest::delete(format!("/connections/{}", ids[0]))).await;
    assert_eq!(again.data_field("disconnected"), Some(&json!(false)));
}

#[tokio::test]
async fn test_health_and_metrics_report_api_usage() {
    let api = api_for(&["a", "b"]);
    api.handle(ApiRequest::post("/networks/ring", json!({ "tomes": ["a", "b"] })))
        .await;
    api.topology().run_health_check();

    let health = api.handle(ApiRequest::get("/api/health")).await;
    assert_eq!(health.data_field("status"), Some(&json!("healthy")));

    let metrics = api.handle(ApiRequest::get("/metrics")).await;
    let metrics = metrics.data_field("metrics").unwrap();
    assert_eq!(metrics["connections"], json!(2));
    assert_eq!(metrics["api"]["apiCallCount"], json!(3));
    assert_eq!(metrics["api"]["lastHealthCheck"]["status"], json!("healthy"));
    assert!(metrics["broker"]["messageCount"].as_u64().unwrap() >= 3);
}

#[tokio::test]
async fn test_unknown_routes_and_missing_connections() {
    let api = api_for(&["a"]);

    let unknown = api.handle(ApiRequest::new(HttpMethod::Put, "/connections")).await;
    assert_eq!(unknown.status_code, 404);
    assert_eq!(unknown.error_kind.as_deref(), Some("route_not_found"));
    assert_eq!(api.api_call_count(), 1);

    let missing = api.handle(ApiRequest::get("/connections/connection_nope")).await;
    assert_eq!(missing.status_code, 404);
    assert_eq!(missing.error.as_deref(), Some("Connection not found"));

    let sync = api.handle(ApiRequest::post("/connections/connection_nope/sync", json!(null))).await;
    assert_eq!(sync.error_kind.as_deref(), Some("not_found"));
}

#[tokio::test]
async fn test_tomes_validate_and_traces() {
    let api = api_for(&["a", "b"]);
    let created = api
        .handle(ApiRequest::post("/connections", json!({ "sourceTome": "a", "targetTome": "b" })))
        .await;
    let id = created.data_field("connectionId").and_then(|v| v.as_str()).unwrap().to_string();
    let trace_id = api.topology().get_connection(&id).unwrap().trace_id;

    let tomes = api.handle(ApiRequest::get("/tomes")).await;
    assert_eq!(tomes.data_field("tomes").unwrap().as_array().map(Vec::len), Some(2));

    let validation = api.handle(ApiRequest::post("/validate", json!({}))).await;
    assert_eq!(validation.data_field("validation").unwrap()["valid"], json!(true));

    let trace = api.handle(ApiRequest::get(format!("/traces/{trace_id}"))).await;
    let messages = &trace.data_field("trace").unwrap()["messages"];
    assert_eq!(messages[0]["action"], json!("connection_created"));
}
