use crate::common::{counter_machine, door_machine, recording_broker};
use serde_json::json;
use std::sync::Arc;
use tome_core::messaging::Direction;
use tome_core::registry::{HttpMethod, RouteConfig, RouteRequest, TomeConfig, TomeRegistry};
use tome_core::state_machine::{Action, MachineConfig, StateConfig, TransitionConfig};

fn routed_registry() -> TomeRegistry {
    let registry = TomeRegistry::default();
    registry
        .register(
            TomeConfig::new("editor", "Editor")
                .machine("door", door_machine())
                .machine("counter", counter_machine())
                .route(
                    RouteConfig::new(HttpMethod::Post, "/open", "door")
                        .with_event("OPEN")
                        .with_input_transformer(|data| json!({ "opened_by": data["user"] }))
                        .with_output_transformer(|snapshot| json!({ "state": snapshot["state"] })),
                )
                .route(RouteConfig::new(HttpMethod::Post, "/tick", "counter").with_event("TICK"))
                .route(RouteConfig::new(HttpMethod::Post, "/door", "door")),
        )
        .unwrap();
    registry
}

#[tokio::test]
async fn test_route_applies_transformers_around_delivery() {
    let registry = routed_registry();

    let response = registry
        .handle_route(&RouteRequest::new(HttpMethod::Post, "/api/editor/open/").with_data(json!({ "user": "sam" })))
        .await;

    assert!(response.success);
    assert_eq!(response.tome.as_deref(), Some("editor"));
    assert_eq!(response.machine.as_deref(), Some("door"));
    assert_eq!(response.event.as_deref(), Some("OPEN"));
    assert_eq!(response.result, Some(json!({ "state": "open" })));
    assert_eq!(
        registry.machine_context_value("editor", "door", "opened_by").unwrap(),
        Some(json!("sam"))
    );
}

#[tokio::test]
async fn test_body_event_overrides_route_default() {
    let registry = routed_registry();

    let result = registry
        .deliver_route(&RouteRequest::new(HttpMethod::Post, "/api/editor/door").with_event("OPEN"))
        .await
        .unwrap();
    assert_eq!(result.snapshot.state, "open");

    let missing = registry
        .handle_route(&RouteRequest::new(HttpMethod::Post, "/api/editor/door"))
        .await;
    assert!(!missing.success);
    assert_eq!(missing.error_kind.as_deref(), Some("validation_error"));
    assert_eq!(missing.status_code(), 400);
}

#[tokio::test]
async fn test_unknown_route_and_trace_headers() {
    let registry = routed_registry();

    let response = registry
        .handle_route(
            &RouteRequest::new(HttpMethod::Get, "/api/editor/open").with_header("X-Trace-Id", "trace_from_client"),
        )
        .await;

    assert!(!response.success);
    assert_eq!(response.error_kind.as_deref(), Some("route_not_found"));
    assert_eq!(response.status_code(), 404);
    assert_eq!(response.trace_id, "trace_from_client");
    assert!(response.span_id.starts_with("span_"));
}

#[test]
fn test_route_collision_across_tomes_is_rejected() {
    let registry = routed_registry();

    let clash = TomeConfig::new("other", "Other")
        .machine("door", door_machine())
        .with_base_path("/api/editor")
        .route(RouteConfig::new(HttpMethod::Post, "/open", "door").with_event("OPEN"));

    assert!(registry.register(clash).is_err());
    assert!(!registry.contains("other"));
    assert_eq!(registry.routes().len(), 3);
}

#[test]
fn test_route_bound_to_undeclared_event_is_rejected() {
    let registry = TomeRegistry::default();
    let config = TomeConfig::new("bad", "Bad")
        .machine("door", door_machine())
        .route(RouteConfig::new(HttpMethod::Post, "/fly", "door").with_event("FLY"));

    assert!(registry.register(config).is_err());
}

#[test]
fn test_unregister_releases_routes() {
    let registry = routed_registry();
    assert!(registry.has_route_path("/api/editor/tick"));

    registry.unregister("editor");

    assert!(!registry.has_route_path("/api/editor/tick"));
    assert!(registry.routes().is_empty());
}

fn mods_tome() -> TomeConfig {
    TomeConfig::new("mods", "Mods")
        .machine(
            "publisher",
            MachineConfig::new("publisher", "idle")
                .state(
                    "idle",
                    StateConfig::new().on_transition(
                        "PUBLISH",
                        TransitionConfig::to("published").with_action(Action::send_message("publish_mod")),
                    ),
                )
                .state("published", StateConfig::new()),
        )
        .route(RouteConfig::new(HttpMethod::Post, "/publish", "publisher").with_event("PUBLISH"))
}

#[tokio::test]
async fn test_route_performs_machine_sends_in_request_trace() {
    let (broker, transport) = recording_broker(200);
    let registry = TomeRegistry::default().with_broker(Arc::clone(&broker));
    registry.register(mods_tome()).unwrap();

    let response = registry
        .handle_route(
            &RouteRequest::new(HttpMethod::Post, "/api/mods/publish").with_header("x-trace-id", "trace_publish_mod"),
        )
        .await;

    assert!(response.success);
    assert_eq!(response.trace_id, "trace_publish_mod");
    assert_eq!(transport.requests().len(), 1);

    let trace = broker.get_full_trace("trace_publish_mod");
    assert_eq!(trace.messages.len(), 2);
    assert_eq!(trace.messages[0].action, "publish_mod");
    assert_eq!(trace.messages[0].direction, Direction::Outbound);
    assert_eq!(trace.messages[1].direction, Direction::Response);
}

#[tokio::test]
async fn test_route_send_failure_becomes_failure_response() {
    let (broker, _transport) = recording_broker(503);
    let registry = TomeRegistry::default().with_broker(Arc::clone(&broker));
    registry.register(mods_tome()).unwrap();

    let response = registry
        .handle_route(&RouteRequest::new(HttpMethod::Post, "/api/mods/publish").with_header("X-Trace-Id", "trace_down"))
        .await;

    assert!(!response.success);
    assert_eq!(response.error_kind.as_deref(), Some("transport_error"));
    assert_eq!(response.status_code(), 500);
    assert_eq!(response.event.as_deref(), Some("PUBLISH"));
    assert_eq!(
        registry.get_machine_state("mods", "publisher").unwrap().state,
        "published"
    );
    assert!(broker
        .get_trace_messages("trace_down")
        .iter()
        .any(|m| m.direction == Direction::Error));
}

#[tokio::test]
async fn test_route_without_broker_returns_sends_unsent() {
    let registry = TomeRegistry::default();
    registry.register(mods_tome()).unwrap();

    let result = registry
        .deliver_route(&RouteRequest::new(HttpMethod::Post, "/api/mods/publish"))
        .await
        .unwrap();

    assert!(result.sent.is_empty());
    assert_eq!(result.unsent.len(), 1);
    assert_eq!(result.unsent[0].action, "publish_mod");
}
