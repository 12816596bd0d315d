//! Identifier generation for messages, traces, spans and connections.
//!
//! Ids are `{prefix}_{unix millis}_{random}`: sortable by creation time at a
//! glance and unique across the process lifetime through the uuid suffix.

use crate::constants::id_prefixes;
use chrono::Utc;
use uuid::Uuid;

pub fn generate_id(prefix: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}_{}", Utc::now().timestamp_millis(), &random[..16])
}

pub fn generate_message_id() -> String {
    generate_id(id_prefixes::MESSAGE)
}

pub fn generate_trace_id() -> String {
    generate_id(id_prefixes::TRACE)
}

pub fn generate_span_id() -> String {
    generate_id(id_prefixes::SPAN)
}

pub fn generate_connection_id() -> String {
    generate_id(id_prefixes::CONNECTION)
}
