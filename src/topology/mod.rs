//! # Connection Topology
//!
//! Connections between tomes, bulk network builders, broadcast, health
//! monitoring and structural validation.

pub mod connection;
pub mod connector;
pub mod health;
pub mod validation;
pub mod view;

pub use connection::{Connection, ConnectionConfig, ConnectionFilters, FieldPath, FlowDirection};
pub use connector::{
    BroadcastReport, ConnectionTopology, Delivery, DeliveryFailure, PendingSend, SentMessage, SkipReason, SkippedConnection,
    SyncReport,
};
pub use health::HealthMonitor;
pub use validation::{
    IssueKind, NavigationItem, NetworkValidation, StructuralConfig, StructuralRoute, TomeDirectory, ValidationIssue,
};
pub use view::{HealthSummary, NetworkHealthReport, NetworkTopology, TopologyEdge};
