//! # Messaging Module
//!
//! Traced backend messaging: the [`MessageBroker`], its message records and
//! the transport / toggle collaborators it is built on.

pub mod broker;
pub mod errors;
pub mod ids;
pub mod message;
pub mod toggles;
pub mod transport;

pub use broker::{BrokerResponse, MessageBroker};
pub use errors::{MessagingError, MessagingResult};
pub use message::{BackendKind, Direction, Message, MessageMetadata, TraceInfo};
pub use toggles::{BackendResolver, BackendTarget, StaticToggles, ToggleBackendResolver, ToggleEvaluator};
pub use transport::{
    HttpTransport, OfflineTransport, Transport, TransportMethod, TransportRequest, TransportResponse,
};
