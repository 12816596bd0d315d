#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tome Core Rust
//!
//! State-machine orchestration and message-tracing runtime for composable
//! "tomes": named bundles of state machines that share a context, expose
//! routes, and can be wired into networks that forward events between them.
//!
//! ## Architecture
//!
//! - [`state_machine`] - Hierarchical state machines with declarative transitions
//! - [`messaging`] - Message broker that stamps, sends and records traced messages
//! - [`registry`] - Tome instances, the tome registry and route dispatch
//! - [`topology`] - Connections, network builders, broadcast, health and validation
//! - [`api`] - Transport-agnostic admin handlers for the topology
//! - [`config`] - Layered configuration loading
//! - [`error`] - Crate error taxonomy
//! - [`logging`] - Structured logging setup and operation helpers
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tome_core::config::TopologyConfig;
//! use tome_core::messaging::MessageBroker;
//! use tome_core::registry::{TomeConfig, TomeRegistry};
//! use tome_core::state_machine::{MachineConfig, StateConfig};
//! use tome_core::topology::{ConnectionConfig, ConnectionTopology};
//!
//! # fn main() -> tome_core::Result<()> {
//! let machine = MachineConfig::new("door", "closed")
//!     .state("closed", StateConfig::new().on("OPEN", "open"))
//!     .state("open", StateConfig::new().on("CLOSE", "closed"));
//!
//! let registry = Arc::new(TomeRegistry::default());
//! registry.register(TomeConfig::new("front", "Front door").machine("door", machine.clone()))?;
//! registry.register(TomeConfig::new("back", "Back door").machine("door", machine))?;
//!
//! let topology = ConnectionTopology::new(
//!     Arc::clone(&registry),
//!     Arc::new(MessageBroker::offline()),
//!     TopologyConfig { monitor_enabled: false, ..TopologyConfig::default() },
//! );
//! topology.connect("front", "back", ConnectionConfig::new().map_event("OPEN", "OPEN"))?;
//!
//! let report = topology.broadcast_event("OPEN", "front")?;
//! assert_eq!(report.delivered(), 1);
//! assert_eq!(registry.get_machine_state("back", "door")?.state, "open");
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod registry;
pub mod state_machine;
pub mod topology;

pub use api::{ApiError, ApiRequest, ApiResponse, TopologyApi};
pub use config::{ConfigManager, ConfigurationError, TomeCoreConfig};
pub use constants::{HealthStatus, NetworkHealth};
pub use error::{Result, TomeError};
pub use messaging::{Message, MessageBroker, MessagingError, TraceInfo};
pub use registry::{TomeConfig, TomeInstance, TomeRegistry};
pub use state_machine::{MachineConfig, StateConfig, StateMachine, StateMachineError};
pub use topology::{Connection, ConnectionConfig, ConnectionTopology};
