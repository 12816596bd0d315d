//! # Tome Registry
//!
//! Lifecycle, routing and dispatch for tomes.
//!
//! ## Architecture
//!
//! ```text
//! TomeRegistry
//! ├── TomeInstance          (machines behind per-machine locks + shared context)
//! ├── routing table         ((method, path) -> RouteBinding)
//! ├── MessageBroker         (optional, performs machine-requested sends)
//! └── TransitionPersistence (optional, receives dispatched transitions)
//! ```
//!
//! Route delivery and [`TomeRegistry::dispatch_tome_message`] suspend: both
//! hand transitions to the persistence collaborator and perform machine
//! sends through the broker. [`TomeRegistry::apply_tome_message`] is the
//! synchronous path; it returns the outbox to its caller.

pub mod routes;
pub mod tome;
pub mod tome_registry;

pub use routes::{
    HttpMethod, RouteBinding, RouteBody, RouteConfig, RouteInfo, RouteRequest, RouteResponse, RouteResult,
    RouteTransformers, Transformer,
};
pub use tome::{ProbeReport, RoutingConfig, TomeConfig, TomeInstance, TomeStatus};
pub use tome_registry::{DispatchOutcome, RegistryStats, TomeRegistry};
