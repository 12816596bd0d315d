//! # Feature Toggles and Backend Resolution
//!
//! The core only consumes the evaluation contract. Embedding applications
//! plug their flag service behind [`ToggleEvaluator`]; [`StaticToggles`] is the
//! in-memory implementation used for local runs and tests.

use super::message::BackendKind;
use crate::constants::toggles;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub trait ToggleEvaluator: Send + Sync {
    fn is_enabled(&self, name: &str, context: &Value) -> bool;
}

/// In-memory toggle table; unknown toggles evaluate to false
#[derive(Debug, Default)]
pub struct StaticToggles {
    values: DashMap<String, bool>,
}

impl StaticToggles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: HashMap<String, bool>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    pub fn with(self, name: impl Into<String>, enabled: bool) -> Self {
        self.values.insert(name.into(), enabled);
        self
    }

    pub fn set(&self, name: impl Into<String>, enabled: bool) {
        self.values.insert(name.into(), enabled);
    }
}

impl ToggleEvaluator for StaticToggles {
    fn is_enabled(&self, name: &str, _context: &Value) -> bool {
        self.values.get(name).map(|v| *v).unwrap_or(false)
    }
}

/// Destination chosen for a broker send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendTarget {
    pub kind: BackendKind,
    pub base_url: String,
}

pub trait BackendResolver: Send + Sync {
    fn resolve_backend(&self) -> BackendTarget;
}

/// Chooses the primary backend when its toggle is on, the fallback otherwise
pub struct ToggleBackendResolver {
    toggles: Arc<dyn ToggleEvaluator>,
    toggle_name: String,
    primary_url: String,
    fallback_url: String,
}

impl ToggleBackendResolver {
    pub fn new(
        toggles: Arc<dyn ToggleEvaluator>,
        primary_url: impl Into<String>,
        fallback_url: impl Into<String>,
    ) -> Self {
        Self {
            toggles,
            toggle_name: toggles::PRIMARY_BACKEND.to_string(),
            primary_url: primary_url.into(),
            fallback_url: fallback_url.into(),
        }
    }

    pub fn with_toggle_name(mut self, name: impl Into<String>) -> Self {
        self.toggle_name = name.into();
        self
    }
}

impl BackendResolver for ToggleBackendResolver {
    fn resolve_backend(&self) -> BackendTarget {
        if self.toggles.is_enabled(&self.toggle_name, &Value::Null) {
            BackendTarget {
                kind: BackendKind::Primary,
                base_url: self.primary_url.clone(),
            }
        } else {
            BackendTarget {
                kind: BackendKind::Fallback,
                base_url: self.fallback_url.clone(),
            }
        }
    }
}

impl std::fmt::Debug for ToggleBackendResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToggleBackendResolver")
            .field("toggle_name", &self.toggle_name)
            .field("primary_url", &self.primary_url)
            .field("fallback_url", &self.fallback_url)
            .finish()
    }
}
