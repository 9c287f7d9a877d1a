//! Per-record-type state machines and their registry.
//!
//! A [`WorkflowDef`] declares the closed status set for one record type,
//! its designated start status, and the legal moves between statuses.
//! Terminal statuses are not declared -- a status is terminal exactly when
//! it has no outgoing transition. Definitions are validated when a
//! [`WorkflowRegistry`] is built, so a registry in hand is always
//! internally consistent.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

// ──────────────────────────────────────────────
// Status normalization
// ──────────────────────────────────────────────

/// Normalize a raw status literal: trim whitespace, lowercase.
///
/// The admin front-ends this engine replaces wrote `"Pending"`,
/// `"pending"`, and `"pending_approval"` interchangeably; normalization
/// folds the casing variants together before the closed-set check. A
/// literal that still does not match a declared status is rejected, not
/// stored.
pub fn normalize_status(raw: &str) -> String {
    raw.trim().to_lowercase()
}

// ──────────────────────────────────────────────
// Workflow definition
// ──────────────────────────────────────────────

/// One legal status-to-status move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: String,
    pub to: String,
}

/// The state machine for one record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDef {
    pub record_type: String,
    /// The closed status set. Every stored status is a member.
    pub states: Vec<String>,
    /// Start status assigned at record creation.
    pub initial: String,
    pub transitions: Vec<StatusTransition>,
    /// When true, records of this type may be deleted at any status,
    /// including terminal ones. Simple CRUD entities (budgets) opt in;
    /// everything else is delete-protected once terminal.
    #[serde(default)]
    pub unrestricted_delete: bool,
}

impl WorkflowDef {
    /// True if `status` is a member of the declared state set.
    pub fn has_state(&self, status: &str) -> bool {
        self.states.iter().any(|s| s == status)
    }

    /// True if the table contains a `from -> to` edge.
    pub fn allows(&self, from: &str, to: &str) -> bool {
        self.transitions.iter().any(|t| t.from == from && t.to == to)
    }

    /// True if `status` has no outgoing transition.
    pub fn is_terminal(&self, status: &str) -> bool {
        !self.transitions.iter().any(|t| t.from == status)
    }

    /// All statuses legally reachable from `from` in one move.
    pub fn successors(&self, from: &str) -> Vec<&str> {
        self.transitions
            .iter()
            .filter(|t| t.from == from)
            .map(|t| t.to.as_str())
            .collect()
    }

    /// Normalize a raw status literal and check it against the state set.
    ///
    /// Returns the normalized form, or `UnknownStatus` if the literal is
    /// not a declared status of this type.
    pub fn resolve_status(&self, raw: &str) -> Result<String, WorkflowError> {
        let normalized = normalize_status(raw);
        if self.has_state(&normalized) {
            Ok(normalized)
        } else {
            Err(WorkflowError::UnknownStatus {
                record_type: self.record_type.clone(),
                status: raw.to_string(),
            })
        }
    }

    /// Check internal consistency: non-empty state set, no duplicate
    /// states or edges, initial and all transition endpoints declared.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        let invalid = |message: String| WorkflowError::InvalidDefinition {
            record_type: self.record_type.clone(),
            message,
        };

        if self.states.is_empty() {
            return Err(invalid("empty state set".to_string()));
        }
        let mut seen = HashSet::new();
        for state in &self.states {
            if !seen.insert(state.as_str()) {
                return Err(invalid(format!("duplicate state '{}'", state)));
            }
        }
        if !self.has_state(&self.initial) {
            return Err(invalid(format!(
                "initial state '{}' is not in the state set",
                self.initial
            )));
        }
        let mut edges = HashSet::new();
        for t in &self.transitions {
            if !self.has_state(&t.from) {
                return Err(invalid(format!(
                    "transition from undeclared state '{}'",
                    t.from
                )));
            }
            if !self.has_state(&t.to) {
                return Err(invalid(format!(
                    "transition to undeclared state '{}'",
                    t.to
                )));
            }
            if !edges.insert((t.from.as_str(), t.to.as_str())) {
                return Err(invalid(format!(
                    "duplicate transition '{}' -> '{}'",
                    t.from, t.to
                )));
            }
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Registry
// ──────────────────────────────────────────────

/// Validated set of workflow definitions, indexed by record type.
#[derive(Debug, Clone)]
pub struct WorkflowRegistry {
    defs: Vec<WorkflowDef>,
    index: HashMap<String, usize>,
}

impl WorkflowRegistry {
    /// Build a registry, validating every definition and rejecting
    /// duplicate record types.
    pub fn new(defs: Vec<WorkflowDef>) -> Result<Self, WorkflowError> {
        let mut index = HashMap::new();
        for (i, def) in defs.iter().enumerate() {
            def.validate()?;
            if index.insert(def.record_type.clone(), i).is_some() {
                return Err(WorkflowError::InvalidDefinition {
                    record_type: def.record_type.clone(),
                    message: "duplicate record type".to_string(),
                });
            }
        }
        Ok(WorkflowRegistry { defs, index })
    }

    /// Look up a definition by record type in O(1) via the index.
    pub fn get(&self, record_type: &str) -> Result<&WorkflowDef, WorkflowError> {
        self.index
            .get(record_type)
            .map(|&i| &self.defs[i])
            .ok_or_else(|| WorkflowError::UnknownType {
                record_type: record_type.to_string(),
            })
    }

    /// All definitions, in registration order.
    pub fn defs(&self) -> &[WorkflowDef] {
        &self.defs
    }
}

// ──────────────────────────────────────────────
// Built-in university workflow set
// ──────────────────────────────────────────────

fn edge(from: &str, to: &str) -> StatusTransition {
    StatusTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The built-in workflow set for university administrative records.
///
/// `payment` keeps outgoing edges from `processing` so asynchronous
/// gateway callbacks can settle a payment that left `pending` earlier.
/// `student_grade` rows are born `published` -- they exist only as derived
/// output of a published grade submission and never move again.
pub fn builtin_registry() -> WorkflowRegistry {
    let defs = vec![
        WorkflowDef {
            record_type: crate::GRADE_SUBMISSION.to_string(),
            states: strings(&["pending_approval", "approved", "published"]),
            initial: "pending_approval".to_string(),
            transitions: vec![
                edge("pending_approval", "approved"),
                edge("approved", "published"),
            ],
            unrestricted_delete: false,
        },
        WorkflowDef {
            record_type: crate::PAYMENT.to_string(),
            states: strings(&["pending", "processing", "success", "failed"]),
            initial: "pending".to_string(),
            transitions: vec![
                edge("pending", "processing"),
                edge("pending", "success"),
                edge("pending", "failed"),
                edge("processing", "success"),
                edge("processing", "failed"),
            ],
            unrestricted_delete: false,
        },
        WorkflowDef {
            record_type: crate::DEFERMENT_REQUEST.to_string(),
            states: strings(&["pending", "approved", "declined", "reactivated"]),
            initial: "pending".to_string(),
            transitions: vec![
                edge("pending", "approved"),
                edge("pending", "declined"),
                edge("approved", "reactivated"),
            ],
            unrestricted_delete: false,
        },
        WorkflowDef {
            record_type: crate::BUDGET.to_string(),
            states: strings(&["pending", "approved", "rejected"]),
            initial: "pending".to_string(),
            transitions: vec![edge("pending", "approved"), edge("pending", "rejected")],
            unrestricted_delete: true,
        },
        WorkflowDef {
            record_type: crate::STUDENT_GRADE.to_string(),
            states: strings(&["published"]),
            initial: "published".to_string(),
            transitions: vec![],
            unrestricted_delete: false,
        },
    ];
    WorkflowRegistry::new(defs).expect("built-in workflow set is internally consistent")
}
