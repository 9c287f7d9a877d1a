//! Derived reporting over a record snapshot.
//!
//! `summarize` is a pure function: its output is consistent with exactly
//! the snapshot passed in, and callers recompute on every read -- the same
//! contract the admin dashboards had when they recomputed their stats
//! from a freshly fetched list on each render. Nothing here is cached or
//! incrementally maintained.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;

use provost_storage::Record;

/// Bucket for records whose payload lacks the grouping key.
pub const UNSPECIFIED_GROUP: &str = "unspecified";

/// Summary statistics over one record snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub total: usize,
    pub counts_by_status: BTreeMap<String, usize>,
    /// Sums of `payload.amount` keyed by the grouping field's value.
    /// Empty when no grouping key was requested. Records without a
    /// parseable amount contribute nothing.
    pub sums_by_group: BTreeMap<String, Decimal>,
}

/// Compute counts per status and, when `group_by` is given, sums of
/// `payload.amount` per value of that payload field.
pub fn summarize(records: &[Record], group_by: Option<&str>) -> Aggregate {
    let mut counts_by_status: BTreeMap<String, usize> = BTreeMap::new();
    let mut sums_by_group: BTreeMap<String, Decimal> = BTreeMap::new();

    for record in records {
        *counts_by_status.entry(record.status.clone()).or_default() += 1;

        if let Some(key) = group_by {
            if let Some(amount) = decimal_field(&record.payload, "amount") {
                let group = group_value(&record.payload, key);
                *sums_by_group.entry(group).or_default() += amount;
            }
        }
    }

    Aggregate {
        total: records.len(),
        counts_by_status,
        sums_by_group,
    }
}

/// Read a payload field as a `Decimal`. Accepts JSON numbers and numeric
/// strings -- the source stored amounts both ways.
fn decimal_field(payload: &serde_json::Value, key: &str) -> Option<Decimal> {
    match payload.get(key)? {
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// The grouping value for a record: the payload field rendered as a
/// string, or [`UNSPECIFIED_GROUP`] when absent or non-scalar.
fn group_value(payload: &serde_json::Value, key: &str) -> String {
    match payload.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => UNSPECIFIED_GROUP.to_string(),
    }
}
