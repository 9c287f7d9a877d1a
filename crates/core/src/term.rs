use std::fmt;

use serde::{Deserialize, Serialize};

/// Academic term configuration: the current academic year and semester.
///
/// This is process-wide read-only configuration, but it is always passed
/// in explicitly (CLI config file, request body) -- no component reads it
/// ambiently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    /// e.g. "2025/2026".
    pub academic_year: String,
    /// e.g. "first" or "second".
    pub semester: String,
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} semester", self.academic_year, self.semester)
    }
}
