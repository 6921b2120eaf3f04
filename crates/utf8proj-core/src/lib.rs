//! # utf8proj-core
//!
//! Core domain model and shared error types for the utf8proj scheduling
//! engine.
//!
//! This crate provides:
//! - Domain types: `Project`, `Task`, `PredecessorLink`, `LinkType`
//! - The structural/graph validator (`validate`)
//! - The error vocabulary (`EngineError`) every other crate returns through
//!
//! ## Example
//!
//! ```rust
//! use utf8proj_core::{Project, Task, LinkType, PredecessorLink};
//! use chrono::NaiveDate;
//!
//! let mut project = Project::new("My Project", NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
//! let design = Task::new(&project.id, "1", "Design").outline_level(1);
//! let build = Task::new(&project.id, "2", "Build")
//!     .outline_level(1)
//!     .with_predecessor(PredecessorLink::new(&project.id, "1", LinkType::FinishToStart, 0, 7));
//! assert_eq!(design.outline_number, "1");
//! assert_eq!(build.predecessors[0].link_type, LinkType::FinishToStart);
//! ```

pub mod validate;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Type Aliases
// ============================================================================

/// Opaque project identifier.
pub type ProjectId = String;

/// Opaque task identifier.
pub type TaskId = String;

/// Dotted outline path, e.g. `"1.2.3"`.
pub type OutlineNumber = String;

// ============================================================================
// Project
// ============================================================================

/// A single scheduling workspace: tasks, predecessor links, and the
/// original XML document retained as an export template (§4.3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub start: NaiveDate,
    pub status_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
    /// Verbatim source document, reused as the export template (§4.3).
    /// Synthesized for projects created via the empty-project operation.
    pub xml_template: String,
}

impl Project {
    /// Create an empty project with a synthesized identity and timestamps
    /// (spec.md §3 Lifecycle, path (a)).
    pub fn new(name: impl Into<String>, start: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            name: name.into(),
            start,
            status_date: start,
            created_at: now,
            updated_at: now,
            is_active: false,
            xml_template: crate::validate::empty_template(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Generate a synthetic identity for a project or task.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// Task
// ============================================================================

/// A schedulable unit of work (spec.md §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    /// Secondary identifier carried from the source document's `UID`.
    pub uid: Option<String>,
    pub name: String,
    pub outline_number: OutlineNumber,
    pub outline_level: u32,
    /// Canonical ISO-8601 duration, e.g. `"PT8H0M0S"`.
    pub duration: String,
    pub value: Option<String>,
    pub milestone: bool,
    pub summary: bool,
    pub percent_complete: u8,
    pub start: Option<NaiveDate>,
    pub finish: Option<NaiveDate>,
    pub actual_start: Option<NaiveDate>,
    pub actual_finish: Option<NaiveDate>,
    pub actual_duration: Option<String>,
    pub create_date: Option<NaiveDate>,
    /// Predecessor links carried by this task (successor side, §3).
    pub predecessors: Vec<PredecessorLink>,
}

impl Task {
    pub fn new(project_id: &str, outline_number: &str, name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            project_id: project_id.to_string(),
            uid: None,
            name: name.into(),
            outline_number: outline_number.to_string(),
            outline_level: outline_level_of(outline_number),
            duration: "PT0H0M0S".to_string(),
            value: None,
            milestone: false,
            summary: false,
            percent_complete: 0,
            start: None,
            finish: None,
            actual_start: None,
            actual_finish: None,
            actual_duration: None,
            create_date: None,
            predecessors: Vec::new(),
        }
    }

    pub fn outline_level(mut self, level: u32) -> Self {
        self.outline_level = level;
        self
    }

    pub fn duration(mut self, iso: impl Into<String>) -> Self {
        self.duration = iso.into();
        self
    }

    pub fn milestone(mut self) -> Self {
        self.milestone = true;
        self.duration = "PT0H0M0S".to_string();
        self
    }

    pub fn summary(mut self) -> Self {
        self.summary = true;
        self
    }

    pub fn percent_complete(mut self, pct: u8) -> Self {
        self.percent_complete = pct;
        self
    }

    pub fn with_predecessor(mut self, link: PredecessorLink) -> Self {
        self.predecessors.push(link);
        self
    }
}

/// Number of dot-separated segments in an outline number, or 0 if malformed.
pub fn outline_level_of(outline: &str) -> u32 {
    match parse_outline(outline) {
        Some(segments) => segments.len() as u32,
        None => 0,
    }
}

/// Parse an outline number into its integer segments, validating the shape
/// `[1-9][0-9]*(\.[1-9][0-9]*)*` (spec.md §3 invariant 2). Returns `None`
/// for anything else, including empty strings and leading zeros.
pub fn parse_outline(outline: &str) -> Option<Vec<u32>> {
    if outline.is_empty() {
        return None;
    }
    let mut segments = Vec::new();
    for part in outline.split('.') {
        let bytes = part.as_bytes();
        if bytes.is_empty() || bytes[0] == b'0' || !bytes.iter().all(u8::is_ascii_digit) {
            return None;
        }
        segments.push(part.parse::<u32>().ok()?);
    }
    Some(segments)
}

// ============================================================================
// PredecessorLink
// ============================================================================

/// Precedence relation between two tasks in the same project (spec.md §3, §6.1).
///
/// `Type` wire encoding: `0=FF, 1=FS, 2=SF, 3=SS`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum LinkType {
    FinishToFinish = 0,
    FinishToStart = 1,
    StartToFinish = 2,
    StartToStart = 3,
}

impl LinkType {
    pub fn from_wire(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::FinishToFinish),
            1 => Some(Self::FinishToStart),
            2 => Some(Self::StartToFinish),
            3 => Some(Self::StartToStart),
            _ => None,
        }
    }

    pub fn to_wire(self) -> i64 {
        self as i64
    }
}

/// A successor-side predecessor reference. Identified within its owning
/// task by `(predecessor_outline, link_type)` (spec.md §3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredecessorLink {
    pub project_id: ProjectId,
    /// Textual back-reference to the predecessor's outline number,
    /// resolved by lookup rather than a raw pointer (spec.md §9).
    pub predecessor_outline: OutlineNumber,
    pub link_type: LinkType,
    /// Signed lag in the codec-native unit (never pre-converted, §4.1).
    pub lag: i64,
    /// Lag format code, one of `{3,4,...,12}`; unrecognized codes are
    /// treated as days by the lag codec.
    pub lag_format: i32,
}

impl PredecessorLink {
    pub fn new(
        project_id: &str,
        predecessor_outline: &str,
        link_type: LinkType,
        lag: i64,
        lag_format: i32,
    ) -> Self {
        Self {
            project_id: project_id.to_string(),
            predecessor_outline: predecessor_outline.to_string(),
            link_type,
            lag,
            lag_format,
        }
    }
}

// ============================================================================
// Deadline / cancellation
// ============================================================================

/// A caller-supplied deadline, checked between tasks (never within a single
/// task's inner loop) by the XML codec and CPM engine (spec.md §5).
#[derive(Clone, Copy, Debug, Default)]
pub struct Deadline(Option<std::time::Instant>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn after(duration: std::time::Duration) -> Self {
        Self(Some(std::time::Instant::now() + duration))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.0, Some(at) if std::time::Instant::now() >= at)
    }

    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_expired() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// The six error kinds every Engine API call can return (spec.md §7).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("validation failed ({} issue(s))", .0.len())]
    ValidationError(Vec<ValidationIssue>),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::ParseError(_) => "ParseError",
            Self::ValidationError(_) => "ValidationError",
            Self::Conflict(_) => "Conflict",
            Self::Cancelled => "Cancelled",
            Self::Internal(_) => "Internal",
        }
    }
}

/// A single validator finding (spec.md §4.5, §7). The validator returns the
/// full set rather than short-circuiting on the first failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub outline_number: Option<String>,
    pub field: Option<String>,
    pub message: String,
    pub kind: ValidationKind,
}

/// Finer-grained classification of a validator finding, carried inside
/// `ValidationIssue.kind` (distinct from `EngineError`'s top-level `kind`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationKind {
    MissingField,
    InvalidFormat,
    InvariantViolation,
    DuplicateOutline,
    UnresolvedPredecessor,
    Cycle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_outline_accepts_well_formed() {
        assert_eq!(parse_outline("1"), Some(vec![1]));
        assert_eq!(parse_outline("1.2.3"), Some(vec![1, 2, 3]));
        assert_eq!(parse_outline("10.20"), Some(vec![10, 20]));
    }

    #[test]
    fn parse_outline_rejects_malformed() {
        assert_eq!(parse_outline(""), None);
        assert_eq!(parse_outline("0"), None);
        assert_eq!(parse_outline("01.2"), None);
        assert_eq!(parse_outline("1."), None);
        assert_eq!(parse_outline(".1"), None);
        assert_eq!(parse_outline("1.2.a"), None);
    }

    #[test]
    fn outline_level_matches_segment_count() {
        assert_eq!(outline_level_of("1"), 1);
        assert_eq!(outline_level_of("1.2.3"), 3);
        assert_eq!(outline_level_of("bogus"), 0);
    }

    #[test]
    fn link_type_wire_round_trip() {
        for code in 0..4i64 {
            let t = LinkType::from_wire(code).unwrap();
            assert_eq!(t.to_wire(), code);
        }
        assert!(LinkType::from_wire(4).is_none());
    }

    #[test]
    fn deadline_none_never_expires() {
        let d = Deadline::none();
        assert!(!d.is_expired());
        assert!(d.check().is_ok());
    }

    #[test]
    fn deadline_in_past_is_expired() {
        let d = Deadline::after(std::time::Duration::from_millis(0));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(d.is_expired());
        assert!(matches!(d.check(), Err(EngineError::Cancelled)));
    }

    #[test]
    fn engine_error_kind_strings() {
        assert_eq!(EngineError::NotFound("x".into()).kind(), "NotFound");
        assert_eq!(EngineError::ValidationError(vec![]).kind(), "ValidationError");
        assert_eq!(EngineError::Cancelled.kind(), "Cancelled");
    }
}
