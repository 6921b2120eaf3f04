//! # utf8proj-parser
//!
//! Microsoft Project XML (MSPDI) codec for the utf8proj scheduling engine.
//!
//! This crate provides:
//! - Lag unit conversion between native wire units and canonical days
//! - ISO-8601 task duration parsing/rendering
//! - Bidirectional MSPDI XML (de)serialization with template-preserving export
//!
//! ## Example
//!
//! ```rust
//! use utf8proj_parser::mspdi;
//! use utf8proj_core::Deadline;
//!
//! let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
//! <Project xmlns="http://schemas.microsoft.com/project">
//!   <Name>Demo</Name>
//!   <StartDate>2026-01-05T00:00:00</StartDate>
//!   <Tasks>
//!     <Task><UID>1</UID><Name>Design</Name><OutlineNumber>1</OutlineNumber><OutlineLevel>1</OutlineLevel><Duration>PT8H0M0S</Duration><Milestone>0</Milestone><Summary>0</Summary><PercentComplete>0</PercentComplete></Task>
//!   </Tasks>
//! </Project>
//! "#;
//!
//! let (project, tasks) = mspdi::ingest(xml, "p1", Deadline::none()).unwrap();
//! assert_eq!(project.name, "Demo");
//! assert_eq!(tasks.len(), 1);
//! ```

pub mod duration;
pub mod lag;
pub mod mspdi;

pub use duration::DurationError;
pub use mspdi::MspdiError;
