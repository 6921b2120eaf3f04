//! # utf8proj-solver
//!
//! Critical Path Method engine and schedule-compression optimizer for the
//! utf8proj scheduling engine.
//!
//! This crate provides:
//! - `dag`: predecessor graph construction and topological ordering
//! - `cpm`: forward/backward-pass CPM scheduling
//! - `optimize`: lag-reduction and task-compression proposals
//!
//! ## Example
//!
//! ```rust
//! use utf8proj_core::{Task, PredecessorLink, LinkType};
//! use utf8proj_solver::cpm;
//!
//! let design = Task::new("p1", "1", "Design").duration("PT80H0M0S");
//! let build = Task::new("p1", "2", "Build")
//!     .duration("PT40H0M0S")
//!     .with_predecessor(PredecessorLink::new("p1", "1", LinkType::FinishToStart, 0, 7));
//! let schedule = cpm::compute(&[design, build]).unwrap();
//! assert_eq!(schedule.project_duration_days, 15.0);
//! ```

pub mod cpm;
pub mod dag;
pub mod optimize;

pub use cpm::{compute, CpmError, CpmSchedule, TaskSchedule};
pub use dag::{GraphError, SchedulingGraph};
pub use optimize::{apply, propose, Change, OptimizeError, OptimizeProposal, Risk, Strategy, StrategyKind};
