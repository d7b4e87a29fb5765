pub mod action;
pub mod annotate;
pub mod availability;
pub mod config;
pub mod download;
pub mod error;
pub mod evidence;
pub mod ingest;
pub mod planner;
pub mod report;
pub mod sequencer;
pub mod store;
pub mod tracker;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use annotate::VerdictSummary;
pub use availability::{Availability, AvailabilityGate};
pub use config::Config;
pub use error::{ResponseError, Result};
pub use evidence::{Evidence, Machine};
pub use planner::RemediationPlanner;
pub use sequencer::ActionSequencer;
pub use tracker::JobTracker;
pub use types::{ContainmentKind, JobStatus, Verdict};
