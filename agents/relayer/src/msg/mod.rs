//! Submission pipeline: payload construction, the per-commitment
//! lifecycle, and the serial submitter that drives it.

pub mod bitfield_builder;
pub mod pending_operation;
pub mod pending_submission;
pub mod serial_submitter;
