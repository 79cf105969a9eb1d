//! Error body types for the restkit client
//!
//! This crate provides pure data types for the error bodies a REST service
//! returns, with no dependencies on an HTTP stack. It includes:
//! - RFC 9457 Problem Details (`Problem`)
//! - Per-field validation failures (`InvalidParameter`)
//! - A narrow parse result for untrusted bodies (`ProblemBody`)
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod problem;

pub use problem::{InvalidParameter, Problem, ProblemBody, TEXT_PREVIEW_LIMIT};
