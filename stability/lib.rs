#![deny(dead_code)]
#![deny(unused_imports)]

//! Bootstrap stability analysis for backward-elimination linear regression.
//!
//! The crate refits a selection procedure on bootstrap resamples of a dataset and
//! summarises how often, and how consistently, each predictor survives selection.
//! `pipeline::run_analysis` is the single entry point that ties the pieces together.

pub mod bias;
pub mod bootstrap;
pub mod config;
pub mod data;
pub mod inclusion;
pub mod independence;
pub mod model;
pub mod ols;
pub mod overview;
pub mod pipeline;
pub mod report;
pub mod resample;
pub mod selection;
pub mod shrinkage;

#[cfg(test)]
pub mod test_fixtures;
