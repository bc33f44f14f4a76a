//! # UI Module
//!
//! Plain-text rendering for the terminal front end.

pub mod cent_meter;
pub mod score_tables;
