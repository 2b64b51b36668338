//! Randomized search for witness entries

mod probe;

pub use probe::{generate_group, ABORT_TARGET_THRESHOLD};
