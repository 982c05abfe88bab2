//! Unified exit codes for the custody CLI.
//! These are part of the public contract; scripts and CI depend on them.

pub const SUCCESS: i32 = 0;
pub const VERIFICATION_FAILED: i32 = 1; // A hash or token check did not reproduce
pub const INTERNAL_ERROR: i32 = 2; // Setup, I/O, or store failure
