//! Stable exit codes for solver CLI commands.

/// Command succeeded; for `solve`, every root test case passed.
pub const OK: i32 = 0;
/// Invalid config, task file or arguments, or any other error.
pub const INVALID: i32 = 1;
/// `solve` finished but the root program does not pass every case.
pub const PARTIAL: i32 = 2;
