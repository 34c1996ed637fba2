//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Validation error - required input missing or malformed
pub const VALIDATION_ERROR: i32 = 2;

/// Fetch error - index, registry or download failure
pub const FETCH_ERROR: i32 = 3;

/// Archive error - the chart archive could not be unpacked
pub const ARCHIVE_ERROR: i32 = 4;

/// IO error - config file, credentials or workspace problems
pub const IO_ERROR: i32 = 5;
