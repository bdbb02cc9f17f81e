//! Command implementations.

pub mod clean;
pub mod scan;

use disarm_core::Status;

/// Process exit code for a final status.
///
/// 0 clean, 1 cleaned, 2 blocked, 3 error.
pub const fn exit_code(status: Status) -> i32 {
    match status {
        Status::Clean => 0,
        Status::Cleaned => 1,
        Status::Blocked => 2,
        Status::Error => 3,
    }
}
