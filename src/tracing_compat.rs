//! Tracing compatibility layer for structured logging.
//!
//! This module provides a unified interface for logging that works whether or not
//! the `tracing-integration` feature is enabled:
//!
//! - **With feature enabled**: Re-exports the `tracing` macros.
//! - **Without feature**: No-op macros that expand to `()`, so they are valid
//!   both as statements and as match-arm expressions.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cosync::tracing_compat::{debug, trace};
//!
//! debug!(task_id = ?id, "task spawned");
//! ```

#[cfg(feature = "tracing-integration")]
pub use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    //! No-op implementations when tracing is disabled.

    /// No-op trace-level logging macro.
    #[macro_export]
    macro_rules! trace {
        ($($arg:tt)*) => {
            ()
        };
    }

    /// No-op debug-level logging macro.
    #[macro_export]
    macro_rules! debug {
        ($($arg:tt)*) => {
            ()
        };
    }

    /// No-op info-level logging macro.
    #[macro_export]
    macro_rules! info {
        ($($arg:tt)*) => {
            ()
        };
    }

    /// No-op warn-level logging macro.
    #[macro_export]
    macro_rules! warn {
        ($($arg:tt)*) => {
            ()
        };
    }

    /// No-op error-level logging macro.
    #[macro_export]
    macro_rules! error {
        ($($arg:tt)*) => {
            ()
        };
    }

    pub use crate::{debug, error, info, trace, warn};
}

#[cfg(not(feature = "tracing-integration"))]
pub use noop::*;

#[cfg(test)]
mod tests {
    use super::{debug, error, info, trace, warn};

    #[test]
    fn macros_are_usable_as_match_arms() {
        let mut other = 0;
        for n in 0..6u8 {
            match n {
                0 => trace!(n, "zero"),
                1 => debug!(value = n, "one"),
                2 => info!("two"),
                3 => warn!(value = %n, "three"),
                4 => error!("four"),
                _ => other += 1,
            }
        }
        assert_eq!(other, 1);
    }
}
