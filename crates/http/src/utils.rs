//! Utility macros shared across the crate.

/// Early-return with an error when a condition does not hold.
///
/// Similar to `assert!`, but returns the error instead of panicking. Used for
/// protocol validation checks where a failed condition aborts the current
/// message.
///
/// # Example
///
/// ```ignore
/// ensure!(header_count <= MAX_HEADER_NUM, ParseError::too_many_headers(MAX_HEADER_NUM));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
