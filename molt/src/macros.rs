//! Utility macros for error handling.

/// Creates a [`crate::error::MoltError`] from error kind and description.
///
/// The two argument form attaches just a static description; the three
/// argument form adds a dynamic detail.
#[macro_export]
macro_rules! molt_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::MoltError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::MoltError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates and returns a [`crate::error::MoltError`] from the current
/// function.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::molt_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::molt_error!($kind, $desc, $detail))
    };
}
