//! Environment-driven configuration flags.
//!
//! Every switch is a `ZBUF_*` environment variable read once on first use
//! and cached for the life of the process. All of them default to off; they
//! exist to trade safety for speed (bounds checks, the single-writer
//! assertion), portability (the vectorized equality fast path), or to turn
//! on extra diagnostics (resource tracing).
//!
//! | Variable | Effect when set to a truthy value |
//! |----------|-----------------------------------|
//! | `ZBUF_BOUNDS_CHECK_DISABLE` | store-level bounds checks are skipped |
//! | `ZBUF_CURSOR_BOUNDS_CHECK_DISABLE` | cursor-level bounds checks are skipped |
//! | `ZBUF_VECTORIZED_CONTENT_EQUALS_DISABLE` | content equality always uses the scalar loop |
//! | `ZBUF_SINGLE_THREADED_CHECK_DISABLE` | the debug single-writer assertion is skipped |
//! | `ZBUF_RESOURCE_TRACING` | owner tokens are recorded; leaks and double releases are reported |
//!
//! Truthy values are `1`, `true`, `yes` and `on` (case-insensitive).

use std::sync::OnceLock;

/// Environment variable disabling store-level bounds checks.
pub const ENV_BOUNDS_CHECK_DISABLE: &str = "ZBUF_BOUNDS_CHECK_DISABLE";
/// Environment variable disabling cursor-level bounds checks.
pub const ENV_CURSOR_BOUNDS_CHECK_DISABLE: &str = "ZBUF_CURSOR_BOUNDS_CHECK_DISABLE";
/// Environment variable disabling the vectorized content-equality fast path.
pub const ENV_VECTORIZED_CONTENT_EQUALS_DISABLE: &str = "ZBUF_VECTORIZED_CONTENT_EQUALS_DISABLE";
/// Environment variable disabling the single-writer assertion.
pub const ENV_SINGLE_THREADED_CHECK_DISABLE: &str = "ZBUF_SINGLE_THREADED_CHECK_DISABLE";
/// Environment variable enabling owner-token tracking and leak warnings.
pub const ENV_RESOURCE_TRACING: &str = "ZBUF_RESOURCE_TRACING";

fn flag(cell: &'static OnceLock<bool>, name: &str) -> bool {
    *cell.get_or_init(|| {
        std::env::var(name).is_ok_and(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
    })
}

/// True if store-level bounds checks are disabled.
pub fn bounds_check_disabled() -> bool {
    static CELL: OnceLock<bool> = OnceLock::new();
    flag(&CELL, ENV_BOUNDS_CHECK_DISABLE)
}

/// True if cursor-level bounds checks are disabled.
pub fn cursor_bounds_check_disabled() -> bool {
    static CELL: OnceLock<bool> = OnceLock::new();
    flag(&CELL, ENV_CURSOR_BOUNDS_CHECK_DISABLE)
}

/// True if the vectorized content-equality fast path is disabled.
pub fn vectorized_equals_disabled() -> bool {
    static CELL: OnceLock<bool> = OnceLock::new();
    flag(&CELL, ENV_VECTORIZED_CONTENT_EQUALS_DISABLE)
}

/// True if the single-writer assertion is disabled.
pub fn single_threaded_check_disabled() -> bool {
    static CELL: OnceLock<bool> = OnceLock::new();
    flag(&CELL, ENV_SINGLE_THREADED_CHECK_DISABLE)
}

/// True if owner-token tracking and unreleased-resource warnings are on.
pub fn resource_tracing() -> bool {
    static CELL: OnceLock<bool> = OnceLock::new();
    flag(&CELL, ENV_RESOURCE_TRACING)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_default_to_off() {
        // The cache makes these single-shot per process; asserting the
        // defaults is still worthwhile for a clean environment.
        if std::env::var(ENV_BOUNDS_CHECK_DISABLE).is_err() {
            assert!(!bounds_check_disabled());
        }
        if std::env::var(ENV_RESOURCE_TRACING).is_err() {
            assert!(!resource_tracing());
        }
    }
}
