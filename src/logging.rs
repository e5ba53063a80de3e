//! Feature-gated debug logging.
//!
//! No `tracing`/`log` crate appears anywhere in the teacher corpus — this
//! codebase's "structured logging" is a family of `macro_rules!` gated
//! behind Cargo features that compile to nothing when the feature is off.
//! The calling code never branches on whether logging is enabled; it just
//! calls the macro and the feature flag decides whether anything happens.

#[macro_export]
#[cfg(feature = "show_tokens")]
macro_rules! token_log {
    ($($arg:tt)*) => {
        saying::say!($($arg)*);
    };
}
#[macro_export]
#[cfg(not(feature = "show_tokens"))]
macro_rules! token_log {
    ($($arg:tt)*) => {};
}

#[macro_export]
#[cfg(feature = "show_ast")]
macro_rules! ast_log {
    ($($arg:tt)*) => {
        saying::say!($($arg)*);
    };
}
#[macro_export]
#[cfg(not(feature = "show_ast"))]
macro_rules! ast_log {
    ($($arg:tt)*) => {};
}

#[macro_export]
#[cfg(feature = "show_traits")]
macro_rules! trait_log {
    ($($arg:tt)*) => {
        saying::say!($($arg)*);
    };
}
#[macro_export]
#[cfg(not(feature = "show_traits"))]
macro_rules! trait_log {
    ($($arg:tt)*) => {};
}

#[macro_export]
#[cfg(feature = "show_emit")]
macro_rules! emit_log {
    ($($arg:tt)*) => {
        saying::say!($($arg)*);
    };
}
#[macro_export]
#[cfg(not(feature = "show_emit"))]
macro_rules! emit_log {
    ($($arg:tt)*) => {};
}

#[macro_export]
#[cfg(feature = "show_cache")]
macro_rules! cache_log {
    ($($arg:tt)*) => {
        saying::say!($($arg)*);
    };
}
#[macro_export]
#[cfg(not(feature = "show_cache"))]
macro_rules! cache_log {
    ($($arg:tt)*) => {};
}

#[macro_export]
#[cfg(feature = "detailed_timers")]
macro_rules! timer_log {
    ($label:expr, $elapsed:expr) => {
        saying::say!(Green $label, " ", Bright {format!("{:?}", $elapsed)});
    };
}
#[macro_export]
#[cfg(not(feature = "detailed_timers"))]
macro_rules! timer_log {
    ($label:expr, $elapsed:expr) => {};
}
