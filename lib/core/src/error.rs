//! Error handling foundation for tripwire.
//!
//! Domain crates define their own error enums; setup paths that cross
//! several layers (broker connect, database bootstrap) carry those enums as
//! the context of a rootcause [`Report`] so the chain of causes survives up
//! to the process entry point.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
///
/// `C` is the context type of the outermost layer, e.g. `StartupError`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
