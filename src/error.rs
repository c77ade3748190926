//! Error type for registry operations.
//!
//! The registry's taxonomy distinguishes "nothing matched"
//! ([`Error::NoMatchingIndexGroup`]) from "something is broken" (everything
//! else). See [`shardreg_engine::RegistryError`] for the variants.

/// All registry errors.
pub use shardreg_engine::RegistryError as Error;

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, Error>;
