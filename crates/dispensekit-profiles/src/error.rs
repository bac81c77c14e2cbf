//! Error types for the profiles crate.
//!
//! This module provides structured error types for operator profile
//! management. Storage failures are logged by the registry, not returned.

use thiserror::Error;

/// Errors that can occur during profile registry operations.
#[derive(Error, Debug)]
pub enum ProfileError {
    /// No profile exists at the given position.
    #[error("No profile at index {index} (registry holds {len})")]
    IndexOutOfRange {
        /// Requested position.
        index: usize,
        /// Number of profiles in the registry.
        len: usize,
    },

    /// The profile name is empty or blank.
    #[error("Profile name must not be empty")]
    EmptyName,
}

/// Result type alias for profile registry operations.
pub type ProfileResult<T> = Result<T, ProfileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_error_display() {
        let err = ProfileError::IndexOutOfRange { index: 4, len: 2 };
        assert_eq!(err.to_string(), "No profile at index 4 (registry holds 2)");

        let err = ProfileError::EmptyName;
        assert_eq!(err.to_string(), "Profile name must not be empty");
    }
}
