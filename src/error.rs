#[cfg_attr(feature = "std", derive(thiserror::Error))]
#[cfg_attr(not(feature = "std"), derive(thiserror_no_std::Error))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid patch parameters: {0}")]
    ConfigMismatch(#[from] ConfigError),

    #[error("Patch signature count mismatch: found {found}, expected {expected}")]
    PatchMismatch { found: usize, expected: usize },

    #[error("Could not make page 0x{page:x} writable")]
    PermissionFailure { page: usize },
}

#[cfg_attr(feature = "std", derive(thiserror::Error))]
#[cfg_attr(not(feature = "std"), derive(thiserror_no_std::Error))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Parameter block does not start with the expected magic signature")]
    BadMagic,

    #[error("Invalid struct size {declared}, expected {expected}")]
    SizeMismatch { declared: usize, expected: usize },

    #[error("Required address {0} is null")]
    NullAddress(&'static str),

    #[error("Page size {0} is not a non-zero power of two")]
    InvalidPageSize(usize),

    #[error("Code region {0} has zero length")]
    EmptyRegion(&'static str),
}

/// Returned by [`PatchSet::try_push`](crate::PatchSet::try_push) when the set is full.
#[cfg_attr(feature = "std", derive(thiserror::Error))]
#[cfg_attr(not(feature = "std"), derive(thiserror_no_std::Error))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[error("Patch set is full")]
pub struct CapacityError;
