//! Kernel-specific error types.

use tether_types::error::TetherError;
use thiserror::Error;

/// Kernel error type wrapping TetherError with kernel-specific context.
#[derive(Error, Debug)]
pub enum KernelError {
    /// A wrapped TetherError.
    #[error(transparent)]
    Tether(#[from] TetherError),

    /// The kernel failed to boot.
    #[error("Boot failed: {0}")]
    BootFailed(String),
}

/// Alias for kernel results.
pub type KernelResult<T> = Result<T, KernelError>;
