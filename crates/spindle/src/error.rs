// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

use std::io;

/// Errors surfaced by fallible spindle operations.
///
/// Construction of the thread-backed engines is the only fallible operation in this crate;
/// everything else either succeeds or is a programming-contract violation that panics.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The OS refused to spawn a worker thread, typically due to resource exhaustion.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use super::*;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(Error: Debug, std::error::Error, Send, Sync);
    }

    #[test]
    fn spawn_error_message() {
        let err = Error::from(io::Error::other("out of threads"));
        assert_eq!(err.to_string(), "failed to spawn worker thread: out of threads");
    }
}
