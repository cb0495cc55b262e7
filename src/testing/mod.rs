//! Testing infrastructure for flake.
//!
//! Test doubles for the two seams of the repetition loop: the external test
//! command ([`MockTestRunner`]) and the presenter ([`RecordingPresenter`],
//! [`SharedBuffer`] as an in-memory terminal).
//!
//! # Example
//!
//! ```rust,ignore
//! use flake::testing::{MockAttempt, MockTestRunner, RecordingPresenter};
//!
//! let runner = MockTestRunner::new()
//!     .with_script(vec![MockAttempt::Pass, MockAttempt::Fail(b"boom\n".to_vec())]);
//! let mut presenter = RecordingPresenter::new();
//! ```

pub mod mocks;

pub use mocks::*;
