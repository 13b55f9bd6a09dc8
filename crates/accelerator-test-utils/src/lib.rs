//! # Accelerator Test Utilities
//!
//! Shared test utilities for the video accelerator.
//!
//! This crate provides an in-memory video SDK and test fixtures so the
//! accelerator can be exercised without a real media session.
//!
//! ## Modules
//!
//! - `mock_sdk` - Scriptable `VideoSdk` implementation with call recording
//! - `fixtures` - Pre-configured test data (streams, connections, credentials)
//! - `EventRecorder` - Records events raised on an accelerator's event bus
//!
//! ## Usage
//!
//! ```rust,ignore
//! use accelerator_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     init_test_tracing();
//!
//!     // SDK that fails every publish with a network error
//!     let sdk = MockSdk::builder()
//!         .fail_publish_with(1010, "network down")
//!         .build();
//!
//!     let remote = TestStream::camera("stream-1").build();
//!     sdk.emit(SessionEvent::StreamCreated(remote));
//!
//!     // Run your test...
//! }
//! ```

pub mod fixtures;
pub mod mock_sdk;

pub use accelerator_core::events::EventRecorder;
pub use fixtures::*;
pub use mock_sdk::*;

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
/// Honours `RUST_LOG`, defaulting to debug output for the accelerator.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "accelerator_core=debug,acc=debug".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
