//! Common types shared between the video accelerator and SDK adapters.
//!
//! Everything that crosses the boundary to the external video SDK lives
//! here, so adapters and test doubles only depend on this crate.

#![warn(clippy::pedantic)]

/// Module for the SDK-reported error type
pub mod error;

/// Module for identifiers, streams, connections and media properties
pub mod types;

/// Module for the video SDK boundary (trait, session events, handles)
pub mod sdk;

/// Module for secret types that prevent accidental logging
pub mod secret;
