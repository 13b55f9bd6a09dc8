//! Observability for the accelerator.
//!
//! Metrics go through the `metrics` facade; the host installs whichever
//! recorder it uses. Logging uses `tracing` with one target per component:
//! `acc.registry`, `acc.gateway`, `acc.events`, `acc.communication`,
//! `acc.accelerator`, `acc.text_chat`, `acc.screen_sharing`.
//!
//! # Privacy by Default
//!
//! Session tokens are never logged. Async operations use
//! `#[instrument(skip_all)]` and add ids as explicit fields.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `acc_calls_total` | Counter | `event` | Calls started and ended |
//! | `acc_publish_total` | Counter | `status` | Publish outcomes |
//! | `acc_subscribe_total` | Counter | `stream_type`, `status` | Subscribe outcomes |
//! | `acc_admission_rejected_total` | Counter | none | Calls refused by the connection limit |
//! | `acc_events_dispatched_total` | Counter | none | Callback invocations on the event bus |
//! | `acc_subscribers_active` | Gauge | none | Subscribers currently in the registry |

pub mod metrics;

pub use metrics::{
    record_admission_rejected, record_call, record_events_dispatched, record_publish,
    record_subscribe, set_subscribers_active,
};
