//! Outbound webhook delivery.
//!
//! - [`webhook`]: the HTTP transport seam and its `reqwest` implementation.
//! - [`engine`]: fan-out, send attempts, replay and bulk replay.
//! - [`replay`]: bulk replay progress tracking.

pub mod engine;
pub mod replay;
pub mod webhook;

pub use engine::{BulkReplayHandle, DeliveryEngine, DispatchHandle};
pub use replay::{ReplayJobs, ReplayProgress};
pub use webhook::{HttpTransport, WebhookError, WebhookRequest, WebhookResponse, WebhookTransport};
