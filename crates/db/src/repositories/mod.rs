pub mod inbound_event_repo;

pub use inbound_event_repo::{InboundEventRepo, InsertOutcome};
