pub mod inbound_event;
