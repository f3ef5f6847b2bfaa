pub mod events;
pub mod inbound;
pub mod integrations;
pub mod oauth;
pub mod partners;
