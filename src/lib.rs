pub mod configuration;
pub mod domain;
pub mod email_client;
pub mod fallback;
pub mod retry;
pub mod routes;
pub mod startup;
pub mod store;
pub mod telemetry;
pub mod waitlist;
