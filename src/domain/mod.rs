//! Passive data model, persisted settings, and the pure control-mapping
//! policy. Nothing in here touches the transport.

pub mod control;
pub mod models;
pub mod settings;
