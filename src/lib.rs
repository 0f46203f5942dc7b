//! payrec - bank-transfer payment reconciliation service
//!
//! Users pay for subscription upgrades or credit top-ups via bank transfer.
//! Each payment request carries a unique transfer code embedded in the bank
//! description; incoming bank webhooks are reconciled against pending
//! requests and the matching account is credited exactly once.

pub mod auth;
pub mod code;
pub mod config;
pub mod credit;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod models;
pub mod notify;
pub mod reconcile;
pub mod sweeper;
pub mod util;
