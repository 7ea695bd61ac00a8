//! Domain records: webhook events and dispatch rules.

pub mod event;
pub mod rule;
