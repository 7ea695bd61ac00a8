//! Dispatch services: rule matching, capacity gating, triggering, and the
//! loop that drives them.

pub mod capacity;
pub mod dispatcher;
pub mod github;
pub mod matcher;
pub mod trigger;
