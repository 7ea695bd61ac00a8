//! Predicate evaluation for dispatch rules.
//!
//! Rules can carry a boolean expression over the event body and headers.
//! The engine fails closed: any compile or runtime error is logged and
//! reported as a non-match, never propagated.

use std::collections::BTreeMap;

use cel_interpreter::{Context, Program, Value};

/// Narrow seam over the concrete expression engine.
pub trait PredicateEngine: Send + Sync {
    /// Evaluate `expression` against `{body, headers}`. Returns `true` only
    /// for a successful evaluation yielding boolean true.
    fn matches(
        &self,
        expression: &str,
        body: &serde_json::Value,
        headers: &BTreeMap<String, String>,
    ) -> bool;
}

/// CEL-backed implementation.
pub struct CelEngine;

impl PredicateEngine for CelEngine {
    fn matches(
        &self,
        expression: &str,
        body: &serde_json::Value,
        headers: &BTreeMap<String, String>,
    ) -> bool {
        let program = match Program::compile(expression) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(expression, "Predicate failed to compile: {e}");
                return false;
            }
        };

        let mut ctx = Context::default();
        if let Err(e) = ctx.add_variable("body", body) {
            tracing::warn!(expression, "Predicate context error: {e}");
            return false;
        }
        if let Err(e) = ctx.add_variable("headers", headers) {
            tracing::warn!(expression, "Predicate context error: {e}");
            return false;
        }

        match program.execute(&ctx) {
            Ok(Value::Bool(b)) => b,
            Ok(other) => {
                tracing::warn!(
                    expression,
                    "Predicate evaluated to non-boolean {other:?}, treating as non-match"
                );
                false
            }
            Err(e) => {
                // Missing fields, type errors, division by zero: all non-match.
                tracing::debug!(expression, "Predicate evaluation error: {e}");
                false
            }
        }
    }
}
