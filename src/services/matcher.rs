//! Rule matcher — which configured dispatch rules apply to an event.

use std::sync::Arc;

use crate::models::event::Event;
use crate::models::rule::DispatchRule;
use crate::predicate::PredicateEngine;

pub struct RuleMatcher {
    rules: Vec<DispatchRule>,
    engine: Arc<dyn PredicateEngine>,
}

impl RuleMatcher {
    pub fn new(rules: Vec<DispatchRule>, engine: Arc<dyn PredicateEngine>) -> Self {
        Self { rules, engine }
    }

    /// Rules whose repository and action set accept the event, in
    /// configuration order. A rule predicate that fails to evaluate is a
    /// non-match, never an error. Empty result means the event is
    /// unsupported.
    pub fn matching_rules(&self, event: &Event) -> Vec<&DispatchRule> {
        self.rules
            .iter()
            .filter(|rule| {
                if !rule.accepts(event) {
                    return false;
                }
                match &rule.predicate {
                    None => true,
                    Some(expr) => {
                        let matched = self.engine.matches(expr, &event.payload, &event.headers);
                        if !matched {
                            tracing::debug!(
                                rule = %rule.name,
                                event_id = %event.id,
                                "Predicate did not match"
                            );
                        }
                        matched
                    }
                }
            })
            .collect()
    }
}
