//! Shared fixtures for retry BDD scenarios.

use std::cell::RefCell;
use std::sync::Arc;

use rstest::fixture;
use ruslan::remote::SessionCache;
use ruslan::test_support::ScriptedConnector;
use ruslan::{RetryError, RetryOrchestrator, RetryPolicy};

/// State threaded through the steps of one retry scenario.
pub struct RetryContext {
    pub connector: ScriptedConnector,
    pub orchestrator: RetryOrchestrator<ScriptedConnector>,
    pub policy: RefCell<RetryPolicy>,
    pub outcome: RefCell<Option<Result<String, RetryError>>>,
}

impl RetryContext {
    fn new() -> Self {
        let connector = ScriptedConnector::new();
        let orchestrator = RetryOrchestrator::new(Arc::new(SessionCache::new(connector.clone())));
        Self {
            connector,
            orchestrator,
            policy: RefCell::new(RetryPolicy::default()),
            outcome: RefCell::new(None),
        }
    }

    /// Returns a copy of the recorded outcome, panicking when no run happened.
    pub fn outcome(&self) -> Result<String, RetryError> {
        self.outcome
            .borrow()
            .clone()
            .unwrap_or_else(|| panic!("the scenario should run a command before asserting"))
    }
}

#[fixture]
pub fn retry_context() -> RetryContext {
    RetryContext::new()
}
