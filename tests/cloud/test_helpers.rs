//! Shared fixtures for cloud lifecycle scenarios.

use std::cell::{Cell, RefCell};
use std::time::Duration;

use rstest::fixture;
use ruslan::cloud::BatchOutcome;
use ruslan::test_support::FakeCloud;
use ruslan::{CloudError, Instance, InstanceManager};

/// State threaded through the steps of one cloud scenario.
pub struct CloudContext {
    pub cloud: FakeCloud,
    pub manager: InstanceManager<FakeCloud>,
    pub instance_id: RefCell<Option<String>>,
    pub power_result: RefCell<Option<Result<Instance, CloudError>>>,
    pub terminate_result: RefCell<Option<Result<(), CloudError>>>,
    pub batch: RefCell<Option<BatchOutcome>>,
    pub elapsed: Cell<Duration>,
}

impl CloudContext {
    fn new() -> Self {
        let cloud = FakeCloud::new();
        Self {
            manager: InstanceManager::new(cloud.clone()),
            cloud,
            instance_id: RefCell::new(None),
            power_result: RefCell::new(None),
            terminate_result: RefCell::new(None),
            batch: RefCell::new(None),
            elapsed: Cell::new(Duration::ZERO),
        }
    }

    /// Identifier of the instance the scenario set up.
    pub fn instance_id(&self) -> String {
        self.instance_id
            .borrow()
            .clone()
            .unwrap_or_else(|| panic!("the scenario should create an instance first"))
    }

    /// Outcome of the last start or stop.
    pub fn power_result(&self) -> Result<Instance, CloudError> {
        self.power_result
            .borrow()
            .clone()
            .unwrap_or_else(|| panic!("the scenario should start or stop an instance first"))
    }

    /// Outcome of the last batch creation.
    pub fn batch(&self) -> BatchOutcome {
        self.batch
            .borrow()
            .clone()
            .unwrap_or_else(|| panic!("the scenario should create a batch first"))
    }
}

#[fixture]
pub fn cloud_context() -> CloudContext {
    CloudContext::new()
}

/// Splits a comma-separated step argument into trimmed names.
pub fn names(list: &str) -> Vec<String> {
    list.split(',').map(|name| name.trim().to_owned()).collect()
}
