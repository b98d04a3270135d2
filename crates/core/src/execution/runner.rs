//! Target executor
//!
//! Walks a resolved order strictly sequentially. A target whose marker exists
//! is skipped without looking at its artifacts; any other target runs its
//! action and gets a marker only on success. The first failure stops the run:
//! nothing after it is attempted and nothing it left on disk is cleaned up.

use std::fs;

use tracing::{info, warn};

use crate::configs::settings::Settings;
use crate::execution::command::CommandRunner;
use crate::execution::context::ActionContext;
use crate::markers::MarkerStore;
use crate::registry::{Action, TargetRegistry};
use crate::results::{PlanResult, PlannedTarget, RunEvent, RunReport, TargetStatus};
use crate::types::{ActionError, KilnError, KilnResult};
use crate::variants::VariantSelector;

pub struct Executor<'a> {
    settings: &'a Settings,
    runner: &'a dyn CommandRunner,
    selector: &'a dyn VariantSelector,
    markers: &'a dyn MarkerStore,
}

impl<'a> Executor<'a> {
    pub fn new(
        settings: &'a Settings,
        runner: &'a dyn CommandRunner,
        selector: &'a dyn VariantSelector,
        markers: &'a dyn MarkerStore,
    ) -> Self {
        Self {
            settings,
            runner,
            selector,
            markers,
        }
    }

    pub fn status(&self, registry: &TargetRegistry, name: &str) -> KilnResult<TargetStatus> {
        let target = registry.lookup(name)?;
        Ok(if target.is_aggregate() {
            TargetStatus::Aggregate
        } else if self.markers.exists(name) {
            TargetStatus::Done
        } else {
            TargetStatus::Pending
        })
    }

    /// Status of every target in `order` without running anything
    pub fn plan(&self, registry: &TargetRegistry, order: &[String]) -> KilnResult<PlanResult> {
        let targets = order
            .iter()
            .map(|name| {
                Ok(PlannedTarget {
                    name: name.clone(),
                    status: self.status(registry, name)?,
                })
            })
            .collect::<KilnResult<Vec<_>>>()?;
        Ok(PlanResult { targets })
    }

    pub fn execute(&self, registry: &TargetRegistry, order: &[String]) -> KilnResult<RunReport> {
        self.execute_with(registry, order, &mut |_| {})
    }

    /// Like [`Executor::execute`], reporting each step to `on_event` as it happens
    pub fn execute_with(
        &self,
        registry: &TargetRegistry,
        order: &[String],
        on_event: &mut dyn FnMut(RunEvent<'_>),
    ) -> KilnResult<RunReport> {
        let mut report = RunReport::default();

        for name in order {
            let target = registry.lookup(name)?;

            let Some(action) = target.action() else {
                on_event(RunEvent::Aggregate(name));
                report.aggregates.push(name.clone());
                continue;
            };

            if self.markers.exists(name) {
                info!(target_name = %name, "already done, skipping");
                on_event(RunEvent::Skipped(name));
                report.skipped.push(name.clone());
                continue;
            }

            info!(target_name = %name, "running");
            on_event(RunEvent::Started(name));
            if let Err(source) = self.run_target(name, action) {
                warn!(target_name = %name, "failed");
                on_event(RunEvent::Failed(name));
                return Err(KilnError::TargetFailed {
                    name: name.clone(),
                    source,
                });
            }
            info!(target_name = %name, "done");
            on_event(RunEvent::Finished(name));
            report.executed.push(name.clone());
        }

        Ok(report)
    }

    /// Runs the action, then writes the marker
    fn run_target(&self, name: &str, action: &Action) -> Result<(), ActionError> {
        let workspace = &self.settings.workspace_path;
        fs::create_dir_all(workspace)
            .map_err(|e| ActionError::io(format!("creating workspace {}", workspace.display()), e))?;

        let ctx = ActionContext::new(name, self.settings, self.runner, self.selector);
        action.run(&ctx)?;

        self.markers
            .mark(name)
            .map_err(|e| ActionError::io("writing completion marker", e))
    }
}
