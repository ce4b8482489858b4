//! Per-task compliance status and mission deployability.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::buffer::ComplianceConfig;
use crate::conflict::{BufferedZone, ConflictDetector};
use crate::error::{PlannerError, Result};
use crate::models::{Conflict, LatLng, Mission, RestrictionRule, Task, TaskStatus, Zone};

/// Mission-level deployability verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployabilityReport {
    pub deployable: bool,
    pub blocking_tasks: Vec<String>,
}

/// Read-only view of one task's validation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskValidation {
    pub task_id: String,
    pub task_name: String,
    pub status: TaskStatus,
    pub rule: RestrictionRule,
    pub conflicts: Vec<Conflict>,
    pub acknowledged: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ComplianceRuleEngine {
    config: ComplianceConfig,
    detector: ConflictDetector,
}

impl ComplianceRuleEngine {
    pub fn new(config: ComplianceConfig) -> Self {
        Self {
            config,
            detector: ConflictDetector::new(),
        }
    }

    pub fn config(&self) -> &ComplianceConfig {
        &self.config
    }

    /// Buffer every zone once at the configured distance.
    pub fn prepare<'a>(&self, zones: impl IntoIterator<Item = &'a Zone>) -> Vec<BufferedZone> {
        zones
            .into_iter()
            .map(|zone| {
                BufferedZone::new(
                    zone.clone(),
                    self.config.buffer_distance_m,
                    self.config.buffer_segments,
                )
            })
            .collect()
    }

    /// Stateless classification of a path against prepared zones.
    pub fn evaluate_path(
        &self,
        task_id: &str,
        points: &[LatLng],
        zones: &[BufferedZone],
    ) -> Vec<Conflict> {
        self.detector.detect_all(task_id, points, zones)
    }

    /// Recompute all conflicts for a task from scratch.
    ///
    /// Prior acknowledgments are discarded.
    pub fn revalidate(&self, task: &mut Task, zones: &[BufferedZone]) -> TaskStatus {
        task.conflicts = self.evaluate_path(&task.id, &task.path.positions(), zones);
        task.acknowledged.clear();
        let status = task.status();
        tracing::debug!(
            task_id = %task.id,
            conflicts = task.conflicts.len(),
            ?status,
            "Task revalidated"
        );
        status
    }

    /// Acknowledge one temporary-restriction conflict on a task in warning.
    ///
    /// Only tasks whose conflicts are all TFR-class accept acknowledgments.
    pub fn acknowledge(&self, task: &mut Task, zone_id: &str) -> Result<TaskStatus> {
        let reject = |reason: &str| PlannerError::InvalidAcknowledgment {
            task_id: task.id.clone(),
            zone_id: zone_id.to_string(),
            reason: reason.to_string(),
        };

        match task.status() {
            TaskStatus::Warning => {}
            TaskStatus::Prohibited => return Err(reject("task is prohibited")),
            TaskStatus::Clear => return Err(reject("task has no conflicts")),
            TaskStatus::Acknowledged => return Err(reject("task is already acknowledged")),
        }

        let conflict = task
            .conflicts
            .iter()
            .find(|conflict| conflict.zone_id == zone_id)
            .ok_or_else(|| reject("task has no conflict with this zone"))?;
        if !conflict.is_acknowledgeable() {
            return Err(reject("only temporary restriction conflicts can be acknowledged"));
        }
        if task.conflicts.iter().any(|other| !other.is_acknowledgeable()) {
            return Err(reject("task has conflicts that cannot be acknowledged"));
        }

        task.acknowledged.insert(zone_id.to_string());
        let status = task.status();
        tracing::info!(task_id = %task.id, zone_id, ?status, "Conflict acknowledged");
        Ok(status)
    }

    pub fn set_restriction_rule(&self, task: &mut Task, rule: RestrictionRule) {
        if task.rule != rule {
            tracing::info!(task_id = %task.id, ?rule, "Restriction rule changed");
        }
        task.rule = rule;
    }

    /// Whether a single task blocks deployment under its rule.
    pub fn is_blocking(task: &Task) -> bool {
        match (task.status(), task.rule) {
            (TaskStatus::Prohibited, _) => true,
            (TaskStatus::Warning, RestrictionRule::HardGeofence | RestrictionRule::AutoReroute) => {
                true
            }
            (TaskStatus::Warning, RestrictionRule::WarnRecord) => false,
            (TaskStatus::Clear | TaskStatus::Acknowledged, _) => false,
        }
    }

    /// Aggregate deployability; never fails.
    pub fn deployability_check(&self, mission: &Mission) -> DeployabilityReport {
        let blocking_tasks: Vec<String> = mission
            .tasks
            .iter()
            .filter(|task| Self::is_blocking(task))
            .map(|task| task.id.clone())
            .collect();

        for task in &mission.tasks {
            if task.rule == RestrictionRule::WarnRecord && task.status() == TaskStatus::Warning {
                tracing::warn!(
                    mission_id = %mission.id,
                    task_id = %task.id,
                    conflicts = task.conflicts.len(),
                    "Deploying with recorded warnings"
                );
            }
        }

        DeployabilityReport {
            deployable: blocking_tasks.is_empty(),
            blocking_tasks,
        }
    }

    pub fn validation_results(&self, mission: &Mission) -> Vec<TaskValidation> {
        mission
            .tasks
            .iter()
            .map(|task| TaskValidation {
                task_id: task.id.clone(),
                task_name: task.name.clone(),
                status: task.status(),
                rule: task.rule,
                conflicts: task.conflicts.clone(),
                acknowledged: task.acknowledged.clone(),
            })
            .collect()
    }
}
