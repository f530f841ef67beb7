//! Ordered stages run over a shared [`Jobs`] worklist.

pub mod jobs;
pub mod messages;
pub mod stages;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use crate::config::RewriterConfig;

pub use jobs::{Environment, Job, JobKind, Jobs, NullEnvironment};
pub use messages::{Message, MessageLevel, MessageQueue};
pub use stages::{ConsolidateStage, HoleCheckStage, RewriteStage};

/// One pass over the worklist.
pub trait Stage {
    /// Unique identifier within a pipeline.
    fn id(&self) -> &str;

    /// Ids of the stages that must run before this one.
    fn dependencies(&self) -> &[String] {
        &[]
    }

    /// Runs the stage. Returns false if the stage failed; details go to the
    /// message queue.
    fn apply(&self, jobs: &mut Jobs) -> bool;
}

type StageFn = dyn Fn(&mut Jobs) -> bool;

/// A stage backed by a closure.
pub struct FnStage {
    id: String,
    dependencies: Vec<String>,
    run: Box<StageFn>,
}

impl FnStage {
    pub fn new<F>(id: &str, run: F) -> Self
    where
        F: Fn(&mut Jobs) -> bool + 'static,
    {
        FnStage { id: id.to_string(), dependencies: Vec::new(), run: Box::new(run) }
    }

    pub fn depends_on(mut self, id: &str) -> Self {
        self.dependencies.push(id.to_string());
        self
    }
}

impl Stage for FnStage {
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn apply(&self, jobs: &mut Jobs) -> bool {
        (self.run)(jobs)
    }
}

impl fmt::Debug for FnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStage").field("id", &self.id).field("dependencies", &self.dependencies).finish()
    }
}

/// What the pipeline does after a stage reports failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep running so later stages can add their diagnostics.
    #[default]
    Continue,
    FailFast,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("a stage with id '{0}' is already registered")]
    DuplicateStage(String),

    #[error("stage '{stage}' depends on '{dependency}', which is not registered")]
    MissingDependency { stage: String, dependency: String },

    #[error("stage '{stage}' is still required by '{required_by}'")]
    StillRequired { stage: String, required_by: String },

    #[error("no stage with id '{0}'")]
    UnknownStage(String),
}

/// Summary of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// Ids of the stages that ran, in order.
    pub executed: Vec<String>,
    /// Ids of the stages that reported failure.
    pub failed: Vec<String>,
    pub max_level: Option<MessageLevel>,
    pub success: bool,
}

/// Runs stages in registration order.
///
/// Since a stage may only be added once all of its dependencies are present,
/// registration order is always a valid execution order.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    policy: FailurePolicy,
}

impl Pipeline {
    /// Creates an empty pipeline that continues past failing stages.
    pub fn new() -> Self {
        Pipeline::default()
    }

    pub fn with_policy(policy: FailurePolicy) -> Self {
        Pipeline { stages: Vec::new(), policy }
    }

    pub fn from_config(config: &RewriterConfig) -> Self {
        Pipeline::with_policy(config.failure_policy)
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Appends a stage.
    ///
    /// # Arguments
    /// * `stage` - The stage to add. Every id it depends on must already be registered.
    pub fn add_stage(&mut self, stage: impl Stage + 'static) -> Result<(), PipelineError> {
        let id = stage.id();
        if self.position(id).is_some() {
            return Err(PipelineError::DuplicateStage(id.to_string()));
        }
        if let Some(dependency) = stage.dependencies().iter().find(|dep| self.position(dep).is_none()) {
            return Err(PipelineError::MissingDependency { stage: id.to_string(), dependency: dependency.clone() });
        }
        debug!("Registered stage '{}'", id);
        self.stages.push(Box::new(stage));
        Ok(())
    }

    /// Removes a stage by id.
    ///
    /// # Arguments
    /// * `id` - The id of the stage to remove. No remaining stage may depend on it.
    pub fn remove_stage(&mut self, id: &str) -> Result<(), PipelineError> {
        let index = self.position(id).ok_or_else(|| PipelineError::UnknownStage(id.to_string()))?;
        if let Some(dependent) = self.stages.iter().find(|stage| stage.dependencies().iter().any(|dep| dep == id)) {
            return Err(PipelineError::StillRequired { stage: id.to_string(), required_by: dependent.id().to_string() });
        }
        self.stages.remove(index);
        Ok(())
    }

    pub fn stage_ids(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.stages.iter().position(|stage| stage.id() == id)
    }

    /// Runs every stage and returns overall success.
    pub fn apply(&self, jobs: &mut Jobs) -> bool {
        self.run(jobs).success
    }

    /// Runs every stage over `jobs`.
    ///
    /// # Returns
    /// A report whose `success` is true when no stage failed and no message
    /// reached the configured failure threshold.
    pub fn run(&self, jobs: &mut Jobs) -> PipelineReport {
        let mut executed = Vec::with_capacity(self.stages.len());
        let mut failed = Vec::new();

        for stage in &self.stages {
            let _span = info_span!("stage", id = stage.id()).entered();
            let before = jobs.messages().len();
            let ok = stage.apply(jobs);
            executed.push(stage.id().to_string());
            debug!(
                "Stage finished with {} new message(s), {} job(s)",
                jobs.messages().len().saturating_sub(before),
                jobs.len()
            );
            if !ok {
                warn!("Stage '{}' failed", stage.id());
                failed.push(stage.id().to_string());
                if self.policy == FailurePolicy::FailFast {
                    break;
                }
            }
        }

        let max_level = jobs.messages().max_level();
        let success = failed.is_empty() && !jobs.has_failed();
        info!(
            "Pipeline ran {}/{} stage(s): {}",
            executed.len(),
            self.stages.len(),
            if success { "success" } else { "failure" }
        );
        PipelineReport { executed, failed, max_level, success }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline").field("stages", &self.stage_ids()).field("policy", &self.policy).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    fn jobs() -> Jobs {
        Jobs::new(Rc::new(RewriterConfig::default()))
    }

    #[test]
    fn test_dependencies_must_be_registered_first() {
        let mut pipeline = Pipeline::new();
        let err = pipeline.add_stage(FnStage::new("late", |_| true).depends_on("early")).unwrap_err();
        assert_eq!(err, PipelineError::MissingDependency { stage: "late".into(), dependency: "early".into() });

        pipeline.add_stage(FnStage::new("early", |_| true)).unwrap();
        pipeline.add_stage(FnStage::new("late", |_| true).depends_on("early")).unwrap();
        assert_eq!(pipeline.stage_ids(), vec!["early", "late"]);

        assert_eq!(
            pipeline.add_stage(FnStage::new("early", |_| true)),
            Err(PipelineError::DuplicateStage("early".into()))
        );
    }

    #[test]
    fn test_remove_stage() {
        let mut pipeline = Pipeline::new();
        pipeline.add_stage(FnStage::new("a", |_| true)).unwrap();
        pipeline.add_stage(FnStage::new("b", |_| true).depends_on("a")).unwrap();

        assert!(matches!(pipeline.remove_stage("a"), Err(PipelineError::StillRequired { .. })));
        assert_eq!(pipeline.remove_stage("zzz"), Err(PipelineError::UnknownStage("zzz".into())));
        pipeline.remove_stage("b").unwrap();
        pipeline.remove_stage("a").unwrap();
        assert!(pipeline.is_empty());
    }

    #[test]
    fn test_failing_stage_does_not_stop_later_stages() {
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        let mut pipeline = Pipeline::new();
        pipeline.add_stage(FnStage::new("fails", |_| false)).unwrap();
        pipeline
            .add_stage(FnStage::new("after", move |_| {
                flag.set(true);
                true
            }))
            .unwrap();

        let report = pipeline.run(&mut jobs());
        assert!(ran.get());
        assert_eq!(report.failed, vec!["fails".to_string()]);
        assert!(!report.success);
    }

    #[test]
    fn test_fail_fast_stops() {
        let mut pipeline = Pipeline::with_policy(FailurePolicy::FailFast);
        pipeline.add_stage(FnStage::new("fails", |_| false)).unwrap();
        pipeline.add_stage(FnStage::new("never", |_| true)).unwrap();

        let report = pipeline.run(&mut jobs());
        assert_eq!(report.executed, vec!["fails".to_string()]);
    }

    #[test]
    fn test_messages_decide_success() {
        let mut pipeline = Pipeline::new();
        pipeline
            .add_stage(FnStage::new("warns", |jobs| {
                jobs.messages_mut().post(MessageLevel::Warning, "w", "careful");
                true
            }))
            .unwrap();
        let mut work = jobs();
        assert!(pipeline.apply(&mut work));

        pipeline
            .add_stage(FnStage::new("errs", |jobs| {
                jobs.messages_mut().post(MessageLevel::Error, "e", "broken");
                true
            }))
            .unwrap();
        let report = pipeline.run(&mut jobs());
        assert!(report.failed.is_empty());
        assert_eq!(report.max_level, Some(MessageLevel::Error));
        assert!(!report.success);
    }

    #[test]
    fn test_stage_may_drain_the_message_queue() {
        let mut pipeline = Pipeline::new();
        pipeline
            .add_stage(FnStage::new("noisy", |jobs| {
                jobs.messages_mut().post(MessageLevel::Error, "e", "broken");
                true
            }))
            .unwrap();
        pipeline
            .add_stage(FnStage::new("drain", |jobs| {
                jobs.messages_mut().clear();
                true
            }))
            .unwrap();

        let subscriber = tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).with_test_writer().finish();
        let report = tracing::subscriber::with_default(subscriber, || pipeline.run(&mut jobs()));
        assert_eq!(report.executed, vec!["noisy".to_string(), "drain".to_string()]);
        assert_eq!(report.max_level, None);
        assert!(report.success);
    }
}
