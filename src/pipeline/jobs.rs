//! The worklist handed from stage to stage.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::messages::MessageQueue;
use crate::config::RewriterConfig;
use crate::ir::node::{NodeRef, SourceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// A top-level script.
    Js,
    Css,
    Html,
    /// Consolidated script, ready for rendering.
    Module,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobKind::Js => "js",
            JobKind::Css => "css",
            JobKind::Html => "html",
            JobKind::Module => "module",
        };
        f.write_str(name)
    }
}

/// One unit of work. The job owns its tree.
#[derive(Debug, Clone)]
pub struct Job {
    pub kind: JobKind,
    root: NodeRef,
    pub source: Option<SourceId>,
}

impl Job {
    pub fn new(kind: JobKind, root: NodeRef) -> Self {
        Job { kind, root, source: None }
    }

    pub fn from_source(kind: JobKind, root: NodeRef, source: SourceId) -> Self {
        Job { kind, root, source: Some(source) }
    }

    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    /// Swaps in a new root, e.g. after the old root itself was rewritten.
    pub fn set_root(&mut self, root: NodeRef) {
        self.root = root;
    }
}

/// Host callbacks available to stages.
pub trait Environment {
    /// Fetches the content behind `uri`.
    fn load_resource(&self, uri: &str) -> anyhow::Result<String>;

    /// Maps `uri` to the URI that should appear in the output, or `None` to
    /// forbid referencing it.
    fn rewrite_uri(&self, uri: &str, _mime_type: &str) -> Option<String> {
        Some(uri.to_string())
    }
}

/// An environment with no resources that passes URIs through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEnvironment;

impl Environment for NullEnvironment {
    fn load_resource(&self, uri: &str) -> anyhow::Result<String> {
        anyhow::bail!("no resource loader available for {}", uri)
    }
}

/// Ordered jobs plus everything stages share: messages, configuration and
/// the host environment.
pub struct Jobs {
    jobs: Vec<Job>,
    messages: MessageQueue,
    config: Rc<RewriterConfig>,
    environment: Rc<dyn Environment>,
}

impl Jobs {
    pub fn new(config: Rc<RewriterConfig>) -> Self {
        Jobs { jobs: Vec::new(), messages: MessageQueue::new(), config, environment: Rc::new(NullEnvironment) }
    }

    pub fn with_environment(mut self, environment: Rc<dyn Environment>) -> Self {
        self.environment = environment;
        self
    }

    pub fn push(&mut self, job: Job) {
        self.jobs.push(job);
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Direct access to the worklist; stages may add, drop and reorder jobs.
    pub fn jobs_mut(&mut self) -> &mut Vec<Job> {
        &mut self.jobs
    }

    pub fn jobs_of_kind(&self, kind: JobKind) -> impl Iterator<Item = &Job> {
        self.jobs.iter().filter(move |job| job.kind == kind)
    }

    /// Removes the jobs of `kind`, returning them with their former indices.
    pub fn take_jobs_of_kind(&mut self, kind: JobKind) -> Vec<(usize, Job)> {
        let mut taken = Vec::new();
        let mut kept = Vec::with_capacity(self.jobs.len());
        for (index, job) in self.jobs.drain(..).enumerate() {
            if job.kind == kind {
                taken.push((index, job));
            } else {
                kept.push(job);
            }
        }
        self.jobs = kept;
        taken
    }

    pub fn messages(&self) -> &MessageQueue {
        &self.messages
    }

    pub fn messages_mut(&mut self) -> &mut MessageQueue {
        &mut self.messages
    }

    pub fn config(&self) -> &RewriterConfig {
        &self.config
    }

    pub fn environment(&self) -> Rc<dyn Environment> {
        Rc::clone(&self.environment)
    }

    /// True once the queue holds a message at or above the failure threshold.
    pub fn has_failed(&self) -> bool {
        self.messages.has_message_at_least(self.config.failure_threshold)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl fmt::Debug for Jobs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jobs")
            .field("jobs", &self.jobs)
            .field("messages", &self.messages.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Node;
    use crate::pipeline::messages::MessageLevel;

    fn jobs() -> Jobs {
        let mut jobs = Jobs::new(Rc::new(RewriterConfig::default()));
        jobs.push(Job::new(JobKind::Css, Node::noop()));
        jobs.push(Job::new(JobKind::Js, Node::reference("a")));
        jobs.push(Job::new(JobKind::Html, Node::noop()));
        jobs.push(Job::new(JobKind::Js, Node::reference("b")));
        jobs
    }

    #[test]
    fn test_take_jobs_of_kind_keeps_order() {
        let mut jobs = jobs();
        let taken = jobs.take_jobs_of_kind(JobKind::Js);
        let indices: Vec<usize> = taken.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![1, 3]);
        assert_eq!(taken[1].1.root().identifier_name().as_deref(), Some("b"));
        let kinds: Vec<JobKind> = jobs.jobs().iter().map(|j| j.kind).collect();
        assert_eq!(kinds, vec![JobKind::Css, JobKind::Html]);
    }

    #[test]
    fn test_failure_follows_threshold() {
        let mut jobs = jobs();
        jobs.messages_mut().post(MessageLevel::Warning, "w", "only a warning");
        assert!(!jobs.has_failed());
        jobs.messages_mut().post(MessageLevel::Error, "e", "broken");
        assert!(jobs.has_failed());
    }

    #[test]
    fn test_null_environment() {
        let env = NullEnvironment;
        assert!(env.load_resource("http://example.com/x.js").is_err());
        assert_eq!(env.rewrite_uri("a.css", "text/css").as_deref(), Some("a.css"));
    }
}
