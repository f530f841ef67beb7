//! Stages shipped with the crate.

use std::rc::Rc;

use tracing::debug;

use super::jobs::{Job, JobKind, Jobs};
use super::messages::{Message, MessageLevel};
use super::Stage;
use crate::ir::node::{KindTag, Node, NodeKind, NodeRef, SourceRange};
use crate::ir::quasi::{Rewriter, RuleSet};
use crate::ir::visitor_fn;

/// Applies a [`RuleSet`] to the trees of every job of the selected kinds.
pub struct RewriteStage {
    id: String,
    dependencies: Vec<String>,
    rules: Rc<RuleSet>,
    kinds: Vec<JobKind>,
}

impl RewriteStage {
    pub fn new(id: &str, rules: Rc<RuleSet>, kinds: &[JobKind]) -> Self {
        RewriteStage { id: id.to_string(), dependencies: Vec::new(), rules, kinds: kinds.to_vec() }
    }

    pub fn depends_on(mut self, id: &str) -> Self {
        self.dependencies.push(id.to_string());
        self
    }
}

impl Stage for RewriteStage {
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn apply(&self, jobs: &mut Jobs) -> bool {
        let rewriter = Rewriter::new(&self.rules);
        let mut posted = Vec::new();
        let mut ok = true;

        for job in jobs.jobs_mut().iter_mut().filter(|job| self.kinds.contains(&job.kind)) {
            match rewriter.rewrite(job.root()) {
                Ok(outcome) => {
                    for name in &outcome.applied {
                        posted.push(Message::new(MessageLevel::Log, "rule_applied", format!("applied rule '{}'", name)));
                    }
                    job.set_root(outcome.root);
                }
                Err(err) => {
                    ok = false;
                    let message = Message::new(MessageLevel::FatalError, "rewrite_failed", err.to_string());
                    posted.push(message.at(job.root().range()));
                }
            }
        }

        for message in posted {
            jobs.messages_mut().add(message);
        }
        ok
    }
}

/// Merges every `Js` job into a single job whose tree is one `Block`, wrapped
/// in a `Module` when the configuration asks for it.
///
/// The merged job takes the position of the first script job. Bare
/// expressions become expression statements.
#[derive(Debug, Clone)]
pub struct ConsolidateStage {
    id: String,
    dependencies: Vec<String>,
}

impl ConsolidateStage {
    pub fn new(id: &str) -> Self {
        ConsolidateStage { id: id.to_string(), dependencies: Vec::new() }
    }

    pub fn depends_on(mut self, id: &str) -> Self {
        self.dependencies.push(id.to_string());
        self
    }
}

impl Default for ConsolidateStage {
    fn default() -> Self {
        ConsolidateStage::new("consolidate")
    }
}

/// The statements a script root contributes to the merged block.
fn statements_of(root: &NodeRef) -> Option<Vec<NodeRef>> {
    match root.tag() {
        KindTag::Block => Some(root.children().iter().cloned().collect()),
        KindTag::Module => root.child(0).and_then(|block| statements_of(&block)),
        KindTag::QuasiHole => Some(vec![Rc::clone(root)]),
        tag if tag.is_statement() => Some(vec![Rc::clone(root)]),
        tag if tag.is_expression() => {
            let range = root.range();
            Node::new_at(NodeKind::ExpressionStmt, [Rc::clone(root)], range).ok().map(|stmt| vec![stmt])
        }
        _ => None,
    }
}

fn span_all(ranges: impl Iterator<Item = Option<SourceRange>>) -> Option<SourceRange> {
    let mut ranges = ranges.flatten();
    let first = ranges.next()?;
    ranges.try_fold(first, |joined, next| joined.span(&next))
}

impl Stage for ConsolidateStage {
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn apply(&self, jobs: &mut Jobs) -> bool {
        let scripts = jobs.take_jobs_of_kind(JobKind::Js);
        let Some(first_index) = scripts.first().map(|(index, _)| *index) else {
            return true;
        };

        let mut statements = Vec::new();
        let mut ok = true;
        for (_, job) in &scripts {
            match statements_of(job.root()) {
                Some(found) => statements.extend(found),
                None => {
                    ok = false;
                    let text = format!("a {} cannot appear at the top level of a script", job.root().tag());
                    let message = Message::new(MessageLevel::Error, "not_a_script", text).at(job.root().range());
                    jobs.messages_mut().add(message);
                }
            }
        }

        let range = span_all(scripts.iter().map(|(_, job)| job.root().range()));
        let source = range.as_ref().map(|range| range.source.clone());
        let merged = Node::new_at(NodeKind::Block, statements, range.clone()).and_then(|block| {
            if jobs.config().wrap_modules {
                Node::new_at(NodeKind::Module, [block], range).map(|module| (JobKind::Module, module))
            } else {
                Ok((JobKind::Js, block))
            }
        });

        let (kind, root) = match merged {
            Ok(merged) => merged,
            Err(err) => {
                jobs.messages_mut().add(Message::new(MessageLevel::FatalError, "consolidation_failed", err.to_string()));
                return false;
            }
        };

        debug!("Consolidated {} script job(s) into one {} job", scripts.len(), kind);
        let mut job = Job::new(kind, root);
        job.source = source;
        let at = first_index.min(jobs.len());
        jobs.jobs_mut().insert(at, job);
        ok
    }
}

/// Reports every pattern placeholder left in a job tree as a fatal error.
#[derive(Debug, Clone)]
pub struct HoleCheckStage {
    id: String,
    dependencies: Vec<String>,
}

impl HoleCheckStage {
    pub fn new(id: &str) -> Self {
        HoleCheckStage { id: id.to_string(), dependencies: Vec::new() }
    }

    pub fn depends_on(mut self, id: &str) -> Self {
        self.dependencies.push(id.to_string());
        self
    }
}

impl Default for HoleCheckStage {
    fn default() -> Self {
        HoleCheckStage::new("check-holes")
    }
}

impl Stage for HoleCheckStage {
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn apply(&self, jobs: &mut Jobs) -> bool {
        let mut found = Vec::new();
        for job in jobs.jobs() {
            let mut check = visitor_fn(|chain| {
                let node = chain.node();
                if let Some(hole) = node.as_hole() {
                    let text = format!("unexpanded placeholder {} in {} job at {}", hole, job.kind, chain.path());
                    found.push(Message::new(MessageLevel::FatalError, "unexpanded_hole", text).at(node.range()));
                }
                true
            });
            job.root().accept_pre_order(&mut check, None);
        }

        let clean = found.is_empty();
        for message in found {
            jobs.messages_mut().add(message);
        }
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RewriterConfig;
    use crate::ir::SourceId;
    use crate::ir::quasi::{Rule, parse_tree, parse_tree_with_source};

    fn jobs_with(config: RewriterConfig) -> Jobs {
        Jobs::new(Rc::new(config))
    }

    fn script(source: &str) -> Job {
        Job::new(JobKind::Js, parse_tree(source).unwrap())
    }

    #[test]
    fn test_rewrite_stage_only_touches_selected_kinds() {
        let rules = Rc::new(RuleSet::new().with_rule(Rule::parse("zero", "(Operation + @x 0)", "@x").unwrap()));
        let mut jobs = jobs_with(RewriterConfig::default());
        jobs.push(script("(Operation + a 0)"));
        jobs.push(Job::new(JobKind::Css, parse_tree("(Operation + b 0)").unwrap()));

        assert!(RewriteStage::new("fold", rules, &[JobKind::Js]).apply(&mut jobs));
        assert!(jobs.jobs()[0].root().structurally_equal(&Node::reference("a")));
        assert_eq!(jobs.jobs()[1].root().tag(), KindTag::Operation);
        assert_eq!(jobs.messages().with_code("rule_applied").count(), 1);
    }

    #[test]
    fn test_consolidate_merges_scripts_in_place() {
        let mut jobs = jobs_with(RewriterConfig::default());
        jobs.push(Job::new(JobKind::Html, Node::noop()));
        jobs.push(script("(Block (ExpressionStmt a) (ExpressionStmt b))"));
        jobs.push(Job::new(JobKind::Css, Node::noop()));
        jobs.push(script("(Operation call f)"));

        assert!(ConsolidateStage::default().apply(&mut jobs));
        let kinds: Vec<JobKind> = jobs.jobs().iter().map(|job| job.kind).collect();
        assert_eq!(kinds, vec![JobKind::Html, JobKind::Module, JobKind::Css]);

        let expected = parse_tree("(Module (Block (ExpressionStmt a) (ExpressionStmt b) (ExpressionStmt (Operation call f))))");
        assert!(jobs.jobs()[1].root().structurally_equal(&expected.unwrap()));
    }

    #[test]
    fn test_consolidate_without_module_wrapper_spans_ranges() {
        let config = RewriterConfig { wrap_modules: false, ..RewriterConfig::default() };
        let mut jobs = jobs_with(config);
        let source = SourceId::new("page.html");
        jobs.push(Job::new(JobKind::Js, parse_tree_with_source("(ExpressionStmt a)", source.clone()).unwrap()));
        jobs.push(Job::new(JobKind::Js, parse_tree_with_source("\n\n(ExpressionStmt b)", source.clone()).unwrap()));

        assert!(ConsolidateStage::default().apply(&mut jobs));
        assert_eq!(jobs.len(), 1);
        let root = jobs.jobs()[0].root();
        assert_eq!(root.tag(), KindTag::Block);
        let range = root.range().unwrap();
        assert_eq!((range.start.row, range.end.row), (0, 2));
        assert_eq!(jobs.jobs()[0].source.as_ref(), Some(&source));
    }

    #[test]
    fn test_consolidate_rejects_fragments() {
        let mut jobs = jobs_with(RewriterConfig::default());
        jobs.push(Job::new(JobKind::Js, Node::identifier("stray")));
        jobs.push(script("(ExpressionStmt a)"));

        assert!(!ConsolidateStage::default().apply(&mut jobs));
        assert_eq!(jobs.messages().with_code("not_a_script").count(), 1);
        assert_eq!(jobs.len(), 1);
    }

    #[test]
    fn test_hole_check() {
        let mut jobs = jobs_with(RewriterConfig::default());
        jobs.push(script("(ExpressionStmt (Operation + a 1))"));
        assert!(HoleCheckStage::default().apply(&mut jobs));

        jobs.push(script("(ExpressionStmt (Operation + @left 1))"));
        assert!(!HoleCheckStage::default().apply(&mut jobs));
        let messages: Vec<_> = jobs.messages().with_code("unexpanded_hole").collect();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].level, MessageLevel::FatalError);
        assert!(messages[0].text.contains("@left"), "{}", messages[0].text);
    }
}
