//! Pipeline-target matching.
//!
//! Some hazards only exist as producer→consumer pairs: `curl … | bash` is
//! dangerous even though neither command is on its own. Rules carrying
//! `pipe_targets` are evaluated here, against the bare command names of each
//! top-level pipeline, and never by the per-command matcher.
//!
//! Stages do not need to be adjacent: `curl x | tee log | bash` still pairs
//! curl with bash. Pipelines nested inside logical combinators are not
//! scanned; sequences and subshell groupings are.

use crate::extract::basename;
use crate::rules::Rule;
use crate::shell::ShellNode;
use smallvec::SmallVec;

/// Bare command names of one pipeline, in stage order.
type StageNames = SmallVec<[String; 8]>;

/// Find the first pipeline rule (in declared order) satisfied by any
/// top-level pipeline in the tree.
///
/// Only block rules with non-empty `pipe_targets` participate. A rule is
/// satisfied when some stage matches its source-command filter and any later
/// stage of the same pipeline is one of its pipe targets.
#[must_use]
pub fn match_pipeline<'r>(root: &ShellNode, block_rules: &'r [Rule]) -> Option<&'r Rule> {
    let mut pipelines: Vec<StageNames> = Vec::new();
    collect_pipelines(root, &mut pipelines);
    if pipelines.is_empty() {
        return None;
    }

    block_rules
        .iter()
        .filter(|rule| rule.is_pipeline_rule())
        .find(|rule| pipelines.iter().any(|stages| rule_fires(rule, stages)))
}

fn rule_fires(rule: &Rule, stages: &[String]) -> bool {
    stages.iter().enumerate().any(|(i, stage)| {
        let source_matches = rule
            .command
            .as_ref()
            .is_none_or(|filter| filter.matches(stage));
        source_matches
            && stages[i + 1..]
                .iter()
                .any(|later| rule.pipe_targets.iter().any(|t| t == basename(later)))
    })
}

/// Walk sequences and groupings collecting direct pipeline nodes.
///
/// Logical operands are deliberately skipped: the contract covers only
/// top-level pipelines.
fn collect_pipelines(node: &ShellNode, out: &mut Vec<StageNames>) {
    match node {
        ShellNode::Sequence(children) => {
            for child in children {
                collect_pipelines(child, out);
            }
        }
        ShellNode::Grouping(inner) => collect_pipelines(inner, out),
        ShellNode::Pipeline(stages) => {
            let names: StageNames = stages
                .iter()
                .filter_map(ShellNode::command_name)
                .map(str::to_owned)
                .collect();
            if names.len() > 1 {
                out.push(names);
            }
        }
        ShellNode::Logical { .. } | ShellNode::Command { .. } | ShellNode::Unknown => {}
    }
}
