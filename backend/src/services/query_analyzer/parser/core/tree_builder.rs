//! Plan node normalizer
//!
//! Converts an ingested [`PlanTree`] into a [`PlanGraph`] of linear chains,
//! branching joins/unions and parallel subsequences, independent of the
//! engine's JSON shape.
//!
//! Chains are linked backwards: every node points at its `predecessor`,
//! and conversion returns the last node of the chain it produced. A
//! `Parallel`/`Authorize` node stores the last node of its inner chain as
//! `subsequence`, so the true end of a chain is found by following
//! subsequence links (see [`TreeBuilder::tail`]).

use crate::services::query_analyzer::models::{
    ChildSlots, OperatorFamily, OperatorId, PlanGraph, PlanNode, PlanNodeId, PlanTree,
};
use crate::services::query_analyzer::parser::core::OperatorParser;
use std::collections::HashSet;

/// Builder for normalized plan graphs
pub struct TreeBuilder;

impl TreeBuilder {
    /// Build the normalized graph; `root` is the last node of the outer chain
    pub fn build(tree: &PlanTree, max_depth: usize) -> PlanGraph {
        let mut state = BuildState { tree, max_depth, graph: PlanGraph::default(), visited: HashSet::new() };
        let last = state.convert(tree.root, None, 0);
        state.graph.root = last;
        state.graph
    }

    /// End of the chain through `id`, following subsequence links
    pub fn tail(graph: &PlanGraph, id: PlanNodeId) -> PlanNodeId {
        let mut current = id;
        let mut seen = HashSet::new();
        while seen.insert(current) {
            match graph.get(current).and_then(|node| node.subsequence) {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    /// Nodes of the chain ending at `last`, first to last, via predecessor links
    pub fn chain(graph: &PlanGraph, last: PlanNodeId) -> Vec<PlanNodeId> {
        let mut nodes = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(last);
        while let Some(id) = current {
            if !seen.insert(id) {
                break;
            }
            nodes.push(id);
            current = graph.get(id).and_then(|node| node.predecessor);
        }
        nodes.reverse();
        nodes
    }
}

struct BuildState<'a> {
    tree: &'a PlanTree,
    max_depth: usize,
    graph: PlanGraph,
    visited: HashSet<OperatorId>,
}

impl BuildState<'_> {
    /// Convert one operator; returns the last node of what it produced
    fn convert(&mut self, id: OperatorId, pred: Option<PlanNodeId>, depth: usize) -> Option<PlanNodeId> {
        if depth > self.max_depth || !self.visited.insert(id) {
            return pred;
        }
        let tree = self.tree;
        let op = tree.get(id)?;

        let Some(kind) = op.kind.as_deref() else {
            // Untagged container: its children run in order
            return self.convert_sequence(&op.children.ids(), pred, depth);
        };

        match OperatorParser::determine_family(kind) {
            OperatorFamily::Sequence => self.convert_sequence(&op.children.ids(), pred, depth),
            OperatorFamily::Parallel | OperatorFamily::Authorize => {
                let node = self.push_node(id, kind, pred);
                let inner = op.children.ids();
                let mut last = Some(node);
                for child in inner {
                    let from = last.map(|l| TreeBuilder::tail(&self.graph, l));
                    last = self.convert(child, from, depth + 1).or(last);
                }
                if last != Some(node) {
                    self.graph.nodes[node.0].subsequence = last;
                }
                Some(node)
            },
            OperatorFamily::DistinctScan => {
                let children = op.children.ids();
                if children.is_empty() {
                    Some(self.push_node(id, kind, pred))
                } else {
                    self.convert_sequence(&children, pred, depth)
                }
            },
            OperatorFamily::SetOperation | OperatorFamily::Join | OperatorFamily::Merge => {
                let node = self.push_node(id, kind, pred);
                let branches = Self::branch_order(&op.children);
                self.attach_branches(node, &branches, depth);
                Some(node)
            },
            _ => match &op.children {
                ChildSlots::None => Some(self.push_node(id, kind, pred)),
                ChildSlots::Single { child } => {
                    let child_last = self.convert(*child, pred, depth + 1);
                    let from = child_last.map(|l| TreeBuilder::tail(&self.graph, l));
                    Some(self.push_node(id, kind, from))
                },
                other => {
                    let node = self.push_node(id, kind, pred);
                    let branches = other.ids();
                    self.attach_branches(node, &branches, depth);
                    Some(node)
                },
            },
        }
    }

    /// Thread each child after the tail of the previous one
    fn convert_sequence(
        &mut self,
        children: &[OperatorId],
        pred: Option<PlanNodeId>,
        depth: usize,
    ) -> Option<PlanNodeId> {
        let mut last = pred;
        for child in children {
            let from = last.map(|l| TreeBuilder::tail(&self.graph, l));
            last = self.convert(*child, from, depth + 1).or(last);
        }
        last
    }

    /// Outer before inner; merge actions in insert/delete/update order
    fn branch_order(children: &ChildSlots) -> Vec<OperatorId> {
        match children {
            ChildSlots::Binary { first, second } => vec![*first, *second],
            other => other.ids(),
        }
    }

    /// Each branch starts an independent chain with no predecessor
    fn attach_branches(&mut self, node: PlanNodeId, branches: &[OperatorId], depth: usize) {
        let mut heads = Vec::with_capacity(branches.len());
        for branch in branches {
            if let Some(last) = self.convert(*branch, None, depth + 1) {
                heads.push(last);
            }
        }
        self.graph.nodes[node.0].children = heads;
    }

    fn push_node(&mut self, operator_id: OperatorId, kind: &str, pred: Option<PlanNodeId>) -> PlanNodeId {
        let id = PlanNodeId(self.graph.nodes.len());
        self.graph.nodes.push(PlanNode {
            id,
            operator_id,
            kind: kind.to_string(),
            predecessor: pred,
            subsequence: None,
            children: Vec::new(),
        });
        id
    }
}
