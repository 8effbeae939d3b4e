//! Operator tree walker
//!
//! Depth-first, pre-order traversal over every canonical child slot of a
//! [`PlanTree`]. A visited set keeps corrupt (cyclic) arenas from looping
//! and a depth budget stops descent into pathologically deep plans.

use crate::services::query_analyzer::models::{OperatorId, PlanToken, PlanTree};
use crate::utils::BoundedCache;
use std::collections::HashSet;
use std::rc::Rc;

/// Whether subquery executions are part of the walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalkScope {
    IncludeSubqueries,
    MainPlanOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct WalkKey {
    token: PlanToken,
    root: OperatorId,
    scope: WalkScope,
    max_depth: usize,
}

/// Walker with a memo of complete walk results
#[derive(Debug)]
pub struct OperatorWalker {
    max_depth: usize,
    cache: BoundedCache<WalkKey, Rc<[OperatorId]>>,
}

impl OperatorWalker {
    pub fn new(max_depth: usize, capacity: usize) -> Self {
        Self { max_depth, cache: BoundedCache::new(capacity) }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Walk from the plan root
    pub fn walk_plan(&mut self, tree: &PlanTree, scope: WalkScope) -> Rc<[OperatorId]> {
        self.walk(tree, tree.root, scope)
    }

    /// Operators carrying a kind tag, in pre-order; memoized per plan token
    pub fn walk(&mut self, tree: &PlanTree, root: OperatorId, scope: WalkScope) -> Rc<[OperatorId]> {
        let key = WalkKey { token: tree.token, root, scope, max_depth: self.max_depth };
        let max_depth = self.max_depth;
        Rc::clone(
            self.cache
                .get_or_insert_with(key, || Self::collect(tree, root, scope, max_depth).into()),
        )
    }

    pub fn cached_walks(&self) -> usize {
        self.cache.len()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Uncached traversal
    ///
    /// The root sits at depth 0; operators deeper than `max_depth` are not
    /// visited. Operators without a kind tag are traversed but not emitted.
    pub fn collect(
        tree: &PlanTree,
        root: OperatorId,
        scope: WalkScope,
        max_depth: usize,
    ) -> Vec<OperatorId> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(root, 0usize)];

        while let Some((id, depth)) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(op) = tree.get(id) else { continue };

            if op.kind.is_some() {
                result.push(id);
            }

            if depth >= max_depth {
                continue;
            }

            let mut next = op.children.ids();
            if scope == WalkScope::IncludeSubqueries {
                next.extend(op.subqueries.iter().map(|sub| sub.root));
            }

            // Reverse so the first child is popped first
            for child in next.into_iter().rev() {
                if !visited.contains(&child) {
                    stack.push((child, depth + 1));
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::query_analyzer::models::{ChildSlots, PlanOperator, SubqueryExecution};

    fn kinds(tree: &PlanTree, ids: &[OperatorId]) -> Vec<String> {
        ids.iter().map(|id| tree.get(*id).unwrap().kind_str().to_string()).collect()
    }

    fn chain(depth: usize) -> PlanTree {
        let operators = (0..depth)
            .map(|i| {
                let op = PlanOperator::new(format!("Op{}", i));
                if i + 1 < depth {
                    op.with_children(ChildSlots::Single { child: OperatorId(i + 1) })
                } else {
                    op
                }
            })
            .collect();
        PlanTree::from_operators(operators, OperatorId(0))
    }

    #[test]
    fn test_pre_order_over_all_slots() {
        let operators = vec![
            PlanOperator::new("Sequence")
                .with_children(ChildSlots::List { children: vec![OperatorId(1), OperatorId(4)] }),
            PlanOperator::new("NestedLoopJoin")
                .with_children(ChildSlots::Binary { first: OperatorId(2), second: OperatorId(3) }),
            PlanOperator::new("IndexScan3"),
            PlanOperator::new("Fetch"),
            PlanOperator::new("Merge").with_children(ChildSlots::Merge {
                insert: Some(OperatorId(5)),
                delete: None,
                update: Some(OperatorId(6)),
            }),
            PlanOperator::new("SendInsert"),
            PlanOperator::new("SendUpdate"),
        ];
        let tree = PlanTree::from_operators(operators, OperatorId(0));

        let ids = OperatorWalker::collect(&tree, tree.root, WalkScope::IncludeSubqueries, 50);
        assert_eq!(
            kinds(&tree, &ids),
            vec!["Sequence", "NestedLoopJoin", "IndexScan3", "Fetch", "Merge", "SendInsert", "SendUpdate"]
        );
    }

    #[test]
    fn test_cycle_terminates_with_each_operator_once() {
        // A -> B -> A
        let operators = vec![
            PlanOperator::new("A").with_children(ChildSlots::Single { child: OperatorId(1) }),
            PlanOperator::new("B").with_children(ChildSlots::Single { child: OperatorId(0) }),
        ];
        let tree = PlanTree::from_operators(operators, OperatorId(0));

        let ids = OperatorWalker::collect(&tree, tree.root, WalkScope::IncludeSubqueries, 50);
        assert_eq!(kinds(&tree, &ids), vec!["A", "B"]);
    }

    #[test]
    fn test_shared_child_visited_once() {
        let operators = vec![
            PlanOperator::new("UnionAll")
                .with_children(ChildSlots::List { children: vec![OperatorId(1), OperatorId(1)] }),
            PlanOperator::new("Scan"),
        ];
        let tree = PlanTree::from_operators(operators, OperatorId(0));
        let ids = OperatorWalker::collect(&tree, tree.root, WalkScope::IncludeSubqueries, 50);
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_depth_budget_truncates() {
        let tree = chain(80);
        let ids = OperatorWalker::collect(&tree, tree.root, WalkScope::IncludeSubqueries, 50);
        // Depths 0..=50
        assert_eq!(ids.len(), 51);

        let ids = OperatorWalker::collect(&tree, tree.root, WalkScope::IncludeSubqueries, 0);
        assert_eq!(ids, vec![OperatorId(0)]);
    }

    #[test]
    fn test_untagged_containers_are_not_emitted() {
        let operators = vec![
            PlanOperator::default().with_children(ChildSlots::Single { child: OperatorId(1) }),
            PlanOperator::new("Stream"),
        ];
        let tree = PlanTree::from_operators(operators, OperatorId(0));
        let ids = OperatorWalker::collect(&tree, tree.root, WalkScope::IncludeSubqueries, 50);
        assert_eq!(kinds(&tree, &ids), vec!["Stream"]);
    }

    #[test]
    fn test_subquery_scope() {
        let mut root = PlanOperator::new("Sequence");
        root.subqueries.push(SubqueryExecution { statement: None, root: OperatorId(1) });
        let tree = PlanTree::from_operators(vec![root, PlanOperator::new("IndexScan3")], OperatorId(0));

        let with = OperatorWalker::collect(&tree, tree.root, WalkScope::IncludeSubqueries, 50);
        let without = OperatorWalker::collect(&tree, tree.root, WalkScope::MainPlanOnly, 50);
        assert_eq!(with.len(), 2);
        assert_eq!(without.len(), 1);
    }

    #[test]
    fn test_walk_is_memoized_per_token() {
        let tree = chain(5);
        let mut walker = OperatorWalker::new(50, 16);

        let first = walker.walk_plan(&tree, WalkScope::IncludeSubqueries);
        let second = walker.walk_plan(&tree, WalkScope::IncludeSubqueries);
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(walker.cached_walks(), 1);

        // Same shape, different identity
        let other = chain(5);
        let third = walker.walk_plan(&other, WalkScope::IncludeSubqueries);
        assert!(!Rc::ptr_eq(&first, &third));
        assert_eq!(walker.cached_walks(), 2);
    }
}
