//! In-memory forest materialization over the flat parent-pointer rows.
//!
//! Storage keeps collections as a flat list with `parent_id` references;
//! this module turns that list into an ordered, depth-annotated traversal,
//! computes subtree membership, and plans sibling renumbering so `sort_order`
//! stays dense and zero-based per parent group after every mutation.

use std::collections::{HashMap, VecDeque};

use crate::storage::Collection;

/// A collection augmented with its position in the materialized forest.
#[derive(Debug, Clone)]
pub struct CollectionNode {
    pub collection: Collection,
    /// Ancestor ids from root to immediate parent.
    pub ancestors: Vec<i64>,
    pub depth: u32,
    /// Unread items in this collection's whole subtree, itself included.
    pub unread_count: i64,
}

/// Index of children ids per parent, each group ordered by (sort_order, id).
fn children_index(collections: &[Collection]) -> HashMap<Option<i64>, Vec<usize>> {
    let mut index: HashMap<Option<i64>, Vec<usize>> = HashMap::new();
    for (i, c) in collections.iter().enumerate() {
        index.entry(c.parent_id).or_default().push(i);
    }
    for group in index.values_mut() {
        group.sort_by_key(|&i| (collections[i].sort_order, collections[i].id));
    }
    index
}

/// Materializes the forest into traversal order: depth ascending, then
/// `sort_order` ascending within each depth level.
///
/// `unread` carries direct per-collection unread counts (collections with no
/// items may be absent — they report 0); each node's `unread_count`
/// aggregates its whole subtree.
///
/// Rows forming a cycle, or referencing a missing parent, are unreachable
/// from any root and are dropped with a warning rather than expanded —
/// mutation logic is expected to prevent both, this is a defensive guard.
pub fn flatten_forest(
    collections: Vec<Collection>,
    unread: &HashMap<i64, i64>,
) -> Vec<CollectionNode> {
    let index = children_index(&collections);

    // Breadth-first walk tracking ancestor chains.
    struct Visit {
        row: usize,
        ancestors: Vec<i64>,
        depth: u32,
    }
    let mut queue: VecDeque<Visit> = index
        .get(&None)
        .into_iter()
        .flatten()
        .map(|&row| Visit {
            row,
            ancestors: Vec::new(),
            depth: 0,
        })
        .collect();

    let mut visited: Vec<Visit> = Vec::with_capacity(collections.len());
    let mut children_of: HashMap<i64, Vec<i64>> = HashMap::new();
    while let Some(Visit {
        row,
        ancestors,
        depth,
    }) = queue.pop_front()
    {
        let id = collections[row].id;
        if ancestors.contains(&id) {
            tracing::warn!(collection_id = id, "cycle detected in collection tree, branch skipped");
            continue;
        }

        if let Some(kids) = index.get(&Some(id)) {
            let mut child_ancestors = ancestors.clone();
            child_ancestors.push(id);
            for &kid in kids {
                children_of
                    .entry(id)
                    .or_default()
                    .push(collections[kid].id);
                queue.push_back(Visit {
                    row: kid,
                    ancestors: child_ancestors.clone(),
                    depth: depth + 1,
                });
            }
        }

        visited.push(Visit {
            row,
            ancestors,
            depth,
        });
    }

    if visited.len() < collections.len() {
        tracing::warn!(
            dropped = collections.len() - visited.len(),
            "collections unreachable from any root were dropped from the tree"
        );
    }

    // Subtree unread totals, bottom-up: children were discovered after their
    // parents, so a reverse pass sees every child total before its parent.
    let mut totals: HashMap<i64, i64> = HashMap::new();
    for visit in visited.iter().rev() {
        let id = collections[visit.row].id;
        let mut total = unread.get(&id).copied().unwrap_or(0);
        if let Some(kids) = children_of.get(&id) {
            for kid in kids {
                total += totals.get(kid).copied().unwrap_or(0);
            }
        }
        totals.insert(id, total);
    }

    visited.sort_by_key(|v| {
        (
            v.depth,
            collections[v.row].sort_order,
            collections[v.row].id,
        )
    });

    let mut taken: Vec<Option<Collection>> = collections.into_iter().map(Some).collect();
    visited
        .into_iter()
        .filter_map(|v| {
            let collection = taken[v.row].take()?;
            let unread_count = totals.get(&collection.id).copied().unwrap_or(0);
            Some(CollectionNode {
                collection,
                ancestors: v.ancestors,
                depth: v.depth,
                unread_count,
            })
        })
        .collect()
}

/// Ids of the subtree rooted at `root_id`, the root itself included.
///
/// Returns an empty vec when `root_id` is not present in `collections`.
pub fn descendant_ids(collections: &[Collection], root_id: i64) -> Vec<i64> {
    if !collections.iter().any(|c| c.id == root_id) {
        return Vec::new();
    }
    let index = children_index(collections);

    let mut ids = vec![root_id];
    let mut head = 0;
    while head < ids.len() {
        let id = ids[head];
        head += 1;
        if let Some(kids) = index.get(&Some(id)) {
            for &kid in kids {
                let kid_id = collections[kid].id;
                if !ids.contains(&kid_id) {
                    ids.push(kid_id);
                }
            }
        }
    }
    ids
}

/// Plans the global renumbering repair: for every sibling group, reassigns
/// `sort_order` 0..n-1 following the existing relative order, stable by
/// (previous order, id). Returns only the assignments that change a row.
pub fn plan_renumber(collections: &[Collection]) -> Vec<(i64, i64)> {
    let index = children_index(collections);

    let mut assignments = Vec::new();
    for group in index.values() {
        for (position, &row) in group.iter().enumerate() {
            let position = position as i64;
            if collections[row].sort_order != position {
                assignments.push((collections[row].id, position));
            }
        }
    }
    assignments
}

/// A planned move: the clamped target position plus every `sort_order`
/// assignment needed so both affected sibling groups stay contiguous.
#[derive(Debug)]
pub struct MovePlan {
    pub new_order: i64,
    /// (collection id, new sort_order) for rows whose order changes.
    pub assignments: Vec<(i64, i64)>,
}

/// Plans moving `id` under `new_parent_id` at position `new_order`.
///
/// `new_order` is clamped to `[0, child_count]` of the destination group
/// (the moved node excluded). The destination group is renumbered with the
/// node at its clamped position; the source group is renumbered to close the
/// gap. The caller is responsible for ancestry validation.
pub fn plan_move(
    collections: &[Collection],
    id: i64,
    new_parent_id: Option<i64>,
    new_order: i64,
) -> Option<MovePlan> {
    let node = collections.iter().find(|c| c.id == id)?;
    let old_parent_id = node.parent_id;

    let siblings = |parent: Option<i64>| -> Vec<&Collection> {
        let mut group: Vec<&Collection> = collections
            .iter()
            .filter(|c| c.parent_id == parent && c.id != id)
            .collect();
        group.sort_by_key(|c| (c.sort_order, c.id));
        group
    };

    let destination = siblings(new_parent_id);
    let clamped = new_order.clamp(0, destination.len() as i64);

    let mut assignments = Vec::new();
    let mut assign = |target_id: i64, current: i64, position: i64| {
        if current != position || target_id == id {
            assignments.push((target_id, position));
        }
    };

    for (i, sibling) in destination.iter().enumerate() {
        let position = if (i as i64) < clamped {
            i as i64
        } else {
            i as i64 + 1
        };
        assign(sibling.id, sibling.sort_order, position);
    }
    assign(id, node.sort_order, clamped);

    if old_parent_id != new_parent_id {
        for (i, sibling) in siblings(old_parent_id).iter().enumerate() {
            assign(sibling.id, sibling.sort_order, i as i64);
        }
    }

    Some(MovePlan {
        new_order: clamped,
        assignments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Icon, Layout};

    fn collection(id: i64, parent_id: Option<i64>, sort_order: i64) -> Collection {
        Collection {
            id,
            owner_id: 1,
            title: format!("Collection {id}"),
            slug: format!("collection-{id}"),
            icon: Icon::default(),
            parent_id,
            sort_order,
            description: None,
            url: None,
            date_updated: None,
            refresh_interval: 60,
            layout: Layout::default(),
        }
    }

    fn ids(nodes: &[CollectionNode]) -> Vec<i64> {
        nodes.iter().map(|n| n.collection.id).collect()
    }

    #[test]
    fn test_flatten_orders_by_depth_then_order() {
        // roots: 1 (order 0), 2 (order 1); children of 1: 3 (order 1), 4 (order 0)
        // child of 2: 5 (order 0); grandchild of 4: 6
        let rows = vec![
            collection(1, None, 0),
            collection(2, None, 1),
            collection(3, Some(1), 1),
            collection(4, Some(1), 0),
            collection(5, Some(2), 0),
            collection(6, Some(4), 0),
        ];
        let nodes = flatten_forest(rows, &HashMap::new());

        assert_eq!(ids(&nodes), vec![1, 2, 4, 5, 3, 6]);
        assert_eq!(nodes[0].depth, 0);
        assert_eq!(nodes[2].depth, 1);
        assert_eq!(nodes[5].depth, 2);
    }

    #[test]
    fn test_flatten_ancestor_chains() {
        let rows = vec![
            collection(1, None, 0),
            collection(2, Some(1), 0),
            collection(3, Some(2), 0),
        ];
        let nodes = flatten_forest(rows, &HashMap::new());

        let grandchild = nodes.iter().find(|n| n.collection.id == 3).unwrap();
        assert_eq!(grandchild.ancestors, vec![1, 2]);
        assert_eq!(grandchild.depth, 2);
    }

    #[test]
    fn test_flatten_aggregates_unread_over_subtree() {
        let rows = vec![
            collection(1, None, 0),
            collection(2, Some(1), 0),
            collection(3, Some(2), 0),
        ];
        let unread = HashMap::from([(2, 3), (3, 2)]);
        let nodes = flatten_forest(rows, &unread);

        let by_id: HashMap<i64, i64> = nodes
            .iter()
            .map(|n| (n.collection.id, n.unread_count))
            .collect();
        assert_eq!(by_id[&1], 5);
        assert_eq!(by_id[&2], 5);
        assert_eq!(by_id[&3], 2);
    }

    #[test]
    fn test_flatten_missing_unread_reports_zero() {
        let rows = vec![collection(1, None, 0)];
        let nodes = flatten_forest(rows, &HashMap::new());
        assert_eq!(nodes[0].unread_count, 0);
    }

    #[test]
    fn test_flatten_drops_cycles() {
        // 1 <-> 2 reference each other; 3 is a healthy root
        let rows = vec![
            collection(3, None, 0),
            collection(1, Some(2), 0),
            collection(2, Some(1), 0),
        ];
        let nodes = flatten_forest(rows, &HashMap::new());
        assert_eq!(ids(&nodes), vec![3]);
    }

    #[test]
    fn test_descendant_ids_includes_root() {
        let rows = vec![
            collection(1, None, 0),
            collection(2, Some(1), 0),
            collection(3, Some(2), 0),
            collection(4, None, 1),
        ];
        let mut got = descendant_ids(&rows, 1);
        got.sort();
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[test]
    fn test_descendant_ids_unknown_root_is_empty() {
        let rows = vec![collection(1, None, 0)];
        assert!(descendant_ids(&rows, 99).is_empty());
    }

    #[test]
    fn test_plan_renumber_closes_gaps() {
        let rows = vec![
            collection(1, None, 0),
            collection(2, None, 5),
            collection(3, None, 9),
        ];
        let mut plan = plan_renumber(&rows);
        plan.sort();
        assert_eq!(plan, vec![(2, 1), (3, 2)]);
    }

    #[test]
    fn test_plan_renumber_stable_by_order_then_id() {
        // duplicate orders: relative order resolved by id
        let rows = vec![
            collection(7, None, 1),
            collection(4, None, 1),
            collection(2, None, 0),
        ];
        let mut plan = plan_renumber(&rows);
        plan.sort();
        // 2 keeps 0, then 4 (id wins tie) gets 1 (unchanged), 7 gets 2
        assert_eq!(plan, vec![(7, 2)]);
    }

    #[test]
    fn test_plan_move_to_new_parent_clamps_and_renumbers() {
        let rows = vec![
            collection(1, None, 0),
            collection(2, Some(1), 0),
            collection(3, Some(1), 1),
            collection(4, None, 1),
        ];
        // move 2 under 4 at a wildly out-of-range position
        let plan = plan_move(&rows, 2, Some(4), 100).unwrap();
        assert_eq!(plan.new_order, 0);
        // 2 takes position 0 under 4; 3 closes the gap under 1
        let mut assignments = plan.assignments;
        assignments.sort();
        assert_eq!(assignments, vec![(2, 0), (3, 0)]);
    }

    #[test]
    fn test_plan_move_within_same_parent() {
        let rows = vec![
            collection(1, None, 0),
            collection(2, None, 1),
            collection(3, None, 2),
        ];
        let plan = plan_move(&rows, 3, None, 0).unwrap();
        assert_eq!(plan.new_order, 0);
        let mut assignments = plan.assignments;
        assignments.sort();
        assert_eq!(assignments, vec![(1, 1), (2, 2), (3, 0)]);
    }

    #[test]
    fn test_plan_move_detach_to_root() {
        let rows = vec![
            collection(1, None, 0),
            collection(2, Some(1), 0),
            collection(3, Some(1), 1),
        ];
        let plan = plan_move(&rows, 2, None, 0).unwrap();
        assert_eq!(plan.new_order, 0);
        let mut assignments = plan.assignments;
        assignments.sort();
        // 1 shifts to 1 at root, 2 becomes root order 0, 3 closes the child gap
        assert_eq!(assignments, vec![(1, 1), (2, 0), (3, 0)]);
    }

    #[test]
    fn test_plan_move_unknown_node() {
        let rows = vec![collection(1, None, 0)];
        assert!(plan_move(&rows, 42, None, 0).is_none());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// After applying a renumber plan, every sibling group is 0..n-1.
            #[test]
            fn renumber_always_dense(orders in proptest::collection::vec(0i64..20, 1..12)) {
                let rows: Vec<Collection> = orders
                    .iter()
                    .enumerate()
                    .map(|(i, &o)| collection(i as i64 + 1, if i % 3 == 0 { None } else { Some(1) }, o))
                    .collect();

                let plan = plan_renumber(&rows);
                let mut applied = rows.clone();
                for (id, order) in plan {
                    applied.iter_mut().find(|c| c.id == id).unwrap().sort_order = order;
                }

                let mut groups: HashMap<Option<i64>, Vec<i64>> = HashMap::new();
                for c in &applied {
                    groups.entry(c.parent_id).or_default().push(c.sort_order);
                }
                for orders in groups.values_mut() {
                    orders.sort();
                    let expected: Vec<i64> = (0..orders.len() as i64).collect();
                    prop_assert_eq!(orders.clone(), expected);
                }
            }
        }
    }
}
