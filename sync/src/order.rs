use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::queue::{OperationType, PendingOperation};

/// Produces a push order that satisfies two constraints at once:
/// operations against the same task stay in their original (`created_at`)
/// sequence, and a task's create is never pushed before the create of the
/// parent task it was nested under. Implemented as Kahn's algorithm over a
/// dependency graph built from both constraints, breaking ties by original
/// position so independent tasks keep their `created_at` order.
pub fn topological_order(mut ops: Vec<PendingOperation>) -> Vec<PendingOperation> {
    let n = ops.len();
    if n <= 1 {
        return ops;
    }
    ops.sort_by_key(|o| o.created_at);

    let mut indices_by_task: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, op) in ops.iter().enumerate() {
        indices_by_task.entry(op.task_id.as_str()).or_default().push(i);
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree: Vec<usize> = vec![0; n];

    // Same-task ops keep their relative order.
    for indices in indices_by_task.values() {
        for pair in indices.windows(2) {
            children[pair[0]].push(pair[1]);
            indegree[pair[1]] += 1;
        }
    }

    // A child task's create waits for its parent task's create.
    for (i, op) in ops.iter().enumerate() {
        if op.operation_type != OperationType::Create {
            continue;
        }
        let Some(parent_id) = op.payload.as_ref().and_then(|p| p.parent_id.as_deref()) else {
            continue;
        };
        if let Some(parent_indices) = indices_by_task.get(parent_id) {
            if let Some(&parent_create) = parent_indices
                .iter()
                .find(|&&pi| ops[pi].operation_type == OperationType::Create)
            {
                if parent_create != i {
                    children[parent_create].push(i);
                    indegree[i] += 1;
                }
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = indegree
        .iter()
        .enumerate()
        .filter(|(_, &deg)| deg == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(n);
    let mut visited = vec![false; n];
    while let Some(Reverse(i)) = ready.pop() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        order.push(i);
        for &child in &children[i] {
            indegree[child] -= 1;
            if indegree[child] == 0 {
                ready.push(Reverse(child));
            }
        }
    }

    // A cycle (shouldn't occur outside pathological data) leaves some nodes
    // unvisited; append them in original order rather than dropping them.
    for i in 0..n {
        if !visited[i] {
            order.push(i);
        }
    }

    let mut slots: Vec<Option<PendingOperation>> = ops.into_iter().map(Some).collect();
    order.into_iter().map(|i| slots[i].take().unwrap()).collect()
}
