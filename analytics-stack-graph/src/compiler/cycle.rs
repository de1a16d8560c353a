//! Minimal cycle extraction for graphs the topological sort could not drain

use std::collections::VecDeque;

/// Shortest cycle among `remaining` nodes
///
/// `references[n]` lists the nodes `n` depends on, sorted by declaration index.
/// Nodes are tried as cycle starts in declaration order and only a strictly
/// shorter cycle replaces the current best, so ties go to the earliest start.
/// The returned path starts at that node and does not repeat it at the end.
pub(crate) fn minimal_cycle(references: &[Vec<usize>], remaining: &[bool]) -> Option<Vec<usize>> {
    let mut best: Option<Vec<usize>> = None;

    for start in (0..references.len()).filter(|&node| remaining[node]) {
        let Some(cycle) = shortest_cycle_through(start, references, remaining) else {
            continue;
        };
        if best.as_ref().map_or(true, |current| cycle.len() < current.len()) {
            best = Some(cycle);
        }
        if best.as_ref().is_some_and(|current| current.len() == 1) {
            break;
        }
    }

    best
}

/// Breadth-first search from `start` back to itself over remaining nodes
fn shortest_cycle_through(
    start: usize,
    references: &[Vec<usize>],
    remaining: &[bool],
) -> Option<Vec<usize>> {
    let mut parent: Vec<Option<usize>> = vec![None; references.len()];
    let mut visited = vec![false; references.len()];
    let mut queue = VecDeque::from([start]);
    visited[start] = true;

    while let Some(node) = queue.pop_front() {
        for &next in &references[node] {
            if !remaining[next] {
                continue;
            }
            if next == start {
                let mut path = vec![node];
                let mut cursor = node;
                while let Some(previous) = parent[cursor] {
                    path.push(previous);
                    cursor = previous;
                }
                path.reverse();
                return Some(path);
            }
            if !visited[next] {
                visited[next] = true;
                parent[next] = Some(node);
                queue.push_back(next);
            }
        }
    }

    None
}
