//! Dependency graph checks.

/// Find a dependency cycle between distinct variables.
///
/// `edges[i]` lists the variables `i` reads from. Self-edges are ignored:
/// a variable reading its own previous state is the normal recurrence.
/// Returns the variables on the first cycle found, in dependency order,
/// starting from the lowest registration index reached.
pub fn find_cycle(edges: &[Vec<usize>]) -> Option<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        OnStack,
        Done,
    }

    fn visit(
        node: usize,
        edges: &[Vec<usize>],
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        marks[node] = Mark::OnStack;
        stack.push(node);

        for &next in &edges[node] {
            if next == node || next >= edges.len() {
                continue;
            }
            match marks[next] {
                Mark::OnStack => {
                    let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                    return Some(stack[start..].to_vec());
                }
                Mark::Unvisited => {
                    if let Some(cycle) = visit(next, edges, marks, stack) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }

        stack.pop();
        marks[node] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::Unvisited; edges.len()];
    let mut stack = Vec::new();
    for node in 0..edges.len() {
        if marks[node] == Mark::Unvisited {
            if let Some(cycle) = visit(node, edges, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_dependency_is_not_a_cycle() {
        assert_eq!(find_cycle(&[vec![0]]), None);
        assert_eq!(find_cycle(&[vec![0], vec![0, 1]]), None);
    }

    #[test]
    fn test_two_variable_cycle() {
        let cycle = find_cycle(&[vec![1], vec![0]]).unwrap();
        assert_eq!(cycle, vec![0, 1]);
    }

    #[test]
    fn test_longer_cycle_reports_members_only() {
        // 0 -> 1 -> 2 -> 3 -> 1
        let edges = vec![vec![1], vec![2], vec![3], vec![1]];
        assert_eq!(find_cycle(&edges), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_diamond_is_acyclic() {
        let edges = vec![vec![1, 2], vec![3], vec![3], vec![]];
        assert_eq!(find_cycle(&edges), None);
    }
}
