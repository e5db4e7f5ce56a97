//! Kahn-style topological levelling.
//!
//! Level 0 holds every concept with no upstream neighbours; level `k + 1`
//! holds the concepts whose last upstream neighbour sits in level `k`. A
//! concept's closure depends only on concepts in earlier levels, so each
//! level can be computed in one parallel sweep.

/// Partitions `0..n` into dependency levels.
///
/// `upstream(i)` lists what concept `i` depends on; `downstream(i)` is the
/// inverse. Returns `Err(index)` with a concept lying on a cycle when the
/// ordering cannot be completed.
pub(crate) fn topological_levels<'g, U, D>(
    n: usize,
    upstream: U,
    downstream: D,
) -> Result<Vec<Vec<u32>>, u32>
where
    U: Fn(u32) -> &'g [u32],
    D: Fn(u32) -> &'g [u32],
{
    let mut pending: Vec<usize> = (0..n as u32).map(|i| upstream(i).len()).collect();

    let mut levels = Vec::new();
    let mut current: Vec<u32> = (0..n as u32).filter(|&i| pending[i as usize] == 0).collect();
    let mut placed = 0usize;

    while !current.is_empty() {
        let mut next = Vec::new();
        for &i in &current {
            for &d in downstream(i) {
                let count = &mut pending[d as usize];
                *count -= 1;
                if *count == 0 {
                    next.push(d);
                }
            }
        }
        placed += current.len();
        next.sort_unstable();
        levels.push(std::mem::replace(&mut current, next));
    }

    if placed < n {
        return Err(find_cycle_member(&pending, upstream));
    }
    Ok(levels)
}

/// Walks unresolved upstream links from an unresolved concept until a
/// concept repeats. Every unresolved concept has an unresolved upstream
/// neighbour, so the walk always closes a loop.
fn find_cycle_member<'g, U>(pending: &[usize], upstream: U) -> u32
where
    U: Fn(u32) -> &'g [u32],
{
    let unresolved = |i: u32| pending[i as usize] > 0;
    let mut seen = vec![false; pending.len()];

    let Some(mut cursor) = (0..pending.len() as u32).find(|&i| unresolved(i)) else {
        return 0;
    };
    while !seen[cursor as usize] {
        seen[cursor as usize] = true;
        match upstream(cursor).iter().copied().find(|&u| unresolved(u)) {
            Some(next) => cursor = next,
            None => break,
        }
    }
    cursor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adjacency(n: usize, edges: &[(u32, u32)]) -> (Vec<Vec<u32>>, Vec<Vec<u32>>) {
        let mut up = vec![Vec::new(); n];
        let mut down = vec![Vec::new(); n];
        for &(child, parent) in edges {
            up[child as usize].push(parent);
            down[parent as usize].push(child);
        }
        (up, down)
    }

    #[test]
    fn test_levels_follow_longest_path() {
        // 0 <- 1 <- 2, and 0 <- 2 directly
        let (up, down) = adjacency(3, &[(1, 0), (2, 1), (2, 0)]);
        let levels =
            topological_levels(3, |i| up[i as usize].as_slice(), |i| down[i as usize].as_slice()).unwrap();
        assert_eq!(levels, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_isolated_concepts_share_level_zero() {
        let (up, down) = adjacency(3, &[]);
        let levels =
            topological_levels(3, |i| up[i as usize].as_slice(), |i| down[i as usize].as_slice()).unwrap();
        assert_eq!(levels, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_cycle_reports_member() {
        // 0 is a root; 1 -> 2 -> 3 -> 1 is a cycle hanging off it; 4 sits below the cycle
        let (up, down) = adjacency(5, &[(1, 0), (1, 3), (2, 1), (3, 2), (4, 3)]);
        let member =
            topological_levels(5, |i| up[i as usize].as_slice(), |i| down[i as usize].as_slice())
                .unwrap_err();
        assert!([1, 2, 3].contains(&member));
    }

    #[test]
    fn test_self_loop_is_cycle() {
        let (up, down) = adjacency(2, &[(1, 1)]);
        let member =
            topological_levels(2, |i| up[i as usize].as_slice(), |i| down[i as usize].as_slice())
                .unwrap_err();
        assert_eq!(member, 1);
    }
}
