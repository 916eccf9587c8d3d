//! Data association: bipartite graph construction, connected-component
//! partitioning (union-find), the Hungarian solver with birth/death costs,
//! and the greedy sorted resolver.
//!
//! # Algorithm pipeline (shortest-path linker)
//! 1. For each gate-passing (head, observation) pair, add an edge to the
//!    sparse bipartite graph.
//! 2. Partition the graph into **connected components** using union-find.
//!    Components are independent and can be solved in parallel.
//! 3. Solve each component with the **Hungarian algorithm** on an augmented
//!    matrix where every head may terminate and every observation may start
//!    a track at a fixed no-link cost.

use nalgebra::DMatrix;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Bipartite graph
// ---------------------------------------------------------------------------

/// An edge in the sparse assignment graph.
#[derive(Clone, Debug, PartialEq)]
pub struct AssignEdge {
    pub head_idx: usize,
    pub obs_idx: usize,
    pub cost: f64,
}

/// Sparse bipartite graph: edges between head indices and observation indices.
#[derive(Clone, Debug, Default)]
pub struct BipartiteGraph {
    pub edges: Vec<AssignEdge>,
    pub n_heads: usize,
    pub n_obs: usize,
}

impl BipartiteGraph {
    pub fn new(n_heads: usize, n_obs: usize) -> Self {
        Self {
            edges: Vec::new(),
            n_heads,
            n_obs,
        }
    }

    /// Add an edge (gate-passed association candidate).
    pub fn add_edge(&mut self, head_idx: usize, obs_idx: usize, cost: f64) {
        self.edges.push(AssignEdge {
            head_idx,
            obs_idx,
            cost,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Union-Find (path halving + union by rank)
// ---------------------------------------------------------------------------

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, x: usize, y: usize) {
        let rx = self.find(x);
        let ry = self.find(y);
        if rx == ry {
            return;
        }
        match self.rank[rx].cmp(&self.rank[ry]) {
            std::cmp::Ordering::Less => self.parent[rx] = ry,
            std::cmp::Ordering::Greater => self.parent[ry] = rx,
            std::cmp::Ordering::Equal => {
                self.parent[ry] = rx;
                self.rank[rx] += 1;
            }
        }
    }
}

/// A single connected component in the bipartite graph.
#[derive(Clone, Debug, Default)]
pub struct Component {
    /// Sorted, deduplicated head indices
    pub head_indices: Vec<usize>,
    /// Sorted, deduplicated observation indices
    pub obs_indices: Vec<usize>,
    pub edges: Vec<AssignEdge>,
}

/// Partition the bipartite graph into connected components, ordered by
/// their smallest head index. Heads and observations without edges are
/// not part of any component.
///
/// Heads and observations share one node space:
/// - Head i        → node i
/// - Observation j → node n_heads + j
pub fn partition_components(graph: &BipartiteGraph) -> Vec<Component> {
    let n_total = graph.n_heads + graph.n_obs;
    let mut uf = UnionFind::new(n_total);

    for e in &graph.edges {
        uf.union(e.head_idx, graph.n_heads + e.obs_idx);
    }

    let mut comp_map: BTreeMap<usize, Component> = BTreeMap::new();
    for e in &graph.edges {
        let root = uf.find(e.head_idx);
        comp_map.entry(root).or_default().edges.push(e.clone());
    }

    let mut comps: Vec<Component> = comp_map.into_values().collect();
    for comp in &mut comps {
        comp.head_indices = comp.edges.iter().map(|e| e.head_idx).collect();
        comp.head_indices.sort_unstable();
        comp.head_indices.dedup();
        comp.obs_indices = comp.edges.iter().map(|e| e.obs_idx).collect();
        comp.obs_indices.sort_unstable();
        comp.obs_indices.dedup();
    }
    comps.sort_by_key(|c| c.head_indices.first().copied());
    comps
}

// ---------------------------------------------------------------------------
// Assignment
// ---------------------------------------------------------------------------

/// Assignment result: (head_idx, obs_idx) matched pairs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Assignment {
    pub pairs: Vec<(usize, usize)>,
    /// Heads that were not linked
    pub unmatched_heads: Vec<usize>,
    /// Observations that were not linked
    pub unmatched_obs: Vec<usize>,
}

/// Solve one component optimally with birth and death allowed.
///
/// The augmented square matrix has `nt + nm` rows and columns:
///
/// ```text
///              obs 0..nm          death 0..nt
/// head i   [ link cost / X  |  no_link on diagonal, X ]
/// birth j  [ no_link diag, X |  0 where (i, j) is an edge, X ]
/// ```
///
/// `X` is a blocking cost larger than any complete no-link solution, so it
/// is never chosen. Linking `i → j` costs `c_ij`; leaving both unlinked
/// costs `2 · no_link`.
pub fn solve_with_birth_death(component: &Component, no_link_cost: f64) -> Assignment {
    let nt = component.head_indices.len();
    let nm = component.obs_indices.len();

    if nt == 0 || nm == 0 {
        return Assignment {
            pairs: vec![],
            unmatched_heads: component.head_indices.clone(),
            unmatched_obs: component.obs_indices.clone(),
        };
    }

    let n = nt + nm;
    let blocked = 2.0 * n as f64 * no_link_cost.abs().max(1.0) + 1.0;
    let mut cost = DMatrix::from_element(n, n, blocked);

    let head_local: BTreeMap<usize, usize> = component
        .head_indices
        .iter()
        .enumerate()
        .map(|(i, &t)| (t, i))
        .collect();
    let obs_local: BTreeMap<usize, usize> = component
        .obs_indices
        .iter()
        .enumerate()
        .map(|(j, &m)| (m, j))
        .collect();

    for e in &component.edges {
        if let (Some(&ri), Some(&ci)) = (head_local.get(&e.head_idx), obs_local.get(&e.obs_idx))
        {
            cost[(ri, ci)] = e.cost;
            cost[(nt + ci, nm + ri)] = 0.0;
        }
    }
    for i in 0..nt {
        cost[(i, nm + i)] = no_link_cost;
    }
    for j in 0..nm {
        cost[(nt + j, j)] = no_link_cost;
    }

    let row_assign = run_hungarian(&cost);

    let mut pairs = Vec::new();
    let mut unmatched_heads = Vec::new();
    let mut matched_obs = vec![false; nm];
    for (ri, &ci) in row_assign.iter().enumerate().take(nt) {
        if ci < nm && cost[(ri, ci)] < blocked {
            pairs.push((component.head_indices[ri], component.obs_indices[ci]));
            matched_obs[ci] = true;
        } else {
            unmatched_heads.push(component.head_indices[ri]);
        }
    }
    let unmatched_obs = (0..nm)
        .filter(|&j| !matched_obs[j])
        .map(|j| component.obs_indices[j])
        .collect();

    Assignment {
        pairs,
        unmatched_heads,
        unmatched_obs,
    }
}

/// Core Hungarian algorithm (Kuhn-Munkres with potentials, O(n³)) on a
/// square cost matrix. Returns row_assignment[row] = assigned_column.
fn run_hungarian(cost: &DMatrix<f64>) -> Vec<usize> {
    let n = cost.nrows();
    // Potentials for rows (u) and columns (v)
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; n + 1];
    // p[j] = row assigned to column j (1-indexed, 0 = none)
    let mut p = vec![0usize; n + 1];
    // way[j] = previous column in augmenting path
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;
            for j in 1..=n {
                if !used[j] {
                    let val = cost[(i0 - 1, j - 1)] - u[i0] - v[j];
                    if val < minv[j] {
                        minv[j] = val;
                        way[j] = j0;
                    }
                    if minv[j] < delta {
                        delta = minv[j];
                        j1 = j;
                    }
                }
            }
            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        // Augment
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut row_assign = vec![0usize; n];
    for j in 1..=n {
        if p[j] != 0 {
            row_assign[p[j] - 1] = j - 1;
        }
    }
    row_assign
}

// ---------------------------------------------------------------------------
// Greedy
// ---------------------------------------------------------------------------

/// Globally sorted greedy matching: edges ascending by cost, then by
/// `tie_key(head)`, then by observation index; an edge is taken when both
/// ends are still free.
pub fn greedy_solve<K: Ord>(graph: &BipartiteGraph, tie_key: impl Fn(usize) -> K) -> Assignment {
    let mut order: Vec<&AssignEdge> = graph.edges.iter().collect();
    order.sort_by(|a, b| {
        a.cost
            .total_cmp(&b.cost)
            .then_with(|| tie_key(a.head_idx).cmp(&tie_key(b.head_idx)))
            .then_with(|| a.obs_idx.cmp(&b.obs_idx))
    });

    let mut head_used = vec![false; graph.n_heads];
    let mut obs_used = vec![false; graph.n_obs];
    let mut pairs = Vec::new();
    for e in order {
        if !head_used[e.head_idx] && !obs_used[e.obs_idx] {
            head_used[e.head_idx] = true;
            obs_used[e.obs_idx] = true;
            pairs.push((e.head_idx, e.obs_idx));
        }
    }

    Assignment {
        pairs,
        unmatched_heads: (0..graph.n_heads).filter(|&i| !head_used[i]).collect(),
        unmatched_obs: (0..graph.n_obs).filter(|&j| !obs_used[j]).collect(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
