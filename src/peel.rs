//! 3-uniform hypergraph peeling via per-vertex XOR summaries.
//!
//! Instead of adjacency lists, each vertex keeps its degree and the XOR of
//! all incident edge ids. A degree-1 vertex then names its unique incident
//! edge directly, so stripping leaves needs O(m + n) words total.

/// Successful orientation of a peelable hypergraph.
#[derive(Debug, Clone)]
pub struct Peeling {
    /// `hinges[e]` is the vertex that identified edge `e` when it was peeled.
    pub hinges: Vec<u32>,
    /// Edge ids in peel order. The assignment pass walks this in reverse.
    pub order: Vec<u32>,
}

/// Per-vertex degrees of the edge set.
pub fn degrees(num_vertices: usize, v0: &[u32], v1: &[u32], v2: &[u32]) -> Vec<u32> {
    let mut deg = vec![0u32; num_vertices];
    for e in 0..v0.len() {
        deg[v0[e] as usize] += 1;
        deg[v1[e] as usize] += 1;
        deg[v2[e] as usize] += 1;
    }
    deg
}

/// Peel the hypergraph with edges `(v0[e], v1[e], v2[e])`.
///
/// Returns `None` iff the graph has a non-empty 2-core, i.e. is not
/// peelable; no partial state is exposed in that case. On success each
/// edge's hinge had degree 1 at the moment the edge was removed, so in
/// reverse peel order every hinge cell is still unassigned.
pub fn peel_hypergraph(
    num_vertices: usize,
    v0: &[u32],
    v1: &[u32],
    v2: &[u32],
) -> Option<Peeling> {
    let n = v0.len();
    debug_assert_eq!(n, v1.len());
    debug_assert_eq!(n, v2.len());

    let mut deg = degrees(num_vertices, v0, v1, v2);
    let mut edge_xor = vec![0u32; num_vertices];
    for e in 0..n {
        edge_xor[v0[e] as usize] ^= e as u32;
        edge_xor[v1[e] as usize] ^= e as u32;
        edge_xor[v2[e] as usize] ^= e as u32;
    }

    let mut stack: Vec<u32> = (0..num_vertices as u32)
        .filter(|&v| deg[v as usize] == 1)
        .collect();
    let mut hinges = vec![0u32; n];
    let mut order = Vec::with_capacity(n);

    while let Some(v) = stack.pop() {
        if deg[v as usize] != 1 {
            continue;
        }
        let e = edge_xor[v as usize];
        hinges[e as usize] = v;
        order.push(e);
        for u in [v0[e as usize], v1[e as usize], v2[e as usize]] {
            deg[u as usize] -= 1;
            edge_xor[u as usize] ^= e;
            if deg[u as usize] == 1 {
                stack.push(u);
            }
        }
    }

    (order.len() == n).then_some(Peeling { hinges, order })
}
