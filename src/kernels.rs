//! Built-in stencil kernels.
//!
//! Each builder returns a parametric [`Scop`] with its parameters bound, the
//! way a front-end would hand it over: statement domains, flow dependences
//! restricted to the domains on both sides, and a skewed schedule whose
//! members all carry non-negative dependence distances.

use crate::analysis::Scop;
use crate::polyhedral::{AffineExpr, AffineMap, BasicSet, Constraint, Space};

/// Names of the kernels [`by_name`] knows.
pub const KERNELS: &[&str] = &["heat-1d", "heat-2d", "jacobi-1d", "jacobi-1d-shifted"];

/// A kernel by its command-line name, with default problem sizes.
pub fn by_name(name: &str) -> Option<Scop> {
    match name {
        "heat-1d" => Some(heat_1d(10, 20)),
        "heat-2d" => Some(heat_2d(6, 12)),
        "jacobi-1d" => Some(jacobi_1d(8, 16)),
        "jacobi-1d-shifted" => Some(jacobi_1d_shifted(8, 16)),
        _ => None,
    }
}

/// `lo <= x_k < P_param + offset` for each dimension.
fn parametric_box(name: &str, dims: &[&str], params: &[&str], extents: &[(i64, usize, i64)]) -> BasicSet {
    let n = dims.len();
    let np = params.len();
    let mut set = BasicSet::universe(Space::named_set(name, n))
        .with_dim_names(dims.iter().map(|d| d.to_string()).collect())
        .with_param_names(params.iter().map(|p| p.to_string()).collect());
    for (k, &(lo, param, offset)) in extents.iter().enumerate() {
        let x = AffineExpr::var(k, n, np);
        set.add_constraint(Constraint::ge(x.clone(), AffineExpr::constant(lo, n, np)));
        let hi = AffineExpr::param(param, n, np) + AffineExpr::constant(offset, n, np);
        set.add_constraint(Constraint::lt(x, hi));
    }
    set
}

/// `src[x] -> dst[x + offsets]` restricted to both domains.
fn uniform_dep(src: &BasicSet, dst: &BasicSet, offsets: &[i64]) -> BasicSet {
    let n_in = src.dim();
    let mut relation = src.lift_to_domain(&dst.space);
    for c in dst.lift_to_range(&src.space).constraints.constraints {
        relation.add_constraint(c);
    }
    let n_vars = relation.n_vars();
    let np = relation.n_param();
    for (k, &off) in offsets.iter().enumerate() {
        let target = AffineExpr::var(n_in + k, n_vars, np);
        let source = AffineExpr::var(k, n_vars, np) + AffineExpr::constant(off, n_vars, np);
        relation.add_constraint(Constraint::eq(target, source));
    }
    relation
}

/// 1D heat equation over `t_steps` time steps of `n` points.
///
/// `S[t, i]` reads `S[t-1, i-1..=i+1]`; scheduled as `[t, t + i]`.
pub fn heat_1d(t_steps: i64, n: i64) -> Scop {
    let mut scop = Scop::new("heat-1d").with_param("T", t_steps).with_param("N", n);
    let domain = parametric_box("S", &["t", "i"], &["T", "N"], &[(0, 0, 0), (0, 1, 0)]);
    for d in [-1, 0, 1] {
        scop.add_flow(uniform_dep(&domain, &domain, &[1, d]));
    }
    let schedule = AffineMap::from_rows(2, &[&[1, 0, 0], &[1, 1, 0]]);
    scop.add_statement("S", domain, schedule);
    scop
}

/// 2D heat equation on an `n x n` grid, five-point stencil.
pub fn heat_2d(t_steps: i64, n: i64) -> Scop {
    let mut scop = Scop::new("heat-2d").with_param("T", t_steps).with_param("N", n);
    let domain = parametric_box(
        "S",
        &["t", "i", "j"],
        &["T", "N"],
        &[(0, 0, 0), (0, 1, 0), (0, 1, 0)],
    );
    for offsets in [[1, 0, 0], [1, -1, 0], [1, 1, 0], [1, 0, -1], [1, 0, 1]] {
        scop.add_flow(uniform_dep(&domain, &domain, &offsets));
    }
    let schedule = AffineMap::from_rows(3, &[&[1, 0, 0, 0], &[1, 1, 0, 0], &[1, 0, 1, 0]]);
    scop.add_statement("S", domain, schedule);
    scop
}

/// 1D Jacobi with a compute statement `S0` and a copy-back statement `S1`.
///
/// `S0[t, i]` reads `S1[t-1, i-1..=i+1]` and `S1[t, i]` reads `S0[t, i]`.
/// Both live on `0 <= t < T, 1 <= i < N - 1`.
pub fn jacobi_1d(t_steps: i64, n: i64) -> Scop {
    let mut scop = Scop::new("jacobi-1d").with_param("T", t_steps).with_param("N", n);
    let extents = [(0, 0, 0), (1, 1, -1)];
    let compute = parametric_box("S0", &["t", "i"], &["T", "N"], &extents);
    let copy = parametric_box("S1", &["t", "i"], &["T", "N"], &extents);

    scop.add_flow(uniform_dep(&compute, &copy, &[0, 0]));
    for d in [-1, 0, 1] {
        scop.add_flow(uniform_dep(&copy, &compute, &[1, d]));
    }
    scop.add_statement("S0", compute, AffineMap::from_rows(2, &[&[2, 0, 0], &[2, 1, 0]]));
    scop.add_statement("S1", copy, AffineMap::from_rows(2, &[&[2, 0, 1], &[2, 1, 1]]));
    scop
}

/// 1D Jacobi whose copy-back statement reads two points to the right.
///
/// `S1[t, i]` reads `S0[t, i+2]`, `S0[t, i]` reads `S1[t-1, i-1..=i+1]`.
/// The copy runs two space steps behind the compute in the schedule
/// `S0 -> [2t, 3t + i]`, `S1 -> [2t + 1, 3t + i + 2]`.
pub fn jacobi_1d_shifted(t_steps: i64, n: i64) -> Scop {
    let mut scop = Scop::new("jacobi-1d-shifted").with_param("T", t_steps).with_param("N", n);
    let compute = parametric_box("S0", &["t", "i"], &["T", "N"], &[(0, 0, 0), (0, 1, 0)]);
    let copy = parametric_box("S1", &["t", "i"], &["T", "N"], &[(0, 0, 0), (0, 1, -2)]);

    scop.add_flow(uniform_dep(&compute, &copy, &[0, -2]));
    for d in [-1, 0, 1] {
        scop.add_flow(uniform_dep(&copy, &compute, &[1, d]));
    }
    scop.add_statement("S0", compute, AffineMap::from_rows(2, &[&[2, 0, 0], &[3, 1, 0]]));
    scop.add_statement("S1", copy, AffineMap::from_rows(2, &[&[2, 0, 1], &[3, 1, 2]]));
    scop
}
