//! Dense two-phase primal simplex.
//!
//! Inequalities get a slack column each. Rows whose right-hand side is negative
//! are negated, and every row that then lacks an obvious basic column gets an
//! artificial. Phase 1 minimizes the artificial sum; phase 2 the real
//! objective with artificials barred from entering.

use super::{LinearProgram, LpBackend, LpSolution, SolveStatus, dot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotRule {
    /// Most negative reduced cost, falling back to Bland while stalling
    Dantzig,
    /// Lowest-index improving column; never cycles
    Bland,
}

#[derive(Debug, Clone)]
pub struct SimplexSettings {
    /// Pivot cap; `None` scales with the tableau size
    pub max_iter: Option<usize>,
    /// Smallest usable pivot element
    pub tol_pivot: f64,
    /// Reduced costs above `-tol_cost` count as non-improving
    pub tol_cost: f64,
    /// Phase 1 residual accepted as feasible, relative to max(1, ‖b‖∞)
    pub tol_feas: f64,
    /// Residual check on the unscaled problem after phase 2
    pub tol_verify: f64,
    /// Consecutive degenerate Dantzig pivots before switching to Bland
    pub degenerate_switch: usize,
}

impl Default for SimplexSettings {
    fn default() -> Self {
        Self {
            max_iter: None,
            tol_pivot: 1e-9,
            tol_cost: 1e-9,
            tol_feas: 1e-7,
            tol_verify: 1e-6,
            degenerate_switch: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Simplex {
    pub rule: PivotRule,
    pub scale_rows: bool,
    pub settings: SimplexSettings,
}

impl Simplex {
    pub fn new(rule: PivotRule) -> Self {
        Self {
            rule,
            scale_rows: false,
            settings: SimplexSettings::default(),
        }
    }

    /// Divide every row by its largest coefficient before solving
    pub fn with_row_scaling(mut self) -> Self {
        self.scale_rows = true;
        self
    }

    pub fn with_settings(mut self, settings: SimplexSettings) -> Self {
        self.settings = settings;
        self
    }
}

impl LpBackend for Simplex {
    fn name(&self) -> &str {
        match (self.rule, self.scale_rows) {
            (PivotRule::Dantzig, false) => "simplex-dantzig",
            (PivotRule::Dantzig, true) => "simplex-dantzig-scaled",
            (PivotRule::Bland, false) => "simplex-bland",
            (PivotRule::Bland, true) => "simplex-bland-scaled",
        }
    }

    fn solve(&self, lp: &LinearProgram) -> LpSolution {
        let mut tableau = Tableau::new(lp, self.scale_rows);
        let max_iter = self
            .settings
            .max_iter
            .unwrap_or_else(|| 1000.max(50 * (tableau.rows.len() + tableau.ncols)));
        let mut run = Run {
            settings: &self.settings,
            rule: self.rule,
            iterations: 0,
            max_iter,
        };

        // Phase 1
        let ncols = tableau.ncols;
        if tableau.first_art < ncols {
            let cost: Vec<f64> = (0..ncols)
                .map(|j| if j >= tableau.first_art { 1.0 } else { 0.0 })
                .collect();
            if let Err(status) = run.optimize(&mut tableau, &cost, ncols) {
                // Phase 1 is bounded below by zero
                let status = match status {
                    SolveStatus::Unbounded => SolveStatus::NumericalError,
                    other => other,
                };
                return LpSolution::failed(status, run.iterations);
            }
            let residual: f64 = (0..tableau.rows.len())
                .filter(|&i| tableau.basis[i] >= tableau.first_art)
                .map(|i| tableau.rhs(i))
                .sum();
            if residual > self.settings.tol_feas * tableau.rhs_scale {
                return LpSolution::failed(SolveStatus::Infeasible, run.iterations);
            }
            tableau.drive_out_artificials(self.settings.tol_pivot);
        }

        // Phase 2
        let mut cost = vec![0.0; tableau.ncols];
        cost[..tableau.n].copy_from_slice(&lp.c);
        let allowed = tableau.first_art;
        if let Err(status) = run.optimize(&mut tableau, &cost, allowed) {
            return LpSolution::failed(status, run.iterations);
        }

        let x = tableau.primal();
        if !verify(lp, &x, self.settings.tol_verify) {
            return LpSolution::failed(SolveStatus::NumericalError, run.iterations);
        }
        LpSolution {
            status: SolveStatus::Optimal,
            objective: lp.objective(&x),
            x,
            iterations: run.iterations,
        }
    }
}

struct Tableau {
    /// Each row holds `ncols` coefficients followed by the right-hand side
    rows: Vec<Vec<f64>>,
    basis: Vec<usize>,
    n: usize,
    ncols: usize,
    first_art: usize,
    rhs_scale: f64,
}

impl Tableau {
    fn new(lp: &LinearProgram, scale_rows: bool) -> Self {
        let n = lp.num_vars();
        let m_ub = lp.b_ub.len();

        let mut source: Vec<(Vec<f64>, f64, Option<usize>)> = Vec::with_capacity(m_ub + lp.b_eq.len());
        for (k, (row, &b)) in lp.a_ub.iter().zip(&lp.b_ub).enumerate() {
            source.push((row.clone(), b, Some(k)));
        }
        for (row, &b) in lp.a_eq.iter().zip(&lp.b_eq) {
            source.push((row.clone(), b, None));
        }
        if scale_rows {
            for (row, b, _) in &mut source {
                let largest = row.iter().fold(0.0f64, |m, v| m.max(v.abs()));
                if largest > 0.0 {
                    row.iter_mut().for_each(|v| *v /= largest);
                    *b /= largest;
                }
            }
        }

        let needs_artificial = |b: f64, slack: Option<usize>| slack.is_none() || b < 0.0;
        let n_art = source.iter().filter(|(_, b, s)| needs_artificial(*b, *s)).count();
        let first_art = n + m_ub;
        let ncols = first_art + n_art;

        let mut rows = Vec::with_capacity(source.len());
        let mut basis = Vec::with_capacity(source.len());
        let mut next_art = first_art;
        let mut rhs_scale = 1.0f64;
        for (coeffs, b, slack) in source {
            let sign = if b < 0.0 { -1.0 } else { 1.0 };
            let mut t = vec![0.0; ncols + 1];
            for (dst, v) in t.iter_mut().zip(&coeffs) {
                *dst = sign * v;
            }
            t[ncols] = sign * b;
            rhs_scale = rhs_scale.max(b.abs());
            if let Some(k) = slack {
                t[n + k] = sign;
            }
            if needs_artificial(b, slack) {
                t[next_art] = 1.0;
                basis.push(next_art);
                next_art += 1;
            } else if let Some(k) = slack {
                basis.push(n + k);
            }
            rows.push(t);
        }

        Self {
            rows,
            basis,
            n,
            ncols,
            first_art,
            rhs_scale,
        }
    }

    fn rhs(&self, i: usize) -> f64 {
        self.rows[i][self.ncols]
    }

    fn pivot(&mut self, r: usize, j: usize) {
        let p = self.rows[r][j];
        self.rows[r].iter_mut().for_each(|v| *v /= p);
        let pivot_row = self.rows[r].clone();
        for (i, row) in self.rows.iter_mut().enumerate() {
            if i == r {
                continue;
            }
            let f = row[j];
            if f != 0.0 {
                for (v, pv) in row.iter_mut().zip(&pivot_row) {
                    *v -= f * pv;
                }
                row[j] = 0.0;
            }
        }
        self.basis[r] = j;
    }

    /// Replace basic artificials (all at zero after a feasible phase 1) by
    /// real columns. Rows with no usable column are redundant and keep theirs.
    fn drive_out_artificials(&mut self, tol_pivot: f64) {
        for r in 0..self.rows.len() {
            if self.basis[r] < self.first_art {
                continue;
            }
            let best = (0..self.first_art)
                .filter(|&j| self.rows[r][j].abs() > tol_pivot)
                .max_by(|&a, &b| self.rows[r][a].abs().total_cmp(&self.rows[r][b].abs()));
            if let Some(j) = best {
                let ncols = self.ncols;
                self.rows[r][ncols] = 0.0;
                self.pivot(r, j);
            }
        }
    }

    fn primal(&self) -> Vec<f64> {
        let mut x = vec![0.0; self.n];
        for (i, &j) in self.basis.iter().enumerate() {
            if j < self.n {
                x[j] = self.rhs(i).max(0.0);
            }
        }
        x
    }
}

struct Run<'a> {
    settings: &'a SimplexSettings,
    rule: PivotRule,
    iterations: usize,
    max_iter: usize,
}

impl Run<'_> {
    /// Pivot until no column below `allowed` has a negative reduced cost
    fn optimize(&mut self, t: &mut Tableau, cost: &[f64], allowed: usize) -> Result<(), SolveStatus> {
        let mut degenerate = 0usize;
        loop {
            let bland = match self.rule {
                PivotRule::Bland => true,
                PivotRule::Dantzig => degenerate >= self.settings.degenerate_switch,
            };

            let reduced = reduced_costs(t, cost);
            let entering = if bland {
                (0..allowed).find(|&j| reduced[j] < -self.settings.tol_cost)
            } else {
                (0..allowed)
                    .filter(|&j| reduced[j] < -self.settings.tol_cost)
                    .min_by(|&a, &b| reduced[a].total_cmp(&reduced[b]))
            };
            let Some(j) = entering else {
                return Ok(());
            };

            if self.iterations >= self.max_iter {
                return Err(SolveStatus::IterationLimit);
            }

            // Ratio test; ties go to the lowest basic index
            let mut leaving: Option<(usize, f64)> = None;
            for i in 0..t.rows.len() {
                let a = t.rows[i][j];
                if a <= self.settings.tol_pivot {
                    continue;
                }
                let ratio = t.rhs(i).max(0.0) / a;
                leaving = match leaving {
                    Some((r, best)) if ratio > best || (ratio == best && t.basis[i] > t.basis[r]) => Some((r, best)),
                    _ => Some((i, ratio)),
                };
            }
            let Some((r, ratio)) = leaving else {
                return Err(SolveStatus::Unbounded);
            };

            if ratio <= self.settings.tol_pivot {
                degenerate += 1;
            } else {
                degenerate = 0;
            }
            t.pivot(r, j);
            self.iterations += 1;

            if t.rows.iter().any(|row| !row[t.ncols].is_finite()) {
                return Err(SolveStatus::NumericalError);
            }
        }
    }
}

fn reduced_costs(t: &Tableau, cost: &[f64]) -> Vec<f64> {
    let mut reduced = cost.to_vec();
    for (i, row) in t.rows.iter().enumerate() {
        let cb = cost[t.basis[i]];
        if cb != 0.0 {
            for (d, a) in reduced.iter_mut().zip(&row[..t.ncols]) {
                *d -= cb * a;
            }
        }
    }
    reduced
}

fn verify(lp: &LinearProgram, x: &[f64], tol: f64) -> bool {
    let ub_ok = lp
        .a_ub
        .iter()
        .zip(&lp.b_ub)
        .all(|(row, &b)| dot(row, x) - b <= tol * (1.0 + b.abs()));
    let eq_ok = lp
        .a_eq
        .iter()
        .zip(&lp.b_eq)
        .all(|(row, &b)| (dot(row, x) - b).abs() <= tol * (1.0 + b.abs()));
    ub_ok && eq_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solve(rule: PivotRule, lp: &LinearProgram) -> LpSolution {
        Simplex::new(rule).solve(lp)
    }

    #[test]
    fn mixed_constraints() {
        // min -x0 + 4x1 st -3x0 + x1 <= 6, x0 + 2x1 <= 4, x0 + x1 == 1
        let mut lp = LinearProgram::new(vec![-1.0, 4.0]);
        lp.add_ub(vec![-3.0, 1.0], 6.0)
            .add_ub(vec![1.0, 2.0], 4.0)
            .add_eq(vec![1.0, 1.0], 1.0);
        for rule in [PivotRule::Dantzig, PivotRule::Bland] {
            let s = solve(rule, &lp);
            assert_eq!(s.status, SolveStatus::Optimal);
            assert!((s.x[0] - 1.0).abs() < 1e-9);
            assert!(s.x[1].abs() < 1e-9);
            assert!((s.objective + 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn negative_rhs_needs_phase_one() {
        // min x0 + x1 st x0 + x1 >= 2, x0 <= 3
        let mut lp = LinearProgram::new(vec![1.0, 1.0]);
        lp.add_ub(vec![-1.0, -1.0], -2.0).add_ub(vec![1.0, 0.0], 3.0);
        let s = solve(PivotRule::Dantzig, &lp);
        assert_eq!(s.status, SolveStatus::Optimal);
        assert!((s.objective - 2.0).abs() < 1e-9);
    }

    #[test]
    fn detects_infeasible() {
        let mut lp = LinearProgram::new(vec![1.0]);
        lp.add_ub(vec![1.0], 1.0).add_eq(vec![1.0], 2.0);
        assert_eq!(solve(PivotRule::Dantzig, &lp).status, SolveStatus::Infeasible);
    }

    #[test]
    fn detects_unbounded() {
        let mut lp = LinearProgram::new(vec![-1.0, 0.0]);
        lp.add_ub(vec![-1.0, 1.0], 1.0);
        assert_eq!(solve(PivotRule::Bland, &lp).status, SolveStatus::Unbounded);
    }

    #[test]
    fn redundant_equalities_are_tolerated() {
        let mut lp = LinearProgram::new(vec![-1.0, -2.0]);
        lp.add_eq(vec![1.0, 1.0], 3.0)
            .add_eq(vec![2.0, 2.0], 6.0)
            .add_ub(vec![0.0, 1.0], 2.0);
        let s = solve(PivotRule::Dantzig, &lp);
        assert_eq!(s.status, SolveStatus::Optimal);
        assert!((s.x[0] - 1.0).abs() < 1e-9);
        assert!((s.x[1] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn row_scaling_keeps_solution() {
        let mut lp = LinearProgram::new(vec![-1.0, -1.0]);
        lp.add_ub(vec![1000.0, 2000.0], 4000.0).add_ub(vec![3e-3, 1e-3], 6e-3);
        let s = Simplex::new(PivotRule::Dantzig).with_row_scaling().solve(&lp);
        assert_eq!(s.status, SolveStatus::Optimal);
        assert!((s.x[0] - 1.6).abs() < 1e-9);
        assert!((s.x[1] - 1.2).abs() < 1e-9);
    }

    #[test]
    fn pivot_cap_reports_iteration_limit() {
        let mut lp = LinearProgram::new(vec![-1.0, -1.0]);
        lp.add_ub(vec![1.0, 2.0], 4.0).add_ub(vec![3.0, 1.0], 6.0);
        let capped = Simplex::new(PivotRule::Dantzig).with_settings(SimplexSettings {
            max_iter: Some(1),
            ..Default::default()
        });
        let s = capped.solve(&lp);
        assert_eq!(s.status, SolveStatus::IterationLimit);
        assert!(s.x.is_empty());
        assert_eq!(solve(PivotRule::Dantzig, &lp).status, SolveStatus::Optimal);
    }

    #[test]
    fn empty_program_is_trivially_optimal() {
        let lp = LinearProgram::new(vec![1.0, 0.0]);
        let s = solve(PivotRule::Dantzig, &lp);
        assert_eq!(s.status, SolveStatus::Optimal);
        assert_eq!(s.x, vec![0.0, 0.0]);
    }
}
