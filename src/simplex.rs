/// Downhill simplex (Nelder-Mead) minimizer over a fixed-size parameter
/// vector. Derivative free; returns its best vertex even when the tolerance
/// is not reached within the evaluation budget.
use nalgebra::SVector;

const TINY: f64 = 1.0e-20;

#[derive(Debug, Clone, Copy)]
pub struct Simplex {
    /// Relative spread of objective values across the vertices at which
    /// the search stops
    pub ftol: f64,
    /// Largest vertex offset from the best vertex, relative to `1 + |best|`,
    /// at which the search may stop
    pub xtol: f64,
    pub max_evaluations: usize,
}

impl Default for Simplex {
    fn default() -> Self {
        Self {
            ftol: 1.0e-8,
            xtol: 1.0e-8,
            max_evaluations: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SimplexResult<const N: usize> {
    pub point: SVector<f64, N>,
    pub value: f64,
    pub evaluations: usize,
    pub converged: bool,
}

impl Simplex {
    pub fn new(ftol: f64, max_evaluations: usize) -> Self {
        Self {
            ftol,
            max_evaluations,
            ..Default::default()
        }
    }

    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.xtol = xtol;
        self
    }

    /// Both the values and the vertices must have come together. Equal values
    /// on either side of a minimum are not convergence.
    fn has_converged<const N: usize>(
        &self,
        pts: &[SVector<f64, N>],
        vals: &[f64],
        ilo: usize,
        ihi: usize,
    ) -> bool {
        let spread = 2.0 * (vals[ihi] - vals[ilo]).abs();
        if spread > self.ftol * (vals[ihi].abs() + vals[ilo].abs()) + TINY {
            return false;
        }
        let best = pts[ilo];
        let size = pts
            .iter()
            .map(|p| (p - best).amax())
            .fold(0.0_f64, f64::max);
        size <= self.xtol * (1.0 + best.amax())
    }

    /// Minimize `f` from a simplex made of `start` and `start + steps[i] * e_i`.
    pub fn minimize<const N: usize, F>(
        &self,
        mut f: F,
        start: SVector<f64, N>,
        steps: SVector<f64, N>,
    ) -> SimplexResult<N>
    where
        F: FnMut(&SVector<f64, N>) -> f64,
    {
        let mut pts: Vec<SVector<f64, N>> = Vec::with_capacity(N + 1);
        pts.push(start);
        for i in 0..N {
            let mut p = start;
            p[i] += steps[i];
            pts.push(p);
        }
        let mut vals: Vec<f64> = pts.iter().map(&mut f).collect();
        let mut evaluations = N + 1;
        let mut converged = false;

        loop {
            let mut order: Vec<usize> = (0..=N).collect();
            order.sort_by(|&a, &b| vals[a].total_cmp(&vals[b]));
            let ilo = order[0];
            let ihi = order[N];
            let inhi = order[N.saturating_sub(1)];

            if self.has_converged(&pts, &vals, ilo, ihi) {
                converged = true;
                break;
            }
            if evaluations >= self.max_evaluations {
                break;
            }

            let mut centroid = SVector::<f64, N>::zeros();
            for (i, p) in pts.iter().enumerate() {
                if i != ihi {
                    centroid += p;
                }
            }
            centroid /= N as f64;

            let reflected = centroid + (centroid - pts[ihi]);
            let fr = f(&reflected);
            evaluations += 1;

            if fr < vals[ilo] {
                let expanded = centroid + (centroid - pts[ihi]) * 2.0;
                let fe = f(&expanded);
                evaluations += 1;
                if fe < fr {
                    pts[ihi] = expanded;
                    vals[ihi] = fe;
                } else {
                    pts[ihi] = reflected;
                    vals[ihi] = fr;
                }
            } else if fr < vals[inhi] {
                pts[ihi] = reflected;
                vals[ihi] = fr;
            } else {
                let contracted = if fr < vals[ihi] {
                    centroid + (reflected - centroid) * 0.5
                } else {
                    centroid + (pts[ihi] - centroid) * 0.5
                };
                let fc = f(&contracted);
                evaluations += 1;
                if fc < fr.min(vals[ihi]) {
                    pts[ihi] = contracted;
                    vals[ihi] = fc;
                } else {
                    let best = pts[ilo];
                    for i in 0..=N {
                        if i != ilo {
                            pts[i] = best + (pts[i] - best) * 0.5;
                            vals[i] = f(&pts[i]);
                            evaluations += 1;
                        }
                    }
                }
            }
        }

        let (best, value) = vals
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, v)| (pts[i], *v))
            .unwrap_or((start, f64::INFINITY));

        SimplexResult {
            point: best,
            value,
            evaluations,
            converged,
        }
    }
}
