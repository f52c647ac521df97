//! Armijo-Goldstein backtracking along the Newton direction.
//!
//! The merit function is `f1 = 0.5*||f_scale*F||_2^2`. A step length `rl` is
//! accepted when
//!   alpha condition: f1(u + rl*p) <= f1(u) + alpha*rl*slope
//!   beta condition:  f1(u + rl*p) >= f1(u) + beta*rl*slope
//! where `slope = (f_scale*F).(f_scale*J*p)` is negative for a descent
//! direction. Backtracking uses a quadratic model on the first reduction and
//! cubic models afterwards; each reduction keeps `rl` in [0.1*rl, 0.5*rl].
use crate::numerical::Nonlinear_systems::error::SolverError;
use crate::somelinalg::nvector::NVector;
use log::{debug, info};

/// Residual information at a trial point
#[derive(Debug, Clone)]
pub struct TrialPoint {
    pub u: NVector,
    pub f: NVector,
    /// ||f_scale*F||_inf
    pub fnorm: f64,
    /// 0.5*||f_scale*F||_2^2
    pub f1norm: f64,
}

#[derive(Debug)]
pub enum LineSearchOutcome {
    Accepted {
        trial: TrialPoint,
        rl: f64,
        max_step_taken: bool,
        beta_failed: bool,
        backtracks: usize,
    },
    /// no acceptable point distinct enough from u was found
    StepTooSmall { backtracks: usize },
}

pub struct LineSearch {
    pub alpha: f64,
    pub beta: f64,
    pub max_backtracks: usize,
}

impl Default for LineSearch {
    fn default() -> Self {
        LineSearch {
            alpha: 1e-4,
            beta: 0.9,
            max_backtracks: 20,
        }
    }
}

/// scaled relative length of the step, max_i |p_i| / max(|u_i|, 1/u_scale_i)
pub fn relative_step_length(u: &NVector, p: &NVector, u_scale: &NVector) -> f64 {
    u.iter()
        .zip(p.iter())
        .zip(u_scale.iter())
        .fold(0.0, |acc, ((ui, pi), si)| {
            acc.max(pi.abs() / ui.abs().max(1.0 / si))
        })
}

impl LineSearch {
    pub fn new(max_backtracks: usize) -> LineSearch {
        LineSearch {
            max_backtracks,
            ..LineSearch::default()
        }
    }

    /// `eval(u_new)` returns `Ok(None)` after a recoverable residual failure,
    /// which is treated like a failed alpha condition and halves the step.
    #[allow(clippy::too_many_arguments)]
    pub fn search<E>(
        &self,
        u: &NVector,
        p: &NVector,
        pnorm: f64,
        f1norm: f64,
        slope: f64,
        rlmin: f64,
        max_step: f64,
        mut eval: E,
    ) -> Result<LineSearchOutcome, SolverError>
    where
        E: FnMut(&NVector) -> Result<Option<TrialPoint>, SolverError>,
    {
        let (alpha, beta) = (self.alpha, self.beta);
        let rlmax = max_step / pnorm;
        let mut rl = 1.0;
        let mut rlprev = 1.0;
        let mut f1nprv = f1norm;
        let mut first_backtrack = true;
        let mut backtracks = 0;

        // alpha condition
        let mut trial = loop {
            let candidate = eval(&NVector::linear_sum(1.0, u, rl, p))?;
            if let Some(t) = candidate {
                if t.f1norm <= f1norm + alpha * slope * rl {
                    break t;
                }
                if rl < rlmin || backtracks >= self.max_backtracks {
                    info!("line search: no sufficient decrease, rl = {:.3e}", rl);
                    return Ok(LineSearchOutcome::StepTooSmall { backtracks });
                }
                let mut rltmp = if first_backtrack {
                    first_backtrack = false;
                    -slope / (2.0 * (t.f1norm - f1norm - slope))
                } else {
                    let tmp1 = t.f1norm - f1norm - rl * slope;
                    let tmp2 = f1nprv - f1norm - rlprev * slope;
                    let inv = 1.0 / (rl - rlprev);
                    let a = inv * (tmp1 / (rl * rl) - tmp2 / (rlprev * rlprev));
                    let b = inv * (-rlprev * tmp1 / (rl * rl) + rl * tmp2 / (rlprev * rlprev));
                    if a.abs() < f64::EPSILON {
                        -slope / (2.0 * b)
                    } else {
                        let disc = (b * b - 3.0 * a * slope).max(0.0);
                        (-b + disc.sqrt()) / (3.0 * a)
                    }
                };
                if !rltmp.is_finite() || rltmp > 0.5 * rl {
                    rltmp = 0.5 * rl;
                }
                rlprev = rl;
                f1nprv = t.f1norm;
                rl = rltmp.max(0.1 * rl);
            } else {
                if rl < rlmin || backtracks >= self.max_backtracks {
                    return Ok(LineSearchOutcome::StepTooSmall { backtracks });
                }
                // recoverable failure at the trial point
                rl *= 0.5;
            }
            backtracks += 1;
            debug!("line search backtrack {}, rl = {:.3e}", backtracks, rl);
        };

        // beta condition
        let mut beta_failed = false;
        if trial.f1norm < f1norm + beta * slope * rl {
            let mut prev_trial: Option<TrialPoint> = None;
            if rl == 1.0 && pnorm < max_step {
                // the full step is too short: expand while alpha holds and beta fails
                while rl < rlmax && backtracks < self.max_backtracks {
                    let rlnext = (2.0 * rl).min(rlmax);
                    backtracks += 1;
                    let Some(t) = eval(&NVector::linear_sum(1.0, u, rlnext, p))? else {
                        break;
                    };
                    let alpha_ok = t.f1norm <= f1norm + alpha * slope * rlnext;
                    let beta_fails = t.f1norm < f1norm + beta * slope * rlnext;
                    rlprev = rl;
                    rl = rlnext;
                    prev_trial = Some(std::mem::replace(&mut trial, t));
                    if !(alpha_ok && beta_fails) {
                        break;
                    }
                }
            }
            let alpha_cond = f1norm + alpha * slope * rl;
            if rl < 1.0 || (rl > 1.0 && trial.f1norm > alpha_cond) {
                // refine between the longest length known to satisfy alpha (rllo) and rllo + rldiff
                let mut rllo = rl.min(rlprev);
                let mut rldiff = (rlprev - rl).abs();
                let mut lo_trial = if rllo == rl {
                    Some(trial.clone())
                } else {
                    prev_trial
                };
                while backtracks < self.max_backtracks {
                    let rlinc = 0.5 * rldiff;
                    let rlmid = rllo + rlinc;
                    backtracks += 1;
                    let Some(t) = eval(&NVector::linear_sum(1.0, u, rlmid, p))? else {
                        rldiff = rlinc;
                        if rldiff < rlmin {
                            break;
                        }
                        continue;
                    };
                    let alpha_fails = t.f1norm > f1norm + alpha * slope * rlmid;
                    let beta_fails = t.f1norm < f1norm + beta * slope * rlmid;
                    if alpha_fails {
                        rldiff = rlinc;
                    } else if beta_fails {
                        rllo = rlmid;
                        rldiff -= rlinc;
                        lo_trial = Some(t.clone());
                    }
                    rl = rlmid;
                    trial = t;
                    if !(alpha_fails || (beta_fails && rldiff >= rlmin)) {
                        break;
                    }
                }
                let alpha_cond = f1norm + alpha * slope * rl;
                let beta_cond = f1norm + beta * slope * rl;
                if trial.f1norm < beta_cond || trial.f1norm > alpha_cond {
                    // fall back to the last length satisfying the alpha condition
                    beta_failed = true;
                    rl = rllo;
                    trial = match lo_trial {
                        Some(t) => t,
                        None => match eval(&NVector::linear_sum(1.0, u, rllo, p))? {
                            Some(t) => t,
                            None => return Ok(LineSearchOutcome::StepTooSmall { backtracks }),
                        },
                    };
                }
            }
        }

        Ok(LineSearchOutcome::Accepted {
            max_step_taken: rl * pnorm > 0.99 * max_step,
            trial,
            rl,
            beta_failed,
            backtracks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn trial_for(u: &NVector, f: NVector) -> TrialPoint {
        TrialPoint {
            u: u.clone(),
            fnorm: f.max_norm(),
            f1norm: 0.5 * f.dot(&f),
            f,
        }
    }

    #[test]
    fn test_full_step_accepted() {
        // F(u) = u - 1, Newton step from 0 is exact
        let u = NVector::from_vec(vec![0.0]);
        let p = NVector::from_vec(vec![1.0]);
        let f1norm = 0.5;
        let slope = -1.0;
        let ls = LineSearch::default();
        let out = ls
            .search(&u, &p, 1.0, f1norm, slope, 1e-10, 1000.0, |x: &NVector| {
                Ok(Some(trial_for(x, NVector::from_vec(vec![x[0] - 1.0]))))
            })
            .unwrap();
        match out {
            LineSearchOutcome::Accepted { rl, beta_failed, backtracks, .. } => {
                assert_eq!(rl, 1.0);
                assert!(!beta_failed);
                assert_eq!(backtracks, 0);
            }
            _ => panic!("full step must be accepted"),
        }
    }

    #[test]
    fn test_overshooting_step_is_shortened() {
        // F(u) = atan(u); Newton from u = 2 overshoots badly
        let u = NVector::from_vec(vec![2.0]);
        let f0 = 2.0f64.atan();
        let jac = 1.0 / 5.0;
        let p = NVector::from_vec(vec![-f0 / jac]);
        let f1norm = 0.5 * f0 * f0;
        let slope = -f0 * f0;
        let ls = LineSearch::default();
        let out = ls
            .search(&u, &p, p.l2_norm(), f1norm, slope, 1e-10, 1000.0, |x: &NVector| {
                Ok(Some(trial_for(x, NVector::from_vec(vec![x[0].atan()]))))
            })
            .unwrap();
        match out {
            LineSearchOutcome::Accepted { rl, trial, backtracks, .. } => {
                assert!(rl < 1.0);
                assert!(backtracks >= 1);
                assert!(trial.f1norm <= f1norm + 1e-4 * slope * rl);
                assert!(trial.u[0].abs() < 2.0);
            }
            _ => panic!("a shortened step must be found"),
        }
    }

    #[test]
    fn test_step_too_small() {
        // ascent direction: no rl satisfies the alpha condition
        let u = NVector::from_vec(vec![1.0]);
        let p = NVector::from_vec(vec![1.0]);
        let ls = LineSearch::new(50);
        let out = ls
            .search(&u, &p, 1.0, 0.5, -1.0, 1e-3, 1000.0, |x: &NVector| {
                Ok(Some(trial_for(x, NVector::from_vec(vec![x[0]]))))
            })
            .unwrap();
        assert!(matches!(out, LineSearchOutcome::StepTooSmall { .. }));
    }

    #[test]
    fn test_relative_step_length() {
        let u = NVector::from_vec(vec![10.0, 0.0]);
        let p = NVector::from_vec(vec![1.0, 0.5]);
        let s = NVector::from_vec(vec![1.0, 4.0]);
        // max(1/10, 0.5/0.25)
        assert_relative_eq!(relative_step_length(&u, &p, &s), 2.0, epsilon = 1e-15);
    }
}
