//! Stiff integration with the BDF method of `diffsol`
//!
//! The whole-body model couples lung plasma (a few millilitres) to the full
//! cardiac output, which puts eigenvalues around -1000/min next to terminal
//! phases of hours. The variable order BDF solver with a dense LU copes with
//! that stiffness. Its Jacobian is assembled from forward differences of the
//! right-hand side, one direction at a time.

use std::cell::RefCell;

use diffsol::error::{DiffsolError, OdeSolverError};
use diffsol::{NalgebraLU, NalgebraMat, OdeBuilder, OdeSolverMethod, OdeSolverStopReason, VectorHost};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::SimulationError;

type M = NalgebraMat<f64>;

/// A first order system `dy/dt = f(t, y)`
pub trait OdeSystem {
    fn dimension(&self) -> usize;

    /// Write `f(t, y)` into `dy`
    fn rhs(&mut self, t: f64, y: &DVector<f64>, dy: &mut DVector<f64>);
}

/// Tolerances and limits of the integrator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Relative tolerance
    pub rtol: f64,
    /// Absolute tolerance, in state units
    pub atol: f64,
    /// Initial step size in model time units
    pub h0: f64,
    /// Maximum number of solver steps for one segment
    pub max_steps: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            rtol: 1e-6,
            atol: 1e-9,
            h0: 1e-4,
            max_steps: 100_000,
        }
    }
}

/// Owns the system and the buffers its closures write through
struct Evaluator<S> {
    system: S,
    y: DVector<f64>,
    dy: DVector<f64>,
    base: DVector<f64>,
}

impl<S: OdeSystem> Evaluator<S> {
    fn new(system: S) -> Self {
        let n = system.dimension();
        Evaluator {
            system,
            y: DVector::zeros(n),
            dy: DVector::zeros(n),
            base: DVector::zeros(n),
        }
    }

    fn rhs(&mut self, t: f64, x: &[f64], out: &mut [f64]) {
        self.y.copy_from_slice(x);
        self.system.rhs(t, &self.y, &mut self.dy);
        out.copy_from_slice(self.dy.as_slice());
    }

    /// Forward difference of `f` along `v`, an approximation of `J(x) v`
    ///
    /// The increment scales with the states `v` moves, so a unit direction
    /// perturbs its state by `sqrt(eps) * max(|x_j|, 1e-6)`.
    fn jac_mul(&mut self, t: f64, x: &[f64], v: &[f64], out: &mut [f64]) {
        let weight: f64 = v.iter().map(|b| b.abs()).sum();
        if weight == 0.0 {
            out.fill(0.0);
            return;
        }
        let v_max = v.iter().fold(0.0f64, |m, b| m.max(b.abs()));
        let scale = x.iter().zip(v).map(|(a, b)| a.abs() * b.abs()).sum::<f64>() / weight;
        let delta = f64::EPSILON.sqrt() * scale.max(1e-6) / v_max;

        self.y.copy_from_slice(x);
        self.system.rhs(t, &self.y, &mut self.base);
        for (y, b) in self.y.iter_mut().zip(v) {
            *y += delta * b;
        }
        self.system.rhs(t, &self.y, &mut self.dy);
        for ((o, f), f0) in out.iter_mut().zip(self.dy.iter()).zip(self.base.iter()) {
            *o = (f - f0) / delta;
        }
    }
}

fn solver_error(time: f64, error: DiffsolError) -> SimulationError {
    match error {
        DiffsolError::OdeSolverError(OdeSolverError::StepSizeTooSmall { time }) => {
            SimulationError::StepSizeTooSmall { time }
        }
        other => SimulationError::Solver {
            time,
            message: other.to_string(),
        },
    }
}

/// Integrate `system` from `(t0, y0)` and pass the state at each of `times` to `output`
///
/// `times` must be non-decreasing and not before `t0`; a time equal to the
/// current one is reported without stepping. The solver stops exactly on every
/// output time. Returns the number of steps taken.
pub fn integrate<S, F>(
    system: S,
    options: &SolverOptions,
    t0: f64,
    y0: &DVector<f64>,
    times: &[f64],
    mut output: F,
) -> Result<usize, SimulationError>
where
    S: OdeSystem,
    F: FnMut(f64, &DVector<f64>),
{
    let n = system.dimension();
    let evaluator = RefCell::new(Evaluator::new(system));
    let problem = OdeBuilder::<M>::new()
        .rtol(options.rtol)
        .atol([options.atol])
        .h0(options.h0)
        .t0(t0)
        .rhs_implicit(
            |x, _p, t, y| evaluator.borrow_mut().rhs(t, x.as_slice(), y.as_mut_slice()),
            |x, _p, t, v, y| {
                evaluator
                    .borrow_mut()
                    .jac_mul(t, x.as_slice(), v.as_slice(), y.as_mut_slice())
            },
        )
        .init(|_p, _t, y| y.as_mut_slice().copy_from_slice(y0.as_slice()), n)
        .build()
        .map_err(|e| solver_error(t0, e))?;
    let mut solver = problem
        .bdf::<NalgebraLU<f64>>()
        .map_err(|e| solver_error(t0, e))?;

    let mut steps = 0;
    let mut y = DVector::zeros(n);
    for &t in times {
        match solver.set_stop_time(t) {
            Ok(()) => loop {
                if steps >= options.max_steps {
                    return Err(SimulationError::MaxSteps {
                        time: solver.state().t,
                        steps,
                    });
                }
                steps += 1;
                match solver.step() {
                    Ok(OdeSolverStopReason::TstopReached) => break,
                    Ok(_) => {}
                    Err(e) => return Err(solver_error(solver.state().t, e)),
                }
            },
            Err(DiffsolError::OdeSolverError(OdeSolverError::StopTimeAtCurrentTime)) => {}
            Err(e) => return Err(solver_error(t, e)),
        }
        y.copy_from_slice(solver.state().y.as_slice());
        output(t, &y);
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Decay {
        k: f64,
    }

    impl OdeSystem for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn rhs(&mut self, _t: f64, y: &DVector<f64>, dy: &mut DVector<f64>) {
            dy[0] = -self.k * y[0];
        }
    }

    /// Fast and slow linear chain; the fast rate makes explicit methods crawl
    struct StiffChain;

    impl OdeSystem for StiffChain {
        fn dimension(&self) -> usize {
            2
        }

        fn rhs(&mut self, _t: f64, y: &DVector<f64>, dy: &mut DVector<f64>) {
            dy[0] = -1000.0 * y[0] + 1000.0 * y[1];
            dy[1] = 1000.0 * y[0] - 1000.0 * y[1] - 0.01 * y[1];
        }
    }

    fn grid(end: f64, n: usize) -> Vec<f64> {
        (0..=n).map(|i| end * i as f64 / n as f64).collect()
    }

    #[test]
    fn exponential_decay() {
        let y0 = DVector::from_vec(vec![2.0]);
        let mut seen = Vec::new();
        integrate(Decay { k: 0.5 }, &SolverOptions::default(), 0.0, &y0, &grid(10.0, 10), |t, y| {
            seen.push((t, y[0]))
        })
        .unwrap();

        assert_eq!(seen.len(), 11);
        assert_eq!(seen[0], (0.0, 2.0));
        for (t, y) in seen {
            assert_relative_eq!(y, 2.0 * (-0.5 * t).exp(), max_relative = 1e-4);
        }
    }

    #[test]
    fn tighter_tolerances_reduce_the_global_error() {
        let y0 = DVector::from_vec(vec![1.0]);
        let error = |rtol: f64| {
            let options = SolverOptions {
                rtol,
                atol: 1e-14,
                ..SolverOptions::default()
            };
            let mut end = 0.0;
            integrate(Decay { k: 0.5 }, &options, 0.0, &y0, &[0.0, 10.0], |_, y| end = y[0]).unwrap();
            ((end - (-5.0f64).exp()) / (-5.0f64).exp()).abs()
        };
        let (coarse, fine) = (error(1e-6), error(1e-9));
        assert!(coarse < 1e-4, "{coarse:e}");
        assert!(fine < coarse, "{fine:e} >= {coarse:e}");
    }

    #[test]
    fn stiff_chain_in_few_steps() {
        let y0 = DVector::from_vec(vec![1.0, 0.0]);
        let mut total = 0.0;
        let steps = integrate(StiffChain, &SolverOptions::default(), 0.0, &y0, &[100.0], |_, y| {
            total = y[0] + y[1]
        })
        .unwrap();
        // Pools equilibrate immediately and then decay slowly with rate ~0.005
        assert_relative_eq!(total, (-0.005f64 * 100.0).exp(), max_relative = 1e-3);
        assert!(steps < 2_000, "{} steps", steps);
    }

    #[test]
    fn step_budget_is_enforced() {
        let options = SolverOptions {
            max_steps: 3,
            ..SolverOptions::default()
        };
        let y0 = DVector::from_vec(vec![1.0, 0.0]);
        let result = integrate(StiffChain, &options, 0.0, &y0, &[1000.0], |_, _| {});
        assert!(matches!(result, Err(SimulationError::MaxSteps { steps: 3, .. })));
    }

    #[test]
    fn restarting_from_a_reported_state() {
        let y0 = DVector::from_vec(vec![2.0]);
        let mut middle = DVector::<f64>::zeros(1);
        integrate(Decay { k: 0.5 }, &SolverOptions::default(), 0.0, &y0, &[0.0, 4.0], |_, y| {
            middle.copy_from(y)
        })
        .unwrap();
        let mut end = 0.0;
        integrate(Decay { k: 0.5 }, &SolverOptions::default(), 4.0, &middle, &[4.0, 8.0], |_, y| {
            end = y[0]
        })
        .unwrap();
        assert_relative_eq!(end, 2.0 * (-4.0f64).exp(), max_relative = 1e-4);
    }
}
