use nalgebra::DVector;
use tracing::{debug, info, warn};

use super::solver::{NewtonSolver, SolverError};
use crate::discretization::DiscretizedModel;
use crate::physics::event::EventKind;
use crate::processing::solution::{Solution, Termination};

/// Fixed-step explicit Euler on the differential states, with the algebraic
/// states re-solved by Newton after every step.
///
/// Termination events stop the run at the linear interpolant of the sign
/// change; interpolation events only record their crossing time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransientSolver {
    pub t_start: f64,
    pub t_end: f64,
    pub dt: f64,
    pub newton: NewtonSolver,
}

impl Default for TransientSolver {
    fn default() -> Self {
        Self {
            t_start: 0.0,
            t_end: 1.0,
            dt: 1e-4,
            newton: NewtonSolver::default(),
        }
    }
}

impl TransientSolver {
    /// Rejects spans the stepping loop could never finish.
    pub fn validate(&self) -> Result<(), SolverError> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(SolverError::InvalidTimeSpan(format!(
                "dt must be positive and finite, got {}",
                self.dt
            )));
        }
        if !(self.t_start.is_finite() && self.t_end.is_finite() && self.t_end > self.t_start) {
            return Err(SolverError::InvalidTimeSpan(format!(
                "t_end ({}) must be after t_start ({})",
                self.t_end, self.t_start
            )));
        }
        Ok(())
    }

    pub fn solve(
        &self,
        model: &DiscretizedModel,
        mut callback: impl FnMut(f64, &DVector<f64>),
    ) -> Result<Solution, SolverError> {
        self.validate()?;
        let mut t = self.t_start;
        let mut y = self
            .newton
            .solve_algebraic(model, t, model.initial_state().clone())?
            .solution;

        let mut events = model.event_values(t, &y);
        for (event, value) in model.events().iter().zip(&events) {
            if event.kind == EventKind::Termination && *value <= 0.0 {
                return Err(SolverError::EventAtInitialConditions(event.name.clone()));
            }
        }

        info!(
            model = model.name(),
            states = model.len(),
            t_start = self.t_start,
            t_end = self.t_end,
            dt = self.dt,
            "starting transient simulation"
        );

        let mut solution = Solution {
            t: vec![t],
            y: vec![y.clone()],
            termination: Termination::FinalTime,
            interpolation_times: Vec::new(),
        };
        callback(t, &y);

        let n_diff = model.n_differential();
        let end_tolerance = 1e-12 * self.t_end.abs().max(1.0);
        let mut step = 0usize;
        while t < self.t_end - end_tolerance {
            step += 1;
            let h = self.dt.min(self.t_end - t);
            let f = model.rhs(t, &y);
            let mut next = y.clone();
            {
                let mut differential = next.rows_mut(0, n_diff);
                differential += f * h;
            }
            let t_next = t + h;
            let next = self.newton.solve_algebraic(model, t_next, next)?.solution;
            if next.iter().any(|v| !v.is_finite()) {
                warn!(t = t_next, "non-finite state");
                return Err(SolverError::NonFiniteState(t_next));
            }

            let next_events = model.event_values(t_next, &next);
            let mut stop = None;
            for ((event, before), after) in model.events().iter().zip(&events).zip(&next_events) {
                if !(*before > 0.0 && *after <= 0.0) {
                    continue;
                }
                let theta = before / (before - after);
                let t_cross = t + theta * h;
                match event.kind {
                    EventKind::Interpolation => {
                        debug!(event = %event.name, t = t_cross, "interpolation event");
                        solution
                            .interpolation_times
                            .push((event.name.clone(), t_cross));
                    }
                    EventKind::Termination => {
                        if stop.as_ref().map_or(true, |(_, th, _)| theta < *th) {
                            stop = Some((event.name.clone(), theta, t_cross));
                        }
                    }
                }
            }

            if let Some((name, theta, t_cross)) = stop {
                let y_cross = &y + (&next - &y) * theta;
                callback(t_cross, &y_cross);
                solution.t.push(t_cross);
                solution.y.push(y_cross);
                info!(event = %name, t = t_cross, steps = step, "termination event");
                solution.termination = Termination::Event(name);
                return Ok(solution);
            }

            t = t_next;
            y = next;
            events = next_events;
            callback(t, &y);
            solution.t.push(t);
            solution.y.push(y.clone());
        }

        info!(t, steps = step, "reached final time");
        Ok(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::{lithium_ion_mesh, Discretization};
    use crate::models::single_particle_model;
    use crate::physics::context::ModelContext;
    use indexmap::IndexMap;

    fn spm(points: usize) -> DiscretizedModel {
        let ctx = ModelContext::lithium_ion();
        let model = single_particle_model(&ctx).unwrap();
        let mesh = lithium_ion_mesh(ctx.params.as_ref(), &IndexMap::new(), points).unwrap();
        Discretization::new(mesh).process_model(&model).unwrap()
    }

    #[test]
    fn final_time_is_hit_exactly() {
        let model = spm(4);
        let solver = TransientSolver {
            t_end: 0.01,
            dt: 0.003,
            ..TransientSolver::default()
        };
        let mut calls = 0;
        let solution = solver.solve(&model, |_, _| calls += 1).unwrap();
        assert_eq!(solution.termination, Termination::FinalTime);
        assert_eq!(solution.len(), 5);
        assert_eq!(calls, 5);
        approx::assert_relative_eq!(*solution.t.last().unwrap(), 0.01, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_spans_are_rejected_before_stepping() {
        let model = spm(3);
        let span = |t_end: f64, dt: f64| TransientSolver {
            t_end,
            dt,
            ..TransientSolver::default()
        };
        for solver in [span(1.0, 0.0), span(1.0, -1e-3), span(1.0, f64::NAN), span(0.0, 1e-3)] {
            let err = solver.solve(&model, |_, _| {}).unwrap_err();
            assert!(matches!(err, SolverError::InvalidTimeSpan(_)), "{err}");
        }
    }
}
