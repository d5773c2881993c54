//! ODE integration interface
//!
//! The collision-aware advancer drives any [`DiffEqSolver`] over an
//! [`OdeSystem`]; the world is the only system in this crate.

use super::vars::VarsList;
use crate::error::SimError;

/// A system of first-order differential equations over a flat state vector
pub trait OdeSystem {
    /// Current state and time
    fn vars(&self) -> VarsList;

    /// Replace the current state and time
    fn set_vars(&mut self, vars: &VarsList);

    /// Write the time derivative of `vars` into `change`
    fn evaluate(&mut self, vars: &VarsList, change: &mut [f64]) -> Result<(), SimError>;
}

/// Steps an [`OdeSystem`] forward in time
pub trait DiffEqSolver {
    fn step(&mut self, system: &mut dyn OdeSystem, h: f64) -> Result<(), SimError>;

    fn name(&self) -> &'static str;
}

/// Classic fourth-order Runge-Kutta
#[derive(Debug, Clone, Copy, Default)]
pub struct RungeKutta;

impl DiffEqSolver for RungeKutta {
    fn step(&mut self, system: &mut dyn OdeSystem, h: f64) -> Result<(), SimError> {
        let start = system.vars();
        let n = start.values.len();
        let mut k1 = vec![0.0; n];
        let mut k2 = vec![0.0; n];
        let mut k3 = vec![0.0; n];
        let mut k4 = vec![0.0; n];

        system.evaluate(&start, &mut k1)?;
        let mid1 = offset(&start, &k1, h / 2.0);
        system.evaluate(&mid1, &mut k2)?;
        let mid2 = offset(&start, &k2, h / 2.0);
        system.evaluate(&mid2, &mut k3)?;
        let end = offset(&start, &k3, h);
        system.evaluate(&end, &mut k4)?;

        let mut next = VarsList {
            values: start.values.clone(),
            time: start.time + h,
        };
        for i in 0..n {
            next.values[i] += h / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
        }
        if !next.is_finite() {
            return Err(SimError::NumericalFailure {
                context: "runge-kutta step",
            });
        }
        system.set_vars(&next);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "runge-kutta"
    }
}

fn offset(start: &VarsList, rate: &[f64], h: f64) -> VarsList {
    VarsList {
        values: start
            .values
            .iter()
            .zip(rate)
            .map(|(v, r)| v + r * h)
            .collect(),
        time: start.time + h,
    }
}
