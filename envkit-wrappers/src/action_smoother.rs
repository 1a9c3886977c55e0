//! Smoothing of the action signal with a Butterworth filter.
use crate::base::{BoxedEnvironment, WrapperCtor};
use crate::filter::{ButterworthFilter, IirFilter};
use anyhow::Result;
use envkit_core::error::EnvkitError;
use envkit_core::{Array, ArraySpec, Dtype, Environment, SpecTree, TimeStep, ValueTree};
use log::{info, trace};
use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Default filter order.
const FILTER_ORDER: usize = 2;

/// Default lowcut and highcut frequencies, in Hz.
const FILTER_LOWCUT: f64 = 0.0;
const FILTER_HIGHCUT: f64 = 4.0;

/// Configuration of [`ActionSmootherWrapper`].
///
/// A single cutoff value applies to every action dimension; a per-dimension
/// list must match the action dimension. A zero lowcut everywhere selects a
/// low-pass filter, a positive lowcut everywhere a band-pass filter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionSmootherConfig {
    /// Highcut frequencies in Hz; `None` uses 4 Hz for every dimension.
    pub highcut: Option<Vec<f64>>,
    /// Lowcut frequencies in Hz; `None` uses 0 Hz (low-pass) everywhere.
    pub lowcut: Option<Vec<f64>>,
    /// Filter order.
    pub order: usize,
}

impl Default for ActionSmootherConfig {
    fn default() -> Self {
        Self {
            highcut: None,
            lowcut: None,
            order: FILTER_ORDER,
        }
    }
}

impl ActionSmootherConfig {
    /// Sets one highcut frequency for all dimensions.
    pub fn highcut(mut self, highcut: f64) -> Self {
        self.highcut = Some(vec![highcut]);
        self
    }

    /// Sets per-dimension highcut frequencies.
    pub fn highcut_per_dim(mut self, highcut: Vec<f64>) -> Self {
        self.highcut = Some(highcut);
        self
    }

    /// Sets one lowcut frequency for all dimensions.
    pub fn lowcut(mut self, lowcut: f64) -> Self {
        self.lowcut = Some(vec![lowcut]);
        self
    }

    /// Sets per-dimension lowcut frequencies.
    pub fn lowcut_per_dim(mut self, lowcut: Vec<f64>) -> Self {
        self.lowcut = Some(lowcut);
        self
    }

    /// Sets the filter order.
    pub fn order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }
}

/// Low-pass or band-pass filters the action over the episode's time axis,
/// removing high-frequency jitter from stochastic policies.
///
/// Sampling rate comes from the inner chain's [`control_timestep`]. On
/// `reset` the filter history is cleared and seeded with the midpoint of the
/// action bounds in every slot, so holding the midpoint action produces no
/// transient. The filtered action is cast back to the action dtype before
/// being forwarded.
///
/// [`control_timestep`]: Environment::control_timestep
pub struct ActionSmootherWrapper<E> {
    env: E,
    filter: IirFilter,
    default_action: Vec<f64>,
    shape: Vec<usize>,
    dtype: Dtype,
}

impl<E: Environment> ActionSmootherWrapper<E> {
    /// Wraps `env`, deriving filter coefficients once per action dimension.
    pub fn new(env: E, config: ActionSmootherConfig) -> Result<Self> {
        let action_spec = env.action_spec();
        let spec = action_spec.as_leaf().ok_or_else(|| {
            EnvkitError::IncompatibleSpec(
                "ActionSmootherWrapper requires a flat (leaf) action spec".into(),
            )
        })?;
        if spec.is_discrete() {
            return Err(EnvkitError::IncompatibleSpec(
                "cannot smooth a discrete action".into(),
            )
            .into());
        }
        if spec.shape().len() > 1 {
            return Err(EnvkitError::IncompatibleSpec(format!(
                "ActionSmootherWrapper requires a rank-1 or scalar action, got shape {:?}",
                spec.shape()
            ))
            .into());
        }
        if !spec.has_finite_bounds() {
            return Err(EnvkitError::InvalidConfig(
                "cannot derive a default action: action bounds must be finite".into(),
            )
            .into());
        }
        let dim = spec.num_elements();
        let lo = spec.minimum().unwrap();
        let hi = spec.maximum().unwrap();
        let default_action: Vec<f64> = lo
            .iter()
            .zip(hi.iter())
            .map(|(lo, hi)| (lo + hi) / 2.0)
            .collect();

        let control_timestep = env.control_timestep().ok_or_else(|| {
            EnvkitError::InvalidConfig(
                "ActionSmootherWrapper needs a control timestep; \
                 the inner chain exposes none"
                    .into(),
            )
        })?;
        let sampling_rate = 1.0 / control_timestep;

        let lowcut = expand(&config.lowcut, FILTER_LOWCUT, dim, "lowcut")?;
        let highcut = expand(&config.highcut, FILTER_HIGHCUT, dim, "highcut")?;
        let mut filter = ButterworthFilter::design(&lowcut, &highcut, sampling_rate, config.order)?;
        filter.seed_history(&default_action);
        info!(
            "ActionSmootherWrapper: dim={}, order={}, sampling_rate={} Hz",
            dim, config.order, sampling_rate
        );
        Ok(Self {
            env,
            filter,
            default_action,
            shape: spec.shape().to_vec(),
            dtype: spec.dtype(),
        })
    }
}

impl ActionSmootherWrapper<BoxedEnvironment> {
    /// A constructor usable with [`crate::wrap_all`].
    pub fn ctor(config: ActionSmootherConfig) -> WrapperCtor {
        Box::new(move |env| Ok(Box::new(Self::new(env, config)?) as BoxedEnvironment))
    }
}

fn expand(value: &Option<Vec<f64>>, default: f64, dim: usize, name: &str) -> Result<Vec<f64>> {
    match value {
        None => Ok(vec![default; dim]),
        Some(v) if v.len() == 1 => Ok(vec![v[0]; dim]),
        Some(v) if v.len() == dim => Ok(v.clone()),
        Some(v) => Err(EnvkitError::InvalidConfig(format!(
            "{} must have one entry or {} entries, got {:?}",
            name, dim, v
        ))
        .into()),
    }
}

impl<E: Environment> Environment for ActionSmootherWrapper<E> {
    fn reset(&mut self) -> Result<TimeStep> {
        self.filter.reset();
        self.filter.seed_history(&self.default_action);
        self.env.reset()
    }

    fn step(&mut self, action: &ValueTree) -> Result<TimeStep> {
        let leaf = action.as_leaf().ok_or_else(|| EnvkitError::StructureMismatch {
            path: "".into(),
            expected: "a leaf action".into(),
            got: "a dict".into(),
        })?;
        let x: Vec<f64> = leaf.to_f64().iter().cloned().collect();
        if x.len() != self.filter.dim() {
            return Err(EnvkitError::ValidationFailed {
                path: "".into(),
                reason: format!(
                    "expected an action of {} elements, got {}",
                    self.filter.dim(),
                    x.len()
                ),
            }
            .into());
        }
        let y = self.filter.apply(&x);
        trace!("smoothed action {:?} -> {:?}", x, y);
        let smoothed = Array::from_f64(
            self.dtype,
            ArrayD::from_shape_vec(IxDyn(&self.shape), y).unwrap(),
        );
        self.env.step(&ValueTree::Leaf(smoothed))
    }

    fn action_spec(&self) -> SpecTree {
        self.env.action_spec()
    }

    fn observation_spec(&self) -> SpecTree {
        self.env.observation_spec()
    }

    fn reward_spec(&self) -> ArraySpec {
        self.env.reward_spec()
    }

    fn discount_spec(&self) -> ArraySpec {
        self.env.discount_spec()
    }

    fn control_timestep(&self) -> Option<f64> {
        self.env.control_timestep()
    }

    fn random_state(&mut self) -> Option<&mut StdRng> {
        self.env.random_state()
    }
}
