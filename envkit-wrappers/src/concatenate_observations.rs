//! Flattening of a structured observation into a single array.
use crate::base::{BoxedEnvironment, WrapperCtor};
use anyhow::Result;
use envkit_core::error::EnvkitError;
use envkit_core::{Array, ArraySpec, Dtype, Environment, SpecTree, TimeStep, ValueTree};
use log::info;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration of [`ConcatObservationWrapper`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConcatObservationConfig {
    /// Top-level observation keys to include, in this order. `None` takes
    /// every leaf in lexicographic path order.
    pub keys: Option<Vec<String>>,
}

impl ConcatObservationConfig {
    /// Restricts concatenation to the given top-level keys, in order.
    pub fn keys(mut self, keys: Vec<String>) -> Self {
        self.keys = Some(keys);
        self
    }
}

/// Merges a structured observation into one flat 1-D array.
///
/// Leaves are reshaped to 1-D row-major and concatenated in a fixed order;
/// the advertised spec is a single leaf whose length is the sum of the leaf
/// element counts and whose dtype is the promoted dtype across leaves.
/// Wrapping an already-flat observation is rejected at construction.
pub struct ConcatObservationWrapper<E> {
    env: E,
    paths: Vec<String>,
    spec: ArraySpec,
}

impl<E: Environment> ConcatObservationWrapper<E> {
    /// Wraps `env`, deriving the flat observation spec.
    pub fn new(env: E, config: ConcatObservationConfig) -> Result<Self> {
        let inner_spec = env.observation_spec();
        if !inner_spec.is_dict() {
            return Err(EnvkitError::IncompatibleSpec(
                "ConcatObservationWrapper requires a structured observation; \
                 the inner observation spec is already flat"
                    .into(),
            )
            .into());
        }
        let ordered = ordered_leaves(&inner_spec, &config.keys)?;
        let mut dtype: Option<Dtype> = None;
        let mut total = 0usize;
        for (path, leaf) in &ordered {
            total += leaf.num_elements();
            dtype = Some(match dtype {
                None => leaf.dtype(),
                Some(d) => Dtype::promote(d, leaf.dtype()).map_err(|e| {
                    EnvkitError::IncompatibleSpec(format!(
                        "observation leaf `{}` breaks dtype promotion: {}",
                        path, e
                    ))
                })?,
            });
        }
        let dtype = dtype.ok_or_else(|| {
            EnvkitError::IncompatibleSpec("observation spec has no leaves to concatenate".into())
        })?;
        let paths: Vec<String> = ordered.into_iter().map(|(p, _)| p).collect();
        info!(
            "ConcatObservationWrapper: {} leaves, {} elements, dtype {:?}",
            paths.len(),
            total,
            dtype
        );
        Ok(Self {
            env,
            paths,
            spec: ArraySpec::new(vec![total], dtype),
        })
    }

    fn flatten(&self, observation: &ValueTree) -> Result<ValueTree> {
        let by_path: BTreeMap<String, &Array> = observation.leaves().into_iter().collect();
        let mut parts: Vec<&Array> = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            let arr = by_path
                .get(path)
                .copied()
                .ok_or_else(|| EnvkitError::StructureMismatch {
                    path: path.clone(),
                    expected: "an observation leaf".into(),
                    got: "missing key".into(),
                })?;
            parts.push(arr);
        }
        Ok(ValueTree::Leaf(Array::concat_flat(&parts, self.spec.dtype())))
    }
}

impl ConcatObservationWrapper<BoxedEnvironment> {
    /// A constructor usable with [`crate::wrap_all`].
    pub fn ctor(config: ConcatObservationConfig) -> WrapperCtor {
        Box::new(move |env| Ok(Box::new(Self::new(env, config)?) as BoxedEnvironment))
    }
}

fn ordered_leaves<'a>(
    spec: &'a SpecTree,
    keys: &Option<Vec<String>>,
) -> Result<Vec<(String, &'a ArraySpec)>> {
    match keys {
        None => Ok(spec.leaves()),
        Some(keys) => {
            let subtrees = match spec {
                SpecTree::Dict(map) => map,
                SpecTree::Leaf(_) => unreachable!("checked by the caller"),
            };
            let mut out = Vec::new();
            for key in keys {
                let sub = subtrees.get(key).ok_or_else(|| {
                    EnvkitError::InvalidConfig(format!(
                        "observation key `{}` not found in the inner spec",
                        key
                    ))
                })?;
                for (path, leaf) in sub.leaves() {
                    let full = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{}/{}", key, path)
                    };
                    out.push((full, leaf));
                }
            }
            Ok(out)
        }
    }
}

impl<E: Environment> Environment for ConcatObservationWrapper<E> {
    fn reset(&mut self) -> Result<TimeStep> {
        let ts = self.env.reset()?;
        let observation = self.flatten(&ts.observation)?;
        Ok(ts.with_observation(observation))
    }

    fn step(&mut self, action: &ValueTree) -> Result<TimeStep> {
        let ts = self.env.step(action)?;
        let observation = self.flatten(&ts.observation)?;
        Ok(ts.with_observation(observation))
    }

    fn action_spec(&self) -> SpecTree {
        self.env.action_spec()
    }

    fn observation_spec(&self) -> SpecTree {
        SpecTree::Leaf(self.spec.clone())
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
