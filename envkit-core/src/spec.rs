//! Descriptions of array-valued action/observation/reward channels.
use crate::error::EnvkitError;
use crate::value::{Array, ValueTree};
use anyhow::Result;
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Numeric type tag of a [`Array`] leaf.
///
/// [`Array`]: crate::value::Array
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dtype {
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
}

impl Dtype {
    /// `true` for the float dtypes.
    pub fn is_float(&self) -> bool {
        matches!(self, Dtype::F32 | Dtype::F64)
    }

    /// Common dtype of two leaves being merged into one array.
    ///
    /// Widening within the float family and within the integer family is
    /// allowed; mixing integers and floats is rejected.
    pub fn promote(a: Dtype, b: Dtype) -> Result<Dtype> {
        if a == b {
            return Ok(a);
        }
        match (a.is_float(), b.is_float()) {
            (true, true) => Ok(Dtype::F64),
            (false, false) => Ok(Dtype::I64),
            _ => Err(EnvkitError::IncompatibleSpec(format!(
                "cannot promote {:?} and {:?} to a common dtype",
                a, b
            ))
            .into()),
        }
    }
}

/// Describes one array-valued channel: shape, dtype and optional bounds or
/// discrete cardinality.
///
/// Immutable for the lifetime of a wrapped chain; wrappers derive new specs
/// from inner ones at construction time.
#[derive(Clone, Debug, PartialEq)]
pub struct ArraySpec {
    shape: Vec<usize>,
    dtype: Dtype,
    minimum: Option<ArrayD<f64>>,
    maximum: Option<ArrayD<f64>>,
    num_values: Option<usize>,
}

impl ArraySpec {
    /// An unbounded continuous spec.
    pub fn new(shape: Vec<usize>, dtype: Dtype) -> Self {
        Self {
            shape,
            dtype,
            minimum: None,
            maximum: None,
            num_values: None,
        }
    }

    /// A bounded spec with scalar bounds broadcast over the whole shape.
    pub fn bounded(shape: Vec<usize>, dtype: Dtype, minimum: f64, maximum: f64) -> Result<Self> {
        let min = ArrayD::from_elem(IxDyn(&shape), minimum);
        let max = ArrayD::from_elem(IxDyn(&shape), maximum);
        Self::bounded_elementwise(shape, dtype, min, max)
    }

    /// A bounded spec with elementwise bounds of the same shape.
    pub fn bounded_elementwise(
        shape: Vec<usize>,
        dtype: Dtype,
        minimum: ArrayD<f64>,
        maximum: ArrayD<f64>,
    ) -> Result<Self> {
        let minimum = broadcast_bound(&shape, minimum, "minimum")?;
        let maximum = broadcast_bound(&shape, maximum, "maximum")?;
        if minimum.iter().zip(maximum.iter()).any(|(lo, hi)| lo > hi) {
            return Err(EnvkitError::InvalidConfig(format!(
                "minimum must be <= maximum elementwise, got minimum={:?} maximum={:?}",
                minimum, maximum
            ))
            .into());
        }
        Ok(Self {
            shape,
            dtype,
            minimum: Some(minimum),
            maximum: Some(maximum),
            num_values: None,
        })
    }

    /// A scalar discrete spec with values `0..num_values`.
    pub fn discrete(num_values: usize, dtype: Dtype) -> Result<Self> {
        if num_values == 0 {
            return Err(
                EnvkitError::InvalidConfig("num_values must be positive, got 0".into()).into(),
            );
        }
        if dtype.is_float() {
            return Err(EnvkitError::InvalidConfig(format!(
                "discrete specs require an integer dtype, got {:?}",
                dtype
            ))
            .into());
        }
        let shape: Vec<usize> = vec![];
        Ok(Self {
            minimum: Some(ArrayD::from_elem(IxDyn(&shape), 0.0)),
            maximum: Some(ArrayD::from_elem(IxDyn(&shape), (num_values - 1) as f64)),
            shape,
            dtype,
            num_values: Some(num_values),
        })
    }

    /// Shape of the described array.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Dtype of the described array.
    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    /// Elementwise lower bound, if any.
    pub fn minimum(&self) -> Option<&ArrayD<f64>> {
        self.minimum.as_ref()
    }

    /// Elementwise upper bound, if any.
    pub fn maximum(&self) -> Option<&ArrayD<f64>> {
        self.maximum.as_ref()
    }

    /// Discrete cardinality, if this spec is discrete.
    pub fn num_values(&self) -> Option<usize> {
        self.num_values
    }

    /// `true` if this spec enumerates a finite set of integer values.
    pub fn is_discrete(&self) -> bool {
        self.num_values.is_some()
    }

    /// `true` if both bounds are present.
    pub fn is_bounded(&self) -> bool {
        self.minimum.is_some() && self.maximum.is_some()
    }

    /// `true` if both bounds are present and finite everywhere.
    pub fn has_finite_bounds(&self) -> bool {
        match (&self.minimum, &self.maximum) {
            (Some(lo), Some(hi)) => {
                lo.iter().all(|v| v.is_finite()) && hi.iter().all(|v| v.is_finite())
            }
            _ => false,
        }
    }

    /// Number of elements of the described array (1 for scalars).
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product::<usize>().max(1)
    }

    /// Derives a spec with the same shape/dtype and new scalar bounds.
    pub fn with_bounds(&self, minimum: f64, maximum: f64) -> Result<Self> {
        Self::bounded(self.shape.clone(), self.dtype, minimum, maximum)
    }

    /// Derives a spec with a new shape, keeping dtype and dropping bounds.
    pub fn with_shape(&self, shape: Vec<usize>) -> Self {
        Self::new(shape, self.dtype)
    }

    /// Derives a spec with a new dtype, keeping shape and bounds.
    pub fn with_dtype(&self, dtype: Dtype) -> Self {
        Self {
            shape: self.shape.clone(),
            dtype,
            minimum: self.minimum.clone(),
            maximum: self.maximum.clone(),
            num_values: self.num_values,
        }
    }

    /// Checks a value against this spec: shape, dtype and bounds.
    pub fn validate(&self, path: &str, value: &Array) -> Result<()> {
        if value.shape() != self.shape.as_slice() {
            return Err(EnvkitError::ValidationFailed {
                path: path.into(),
                reason: format!("expected shape {:?}, got {:?}", self.shape, value.shape()),
            }
            .into());
        }
        if value.dtype() != self.dtype {
            return Err(EnvkitError::ValidationFailed {
                path: path.into(),
                reason: format!("expected dtype {:?}, got {:?}", self.dtype, value.dtype()),
            }
            .into());
        }
        if let (Some(lo), Some(hi)) = (&self.minimum, &self.maximum) {
            let v = value.to_f64();
            for ((x, lo), hi) in v.iter().zip(lo.iter()).zip(hi.iter()) {
                if x < lo || x > hi {
                    return Err(EnvkitError::ValidationFailed {
                        path: path.into(),
                        reason: format!("value {} outside bounds [{}, {}]", x, lo, hi),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// A conforming value: the lower bound if bounded, zeros otherwise.
    pub fn generate_value(&self) -> Array {
        match &self.minimum {
            Some(lo) => Array::from_f64(self.dtype, lo.clone()),
            None => Array::zeros(self.shape.clone(), self.dtype),
        }
    }
}

fn broadcast_bound(shape: &[usize], bound: ArrayD<f64>, name: &str) -> Result<ArrayD<f64>> {
    if bound.shape() == shape {
        return Ok(bound);
    }
    if bound.len() == 1 {
        let v = *bound.iter().next().unwrap();
        return Ok(ArrayD::from_elem(IxDyn(shape), v));
    }
    Err(EnvkitError::InvalidConfig(format!(
        "{} has shape {:?}, not broadcastable to {:?}",
        name,
        bound.shape(),
        shape
    ))
    .into())
}

/// A possibly nested spec: a leaf, or a mapping of unique keys to subtrees.
#[derive(Clone, Debug, PartialEq)]
pub enum SpecTree {
    /// A single array-valued channel.
    Leaf(ArraySpec),
    /// Named sub-specs, e.g. one per observation channel.
    Dict(BTreeMap<String, SpecTree>),
}

impl SpecTree {
    /// Builds a `Dict` node from `(key, subtree)` pairs.
    pub fn dict(entries: Vec<(&str, SpecTree)>) -> Self {
        SpecTree::Dict(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    /// The contained spec if this is a leaf.
    pub fn as_leaf(&self) -> Option<&ArraySpec> {
        match self {
            SpecTree::Leaf(s) => Some(s),
            SpecTree::Dict(_) => None,
        }
    }

    /// `true` if this is a `Dict` node.
    pub fn is_dict(&self) -> bool {
        matches!(self, SpecTree::Dict(_))
    }

    /// The subtree at a slash-joined path; `""` addresses the root.
    pub fn get(&self, path: &str) -> Option<&SpecTree> {
        if path.is_empty() {
            return Some(self);
        }
        let mut node = self;
        for key in path.split('/') {
            match node {
                SpecTree::Dict(map) => node = map.get(key)?,
                SpecTree::Leaf(_) => return None,
            }
        }
        Some(node)
    }

    /// All leaves with their slash-joined paths, in lexicographic path order.
    pub fn leaves(&self) -> Vec<(String, &ArraySpec)> {
        let mut out = Vec::new();
        self.collect_leaves("", &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a ArraySpec)>) {
        match self {
            SpecTree::Leaf(s) => out.push((prefix.to_string(), s)),
            SpecTree::Dict(map) => {
                for (k, v) in map {
                    let path = join_path(prefix, k);
                    v.collect_leaves(&path, out);
                }
            }
        }
    }

    /// Rebuilds the tree, transforming every leaf.
    pub fn map_leaves<F>(&self, f: &F) -> Result<SpecTree>
    where
        F: Fn(&str, &ArraySpec) -> Result<ArraySpec>,
    {
        self.map_leaves_at("", f)
    }

    fn map_leaves_at<F>(&self, prefix: &str, f: &F) -> Result<SpecTree>
    where
        F: Fn(&str, &ArraySpec) -> Result<ArraySpec>,
    {
        match self {
            SpecTree::Leaf(s) => Ok(SpecTree::Leaf(f(prefix, s)?)),
            SpecTree::Dict(map) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    let path = join_path(prefix, k);
                    out.insert(k.clone(), v.map_leaves_at(&path, f)?);
                }
                Ok(SpecTree::Dict(out))
            }
        }
    }

    /// Validates a value tree against this spec tree, leaf by leaf.
    ///
    /// Rejects structure mismatches at the point of mismatch.
    pub fn validate(&self, value: &ValueTree) -> Result<()> {
        self.validate_at("", value)
    }

    fn validate_at(&self, prefix: &str, value: &ValueTree) -> Result<()> {
        match (self, value) {
            (SpecTree::Leaf(spec), ValueTree::Leaf(arr)) => spec.validate(prefix, arr),
            (SpecTree::Dict(specs), ValueTree::Dict(values)) => {
                for (k, spec) in specs {
                    let path = join_path(prefix, k);
                    match values.get(k) {
                        Some(v) => spec.validate_at(&path, v)?,
                        None => {
                            return Err(EnvkitError::StructureMismatch {
                                path,
                                expected: "a value".into(),
                                got: "missing key".into(),
                            }
                            .into())
                        }
                    }
                }
                for k in values.keys() {
                    if !specs.contains_key(k) {
                        return Err(EnvkitError::StructureMismatch {
                            path: join_path(prefix, k),
                            expected: "no key".into(),
                            got: "an extra value".into(),
                        }
                        .into());
                    }
                }
                Ok(())
            }
            (SpecTree::Leaf(_), ValueTree::Dict(_)) => Err(EnvkitError::StructureMismatch {
                path: prefix.to_string(),
                expected: "a leaf".into(),
                got: "a dict".into(),
            }
            .into()),
            (SpecTree::Dict(_), ValueTree::Leaf(_)) => Err(EnvkitError::StructureMismatch {
                path: prefix.to_string(),
                expected: "a dict".into(),
                got: "a leaf".into(),
            }
            .into()),
        }
    }
}

pub(crate) fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", prefix, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_must_be_ordered() {
        assert!(ArraySpec::bounded(vec![2], Dtype::F64, 1.0, -1.0).is_err());
        assert!(ArraySpec::bounded(vec![2], Dtype::F64, -1.0, 1.0).is_ok());
    }

    #[test]
    fn test_discrete_implies_bounds() {
        let spec = ArraySpec::discrete(3, Dtype::I64).unwrap();
        assert!(spec.is_discrete());
        assert_eq!(spec.minimum().unwrap().iter().next(), Some(&0.0));
        assert_eq!(spec.maximum().unwrap().iter().next(), Some(&2.0));
        assert!(ArraySpec::discrete(0, Dtype::I64).is_err());
        assert!(ArraySpec::discrete(3, Dtype::F32).is_err());
    }

    #[test]
    fn test_promote() {
        assert_eq!(Dtype::promote(Dtype::F32, Dtype::F64).unwrap(), Dtype::F64);
        assert_eq!(Dtype::promote(Dtype::I32, Dtype::I64).unwrap(), Dtype::I64);
        assert_eq!(Dtype::promote(Dtype::F32, Dtype::F32).unwrap(), Dtype::F32);
        assert!(Dtype::promote(Dtype::I64, Dtype::F32).is_err());
    }

    #[test]
    fn test_leaves_are_lexicographic() {
        let tree = SpecTree::dict(vec![
            ("b", SpecTree::Leaf(ArraySpec::new(vec![2], Dtype::F64))),
            (
                "a",
                SpecTree::dict(vec![(
                    "z",
                    SpecTree::Leaf(ArraySpec::new(vec![], Dtype::F64)),
                )]),
            ),
        ]);
        let keys: Vec<_> = tree.leaves().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a/z".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_get_by_path() {
        let tree = SpecTree::dict(vec![(
            "a",
            SpecTree::dict(vec![(
                "z",
                SpecTree::Leaf(ArraySpec::new(vec![], Dtype::F64)),
            )]),
        )]);
        assert!(tree.get("").is_some());
        assert!(tree.get("a").map(|t| t.is_dict()).unwrap_or(false));
        assert!(tree.get("a/z").and_then(|t| t.as_leaf()).is_some());
        assert!(tree.get("a/missing").is_none());
        assert!(tree.get("a/z/deeper").is_none());
    }

    #[test]
    fn test_validate_reports_path() {
        let spec = SpecTree::dict(vec![(
            "pos",
            SpecTree::Leaf(ArraySpec::bounded(vec![1], Dtype::F64, 0.0, 1.0).unwrap()),
        )]);
        let value = ValueTree::dict(vec![("pos", ValueTree::leaf_f64(vec![1], vec![2.0]))]);
        let err = spec.validate(&value).unwrap_err();
        assert!(format!("{}", err).contains("pos"));
    }
}
