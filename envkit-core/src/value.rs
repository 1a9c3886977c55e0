//! Dtype-tagged array values and structured (nested) values.
use crate::error::EnvkitError;
use crate::spec::{join_path, ArraySpec, Dtype, SpecTree};
use anyhow::Result;
use ndarray::{Axis, ArrayD, IxDyn};
use std::collections::BTreeMap;

/// One array value, tagged with its dtype.
#[derive(Clone, Debug, PartialEq)]
pub enum Array {
    /// 32-bit float array.
    F32(ArrayD<f32>),
    /// 64-bit float array.
    F64(ArrayD<f64>),
    /// 32-bit signed integer array.
    I32(ArrayD<i32>),
    /// 64-bit signed integer array.
    I64(ArrayD<i64>),
}

impl Array {
    /// Dtype tag of this array.
    pub fn dtype(&self) -> Dtype {
        match self {
            Array::F32(_) => Dtype::F32,
            Array::F64(_) => Dtype::F64,
            Array::I32(_) => Dtype::I32,
            Array::I64(_) => Dtype::I64,
        }
    }

    /// Shape of this array.
    pub fn shape(&self) -> &[usize] {
        match self {
            Array::F32(a) => a.shape(),
            Array::F64(a) => a.shape(),
            Array::I32(a) => a.shape(),
            Array::I64(a) => a.shape(),
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Array::F32(a) => a.len(),
            Array::F64(a) => a.len(),
            Array::I32(a) => a.len(),
            Array::I64(a) => a.len(),
        }
    }

    /// `true` if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A zero-filled array of the given shape and dtype.
    pub fn zeros(shape: Vec<usize>, dtype: Dtype) -> Array {
        let dim = IxDyn(&shape);
        match dtype {
            Dtype::F32 => Array::F32(ArrayD::zeros(dim)),
            Dtype::F64 => Array::F64(ArrayD::zeros(dim)),
            Dtype::I32 => Array::I32(ArrayD::zeros(dim)),
            Dtype::I64 => Array::I64(ArrayD::zeros(dim)),
        }
    }

    /// Copy of this array as `f64`.
    pub fn to_f64(&self) -> ArrayD<f64> {
        match self {
            Array::F32(a) => a.mapv(|v| v as f64),
            Array::F64(a) => a.clone(),
            Array::I32(a) => a.mapv(|v| v as f64),
            Array::I64(a) => a.mapv(|v| v as f64),
        }
    }

    /// Copy of this array as `i64` (floats truncate toward zero).
    pub fn to_i64(&self) -> ArrayD<i64> {
        match self {
            Array::F32(a) => a.mapv(|v| v as i64),
            Array::F64(a) => a.mapv(|v| v as i64),
            Array::I32(a) => a.mapv(|v| v as i64),
            Array::I64(a) => a.clone(),
        }
    }

    /// Builds an array of the given dtype from `f64` data.
    pub fn from_f64(dtype: Dtype, data: ArrayD<f64>) -> Array {
        match dtype {
            Dtype::F32 => Array::F32(data.mapv(|v| v as f32)),
            Dtype::F64 => Array::F64(data),
            Dtype::I32 => Array::I32(data.mapv(|v| v as i32)),
            Dtype::I64 => Array::I64(data.mapv(|v| v as i64)),
        }
    }

    /// Casts to another dtype.
    pub fn cast(&self, dtype: Dtype) -> Array {
        if self.dtype() == dtype {
            return self.clone();
        }
        match dtype {
            Dtype::I32 | Dtype::I64 => {
                let data = self.to_i64();
                match dtype {
                    Dtype::I32 => Array::I32(data.mapv(|v| v as i32)),
                    _ => Array::I64(data),
                }
            }
            _ => Array::from_f64(dtype, self.to_f64()),
        }
    }

    /// Reshapes to 1-D, preserving row-major element order.
    pub fn flatten(&self) -> Array {
        fn flat<T: Clone>(a: &ArrayD<T>) -> ArrayD<T> {
            let data: Vec<T> = a.iter().cloned().collect();
            ArrayD::from_shape_vec(IxDyn(&[data.len()]), data).unwrap()
        }
        match self {
            Array::F32(a) => Array::F32(flat(a)),
            Array::F64(a) => Array::F64(flat(a)),
            Array::I32(a) => Array::I32(flat(a)),
            Array::I64(a) => Array::I64(flat(a)),
        }
    }

    /// Concatenates flattened parts into one 1-D array of the given dtype.
    pub fn concat_flat(parts: &[&Array], dtype: Dtype) -> Array {
        if dtype.is_float() {
            let mut data: Vec<f64> = Vec::new();
            for p in parts {
                data.extend(p.to_f64().iter().cloned());
            }
            let n = data.len();
            Array::from_f64(dtype, ArrayD::from_shape_vec(IxDyn(&[n]), data).unwrap())
        } else {
            let mut data: Vec<i64> = Vec::new();
            for p in parts {
                data.extend(p.to_i64().iter().cloned());
            }
            let n = data.len();
            let arr = ArrayD::from_shape_vec(IxDyn(&[n]), data).unwrap();
            match dtype {
                Dtype::I32 => Array::I32(arr.mapv(|v| v as i32)),
                _ => Array::I64(arr),
            }
        }
    }

    /// Stacks equally shaped arrays of one dtype along a new leading axis.
    pub fn stack(parts: &[&Array]) -> Result<Array> {
        let first = parts.first().ok_or_else(|| {
            EnvkitError::InvalidConfig("cannot stack an empty list of arrays".into())
        })?;
        let dtype = first.dtype();
        let shape = first.shape();
        for p in parts.iter() {
            if p.dtype() != dtype || p.shape() != shape {
                return Err(EnvkitError::IncompatibleSpec(format!(
                    "stack requires uniform dtype/shape, got {:?}{:?} vs {:?}{:?}",
                    dtype,
                    shape,
                    p.dtype(),
                    p.shape()
                ))
                .into());
            }
        }
        fn stack_t<T: Clone>(arrays: Vec<&ArrayD<T>>) -> ArrayD<T> {
            let views: Vec<_> = arrays.iter().map(|a| a.view()).collect();
            ndarray::stack(Axis(0), &views).unwrap()
        }
        Ok(match dtype {
            Dtype::F32 => Array::F32(stack_t(
                parts
                    .iter()
                    .map(|p| match p {
                        Array::F32(a) => a,
                        _ => unreachable!(),
                    })
                    .collect(),
            )),
            Dtype::F64 => Array::F64(stack_t(
                parts
                    .iter()
                    .map(|p| match p {
                        Array::F64(a) => a,
                        _ => unreachable!(),
                    })
                    .collect(),
            )),
            Dtype::I32 => Array::I32(stack_t(
                parts
                    .iter()
                    .map(|p| match p {
                        Array::I32(a) => a,
                        _ => unreachable!(),
                    })
                    .collect(),
            )),
            Dtype::I64 => Array::I64(stack_t(
                parts
                    .iter()
                    .map(|p| match p {
                        Array::I64(a) => a,
                        _ => unreachable!(),
                    })
                    .collect(),
            )),
        })
    }
}

/// A possibly nested value mirroring a [`SpecTree`].
#[derive(Clone, Debug, PartialEq)]
pub enum ValueTree {
    /// A single array.
    Leaf(Array),
    /// Named sub-values.
    Dict(BTreeMap<String, ValueTree>),
}

impl ValueTree {
    /// Builds a `Dict` node from `(key, subtree)` pairs.
    pub fn dict(entries: Vec<(&str, ValueTree)>) -> Self {
        ValueTree::Dict(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    /// A leaf holding an `f64` array of the given shape.
    pub fn leaf_f64(shape: Vec<usize>, data: Vec<f64>) -> Self {
        ValueTree::Leaf(Array::F64(
            ArrayD::from_shape_vec(IxDyn(&shape), data).unwrap(),
        ))
    }

    /// A leaf holding a scalar `i64`, e.g. a discrete action.
    pub fn scalar_i64(v: i64) -> Self {
        ValueTree::Leaf(Array::I64(ArrayD::from_elem(IxDyn(&[]), v)))
    }

    /// The contained array if this is a leaf.
    pub fn as_leaf(&self) -> Option<&Array> {
        match self {
            ValueTree::Leaf(a) => Some(a),
            ValueTree::Dict(_) => None,
        }
    }

    /// All leaves with their slash-joined paths, in lexicographic path order.
    pub fn leaves(&self) -> Vec<(String, &Array)> {
        let mut out = Vec::new();
        self.collect_leaves("", &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a Array)>) {
        match self {
            ValueTree::Leaf(a) => out.push((prefix.to_string(), a)),
            ValueTree::Dict(map) => {
                for (k, v) in map {
                    let path = join_path(prefix, k);
                    v.collect_leaves(&path, out);
                }
            }
        }
    }

    /// Rebuilds the tree, transforming every leaf.
    pub fn map_leaves<F>(&self, f: &F) -> Result<ValueTree>
    where
        F: Fn(&str, &Array) -> Result<Array>,
    {
        self.map_leaves_at("", f)
    }

    fn map_leaves_at<F>(&self, prefix: &str, f: &F) -> Result<ValueTree>
    where
        F: Fn(&str, &Array) -> Result<Array>,
    {
        match self {
            ValueTree::Leaf(a) => Ok(ValueTree::Leaf(f(prefix, a)?)),
            ValueTree::Dict(map) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    let path = join_path(prefix, k);
                    out.insert(k.clone(), v.map_leaves_at(&path, f)?);
                }
                Ok(ValueTree::Dict(out))
            }
        }
    }

    /// Maps over corresponding leaves of this value and a spec tree.
    ///
    /// The two trees must share the same structure; a mismatch is rejected
    /// at the point of mismatch with its path.
    pub fn zip_map_spec<F>(&self, spec: &SpecTree, f: &F) -> Result<ValueTree>
    where
        F: Fn(&str, &Array, &ArraySpec) -> Result<Array>,
    {
        self.zip_map_spec_at("", spec, f)
    }

    fn zip_map_spec_at<F>(&self, prefix: &str, spec: &SpecTree, f: &F) -> Result<ValueTree>
    where
        F: Fn(&str, &Array, &ArraySpec) -> Result<Array>,
    {
        match (self, spec) {
            (ValueTree::Leaf(a), SpecTree::Leaf(s)) => Ok(ValueTree::Leaf(f(prefix, a, s)?)),
            (ValueTree::Dict(values), SpecTree::Dict(specs)) => {
                let mut out = BTreeMap::new();
                for (k, v) in values {
                    let path = join_path(prefix, k);
                    let s = specs.get(k).ok_or_else(|| EnvkitError::StructureMismatch {
                        path: path.clone(),
                        expected: "a spec".into(),
                        got: "no matching spec key".into(),
                    })?;
                    out.insert(k.clone(), v.zip_map_spec_at(&path, s, f)?);
                }
                Ok(ValueTree::Dict(out))
            }
            (ValueTree::Leaf(_), SpecTree::Dict(_)) => Err(EnvkitError::StructureMismatch {
                path: prefix.to_string(),
                expected: "a dict".into(),
                got: "a leaf".into(),
            }
            .into()),
            (ValueTree::Dict(_), SpecTree::Leaf(_)) => Err(EnvkitError::StructureMismatch {
                path: prefix.to_string(),
                expected: "a leaf".into(),
                got: "a dict".into(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_row_major() {
        let a = Array::F64(
            ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1.0, 2.0, 3.0, 4.0]).unwrap(),
        );
        let flat = a.flatten();
        assert_eq!(flat.shape(), &[4]);
        assert_eq!(flat.to_f64().iter().cloned().collect::<Vec<_>>(), vec![
            1.0, 2.0, 3.0, 4.0
        ]);
    }

    #[test]
    fn test_stack_adds_leading_axis() {
        let a = Array::F32(ArrayD::zeros(IxDyn(&[3])));
        let stacked = Array::stack(&[&a, &a]).unwrap();
        assert_eq!(stacked.shape(), &[2, 3]);
    }

    #[test]
    fn test_stack_rejects_mixed_dtypes() {
        let a = Array::F32(ArrayD::zeros(IxDyn(&[3])));
        let b = Array::F64(ArrayD::zeros(IxDyn(&[3])));
        assert!(Array::stack(&[&a, &b]).is_err());
    }

    #[test]
    fn test_zip_map_spec_rejects_mismatch() {
        let value = ValueTree::dict(vec![("a", ValueTree::leaf_f64(vec![1], vec![0.0]))]);
        let spec = SpecTree::dict(vec![(
            "b",
            SpecTree::Leaf(crate::spec::ArraySpec::new(vec![1], Dtype::F64)),
        )]);
        let err = value.zip_map_spec(&spec, &|_, a, _| Ok(a.clone())).unwrap_err();
        assert!(format!("{}", err).contains("a"));
    }
}
