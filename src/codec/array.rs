use std::any::Any;
use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayD, ArrayViewD, IxDyn};
use serde_json::{Number, Value};

use crate::error::{HandlerResult, InferenceError};

/// Element type an array can be cast to after decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    Int,
    Float,
    Bool,
    Text,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Int => write!(f, "int"),
            DType::Float => write!(f, "float"),
            DType::Bool => write!(f, "bool"),
            DType::Text => write!(f, "str"),
        }
    }
}

/// Canonical in-memory value moved between decoders, handlers and encoders.
///
/// Rectangular data lives in one of the typed n-dimensional variants. Anything that is
/// not rectangular (ragged lists, maps, nulls) is kept as an `Object` document.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayLike {
    Int(ArrayD<i64>),
    Float(ArrayD<f64>),
    Bool(ArrayD<bool>),
    Text(ArrayD<String>),
    Object(Value),
    Sparse(SparseMatrix),
    Opaque(OpaqueValue),
}

impl ArrayLike {
    /// Builds an array from a JSON document, inferring shape and element type.
    ///
    /// Nested lists of equal length become an n-dimensional array. Numbers become `Int`
    /// when every element is integral, `Float` otherwise. Mixing strings with other
    /// scalars yields `Text`. An empty list is a float array of shape `(0,)`.
    pub fn from_value(value: Value) -> ArrayLike {
        let Some(shape) = infer_shape(&value) else {
            return ArrayLike::Object(value);
        };
        let mut leaves = Vec::new();
        collect_leaves(&value, &mut leaves);
        let shape = IxDyn(&shape);

        let array = if leaves.is_empty() {
            ArrayD::from_shape_vec(shape, Vec::<f64>::new()).map(ArrayLike::Float)
        } else if leaves.iter().all(|v| v.is_boolean()) {
            let data = leaves.iter().map(|v| v.as_bool().unwrap_or_default()).collect();
            ArrayD::from_shape_vec(shape, data).map(ArrayLike::Bool)
        } else if leaves.iter().any(|v| v.is_string()) {
            let data = leaves.iter().map(|v| scalar_to_text(v)).collect();
            ArrayD::from_shape_vec(shape, data).map(ArrayLike::Text)
        } else if leaves.iter().all(|v| v.is_i64() || v.is_boolean()) {
            let data = leaves
                .iter()
                .map(|v| {
                    v.as_i64()
                        .unwrap_or_else(|| v.as_bool().map(i64::from).unwrap_or_default())
                })
                .collect();
            ArrayD::from_shape_vec(shape, data).map(ArrayLike::Int)
        } else {
            let data = leaves.iter().map(|v| scalar_to_f64(v)).collect();
            ArrayD::from_shape_vec(shape, data).map(ArrayLike::Float)
        };

        // Shape and leaf count always agree, the fallback only keeps this total.
        array.unwrap_or(ArrayLike::Object(value))
    }

    /// Converts the value into a JSON document, turning arrays into nested lists.
    pub fn to_value(&self) -> HandlerResult<Value> {
        match self {
            ArrayLike::Int(a) => Ok(nest(a.view(), &|v: &i64| Value::from(*v))),
            ArrayLike::Float(a) => Ok(nest(a.view(), &|v: &f64| float_value(*v))),
            ArrayLike::Bool(a) => Ok(nest(a.view(), &|v: &bool| Value::Bool(*v))),
            ArrayLike::Text(a) => Ok(nest(a.view(), &|v: &String| Value::String(v.clone()))),
            ArrayLike::Object(value) => Ok(value.clone()),
            ArrayLike::Sparse(_) | ArrayLike::Opaque(_) => Err(InferenceError::type_error(
                format!("Object of type {} is not JSON serializable", self.type_name()),
            )),
        }
    }

    pub fn dtype(&self) -> Option<DType> {
        match self {
            ArrayLike::Int(_) => Some(DType::Int),
            ArrayLike::Float(_) => Some(DType::Float),
            ArrayLike::Bool(_) => Some(DType::Bool),
            ArrayLike::Text(_) => Some(DType::Text),
            _ => None,
        }
    }

    /// Shape of a typed array, `None` for documents, sparse matrices and opaque values.
    pub fn shape(&self) -> Option<&[usize]> {
        match self {
            ArrayLike::Int(a) => Some(a.shape()),
            ArrayLike::Float(a) => Some(a.shape()),
            ArrayLike::Bool(a) => Some(a.shape()),
            ArrayLike::Text(a) => Some(a.shape()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayLike::Int(a) => a.len(),
            ArrayLike::Float(a) => a.len(),
            ArrayLike::Bool(a) => a.len(),
            ArrayLike::Text(a) => a.len(),
            ArrayLike::Object(Value::Array(items)) => items.len(),
            ArrayLike::Object(Value::Object(map)) => map.len(),
            ArrayLike::Object(_) => 1,
            ArrayLike::Sparse(m) => m.shape.0.saturating_mul(m.shape.1),
            ArrayLike::Opaque(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &str {
        match self {
            ArrayLike::Int(_) => "int array",
            ArrayLike::Float(_) => "float array",
            ArrayLike::Bool(_) => "bool array",
            ArrayLike::Text(_) => "str array",
            ArrayLike::Object(_) => "object",
            ArrayLike::Sparse(_) => "sparse matrix",
            ArrayLike::Opaque(o) => o.type_name(),
        }
    }

    pub fn cast(self, dtype: DType) -> HandlerResult<ArrayLike> {
        match (self, dtype) {
            (ArrayLike::Int(a), DType::Int) => Ok(ArrayLike::Int(a)),
            (ArrayLike::Int(a), DType::Float) => Ok(ArrayLike::Float(a.mapv(|v| v as f64))),
            (ArrayLike::Int(a), DType::Bool) => Ok(ArrayLike::Bool(a.mapv(|v| v != 0))),
            (ArrayLike::Int(a), DType::Text) => Ok(ArrayLike::Text(a.mapv(|v| v.to_string()))),

            (ArrayLike::Float(a), DType::Int) => Ok(ArrayLike::Int(a.mapv(|v| v as i64))),
            (ArrayLike::Float(a), DType::Float) => Ok(ArrayLike::Float(a)),
            (ArrayLike::Float(a), DType::Bool) => Ok(ArrayLike::Bool(a.mapv(|v| v != 0.0))),
            (ArrayLike::Float(a), DType::Text) => Ok(ArrayLike::Text(a.mapv(format_float))),

            (ArrayLike::Bool(a), DType::Int) => Ok(ArrayLike::Int(a.mapv(i64::from))),
            (ArrayLike::Bool(a), DType::Float) => {
                Ok(ArrayLike::Float(a.mapv(|v| if v { 1.0 } else { 0.0 })))
            }
            (ArrayLike::Bool(a), DType::Bool) => Ok(ArrayLike::Bool(a)),
            (ArrayLike::Bool(a), DType::Text) => Ok(ArrayLike::Text(a.mapv(format_bool))),

            (ArrayLike::Text(a), DType::Int) => try_map(&a, parse_int).map(ArrayLike::Int),
            (ArrayLike::Text(a), DType::Float) => try_map(&a, parse_float).map(ArrayLike::Float),
            (ArrayLike::Text(a), DType::Bool) => try_map(&a, parse_bool).map(ArrayLike::Bool),
            (ArrayLike::Text(a), DType::Text) => Ok(ArrayLike::Text(a)),

            (ArrayLike::Object(value), dtype) => match ArrayLike::from_value(value) {
                ArrayLike::Object(_) => Err(InferenceError::type_error(format!(
                    "Cannot cast a non-rectangular object to {dtype}"
                ))),
                array => array.cast(dtype),
            },
            (ArrayLike::Sparse(matrix), dtype) => matrix.to_dense()?.cast(dtype),
            (other @ ArrayLike::Opaque(_), dtype) => Err(InferenceError::type_error(format!(
                "Cannot cast {} to {dtype}",
                other.type_name()
            ))),
        }
    }
}

impl From<ArrayD<i64>> for ArrayLike {
    fn from(array: ArrayD<i64>) -> Self {
        ArrayLike::Int(array)
    }
}

impl From<ArrayD<f64>> for ArrayLike {
    fn from(array: ArrayD<f64>) -> Self {
        ArrayLike::Float(array)
    }
}

impl From<ArrayD<bool>> for ArrayLike {
    fn from(array: ArrayD<bool>) -> Self {
        ArrayLike::Bool(array)
    }
}

impl From<ArrayD<String>> for ArrayLike {
    fn from(array: ArrayD<String>) -> Self {
        ArrayLike::Text(array)
    }
}

impl From<Vec<i64>> for ArrayLike {
    fn from(values: Vec<i64>) -> Self {
        ArrayLike::Int(Array1::from_vec(values).into_dyn())
    }
}

impl From<Vec<f64>> for ArrayLike {
    fn from(values: Vec<f64>) -> Self {
        ArrayLike::Float(Array1::from_vec(values).into_dyn())
    }
}

impl From<Vec<bool>> for ArrayLike {
    fn from(values: Vec<bool>) -> Self {
        ArrayLike::Bool(Array1::from_vec(values).into_dyn())
    }
}

impl From<Vec<String>> for ArrayLike {
    fn from(values: Vec<String>) -> Self {
        ArrayLike::Text(Array1::from_vec(values).into_dyn())
    }
}

impl From<Vec<&str>> for ArrayLike {
    fn from(values: Vec<&str>) -> Self {
        values
            .into_iter()
            .map(str::to_owned)
            .collect::<Vec<_>>()
            .into()
    }
}

impl From<Value> for ArrayLike {
    fn from(value: Value) -> Self {
        ArrayLike::from_value(value)
    }
}

impl From<SparseMatrix> for ArrayLike {
    fn from(matrix: SparseMatrix) -> Self {
        ArrayLike::Sparse(matrix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SparseFormat {
    Csr,
    Csc,
    Coo,
}

impl SparseFormat {
    pub fn parse(name: &str) -> Option<SparseFormat> {
        match name.trim().to_ascii_lowercase().as_str() {
            "csr" => Some(SparseFormat::Csr),
            "csc" => Some(SparseFormat::Csc),
            "coo" => Some(SparseFormat::Coo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SparseValues {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Bool(Vec<bool>),
}

impl SparseValues {
    pub fn len(&self) -> usize {
        match self {
            SparseValues::Int(v) => v.len(),
            SparseValues::Float(v) => v.len(),
            SparseValues::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Largest number of cells [`SparseMatrix::to_dense`] will allocate.
pub const MAX_DENSE_ELEMENTS: usize = 1 << 28;

/// Two-dimensional sparse matrix stored as coordinate triplets.
///
/// `format` records the layout the matrix was serialized in; the triplets are always
/// expanded so `rows[i], cols[i]` addresses `values[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    pub format: SparseFormat,
    pub shape: (usize, usize),
    pub rows: Vec<usize>,
    pub cols: Vec<usize>,
    pub values: SparseValues,
}

impl SparseMatrix {
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Checks that every stored value has in-bounds coordinates. Allocates nothing.
    pub fn validate(&self) -> HandlerResult<()> {
        let (n_rows, n_cols) = self.shape;
        if self.rows.len() != self.values.len() || self.cols.len() != self.values.len() {
            return Err(InferenceError::codec(format!(
                "Sparse matrix has {} values but {} row and {} column indices",
                self.values.len(),
                self.rows.len(),
                self.cols.len()
            )));
        }
        for (&r, &c) in self.rows.iter().zip(&self.cols) {
            if r >= n_rows || c >= n_cols {
                return Err(InferenceError::codec(format!(
                    "Sparse index ({r}, {c}) is outside a {n_rows}x{n_cols} matrix"
                )));
            }
        }
        Ok(())
    }

    /// Dense copy of the matrix. Duplicate coordinates are summed.
    ///
    /// Fails for matrices with more than [`MAX_DENSE_ELEMENTS`] cells.
    pub fn to_dense(&self) -> HandlerResult<ArrayLike> {
        self.validate()?;
        let (n_rows, n_cols) = self.shape;
        match n_rows.checked_mul(n_cols) {
            Some(cells) if cells <= MAX_DENSE_ELEMENTS => {}
            _ => {
                return Err(InferenceError::codec(format!(
                    "Sparse matrix of shape {n_rows}x{n_cols} is too large to densify"
                )))
            }
        }

        let shape = (n_rows, n_cols);
        let coords = self.rows.iter().zip(&self.cols);
        Ok(match &self.values {
            SparseValues::Int(values) => {
                let mut dense = Array2::<i64>::zeros(shape);
                for ((&r, &c), v) in coords.zip(values) {
                    dense[[r, c]] += v;
                }
                ArrayLike::Int(dense.into_dyn())
            }
            SparseValues::Float(values) => {
                let mut dense = Array2::<f64>::zeros(shape);
                for ((&r, &c), v) in coords.zip(values) {
                    dense[[r, c]] += v;
                }
                ArrayLike::Float(dense.into_dyn())
            }
            SparseValues::Bool(values) => {
                let mut dense = Array2::from_elem(shape, false);
                for ((&r, &c), v) in coords.zip(values) {
                    dense[[r, c]] |= v;
                }
                ArrayLike::Bool(dense.into_dyn())
            }
        })
    }
}

/// Arbitrary typed value an `input_fn` can hand to a `predict_fn`.
#[derive(Clone)]
pub struct OpaqueValue {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl OpaqueValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        OpaqueValue {
            type_name: std::any::type_name::<T>(),
            value: Arc::new(value),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OpaqueValue").field(&self.type_name).finish()
    }
}

impl PartialEq for OpaqueValue {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.value), Arc::as_ptr(&other.value))
    }
}

/// Float rendering shared by the text encoders: integral values keep a trailing `.0`.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        let sign = if value > 0.0 { "" } else { "-" };
        format!("{sign}inf")
    } else {
        format!("{value:?}")
    }
}

pub fn format_bool(value: bool) -> String {
    let text = if value { "True" } else { "False" };
    text.to_string()
}

fn float_value(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn infer_shape(value: &Value) -> Option<Vec<usize>> {
    match value {
        Value::Array(items) => {
            let mut inner: Option<Vec<usize>> = None;
            for item in items {
                let shape = infer_shape(item)?;
                match &inner {
                    None => inner = Some(shape),
                    Some(existing) if *existing == shape => {}
                    Some(_) => return None,
                }
            }
            let mut shape = vec![items.len()];
            shape.extend(inner.unwrap_or_default());
            Some(shape)
        }
        Value::Object(_) | Value::Null => None,
        _ => Some(vec![]),
    }
}

fn collect_leaves<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_leaves(item, out)),
        leaf => out.push(leaf),
    }
}

fn scalar_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => format_bool(*b),
        Value::Number(n) if n.is_f64() => format_float(n.as_f64().unwrap_or_default()),
        other => other.to_string(),
    }
}

fn scalar_to_f64(value: &Value) -> f64 {
    match value {
        Value::Bool(b) => f64::from(u8::from(*b)),
        other => other.as_f64().unwrap_or(f64::NAN),
    }
}

fn nest<T>(view: ArrayViewD<'_, T>, leaf: &dyn Fn(&T) -> Value) -> Value {
    if view.ndim() == 0 {
        return view.iter().next().map(leaf).unwrap_or(Value::Null);
    }
    Value::Array(view.outer_iter().map(|sub| nest(sub, leaf)).collect())
}

fn try_map<T, U>(array: &ArrayD<T>, f: fn(&T) -> HandlerResult<U>) -> HandlerResult<ArrayD<U>> {
    let data = array.iter().map(f).collect::<HandlerResult<Vec<U>>>()?;
    ArrayD::from_shape_vec(array.raw_dim(), data).map_err(|e| InferenceError::codec(e.to_string()))
}

fn parse_int(text: &String) -> HandlerResult<i64> {
    text.trim().parse::<i64>().map_err(|_| {
        InferenceError::codec(format!("invalid literal for int(): '{text}'"))
    })
}

fn parse_float(text: &String) -> HandlerResult<f64> {
    text.trim().parse::<f64>().map_err(|_| {
        InferenceError::codec(format!("could not convert string to float: '{text}'"))
    })
}

fn parse_bool(text: &String) -> HandlerResult<bool> {
    match text.trim() {
        "True" | "true" | "1" => Ok(true),
        "False" | "false" | "0" | "" => Ok(false),
        other => Err(InferenceError::codec(format!(
            "could not convert string to bool: '{other}'"
        ))),
    }
}
