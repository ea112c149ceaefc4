//! Sparse matrices saved as an `.npz` archive of `.npy` members.
//!
//! Decode only. The archive holds a `format` member naming the layout, the matrix
//! `shape`, the stored `data`, and either `indices`/`indptr` (csr, csc) or `row`/`col`
//! (coo).

use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::codec::array::{ArrayLike, SparseFormat, SparseMatrix, SparseValues};
use crate::codec::npy;
use crate::error::{HandlerResult, InferenceError};

type Archive<'a> = ZipArchive<Cursor<&'a [u8]>>;

pub fn decode(bytes: &[u8]) -> HandlerResult<ArrayLike> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| InferenceError::codec(format!("Payload is not an NPZ archive: {e}")))?;

    let format = match read_member(&mut archive, "format")? {
        ArrayLike::Text(names) => names.iter().next().cloned().unwrap_or_default(),
        other => {
            return Err(InferenceError::codec(format!(
                "Sparse format member must be a string, got {}",
                other.type_name()
            )))
        }
    };
    let format = SparseFormat::parse(&format).ok_or_else(|| {
        InferenceError::codec(format!("Unsupported sparse matrix format '{format}'"))
    })?;

    let shape = indices(read_member(&mut archive, "shape")?, "shape")?;
    let [n_rows, n_cols] = shape[..] else {
        return Err(InferenceError::codec(format!(
            "Sparse matrix shape must have two dimensions, got {}",
            shape.len()
        )));
    };

    let values = match read_member(&mut archive, "data")? {
        ArrayLike::Int(a) => SparseValues::Int(a.iter().copied().collect()),
        ArrayLike::Float(a) => SparseValues::Float(a.iter().copied().collect()),
        ArrayLike::Bool(a) => SparseValues::Bool(a.iter().copied().collect()),
        other => {
            return Err(InferenceError::codec(format!(
                "Sparse matrix data must be numeric, got {}",
                other.type_name()
            )))
        }
    };

    let (rows, cols) = match format {
        SparseFormat::Coo => (
            indices(read_member(&mut archive, "row")?, "row")?,
            indices(read_member(&mut archive, "col")?, "col")?,
        ),
        SparseFormat::Csr | SparseFormat::Csc => {
            let minor = indices(read_member(&mut archive, "indices")?, "indices")?;
            let indptr = indices(read_member(&mut archive, "indptr")?, "indptr")?;
            let major = expand_indptr(&indptr, minor.len())?;
            if format == SparseFormat::Csr {
                (major, minor)
            } else {
                (minor, major)
            }
        }
    };

    let matrix = SparseMatrix {
        format,
        shape: (n_rows, n_cols),
        rows,
        cols,
        values,
    };
    matrix.validate()?;
    Ok(ArrayLike::Sparse(matrix))
}

fn read_member(archive: &mut Archive<'_>, name: &str) -> HandlerResult<ArrayLike> {
    let mut member = archive
        .by_name(&format!("{name}.npy"))
        .map_err(|e| InferenceError::codec(format!("NPZ archive has no '{name}' member: {e}")))?;
    let mut bytes = Vec::new();
    member.read_to_end(&mut bytes)?;
    npy::decode(&bytes)
}

fn indices(array: ArrayLike, name: &str) -> HandlerResult<Vec<usize>> {
    let ArrayLike::Int(array) = array else {
        return Err(InferenceError::codec(format!(
            "Sparse matrix '{name}' must be an integer array, got {}",
            array.type_name()
        )));
    };
    array
        .iter()
        .map(|&v| {
            usize::try_from(v)
                .map_err(|_| InferenceError::codec(format!("Negative index {v} in '{name}'")))
        })
        .collect()
}

/// Expands compressed pointers into one major-axis index per stored value.
fn expand_indptr(indptr: &[usize], nnz: usize) -> HandlerResult<Vec<usize>> {
    let mut major = Vec::with_capacity(nnz);
    for (i, window) in indptr.windows(2).enumerate() {
        let (start, end) = (window[0], window[1]);
        if start > end || end > nnz {
            return Err(InferenceError::codec(format!(
                "Invalid indptr range {start}..{end} for {nnz} stored values"
            )));
        }
        major.extend(std::iter::repeat(i).take(end - start));
    }
    if major.len() != nnz {
        return Err(InferenceError::codec(format!(
            "indptr covers {} of {nnz} stored values",
            major.len()
        )));
    }
    Ok(major)
}
