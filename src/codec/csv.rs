use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};

use crate::codec::array::{format_bool, format_float, ArrayLike, DType};
use crate::error::{HandlerResult, InferenceError};

const DELIMITER: char = ',';
const COMMENT: char = '#';

/// Parses comma separated records into an array.
///
/// Blank lines and `#` comments are skipped. Every record must have the same number of
/// fields. Length-one axes are squeezed away, so a single column or a single row decodes
/// to a one-dimensional array and a single field to a scalar.
pub fn decode(text: &str, dtype: Option<DType>) -> HandlerResult<ArrayLike> {
    let mut rows: Vec<Vec<&str>> = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.split(COMMENT).next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(DELIMITER).map(str::trim).collect();
        if let Some(first) = rows.first() {
            if first.len() != fields.len() {
                return Err(InferenceError::codec(format!(
                    "Line #{} (got {} columns instead of {})",
                    line_no + 1,
                    fields.len(),
                    first.len()
                )));
            }
        }
        rows.push(fields);
    }

    let n_rows = rows.len();
    let n_cols = rows.first().map_or(0, Vec::len);
    let shape: Vec<usize> = if n_rows == 0 {
        vec![0]
    } else {
        [n_rows, n_cols].into_iter().filter(|&n| n != 1).collect()
    };
    let fields: Vec<&str> = rows.into_iter().flatten().collect();

    let array = infer(&fields, &shape)?;
    match dtype {
        Some(dtype) => array.cast(dtype),
        None => Ok(array),
    }
}

fn infer(fields: &[&str], shape: &[usize]) -> HandlerResult<ArrayLike> {
    let shape = IxDyn(shape);
    let shape_err = |e: ndarray::ShapeError| InferenceError::codec(e.to_string());

    if fields.is_empty() {
        return ArrayD::from_shape_vec(shape, Vec::<f64>::new())
            .map(ArrayLike::Float)
            .map_err(shape_err);
    }
    if let Some(ints) = fields.iter().map(|f| f.parse::<i64>().ok()).collect::<Option<Vec<_>>>() {
        return ArrayD::from_shape_vec(shape, ints)
            .map(ArrayLike::Int)
            .map_err(shape_err);
    }
    if let Some(floats) = fields.iter().map(|f| parse_float_field(f)).collect::<Option<Vec<_>>>() {
        return ArrayD::from_shape_vec(shape, floats)
            .map(ArrayLike::Float)
            .map_err(shape_err);
    }
    if let Some(bools) = fields.iter().map(|f| parse_bool_field(f)).collect::<Option<Vec<_>>>() {
        return ArrayD::from_shape_vec(shape, bools)
            .map(ArrayLike::Bool)
            .map_err(shape_err);
    }
    let text = fields.iter().map(|f| f.to_string()).collect();
    ArrayD::from_shape_vec(shape, text)
        .map(ArrayLike::Text)
        .map_err(shape_err)
}

// Missing numeric fields read as NaN.
fn parse_float_field(field: &str) -> Option<f64> {
    if field.is_empty() {
        return Some(f64::NAN);
    }
    field.parse::<f64>().ok()
}

fn parse_bool_field(field: &str) -> Option<bool> {
    if field.eq_ignore_ascii_case("true") {
        Some(true)
    } else if field.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Renders one record per line with comma separated fields.
///
/// Every element goes through plain string formatting. One-dimensional arrays put each
/// element on its own line.
pub fn encode(array: &ArrayLike) -> HandlerResult<String> {
    match array {
        ArrayLike::Int(a) => render(a.view(), &|v: &i64| v.to_string()),
        ArrayLike::Float(a) => render(a.view(), &|v: &f64| format_float(*v)),
        ArrayLike::Bool(a) => render(a.view(), &|v: &bool| format_bool(*v)),
        ArrayLike::Text(a) => render(a.view(), &|v: &String| v.clone()),
        ArrayLike::Object(value) => match ArrayLike::from_value(value.clone()) {
            ArrayLike::Object(_) => Err(InferenceError::type_error(
                "Cannot write a non-rectangular object as CSV",
            )),
            rectangular => encode(&rectangular),
        },
        other => Err(InferenceError::type_error(format!(
            "Cannot write {} as CSV",
            other.type_name()
        ))),
    }
}

fn render<T>(view: ArrayViewD<'_, T>, format: &dyn Fn(&T) -> String) -> HandlerResult<String> {
    let mut out = String::new();
    match view.ndim() {
        0 | 1 => {
            for value in view.iter() {
                out.push_str(&format(value));
                out.push('\n');
            }
        }
        2 => {
            for row in view.axis_iter(Axis(0)) {
                let fields: Vec<String> = row.iter().map(format).collect();
                out.push_str(&fields.join(&DELIMITER.to_string()));
                out.push('\n');
            }
        }
        n => {
            return Err(InferenceError::type_error(format!(
                "Expected 1D or 2D array, got {n}D array instead"
            )))
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_single_column() {
        assert_eq!(decode("42\n6\n9\n", None).unwrap(), ArrayLike::from(vec![42i64, 6, 9]));
        assert_eq!(
            decode("42.0\n6.0\n9.0\n", None).unwrap(),
            ArrayLike::from(vec![42.0, 6.0, 9.0])
        );
    }

    #[test]
    fn decodes_table() {
        let array = decode("1,2,3\n4,5,6\n", None).unwrap();
        assert_eq!(array.shape(), Some(&[2, 3][..]));
        assert_eq!(array.to_value().unwrap(), json!([[1, 2, 3], [4, 5, 6]]));
    }

    #[test]
    fn single_row_is_squeezed() {
        assert_eq!(decode("1.5,2.5\n", None).unwrap(), ArrayLike::from(vec![1.5, 2.5]));
    }

    #[test]
    fn skips_blank_lines_and_comments() {
        let array = decode("# header\n1,2\n\n3,4 # trailing\n", None).unwrap();
        assert_eq!(array.to_value().unwrap(), json!([[1, 2], [3, 4]]));
    }

    #[test]
    fn missing_numeric_field_is_nan() {
        let ArrayLike::Float(array) = decode("1,\n2,3\n", None).unwrap() else {
            panic!("expected a float array");
        };
        assert!(array.iter().nth(1).is_some_and(|v| v.is_nan()));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        assert!(matches!(decode("1,2\n3\n", None), Err(InferenceError::Codec(_))));
    }

    #[test]
    fn encodes_one_value_per_line() {
        assert_eq!(encode(&ArrayLike::from(vec![42i64, 6, 9])).unwrap(), "42\n6\n9\n");
        assert_eq!(encode(&ArrayLike::from(vec![42.0, 6.0, 9.0])).unwrap(), "42.0\n6.0\n9.0\n");
        assert_eq!(encode(&ArrayLike::from(vec!["42", "6", "9"])).unwrap(), "42\n6\n9\n");
    }

    #[test]
    fn encodes_rows() {
        let array = ArrayLike::from_value(json!([[1, 2], [3, 4]]));
        assert_eq!(encode(&array).unwrap(), "1,2\n3,4\n");
    }

    #[test]
    fn rejects_three_dimensions() {
        let array = ArrayLike::from_value(json!([[[1]]]));
        assert!(matches!(encode(&array), Err(InferenceError::Type(_))));
    }
}
