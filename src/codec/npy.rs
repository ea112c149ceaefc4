//! NumPy `.npy` single-array format.
//!
//! Numeric and boolean arrays go through `ndarray-npy`. Unicode (`U`) and byte-string
//! (`S`) arrays are read and written here since that crate does not cover them. Object
//! arrays (`|O`) carry a JSON document after the header in place of a pickle.

use std::io::Cursor;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use ndarray_npy::{ReadNpyExt, ReadableElement, WriteNpyExt};
use serde_json::Value;

use crate::codec::array::ArrayLike;
use crate::error::{HandlerResult, InferenceError};

const MAGIC: &[u8] = b"\x93NUMPY";
const HEADER_ALIGN: usize = 64;
/// Most elements accepted for zero-width string dtypes, which carry no data bytes.
const MAX_EMPTY_ELEMENTS: usize = 1 << 20;

#[derive(Debug, PartialEq)]
struct Header {
    descr: String,
    fortran_order: bool,
    shape: Vec<usize>,
}

impl Header {
    fn element_count(&self) -> HandlerResult<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |count, &dim| count.checked_mul(dim))
            .ok_or_else(|| {
                InferenceError::codec(format!("NPY shape {:?} is too large", self.shape))
            })
    }

    /// Bytes of element data the header declares. Fails when `data` holds fewer.
    fn check_data_len(&self, data: &[u8], item_size: usize) -> HandlerResult<usize> {
        let count = self.element_count()?;
        if item_size == 0 {
            if count > MAX_EMPTY_ELEMENTS {
                return Err(InferenceError::codec(format!(
                    "NPY array of {count} zero-width elements is too large"
                )));
            }
            return Ok(0);
        }
        let needed = count
            .checked_mul(item_size)
            .filter(|&needed| needed <= data.len())
            .ok_or_else(|| {
                InferenceError::codec(format!(
                    "NPY data holds {} bytes, shape {:?} needs {count} elements of {item_size}",
                    data.len(),
                    self.shape
                ))
            })?;
        Ok(needed)
    }
}

pub fn decode(bytes: &[u8]) -> HandlerResult<ArrayLike> {
    let (header, offset) = read_header(bytes)?;
    let data = &bytes[offset..];

    let descr = header.descr.as_str();
    let (order, kind, size) = split_descr(descr)?;
    let big_endian = order == '>';

    let item_size = match kind {
        'O' => None,
        'U' => Some(size.checked_mul(4).ok_or_else(|| {
            InferenceError::codec(format!("Unsupported NPY dtype '{descr}'"))
        })?),
        _ => Some(size),
    };
    if let Some(item_size) = item_size {
        header.check_data_len(data, item_size)?;
    }

    match (kind, size) {
        ('b', 1) => read_typed::<bool>(bytes).map(ArrayLike::Bool),
        ('i', 1) => read_typed::<i8>(bytes).map(|a| ArrayLike::Int(a.mapv(i64::from))),
        ('i', 2) => read_typed::<i16>(bytes).map(|a| ArrayLike::Int(a.mapv(i64::from))),
        ('i', 4) => read_typed::<i32>(bytes).map(|a| ArrayLike::Int(a.mapv(i64::from))),
        ('i', 8) => read_typed::<i64>(bytes).map(ArrayLike::Int),
        ('u', 1) => read_typed::<u8>(bytes).map(|a| ArrayLike::Int(a.mapv(i64::from))),
        ('u', 2) => read_typed::<u16>(bytes).map(|a| ArrayLike::Int(a.mapv(i64::from))),
        ('u', 4) => read_typed::<u32>(bytes).map(|a| ArrayLike::Int(a.mapv(i64::from))),
        ('u', 8) => {
            let array = read_typed::<u64>(bytes)?;
            if array.iter().any(|&v| i64::try_from(v).is_err()) {
                return Err(InferenceError::codec("uint64 value does not fit in int64"));
            }
            Ok(ArrayLike::Int(array.mapv(|v| v as i64)))
        }
        ('f', 4) => read_typed::<f32>(bytes).map(|a| ArrayLike::Float(a.mapv(f64::from))),
        ('f', 8) => read_typed::<f64>(bytes).map(ArrayLike::Float),
        ('U', chars) => read_unicode(&header, data, chars * 4, big_endian).map(ArrayLike::Text),
        ('S', width) => read_bytes(&header, data, width).map(ArrayLike::Text),
        ('O', _) => {
            let value: Value = serde_json::from_slice(data).map_err(|e| {
                InferenceError::codec(format!("Object arrays must carry a JSON document: {e}"))
            })?;
            Ok(ArrayLike::from_value(value))
        }
        _ => Err(InferenceError::codec(format!("Unsupported NPY dtype '{descr}'"))),
    }
}

pub fn encode(array: &ArrayLike) -> HandlerResult<Vec<u8>> {
    let mut buf = Vec::new();
    match array {
        ArrayLike::Int(a) => a.write_npy(&mut buf).map_err(write_err)?,
        ArrayLike::Float(a) => a.write_npy(&mut buf).map_err(write_err)?,
        ArrayLike::Bool(a) => a.write_npy(&mut buf).map_err(write_err)?,
        ArrayLike::Text(a) => {
            let chars = a.iter().map(|s| s.chars().count()).max().unwrap_or(0).max(1);
            write_header(&mut buf, &format!("<U{chars}"), a.shape());
            for value in a.iter() {
                let mut units = value.chars().map(u32::from).collect::<Vec<_>>();
                units.resize(chars, 0);
                for unit in units {
                    let mut word = [0u8; 4];
                    LittleEndian::write_u32(&mut word, unit);
                    buf.extend_from_slice(&word);
                }
            }
        }
        ArrayLike::Object(value) => {
            write_header(&mut buf, "|O", &[]);
            let json = serde_json::to_vec(value)
                .map_err(|e| InferenceError::type_error(e.to_string()))?;
            buf.extend_from_slice(&json);
        }
        other => {
            return Err(InferenceError::type_error(format!(
                "Cannot write {} as NPY",
                other.type_name()
            )))
        }
    }
    Ok(buf)
}

fn read_typed<T: ReadableElement>(bytes: &[u8]) -> HandlerResult<ArrayD<T>> {
    ArrayD::<T>::read_npy(Cursor::new(bytes))
        .map_err(|e| InferenceError::codec(format!("Invalid NPY payload: {e}")))
}

fn write_err(err: ndarray_npy::WriteNpyError) -> InferenceError {
    InferenceError::codec(format!("Failed to write NPY payload: {err}"))
}

fn read_header(bytes: &[u8]) -> HandlerResult<(Header, usize)> {
    if bytes.len() < 10 || !bytes.starts_with(MAGIC) {
        return Err(InferenceError::codec("Payload is not in NPY format"));
    }
    let major = bytes[6];
    let (len, start) = match major {
        1 => (usize::from(LittleEndian::read_u16(&bytes[8..10])), 10),
        2 | 3 if bytes.len() >= 12 => (LittleEndian::read_u32(&bytes[8..12]) as usize, 12),
        _ => return Err(InferenceError::codec(format!("Unsupported NPY version {major}"))),
    };
    let end = start + len;
    let text = bytes
        .get(start..end)
        .ok_or_else(|| InferenceError::codec("NPY header is truncated"))?;
    let text = String::from_utf8_lossy(text);
    Ok((parse_header(&text)?, end))
}

fn parse_header(text: &str) -> HandlerResult<Header> {
    let invalid = || InferenceError::codec(format!("Invalid NPY header: {}", text.trim()));

    let descr = dict_value(text, "descr").ok_or_else(invalid)?;
    let quote = descr.chars().next().filter(|c| *c == '\'' || *c == '"').ok_or_else(invalid)?;
    let descr = descr[1..].split(quote).next().ok_or_else(invalid)?.to_string();

    let fortran_order = dict_value(text, "fortran_order")
        .ok_or_else(invalid)?
        .starts_with("True");

    let shape = dict_value(text, "shape").ok_or_else(invalid)?;
    let shape = shape
        .strip_prefix('(')
        .and_then(|s| s.split(')').next())
        .ok_or_else(invalid)?;
    let shape = shape
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|_| invalid()))
        .collect::<HandlerResult<Vec<_>>>()?;

    Ok(Header {
        descr,
        fortran_order,
        shape,
    })
}

fn dict_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    ["'", "\""].iter().find_map(|q| {
        let needle = format!("{q}{key}{q}");
        let at = text.find(&needle)? + needle.len();
        let rest = text[at..].trim_start().strip_prefix(':')?;
        Some(rest.trim_start())
    })
}

fn split_descr(descr: &str) -> HandlerResult<(char, char, usize)> {
    let invalid = || InferenceError::codec(format!("Unsupported NPY dtype '{descr}'"));
    let mut chars = descr.chars();
    let order = chars.next().ok_or_else(invalid)?;
    let (order, kind) = if matches!(order, '<' | '>' | '|' | '=') {
        (order, chars.next().ok_or_else(invalid)?)
    } else {
        ('|', order)
    };
    let size = chars.as_str();
    let size = if size.is_empty() { 0 } else { size.parse().map_err(|_| invalid())? };
    Ok((order, kind, size))
}

fn shaped<T>(header: &Header, data: Vec<T>) -> HandlerResult<ArrayD<T>> {
    let shape = IxDyn(&header.shape);
    let result = if header.fortran_order {
        ArrayD::from_shape_vec(shape.f(), data)
    } else {
        ArrayD::from_shape_vec(shape, data)
    };
    result.map_err(|e| InferenceError::codec(format!("NPY data does not match its shape: {e}")))
}

fn element_data(header: &Header, data: &[u8], width: usize) -> HandlerResult<Vec<Vec<u8>>> {
    let count = header.element_count()?;
    let needed = header.check_data_len(data, width)?;
    if width == 0 {
        return Ok(vec![Vec::new(); count]);
    }
    Ok(data[..needed].chunks(width).map(<[u8]>::to_vec).collect())
}

fn read_unicode(
    header: &Header,
    data: &[u8],
    width: usize,
    big_endian: bool,
) -> HandlerResult<ArrayD<String>> {
    let values = element_data(header, data, width)?
        .into_iter()
        .map(|element| {
            element
                .chunks(4)
                .map(|word| {
                    if big_endian {
                        BigEndian::read_u32(word)
                    } else {
                        LittleEndian::read_u32(word)
                    }
                })
                .take_while(|&unit| unit != 0)
                .map(|unit| {
                    char::from_u32(unit).ok_or_else(|| {
                        InferenceError::codec(format!("Invalid code point {unit:#x} in NPY data"))
                    })
                })
                .collect::<HandlerResult<String>>()
        })
        .collect::<HandlerResult<Vec<_>>>()?;
    shaped(header, values)
}

fn read_bytes(header: &Header, data: &[u8], width: usize) -> HandlerResult<ArrayD<String>> {
    let values = element_data(header, data, width)?
        .into_iter()
        .map(|element| {
            let end = element.iter().position(|&b| b == 0).unwrap_or(element.len());
            String::from_utf8_lossy(&element[..end]).into_owned()
        })
        .collect();
    shaped(header, values)
}

/// Writes a version 1.0 header, padded so the data starts on a 64 byte boundary.
fn write_header(buf: &mut Vec<u8>, descr: &str, shape: &[usize]) {
    let shape = match shape {
        [] => "()".to_string(),
        [n] => format!("({n},)"),
        dims => format!(
            "({})",
            dims.iter().map(usize::to_string).collect::<Vec<_>>().join(", ")
        ),
    };
    let mut dict = format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': {shape}, }}");
    let unpadded = MAGIC.len() + 4 + dict.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    dict.push_str(&" ".repeat(padding));
    dict.push('\n');

    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&[1, 0]);
    let mut len = [0u8; 2];
    LittleEndian::write_u16(&mut len, dict.len() as u16);
    buf.extend_from_slice(&len);
    buf.extend_from_slice(dict.as_bytes());
}
