use std::io::{Cursor, Write};

use inference_toolkit::codec::{self, ArrayLike, DType, Payload, ResponseBody, SparseFormat};
use inference_toolkit::content_types::{CSV, JSON, NPY, NPZ, OCTET_STREAM};
use inference_toolkit::{InferenceError, UnsupportedFormatError};
use serde_json::json;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

fn payload(body: ResponseBody) -> Payload {
    match body {
        ResponseBody::Text(text) => Payload::Text(text),
        ResponseBody::Bytes(bytes) => Payload::Bytes(bytes),
    }
}

fn round_trip(array: &ArrayLike, content_type: &str) -> ArrayLike {
    let body = codec::encode(array, content_type).unwrap();
    codec::decode(&payload(body), content_type).unwrap()
}

#[test]
fn encoded_arrays_decode_to_themselves() {
    let arrays = [
        ArrayLike::from(vec![42i64, 6, 9]),
        ArrayLike::from(vec![42.5, 6.0, -9.25]),
        ArrayLike::from(vec!["forty-two", "six", "nine"]),
        ArrayLike::from_value(json!([[1, 2, 3], [4, 5, 6]])),
        ArrayLike::from(Vec::<f64>::new()),
    ];
    for content_type in [JSON, CSV, NPY] {
        for array in &arrays {
            assert_eq!(&round_trip(array, content_type), array, "{content_type}");
        }
    }
}

#[test]
fn empty_arrays_encode_to_empty_payloads() {
    let empty = ArrayLike::from(Vec::<f64>::new());
    assert_eq!(codec::encode(&empty, CSV).unwrap(), ResponseBody::Text(String::new()));
    assert_eq!(codec::encode(&empty, JSON).unwrap(), ResponseBody::Text("[]".into()));
}

#[test]
fn unregistered_types_name_the_type() {
    let array = ArrayLike::from(vec![1i64]);
    for content_type in [OCTET_STREAM, "application/x-unknown"] {
        let err = codec::encode(&array, content_type).unwrap_err();
        assert!(matches!(
            err,
            InferenceError::UnsupportedFormat(UnsupportedFormatError { content_type: ref ct })
                if ct == content_type
        ));
        assert!(err.to_string().contains(content_type));

        let err = codec::decode(&Payload::from("1"), content_type).unwrap_err();
        assert!(matches!(err, InferenceError::UnsupportedFormat(_)));
    }
}

#[test]
fn explicit_cast_on_decode() {
    let array = codec::decode_as(&Payload::from("1,0\n0,1\n"), CSV, Some(DType::Bool)).unwrap();
    assert_eq!(array.to_value().unwrap(), json!([[true, false], [false, true]]));

    let array =
        codec::decode_as(&Payload::from(r#"["1.5", "2"]"#), JSON, Some(DType::Float)).unwrap();
    assert_eq!(array, ArrayLike::from(vec![1.5, 2.0]));
}

#[test]
fn json_rejects_unserializable_values() {
    let opaque = ArrayLike::Opaque(codec::OpaqueValue::new(std::time::Duration::from_secs(1)));
    let err = codec::encode(&opaque, JSON).unwrap_err();
    assert!(matches!(err, InferenceError::Type(ref m) if m.contains("not JSON serializable")));
}

#[test]
fn csv_stringifies_every_element() {
    let array = ArrayLike::from_value(json!([[1.5, 2.0], [3.0, 4.25]]));
    assert_eq!(
        codec::encode(&array, CSV).unwrap(),
        ResponseBody::Text("1.5,2.0\n3.0,4.25\n".into())
    );
    let array = ArrayLike::from(vec![true, false]);
    assert_eq!(
        codec::encode(&array, CSV).unwrap(),
        ResponseBody::Text("True\nFalse\n".into())
    );
}

#[test]
fn npy_carries_nested_objects() {
    let document = ArrayLike::Object(json!([{"id": 1, "tags": ["a", "b"]}, null]));
    assert_eq!(round_trip(&document, NPY), document);
}

fn npz(members: &[(&str, ArrayLike)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, array) in members {
        writer.start_file(format!("{name}.npy"), options).unwrap();
        let bytes = codec::npy::encode(array).unwrap();
        writer.write_all(&bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn expected_dense() -> serde_json::Value {
    json!([[1.0, 0.0, 2.0], [0.0, 3.0, 0.0]])
}

#[test]
fn decodes_csr_matrices() {
    let bytes = npz(&[
        ("format", ArrayLike::from(vec!["csr"])),
        ("shape", ArrayLike::from(vec![2i64, 3])),
        ("data", ArrayLike::from(vec![1.0, 2.0, 3.0])),
        ("indices", ArrayLike::from(vec![0i64, 2, 1])),
        ("indptr", ArrayLike::from(vec![0i64, 2, 3])),
    ]);
    let ArrayLike::Sparse(matrix) = codec::decode(&Payload::Bytes(bytes), NPZ).unwrap() else {
        panic!("expected a sparse matrix");
    };
    assert_eq!(matrix.format, SparseFormat::Csr);
    assert_eq!(matrix.shape, (2, 3));
    assert_eq!(matrix.nnz(), 3);
    assert_eq!(matrix.to_dense().unwrap().to_value().unwrap(), expected_dense());
}

#[test]
fn decodes_csc_matrices() {
    let bytes = npz(&[
        ("format", ArrayLike::from(vec!["csc"])),
        ("shape", ArrayLike::from(vec![2i64, 3])),
        ("data", ArrayLike::from(vec![1.0, 3.0, 2.0])),
        ("indices", ArrayLike::from(vec![0i64, 1, 0])),
        ("indptr", ArrayLike::from(vec![0i64, 1, 2, 3])),
    ]);
    let array = codec::decode(&Payload::Bytes(bytes), NPZ).unwrap();
    assert_eq!(array.cast(DType::Float).unwrap().to_value().unwrap(), expected_dense());
}

#[test]
fn decodes_coo_matrices() {
    let bytes = npz(&[
        ("format", ArrayLike::from(vec!["coo"])),
        ("shape", ArrayLike::from(vec![2i64, 3])),
        ("data", ArrayLike::from(vec![1.0, 2.0, 3.0])),
        ("row", ArrayLike::from(vec![0i64, 0, 1])),
        ("col", ArrayLike::from(vec![0i64, 2, 1])),
    ]);
    let ArrayLike::Sparse(matrix) = codec::decode(&Payload::Bytes(bytes), NPZ).unwrap() else {
        panic!("expected a sparse matrix");
    };
    assert_eq!(matrix.format, SparseFormat::Coo);
    assert_eq!(matrix.to_dense().unwrap().to_value().unwrap(), expected_dense());
}

#[test]
fn sparse_indices_out_of_bounds_are_rejected() {
    let bytes = npz(&[
        ("format", ArrayLike::from(vec!["coo"])),
        ("shape", ArrayLike::from(vec![2i64, 2])),
        ("data", ArrayLike::from(vec![1.0])),
        ("row", ArrayLike::from(vec![5i64])),
        ("col", ArrayLike::from(vec![0i64])),
    ]);
    let err = codec::decode(&Payload::Bytes(bytes), NPZ).unwrap_err();
    assert!(matches!(err, InferenceError::Codec(_)));
}

#[test]
fn large_sparse_shapes_decode_without_densifying() {
    let bytes = npz(&[
        ("format", ArrayLike::from(vec!["coo"])),
        ("shape", ArrayLike::from(vec![3_000_000i64, 3_000_000])),
        ("data", ArrayLike::from(vec![1.0])),
        ("row", ArrayLike::from(vec![2_999_999i64])),
        ("col", ArrayLike::from(vec![0i64])),
    ]);
    let ArrayLike::Sparse(matrix) = codec::decode(&Payload::Bytes(bytes), NPZ).unwrap() else {
        panic!("expected a sparse matrix");
    };
    assert_eq!(matrix.shape, (3_000_000, 3_000_000));
    assert_eq!(matrix.nnz(), 1);
    assert!(matches!(matrix.to_dense(), Err(InferenceError::Codec(_))));
}
