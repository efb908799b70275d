use std::cell::RefCell;

use gantry::{
    Decoder, Encoder, Error, TypeId, TypeTable, Value, Variant, calc_size, encode_into,
};

/// Encodes `value` across a sequence of fixed-size chunks and returns the
/// concatenated output plus the number of exchange callbacks taken.
fn encode_chunked(
    table: &TypeTable,
    value: &Value,
    id: TypeId,
    sizes: &[usize],
) -> (Vec<u8>, usize) {
    let mut chunks: Vec<Vec<u8>> = sizes.iter().map(|s| vec![0u8; *s]).collect();
    let fills: RefCell<Vec<usize>> = RefCell::new(Vec::new());
    {
        let (first, rest) = chunks.split_first_mut().unwrap();
        let mut iter = rest.iter_mut();
        let exchange = |filled: usize| {
            fills.borrow_mut().push(filled);
            iter.next().map(|c| c.as_mut_slice()).ok_or(Error::Encoding)
        };
        let mut enc = Encoder::new(first.as_mut_slice(), exchange);
        enc.encode(table, value, id).unwrap();
        fills.borrow_mut().push(enc.position());
    }
    let fills = fills.into_inner();
    let exchanges = fills.len() - 1;
    let mut out = Vec::new();
    for (chunk, &n) in chunks.iter().zip(&fills) {
        out.extend_from_slice(&chunk[..n]);
    }
    (out, exchanges)
}

#[test]
fn array_encodes_into_five_chunks() {
    let table = TypeTable::builtin();
    let value = Value::from(Variant::array(
        TypeId::INT32,
        (0..30).map(Value::Int32).collect(),
    ));

    let (bytes, exchanges) = encode_chunked(table, &value, TypeId::VARIANT, &[30; 6]);

    // six chunks available, five used: the callback ran four times
    assert_eq!(exchanges, 4);
    assert_eq!(bytes.len(), calc_size(table, &value, TypeId::VARIANT).unwrap());
}

#[test]
fn string_encodes_into_five_chunks() {
    let table = TypeTable::builtin();
    let text: String = "gantry-io".chars().cycle().take(120).collect();
    let value = Value::from(Variant::scalar(TypeId::STRING, Value::String(Some(text))));

    let (bytes, exchanges) = encode_chunked(table, &value, TypeId::VARIANT, &[30; 6]);

    assert_eq!(exchanges, 4);
    assert_eq!(bytes.len(), calc_size(table, &value, TypeId::VARIANT).unwrap());
}

#[test]
fn chunked_output_matches_one_shot_encode() {
    let table = TypeTable::builtin();
    let value = Value::from(Variant::array(
        TypeId::INT32,
        (0..30).map(Value::Int32).collect(),
    ));
    let size = calc_size(table, &value, TypeId::VARIANT).unwrap();

    let mut flat = vec![0u8; size];
    let written = encode_into(table, &value, TypeId::VARIANT, &mut flat).unwrap();
    assert_eq!(written, size);

    for sizes in [vec![size], vec![30; 6], vec![17, 40, 23, 19, 64], vec![16; 9]] {
        let (bytes, _) = encode_chunked(table, &value, TypeId::VARIANT, &sizes);
        assert_eq!(bytes, flat, "partitioning {sizes:?} changed the output");
    }
}

#[test]
fn no_atom_straddles_a_chunk_boundary() {
    let table = TypeTable::builtin();
    // doubles are 8 bytes; 30-byte chunks leave a 5-byte tail after the
    // mask and length prefix, so every chunk ends with slack
    let value = Value::from(Variant::array(
        TypeId::DOUBLE,
        (0..20).map(|i| Value::Double(f64::from(i) * 0.5)).collect(),
    ));
    let (bytes, exchanges) = encode_chunked(table, &value, TypeId::VARIANT, &[30; 8]);
    assert!(exchanges > 0);
    assert_eq!(bytes.len(), calc_size(table, &value, TypeId::VARIANT).unwrap());

    let mut dec = Decoder::new(&bytes);
    let decoded = dec.decode(table, TypeId::VARIANT).unwrap();
    assert_eq!(decoded, value);
}

#[test]
fn variant_array_round_trips() {
    let table = TypeTable::builtin();
    let value = Value::from(Variant::array(
        TypeId::INT32,
        (0..30).map(Value::Int32).collect(),
    ));
    let size = calc_size(table, &value, TypeId::VARIANT).unwrap();
    let mut buf = vec![0u8; size];
    encode_into(table, &value, TypeId::VARIANT, &mut buf).unwrap();

    let mut dec = Decoder::new(&buf);
    let decoded = dec.decode(table, TypeId::VARIANT).unwrap();
    assert_eq!(dec.position(), size);
    assert_eq!(decoded, value);
}

#[test]
fn null_and_empty_strings_stay_distinguishable() {
    let table = TypeTable::builtin();
    let null = Value::from(Variant::scalar(TypeId::STRING, Value::String(None)));
    let empty = Value::from(Variant::scalar(TypeId::STRING, Value::String(Some(String::new()))));

    // one-byte mask plus the four-byte length prefix
    assert_eq!(calc_size(table, &null, TypeId::VARIANT).unwrap(), 5);
    assert_eq!(calc_size(table, &empty, TypeId::VARIANT).unwrap(), 5);

    let mut null_buf = vec![0u8; 5];
    let mut empty_buf = vec![0u8; 5];
    encode_into(table, &null, TypeId::VARIANT, &mut null_buf).unwrap();
    encode_into(table, &empty, TypeId::VARIANT, &mut empty_buf).unwrap();
    assert_eq!(&null_buf[1..], &(-1i32).to_le_bytes());
    assert_eq!(&empty_buf[1..], &0i32.to_le_bytes());

    let null_back = Decoder::new(&null_buf).decode(table, TypeId::VARIANT).unwrap();
    let empty_back = Decoder::new(&empty_buf).decode(table, TypeId::VARIANT).unwrap();
    assert_eq!(null_back, null);
    assert_eq!(empty_back, empty);
    assert_ne!(null_back, empty_back);
}

#[test]
fn null_array_round_trips() {
    let table = TypeTable::builtin();
    let value = Value::from(Variant::null_array(TypeId::INT32));
    let size = calc_size(table, &value, TypeId::VARIANT).unwrap();
    assert_eq!(size, 5);

    let mut buf = vec![0u8; size];
    encode_into(table, &value, TypeId::VARIANT, &mut buf).unwrap();
    let back = Decoder::new(&buf).decode(table, TypeId::VARIANT).unwrap();
    assert_eq!(back, value);
}

#[test]
fn exhausted_chunk_sequence_fails_the_encode() {
    let table = TypeTable::builtin();
    let value = Value::from(Variant::array(
        TypeId::INT32,
        (0..30).map(Value::Int32).collect(),
    ));
    let mut chunks: Vec<Vec<u8>> = vec![vec![0u8; 30]; 2];
    let (first, rest) = chunks.split_first_mut().unwrap();
    let mut iter = rest.iter_mut();
    let exchange =
        |_filled: usize| iter.next().map(|c| c.as_mut_slice()).ok_or(Error::Encoding);
    let mut enc = Encoder::new(first.as_mut_slice(), exchange);
    assert_eq!(enc.encode(table, &value, TypeId::VARIANT), Err(Error::Encoding));
}

#[test]
fn structure_round_trips_through_extended_table() {
    use gantry::{Field, Layout, TypeEntry};

    let table = TypeTable::with_extensions(vec![TypeEntry {
        id: TypeId(33),
        name: "SampleHeader",
        layout: Layout::Structure {
            fields: vec![
                Field { name: "sequence", ty: TypeId::UINT32 },
                Field { name: "source", ty: TypeId::STRING },
                Field { name: "payload", ty: TypeId::BYTE_STRING },
            ],
        },
    }]);
    let value = Value::Structure(vec![
        Value::UInt32(9000),
        Value::String(Some("press-7".into())),
        Value::ByteString(Some(vec![1, 2, 3, 4])),
    ]);

    let size = calc_size(&table, &value, TypeId(33)).unwrap();
    let (bytes, _) = encode_chunked(&table, &value, TypeId(33), &[16; 8]);
    assert_eq!(bytes.len(), size);

    let decoded = Decoder::new(&bytes).decode(&table, TypeId(33)).unwrap();
    assert_eq!(decoded, value);
}
