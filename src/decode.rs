//! Protocol buffer binary payload decoding.
//!
//! Decoding is driven by the descriptors of a [`SchemaSet`] and never fails outright. Anything
//! that doesn't fit the descriptor is kept in the result as an unknown, incomplete or garbage
//! value so callers can judge how well the payload matched the type.

use crate::schema::*;
use bytes::Bytes;

/// Nested messages deeper than this are not decoded further.
const MAX_DEPTH: usize = 64;

/// Decoded protocol buffer value.
#[derive(Debug, PartialEq, Clone)]
pub enum Value
{
    /// `double` value.
    Double(f64),
    /// `float` value.
    Float(f32),
    /// `int32` value.
    Int32(i32),
    /// `int64` value.
    Int64(i64),
    /// `uint32` value.
    UInt32(u32),
    /// `uint64` value.
    UInt64(u64),
    /// `sint32` value.
    SInt32(i32),
    /// `sint64` value.
    SInt64(i64),
    /// `fixed32` value.
    Fixed32(u32),
    /// `fixed64` value.
    Fixed64(u64),
    /// `sfixed32` value.
    SFixed32(i32),
    /// `sfixed64` value.
    SFixed64(i64),
    /// `bool` value.
    ///
    /// The raw varint is kept so that values other than 0 and 1 can be told apart.
    Bool(u64),
    /// `string` value.
    String(String),
    /// `bytes` value.
    Bytes(Bytes),

    /// A repeated packed value.
    Packed(PackedArray),

    /// Message type value.
    Message(Box<MessageValue>),

    /// Enum type value.
    Enum(EnumValue),

    /// Value which was incomplete due to missing bytes in the payload.
    Incomplete(Bytes),

    /// Value which doesn't match the field declaration, or belongs to no declared field.
    ///
    /// The wire type allows the decoder to tell how large an unknown value is. This allows the
    /// unknown value to be skipped and decoding can continue from the next value.
    Unknown(UnknownValue),
}

/// Packed scalar fields.
#[derive(Debug, PartialEq, Clone)]
pub enum PackedArray
{
    /// `double` values.
    Double(Vec<f64>),
    /// `float` values.
    Float(Vec<f32>),
    /// `int32` values.
    Int32(Vec<i32>),
    /// `int64` values.
    Int64(Vec<i64>),
    /// `uint32` values.
    UInt32(Vec<u32>),
    /// `uint64` values.
    UInt64(Vec<u64>),
    /// `sint32` values.
    SInt32(Vec<i32>),
    /// `sint64` values.
    SInt64(Vec<i64>),
    /// `fixed32` values.
    Fixed32(Vec<u32>),
    /// `fixed64` values.
    Fixed64(Vec<u64>),
    /// `sfixed32` values.
    SFixed32(Vec<i32>),
    /// `sfixed64` values.
    SFixed64(Vec<i64>),
    /// `bool` values as raw varints.
    Bool(Vec<u64>),
    /// Enum values.
    Enum(EnumRef, Vec<i64>),
}

/// Unknown value.
#[derive(Debug, PartialEq, Clone)]
pub enum UnknownValue
{
    /// Unknown varint (wire type = 0).
    Varint(u64),

    /// Unknown 64-bit value (wire type = 1).
    Fixed64(u64),

    /// Unknown variable length value (wire type = 2).
    VariableLength(Bytes),

    /// Unknown 32-bit value (wire type = 5).
    Fixed32(u32),

    /// Unknown group (wire type = 3). Holds the group body without its start and end tags.
    Group(Bytes),

    /// Invalid value.
    ///
    /// Invalid value is a value for which the wire type wasn't valid. Encountering invalid wire
    /// type will result in the remaining bytes to be consumed from the current variable length
    /// stream as it is imposible to tell how large such invalid value is.
    Invalid(Bytes),
}

/// Enum value.
#[derive(Debug, PartialEq, Clone)]
pub struct EnumValue
{
    /// Reference to the enum type.
    pub enum_ref: EnumRef,

    /// Value.
    pub value: i64,
}

/// Message value.
#[derive(Debug, PartialEq, Clone)]
pub struct MessageValue
{
    /// Reference to the message type.
    pub msg_ref: MessageRef,

    /// Mesage field values in wire order.
    pub fields: Vec<FieldValue>,

    /// Garbage data at the end of the message.
    ///
    /// As opposed to an `UnknownValue::Invalid`, the garbage data did not have a valid field
    /// number and for that reason cannot be placed into the `fields` vector.
    pub garbage: Option<Bytes>,
}

/// Field value.
#[derive(Debug, PartialEq, Clone)]
pub struct FieldValue
{
    /// Field number.
    pub number: u64,

    /// Field value.
    pub value: Value,
}

impl MessageValue
{
    /// True if the payload was consumed as a sequence of complete, well formed field records.
    ///
    /// Only the top level is checked. Unknown fields and damaged nested messages don't make
    /// the message malformed.
    pub fn is_well_formed(&self) -> bool
    {
        self.garbage.is_none()
            && self.fields.iter().all(|f| {
                !matches!(
                    f.value,
                    Value::Incomplete(..) | Value::Unknown(UnknownValue::Invalid(..))
                )
            })
    }
}

impl MessageRef
{
    /// Decode a message.
    ///
    /// Returns `None` if the reference doesn't resolve in the given schema set.
    pub fn decode(self, data: &[u8], set: &SchemaSet) -> Option<MessageValue>
    {
        set.resolve_message(self).map(|msg| msg.decode(data, set))
    }
}

impl MessageInfo
{
    /// Decode a message.
    pub fn decode(&self, data: &[u8], set: &SchemaSet) -> MessageValue
    {
        self.decode_nested(data, set, 0)
    }

    fn decode_nested(&self, mut data: &[u8], set: &SchemaSet, depth: usize) -> MessageValue
    {
        let mut msg = MessageValue {
            msg_ref: self.self_ref,
            fields: vec![],
            garbage: None,
        };

        while !data.is_empty() {
            let before_tag = data;
            let tag = match read_varint(&mut data) {
                Some(tag) if tag >> 3 != 0 => tag,
                _ => {
                    msg.garbage = Some(Bytes::copy_from_slice(before_tag));
                    break;
                }
            };

            let number = tag >> 3;
            let wire_type = (tag & 0x07) as u8;

            let value = match self.get_field(number) {
                Some(field) => Value::decode_field(&mut data, field, wire_type, set, depth),
                None => Value::decode_unknown(&mut data, number, wire_type),
            };

            msg.fields.push(FieldValue { number, value })
        }

        msg
    }
}

impl Value
{
    fn decode_field(
        data: &mut &[u8],
        field: &MessageField,
        wire_type: u8,
        set: &SchemaSet,
        depth: usize,
    ) -> Self
    {
        let vt = &field.field_type;
        let repeated = matches!(
            field.multiplicity,
            Multiplicity::Repeated | Multiplicity::RepeatedPacked
        );

        // Writers may pick either encoding for repeated scalars regardless of the declaration.
        if repeated && vt.is_packable() && wire_type == 2 {
            Value::decode_packed(data, vt)
        } else if vt.wire_type() == wire_type {
            Value::decode(data, vt, field.number, set, depth)
        } else {
            Value::decode_unknown(data, field.number, wire_type)
        }
    }

    fn decode(data: &mut &[u8], vt: &ValueType, number: u64, set: &SchemaSet, depth: usize)
        -> Self
    {
        let original = *data;
        let opt = match vt {
            ValueType::Group(mref) => read_group(data, number).map(|body| {
                match set.resolve_message(*mref) {
                    Some(msg) if depth < MAX_DEPTH => {
                        Value::Message(Box::new(msg.decode_nested(body, set, depth + 1)))
                    }
                    _ => Value::Unknown(UnknownValue::Group(Bytes::copy_from_slice(body))),
                }
            }),
            ValueType::Message(mref) => read_length_delimited(data).map(|consumed| {
                match set.resolve_message(*mref) {
                    Some(msg) if depth < MAX_DEPTH => {
                        Value::Message(Box::new(msg.decode_nested(consumed, set, depth + 1)))
                    }
                    _ => Value::Unknown(UnknownValue::VariableLength(Bytes::copy_from_slice(
                        consumed,
                    ))),
                }
            }),
            ValueType::String => read_length_delimited(data).map(|consumed| {
                match std::str::from_utf8(consumed) {
                    Ok(s) => Value::String(s.to_string()),
                    Err(_) => Value::Unknown(UnknownValue::VariableLength(Bytes::copy_from_slice(
                        consumed,
                    ))),
                }
            }),
            ValueType::Bytes => {
                read_length_delimited(data).map(|b| Value::Bytes(Bytes::copy_from_slice(b)))
            }
            scalar => read_scalar(data, scalar),
        };

        opt.unwrap_or_else(|| return_incomplete(data, original))
    }

    fn decode_packed(data: &mut &[u8], vt: &ValueType) -> Self
    {
        let original = *data;
        let mut array = match read_length_delimited(data) {
            Some(array) => array,
            None => return return_incomplete(data, original),
        };

        // Every packed array is read the same way: decode scalars until the array runs out and
        // collect the ones matching the variant.
        macro_rules! read_packed {
            ($variant:ident) => {{
                let mut output = vec![];
                while !array.is_empty() {
                    match read_scalar(&mut array, vt) {
                        Some(Value::$variant(v)) => output.push(v),
                        _ => return return_incomplete(data, original),
                    }
                }
                Value::Packed(PackedArray::$variant(output))
            }};
        }

        match vt {
            ValueType::Double => read_packed!(Double),
            ValueType::Float => read_packed!(Float),
            ValueType::Int32 => read_packed!(Int32),
            ValueType::Int64 => read_packed!(Int64),
            ValueType::UInt32 => read_packed!(UInt32),
            ValueType::UInt64 => read_packed!(UInt64),
            ValueType::SInt32 => read_packed!(SInt32),
            ValueType::SInt64 => read_packed!(SInt64),
            ValueType::Fixed32 => read_packed!(Fixed32),
            ValueType::Fixed64 => read_packed!(Fixed64),
            ValueType::SFixed32 => read_packed!(SFixed32),
            ValueType::SFixed64 => read_packed!(SFixed64),
            ValueType::Bool => read_packed!(Bool),
            ValueType::Enum(eref) => {
                let mut output = vec![];
                while !array.is_empty() {
                    match read_scalar(&mut array, vt) {
                        Some(Value::Enum(e)) => output.push(e.value),
                        _ => return return_incomplete(data, original),
                    }
                }
                Value::Packed(PackedArray::Enum(*eref, output))
            }
            ValueType::String
            | ValueType::Bytes
            | ValueType::Message(..)
            | ValueType::Group(..) => {
                Value::Unknown(UnknownValue::VariableLength(Bytes::copy_from_slice(array)))
            }
        }
    }

    fn decode_unknown(data: &mut &[u8], number: u64, wire_type: u8) -> Value
    {
        let original = *data;
        let value = match wire_type {
            0 => read_varint(data).map(UnknownValue::Varint),
            1 => try_read_8_bytes(data).map(|b| UnknownValue::Fixed64(u64::from_le_bytes(b))),
            2 => read_length_delimited(data)
                .map(|b| UnknownValue::VariableLength(Bytes::copy_from_slice(b))),
            3 => read_group(data, number).map(|b| UnknownValue::Group(Bytes::copy_from_slice(b))),
            5 => try_read_4_bytes(data).map(|b| UnknownValue::Fixed32(u32::from_le_bytes(b))),
            _ => {
                let bytes = Bytes::copy_from_slice(data);
                *data = &[];
                Some(UnknownValue::Invalid(bytes))
            }
        };

        value
            .map(Value::Unknown)
            .unwrap_or_else(|| return_incomplete(data, original))
    }
}

/// Reads a single non-length-delimited value.
fn read_scalar(data: &mut &[u8], vt: &ValueType) -> Option<Value>
{
    Some(match vt {
        ValueType::Double => Value::Double(f64::from_le_bytes(try_read_8_bytes(data)?)),
        ValueType::Float => Value::Float(f32::from_le_bytes(try_read_4_bytes(data)?)),
        ValueType::Int32 => Value::Int32(read_varint(data)? as i32),
        ValueType::Int64 => Value::Int64(read_varint(data)? as i64),
        ValueType::UInt32 => Value::UInt32(read_varint(data)? as u32),
        ValueType::UInt64 => Value::UInt64(read_varint(data)?),
        ValueType::SInt32 => Value::SInt32(zigzag(read_varint(data)?) as i32),
        ValueType::SInt64 => Value::SInt64(zigzag(read_varint(data)?)),
        ValueType::Fixed32 => Value::Fixed32(u32::from_le_bytes(try_read_4_bytes(data)?)),
        ValueType::Fixed64 => Value::Fixed64(u64::from_le_bytes(try_read_8_bytes(data)?)),
        ValueType::SFixed32 => Value::SFixed32(i32::from_le_bytes(try_read_4_bytes(data)?)),
        ValueType::SFixed64 => Value::SFixed64(i64::from_le_bytes(try_read_8_bytes(data)?)),
        ValueType::Bool => Value::Bool(read_varint(data)?),

        // Enums are int32 on the wire.
        ValueType::Enum(eref) => Value::Enum(EnumValue {
            enum_ref: *eref,
            value: i64::from(read_varint(data)? as i32),
        }),
        ValueType::String | ValueType::Bytes | ValueType::Message(..) | ValueType::Group(..) => {
            return None
        }
    })
}

fn zigzag(u: u64) -> i64
{
    ((u >> 1) as i64) ^ -((u & 1) as i64)
}

fn return_incomplete(data: &mut &[u8], original: &[u8]) -> Value
{
    *data = &[];
    Value::Incomplete(Bytes::copy_from_slice(original))
}

/// Reads a base 128 varint.
///
/// Returns `None` without consuming anything if the data ends mid-varint or the varint is
/// longer than ten bytes.
fn read_varint(data: &mut &[u8]) -> Option<u64>
{
    let mut result = 0u64;
    for (idx, b) in data.iter().enumerate().take(10) {
        result |= u64::from(b & 0x7f) << (idx * 7);
        if b & 0x80 == 0 {
            *data = &data[idx + 1..];
            return Some(result);
        }
    }

    None
}

/// Reads a length prefix and the bytes it covers.
///
/// Leaves the data untouched if the length overruns the buffer.
fn read_length_delimited<'a>(data: &mut &'a [u8]) -> Option<&'a [u8]>
{
    let original = *data;
    let length = read_varint(data)?;
    if length > data.len() as u64 {
        *data = original;
        return None;
    }

    let (consumed, remainder) = data.split_at(length as usize);
    *data = remainder;
    Some(consumed)
}

/// Reads the body of a group whose start tag for field `number` was just consumed, along with
/// the matching end tag. Groups nested in the body are skipped over as part of it.
///
/// Leaves the data untouched if the body runs out before the end tag, holds a malformed record
/// or closes with the end tag of another field.
fn read_group<'a>(data: &mut &'a [u8], number: u64) -> Option<&'a [u8]>
{
    let original = *data;
    let mut cursor = original;
    let mut open = vec![number];

    loop {
        let body_len = original.len() - cursor.len();
        let tag = read_varint(&mut cursor)?;
        match tag & 0x07 {
            0 => read_varint(&mut cursor).map(drop)?,
            1 => try_read_8_bytes(&mut cursor).map(drop)?,
            2 => read_length_delimited(&mut cursor).map(drop)?,
            5 => try_read_4_bytes(&mut cursor).map(drop)?,
            3 => open.push(tag >> 3),
            4 => {
                if open.pop() != Some(tag >> 3) {
                    return None;
                }
                if open.is_empty() {
                    *data = cursor;
                    return Some(&original[..body_len]);
                }
            }
            _ => return None,
        }
    }
}

fn try_read_8_bytes(data: &mut &[u8]) -> Option<[u8; 8]>
{
    let bytes: [u8; 8] = data.get(..8)?.try_into().ok()?;
    *data = &data[8..];
    Some(bytes)
}

fn try_read_4_bytes(data: &mut &[u8]) -> Option<[u8; 4]>
{
    let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
    *data = &data[4..];
    Some(bytes)
}

#[cfg(test)]
mod test
{
    use super::*;

    fn set() -> SchemaSet
    {
        SchemaSet::parse(&[r#"
            syntax = "proto3";
            package test;

            message Scalars {
                int32 a = 1;
                sint64 b = 2;
                fixed32 c = 3;
                double d = 4;
                string e = 5;
                bool f = 6;
                Kind kind = 7;
            }
            enum Kind { ZERO = 0; ONE = 1; }

            message Lists {
                repeated int32 values = 1;
                repeated Kind kinds = 2;
                repeated string names = 3;
            }

            message Outer {
                Scalars inner = 1;
                Outer next = 2;
            }
        "#])
        .unwrap()
    }

    #[test]
    fn scalars()
    {
        let set = set();
        let msg = set.get_message("test.Scalars").unwrap();

        let value = msg.decode(
            b"\x08\xff\xff\xff\xff\xff\xff\xff\xff\xff\x01\
              \x10\x03\
              \x1d\x01\x00\x00\x00\
              \x21\x00\x00\x00\x00\x00\x00\xf8\x3f\
              \x2a\x02hi\
              \x30\x01\
              \x38\x01",
            &set,
        );

        assert!(value.is_well_formed());
        let values: Vec<_> = value.fields.iter().map(|f| f.value.clone()).collect();
        assert_eq!(
            values,
            vec![
                Value::Int32(-1),
                Value::SInt64(-2),
                Value::Fixed32(1),
                Value::Double(1.5),
                Value::String("hi".to_string()),
                Value::Bool(1),
                Value::Enum(EnumValue {
                    enum_ref: set.get_enum("test.Kind").unwrap().self_ref,
                    value: 1
                }),
            ]
        );
    }

    #[test]
    fn packed_and_unpacked()
    {
        let set = set();
        let msg = set.get_message("test.Lists").unwrap();

        let packed = msg.decode(b"\x0a\x03\x01\x02\x03", &set);
        assert_eq!(
            packed.fields[0].value,
            Value::Packed(PackedArray::Int32(vec![1, 2, 3]))
        );

        let unpacked = msg.decode(b"\x08\x01\x08\x02", &set);
        assert_eq!(unpacked.fields.len(), 2);
        assert_eq!(unpacked.fields[1].value, Value::Int32(2));

        let kind = set.get_enum("test.Kind").unwrap().self_ref;
        let kinds = msg.decode(b"\x12\x02\x00\x01", &set);
        assert_eq!(
            kinds.fields[0].value,
            Value::Packed(PackedArray::Enum(kind, vec![0, 1]))
        );
    }

    #[test]
    fn invalid_utf8_is_unknown()
    {
        let set = set();
        let msg = set.get_message("test.Scalars").unwrap();

        let value = msg.decode(b"\x2a\x02\xff\xfe", &set);
        assert_eq!(
            value.fields[0].value,
            Value::Unknown(UnknownValue::VariableLength(Bytes::from_static(
                b"\xff\xfe"
            )))
        );
        assert!(value.is_well_formed());
    }

    #[test]
    fn overrun_is_incomplete()
    {
        let set = set();
        let msg = set.get_message("test.Scalars").unwrap();

        let value = msg.decode(b"\x08\x01\x2a\x10abc", &set);
        assert_eq!(value.fields[0].value, Value::Int32(1));
        assert_eq!(
            value.fields[1].value,
            Value::Incomplete(Bytes::from_static(b"\x10abc"))
        );
        assert!(!value.is_well_formed());
    }

    #[test]
    fn wire_type_mismatch_is_unknown()
    {
        let set = set();
        let msg = set.get_message("test.Scalars").unwrap();

        let value = msg.decode(b"\x0d\x01\x02\x03\x04", &set);
        assert_eq!(
            value.fields[0].value,
            Value::Unknown(UnknownValue::Fixed32(0x0403_0201))
        );
    }

    #[test]
    fn garbage_and_invalid()
    {
        let set = set();
        let msg = set.get_message("test.Scalars").unwrap();

        let zero_field = msg.decode(b"\x00\x01", &set);
        assert_eq!(zero_field.garbage, Some(Bytes::from_static(b"\x00\x01")));
        assert!(!zero_field.is_well_formed());

        let truncated_tag = msg.decode(b"\x08\x01\xff", &set);
        assert_eq!(truncated_tag.garbage, Some(Bytes::from_static(b"\xff")));

        let invalid = msg.decode(b"\x0e\x01\x02", &set);
        assert_eq!(
            invalid.fields[0].value,
            Value::Unknown(UnknownValue::Invalid(Bytes::from_static(b"\x01\x02")))
        );
        assert!(!invalid.is_well_formed());

        let stray_end = msg.decode(b"\x44", &set);
        assert_eq!(
            stray_end.fields[0].value,
            Value::Unknown(UnknownValue::Invalid(Bytes::new()))
        );
    }

    #[test]
    fn groups()
    {
        let set = SchemaSet::parse(&[r#"
            syntax = "proto2";
            message Search {
                repeated group Result = 1 {
                    required string url = 2;
                    optional group Meta = 3 { optional int32 rank = 4; }
                }
                optional int32 total = 5;
            }
        "#])
        .unwrap();
        let msg = set.get_message("Search").unwrap();

        let value = msg.decode(b"\x0b\x12\x01a\x1b\x20\x07\x1c\x0c\x28\x02", &set);
        assert!(value.is_well_formed());
        assert_eq!(value.fields.len(), 2);
        assert_eq!(value.fields[1].value, Value::Int32(2));

        let result = match &value.fields[0].value {
            Value::Message(m) => m,
            other => panic!("Expected group: {:?}", other),
        };
        assert_eq!(
            result.msg_ref,
            set.get_message("Search.Result").unwrap().self_ref
        );
        assert_eq!(result.fields[0].value, Value::String("a".to_string()));
        let meta = match &result.fields[1].value {
            Value::Message(m) => m,
            other => panic!("Expected group: {:?}", other),
        };
        assert_eq!(meta.fields[0].value, Value::Int32(7));
    }

    #[test]
    fn unknown_groups_are_skipped()
    {
        let set = set();
        let msg = set.get_message("test.Scalars").unwrap();

        // Field 8 is undeclared, field 1 is declared as int32.
        let value = msg.decode(b"\x43\x08\x01\x53\x54\x44\x0b\x0c\x08\x05", &set);
        assert!(value.is_well_formed());
        assert_eq!(
            value.fields[0].value,
            Value::Unknown(UnknownValue::Group(Bytes::from_static(b"\x08\x01\x53\x54")))
        );
        assert_eq!(
            value.fields[1].value,
            Value::Unknown(UnknownValue::Group(Bytes::new()))
        );
        assert_eq!(value.fields[2].value, Value::Int32(5));

        let unterminated = msg.decode(b"\x43\x08\x01", &set);
        assert_eq!(
            unterminated.fields[0].value,
            Value::Incomplete(Bytes::from_static(b"\x08\x01"))
        );
        assert!(!unterminated.is_well_formed());

        let mismatched = msg.decode(b"\x43\x08\x01\x4c", &set);
        assert!(matches!(mismatched.fields[0].value, Value::Incomplete(..)));
    }

    #[test]
    fn overlong_varint()
    {
        let mut data: &[u8] = &[0xff; 11];
        assert_eq!(read_varint(&mut data), None);
        assert_eq!(data.len(), 11);

        let mut data: &[u8] = b"\xac\x02rest";
        assert_eq!(read_varint(&mut data), Some(300));
        assert_eq!(data, b"rest");
    }

    #[test]
    fn nested()
    {
        let set = set();
        let msg = set.get_message("test.Outer").unwrap();

        let value = msg.decode(b"\x0a\x02\x08\x05\x12\x04\x0a\x02\x08\x06", &set);
        assert!(value.is_well_formed());

        let inner = match &value.fields[0].value {
            Value::Message(m) => m,
            other => panic!("Expected message: {:?}", other),
        };
        assert_eq!(inner.fields[0].value, Value::Int32(5));

        let next = match &value.fields[1].value {
            Value::Message(m) => m,
            other => panic!("Expected message: {:?}", other),
        };
        assert!(matches!(next.fields[0].value, Value::Message(..)));
    }

    #[test]
    fn deep_nesting_stops()
    {
        let set = set();
        let msg = set.get_message("test.Outer").unwrap();

        // Build Outer { next: Outer { next: ... } } well past the depth limit.
        let mut payload: Vec<u8> = vec![];
        for _ in 0..(MAX_DEPTH + 10) {
            let mut wrapped = vec![0x12];
            let mut len = payload.len();
            while len >= 0x80 {
                wrapped.push((len as u8 & 0x7f) | 0x80);
                len >>= 7;
            }
            wrapped.push(len as u8);
            wrapped.extend_from_slice(&payload);
            payload = wrapped;
        }

        let value = msg.decode(&payload, &set);
        assert!(value.is_well_formed());
    }
}
