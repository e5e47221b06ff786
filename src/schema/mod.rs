//! Compiled schema sets built from `.proto` source text.
//!
//! A [`SchemaSet`] is produced in one go from a collection of named source files and is never
//! modified afterwards. Changing the schema means compiling a new set.

use bytes::Bytes;
use snafu::Snafu;
use std::collections::{BTreeMap, HashMap};

mod api;
mod builder;
pub mod lenient;
mod parse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct InternalRef(usize);

/// A reference to a message. Can be resolved to `MessageInfo` through a `SchemaSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef(InternalRef);

/// A reference to an enum. Can be resolved to `EnumInfo` through a `SchemaSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumRef(InternalRef);

/// A reference to a oneof within its owning message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OneofRef(InternalRef);

/// Schema compilation error.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum CompileError
{
    /// Syntax error in one of the input files.
    #[snafu(display("Syntax error in '{}': {}", file, source))]
    Syntax
    {
        /// Name of the file that failed to parse.
        file: String,

        /// Source error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Two types share the same fully qualified name.
    #[snafu(display("Duplicate type: {}", name))]
    DuplicateType
    {
        /// Type.
        name: String,
    },

    /// Unknown type reference.
    #[snafu(display("Unknown type '{}' in '{}'", name, context))]
    TypeNotFound
    {
        /// Type name.
        name: String,
        /// Type that referred to the unknown type.
        context: String,
    },

    /// Wrong kind of type used in a specific context.
    #[snafu(display(
        "Invalid type '{}' ({:?}) for {}, expected {:?}",
        type_name,
        actual,
        context,
        expected
    ))]
    InvalidTypeKind
    {
        /// Type that is of the wrong kind.
        type_name: String,

        /// The context where the type was used.
        context: &'static str,

        /// Expected item type.
        expected: ItemType,

        /// Actual item type.
        actual: ItemType,
    },

    /// Two fields of a message use the same field number.
    #[snafu(display("Field number {} is used more than once in '{}'", number, message))]
    DuplicateFieldNumber
    {
        /// Message containing the fields.
        message: String,

        /// Conflicting number.
        number: u64,
    },

    /// Two fields of a message use the same name.
    #[snafu(display("Field name '{}' is used more than once in '{}'", name, message))]
    DuplicateFieldName
    {
        /// Message containing the fields.
        message: String,

        /// Conflicting name.
        name: String,
    },

    /// An enum value name is already defined in the same scope.
    ///
    /// Enum values are scoped to the enclosing message or package, not to the enum itself, so
    /// two sibling enums may not declare the same value name.
    #[snafu(display("Enum value '{}' is already defined in '{}'", name, scope))]
    DuplicateEnumValue
    {
        /// Value name.
        name: String,

        /// Enclosing scope.
        scope: String,
    },

    /// A numeric literal is out of range.
    #[snafu(display("Invalid literal '{}'", literal))]
    InvalidLiteral
    {
        /// The literal as written in the source.
        literal: String,
    },
}

/// Type reference that references either message or enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeRef
{
    /// Message type reference.
    Message(MessageRef),

    /// Enum type reference.
    Enum(EnumRef),
}

/// Protobuf item type
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ItemType
{
    /// `message` item
    Message,

    /// `enum` item
    Enum,

    /// `service` item
    Service,
}

/// Compiled message and enum descriptors keyed by fully qualified name.
///
/// Built by [`SchemaSet::compile`] and immutable afterwards.
#[derive(Default, Debug, PartialEq)]
pub struct SchemaSet
{
    types: Vec<TypeInfo>,
    types_by_name: HashMap<String, usize>,
    services: Vec<Service>,
    services_by_name: HashMap<String, usize>,

    // Sorted on build so listing doesn't need to sort again.
    message_names: Vec<String>,
}

/// Message or enum type.
#[derive(Debug, PartialEq)]
pub enum TypeInfo
{
    /// Message.
    Message(MessageInfo),

    /// Enum.
    Enum(EnumInfo),
}

/// Message details
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub struct MessageInfo
{
    /// Message name.
    pub name: String,

    /// Full message name, including package and parent type names.
    pub full_name: String,

    /// `MessageRef` that references this message.
    pub self_ref: MessageRef,

    /// `oneof` structures defined within the message.
    pub oneofs: Vec<Oneof>,

    /// References to the inner types defined within this message.
    pub inner_types: Vec<TypeRef>,

    /// True for the entry messages synthesized for `map<K, V>` fields.
    pub map_entry: bool,

    /// Message options.
    pub options: Vec<ProtoOption>,

    // Using BTreeMap here to ensure ordering.
    fields: BTreeMap<u64, MessageField>,
    fields_by_name: BTreeMap<String, u64>,
}

/// Enum details
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub struct EnumInfo
{
    /// Enum name.
    pub name: String,

    /// Full enum name, including package and parent type names.
    pub full_name: String,

    /// `EnumRef` that references this enum.
    pub self_ref: EnumRef,

    fields_by_value: BTreeMap<i64, EnumField>,
    fields_by_name: BTreeMap<String, i64>,
}

/// Message field details.
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub struct MessageField
{
    /// Field name.
    pub name: String,

    /// Field number.
    pub number: u64,

    /// Field type
    pub field_type: ValueType,

    /// Whether the field is singular or repeated.
    pub multiplicity: Multiplicity,

    /// Field options.
    pub options: Vec<ProtoOption>,

    /// The `oneof` structure in the parent type if this field is part of a `oneof`.
    pub oneof: Option<OneofRef>,
}

/// Defines the multiplicity of the field values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Multiplicity
{
    /// Field is not repeated.
    Single,

    /// Field is not repeated and has explicit presence.
    Optional,

    /// Field may be repeated.
    Repeated,

    /// Field is repeated by packing.
    RepeatedPacked,
}

/// Message `oneof` details.
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub struct Oneof
{
    /// Name of the `oneof` structure.
    pub name: String,

    /// Self reference of the `Oneof` in the owning type.
    pub self_ref: OneofRef,

    /// Field numbers of the fields contained in the `oneof`.
    pub fields: Vec<u64>,

    /// Options.
    pub options: Vec<ProtoOption>,
}

/// Enum field details.
#[derive(Debug, PartialEq, Clone)]
#[non_exhaustive]
pub struct EnumField
{
    /// Enum field name.
    pub name: String,

    /// Enum field value.
    pub value: i64,

    /// Options.
    pub options: Vec<ProtoOption>,
}

/// Field value types.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueType
{
    /// `double`
    Double,

    /// `float`
    Float,

    /// `int32`
    Int32,

    /// `int64`
    Int64,

    /// `uint32`
    UInt32,

    /// `uint64`
    UInt64,

    /// `sint32`
    SInt32,

    /// `sint64`
    SInt64,

    /// `fixed32`
    Fixed32,

    /// `fixed64`
    Fixed64,

    /// `sfixed32`
    SFixed32,

    /// `sfixed64`
    SFixed64,

    /// `bool`
    Bool,

    /// `string`
    String,

    /// `bytes`
    Bytes,

    /// A message type.
    Message(MessageRef),

    /// An enum type.
    Enum(EnumRef),

    /// A proto2 group. The value is a message delimited by start and end group tags instead
    /// of a length prefix.
    Group(MessageRef),
}

/// Service details
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub struct Service
{
    /// Service name.
    pub name: String,

    /// Full service name, including the package name.
    pub full_name: String,

    /// List of `rpc` operations defined in the service.
    pub rpcs: Vec<Rpc>,

    /// Options.
    pub options: Vec<ProtoOption>,

    rpcs_by_name: HashMap<String, usize>,
}

/// Rpc operation
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub struct Rpc
{
    /// Operation name.
    pub name: String,

    /// Input details.
    pub input: RpcArg,

    /// Output details.
    pub output: RpcArg,

    /// Options.
    pub options: Vec<ProtoOption>,
}

/// Rpc operation input or output details.
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub struct RpcArg
{
    /// References to the message type.
    pub message: MessageRef,

    /// True, if this is a stream.
    pub stream: bool,
}

/// A single option.
#[derive(Debug, PartialEq, Clone)]
pub struct ProtoOption
{
    /// Option name.
    pub name: String,

    /// Option value.
    pub value: Constant,
}

/// Constant value, used for options.
#[derive(Debug, PartialEq, Clone)]
pub enum Constant
{
    /// An ident `foo.bar.baz`.
    Ident(String),

    /// An integer constant.
    Integer(i64),

    /// A floating point constant.
    Float(f64),

    /// A string constant.
    ///
    /// The string isn't guaranteed to be well formed UTF-8 so it's stored as
    /// Bytes here.
    String(Bytes),

    /// A boolean constant.
    Bool(bool),

    /// A text format message literal, `{ name: "value" }`, kept as written.
    Aggregate(String),
}

#[cfg(test)]
mod test
{
    use super::*;

    #[test]
    fn nested_names()
    {
        let set = SchemaSet::parse(&[r#"
            syntax = "proto3";
            package outer.pkg;
            message Message {
                message Inner {}
                enum Kind { KIND_UNSPECIFIED = 0; }
            }
        "#])
        .unwrap();

        let m = set.get_message("outer.pkg.Message").unwrap();
        assert_eq!(m.inner_types.len(), 2);
        assert!(set.get_message("outer.pkg.Message.Inner").is_some());
        assert!(set.get_enum("outer.pkg.Message.Kind").is_some());
        assert!(set.get_message("outer.pkg.Message.Kind").is_none());
    }

    #[test]
    fn multiple_packages()
    {
        let set = SchemaSet::parse(&[
            r#"
                syntax = "proto3";
                package First;
                message Message {}
            "#,
            r#"
                syntax = "proto3";
                package Second;
                message Message { First.Message other = 1; }
            "#,
        ])
        .unwrap();

        assert_eq!(
            set.message_types(),
            &["First.Message".to_string(), "Second.Message".to_string()]
        );

        let first = set.get_message("First.Message").unwrap();
        let second = set.get_message("Second.Message").unwrap();
        assert_eq!(
            second.get_field(1).unwrap().field_type,
            ValueType::Message(first.self_ref)
        );
    }
}
