use bytes::{BufMut, Bytes, BytesMut};
use log::debug;
use pest::{
    iterators::{Pair, Pairs},
    Parser,
};
use snafu::ResultExt;

use super::builder::*;
use super::*;

#[derive(pest_derive::Parser)]
#[grammar = "proto.pest"]
struct ProtoParser;

/// Largest field number allowed by the wire format.
const MAX_FIELD_NUMBER: u64 = (1 << 29) - 1;

impl SchemaSet
{
    /// Parses the files strictly, without any lenient repairs, and builds a schema set.
    ///
    /// The files are anonymous. Syntax errors name them by their position in the input.
    pub fn parse<T, S>(files: T) -> Result<Self, CompileError>
    where
        T: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let builder = SchemaBuilder {
            files: files
                .into_iter()
                .enumerate()
                .map(|(i, f)| FileBuilder::parse_str(&format!("<input {}>", i), f.as_ref()))
                .collect::<Result<_, _>>()?,
        };

        builder.build()
    }

    /// Compiles a set of named `.proto` sources into a schema set.
    ///
    /// Each source goes through the [lenient](super::lenient) rewrites first. All files are then
    /// built together so types may refer to types declared in the other files.
    pub fn compile<I, N, S>(files: I) -> Result<Self, CompileError>
    where
        I: IntoIterator<Item = (N, S)>,
        N: AsRef<str>,
        S: AsRef<str>,
    {
        let builder = SchemaBuilder {
            files: files
                .into_iter()
                .map(|(name, source)| {
                    let repaired = lenient::repair(source.as_ref());
                    FileBuilder::parse_str(name.as_ref(), &repaired)
                })
                .collect::<Result<_, _>>()?,
        };

        builder.build()
    }
}

impl FileBuilder
{
    pub fn parse_str(file: &str, input: &str) -> Result<Self, CompileError>
    {
        let pairs = ProtoParser::parse(Rule::proto, input)
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
            .context(Syntax { file })?;

        let mut current_file = FileBuilder::default();
        for pair in pairs {
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::syntax => current_file.syntax = parse_syntax(inner),
                    Rule::topLevelDef => {
                        if let Some(item) = ProtobufItemBuilder::parse(inner)? {
                            current_file.types.push(item);
                        }
                    }
                    Rule::import => {
                        let path = inner
                            .into_inner()
                            .find(|p| p.as_rule() == Rule::strLit)
                            .map(parse_string_literal)
                            .transpose()?
                            .unwrap_or_default();
                        current_file
                            .imports
                            .push(String::from_utf8_lossy(&path).into_owned());
                    }
                    Rule::package => {
                        current_file.package =
                            Some(inner.into_inner().next().unwrap().as_str().to_string())
                    }
                    Rule::option => {}
                    Rule::emptyStatement => {}
                    Rule::EOI => {}
                    r => unreachable!("{:?}: {:?}", r, inner),
                }
            }
        }

        if !current_file.imports.is_empty() {
            debug!("'{}' imports {:?}", file, current_file.imports);
        }

        Ok(current_file)
    }
}

fn parse_syntax(p: Pair<Rule>) -> SourceSyntax
{
    if p.as_str().starts_with("edition") {
        return SourceSyntax::Editions;
    }

    match p.into_inner().next().map(|s| s.as_str().trim_matches(|c| c == '"' || c == '\'')) {
        Some("proto3") => SourceSyntax::Proto3,
        _ => SourceSyntax::Proto2,
    }
}

impl ProtobufItemBuilder
{
    /// Parses a top level definition. `extend` blocks are accepted but carry nothing needed for
    /// decoding, so they produce `None`.
    pub fn parse(p: Pair<Rule>) -> Result<Option<Self>, CompileError>
    {
        let pair = p.into_inner().next().unwrap();
        Ok(Some(match pair.as_rule() {
            Rule::message => {
                ProtobufItemBuilder::Type(ProtobufTypeBuilder::Message(MessageBuilder::parse(pair)?))
            }
            Rule::enum_ => {
                ProtobufItemBuilder::Type(ProtobufTypeBuilder::Enum(EnumBuilder::parse(pair)?))
            }
            Rule::service => ProtobufItemBuilder::Service(ServiceBuilder::parse(pair)?),
            Rule::extend => return Ok(None),
            r => unreachable!("{:?}: {:?}", r, pair),
        }))
    }
}

impl MessageBuilder
{
    pub fn parse(p: Pair<Rule>) -> Result<Self, CompileError>
    {
        let mut inner = p.into_inner();
        let name = inner.next().unwrap().as_str().to_string();
        Self::parse_body(name, inner.next().unwrap())
    }

    fn parse_body(name: String, body: Pair<Rule>) -> Result<Self, CompileError>
    {
        let mut fields = vec![];
        let mut oneofs = vec![];
        let mut inner_types = vec![];
        let mut options = vec![];
        for p in body.into_inner() {
            match p.as_rule() {
                Rule::field => fields.push(FieldBuilder::parse(p)?),
                Rule::enum_ => inner_types.push(InnerTypeBuilder::Enum(EnumBuilder::parse(p)?)),
                Rule::message => {
                    inner_types.push(InnerTypeBuilder::Message(MessageBuilder::parse(p)?))
                }
                Rule::option => options.push(ProtoOption::parse(p)?),
                Rule::oneof => oneofs.push(OneofBuilder::parse(p, &mut inner_types)?),
                Rule::mapField => {
                    let (field, entry) = FieldBuilder::parse_map(p)?;
                    fields.push(field);
                    inner_types.push(InnerTypeBuilder::Message(entry));
                }
                Rule::group => {
                    let (field, group) = FieldBuilder::parse_group(p)?;
                    fields.push(field);
                    inner_types.push(InnerTypeBuilder::Message(group));
                }
                // Reserved numbers and extension ranges don't affect decoding.
                Rule::reserved | Rule::extensions | Rule::extend => {}
                Rule::emptyStatement => {}
                r => unreachable!("{:?}: {:?}", r, p),
            }
        }

        Ok(MessageBuilder {
            name,
            fields,
            oneofs,
            inner_types,
            options,
            map_entry: false,
        })
    }
}

impl EnumBuilder
{
    fn parse(p: Pair<Rule>) -> Result<EnumBuilder, CompileError>
    {
        let mut inner = p.into_inner();
        let name = inner.next().unwrap().as_str().to_string();

        let mut fields = vec![];
        let mut options = vec![];
        let body = inner.next().unwrap();
        for p in body.into_inner() {
            match p.as_rule() {
                Rule::enumField => {
                    let mut inner = p.into_inner();
                    fields.push(EnumField {
                        name: inner.next().unwrap().as_str().to_string(),
                        value: parse_int_literal(inner.next().unwrap())?,
                        options: match inner.next() {
                            Some(p) => ProtoOption::parse_options(p.into_inner())?,
                            None => vec![],
                        },
                    })
                }
                Rule::option => options.push(ProtoOption::parse(p)?),
                Rule::reserved => {}
                Rule::emptyStatement => {}
                r => unreachable!("{:?}: {:?}", r, p),
            }
        }

        Ok(EnumBuilder {
            name,
            fields,
            options,
        })
    }
}

impl ServiceBuilder
{
    pub fn parse(p: Pair<Rule>) -> Result<Self, CompileError>
    {
        let mut inner = p.into_inner();
        let name = inner.next().unwrap();
        let mut rpcs = vec![];
        let mut options = vec![];
        for p in inner {
            match p.as_rule() {
                Rule::option => options.push(ProtoOption::parse(p)?),
                Rule::rpc => rpcs.push(RpcBuilder::parse(p)?),
                Rule::emptyStatement => {}
                r => unreachable!("{:?}: {:?}", r, p),
            }
        }

        Ok(ServiceBuilder {
            name: name.as_str().to_string(),
            rpcs,
            options,
        })
    }
}

impl FieldBuilder
{
    pub fn parse(p: Pair<Rule>) -> Result<Self, CompileError>
    {
        let mut inner = p.into_inner().peekable();
        let label = match inner.peek().map(|p| p.as_rule()) {
            Some(Rule::label) => parse_label(inner.next().unwrap()),
            _ => Label::None,
        };

        let field_type = parse_field_type(inner.next().unwrap().as_str());
        let name = inner.next().unwrap().as_str().to_string();
        let number = parse_field_number(inner.next().unwrap())?;

        let options = match inner.next() {
            Some(p) => ProtoOption::parse_options(p.into_inner())?,
            None => vec![],
        };

        Ok(FieldBuilder {
            label,
            field_type,
            name,
            number,
            options,
        })
    }

    pub fn parse_oneof(p: Pair<Rule>) -> Result<Self, CompileError>
    {
        let mut inner = p.into_inner();
        let field_type = parse_field_type(inner.next().unwrap().as_str());
        let name = inner.next().unwrap().as_str().to_string();
        let number = parse_field_number(inner.next().unwrap())?;

        let options = match inner.next() {
            Some(p) => ProtoOption::parse_options(p.into_inner())?,
            None => vec![],
        };

        Ok(FieldBuilder {
            label: Label::None,
            field_type,
            name,
            number,
            options,
        })
    }

    /// Parses a `map<K, V>` field into the repeated entry field and the synthesized entry
    /// message, the same shape protoc generates for maps.
    pub fn parse_map(p: Pair<Rule>) -> Result<(Self, MessageBuilder), CompileError>
    {
        let mut inner = p.into_inner();
        let key_type = parse_field_type(inner.next().unwrap().as_str());
        let value_type = parse_field_type(inner.next().unwrap().as_str());
        let name = inner.next().unwrap().as_str().to_string();
        let number = parse_field_number(inner.next().unwrap())?;

        let options = match inner.next() {
            Some(p) => ProtoOption::parse_options(p.into_inner())?,
            None => vec![],
        };

        let entry_name = map_entry_name(&name);
        let entry = MessageBuilder {
            name: entry_name.clone(),
            fields: vec![
                FieldBuilder {
                    label: Label::None,
                    field_type: key_type,
                    name: "key".to_string(),
                    number: 1,
                    options: vec![],
                },
                FieldBuilder {
                    label: Label::None,
                    field_type: value_type,
                    name: "value".to_string(),
                    number: 2,
                    options: vec![],
                },
            ],
            map_entry: true,
            ..Default::default()
        };

        let field = FieldBuilder {
            label: Label::Repeated,
            field_type: FieldTypeBuilder::Unknown(entry_name),
            name,
            number,
            options,
        };

        Ok((field, entry))
    }

    /// Parses a proto2 `group` into its field and the nested message holding the group body.
    ///
    /// The message takes the group's name and the field is named after it in lower case.
    pub fn parse_group(p: Pair<Rule>) -> Result<(Self, MessageBuilder), CompileError>
    {
        let mut inner = p.into_inner().peekable();
        let label = match inner.peek().map(|p| p.as_rule()) {
            Some(Rule::label) => parse_label(inner.next().unwrap()),
            _ => Label::None,
        };

        inner.next(); // groupKw
        let group_name = inner.next().unwrap().as_str().to_string();
        let number = parse_field_number(inner.next().unwrap())?;

        let mut options = vec![];
        let mut body = inner.next().unwrap();
        if body.as_rule() == Rule::fieldOptions {
            options = ProtoOption::parse_options(body.into_inner())?;
            body = inner.next().unwrap();
        }

        let field = FieldBuilder {
            label,
            field_type: FieldTypeBuilder::Group(group_name.clone()),
            name: group_name.to_lowercase(),
            number,
            options,
        };
        let group = MessageBuilder::parse_body(group_name, body)?;

        Ok((field, group))
    }
}

fn parse_label(p: Pair<Rule>) -> Label
{
    match p.as_str() {
        "repeated" => Label::Repeated,
        "optional" => Label::Optional,
        "required" => Label::Required,
        l => unreachable!("Unknown label {:?}", l),
    }
}

/// `foo_bar` becomes `FooBarEntry`.
fn map_entry_name(field_name: &str) -> String
{
    let mut name = String::with_capacity(field_name.len() + 5);
    let mut upper = true;
    for c in field_name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            name.extend(c.to_uppercase());
            upper = false;
        } else {
            name.push(c);
        }
    }
    name.push_str("Entry");
    name
}

impl OneofBuilder
{
    /// Parses a `oneof`. Messages declared by groups inside it go to `inner_types`.
    pub fn parse(
        p: Pair<Rule>,
        inner_types: &mut Vec<InnerTypeBuilder>,
    ) -> Result<Self, CompileError>
    {
        let mut inner = p.into_inner();
        let name = inner.next().unwrap().as_str().to_string();
        let mut options = Vec::new();
        let mut fields = vec![];
        for p in inner {
            match p.as_rule() {
                Rule::option => options.push(ProtoOption::parse(p)?),
                Rule::oneofField => fields.push(FieldBuilder::parse_oneof(p)?),
                Rule::group => {
                    let (mut field, group) = FieldBuilder::parse_group(p)?;
                    field.label = Label::None;
                    fields.push(field);
                    inner_types.push(InnerTypeBuilder::Message(group));
                }
                Rule::emptyStatement => {}
                r => unreachable!("{:?}: {:?}", r, p),
            }
        }
        Ok(OneofBuilder {
            name,
            fields,
            options,
        })
    }
}

fn parse_field_type(t: &str) -> FieldTypeBuilder
{
    FieldTypeBuilder::Builtin(match t {
        "double" => ValueType::Double,
        "float" => ValueType::Float,
        "int32" => ValueType::Int32,
        "int64" => ValueType::Int64,
        "uint32" => ValueType::UInt32,
        "uint64" => ValueType::UInt64,
        "sint32" => ValueType::SInt32,
        "sint64" => ValueType::SInt64,
        "fixed32" => ValueType::Fixed32,
        "fixed64" => ValueType::Fixed64,
        "sfixed32" => ValueType::SFixed32,
        "sfixed64" => ValueType::SFixed64,
        "bool" => ValueType::Bool,
        "string" => ValueType::String,
        "bytes" => ValueType::Bytes,
        _ => return FieldTypeBuilder::Unknown(t.to_string()),
    })
}

impl RpcBuilder
{
    pub fn parse(p: Pair<Rule>) -> Result<Self, CompileError>
    {
        let mut inner = p.into_inner();
        let name = inner.next().unwrap();

        let input = RpcArgBuilder::parse(inner.next().unwrap());
        let output = RpcArgBuilder::parse(inner.next().unwrap());

        let mut options = vec![];
        for p in inner {
            match p.as_rule() {
                Rule::option => options.push(ProtoOption::parse(p)?),
                Rule::emptyStatement => {}
                r => unreachable!("{:?}: {:?}", r, p),
            }
        }

        Ok(RpcBuilder {
            name: name.as_str().to_string(),
            input,
            output,
            options,
        })
    }
}

impl RpcArgBuilder
{
    pub fn parse(p: Pair<Rule>) -> Self
    {
        let mut arg = RpcArgBuilder::default();
        for inner in p.into_inner() {
            match inner.as_rule() {
                Rule::stream => arg.stream = true,
                Rule::typeName => arg.message = inner.as_str().to_string(),
                r => unreachable!("{:?}: {:?}", r, inner),
            }
        }
        arg
    }
}

fn invalid_literal(p: &Pair<Rule>) -> CompileError
{
    CompileError::InvalidLiteral {
        literal: p.as_str().to_string(),
    }
}

/// Parses the sign and the magnitude of an `intLit`.
fn parse_int_parts(p: Pair<Rule>) -> Result<(bool, u64), CompileError>
{
    let original = p.clone();
    let mut inner = p.into_inner();
    let first = inner.next().unwrap();
    let (negative, lit) = match first.as_rule() {
        Rule::sign => (first.as_str() == "-", inner.next().unwrap()),
        _ => (false, first),
    };

    let magnitude = match lit.as_rule() {
        Rule::decimalLit => lit.as_str().parse::<u64>().ok(),
        Rule::octalLit => match &lit.as_str()[1..] {
            "" => Some(0),
            digits => u64::from_str_radix(digits, 8).ok(),
        },
        Rule::hexLit => u64::from_str_radix(&lit.as_str()[2..], 16).ok(),
        r => unreachable!("{:?}: {:?}", r, lit),
    };

    magnitude
        .map(|m| (negative, m))
        .ok_or_else(|| invalid_literal(&original))
}

pub fn parse_field_number(p: Pair<Rule>) -> Result<u64, CompileError>
{
    let original = p.clone();
    match parse_int_parts(p)? {
        (false, n) if n >= 1 && n <= MAX_FIELD_NUMBER => Ok(n),
        _ => Err(invalid_literal(&original)),
    }
}

pub fn parse_int_literal(p: Pair<Rule>) -> Result<i64, CompileError>
{
    let original = p.clone();
    match parse_int_parts(p)? {
        (true, m) if m <= 1 << 63 => Ok((m as i64).wrapping_neg()),
        (true, _) => Err(invalid_literal(&original)),

        // Unsigned 64-bit defaults keep their bit pattern.
        (false, m) => Ok(m as i64),
    }
}

pub fn parse_float_literal(p: Pair<Rule>) -> Result<f64, CompileError>
{
    p.as_str()
        .parse::<f64>()
        .map_err(|_| invalid_literal(&p))
}

impl ProtoOption
{
    fn parse(p: Pair<Rule>) -> Result<Self, CompileError>
    {
        let mut inner = p.into_inner();
        Ok(Self {
            name: parse_ident(inner.next().unwrap()),
            value: Constant::parse(inner.next().unwrap())?,
        })
    }

    fn parse_options(pairs: Pairs<Rule>) -> Result<Vec<Self>, CompileError>
    {
        pairs
            .map(|p| match p.as_rule() {
                Rule::fieldOption => Self::parse(p),
                Rule::option => Self::parse(p),
                r => unreachable!("{:?}: {:?}", r, p),
            })
            .collect()
    }
}

impl Constant
{
    fn parse(p: Pair<Rule>) -> Result<Self, CompileError>
    {
        let mut inner = p.into_inner();
        let first = inner.next().unwrap();
        Ok(match first.as_rule() {
            Rule::fullIdent => Constant::Ident(parse_ident(first)),
            Rule::intLit => Constant::Integer(parse_int_literal(first)?),
            Rule::floatLit => Constant::Float(parse_float_literal(first)?),
            Rule::boolLit => Constant::Bool(first.as_str() == "true"),
            Rule::aggregate => Constant::Aggregate(first.as_str().to_string()),
            Rule::strLit => {
                // Adjacent string literals concatenate.
                let mut output = BytesMut::new();
                output.put(parse_string_literal(first)?);
                for next in inner {
                    output.put(parse_string_literal(next)?);
                }
                Constant::String(output.freeze())
            }
            r => unreachable!("{:?}: {:?}", r, first),
        })
    }
}

fn parse_ident(p: Pair<Rule>) -> String
{
    let mut ident = vec![];
    let mut inner = p.into_inner();

    let first = inner.next().unwrap();
    match first.as_rule() {
        Rule::ident => ident.push(first.as_str().to_string()),
        Rule::fullIdent => ident.push(format!("({})", parse_ident(first))),
        r => unreachable!("{:?}: {:?}", r, first),
    }

    for other in inner {
        match other.as_rule() {
            Rule::ident => ident.push(other.as_str().to_string()),
            r => unreachable!("{:?}: {:?}", r, other),
        }
    }

    ident.join(".")
}

fn parse_string_literal(s: Pair<Rule>) -> Result<Bytes, CompileError>
{
    let original = s.clone();
    let inner = s.into_inner();
    let mut output = BytesMut::new();
    for c in inner {
        let c = c.into_inner().next().unwrap();
        match c.as_rule() {
            Rule::hexEscape => {
                let digits = c.into_inner().next().unwrap().as_str();
                let byte =
                    u8::from_str_radix(digits, 16).map_err(|_| invalid_literal(&original))?;
                output.put_u8(byte);
            }
            Rule::octEscape => {
                let digits = c.into_inner().next().unwrap().as_str();
                let byte = u8::from_str_radix(digits, 8).map_err(|_| invalid_literal(&original))?;
                output.put_u8(byte);
            }
            Rule::charEscape => match c.into_inner().next().unwrap().as_str() {
                "a" => output.put_u8(0x07),
                "b" => output.put_u8(0x08),
                "f" => output.put_u8(0x0C),
                "n" => output.put_u8(0x0A),
                "r" => output.put_u8(0x0D),
                "t" => output.put_u8(0x09),
                "v" => output.put_u8(0x0B),
                "\\" => output.put_u8(0x5C),
                "\'" => output.put_u8(0x27),
                "\"" => output.put_u8(0x22),
                "?" => output.put_u8(0x3F),
                o => unreachable!("Invalid escape sequence \\{}", o),
            },
            Rule::dqPlain | Rule::sqPlain => output.put(c.as_str().as_bytes()),
            r => unreachable!("{:?}: {:?}", r, c),
        }
    }
    Ok(output.freeze())
}
