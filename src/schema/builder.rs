use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use super::*;

#[derive(Default)]
pub(crate) struct SchemaBuilder
{
    pub(crate) files: Vec<FileBuilder>,
}

#[derive(Default, Debug, PartialEq)]
pub(crate) struct FileBuilder
{
    pub(crate) syntax: SourceSyntax,
    pub(crate) package: Option<String>,
    pub(crate) imports: Vec<String>,
    pub(crate) types: Vec<ProtobufItemBuilder>,
}

/// Source syntax of a file. Only affects the packing default of repeated scalars.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum SourceSyntax
{
    Proto2,
    Proto3,
    Editions,
}

impl Default for SourceSyntax
{
    fn default() -> Self
    {
        // protoc treats files without a syntax statement as proto2.
        SourceSyntax::Proto2
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum ProtobufItemBuilder
{
    Type(ProtobufTypeBuilder),
    Service(ServiceBuilder),
}

#[derive(Debug, PartialEq)]
pub(crate) enum ProtobufTypeBuilder
{
    Message(MessageBuilder),
    Enum(EnumBuilder),
}

#[derive(Default, Debug, PartialEq, Clone)]
pub(crate) struct MessageBuilder
{
    pub(crate) name: String,
    pub(crate) fields: Vec<FieldBuilder>,
    pub(crate) oneofs: Vec<OneofBuilder>,
    pub(crate) inner_types: Vec<InnerTypeBuilder>,
    pub(crate) options: Vec<ProtoOption>,
    pub(crate) map_entry: bool,
}

#[derive(Debug, PartialEq, Clone)]
pub(crate) enum InnerTypeBuilder
{
    Message(MessageBuilder),
    Enum(EnumBuilder),
}

#[derive(Default, Debug, PartialEq, Clone)]
pub(crate) struct EnumBuilder
{
    pub(crate) name: String,
    pub(crate) fields: Vec<EnumField>,
    pub(crate) options: Vec<ProtoOption>,
}

#[derive(Default, Debug, PartialEq)]
pub(crate) struct ServiceBuilder
{
    pub(crate) name: String,
    pub(crate) rpcs: Vec<RpcBuilder>,
    pub(crate) options: Vec<ProtoOption>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Label
{
    None,
    Optional,
    Required,
    Repeated,
}

#[derive(Debug, PartialEq, Clone)]
pub(crate) struct FieldBuilder
{
    pub(crate) label: Label,
    pub(crate) field_type: FieldTypeBuilder,
    pub(crate) name: String,
    pub(crate) number: u64,
    pub(crate) options: Vec<ProtoOption>,
}

#[derive(Default, Debug, PartialEq, Clone)]
pub(crate) struct OneofBuilder
{
    pub(crate) name: String,
    pub(crate) fields: Vec<FieldBuilder>,
    pub(crate) options: Vec<ProtoOption>,
}

#[derive(Debug, PartialEq, Clone)]
pub(crate) enum FieldTypeBuilder
{
    Builtin(ValueType),
    Unknown(String),

    // Names the message declared by a proto2 group.
    Group(String),
}

#[derive(Default, Debug, PartialEq)]
pub(crate) struct RpcBuilder
{
    pub(crate) name: String,
    pub(crate) input: RpcArgBuilder,
    pub(crate) output: RpcArgBuilder,
    pub(crate) options: Vec<ProtoOption>,
}

#[derive(Default, Debug, PartialEq)]
pub(crate) struct RpcArgBuilder
{
    pub(crate) stream: bool,
    pub(crate) message: String,
}

impl SchemaBuilder
{
    pub fn build(mut self) -> Result<SchemaSet, CompileError>
    {
        let mut cache = BuildCache::default();
        for (i, f) in self.files.iter().enumerate() {
            f.populate(&mut cache, &mut vec![i])?;
        }

        // Iterate the types through the cache, since the cache has enough
        // details to find the original type, the types don't have details
        // to find the cache data without re-building the full path.
        let mut types = vec![];
        for cache_data in &cache.types {
            let ty = self.take_type(&cache_data.idx_path);
            types.push(ty.build(cache_data, &cache)?);
        }

        let services: Vec<_> = cache
            .services
            .iter()
            .map(|s| self.take_service(&s.idx_path).build(s, &cache))
            .collect::<Result<_, _>>()?;

        let types_by_name = types
            .iter()
            .enumerate()
            .map(|(idx, t)| (t.full_name().to_string(), idx))
            .collect();
        let services_by_name = services
            .iter()
            .enumerate()
            .map(|(idx, s)| (s.full_name.clone(), idx))
            .collect();

        let mut message_names: Vec<String> = types
            .iter()
            .filter_map(|t| match t {
                TypeInfo::Message(m) if !m.map_entry => Some(m.full_name.clone()),
                _ => None,
            })
            .collect();
        message_names.sort();

        Ok(SchemaSet {
            types,
            types_by_name,
            services,
            services_by_name,
            message_names,
        })
    }

    fn take_type(&mut self, idx: &[usize]) -> ProtobufTypeBuilder
    {
        self.files[idx[0]].take_type(&idx[1..])
    }

    fn take_service(&mut self, idx: &[usize]) -> ServiceBuilder
    {
        self.files[idx[0]].take_service(&idx[1..])
    }
}

impl FileBuilder
{
    fn populate(&self, cache: &mut BuildCache, idx: &mut Vec<usize>) -> Result<(), CompileError>
    {
        let mut path: Vec<&str> = match &self.package {
            Some(name) => name.split('.').collect(),
            None => vec![],
        };

        idx.push(0);
        for (i, t) in self.types.iter().enumerate() {
            *idx.last_mut().unwrap() = i;

            match t {
                ProtobufItemBuilder::Type(ProtobufTypeBuilder::Message(m)) => {
                    m.populate(cache, &mut path, idx, self.syntax)?
                }
                ProtobufItemBuilder::Type(ProtobufTypeBuilder::Enum(e)) => {
                    e.populate(cache, &mut path, idx)?
                }
                ProtobufItemBuilder::Service(s) => s.populate(cache, &mut path, idx)?,
            }
        }
        idx.pop();

        Ok(())
    }

    fn take_type(&mut self, idx: &[usize]) -> ProtobufTypeBuilder
    {
        match &mut self.types[idx[0]] {
            ProtobufItemBuilder::Type(t) => match t {
                ProtobufTypeBuilder::Message(m) => m.take_type(&idx[1..]),
                ProtobufTypeBuilder::Enum(e) => e.take_type(&idx[1..]),
            },

            // Panic here means something went wrong in populating the cache
            ProtobufItemBuilder::Service(..) => {
                panic!("Trying to take a service as a type");
            }
        }
    }

    fn take_service(&mut self, idx: &[usize]) -> ServiceBuilder
    {
        match &mut self.types[idx[0]] {
            ProtobufItemBuilder::Service(e) => std::mem::take(e),

            // Panic here means something went wrong in populating the cache
            _ => panic!("Trying to take a non-service as a service"),
        }
    }
}

impl ProtobufTypeBuilder
{
    fn build(self, self_data: &CacheData, cache: &BuildCache) -> Result<TypeInfo, CompileError>
    {
        Ok(match self {
            ProtobufTypeBuilder::Message(m) => TypeInfo::Message(m.build(self_data, cache)?),
            ProtobufTypeBuilder::Enum(e) => TypeInfo::Enum(e.build(self_data)),
        })
    }
}

impl MessageBuilder
{
    /// Lists types found in this message builder recursively into the build cache.
    ///
    /// On error the `path` and `idx` will be left in an undefined state.
    fn populate<'a>(
        &'a self,
        cache: &mut BuildCache,
        path: &mut Vec<&'a str>,
        idx: &mut Vec<usize>,
        syntax: SourceSyntax,
    ) -> Result<(), CompileError>
    {
        path.push(&self.name);
        let full_name = path.join(".");
        let cache_idx = cache.types.len();
        if cache
            .items
            .insert(full_name.clone(), (ItemType::Message, cache_idx))
            .is_some()
        {
            return Err(CompileError::DuplicateType { name: full_name });
        }

        cache.types.push(CacheData {
            item_type: ItemType::Message,
            full_name,
            idx_path: idx.clone(),
            final_idx: cache_idx,
            syntax,
        });

        idx.push(0);
        for (i, t) in self.inner_types.iter().enumerate() {
            *idx.last_mut().unwrap() = i;
            match t {
                InnerTypeBuilder::Message(m) => m.populate(cache, path, idx, syntax)?,
                InnerTypeBuilder::Enum(e) => e.populate(cache, path, idx)?,
            }
        }

        idx.pop();
        path.pop();

        Ok(())
    }

    fn take_type(&mut self, idx: &[usize]) -> ProtobufTypeBuilder
    {
        if idx.is_empty() {
            ProtobufTypeBuilder::Message(MessageBuilder {
                name: self.name.clone(),
                fields: std::mem::take(&mut self.fields),
                oneofs: std::mem::take(&mut self.oneofs),
                options: std::mem::take(&mut self.options),
                map_entry: self.map_entry,
                inner_types: self
                    .inner_types
                    .iter()
                    .map(InnerTypeBuilder::clone_name)
                    .collect(),
            })
        } else {
            match &mut self.inner_types[idx[0]] {
                InnerTypeBuilder::Message(m) => m.take_type(&idx[1..]),
                InnerTypeBuilder::Enum(e) => e.take_type(&idx[1..]),
            }
        }
    }

    fn build(self, self_data: &CacheData, cache: &BuildCache)
        -> Result<MessageInfo, CompileError>
    {
        let inner_types: Vec<_> = self
            .inner_types
            .iter()
            .filter_map(|inner| {
                let name = match inner {
                    InnerTypeBuilder::Message(m) => &m.name,
                    InnerTypeBuilder::Enum(e) => &e.name,
                };
                cache
                    .type_by_full_name(&format!("{}.{}", self_data.full_name, name))
                    .map(CacheData::type_ref)
            })
            .collect();

        let mut fields: Vec<_> = self
            .fields
            .into_iter()
            .map(|field| field.build(self_data, cache, None))
            .collect::<Result<_, _>>()?;

        let mut oneofs = Vec::with_capacity(self.oneofs.len());
        for (idx, oneof) in self.oneofs.into_iter().enumerate() {
            let oneof_ref = OneofRef(InternalRef(idx));
            let mut numbers = vec![];
            for field in oneof.fields {
                numbers.push(field.number);
                fields.push(field.build(self_data, cache, Some(oneof_ref))?);
            }
            oneofs.push(Oneof {
                name: oneof.name,
                self_ref: oneof_ref,
                fields: numbers,
                options: oneof.options,
            });
        }

        // Unlike the text rewrites done before parsing, these are genuine schema defects and
        // must always surface.
        let mut fields_by_name = BTreeMap::new();
        let mut fields_by_number = BTreeMap::new();
        for field in fields {
            if fields_by_name.contains_key(&field.name) {
                return Err(CompileError::DuplicateFieldName {
                    message: self_data.full_name.clone(),
                    name: field.name,
                });
            }
            if fields_by_number.contains_key(&field.number) {
                return Err(CompileError::DuplicateFieldNumber {
                    message: self_data.full_name.clone(),
                    number: field.number,
                });
            }
            fields_by_name.insert(field.name.clone(), field.number);
            fields_by_number.insert(field.number, field);
        }

        Ok(MessageInfo {
            name: self.name,
            full_name: self_data.full_name.clone(),
            self_ref: MessageRef(InternalRef(self_data.final_idx)),
            fields: fields_by_number,
            fields_by_name,
            inner_types,
            oneofs,
            map_entry: self.map_entry,
            options: self.options,
        })
    }
}

impl InnerTypeBuilder
{
    fn clone_name(&self) -> InnerTypeBuilder
    {
        match self {
            InnerTypeBuilder::Message(m) => InnerTypeBuilder::Message(MessageBuilder {
                name: m.name.clone(),
                ..Default::default()
            }),
            InnerTypeBuilder::Enum(e) => InnerTypeBuilder::Enum(EnumBuilder {
                name: e.name.clone(),
                ..Default::default()
            }),
        }
    }
}

impl FieldBuilder
{
    fn build(
        self,
        self_data: &CacheData,
        cache: &BuildCache,
        oneof: Option<OneofRef>,
    ) -> Result<MessageField, CompileError>
    {
        let multiplicity =
            resolve_multiplicity(self.label, &self.field_type, &self.options, self_data.syntax);
        Ok(MessageField {
            name: self.name,
            number: self.number,
            multiplicity,
            field_type: self.field_type.build(self_data, cache)?,
            oneof,
            options: self.options,
        })
    }
}

fn resolve_multiplicity(
    label: Label,
    field_type: &FieldTypeBuilder,
    options: &[ProtoOption],
    syntax: SourceSyntax,
) -> Multiplicity
{
    match label {
        Label::None | Label::Required => return Multiplicity::Single,
        Label::Optional => return Multiplicity::Optional,
        Label::Repeated => {}
    }

    // Repeated field.
    match field_type {
        // Non-scalar fields are always repeated.
        FieldTypeBuilder::Unknown(..) | FieldTypeBuilder::Group(..) => {
            return Multiplicity::Repeated
        }
        FieldTypeBuilder::Builtin(vt) if !vt.is_packable() => return Multiplicity::Repeated,

        // Scalar field.
        _ => {}
    }

    // Check the options.
    if let Some(opt) = options.iter().find(|o| o.name == "packed") {
        return match opt.value {
            Constant::Bool(true) => Multiplicity::RepeatedPacked,
            _ => Multiplicity::Repeated,
        };
    }

    match syntax {
        SourceSyntax::Proto2 => Multiplicity::Repeated,
        SourceSyntax::Proto3 | SourceSyntax::Editions => Multiplicity::RepeatedPacked,
    }
}

impl FieldTypeBuilder
{
    fn build(self, self_data: &CacheData, cache: &BuildCache) -> Result<ValueType, CompileError>
    {
        Ok(match self {
            FieldTypeBuilder::Builtin(vt) => vt,
            FieldTypeBuilder::Group(s) => {
                let t = cache.resolve_type(&s, &self_data.full_name).ok_or_else(|| {
                    CompileError::TypeNotFound {
                        name: s.clone(),
                        context: self_data.full_name.to_string(),
                    }
                })?;

                if t.item_type != ItemType::Message {
                    return Err(CompileError::InvalidTypeKind {
                        type_name: s,
                        context: "group",
                        expected: ItemType::Message,
                        actual: t.item_type,
                    });
                }
                ValueType::Group(MessageRef(InternalRef(t.final_idx)))
            }
            FieldTypeBuilder::Unknown(s) => {
                let t = cache.resolve_type(&s, &self_data.full_name).ok_or_else(|| {
                    CompileError::TypeNotFound {
                        name: s.clone(),
                        context: self_data.full_name.to_string(),
                    }
                })?;

                match t.item_type {
                    ItemType::Message => ValueType::Message(MessageRef(InternalRef(t.final_idx))),
                    ItemType::Enum => ValueType::Enum(EnumRef(InternalRef(t.final_idx))),
                    ItemType::Service => {
                        return Err(CompileError::InvalidTypeKind {
                            type_name: s,
                            context: "field type",
                            expected: ItemType::Message,
                            actual: ItemType::Service,
                        })
                    }
                }
            }
        })
    }
}

impl EnumBuilder
{
    /// Registers the enum and its value names into the build cache.
    ///
    /// Enum value names live in the scope enclosing the enum, so they are checked against every
    /// other value registered in that same scope.
    fn populate<'a>(
        &'a self,
        cache: &mut BuildCache,
        path: &mut Vec<&'a str>,
        idx: &mut Vec<usize>,
    ) -> Result<(), CompileError>
    {
        let scope = path.join(".");
        for field in &self.fields {
            let key = match scope.is_empty() {
                true => field.name.clone(),
                false => format!("{}.{}", scope, field.name),
            };
            if !cache.enum_values.insert(key) {
                return Err(CompileError::DuplicateEnumValue {
                    name: field.name.clone(),
                    scope,
                });
            }
        }

        path.push(&self.name);
        let full_name = path.join(".");
        path.pop();

        let cache_idx = cache.types.len();
        if cache
            .items
            .insert(full_name.clone(), (ItemType::Enum, cache_idx))
            .is_some()
        {
            return Err(CompileError::DuplicateType { name: full_name });
        }

        cache.types.push(CacheData {
            item_type: ItemType::Enum,
            full_name,
            idx_path: idx.clone(),
            final_idx: cache_idx,
            syntax: SourceSyntax::default(),
        });

        Ok(())
    }

    fn build(self, self_data: &CacheData) -> EnumInfo
    {
        let mut fields_by_value = BTreeMap::new();
        let mut fields_by_name = BTreeMap::new();
        for field in self.fields {
            fields_by_name.insert(field.name.clone(), field.value);

            // Aliases resolve to the first declared name.
            fields_by_value.entry(field.value).or_insert(field);
        }

        EnumInfo {
            name: self.name,
            full_name: self_data.full_name.to_string(),
            self_ref: EnumRef(InternalRef(self_data.final_idx)),
            fields_by_value,
            fields_by_name,
        }
    }

    fn take_type(&mut self, idx: &[usize]) -> ProtobufTypeBuilder
    {
        if !idx.is_empty() {
            panic!("Trying to take an inner type from an enum");
        }

        ProtobufTypeBuilder::Enum(std::mem::take(self))
    }
}

impl ServiceBuilder
{
    /// Registers the service into the build cache.
    ///
    /// On error the `path` and `idx` will be left in an undefined state.
    fn populate<'a>(
        &'a self,
        cache: &mut BuildCache,
        path: &mut Vec<&'a str>,
        idx: &mut Vec<usize>,
    ) -> Result<(), CompileError>
    {
        path.push(&self.name);
        let full_name = path.join(".");
        path.pop();

        let cache_idx = cache.services.len();
        if cache
            .items
            .insert(full_name.clone(), (ItemType::Service, cache_idx))
            .is_some()
        {
            return Err(CompileError::DuplicateType { name: full_name });
        }

        cache.services.push(CacheData {
            item_type: ItemType::Service,
            full_name,
            idx_path: idx.clone(),
            final_idx: cache_idx,
            syntax: SourceSyntax::default(),
        });

        Ok(())
    }

    fn build(self, self_data: &CacheData, cache: &BuildCache) -> Result<Service, CompileError>
    {
        let rpcs: Vec<_> = self
            .rpcs
            .into_iter()
            .map(|rpc| rpc.build(self_data, cache))
            .collect::<Result<_, _>>()?;
        let rpcs_by_name = rpcs
            .iter()
            .enumerate()
            .map(|(idx, rpc)| (rpc.name.to_string(), idx))
            .collect();

        Ok(Service {
            name: self.name,
            full_name: self_data.full_name.clone(),
            rpcs,
            rpcs_by_name,
            options: self.options,
        })
    }
}

impl RpcBuilder
{
    fn build(self, self_data: &CacheData, cache: &BuildCache) -> Result<Rpc, CompileError>
    {
        Ok(Rpc {
            name: self.name,
            input: self.input.build(self_data, cache)?,
            output: self.output.build(self_data, cache)?,
            options: self.options,
        })
    }
}

impl RpcArgBuilder
{
    fn build(self, rpc_data: &CacheData, cache: &BuildCache) -> Result<RpcArg, CompileError>
    {
        // Fetch the type data from the cache so we can figure out the type reference.
        let self_data = match cache.resolve_type(&self.message, &rpc_data.full_name) {
            Some(data) => data,
            None => {
                return Err(CompileError::TypeNotFound {
                    name: self.message,
                    context: rpc_data.full_name.clone(),
                })
            }
        };

        // All rpc input/output types must be messages.
        if self_data.item_type != ItemType::Message {
            return Err(CompileError::InvalidTypeKind {
                type_name: self.message,
                context: "service input/output",
                expected: ItemType::Message,
                actual: self_data.item_type,
            });
        }

        Ok(RpcArg {
            stream: self.stream,
            message: MessageRef(InternalRef(self_data.final_idx)),
        })
    }
}

#[derive(Default)]
struct BuildCache
{
    items: BTreeMap<String, (ItemType, usize)>,
    types: Vec<CacheData>,
    services: Vec<CacheData>,
    enum_values: BTreeSet<String>,
}

struct CacheData
{
    item_type: ItemType,
    idx_path: Vec<usize>,
    final_idx: usize,
    full_name: String,
    syntax: SourceSyntax,
}

impl CacheData
{
    fn type_ref(&self) -> TypeRef
    {
        match self.item_type {
            ItemType::Enum => TypeRef::Enum(EnumRef(InternalRef(self.final_idx))),
            _ => TypeRef::Message(MessageRef(InternalRef(self.final_idx))),
        }
    }
}

impl BuildCache
{
    fn resolve_type(&self, relative_name: &str, mut current_path: &str) -> Option<&CacheData>
    {
        if let Some(absolute) = relative_name.strip_prefix('.') {
            return self.type_by_full_name(absolute);
        }

        loop {
            let lookup: Cow<str> = match current_path.is_empty() {
                true => relative_name.into(),
                false => format!("{}.{}", current_path, relative_name).into(),
            };

            if let Some(t) = self.type_by_full_name(&lookup) {
                return Some(t);
            }

            if current_path.is_empty() {
                return None;
            }

            match current_path.rfind('.') {
                Some(i) => {
                    let (start, _) = current_path.split_at(i);
                    current_path = start;
                }
                None => {
                    current_path = "";
                }
            }
        }
    }

    fn type_by_full_name(&self, full_name: &str) -> Option<&CacheData>
    {
        self.items
            .get(full_name)
            .and_then(|(ty, i)| self.type_by_idx(*ty, *i))
    }

    fn type_by_idx(&self, item_type: ItemType, idx: usize) -> Option<&CacheData>
    {
        match item_type {
            ItemType::Message => self.types.get(idx),
            ItemType::Enum => self.types.get(idx),
            ItemType::Service => self.services.get(idx),
        }
    }
}

#[cfg(test)]
mod test
{
    use super::*;

    #[test]
    fn duplicate_field_name()
    {
        let err = SchemaSet::parse(&[r#"
            syntax = "proto3";
            message Message {
                string name = 1;
                int32 name = 2;
            }
        "#])
        .unwrap_err();

        match err {
            CompileError::DuplicateFieldName { message, name } => {
                assert_eq!(message, "Message");
                assert_eq!(name, "name");
            }
            e => panic!("Unexpected error: {}", e),
        }
    }

    #[test]
    fn duplicate_field_number_in_oneof()
    {
        let err = SchemaSet::parse(&[r#"
            syntax = "proto3";
            message Message {
                string name = 1;
                oneof choice {
                    int32 other = 1;
                }
            }
        "#])
        .unwrap_err();

        assert!(matches!(
            err,
            CompileError::DuplicateFieldNumber { number: 1, .. }
        ));
    }

    #[test]
    fn sibling_enum_values_collide()
    {
        let err = SchemaSet::parse(&[r#"
            syntax = "proto3";
            package pkg;
            message Message {
                enum First { UNKNOWN = 0; }
                enum Second { UNKNOWN = 0; }
            }
        "#])
        .unwrap_err();

        match err {
            CompileError::DuplicateEnumValue { name, scope } => {
                assert_eq!(name, "UNKNOWN");
                assert_eq!(scope, "pkg.Message");
            }
            e => panic!("Unexpected error: {}", e),
        }
    }

    #[test]
    fn enum_values_in_separate_messages()
    {
        SchemaSet::parse(&[r#"
            syntax = "proto3";
            message A { enum Kind { UNKNOWN = 0; } }
            message B { enum Kind { UNKNOWN = 0; } }
        "#])
        .unwrap();
    }

    #[test]
    fn unresolved_type()
    {
        let err = SchemaSet::parse(&[r#"
            syntax = "proto3";
            message Message { Missing value = 1; }
        "#])
        .unwrap_err();

        assert!(matches!(err, CompileError::TypeNotFound { .. }));
    }

    #[test]
    fn duplicate_type_across_files()
    {
        let err = SchemaSet::parse(&[
            "syntax = \"proto3\"; package p; message M {}",
            "syntax = \"proto3\"; package p; message M {}",
        ])
        .unwrap_err();

        assert!(matches!(err, CompileError::DuplicateType { .. }));
    }

    #[test]
    fn packed_defaults()
    {
        let set = SchemaSet::parse(&[
            r#"
                syntax = "proto2";
                package two;
                message M {
                    repeated int32 plain = 1;
                    repeated int32 packed = 2 [packed = true];
                }
            "#,
            r#"
                syntax = "proto3";
                package three;
                message M {
                    repeated int32 packed = 1;
                    repeated int32 plain = 2 [packed = false];
                    repeated string strings = 3;
                }
            "#,
        ])
        .unwrap();

        let two = set.get_message("two.M").unwrap();
        assert_eq!(two.get_field(1).unwrap().multiplicity, Multiplicity::Repeated);
        assert_eq!(
            two.get_field(2).unwrap().multiplicity,
            Multiplicity::RepeatedPacked
        );

        let three = set.get_message("three.M").unwrap();
        assert_eq!(
            three.get_field(1).unwrap().multiplicity,
            Multiplicity::RepeatedPacked
        );
        assert_eq!(three.get_field(2).unwrap().multiplicity, Multiplicity::Repeated);
        assert_eq!(three.get_field(3).unwrap().multiplicity, Multiplicity::Repeated);
    }

    #[test]
    fn relative_type_resolution()
    {
        let set = SchemaSet::parse(&[r#"
            syntax = "proto3";
            package a.b;
            message Outer {
                message Inner { int32 v = 1; }
                Inner direct = 1;
                .a.b.Outer.Inner absolute = 2;
                b.Outer parent = 3;
            }
        "#])
        .unwrap();

        let outer = set.get_message("a.b.Outer").unwrap();
        let inner = set.get_message("a.b.Outer.Inner").unwrap();
        assert_eq!(
            outer.get_field(1).unwrap().field_type,
            ValueType::Message(inner.self_ref)
        );
        assert_eq!(
            outer.get_field(2).unwrap().field_type,
            ValueType::Message(inner.self_ref)
        );
        assert_eq!(
            outer.get_field(3).unwrap().field_type,
            ValueType::Message(outer.self_ref)
        );
    }
}
