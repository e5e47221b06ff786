use super::*;

impl SchemaSet
{
    /// Create a new, empty schema set.
    pub fn new() -> Self
    {
        Default::default()
    }

    /// Gets type info by name.
    pub fn get_type(&self, full_name: &str) -> Option<&TypeInfo>
    {
        self.types_by_name
            .get(full_name)
            .map(|idx| &self.types[*idx])
    }

    /// Gets a message type info by name.
    pub fn get_message(&self, full_name: &str) -> Option<&MessageInfo>
    {
        match self.get_type(full_name) {
            Some(TypeInfo::Message(m)) => Some(m),
            _ => None,
        }
    }

    /// Gets an enum type info by name.
    pub fn get_enum(&self, full_name: &str) -> Option<&EnumInfo>
    {
        match self.get_type(full_name) {
            Some(TypeInfo::Enum(e)) => Some(e),
            _ => None,
        }
    }

    /// Fully qualified names of every message type, sorted alphabetically.
    pub fn message_types(&self) -> &[String]
    {
        &self.message_names
    }

    /// Iterates all message types in name order.
    pub fn iter_messages(&self) -> impl Iterator<Item = &MessageInfo>
    {
        self.message_names
            .iter()
            .filter_map(move |name| self.get_message(name))
    }

    /// True if the set contains no types.
    pub fn is_empty(&self) -> bool
    {
        self.types.is_empty()
    }

    fn resolve_type(&self, tr: InternalRef) -> Option<&TypeInfo>
    {
        self.types.get(tr.0)
    }

    /// Resolves a message reference.
    ///
    /// Returns `None` if the reference came from a different schema set.
    pub fn resolve_message(&self, tr: MessageRef) -> Option<&MessageInfo>
    {
        match self.resolve_type(tr.0) {
            Some(TypeInfo::Message(msg)) => Some(msg),
            _ => None,
        }
    }

    /// Resolves a enum reference.
    ///
    /// Returns `None` if the reference came from a different schema set.
    pub fn resolve_enum(&self, tr: EnumRef) -> Option<&EnumInfo>
    {
        match self.resolve_type(tr.0) {
            Some(TypeInfo::Enum(e)) => Some(e),
            _ => None,
        }
    }

    /// Gets a service by full name.
    pub fn get_service(&self, full_name: &str) -> Option<&Service>
    {
        self.services_by_name
            .get(full_name)
            .map(|idx| &self.services[*idx])
    }
}

impl TypeInfo
{
    /// Get the name of the type.
    pub fn name(&self) -> &str
    {
        match self {
            TypeInfo::Message(m) => &m.name,
            TypeInfo::Enum(e) => &e.name,
        }
    }

    /// Get the full name of the type.
    pub fn full_name(&self) -> &str
    {
        match self {
            TypeInfo::Message(m) => &m.full_name,
            TypeInfo::Enum(e) => &e.full_name,
        }
    }
}

impl MessageInfo
{
    /// Iterates all message fields.
    pub fn iter_fields(&self) -> impl Iterator<Item = &MessageField>
    {
        self.fields.values()
    }

    /// Number of declared fields.
    pub fn field_count(&self) -> usize
    {
        self.fields.len()
    }

    /// Get a field by its number.
    pub fn get_field(&self, number: u64) -> Option<&MessageField>
    {
        self.fields.get(&number)
    }

    /// Get a field by its name.
    pub fn get_field_by_name(&self, name: &str) -> Option<&MessageField>
    {
        self.fields_by_name
            .get(name)
            .and_then(|id| self.get_field(*id))
    }

    /// Gets a oneof by a oneof reference.
    pub fn get_oneof(&self, oneof: OneofRef) -> Option<&Oneof>
    {
        self.oneofs.iter().find(|oo| oo.self_ref == oneof)
    }
}

impl EnumInfo
{
    /// Gets a field by value.
    ///
    /// If the field is aliased, the first declared alias is returned.
    pub fn get_field_by_value(&self, value: i64) -> Option<&EnumField>
    {
        self.fields_by_value.get(&value)
    }

    /// Gets a field by name.
    pub fn get_field_by_name(&self, name: &str) -> Option<&EnumField>
    {
        self.fields_by_name
            .get(name)
            .and_then(|v| self.fields_by_value.get(v))
    }

    /// Iterates the enum fields in value order.
    pub fn iter_fields(&self) -> impl Iterator<Item = &EnumField>
    {
        self.fields_by_value.values()
    }
}

impl Service
{
    /// Gets an `Rpc` info by operation name.
    pub fn rpc_by_name(&self, name: &str) -> Option<&Rpc>
    {
        self.rpcs_by_name.get(name).map(|idx| &self.rpcs[*idx])
    }
}

impl ValueType
{
    /// The wire type used to encode a single value of this type.
    pub fn wire_type(&self) -> u8
    {
        match self {
            Self::Double => 1,
            Self::Float => 5,
            Self::Int32 => 0,
            Self::Int64 => 0,
            Self::UInt32 => 0,
            Self::UInt64 => 0,
            Self::SInt32 => 0,
            Self::SInt64 => 0,
            Self::Fixed32 => 5,
            Self::Fixed64 => 1,
            Self::SFixed32 => 5,
            Self::SFixed64 => 1,
            Self::Bool => 0,
            Self::String => 2,
            Self::Bytes => 2,
            Self::Message(..) => 2,
            Self::Enum(..) => 0,
            Self::Group(..) => 3,
        }
    }

    /// True for scalar numeric types that may be packed.
    pub fn is_packable(&self) -> bool
    {
        !matches!(self.wire_type(), 2 | 3)
    }
}
