use std::sync::Arc;

/// Primitive JSON kinds a Protobuf scalar maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Double,
    Float,
    Int32,
    Int64,
    UInt32,
    UInt64,
    Bool,
    String,
    /// Raw bytes, carried as a base64 string.
    Bytes,
    /// Any JSON value (`google.protobuf.Value`, open-ended slots).
    Unknown,
}

/// The shape of a type as seen by a JSON client.
///
/// Objects and enums are reference counted: resolved contracts are memoized and handed out many
/// times, so cloning a contract never copies a whole message tree.
#[derive(Debug, Clone, PartialEq)]
pub enum DataContract {
    Scalar(ScalarKind),
    Object(Arc<ObjectContract>),
    Array(Box<DataContract>),
    Dictionary(Box<DataContract>),
    Enum(Arc<EnumContract>),
    /// A message already being expanded higher up the call path, referenced by its full name.
    Reference(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectContract {
    /// Fully qualified message name.
    pub name: String,
    /// Properties in field-number order.
    pub properties: Vec<DataProperty>,
    /// Shape of extra, undeclared properties. `None` means the object is closed.
    pub additional_properties: Option<DataContract>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataProperty {
    /// JSON name of the field.
    pub name: String,
    /// Name of the field in the `.proto` definition.
    pub field_name: String,
    pub number: u32,
    pub contract: DataContract,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumContract {
    /// Fully qualified enum name.
    pub name: String,
    /// Value names in declaration order.
    pub values: Vec<String>,
}

impl DataContract {
    /// Name of the type this contract stands for, for objects, enums and references.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            DataContract::Object(object) => Some(&object.name),
            DataContract::Enum(enumeration) => Some(&enumeration.name),
            DataContract::Reference(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectContract> {
        match self {
            DataContract::Object(object) => Some(object),
            _ => None,
        }
    }
}

impl ObjectContract {
    pub fn property(&self, name: &str) -> Option<&DataProperty> {
        self.properties.iter().find(|p| p.name == name)
    }
}
