use super::{DataContract, DataProperty, EnumContract, ObjectContract, ScalarKind, WellKnownType};
use prost_reflect::{EnumDescriptor, FieldDescriptor, Kind, MessageDescriptor};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Resolves descriptors into [`DataContract`]s.
///
/// Two pieces of state make the traversal safe on recursive message graphs:
///
/// * `in_progress`: the type names being expanded on the active call path. Meeting one of them
///   again yields a [`DataContract::Reference`] instead of expanding it a second time.
/// * `resolved`: finished contracts by full name, so a type is only ever expanded once.
///
/// A resolver is tied to one descriptor pool: full names are only unique within a pool.
#[derive(Debug, Default)]
pub struct ContractResolver {
    resolved: HashMap<String, DataContract>,
    in_progress: HashSet<String>,
}

impl ContractResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves the contract of a whole message.
    pub fn resolve(&mut self, message: &MessageDescriptor) -> DataContract {
        let name = message.full_name();

        if let Some(contract) = self.resolved.get(name) {
            return contract.clone();
        }

        if self.in_progress.contains(name) {
            return DataContract::Reference(name.to_string());
        }

        self.in_progress.insert(name.to_string());

        let contract = match WellKnownType::of(message) {
            Some(WellKnownType::Other) | None => self.convert_message(message),
            Some(well_known) => self.convert_well_known(message, well_known),
        };

        self.in_progress.remove(name);
        self.resolved.insert(name.to_string(), contract.clone());

        contract
    }

    /// The finished contract of a message or enum resolved earlier, by full name.
    ///
    /// A [`DataContract::Reference`] always names a type that is finished once the outermost
    /// `resolve` call returns, so this is how a reference is followed.
    pub fn contract_of(&self, name: &str) -> Option<&DataContract> {
        self.resolved.get(name)
    }

    /// Resolves the contract of a single field, list and map cardinality included.
    pub fn resolve_field(&mut self, field: &FieldDescriptor) -> DataContract {
        if field.is_map() {
            // Map keys are always rendered as JSON object keys (strings).
            let value = match field.kind() {
                Kind::Message(entry) => self.resolve_kind(&entry.map_entry_value_field().kind()),
                _ => DataContract::Scalar(ScalarKind::Unknown),
            };
            return DataContract::Dictionary(Box::new(value));
        }

        let element = self.resolve_kind(&field.kind());

        if field.is_list() {
            DataContract::Array(Box::new(element))
        } else {
            element
        }
    }

    fn resolve_kind(&mut self, kind: &Kind) -> DataContract {
        match kind {
            Kind::Double => DataContract::Scalar(ScalarKind::Double),
            Kind::Float => DataContract::Scalar(ScalarKind::Float),
            Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => DataContract::Scalar(ScalarKind::Int32),
            Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => DataContract::Scalar(ScalarKind::Int64),
            Kind::Uint32 | Kind::Fixed32 => DataContract::Scalar(ScalarKind::UInt32),
            Kind::Uint64 | Kind::Fixed64 => DataContract::Scalar(ScalarKind::UInt64),
            Kind::Bool => DataContract::Scalar(ScalarKind::Bool),
            Kind::String => DataContract::Scalar(ScalarKind::String),
            Kind::Bytes => DataContract::Scalar(ScalarKind::Bytes),
            Kind::Message(message) => self.resolve(message),
            Kind::Enum(enumeration) => self.resolve_enum(enumeration),
        }
    }

    fn resolve_enum(&mut self, enumeration: &EnumDescriptor) -> DataContract {
        let name = enumeration.full_name();

        if let Some(contract) = self.resolved.get(name) {
            return contract.clone();
        }

        let contract = DataContract::Enum(Arc::new(EnumContract {
            name: name.to_string(),
            values: enumeration.values().map(|v| v.name().to_string()).collect(),
        }));

        self.resolved.insert(name.to_string(), contract.clone());
        contract
    }

    fn convert_message(&mut self, message: &MessageDescriptor) -> DataContract {
        let mut fields: Vec<FieldDescriptor> = message.fields().collect();
        fields.sort_by_key(|f| f.number());

        let properties = fields
            .iter()
            .map(|field| DataProperty {
                name: field.json_name().to_string(),
                field_name: field.name().to_string(),
                number: field.number(),
                contract: self.resolve_field(field),
            })
            .collect();

        object(message, properties, None)
    }

    fn convert_well_known(
        &mut self,
        message: &MessageDescriptor,
        well_known: WellKnownType,
    ) -> DataContract {
        match well_known {
            WellKnownType::Wrapper => {
                let value = message
                    .get_field(1)
                    .map(|field| self.resolve_kind(&field.kind()))
                    .unwrap_or(DataContract::Scalar(ScalarKind::Unknown));

                let property = DataProperty {
                    name: "value".to_string(),
                    field_name: "value".to_string(),
                    number: 1,
                    contract: value,
                };

                object(message, vec![property], None)
            }
            WellKnownType::Timestamp | WellKnownType::Duration | WellKnownType::FieldMask => {
                DataContract::Scalar(ScalarKind::String)
            }
            WellKnownType::Struct => object(
                message,
                Vec::new(),
                Some(DataContract::Scalar(ScalarKind::Unknown)),
            ),
            WellKnownType::ListValue => {
                DataContract::Array(Box::new(DataContract::Scalar(ScalarKind::Unknown)))
            }
            WellKnownType::Value => DataContract::Scalar(ScalarKind::Unknown),
            WellKnownType::Any => {
                let type_property = DataProperty {
                    name: "@type".to_string(),
                    field_name: "type_url".to_string(),
                    number: 1,
                    contract: DataContract::Scalar(ScalarKind::String),
                };

                object(
                    message,
                    vec![type_property],
                    Some(DataContract::Scalar(ScalarKind::Unknown)),
                )
            }
            WellKnownType::Other => self.convert_message(message),
        }
    }
}

fn object(
    message: &MessageDescriptor,
    properties: Vec<DataProperty>,
    additional_properties: Option<DataContract>,
) -> DataContract {
    DataContract::Object(Arc::new(ObjectContract {
        name: message.full_name().to_string(),
        properties,
        additional_properties,
    }))
}
