use prost_reflect::MessageDescriptor;

const WELL_KNOWN_PACKAGE: &str = "google.protobuf";
const WRAPPERS_FILE: &str = "google/protobuf/wrappers.proto";

const WELL_KNOWN_FILES: &[&str] = &[
    "google/protobuf/any.proto",
    "google/protobuf/api.proto",
    "google/protobuf/duration.proto",
    "google/protobuf/empty.proto",
    "google/protobuf/wrappers.proto",
    "google/protobuf/timestamp.proto",
    "google/protobuf/field_mask.proto",
    "google/protobuf/source_context.proto",
    "google/protobuf/struct.proto",
    "google/protobuf/type.proto",
];

/// Messages with a standardized JSON mapping that does not follow their field layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WellKnownType {
    /// `google.protobuf.{Int32,Int64,UInt32,UInt64,Float,Double,Bool,String,Bytes}Value`.
    Wrapper,
    Timestamp,
    Duration,
    FieldMask,
    Struct,
    ListValue,
    Value,
    Any,
    /// Defined in a well-known file but mapped like any other message (e.g. `Empty`).
    Other,
}

impl WellKnownType {
    /// Classifies `message`, returning `None` for user-defined types.
    pub fn of(message: &MessageDescriptor) -> Option<Self> {
        let file = message.parent_file();

        if file.package_name() != WELL_KNOWN_PACKAGE || !WELL_KNOWN_FILES.contains(&file.name()) {
            return None;
        }

        if file.name() == WRAPPERS_FILE {
            return Some(WellKnownType::Wrapper);
        }

        let kind = match message.full_name() {
            "google.protobuf.Timestamp" => WellKnownType::Timestamp,
            "google.protobuf.Duration" => WellKnownType::Duration,
            "google.protobuf.FieldMask" => WellKnownType::FieldMask,
            "google.protobuf.Struct" => WellKnownType::Struct,
            "google.protobuf.ListValue" => WellKnownType::ListValue,
            "google.protobuf.Value" => WellKnownType::Value,
            "google.protobuf.Any" => WellKnownType::Any,
            _ => WellKnownType::Other,
        };

        Some(kind)
    }
}
