//! # Descriptor Resolver
//!
//! Turns the raw descriptor files returned by reflection into a linked [`DescriptorPool`].
//!
//! Files arrive in whatever order the upstream (or the fan-out over several services) produced
//! them. A pool can only accept a file once all of its imports are present, so the batch is first
//! linearized into dependency order and only then parsed, file by file.
use prost::Message;
use prost_reflect::{DescriptorError, DescriptorPool};
use prost_types::FileDescriptorProto;
use std::collections::HashSet;

/// A descriptor file exactly as received over the wire, plus the names it imports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub dependencies: Vec<String>,
}

impl RawFile {
    /// Reads the name and imports out of a serialized `FileDescriptorProto`, keeping the bytes.
    pub fn decode(bytes: Vec<u8>) -> Result<Self, prost::DecodeError> {
        let proto = FileDescriptorProto::decode(bytes.as_slice())?;

        Ok(Self {
            name: proto.name().to_string(),
            dependencies: proto.dependency,
            bytes,
        })
    }

    /// Serializes `proto` into a raw file.
    pub fn from_proto(proto: &FileDescriptorProto) -> Self {
        Self {
            name: proto.name().to_string(),
            bytes: proto.encode_to_vec(),
            dependencies: proto.dependency.clone(),
        }
    }

    fn parse(&self) -> Result<FileDescriptorProto, ResolveError> {
        FileDescriptorProto::decode(self.bytes.as_slice()).map_err(|source| ResolveError::Decode {
            file: self.name.clone(),
            source,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Cyclic dependency between descriptor files: {}", .pending.join(", "))]
    CyclicDependency { pending: Vec<String> },

    #[error("Descriptor file '{file}' imports '{dependency}', which is not part of the batch")]
    MissingDependency { file: String, dependency: String },

    #[error("Failed to decode descriptor file '{file}': {source}")]
    Decode {
        file: String,
        #[source]
        source: prost::DecodeError,
    },

    #[error("Unresolvable descriptor in file '{file}': {source}")]
    Unresolvable {
        file: String,
        #[source]
        source: DescriptorError,
    },
}

/// Flattens several batches into one, dropping files whose name was already seen.
///
/// The first occurrence of a file wins and insertion order is preserved.
pub fn merge_files<I>(batches: I) -> Vec<RawFile>
where
    I: IntoIterator<Item = Vec<RawFile>>,
{
    let mut seen = HashSet::new();

    batches
        .into_iter()
        .flatten()
        .filter(|file| seen.insert(file.name.clone()))
        .collect()
}

/// Orders `files` so that every file comes after all the files it imports.
///
/// When several files are eligible at the same time the one inserted first is placed first, so
/// the output is deterministic for a given input.
///
/// # Errors
///
/// * [`ResolveError::MissingDependency`] if a file imports a name that is not in the batch.
/// * [`ResolveError::CyclicDependency`] if a full pass over the pending files places nothing.
pub fn linearize(files: Vec<RawFile>) -> Result<Vec<RawFile>, ResolveError> {
    let mut pending = merge_files([files]);

    let names: HashSet<&str> = pending.iter().map(|f| f.name.as_str()).collect();
    for file in &pending {
        if let Some(missing) = file
            .dependencies
            .iter()
            .find(|dep| !names.contains(dep.as_str()))
        {
            return Err(ResolveError::MissingDependency {
                file: file.name.clone(),
                dependency: missing.clone(),
            });
        }
    }

    let mut placed: HashSet<String> = HashSet::with_capacity(pending.len());
    let mut ordered = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let eligible = pending
            .iter()
            .position(|file| file.dependencies.iter().all(|dep| placed.contains(dep)));

        let Some(index) = eligible else {
            return Err(ResolveError::CyclicDependency {
                pending: pending.into_iter().map(|f| f.name).collect(),
            });
        };

        let file = pending.remove(index);
        placed.insert(file.name.clone());
        ordered.push(file);
    }

    Ok(ordered)
}

/// Linearizes `files` and parses them, in order, into a fresh [`DescriptorPool`].
///
/// Because files are added after their imports, every cross-file reference is linked to an
/// already-parsed descriptor.
pub fn build_pool(files: Vec<RawFile>) -> Result<DescriptorPool, ResolveError> {
    let ordered = linearize(files)?;
    let mut pool = DescriptorPool::new();

    for file in &ordered {
        let proto = file.parse()?;
        pool.add_file_descriptor_proto(proto)
            .map_err(|source| ResolveError::Unresolvable {
                file: file.name.clone(),
                source,
            })?;
    }

    tracing::debug!(files = ordered.len(), "descriptor pool built");

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::{DescriptorProto, FieldDescriptorProto, field_descriptor_proto};

    fn file(name: &str, deps: &[&str]) -> RawFile {
        let proto = FileDescriptorProto {
            name: Some(name.to_string()),
            dependency: deps.iter().map(|d| d.to_string()).collect(),
            syntax: Some("proto3".to_string()),
            ..Default::default()
        };
        RawFile::from_proto(&proto)
    }

    fn names(files: &[RawFile]) -> Vec<&str> {
        files.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_linearize_places_dependencies_first() {
        // d -> c -> (a, b), b -> a
        let files = vec![
            file("d.proto", &["c.proto"]),
            file("c.proto", &["a.proto", "b.proto"]),
            file("b.proto", &["a.proto"]),
            file("a.proto", &[]),
        ];

        let ordered = linearize(files).expect("acyclic graph must linearize");

        assert_eq!(
            names(&ordered),
            vec!["a.proto", "b.proto", "c.proto", "d.proto"]
        );
    }

    #[test]
    fn test_linearize_keeps_insertion_order_between_independent_files() {
        let files = vec![
            file("z.proto", &[]),
            file("m.proto", &[]),
            file("a.proto", &["m.proto"]),
        ];

        let ordered = linearize(files).unwrap();

        assert_eq!(names(&ordered), vec!["z.proto", "m.proto", "a.proto"]);
    }

    #[test]
    fn test_linearize_every_file_follows_its_dependencies() {
        let files = vec![
            file("app.proto", &["svc.proto", "types.proto"]),
            file("svc.proto", &["types.proto", "base.proto"]),
            file("types.proto", &["base.proto"]),
            file("other.proto", &[]),
            file("base.proto", &[]),
        ];
        let expected_len = files.len();

        let ordered = linearize(files).unwrap();
        assert_eq!(ordered.len(), expected_len);

        for (position, file) in ordered.iter().enumerate() {
            for dep in &file.dependencies {
                let dep_position = ordered.iter().position(|f| &f.name == dep).unwrap();
                assert!(
                    dep_position < position,
                    "{} must come after {}",
                    file.name,
                    dep
                );
            }
        }
    }

    #[test]
    fn test_linearize_rejects_cycles() {
        let files = vec![
            file("root.proto", &[]),
            file("a.proto", &["b.proto"]),
            file("b.proto", &["c.proto"]),
            file("c.proto", &["a.proto"]),
        ];

        let result = linearize(files);

        match result {
            Err(ResolveError::CyclicDependency { pending }) => {
                assert_eq!(pending, vec!["a.proto", "b.proto", "c.proto"]);
            }
            other => panic!("Expected CyclicDependency, got: {other:?}"),
        }
    }

    #[test]
    fn test_linearize_rejects_self_import() {
        let result = linearize(vec![file("self.proto", &["self.proto"])]);

        assert!(matches!(
            result,
            Err(ResolveError::CyclicDependency { pending }) if pending == vec!["self.proto"]
        ));
    }

    #[test]
    fn test_linearize_reports_missing_dependency() {
        let result = linearize(vec![file("a.proto", &["ghost.proto"])]);

        assert!(matches!(
            result,
            Err(ResolveError::MissingDependency { file, dependency })
                if file == "a.proto" && dependency == "ghost.proto"
        ));
    }

    #[test]
    fn test_merge_files_keeps_first_occurrence() {
        let mut shared_first = file("common.proto", &[]);
        shared_first.bytes = vec![1];
        let mut shared_second = file("common.proto", &[]);
        shared_second.bytes = vec![2];

        let merged = merge_files([
            vec![file("greet.proto", &["common.proto"]), shared_first],
            vec![shared_second, file("catalog.proto", &["common.proto"])],
        ]);

        assert_eq!(
            names(&merged),
            vec!["greet.proto", "common.proto", "catalog.proto"]
        );
        assert_eq!(merged[1].bytes, vec![1]);
    }

    #[test]
    fn test_build_pool_links_cross_file_references() {
        let base = FileDescriptorProto {
            name: Some("base.proto".into()),
            package: Some("base".into()),
            syntax: Some("proto3".into()),
            message_type: vec![DescriptorProto {
                name: Some("Id".into()),
                field: vec![FieldDescriptorProto {
                    name: Some("value".into()),
                    number: Some(1),
                    label: Some(field_descriptor_proto::Label::Optional as i32),
                    r#type: Some(field_descriptor_proto::Type::String as i32),
                    json_name: Some("value".into()),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };

        let app = FileDescriptorProto {
            name: Some("app.proto".into()),
            package: Some("app".into()),
            syntax: Some("proto3".into()),
            dependency: vec!["base.proto".into()],
            message_type: vec![DescriptorProto {
                name: Some("User".into()),
                field: vec![FieldDescriptorProto {
                    name: Some("id".into()),
                    number: Some(1),
                    label: Some(field_descriptor_proto::Label::Optional as i32),
                    r#type: Some(field_descriptor_proto::Type::Message as i32),
                    type_name: Some(".base.Id".into()),
                    json_name: Some("id".into()),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };

        // Dependents first: the resolver has to reorder them.
        let pool = build_pool(vec![RawFile::from_proto(&app), RawFile::from_proto(&base)])
            .expect("pool must build");

        let user = pool.get_message_by_name("app.User").unwrap();
        let id_field = user.get_field_by_name("id").unwrap();
        assert_eq!(
            id_field.kind().as_message().unwrap().full_name(),
            "base.Id"
        );
    }

    #[test]
    fn test_build_pool_reports_unresolvable_types() {
        let broken = FileDescriptorProto {
            name: Some("broken.proto".into()),
            package: Some("broken".into()),
            syntax: Some("proto3".into()),
            message_type: vec![DescriptorProto {
                name: Some("Holder".into()),
                field: vec![FieldDescriptorProto {
                    name: Some("ghost".into()),
                    number: Some(1),
                    label: Some(field_descriptor_proto::Label::Optional as i32),
                    r#type: Some(field_descriptor_proto::Type::Message as i32),
                    type_name: Some(".broken.Ghost".into()),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };

        let result = build_pool(vec![RawFile::from_proto(&broken)]);

        assert!(matches!(
            result,
            Err(ResolveError::Unresolvable { file, .. }) if file == "broken.proto"
        ));
    }
}
