//! Linking of descriptor protos against their dependencies.
//!
//! Symbol resolution and option interpretation are delegated to
//! [`prost_reflect::DescriptorPool`]; this module only assembles the pool a
//! file needs: the transitive closure of its dependencies' pools, then the
//! file itself.

use prost_reflect::{DescriptorPool, FileDescriptor};
use prost_types::FileDescriptorProto;

use crate::Error;

/// Links a lowered file against the linked descriptors of its direct
/// dependencies, producing a fully linked descriptor.
///
/// Every file named in the proto's `dependency` list must be present in
/// `dependencies`; transitive dependencies are carried in by each dependency's
/// own pool.
pub fn link(
    file: FileDescriptorProto,
    dependencies: &[FileDescriptor],
) -> Result<FileDescriptor, Error> {
    let name = file.name().to_owned();

    let mut pool = DescriptorPool::new();
    for dependency in dependencies {
        for transitive in dependency.parent_pool().files() {
            if pool.get_file_by_name(transitive.name()).is_none() {
                pool.add_file_descriptor_proto(transitive.file_descriptor_proto().clone())?;
            }
        }
    }

    pool.add_file_descriptor_proto(file)?;

    Ok(pool
        .get_file_by_name(&name)
        .expect("file was just added to the pool"))
}

#[cfg(test)]
mod tests {
    use prost_types::{field_descriptor_proto, DescriptorProto, FieldDescriptorProto};

    use super::*;

    fn file(name: &str, dependencies: &[&str]) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some(name.to_owned()),
            dependency: dependencies.iter().map(|dep| (*dep).to_owned()).collect(),
            syntax: Some("proto3".to_owned()),
            ..Default::default()
        }
    }

    #[test]
    fn links_against_transitive_dependencies() {
        let mut base = file("base.proto", &[]);
        base.message_type.push(DescriptorProto {
            name: Some("Base".to_owned()),
            ..Default::default()
        });

        let mut middle = file("middle.proto", &["base.proto"]);
        middle.message_type.push(DescriptorProto {
            name: Some("Middle".to_owned()),
            field: vec![FieldDescriptorProto {
                name: Some("base".to_owned()),
                number: Some(1),
                label: Some(field_descriptor_proto::Label::Optional as i32),
                type_name: Some(".Base".to_owned()),
                json_name: Some("base".to_owned()),
                ..Default::default()
            }],
            ..Default::default()
        });

        let mut top = file("top.proto", &["middle.proto"]);
        top.message_type.push(DescriptorProto {
            name: Some("Top".to_owned()),
            field: vec![FieldDescriptorProto {
                name: Some("middle".to_owned()),
                number: Some(1),
                label: Some(field_descriptor_proto::Label::Optional as i32),
                type_name: Some(".Middle".to_owned()),
                json_name: Some("middle".to_owned()),
                ..Default::default()
            }],
            ..Default::default()
        });

        let base = link(base, &[]).unwrap();
        let middle = link(middle, &[base]).unwrap();
        let top = link(top, &[middle]).unwrap();

        assert_eq!(top.name(), "top.proto");
        let message = top.messages().find(|m| m.name() == "Top").unwrap();
        let field = message.fields().next().unwrap();
        assert_eq!(field.full_name(), "Top.middle");
    }

    #[test]
    fn missing_dependency_fails() {
        let broken = file("broken.proto", &["missing.proto"]);
        assert!(link(broken, &[]).is_err());
    }
}
