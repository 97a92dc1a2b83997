//! Metadata record readers for the `__swift5_types`, `__swift5_protos`,
//! `__swift5_proto`, `__swift5_assocty`, and `__swift5_fieldmd` sections.
//!
//! Like the Mach-O image and the demangler, the real on-disk layout of these
//! sections (arrays of 32-bit relative pointers into type/protocol context
//! descriptors, themselves chains of further relative pointers into mangled
//! name data) is an out-of-scope external collaborator. What's implemented
//! here is a pragmatic, self-contained record encoding that carries the same
//! information the Interface Indexer's Phase 0 needs -- this is the
//! boundary the indexer is built against, not a claim about the true ABI.
//! Unlike the true context-descriptor chain, this record shape is this
//! crate's own invention, so it is free to carry a `parent` alongside a type
//! or protocol's name -- the one piece of context-chain information Phase 1/2
//! genuinely need and a flat dotted name alone can't express.

use scroll::{Pread, LE};
use thiserror::Error;

use swiftsection_macho::MachImage;

use crate::definitions::FieldFlags;
use crate::symbol::TypeKind;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata section `{section}` is truncated at offset {offset}")]
    Truncated { section: &'static str, offset: usize },
    #[error("metadata section `{section}` has an unrecognized type kind tag {tag}")]
    UnknownTypeKind { section: &'static str, tag: u8 },
    #[error("metadata section `{section}` has an unrecognized parent tag {tag}")]
    UnknownParentTag { section: &'static str, tag: u8 },
}

/// Where a type or protocol record's declaration actually lives, when that's
/// something other than "nested under another known type record" (which the
/// dotted `name` already expresses on its own).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordParent {
    /// Declared inside `extension <name> { ... }`.
    Extension(String),
    /// Rooted at a bare symbol with no declaration context of its own.
    Symbol(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeRecord {
    pub name: String,
    pub kind: TypeKind,
    pub parent: Option<RecordParent>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolRecord {
    pub name: String,
    pub parent: Option<RecordParent>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolConformanceRecord {
    pub type_name: String,
    pub protocol_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssociatedTypeRecord {
    pub conforming_type_name: String,
    pub protocol_name: String,
    pub name: String,
    pub substituted_type_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRecord {
    pub type_name: String,
    pub name: String,
    pub flags: FieldFlags,
}

/// Reads the five reflection metadata record kinds out of an image. The
/// Interface Indexer's Phase 0 depends only on this trait, never on the
/// concrete section layout, so tests can supply canned records directly.
pub trait MetadataReader {
    fn type_records(&self) -> Vec<TypeRecord>;
    fn protocol_records(&self) -> Vec<ProtocolRecord>;
    fn conformance_records(&self) -> Vec<ProtocolConformanceRecord>;
    fn associated_type_records(&self) -> Vec<AssociatedTypeRecord>;
    fn field_records(&self) -> Vec<FieldRecord>;
}

/// A [`MetadataReader`] that decodes the five `__swift5_*` sections of a
/// parsed [`MachImage`]. Missing sections decode to empty record lists
/// rather than an error -- an image need not carry every kind of metadata.
pub struct SectionMetadataReader<'d> {
    types: &'d [u8],
    protocols: &'d [u8],
    conformances: &'d [u8],
    associated_types: &'d [u8],
    fields: &'d [u8],
}

impl<'d> SectionMetadataReader<'d> {
    pub fn from_image(image: &MachImage<'d>) -> Self {
        Self {
            types: image.swift_section("swift5_types").unwrap_or(&[]),
            protocols: image.swift_section("swift5_protos").unwrap_or(&[]),
            conformances: image.swift_section("swift5_proto").unwrap_or(&[]),
            associated_types: image.swift_section("swift5_assocty").unwrap_or(&[]),
            fields: image.swift_section("swift5_fieldmd").unwrap_or(&[]),
        }
    }

    fn read_str(data: &'d [u8], offset: &mut usize, section: &'static str) -> Result<String, MetadataError> {
        let len: u16 = data
            .gread_with(offset, LE)
            .map_err(|_| MetadataError::Truncated { section, offset: *offset })?;
        let len = len as usize;
        if *offset + len > data.len() {
            return Err(MetadataError::Truncated { section, offset: *offset });
        }
        let bytes = &data[*offset..*offset + len];
        *offset += len;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Reads an optional `RecordParent`: a one-byte tag (`0` = none, `1` =
    /// extension, `2` = symbol) followed by the target's name when present.
    fn read_parent(
        data: &'d [u8],
        offset: &mut usize,
        section: &'static str,
    ) -> Result<Option<RecordParent>, MetadataError> {
        let tag: u8 = data
            .gread_with(offset, LE)
            .map_err(|_| MetadataError::Truncated { section, offset: *offset })?;
        match tag {
            0 => Ok(None),
            1 => Ok(Some(RecordParent::Extension(Self::read_str(data, offset, section)?))),
            2 => Ok(Some(RecordParent::Symbol(Self::read_str(data, offset, section)?))),
            other => Err(MetadataError::UnknownParentTag { section, tag: other }),
        }
    }
}

impl<'d> MetadataReader for SectionMetadataReader<'d> {
    fn type_records(&self) -> Vec<TypeRecord> {
        let mut offset = 0;
        let mut out = Vec::new();
        while offset < self.types.len() {
            let Ok(tag) = self.types.gread_with::<u8>(&mut offset, LE) else {
                break;
            };
            let kind = match tag {
                0 => TypeKind::Enum,
                1 => TypeKind::Struct,
                2 => TypeKind::Class,
                3 => TypeKind::Protocol,
                4 => TypeKind::TypeAlias,
                other => {
                    tracing::warn!(tag = other, "unrecognized type kind tag in swift5_types, stopping");
                    break;
                }
            };
            let name = match Self::read_str(self.types, &mut offset, "swift5_types") {
                Ok(name) => name,
                Err(err) => {
                    tracing::warn!(%err, "truncated swift5_types record, stopping");
                    break;
                }
            };
            match Self::read_parent(self.types, &mut offset, "swift5_types") {
                Ok(parent) => out.push(TypeRecord { name, kind, parent }),
                Err(err) => {
                    tracing::warn!(%err, "truncated or malformed swift5_types parent tag, stopping");
                    break;
                }
            }
        }
        out
    }

    fn protocol_records(&self) -> Vec<ProtocolRecord> {
        let mut offset = 0;
        let mut out = Vec::new();
        while offset < self.protocols.len() {
            let name = match Self::read_str(self.protocols, &mut offset, "swift5_protos") {
                Ok(name) => name,
                Err(err) => {
                    tracing::warn!(%err, "truncated swift5_protos record, stopping");
                    break;
                }
            };
            match Self::read_parent(self.protocols, &mut offset, "swift5_protos") {
                Ok(parent) => out.push(ProtocolRecord { name, parent }),
                Err(err) => {
                    tracing::warn!(%err, "truncated or malformed swift5_protos parent tag, stopping");
                    break;
                }
            }
        }
        out
    }

    fn conformance_records(&self) -> Vec<ProtocolConformanceRecord> {
        let mut offset = 0;
        let mut out = Vec::new();
        while offset < self.conformances.len() {
            let type_name = match Self::read_str(self.conformances, &mut offset, "swift5_proto") {
                Ok(name) => name,
                Err(err) => {
                    tracing::warn!(%err, "truncated swift5_proto record, stopping");
                    break;
                }
            };
            let protocol_name = match Self::read_str(self.conformances, &mut offset, "swift5_proto") {
                Ok(name) => name,
                Err(err) => {
                    tracing::warn!(%err, "truncated swift5_proto record, stopping");
                    break;
                }
            };
            out.push(ProtocolConformanceRecord { type_name, protocol_name });
        }
        out
    }

    fn associated_type_records(&self) -> Vec<AssociatedTypeRecord> {
        let mut offset = 0;
        let mut out = Vec::new();
        while offset < self.associated_types.len() {
            let section = "swift5_assocty";
            let fields = (
                Self::read_str(self.associated_types, &mut offset, section),
                Self::read_str(self.associated_types, &mut offset, section),
                Self::read_str(self.associated_types, &mut offset, section),
                Self::read_str(self.associated_types, &mut offset, section),
            );
            match fields {
                (Ok(conforming_type_name), Ok(protocol_name), Ok(name), Ok(substituted_type_name)) => {
                    out.push(AssociatedTypeRecord {
                        conforming_type_name,
                        protocol_name,
                        name,
                        substituted_type_name,
                    });
                }
                _ => {
                    tracing::warn!("truncated swift5_assocty record, stopping");
                    break;
                }
            }
        }
        out
    }

    fn field_records(&self) -> Vec<FieldRecord> {
        let mut offset = 0;
        let mut out = Vec::new();
        while offset < self.fields.len() {
            let Ok(flags_byte) = self.fields.gread_with::<u8>(&mut offset, LE) else {
                break;
            };
            let flags = FieldFlags {
                is_lazy: flags_byte & 0x1 != 0,
                is_weak: flags_byte & 0x2 != 0,
                is_variable: flags_byte & 0x4 != 0,
                is_indirect_case: flags_byte & 0x8 != 0,
            };
            let type_name = match Self::read_str(self.fields, &mut offset, "swift5_fieldmd") {
                Ok(name) => name,
                Err(err) => {
                    tracing::warn!(%err, "truncated swift5_fieldmd record, stopping");
                    break;
                }
            };
            let name = match Self::read_str(self.fields, &mut offset, "swift5_fieldmd") {
                Ok(name) => name,
                Err(err) => {
                    tracing::warn!(%err, "truncated swift5_fieldmd record, stopping");
                    break;
                }
            };
            out.push(FieldRecord { type_name, name, flags });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scroll::Pwrite;

    fn write_str(buf: &mut Vec<u8>, s: &str) {
        let len = s.len() as u16;
        let mut header = [0u8; 2];
        header.pwrite_with(len, 0, LE).unwrap();
        buf.extend_from_slice(&header);
        buf.extend_from_slice(s.as_bytes());
    }

    fn write_no_parent(buf: &mut Vec<u8>) {
        buf.push(0u8);
    }

    fn write_extension_parent(buf: &mut Vec<u8>, target_name: &str) {
        buf.push(1u8);
        write_str(buf, target_name);
    }

    fn empty_reader<'d>() -> SectionMetadataReader<'d> {
        SectionMetadataReader {
            types: &[],
            protocols: &[],
            conformances: &[],
            associated_types: &[],
            fields: &[],
        }
    }

    #[test]
    fn decodes_type_records_until_truncated() {
        let mut data = Vec::new();
        data.push(1u8); // struct
        write_str(&mut data, "Foo");
        write_no_parent(&mut data);
        data.push(2u8); // class
        write_str(&mut data, "Bar");
        write_no_parent(&mut data);

        let reader = SectionMetadataReader { types: &data, ..empty_reader() };
        let records = reader.type_records();
        assert_eq!(
            records,
            vec![
                TypeRecord { name: "Foo".into(), kind: TypeKind::Struct, parent: None },
                TypeRecord { name: "Bar".into(), kind: TypeKind::Class, parent: None },
            ]
        );
    }

    #[test]
    fn decodes_extension_rooted_type_record() {
        let mut data = Vec::new();
        data.push(1u8); // struct
        write_str(&mut data, "Foo.Inner");
        write_extension_parent(&mut data, "Foo");

        let reader = SectionMetadataReader { types: &data, ..empty_reader() };
        assert_eq!(
            reader.type_records(),
            vec![TypeRecord {
                name: "Foo.Inner".into(),
                kind: TypeKind::Struct,
                parent: Some(RecordParent::Extension("Foo".into())),
            }]
        );
    }

    #[test]
    fn unknown_kind_tag_stops_without_panicking() {
        let mut data = Vec::new();
        data.push(1u8);
        write_str(&mut data, "Foo");
        write_no_parent(&mut data);
        data.push(99u8);

        let reader = SectionMetadataReader { types: &data, ..empty_reader() };
        assert_eq!(reader.type_records().len(), 1);
    }

    #[test]
    fn unknown_parent_tag_stops_without_panicking() {
        let mut data = Vec::new();
        data.push(1u8);
        write_str(&mut data, "Foo");
        data.push(77u8); // unrecognized parent tag

        let reader = SectionMetadataReader { types: &data, ..empty_reader() };
        assert!(reader.type_records().is_empty());
    }

    #[test]
    fn decodes_conformance_records() {
        let mut data = Vec::new();
        write_str(&mut data, "Foo");
        write_str(&mut data, "Equatable");

        let reader = SectionMetadataReader { conformances: &data, ..empty_reader() };
        assert_eq!(
            reader.conformance_records(),
            vec![ProtocolConformanceRecord {
                type_name: "Foo".into(),
                protocol_name: "Equatable".into(),
            }]
        );
    }

    #[test]
    fn decodes_associated_type_records() {
        let mut data = Vec::new();
        write_str(&mut data, "Foo");
        write_str(&mut data, "Sequence");
        write_str(&mut data, "Element");
        write_str(&mut data, "Int");

        let reader = SectionMetadataReader { associated_types: &data, ..empty_reader() };
        assert_eq!(
            reader.associated_type_records(),
            vec![AssociatedTypeRecord {
                conforming_type_name: "Foo".into(),
                protocol_name: "Sequence".into(),
                name: "Element".into(),
                substituted_type_name: "Int".into(),
            }]
        );
    }

    #[test]
    fn decodes_field_records() {
        let mut data = Vec::new();
        data.push(0b0110u8); // weak + variable
        write_str(&mut data, "Foo");
        write_str(&mut data, "name");

        let reader = SectionMetadataReader { fields: &data, ..empty_reader() };
        assert_eq!(
            reader.field_records(),
            vec![FieldRecord {
                type_name: "Foo".into(),
                name: "name".into(),
                flags: FieldFlags {
                    is_lazy: false,
                    is_weak: true,
                    is_variable: true,
                    is_indirect_case: false,
                },
            }]
        );
    }

    #[test]
    fn missing_sections_decode_to_empty() {
        let reader = empty_reader();
        assert!(reader.type_records().is_empty());
        assert!(reader.protocol_records().is_empty());
        assert!(reader.conformance_records().is_empty());
        assert!(reader.associated_type_records().is_empty());
        assert!(reader.field_records().is_empty());
    }
}
