//! Shared fixtures for the swiftsection workspace's tests: canned demangled
//! [`NodeRef`] trees built the same way each crate's own unit tests build
//! them, plus a little-endian byte writer for the reflection-metadata record
//! encoding `swiftsection-index::metadata` reads.
//!
//! Building a real, goblin-parseable Mach-O image byte-for-byte isn't in
//! scope here -- every consumer in this workspace depends only on
//! `MetadataReader`/`Demangler`-shaped collaborators, which these fixtures
//! satisfy directly.

use scroll::{Pwrite, LE};

use swiftsection_demangle::{Node, NodeKind, NodeRef};

/// A `{module, identifier}` nominal declaration node, e.g. the shape
/// produced by demangling a bare `struct`/`class`/`enum`/`protocol` symbol.
pub fn nominal(kind: NodeKind, module: &str, name: &str) -> NodeRef {
    Node::new(
        kind,
        vec![Node::leaf(NodeKind::Module, module), Node::leaf(NodeKind::Identifier, name)],
    )
}

/// Wraps `target` in an `extension(module, target)` node, the shape a
/// member's context child takes when it's declared in an extension.
pub fn extension_context(module: &str, target: NodeRef) -> NodeRef {
    Node::new(NodeKind::Extension, vec![Node::leaf(NodeKind::Module, module), target])
}

/// A `function(context, identifier)` node with the given context and name.
///
/// The Interface Indexer derives a function's name by walking the tree
/// depth-first for the first `Identifier`, so `name` only surfaces that way
/// when `context` has no `Identifier` descendant of its own (e.g. a bare
/// `Module` leaf, as for a global function) -- a member function nested
/// under a nominal context picks up that context's identifier instead.
pub fn function(context: NodeRef, name: &str) -> NodeRef {
    Node::new(NodeKind::Function, vec![context, Node::leaf(NodeKind::Identifier, name)])
}

/// A `static(inner)` node, the shape a `static` member's root wrapper takes.
pub fn static_wrapper(inner: NodeRef) -> NodeRef {
    Node::new(NodeKind::Static, vec![inner])
}

/// A `variable(context, identifier)` node.
pub fn variable(context: NodeRef, name: &str) -> NodeRef {
    Node::new(NodeKind::Variable, vec![context, Node::leaf(NodeKind::Identifier, name)])
}

/// A `getter(variable)` accessor node, the shape a stored property's getter
/// symbol demangles to.
pub fn getter(variable_node: NodeRef) -> NodeRef {
    Node::new(NodeKind::Getter, vec![variable_node])
}

/// A `global(child)` root, the shape every demangled symbol bottoms out at.
pub fn global(child: NodeRef) -> NodeRef {
    Node::new(NodeKind::Global, vec![child])
}

/// Writes a length-prefixed UTF-8 string the way the `swift5_*` metadata
/// record reader expects: a little-endian `u16` length followed by the raw
/// bytes, matching `SectionMetadataReader::read_str`.
pub fn write_record_string(buf: &mut Vec<u8>, s: &str) {
    let len = s.len() as u16;
    let mut header = [0u8; 2];
    header.pwrite_with(len, 0, LE).expect("2-byte buffer always fits a u16");
    buf.extend_from_slice(&header);
    buf.extend_from_slice(s.as_bytes());
}

/// Encodes a single `swift5_types` record: a one-byte kind tag (matching
/// `SectionMetadataReader::type_records`'s tag table) followed by the
/// length-prefixed name.
pub fn write_type_record(buf: &mut Vec<u8>, tag: u8, name: &str) {
    buf.push(tag);
    write_record_string(buf, name);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nominal_builds_a_two_child_module_identifier_node() {
        let node = nominal(NodeKind::Structure, "Foo", "Bar");
        assert_eq!(node.kind(), NodeKind::Structure);
        assert_eq!(node.children().len(), 2);
        assert_eq!(swiftsection_demangle::print_type_name(&node), "Foo.Bar");
    }

    #[test]
    fn write_type_record_round_trips_through_the_length_prefix() {
        let mut buf = Vec::new();
        write_type_record(&mut buf, 1, "Foo");
        // tag byte + 2-byte length prefix + 3 name bytes
        assert_eq!(buf.len(), 1 + 2 + 3);
        assert_eq!(buf[0], 1);
    }
}
