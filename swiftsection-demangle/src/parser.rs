use crate::node::{Node, NodeKind, NodeRef};
use crate::SWIFT_MANGLING_PREFIXES;

/// Parses the pragmatic subset of Swift 5 mangling this crate understands:
/// a module name followed by one or more `(length-prefixed identifier, kind
/// letter)` pairs, each nesting under the previous as declaration context.
/// For example `$s3Foo3BarC` demangles to a `class Foo.Bar`, and
/// `$s3Foo5Outer5InnerV` demangles to a `struct Foo.Outer.Inner`.
///
/// Anything outside this subset -- functions, variables, accessors,
/// generics, extensions, protocol conformances -- returns `None`. Those
/// forms are exercised in this workspace's tests by building `Node` trees
/// directly rather than through this parser, consistent with treating the
/// full grammar as an out-of-scope collaborator.
pub fn parse(mangled: &str) -> Option<NodeRef> {
    let body = SWIFT_MANGLING_PREFIXES
        .iter()
        .find_map(|prefix| mangled.strip_prefix(prefix))?;

    let mut cursor = Cursor::new(body);
    let module_name = cursor.take_identifier()?;
    let module = Node::leaf(NodeKind::Module, module_name);

    let mut context = module;
    let mut built_any = false;
    while !cursor.is_empty() {
        let identifier = cursor.take_identifier()?;
        let kind = cursor.take_kind_letter()?;
        let identifier_node = Node::leaf(NodeKind::Identifier, identifier);
        context = Node::new(kind, vec![context, identifier_node]);
        built_any = true;
    }

    if !built_any {
        return None;
    }

    Some(Node::new(NodeKind::Global, vec![context]))
}

struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(rest: &'a str) -> Self {
        Self { rest }
    }

    fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    /// Consumes a decimal length prefix followed by that many bytes, e.g.
    /// `3Foo` -> `Foo`.
    fn take_identifier(&mut self) -> Option<&'a str> {
        let digit_count = self.rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digit_count == 0 {
            return None;
        }
        let (digits, rest) = self.rest.split_at(digit_count);
        let len: usize = digits.parse().ok()?;
        if rest.len() < len || len == 0 {
            return None;
        }
        let (identifier, rest) = rest.split_at(len);
        self.rest = rest;
        Some(identifier)
    }

    /// Consumes a single nominal-kind letter: `C`lass, `V` struct, `O` enum,
    /// `P` protocol, `a` typealias.
    fn take_kind_letter(&mut self) -> Option<NodeKind> {
        let mut chars = self.rest.chars();
        let letter = chars.next()?;
        let kind = match letter {
            'C' => NodeKind::Class,
            'V' => NodeKind::Structure,
            'O' => NodeKind::Enum,
            'P' => NodeKind::Protocol,
            'a' => NodeKind::TypeAlias,
            _ => return None,
        };
        self.rest = chars.as_str();
        Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_level_struct() {
        let root = parse("$s8Mangling12GenericUnionO").unwrap();
        let en = &root.children()[0];
        assert_eq!(en.kind(), NodeKind::Enum);
        assert_eq!(en.children()[0].text(), Some("Mangling"));
        assert_eq!(en.children()[1].text(), Some("GenericUnion"));
    }

    #[test]
    fn parses_nested_types() {
        let root = parse("$s3Foo5Outer5InnerV").unwrap();
        let inner = &root.children()[0];
        assert_eq!(inner.kind(), NodeKind::Structure);
        assert_eq!(inner.children()[1].text(), Some("Inner"));
        let outer = &inner.children()[0];
        assert_eq!(outer.kind(), NodeKind::Structure);
        assert_eq!(outer.children()[1].text(), Some("Outer"));
    }

    #[test]
    fn rejects_truncated_identifier() {
        assert!(parse("$s99Foo").is_none());
    }

    #[test]
    fn rejects_missing_kind_letter() {
        assert!(parse("$s3Foo").is_none());
    }
}
