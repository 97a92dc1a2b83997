use crate::node::{Node, NodeKind};

/// Renders a type node the way interface output spells type names: the
/// "interface-type-builder-only" mode from the glossary, which ignores
/// accessor/attribute decoration and renders only the qualified nominal
/// name. This is the canonical key format used for `typeName` lookups
/// throughout the Symbol Index and Interface Indexer.
pub fn print_type_name(node: &Node) -> String {
    match node.kind() {
        NodeKind::Type => node
            .child(0)
            .map(|child| print_type_name(child))
            .unwrap_or_default(),
        NodeKind::Module => node.text().unwrap_or_default().to_owned(),
        NodeKind::Identifier
        | NodeKind::PrivateDeclName
        | NodeKind::PrefixOperator
        | NodeKind::InfixOperator
        | NodeKind::PostfixOperator => node.text().unwrap_or_default().to_owned(),
        NodeKind::Class
        | NodeKind::Structure
        | NodeKind::Enum
        | NodeKind::Protocol
        | NodeKind::TypeAlias => print_nominal(node),
        NodeKind::Extension => node
            .child(1)
            .map(|target| print_type_name(target))
            .unwrap_or_default(),
        _ => node
            .children()
            .iter()
            .map(|child| print_type_name(child))
            .collect::<Vec<_>>()
            .join("."),
    }
}

/// Nominal declarations are shaped `{context, identifier}`: the context is
/// either the declaring module or an enclosing nominal type (for nested
/// types), and the identifier is the declaration's own name.
fn print_nominal(node: &Node) -> String {
    let context = node.child(0).map(|c| print_type_name(c)).unwrap_or_default();
    let name = node
        .child(1)
        .map(|c| print_type_name(c))
        .unwrap_or_default();

    if context.is_empty() {
        name
    } else {
        format!("{context}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    #[test]
    fn prints_top_level_nominal() {
        let ty = Node::new(
            NodeKind::Type,
            vec![Node::new(
                NodeKind::Structure,
                vec![
                    Node::leaf(NodeKind::Module, "Mangling"),
                    Node::leaf(NodeKind::Identifier, "GenericUnion"),
                ],
            )],
        );

        assert_eq!(print_type_name(&ty), "Mangling.GenericUnion");
    }

    #[test]
    fn prints_nested_nominal() {
        let inner = Node::new(
            NodeKind::Class,
            vec![
                Node::new(
                    NodeKind::Structure,
                    vec![
                        Node::leaf(NodeKind::Module, "Mangling"),
                        Node::leaf(NodeKind::Identifier, "Outer"),
                    ],
                ),
                Node::leaf(NodeKind::Identifier, "Inner"),
            ],
        );
        let ty = Node::new(NodeKind::Type, vec![inner]);

        assert_eq!(print_type_name(&ty), "Mangling.Outer.Inner");
    }
}
