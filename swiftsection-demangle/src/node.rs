use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared handle to a demangled node.
///
/// Nodes are immutable once built; the tree is assembled bottom-up through
/// [`NodeBuilder`]/[`Node::new`], which also wires up [`Node::parent`] back
/// references on the children being attached.
pub type NodeRef = Rc<Node>;

/// An opaque, per-construction identity token.
///
/// Two demanglings of the same mangled name produce [`Node`] trees that
/// compare structurally equal (same [`NodeKind`], text, and children) but
/// carry distinct `NodeId`s. Code that needs to break cycles or avoid
/// revisiting a node during a single traversal (conformance resolution, see
/// the indexer) should key a visited-set by `NodeId`, not by structural
/// equality, since structurally distinct failure states can otherwise
/// collide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

impl NodeId {
    fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The grammatical role of a [`Node`].
///
/// This is the fixed enumeration from the demangling grammar; `text` is only
/// meaningful on the terminal kinds called out below.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Global,
    Function,
    Variable,
    Subscript,
    Allocator,
    Deallocator,
    Constructor,
    Destructor,
    Getter,
    Setter,
    ModifyAccessor,
    ReadAccessor,
    Static,
    Extension,
    Module,
    Protocol,
    Enum,
    Structure,
    Class,
    TypeAlias,
    MethodDescriptor,
    ProtocolWitness,
    ProtocolConformance,
    MergedFunction,
    OpaqueTypeDescriptor,
    OpaqueReturnTypeOf,
    Type,
    DependentGenericSignature,
    RequirementKinds,
    LabelList,
    /// Terminal: carries `text`.
    Identifier,
    /// Terminal: carries `text`.
    PrivateDeclName,
    /// Terminal: carries `text`.
    PrefixOperator,
    /// Terminal: carries `text`.
    InfixOperator,
    /// Terminal: carries `text`.
    PostfixOperator,
}

impl NodeKind {
    /// Nominal declaration kinds a type node can bottom out on.
    pub fn is_nominal(self) -> bool {
        matches!(
            self,
            NodeKind::Enum | NodeKind::Structure | NodeKind::Class | NodeKind::Protocol | NodeKind::TypeAlias
        )
    }

    /// Kinds the Symbol Index's member classifier will recurse through.
    pub fn is_member(self) -> bool {
        matches!(
            self,
            NodeKind::Allocator
                | NodeKind::Deallocator
                | NodeKind::Constructor
                | NodeKind::Destructor
                | NodeKind::Getter
                | NodeKind::Setter
                | NodeKind::ModifyAccessor
                | NodeKind::ReadAccessor
                | NodeKind::Variable
                | NodeKind::Subscript
                | NodeKind::Function
        )
    }

    pub fn is_accessor(self) -> bool {
        matches!(
            self,
            NodeKind::Getter | NodeKind::Setter | NodeKind::ModifyAccessor | NodeKind::ReadAccessor
        )
    }
}

/// An immutable demangled syntax tree node.
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    text: Option<String>,
    children: Vec<NodeRef>,
    parent: RefCell<Weak<Node>>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn children(&self) -> &[NodeRef] {
        &self.children
    }

    pub fn child(&self, index: usize) -> Option<&NodeRef> {
        self.children.get(index)
    }

    /// The node's parent, if this node was attached as a child of another
    /// via [`Node::new`]. Root nodes (e.g. the `global` returned by a
    /// demangle) have no parent.
    pub fn parent(&self) -> Option<NodeRef> {
        self.parent.borrow().upgrade()
    }

    /// Builds a terminal node carrying `text`.
    pub fn leaf(kind: NodeKind, text: impl Into<String>) -> NodeRef {
        Self::build(kind, Some(text.into()), Vec::new())
    }

    /// Builds a non-terminal node from its children, wiring up parent
    /// back-references on each.
    pub fn new(kind: NodeKind, children: Vec<NodeRef>) -> NodeRef {
        Self::build(kind, None, children)
    }

    fn build(kind: NodeKind, text: Option<String>, children: Vec<NodeRef>) -> NodeRef {
        let node = Rc::new(Node {
            id: NodeId::next(),
            kind,
            text,
            children,
            parent: RefCell::new(Weak::new()),
        });
        for child in &node.children {
            *child.parent.borrow_mut() = Rc::downgrade(&node);
        }
        node
    }
}

/// Structural equality: kind, text, and children recursively. `id` and
/// `parent` are deliberately excluded so that two independent demanglings of
/// the same mangled name compare equal, which is required for them to be
/// usable as map keys (see the Symbol Index's type-node-keyed tables).
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.text == other.text && self.children == other.children
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.text.hash(state);
        self.children.hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Node");
        s.field("kind", &self.kind);
        if let Some(text) = &self.text {
            s.field("text", text);
        }
        if !self.children.is_empty() {
            s.field("children", &self.children);
        }
        s.finish()
    }
}

/// A small fluent builder for assembling [`Node`] trees in tests and in the
/// handful of call sites that synthesize nodes (e.g. the Symbol Index's
/// `typeNode = Node(type, [T])` construction).
#[derive(Default)]
pub struct NodeBuilder {
    children: Vec<NodeRef>,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(mut self, node: NodeRef) -> Self {
        self.children.push(node);
        self
    }

    pub fn build(self, kind: NodeKind) -> NodeRef {
        Node::new(kind, self.children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality_ignores_identity() {
        let a = Node::new(
            NodeKind::Type,
            vec![Node::new(
                NodeKind::Class,
                vec![
                    Node::leaf(NodeKind::Module, "Foo"),
                    Node::leaf(NodeKind::Identifier, "Bar"),
                ],
            )],
        );
        let b = Node::new(
            NodeKind::Type,
            vec![Node::new(
                NodeKind::Class,
                vec![
                    Node::leaf(NodeKind::Module, "Foo"),
                    Node::leaf(NodeKind::Identifier, "Bar"),
                ],
            )],
        );

        assert_eq!(a, b);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn parent_back_reference_is_set() {
        let leaf = Node::leaf(NodeKind::Identifier, "Bar");
        let parent = Node::new(NodeKind::Class, vec![leaf.clone()]);
        assert_eq!(leaf.parent().unwrap().id(), parent.id());
    }

    #[test]
    fn can_be_used_as_hash_map_key() {
        use std::collections::HashMap;

        let mut map: HashMap<NodeRef, &'static str> = HashMap::new();
        let key1 = Node::leaf(NodeKind::Identifier, "Bar");
        let key2 = Node::leaf(NodeKind::Identifier, "Bar");
        map.insert(key1, "first");
        assert_eq!(map.get(&key2), Some(&"first"));
    }
}
