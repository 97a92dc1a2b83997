//! The definition graph: `TypeDefinition`, `ProtocolDefinition`, and
//! `ExtensionDefinition`, plus the per-kind member builders and the
//! on-demand indexing logic.
//!
//! Ownership follows the usual pattern for a DAG with upward references:
//! children are owned (`Rc`), parents are non-owning (`Weak`). The whole
//! graph is built single-threaded during the Interface Indexer's phases and
//! is read-only (aside from each definition's own lazily-latched `index()`)
//! afterwards.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use once_cell::unsync::OnceCell;

use swiftsection_demangle::{NodeKind, NodeRef};

use crate::metadata::{AssociatedTypeRecord, ProtocolConformanceRecord};
use crate::symbol::{MemberKind, Symbol, TypeKind};
use crate::symbol_index::Storage;

// ---- shared member shapes -------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessorKind {
    Getter,
    Setter,
    ModifyAccessor,
    ReadAccessor,
}

impl AccessorKind {
    fn from_node_kind(kind: NodeKind) -> Option<Self> {
        match kind {
            NodeKind::Getter => Some(Self::Getter),
            NodeKind::Setter => Some(Self::Setter),
            NodeKind::ModifyAccessor => Some(Self::ModifyAccessor),
            NodeKind::ReadAccessor => Some(Self::ReadAccessor),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Accessor {
    pub kind: AccessorKind,
    pub symbol: Symbol,
    pub method_descriptor: Option<Symbol>,
    pub offset: u64,
}

#[derive(Clone, Debug)]
pub struct VariableDefinition {
    pub name: String,
    pub node: NodeRef,
    pub is_static: bool,
    pub accessors: Vec<Accessor>,
}

#[derive(Clone, Debug)]
pub struct SubscriptDefinition {
    pub node: NodeRef,
    pub is_static: bool,
    pub accessors: Vec<Accessor>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    Allocator,
    Constructor,
    Function,
}

#[derive(Clone, Debug)]
pub struct FunctionDefinition {
    pub name: Option<String>,
    pub symbol: Symbol,
    pub node: NodeRef,
    pub kind: FunctionKind,
    pub is_global_or_static: bool,
    pub method_descriptor: Option<Symbol>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldFlags {
    pub is_lazy: bool,
    pub is_weak: bool,
    pub is_variable: bool,
    pub is_indirect_case: bool,
}

#[derive(Clone, Debug)]
pub struct FieldDefinition {
    pub name: String,
    pub flags: FieldFlags,
}

/// A raw member symbol item handed to the builders below:
/// `(symbol, demangledNode, offset)`.
#[derive(Clone)]
pub struct MemberItem {
    pub symbol: Symbol,
    pub node: NodeRef,
    pub offset: u64,
}

pub(crate) fn first_descendant(node: &NodeRef, predicate: impl Fn(&NodeRef) -> bool + Copy) -> Option<NodeRef> {
    if predicate(node) {
        return Some(node.clone());
    }
    for child in node.children() {
        if let Some(found) = first_descendant(child, predicate) {
            return Some(found);
        }
    }
    None
}

fn variable_descendant(node: &NodeRef) -> Option<NodeRef> {
    first_descendant(node, |n| n.kind() == NodeKind::Variable)
}

pub(crate) fn identifier_of(node: &NodeRef) -> Option<String> {
    first_descendant(node, |n| n.kind() == NodeKind::Identifier).and_then(|n| n.text().map(str::to_owned))
}

fn nominal_node_kind(kind: TypeKind) -> NodeKind {
    match kind {
        TypeKind::Enum => NodeKind::Enum,
        TypeKind::Struct => NodeKind::Structure,
        TypeKind::Class => NodeKind::Class,
        TypeKind::Protocol => NodeKind::Protocol,
        TypeKind::TypeAlias => NodeKind::TypeAlias,
    }
}

/// Synthesizes a nominal `{module, identifier}` node standing in for a
/// metadata record's type, since the metadata reader hands back a flat
/// dotted name rather than a real context-descriptor chain. Used only as a
/// key for nesting/extension bookkeeping -- member lookups go through the
/// Symbol Index by name (see `TypeDefinition::index`'s doc comment), not by
/// comparing this node against demangled ones.
pub(crate) fn synthesize_type_node(name: &str, kind: TypeKind) -> NodeRef {
    use swiftsection_demangle::Node;
    let (module, rest) = name.split_once('.').unwrap_or((name, ""));
    let identifier = if rest.is_empty() { module } else { rest };
    Node::new(
        nominal_node_kind(kind),
        vec![
            Node::leaf(NodeKind::Module, module),
            Node::leaf(NodeKind::Identifier, identifier),
        ],
    )
}

pub mod builders {
    use super::*;

    /// Groups by the first `.variable` descendant's identifier, dropping
    /// accessors whose name is a known field (already covered by a stored
    /// field of the same name). The chosen representative node is the first
    /// with a `getter` child, or the first item at all if none has one.
    pub fn build_variables(items: &[MemberItem], known_field_names: &HashMap<String, ()>) -> Vec<VariableDefinition> {
        let mut groups: IndexMap<String, Vec<&MemberItem>> = IndexMap::new();
        for item in items {
            let Some(variable) = variable_descendant(&item.node) else {
                continue;
            };
            let Some(name) = identifier_of(&variable) else {
                continue;
            };
            if known_field_names.contains_key(&name) && item.node.kind() != NodeKind::Getter {
                continue;
            }
            groups.entry(name).or_default().push(item);
        }

        groups
            .into_iter()
            .map(|(name, members)| {
                let representative = members
                    .iter()
                    .find(|m| {
                        first_descendant(&m.node, |n| n.kind() == NodeKind::Getter).is_some()
                    })
                    .or_else(|| members.first())
                    .expect("group is non-empty");

                let accessors = members
                    .iter()
                    .filter_map(|m| {
                        let kind = AccessorKind::from_node_kind(m.node.kind())?;
                        Some(Accessor {
                            kind,
                            symbol: m.symbol.clone(),
                            method_descriptor: None,
                            offset: m.offset,
                        })
                    })
                    .collect();

                VariableDefinition {
                    name,
                    node: representative.node.clone(),
                    is_static: false,
                    accessors,
                }
            })
            .collect()
    }

    /// Groups by the `.subscript` descendant node itself (structural key).
    pub fn build_subscripts(items: &[MemberItem]) -> Vec<SubscriptDefinition> {
        let mut groups: IndexMap<NodeRef, Vec<&MemberItem>> = IndexMap::new();
        for item in items {
            let Some(subscript) = first_descendant(&item.node, |n| n.kind() == NodeKind::Subscript) else {
                continue;
            };
            groups.entry(subscript).or_default().push(item);
        }

        groups
            .into_iter()
            .map(|(node, members)| {
                let accessors = members
                    .iter()
                    .filter_map(|m| {
                        let kind = AccessorKind::from_node_kind(m.node.kind())?;
                        Some(Accessor {
                            kind,
                            symbol: m.symbol.clone(),
                            method_descriptor: None,
                            offset: m.offset,
                        })
                    })
                    .collect();
                SubscriptDefinition {
                    node,
                    is_static: false,
                    accessors,
                }
            })
            .collect()
    }

    /// One `FunctionDefinition` per allocator symbol; allocators are always
    /// global-or-static.
    pub fn build_allocators(items: &[MemberItem]) -> Vec<FunctionDefinition> {
        items
            .iter()
            .map(|item| FunctionDefinition {
                name: None,
                symbol: item.symbol.clone(),
                node: item.node.clone(),
                kind: FunctionKind::Allocator,
                is_global_or_static: true,
                method_descriptor: None,
            })
            .collect()
    }

    /// One `FunctionDefinition` per symbol; requires a `.function`
    /// descendant carrying an identifier. `method_descriptor_lookup`
    /// attaches a resolved method descriptor symbol when the
    /// function's own node is a key in the map.
    pub fn build_functions(
        items: &[MemberItem],
        kind: FunctionKind,
        is_static: bool,
        method_descriptor_lookup: &IndexMap<NodeRef, Symbol>,
    ) -> Vec<FunctionDefinition> {
        items
            .iter()
            .filter_map(|item| {
                let function = first_descendant(&item.node, |n| n.kind() == NodeKind::Function)?;
                let name = identifier_of(&function)?;
                let method_descriptor = method_descriptor_lookup.get(&function).cloned();
                Some(FunctionDefinition {
                    name: Some(name),
                    symbol: item.symbol.clone(),
                    node: item.node.clone(),
                    kind,
                    is_global_or_static: is_static,
                    method_descriptor,
                })
            })
            .collect()
    }
}

// ---- TypeDefinition --------------------------------------------------------

#[derive(Clone, Debug)]
pub enum ParentContext {
    /// A type parent whose `typeName` was not present in the working map
    /// when this definition's parent chain was walked.
    Type(NodeRef),
    Extension(NodeRef),
    Symbol(Symbol),
}

pub struct TypeDefinition {
    pub type_node: NodeRef,
    pub type_name: String,
    pub kind: TypeKind,
    parent: RefCell<Weak<TypeDefinition>>,
    pub parent_context: RefCell<Option<ParentContext>>,
    pub type_children: RefCell<Vec<Rc<TypeDefinition>>>,
    pub protocol_children: RefCell<Vec<Rc<ProtocolDefinition>>>,

    fields: OnceCell<Vec<FieldDefinition>>,
    variables: OnceCell<Vec<VariableDefinition>>,
    static_variables: OnceCell<Vec<VariableDefinition>>,
    functions: OnceCell<Vec<FunctionDefinition>>,
    static_functions: OnceCell<Vec<FunctionDefinition>>,
    subscripts: OnceCell<Vec<SubscriptDefinition>>,
    static_subscripts: OnceCell<Vec<SubscriptDefinition>>,
    allocators: OnceCell<Vec<FunctionDefinition>>,
    constructors: OnceCell<Vec<FunctionDefinition>>,
    has_deallocator: Cell<bool>,
    has_destructor: Cell<bool>,
    indexed: OnceCell<()>,
}

impl TypeDefinition {
    pub fn new(type_node: NodeRef, type_name: String, kind: TypeKind) -> Rc<Self> {
        Rc::new(Self {
            type_node,
            type_name,
            kind,
            parent: RefCell::new(Weak::new()),
            parent_context: RefCell::new(None),
            type_children: RefCell::new(Vec::new()),
            protocol_children: RefCell::new(Vec::new()),
            fields: OnceCell::new(),
            variables: OnceCell::new(),
            static_variables: OnceCell::new(),
            functions: OnceCell::new(),
            static_functions: OnceCell::new(),
            subscripts: OnceCell::new(),
            static_subscripts: OnceCell::new(),
            allocators: OnceCell::new(),
            constructors: OnceCell::new(),
            has_deallocator: Cell::new(false),
            has_destructor: Cell::new(false),
            indexed: OnceCell::new(),
        })
    }

    pub fn parent(&self) -> Option<Rc<TypeDefinition>> {
        self.parent.borrow().upgrade()
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none() && self.parent_context.borrow().is_none()
    }

    /// Adopts `child` as a nested type, wiring up the weak parent
    /// back-reference. Never called after `child` already has a parent.
    pub fn adopt_type_child(self: &Rc<Self>, child: &Rc<TypeDefinition>) {
        *child.parent.borrow_mut() = Rc::downgrade(self);
        self.type_children.borrow_mut().push(child.clone());
    }

    pub fn adopt_protocol_child(self: &Rc<Self>, child: &Rc<ProtocolDefinition>) {
        *child.parent.borrow_mut() = Rc::downgrade(self);
        self.protocol_children.borrow_mut().push(child.clone());
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed.get().is_some()
    }

    /// Latches this type's field list from a field-descriptor record, ahead
    /// of `index()`'s own member queries. A second call (or a call after
    /// `index()` already ran its own `fields.set(Vec::new())`) is a no-op,
    /// per `OnceCell`'s semantics.
    pub(crate) fn set_fields(&self, fields: Vec<FieldDefinition>) {
        let _ = self.fields.set(fields);
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        self.fields.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn variables(&self) -> &[VariableDefinition] {
        self.variables.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn static_variables(&self) -> &[VariableDefinition] {
        self.static_variables.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn functions(&self) -> &[FunctionDefinition] {
        self.functions.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn static_functions(&self) -> &[FunctionDefinition] {
        self.static_functions.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn subscripts(&self) -> &[SubscriptDefinition] {
        self.subscripts.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn static_subscripts(&self) -> &[SubscriptDefinition] {
        self.static_subscripts.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn allocators(&self) -> &[FunctionDefinition] {
        self.allocators.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn constructors(&self) -> &[FunctionDefinition] {
        self.constructors.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_deallocator(&self) -> bool {
        self.has_deallocator.get()
    }

    pub fn has_destructor(&self) -> bool {
        self.has_destructor.get()
    }

    /// Populates this definition's member lists from the Symbol Index.
    /// Idempotent: a second call is a no-op.
    pub fn index(self: &Rc<Self>, storage: &Storage) {
        if self.indexed.get().is_some() {
            return;
        }

        let known_field_names: HashMap<String, ()> =
            self.fields().iter().map(|f| (f.name.clone(), ())).collect();

        // Member queries are keyed by type name rather than by exact type
        // node: this definition's `type_node` is synthesized from a flat
        // metadata record (see `build_method_descriptor_lookup`'s doc
        // comment), so it is not guaranteed to structurally match the nodes
        // the Symbol Index produced by demangling the actual member symbols.
        let non_static = |kind: MemberKind| -> Vec<MemberItem> {
            storage
                .member_symbols_for_type(&[kind], &self.type_name)
                .into_iter()
                .map(|indexed| MemberItem {
                    symbol: indexed.touch().symbol.clone(),
                    node: indexed.node.clone(),
                    offset: indexed.symbol.offset,
                })
                .collect()
        };

        let variable_items = non_static(MemberKind::Variable {
            in_extension: false,
            is_static: false,
            is_storage: true,
        });
        let static_variable_items = non_static(MemberKind::Variable {
            in_extension: false,
            is_static: true,
            is_storage: true,
        });
        let function_items = non_static(MemberKind::Function {
            in_extension: false,
            is_static: false,
        });
        let static_function_items = non_static(MemberKind::Function {
            in_extension: false,
            is_static: true,
        });
        let subscript_items = non_static(MemberKind::Subscript {
            in_extension: false,
            is_static: false,
        });
        let static_subscript_items = non_static(MemberKind::Subscript {
            in_extension: false,
            is_static: true,
        });
        let allocator_items = non_static(MemberKind::Allocator { in_extension: false });
        let constructor_items = non_static(MemberKind::Constructor { in_extension: false });

        // For class types, resolve method descriptors whose
        // demangled protocol-conformance child structurally matches this
        // class's own type node, keyed by the descriptor's function node so
        // the builders below can attach them.
        let method_descriptor_lookup = if self.kind == TypeKind::Class {
            build_method_descriptor_lookup(storage, &self.type_name)
        } else {
            IndexMap::new()
        };

        let _ = self
            .variables
            .set(builders::build_variables(&variable_items, &known_field_names));
        let _ = self.static_variables.set(
            builders::build_variables(&static_variable_items, &known_field_names)
                .into_iter()
                .map(|mut v| {
                    v.is_static = true;
                    v
                })
                .collect(),
        );
        let _ = self.functions.set(builders::build_functions(
            &function_items,
            FunctionKind::Function,
            false,
            &method_descriptor_lookup,
        ));
        let _ = self.static_functions.set(builders::build_functions(
            &static_function_items,
            FunctionKind::Function,
            true,
            &method_descriptor_lookup,
        ));
        let _ = self.subscripts.set(builders::build_subscripts(&subscript_items));
        let _ = self.static_subscripts.set(
            builders::build_subscripts(&static_subscript_items)
                .into_iter()
                .map(|mut s| {
                    s.is_static = true;
                    s
                })
                .collect(),
        );
        let _ = self.allocators.set(builders::build_allocators(&allocator_items));
        let _ = self.constructors.set(builders::build_functions(
            &constructor_items,
            FunctionKind::Constructor,
            true,
            &method_descriptor_lookup,
        ));

        self.has_deallocator.set(
            !storage
                .member_symbols_for_type(&[MemberKind::Deallocator], &self.type_name)
                .is_empty(),
        );
        self.has_destructor.set(
            !storage
                .member_symbols_for_type(&[MemberKind::Destructor], &self.type_name)
                .is_empty(),
        );

        // Normally already latched by `set_fields` from a field-descriptor
        // record during Phase 1; this covers types with no such record.
        let _ = self.fields.set(Vec::new());
        let _ = self.indexed.set(());
    }
}

// ---- ProtocolDefinition -----------------------------------------------------

pub struct ProtocolDefinition {
    pub protocol_node: NodeRef,
    pub protocol_name: String,
    parent: RefCell<Weak<TypeDefinition>>,
    pub extension_context: RefCell<Option<NodeRef>>,
    functions: OnceCell<Vec<FunctionDefinition>>,
    variables: OnceCell<Vec<VariableDefinition>>,
    subscripts: OnceCell<Vec<SubscriptDefinition>>,
    indexed: OnceCell<()>,
}

impl ProtocolDefinition {
    pub fn new(protocol_node: NodeRef, protocol_name: String) -> Rc<Self> {
        Rc::new(Self {
            protocol_node,
            protocol_name,
            parent: RefCell::new(Weak::new()),
            extension_context: RefCell::new(None),
            functions: OnceCell::new(),
            variables: OnceCell::new(),
            subscripts: OnceCell::new(),
            indexed: OnceCell::new(),
        })
    }

    pub fn parent(&self) -> Option<Rc<TypeDefinition>> {
        self.parent.borrow().upgrade()
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none() && self.extension_context.borrow().is_none()
    }

    pub fn functions(&self) -> &[FunctionDefinition] {
        self.functions.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn variables(&self) -> &[VariableDefinition] {
        self.variables.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn subscripts(&self) -> &[SubscriptDefinition] {
        self.subscripts.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed.get().is_some()
    }

    /// Protocols carry requirement declarations, not implementations; the
    /// member lists here are requirement signatures, built the same way as
    /// a type's non-static members (protocols have no `static` axis of
    /// their own -- `Self`-static requirements still demangle as instance
    /// members of the protocol).
    pub fn index(self: &Rc<Self>, storage: &Storage) {
        if self.indexed.get().is_some() {
            return;
        }
        let name = &self.protocol_name;

        let items = |kind: MemberKind| -> Vec<MemberItem> {
            storage
                .member_symbols_for_type(&[kind], name)
                .into_iter()
                .map(|indexed| MemberItem {
                    symbol: indexed.touch().symbol.clone(),
                    node: indexed.node.clone(),
                    offset: indexed.symbol.offset,
                })
                .collect()
        };

        let _ = self.functions.set(builders::build_functions(
            &items(MemberKind::Function {
                in_extension: false,
                is_static: false,
            }),
            FunctionKind::Function,
            false,
            &IndexMap::new(),
        ));
        let _ = self.variables.set(builders::build_variables(
            &items(MemberKind::Variable {
                in_extension: false,
                is_static: false,
                is_storage: true,
            }),
            &HashMap::new(),
        ));
        let _ = self.subscripts.set(builders::build_subscripts(&items(MemberKind::Subscript {
            in_extension: false,
            is_static: false,
        })));
        let _ = self.indexed.set(());
    }
}

// ---- ExtensionDefinition ----------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExtensionTargetKind {
    Type(TypeKind),
    Protocol,
    TypeAlias,
}

#[derive(Clone)]
pub struct ExtensionName {
    pub target_node: NodeRef,
    pub kind: ExtensionTargetKind,
}

/// An indirect protocol-conformance witness whose implementation could not
/// be resolved to a symbol during extension indexing.
#[derive(Clone, Debug)]
pub struct ResilientWitness {
    pub requirement_node: NodeRef,
    pub requirement_name: String,
}

pub struct ExtensionDefinition {
    pub name: ExtensionName,
    pub generic_signature: Option<NodeRef>,
    pub protocol_conformance: RefCell<Option<ProtocolConformanceRecord>>,
    pub associated_type: RefCell<Option<AssociatedTypeRecord>>,
    pub types: RefCell<Vec<Rc<TypeDefinition>>>,
    pub protocols: RefCell<Vec<Rc<ProtocolDefinition>>>,

    variables: OnceCell<Vec<VariableDefinition>>,
    static_variables: OnceCell<Vec<VariableDefinition>>,
    functions: OnceCell<Vec<FunctionDefinition>>,
    static_functions: OnceCell<Vec<FunctionDefinition>>,
    subscripts: OnceCell<Vec<SubscriptDefinition>>,
    static_subscripts: OnceCell<Vec<SubscriptDefinition>>,
    allocators: OnceCell<Vec<FunctionDefinition>>,
    pub missing_symbol_witnesses: RefCell<Vec<ResilientWitness>>,
    /// Witnesses that did resolve to a symbol, appended as they're resolved
    /// rather than latched once: unlike the member lists above, this isn't
    /// handed over in one shot by Phase 4, since the conformance this
    /// extension may have merged with (see `InterfaceIndexer::index_extensions`)
    /// was never indexed through `index_with_members` in the first place.
    resolved_witnesses: RefCell<Vec<FunctionDefinition>>,
    indexed: OnceCell<()>,
}

impl ExtensionDefinition {
    pub fn new(name: ExtensionName) -> Rc<Self> {
        Rc::new(Self {
            name,
            generic_signature: None,
            protocol_conformance: RefCell::new(None),
            associated_type: RefCell::new(None),
            types: RefCell::new(Vec::new()),
            protocols: RefCell::new(Vec::new()),
            variables: OnceCell::new(),
            static_variables: OnceCell::new(),
            functions: OnceCell::new(),
            static_functions: OnceCell::new(),
            subscripts: OnceCell::new(),
            static_subscripts: OnceCell::new(),
            allocators: OnceCell::new(),
            missing_symbol_witnesses: RefCell::new(Vec::new()),
            resolved_witnesses: RefCell::new(Vec::new()),
            indexed: OnceCell::new(),
        })
    }

    pub fn with_generic_signature(mut self: Rc<Self>, signature: Option<NodeRef>) -> Rc<Self> {
        Rc::get_mut(&mut self).expect("no other Rc clones yet").generic_signature = signature;
        self
    }

    pub fn with_protocol_conformance(self: Rc<Self>, record: Option<ProtocolConformanceRecord>) -> Rc<Self> {
        *self.protocol_conformance.borrow_mut() = record;
        self
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed.get().is_some()
    }

    pub fn variables(&self) -> &[VariableDefinition] {
        self.variables.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn static_variables(&self) -> &[VariableDefinition] {
        self.static_variables.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn functions(&self) -> &[FunctionDefinition] {
        self.functions.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn static_functions(&self) -> &[FunctionDefinition] {
        self.static_functions.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn subscripts(&self) -> &[SubscriptDefinition] {
        self.subscripts.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn static_subscripts(&self) -> &[SubscriptDefinition] {
        self.static_subscripts.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn allocators(&self) -> &[FunctionDefinition] {
        self.allocators.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn resolved_witnesses(&self) -> std::cell::Ref<'_, Vec<FunctionDefinition>> {
        self.resolved_witnesses.borrow()
    }

    /// Populates member lists for members already collected by Phase 4 (the
    /// indexer passes them in directly, since they were already grouped by
    /// extension target there). Idempotent.
    pub fn index_with_members(
        self: &Rc<Self>,
        variables: Vec<VariableDefinition>,
        static_variables: Vec<VariableDefinition>,
        functions: Vec<FunctionDefinition>,
        static_functions: Vec<FunctionDefinition>,
        subscripts: Vec<SubscriptDefinition>,
        static_subscripts: Vec<SubscriptDefinition>,
        allocators: Vec<FunctionDefinition>,
    ) {
        if self.indexed.get().is_some() {
            return;
        }
        let _ = self.variables.set(variables);
        let _ = self.static_variables.set(static_variables);
        let _ = self.functions.set(functions);
        let _ = self.static_functions.set(static_functions);
        let _ = self.subscripts.set(subscripts);
        let _ = self.static_subscripts.set(static_subscripts);
        let _ = self.allocators.set(allocators);
        let _ = self.indexed.set(());
    }

    /// Resolves resilient witnesses against an attached protocol conformance:
    /// structural match first, then textual type-name match, then an
    /// optional primitive-name rewrite. A match becomes a `FunctionDefinition`
    /// on `resolved_witnesses`; an unresolved witness is appended to
    /// `missing_symbol_witnesses` instead.
    pub fn resolve_resilient_witnesses(
        self: &Rc<Self>,
        storage: &Storage,
        witnesses: &[ResilientWitness],
        primitive_name_rewrites: &HashMap<String, String>,
    ) {
        let target_name = swiftsection_demangle::print_type_name(&self.name.target_node);

        for witness in witnesses {
            let candidates = storage.protocol_witness_symbols(&[
                MemberKind::Function { in_extension: false, is_static: false },
                MemberKind::Function { in_extension: true, is_static: false },
            ]);

            let matched = candidates
                .iter()
                .find(|indexed| {
                    conformance_target(&indexed.node)
                        .map(|n| n == self.name.target_node)
                        .unwrap_or(false)
                })
                .or_else(|| {
                    candidates.iter().find(|indexed| {
                        conformance_target(&indexed.node)
                            .map(|n| swiftsection_demangle::print_type_name(&n) == target_name)
                            .unwrap_or(false)
                    })
                })
                .or_else(|| {
                    primitive_name_rewrites.get(&target_name).and_then(|primitive| {
                        candidates.iter().find(|indexed| {
                            conformance_target(&indexed.node)
                                .map(|n| &swiftsection_demangle::print_type_name(&n) == primitive)
                                .unwrap_or(false)
                        })
                    })
                });

            match matched {
                Some(indexed) => {
                    let indexed = indexed.touch();
                    self.resolved_witnesses.borrow_mut().push(FunctionDefinition {
                        name: Some(witness.requirement_name.clone()),
                        symbol: indexed.symbol.clone(),
                        node: indexed.node.clone(),
                        kind: FunctionKind::Function,
                        is_global_or_static: false,
                        method_descriptor: None,
                    });
                }
                None => {
                    self.missing_symbol_witnesses.borrow_mut().push(witness.clone());
                }
            }
        }
    }
}

fn conformance_target(node: &NodeRef) -> Option<NodeRef> {
    first_descendant(node, |n| n.kind() == NodeKind::ProtocolConformance)
        .and_then(|conformance| conformance.child(0).cloned())
}

/// Builds the `methodDescriptorLookup` table a class's `index()` consults:
/// among this class's method-descriptor symbols, the first whose demangled
/// protocol-conformance child prints to this class's own type name
/// contributes `functionNode -> descriptorSymbol`, keyed by the descriptor's
/// own `.function` descendant node. Matching is by printed name rather than
/// by structural node equality because `type_node` here is synthesized from
/// a flat metadata record, not demangled from the descriptor symbol itself
/// (see the Symbol Index's `method_descriptor_symbols_for_type`).
fn build_method_descriptor_lookup(storage: &Storage, type_name: &str) -> IndexMap<NodeRef, Symbol> {
    let mut lookup = IndexMap::new();
    let descriptors = storage.method_descriptor_symbols_for_type(
        &[
            MemberKind::Function { in_extension: false, is_static: false },
            MemberKind::Function { in_extension: false, is_static: true },
            MemberKind::Function { in_extension: true, is_static: false },
            MemberKind::Function { in_extension: true, is_static: true },
        ],
        type_name,
    );
    for descriptor in descriptors {
        let Some(target) = conformance_target(&descriptor.node) else {
            continue;
        };
        if swiftsection_demangle::print_type_name(&target) != type_name {
            continue;
        }
        let Some(function) = first_descendant(&descriptor.node, |n| n.kind() == NodeKind::Function) else {
            continue;
        };
        lookup
            .entry(function)
            .or_insert_with(|| descriptor.touch().symbol.clone());
    }
    lookup
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;
    use swiftsection_demangle::Node;
    use swiftsection_testutils::nominal;

    #[test]
    fn adopting_a_type_child_sets_the_weak_back_reference() {
        let parent = TypeDefinition::new(nominal(NodeKind::Structure, "Foo", "Outer"), "Foo.Outer".into(), TypeKind::Struct);
        let child = TypeDefinition::new(nominal(NodeKind::Class, "Foo", "Inner"), "Foo.Outer.Inner".into(), TypeKind::Class);

        parent.adopt_type_child(&child);

        assert!(child.parent().is_some());
        assert_eq!(child.parent().unwrap().type_name, "Foo.Outer");
        assert_eq!(parent.type_children.borrow().len(), 1);
    }

    #[test]
    fn root_definitions_have_neither_parent_nor_context() {
        let root = TypeDefinition::new(nominal(NodeKind::Structure, "Foo", "X"), "Foo.X".into(), TypeKind::Struct);
        assert!(root.is_root());

        *root.parent_context.borrow_mut() = Some(ParentContext::Symbol(Symbol::new(0, "$s3Foo1XV", None)));
        assert!(!root.is_root());
    }

    #[test]
    fn index_with_members_is_idempotent() {
        let ext = ExtensionDefinition::new(ExtensionName {
            target_node: nominal(NodeKind::Structure, "Foo", "X"),
            kind: ExtensionTargetKind::Type(TypeKind::Struct),
        });
        let allocator = FunctionDefinition {
            name: None,
            symbol: Symbol::new(1, "$s3Foo1XVACycfC", None),
            node: nominal(NodeKind::Structure, "Foo", "X"),
            kind: FunctionKind::Allocator,
            is_global_or_static: true,
            method_descriptor: None,
        };
        ext.index_with_members(
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            vec![allocator],
        );
        assert_eq!(ext.allocators().len(), 1);

        // Second call must not overwrite/duplicate the first.
        ext.index_with_members(
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        assert_eq!(ext.allocators().len(), 1);
    }

    #[test]
    fn resolved_witness_attaches_a_function_on_structural_match() {
        let target = nominal(NodeKind::Structure, "Foo", "X");
        let conformance = Node::new(NodeKind::ProtocolConformance, vec![target.clone()]);
        let witness_node = Node::new(NodeKind::Function, vec![conformance]);
        let symbol = Symbol::new(5, "$s3Foo1XVAA8SequenceAAWl", None);
        let indexed = crate::symbol::IndexedSymbol::new(symbol, witness_node);

        let storage = Storage::with_protocol_witness(
            MemberKind::Function { in_extension: false, is_static: false },
            "Foo",
            target.clone(),
            indexed,
        );

        let extension = ExtensionDefinition::new(ExtensionName {
            target_node: target,
            kind: ExtensionTargetKind::Type(TypeKind::Struct),
        });
        let witness = ResilientWitness {
            requirement_node: Node::leaf(NodeKind::Identifier, "next"),
            requirement_name: "next".into(),
        };

        extension.resolve_resilient_witnesses(&storage, &[witness], &HashMap::new());

        assert!(extension.missing_symbol_witnesses.borrow().is_empty());
        assert_eq!(extension.resolved_witnesses().len(), 1);
        assert_eq!(extension.resolved_witnesses()[0].name.as_deref(), Some("next"));
    }

    #[test]
    fn unmatched_witness_is_recorded_as_missing() {
        let target = nominal(NodeKind::Structure, "Foo", "X");
        let extension = ExtensionDefinition::new(ExtensionName {
            target_node: target,
            kind: ExtensionTargetKind::Type(TypeKind::Struct),
        });
        let witness = ResilientWitness {
            requirement_node: Node::leaf(NodeKind::Identifier, "next"),
            requirement_name: "next".into(),
        };

        let storage = Storage::empty();
        extension.resolve_resilient_witnesses(&storage, &[witness], &HashMap::new());

        assert_eq!(extension.missing_symbol_witnesses.borrow().len(), 1);
        assert!(extension.resolved_witnesses().is_empty());
    }
}
