//! The Symbol Index: turns a Mach-O image's symbol table into a
//! demangling-aware, multi-axis queryable index.
//!
//! See the crate-level algorithm description in [`Storage::build`].

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::debug;

use swiftsection_demangle::{demangle, Demangler, Node, NodeKind, NodeRef};
use swiftsection_macho::MachImage;

use crate::symbol::{
    GlobalKind, IndexedSymbol, IndexedSymbolRef, MemberKind, NlistFlags, Symbol, TypeInfo, TypeKind,
};

/// `typeName -> typeNode -> symbols`, keyed on `NodeRef`'s structural
/// equality so that two independent demanglings of the same type collapse
/// into one bucket.
type MemberBuckets = IndexMap<MemberKind, IndexMap<String, IndexMap<NodeRef, Vec<IndexedSymbolRef>>>>;

/// The per-image, read-mostly result of indexing a symbol table.
///
/// Every map here preserves insertion order (backed by [`indexmap::IndexMap`])
/// so that iteration is deterministic across runs, per the crate's ordering
/// invariant. The only field that changes after [`Storage::build`] returns
/// is each [`IndexedSymbol`]'s `consumed` latch, which is purely
/// observational.
pub struct Storage {
    type_info_by_name: IndexMap<String, TypeInfo>,
    globals_by_kind: IndexMap<GlobalKindTag, Vec<IndexedSymbolRef>>,
    opaque_type_descriptor_by_node: IndexMap<NodeRef, IndexedSymbolRef>,
    members_by_kind: MemberBuckets,
    method_descriptor_members: MemberBuckets,
    protocol_witness_members: MemberBuckets,
    all_by_kind: IndexMap<NodeKindTag, Vec<IndexedSymbolRef>>,
    symbols_by_offset: IndexMap<u64, Vec<Symbol>>,
    demangled_node_by_symbol: IndexMap<Symbol, NodeRef>,
}

/// Light, `Copy` wrapper so `NodeKind` can key an `IndexMap` without pulling
/// `Node` itself (and its recursive structural `Hash`) into the key type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct NodeKindTag(NodeKind);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum GlobalKindTag {
    Function,
    Variable { is_storage: bool },
}

impl From<&GlobalKind> for GlobalKindTag {
    fn from(kind: &GlobalKind) -> Self {
        match kind {
            GlobalKind::Function => GlobalKindTag::Function,
            GlobalKind::Variable { is_storage } => GlobalKindTag::Variable {
                is_storage: *is_storage,
            },
        }
    }
}

impl Storage {
    /// Builds the Symbol Index for `image`.
    pub fn build(image: &MachImage<'_>, demangler: &dyn Demangler) -> Self {
        let mut builder = Builder::default();
        builder.collect(image);
        builder.classify(demangler);
        builder.into_storage()
    }

    // ---- consumption API -------------------------------------------------

    pub fn all_symbols(&self) -> impl Iterator<Item = &IndexedSymbolRef> {
        self.all_by_kind.values().flatten()
    }

    pub fn symbols_by_kind(&self, kind: NodeKind) -> &[IndexedSymbolRef] {
        self.all_by_kind
            .get(&NodeKindTag(kind))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn symbols_of_kinds(&self, kinds: &[NodeKind]) -> Vec<IndexedSymbolRef> {
        kinds
            .iter()
            .flat_map(|kind| self.symbols_by_kind(*kind).iter().cloned())
            .collect()
    }

    pub fn type_info(&self, name: &str) -> Option<&TypeInfo> {
        self.type_info_by_name.get(name)
    }

    pub fn symbols_at_offset(&self, offset: u64) -> &[Symbol] {
        self.symbols_by_offset
            .get(&offset)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Looks up the node a symbol was demangled to. Symbols whose
    /// demangling failed during `build` are not present here; callers that
    /// need a best-effort answer regardless can fall back to demangling
    /// on demand without mutating any shared state.
    pub fn demangled_node(&self, symbol: &Symbol) -> Option<NodeRef> {
        self.demangled_node_by_symbol
            .get(symbol)
            .cloned()
            .or_else(|| demangle(&symbol.name))
    }

    pub fn global_symbols(&self, kind: &GlobalKind) -> &[IndexedSymbolRef] {
        self.globals_by_kind
            .get(&GlobalKindTag::from(kind))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn opaque_type_descriptor(&self, node: &NodeRef) -> Option<&IndexedSymbolRef> {
        self.opaque_type_descriptor_by_node.get(node)
    }

    /// All member symbols of any of `kinds`, across all types.
    pub fn member_symbols(&self, kinds: &[MemberKind]) -> Vec<IndexedSymbolRef> {
        Self::member_symbols_from(&self.members_by_kind, kinds)
    }

    pub fn method_descriptor_symbols(&self, kinds: &[MemberKind]) -> Vec<IndexedSymbolRef> {
        Self::member_symbols_from(&self.method_descriptor_members, kinds)
    }

    pub fn protocol_witness_symbols(&self, kinds: &[MemberKind]) -> Vec<IndexedSymbolRef> {
        Self::member_symbols_from(&self.protocol_witness_members, kinds)
    }

    fn member_symbols_from(buckets: &MemberBuckets, kinds: &[MemberKind]) -> Vec<IndexedSymbolRef> {
        kinds
            .iter()
            .filter_map(|kind| buckets.get(kind))
            .flat_map(|by_name| by_name.values())
            .flat_map(|by_node| by_node.values())
            .flat_map(|symbols| symbols.iter().cloned())
            .collect()
    }

    /// Member symbols of any of `kinds`, restricted to `type_name`.
    pub fn member_symbols_for_type(&self, kinds: &[MemberKind], type_name: &str) -> Vec<IndexedSymbolRef> {
        kinds
            .iter()
            .filter_map(|kind| self.members_by_kind.get(kind))
            .filter_map(|by_name| by_name.get(type_name))
            .flat_map(|by_node| by_node.values())
            .flat_map(|symbols| symbols.iter().cloned())
            .collect()
    }

    /// Member symbols of any of `kinds`, restricted to one exact type node.
    pub fn member_symbols_for_node(
        &self,
        kinds: &[MemberKind],
        type_name: &str,
        type_node: &NodeRef,
    ) -> Vec<IndexedSymbolRef> {
        kinds
            .iter()
            .filter_map(|kind| self.members_by_kind.get(kind))
            .filter_map(|by_name| by_name.get(type_name))
            .filter_map(|by_node| by_node.get(type_node))
            .flat_map(|symbols| symbols.iter().cloned())
            .collect()
    }

    /// Method-descriptor symbols of any of `kinds`, restricted to one exact
    /// type node. Used to resolve a class's method descriptors when
    /// attaching them to its `function`/`constructor` definitions.
    pub fn method_descriptor_symbols_for_node(
        &self,
        kinds: &[MemberKind],
        type_name: &str,
        type_node: &NodeRef,
    ) -> Vec<IndexedSymbolRef> {
        kinds
            .iter()
            .filter_map(|kind| self.method_descriptor_members.get(kind))
            .filter_map(|by_name| by_name.get(type_name))
            .filter_map(|by_node| by_node.get(type_node))
            .flat_map(|symbols| symbols.iter().cloned())
            .collect()
    }

    /// Method-descriptor symbols of any of `kinds`, restricted to `type_name`
    /// across every type node on record for it. Definitions built from
    /// metadata records (rather than from a symbol-table demangling) carry
    /// a synthesized type node that cannot be expected to structurally
    /// match the Symbol Index's own demangled nodes, so those callers key
    /// by name instead of by exact node.
    pub fn method_descriptor_symbols_for_type(
        &self,
        kinds: &[MemberKind],
        type_name: &str,
    ) -> Vec<IndexedSymbolRef> {
        kinds
            .iter()
            .filter_map(|kind| self.method_descriptor_members.get(kind))
            .filter_map(|by_name| by_name.get(type_name))
            .flat_map(|by_node| by_node.values())
            .flat_map(|symbols| symbols.iter().cloned())
            .collect()
    }

    /// Member symbols of any of `kinds`, grouped by kind (preserving the
    /// order of `kinds`, which is always caller-supplied and therefore
    /// authoritative per the Interface Indexer's Phase 4 ordering rule).
    pub fn member_symbols_grouped_by_kind(
        &self,
        kinds: &[MemberKind],
    ) -> IndexMap<MemberKind, Vec<IndexedSymbolRef>> {
        let mut out = IndexMap::new();
        for kind in kinds {
            out.insert(*kind, self.member_symbols(std::slice::from_ref(kind)));
        }
        out
    }

    /// Member symbols of any of `kinds`, grouped by type node -- the shape
    /// Phase 4 (extension indexing) consumes. `excluding` filters out whole
    /// type names up front.
    pub fn member_symbols_grouped_by_type_node(
        &self,
        kinds: &[MemberKind],
        excluding: &HashSet<String>,
    ) -> Vec<(NodeRef, String, IndexMap<MemberKind, Vec<IndexedSymbolRef>>)> {
        let mut by_node: IndexMap<NodeRef, (String, IndexMap<MemberKind, Vec<IndexedSymbolRef>>)> =
            IndexMap::new();

        for kind in kinds {
            let Some(by_name) = self.members_by_kind.get(kind) else {
                continue;
            };
            for (type_name, by_type_node) in by_name {
                if excluding.contains(type_name) {
                    continue;
                }
                for (node, symbols) in by_type_node {
                    let entry = by_node
                        .entry(node.clone())
                        .or_insert_with(|| (type_name.clone(), IndexMap::new()));
                    entry.1.entry(*kind).or_default().extend(symbols.iter().cloned());
                }
            }
        }

        by_node
            .into_iter()
            .map(|(node, (name, by_kind))| (node, name, by_kind))
            .collect()
    }

    /// An empty index, for tests that only need to exercise logic layered
    /// on top of `Storage` without parsing a real Mach-O image.
    #[cfg(test)]
    pub(crate) fn empty() -> Self {
        Storage {
            type_info_by_name: IndexMap::new(),
            globals_by_kind: IndexMap::new(),
            opaque_type_descriptor_by_node: IndexMap::new(),
            members_by_kind: IndexMap::new(),
            method_descriptor_members: IndexMap::new(),
            protocol_witness_members: IndexMap::new(),
            all_by_kind: IndexMap::new(),
            symbols_by_offset: IndexMap::new(),
            demangled_node_by_symbol: IndexMap::new(),
        }
    }

    /// An index carrying a single protocol-witness member, for tests
    /// exercising resilient-witness resolution without a Mach-O image.
    #[cfg(test)]
    pub(crate) fn with_protocol_witness(
        kind: MemberKind,
        type_name: &str,
        type_node: NodeRef,
        indexed: IndexedSymbolRef,
    ) -> Self {
        let mut storage = Self::empty();
        storage
            .protocol_witness_members
            .entry(kind)
            .or_default()
            .entry(type_name.to_owned())
            .or_default()
            .entry(type_node)
            .or_default()
            .push(indexed);
        storage
    }
}

#[derive(Default)]
struct Builder {
    symbol_by_name: IndexMap<String, Symbol>,
    symbols_by_offset: IndexMap<u64, Vec<Symbol>>,

    type_info_by_name: IndexMap<String, TypeInfo>,
    globals_by_kind: IndexMap<GlobalKindTag, Vec<IndexedSymbolRef>>,
    opaque_type_descriptor_by_node: IndexMap<NodeRef, IndexedSymbolRef>,
    members_by_kind: MemberBuckets,
    method_descriptor_members: MemberBuckets,
    protocol_witness_members: MemberBuckets,
    all_by_kind: IndexMap<NodeKindTag, Vec<IndexedSymbolRef>>,
    demangled_node_by_symbol: IndexMap<Symbol, NodeRef>,
}

impl Builder {
    /// Step 1: collect symbols from the ordinary and exported symbol
    /// tables, applying the shared-cache offset bias where applicable.
    fn collect(&mut self, image: &MachImage<'_>) {
        let shared_region_start = image.shared_cache().map(|h| h.shared_region_start);

        for symbol in image.symbols() {
            if !swiftsection_demangle::is_swift_symbol(&symbol.name) {
                continue;
            }
            let nlist = symbol.nlist.map(|n| NlistFlags {
                external: n.external,
                undefined: n.undefined,
            });
            let symbol = Symbol::new(symbol.offset, symbol.name.into_owned(), nlist);
            self.record(symbol.clone());

            // Ambiguous source behavior (documented, not guessed around): a
            // symbol with offset == 0 never indexes into shared-cache
            // adjusted tables, even when a shared cache is attached.
            if let Some(shared_region_start) = shared_region_start {
                if image.is_file_representation() && symbol.has_offset() {
                    let cache_relative = symbol.offset.wrapping_sub(shared_region_start);
                    let mut rebased = symbol.clone();
                    rebased.offset = cache_relative;
                    self.record(rebased);
                }
            }
        }

        let image_start_offset = image.load_address();
        for symbol in image.exported_symbols() {
            if !swiftsection_demangle::is_swift_symbol(&symbol.name) {
                continue;
            }
            if self.symbol_by_name.contains_key(symbol.name.as_ref()) {
                continue;
            }
            let at_exported_offset = Symbol::new(symbol.offset, symbol.name.as_ref(), None);
            let at_image_offset = Symbol::new(
                symbol.offset.wrapping_add(image_start_offset),
                symbol.name.as_ref(),
                None,
            );
            self.record(at_exported_offset.clone());
            self.record(at_image_offset);
            self.symbol_by_name
                .insert(symbol.name.into_owned(), at_exported_offset);
        }
    }

    fn record(&mut self, symbol: Symbol) {
        self.symbols_by_offset
            .entry(symbol.offset)
            .or_default()
            .push(symbol.clone());
        self.symbol_by_name.insert(symbol.name.clone(), symbol);
    }

    /// Step 2: classify every unique collected symbol.
    fn classify(&mut self, demangler: &dyn Demangler) {
        let symbols: Vec<Symbol> = self.symbol_by_name.values().cloned().collect();
        for symbol in symbols {
            let Some(root) = demangler.demangle(&symbol.name) else {
                debug!(name = %symbol.name, "demangling failed, symbol retained by offset only");
                continue;
            };
            if root.kind() != NodeKind::Global || root.children().is_empty() {
                debug!(name = %symbol.name, "demangled root is not a usable global, skipping");
                continue;
            }

            self.demangled_node_by_symbol
                .insert(symbol.clone(), root.clone());

            let n0 = root.children()[0].clone();
            self.all_by_kind
                .entry(NodeKindTag(n0.kind()))
                .or_default()
                .push(IndexedSymbol::new(symbol.clone(), root.clone()));

            if !symbol.is_external() {
                if let Some(global_kind) = process_global_symbol(&n0) {
                    self.globals_by_kind
                        .entry(GlobalKindTag::from(&global_kind))
                        .or_default()
                        .push(IndexedSymbol::new(symbol.clone(), root.clone()));
                    continue;
                }
            }

            self.classify_member(&symbol, &root, &n0);
        }
    }

    fn classify_member(&mut self, symbol: &Symbol, root: &NodeRef, n0: &NodeRef) {
        match n0.kind() {
            NodeKind::MethodDescriptor => {
                if let Some(child0) = n0.child(0) {
                    let child0 = child0.clone();
                    self.insert_member(symbol, root, &child0, Bucket::MethodDescriptor);
                }
            }
            NodeKind::ProtocolWitness => {
                if let Some(child0) = n0.child(0) {
                    let child0 = child0.clone();
                    self.insert_member(symbol, root, &child0, Bucket::ProtocolWitness);
                }
            }
            NodeKind::MergedFunction => {
                // It is unclear whether `children[1]` is guaranteed;
                // guard both accesses and skip on absence.
                if root.children().len() > 1 {
                    let classification_node = root.children()[1].clone();
                    self.insert_member(symbol, root, &classification_node, Bucket::Regular);
                }
            }
            NodeKind::OpaqueTypeDescriptor => {
                if symbol.offset > 0 {
                    if let Some(inner) = n0.child(0) {
                        if inner.kind() == NodeKind::OpaqueReturnTypeOf {
                            if let Some(x) = inner.child(0) {
                                self.opaque_type_descriptor_by_node
                                    .insert(x.clone(), IndexedSymbol::new(symbol.clone(), root.clone()));
                            }
                        }
                    }
                }
            }
            _ => self.insert_member(symbol, root, n0, Bucket::Regular),
        }
    }

    fn insert_member(&mut self, symbol: &Symbol, root: &NodeRef, node: &NodeRef, bucket: Bucket) {
        let Some(classified) = process_member_symbol(node) else {
            return;
        };
        let ClassifiedMember {
            kind,
            type_node,
            type_name,
            type_kind,
        } = classified;

        self.type_info_by_name.entry(type_name.clone()).or_insert(TypeInfo {
            name: type_name.clone(),
            kind: type_kind,
        });

        let indexed = IndexedSymbol::new(symbol.clone(), root.clone());
        let buckets = match bucket {
            Bucket::Regular => &mut self.members_by_kind,
            Bucket::MethodDescriptor => &mut self.method_descriptor_members,
            Bucket::ProtocolWitness => &mut self.protocol_witness_members,
        };
        buckets
            .entry(kind)
            .or_default()
            .entry(type_name)
            .or_default()
            .entry(type_node)
            .or_default()
            .push(indexed);
    }

    fn into_storage(self) -> Storage {
        Storage {
            type_info_by_name: self.type_info_by_name,
            globals_by_kind: self.globals_by_kind,
            opaque_type_descriptor_by_node: self.opaque_type_descriptor_by_node,
            members_by_kind: self.members_by_kind,
            method_descriptor_members: self.method_descriptor_members,
            protocol_witness_members: self.protocol_witness_members,
            all_by_kind: self.all_by_kind,
            symbols_by_offset: self.symbols_by_offset,
            demangled_node_by_symbol: self.demangled_node_by_symbol,
        }
    }
}

#[derive(Clone, Copy)]
enum Bucket {
    Regular,
    MethodDescriptor,
    ProtocolWitness,
}

/// The `isGlobal` predicate (Glossary): `n0` is one of
/// `{getter, setter, function, variable}`, and its inner variable's first
/// child is `module`. Accessors walk through their variable child.
fn process_global_symbol(n0: &NodeRef) -> Option<GlobalKind> {
    match n0.kind() {
        NodeKind::Function => {
            let context = n0.child(0)?;
            if context.kind() == NodeKind::Module {
                Some(GlobalKind::Function)
            } else {
                None
            }
        }
        NodeKind::Variable => {
            let context = n0.child(0)?;
            if context.kind() != NodeKind::Module {
                return None;
            }
            // Preserve observed behavior: `isStorage` reflects whether
            // this variable was reached directly (not via a getter/setter
            // wrapper), which we read off the node's own parent kind.
            let is_storage = n0
                .parent()
                .map(|parent| !parent.kind().is_accessor())
                .unwrap_or(true);
            Some(GlobalKind::Variable { is_storage })
        }
        NodeKind::Getter | NodeKind::Setter => {
            let variable = n0.child(0)?;
            if variable.kind() != NodeKind::Variable {
                return None;
            }
            let context = variable.child(0)?;
            if context.kind() != NodeKind::Module {
                return None;
            }
            Some(GlobalKind::Variable { is_storage: false })
        }
        _ => None,
    }
}

struct ClassifiedMember {
    kind: MemberKind,
    type_node: NodeRef,
    type_name: String,
    type_kind: TypeKind,
}

/// Peels a member node's outer wrappers (`static`, extension, accessor) per
/// the member classification rules, bottoming out on a type node whose
/// print is the canonical `typeName` key.
fn process_member_symbol(node: &NodeRef) -> Option<ClassifiedMember> {
    let mut node = node.clone();
    let mut is_static = false;

    loop {
        match node.kind() {
            NodeKind::Static => {
                let inner = node.child(0)?.clone();
                if !inner.kind().is_member() {
                    return None;
                }
                is_static = true;
                node = inner;
            }
            NodeKind::Allocator => {
                let (in_extension, t) = unwrap_context(node.child(0)?)?;
                return finish(MemberKind::Allocator { in_extension }, t);
            }
            NodeKind::Constructor => {
                let (in_extension, t) = unwrap_context(node.child(0)?)?;
                return finish(MemberKind::Constructor { in_extension }, t);
            }
            NodeKind::Deallocator => {
                let (_, t) = unwrap_context(node.child(0)?)?;
                return finish(MemberKind::Deallocator, t);
            }
            NodeKind::Destructor => {
                let (_, t) = unwrap_context(node.child(0)?)?;
                return finish(MemberKind::Destructor, t);
            }
            NodeKind::Function => {
                let (in_extension, t) = unwrap_context(node.child(0)?)?;
                return finish(MemberKind::Function { in_extension, is_static }, t);
            }
            NodeKind::Subscript => {
                let (in_extension, t) = unwrap_context(node.child(0)?)?;
                return finish(MemberKind::Subscript { in_extension, is_static }, t);
            }
            NodeKind::Variable => {
                // Fall-through to the stored-variable shape (preserved
                // as observed even though accessor presence already
                // encodes stored-vs-computed).
                let (in_extension, t) = unwrap_context(node.child(0)?)?;
                return finish(
                    MemberKind::Variable {
                        in_extension,
                        is_static,
                        is_storage: true,
                    },
                    t,
                );
            }
            NodeKind::Getter | NodeKind::Setter => {
                let child = node.child(0)?.clone();
                match child.kind() {
                    NodeKind::Variable => {
                        let (in_extension, t) = unwrap_context(child.child(0)?)?;
                        return finish(
                            MemberKind::Variable {
                                in_extension,
                                is_static,
                                is_storage: true,
                            },
                            t,
                        );
                    }
                    NodeKind::Subscript => {
                        let (in_extension, t) = unwrap_context(child.child(0)?)?;
                        return finish(MemberKind::Subscript { in_extension, is_static }, t);
                    }
                    _ => return None,
                }
            }
            _ => return None,
        }
    }
}

/// If `context` is an `extension(target, nominal)` node, unwraps to the
/// nominal target and reports `in_extension = true`; otherwise returns the
/// context unchanged.
fn unwrap_context(context: &NodeRef) -> Option<(bool, NodeRef)> {
    if context.kind() == NodeKind::Extension {
        Some((true, context.child(1)?.clone()))
    } else {
        Some((false, context.clone()))
    }
}

fn finish(kind: MemberKind, terminal: NodeRef) -> Option<ClassifiedMember> {
    let type_kind = match terminal.kind() {
        NodeKind::Enum => TypeKind::Enum,
        NodeKind::Structure => TypeKind::Struct,
        NodeKind::Class => TypeKind::Class,
        NodeKind::Protocol => TypeKind::Protocol,
        NodeKind::TypeAlias => TypeKind::TypeAlias,
        _ => return None,
    };
    let type_node = Node::new(NodeKind::Type, vec![terminal]);
    let type_name = swiftsection_demangle::print_type_name(&type_node);
    Some(ClassifiedMember {
        kind,
        type_node,
        type_name,
        type_kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;
    use swiftsection_testutils::nominal;

    /// `global -> static -> function(extension(X, Y), ...)`
    /// must classify under `function(inExtension=true, isStatic=true)` with
    /// the type name derived from `Y`.
    #[test]
    fn static_function_in_extension_classifies_correctly() {
        let y = nominal(NodeKind::Structure, "Foo", "Y");
        let extension = Node::new(NodeKind::Extension, vec![Node::leaf(NodeKind::Module, "Foo"), y]);
        let function = Node::new(NodeKind::Function, vec![extension]);
        let root = Node::new(NodeKind::Static, vec![function]);

        let classified = process_member_symbol(&root).expect("should classify");
        assert_eq!(
            classified.kind,
            MemberKind::Function {
                in_extension: true,
                is_static: true
            }
        );
        assert_eq!(classified.type_name, "Foo.Y");
    }

    #[test]
    fn stored_global_variable_has_no_member_bucket() {
        let module = Node::leaf(NodeKind::Module, "Foo");
        let variable = Node::new(NodeKind::Variable, vec![module]);
        let root = Node::new(NodeKind::Global, vec![variable]);

        let n0 = root.children()[0].clone();
        let kind = process_global_symbol(&n0).expect("should be global");
        assert_eq!(kind, GlobalKind::Variable { is_storage: true });
    }

    #[test]
    fn opaque_type_descriptor_requires_positive_offset() {
        let x = nominal(NodeKind::Structure, "Foo", "X");
        let opaque_of = Node::new(NodeKind::OpaqueReturnTypeOf, vec![x]);
        let descriptor = Node::new(NodeKind::OpaqueTypeDescriptor, vec![opaque_of]);
        let root = Node::new(NodeKind::Global, vec![descriptor]);

        let mut builder = Builder::default();
        let symbol_zero = Symbol::new(0, "$s3Foo1XVHo", None);
        let n0 = root.children()[0].clone();
        builder.classify_member(&symbol_zero, &root, &n0);
        assert!(builder.opaque_type_descriptor_by_node.is_empty());

        let symbol_pos = Symbol::new(42, "$s3Foo1XVHo", None);
        builder.classify_member(&symbol_pos, &root, &n0);
        assert_eq!(builder.opaque_type_descriptor_by_node.len(), 1);
    }

    #[test]
    fn merged_function_uses_second_child() {
        let target = nominal(NodeKind::Class, "Foo", "Z");
        let function = Node::new(NodeKind::Function, vec![target]);
        let placeholder = Node::leaf(NodeKind::Identifier, "ignored");
        let merged = Node::new(NodeKind::MergedFunction, vec![placeholder, function]);
        let root = Node::new(NodeKind::Global, vec![merged]);

        let mut builder = Builder::default();
        let symbol = Symbol::new(1, "$s3Foo1ZC1fyyFTm", None);
        let n0 = root.children()[0].clone();
        builder.classify_member(&symbol, &root, &n0);

        let bucket = builder
            .members_by_kind
            .get(&MemberKind::Function {
                in_extension: false,
                is_static: false,
            })
            .unwrap();
        assert!(bucket.contains_key("Foo.Z"));
    }

    #[test]
    fn merged_function_without_second_child_is_skipped() {
        let placeholder = Node::leaf(NodeKind::Identifier, "only");
        let merged = Node::new(NodeKind::MergedFunction, vec![placeholder]);
        let root = Node::new(NodeKind::Global, vec![merged]);

        let mut builder = Builder::default();
        let symbol = Symbol::new(1, "$sTm", None);
        let n0 = root.children()[0].clone();
        builder.classify_member(&symbol, &root, &n0);
        assert!(builder.members_by_kind.is_empty());
    }
}
