//! The Interface Indexer: fuses metadata section records with the Symbol
//! Index to produce the definition graph (`TypeDefinition`,
//! `ProtocolDefinition`, `ExtensionDefinition`) and the two flat global
//! lists.
//!
//! [`InterfaceIndexer::prepare`] runs five phases in a fixed order --
//! extraction, types, protocols, conformances/associated types, extensions,
//! globals -- each bracketed by a `started`/`completed` event pair. Every
//! phase here is infallible in practice: nothing in this crate's metadata
//! model (see `metadata.rs`'s module doc) can raise the kind of uncaught
//! error `prepare()`'s contract allows it to re-throw, so [`IndexerError`]
//! is carried in the return type for that contract without ever being
//! constructed by the current phases.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tokio::sync::Semaphore;

use swiftsection_demangle::{NodeKind, NodeRef};

use crate::config::SwiftInterfaceIndexConfiguration;
use crate::definitions::{
    builders, first_descendant, identifier_of, synthesize_type_node, ExtensionDefinition,
    ExtensionName, ExtensionTargetKind, FieldDefinition, FunctionKind, MemberItem, ParentContext,
    ProtocolDefinition, TypeDefinition,
};
use crate::error::IndexerError;
use crate::events::{
    EventSink, IndexerEvent, MetadataSection, Phase as IndexerPhase, ProcessingFailureKind,
};
use crate::metadata::{
    AssociatedTypeRecord, FieldRecord, MetadataReader, ProtocolConformanceRecord, ProtocolRecord,
    RecordParent, TypeRecord,
};
use crate::symbol::{GlobalKind, IndexedSymbolRef, MemberKind, Symbol, TypeInfo, TypeKind};
use crate::symbol_index::Storage;

/// One entry of `globalFunctionDefinitions`.
#[derive(Clone, Debug)]
pub struct GlobalFunctionDefinition {
    pub name: String,
    pub symbol: Symbol,
    pub node: NodeRef,
}

/// One entry of `globalVariableDefinitions`.
#[derive(Clone, Debug)]
pub struct GlobalVariableDefinition {
    pub name: String,
    pub symbol: Symbol,
    pub node: NodeRef,
    pub is_storage: bool,
    pub is_global_or_static: bool,
}

/// Orchestrates the five indexing phases over a [`Storage`] and a
/// [`MetadataReader`], producing the definition graph.
pub struct InterfaceIndexer {
    storage: Storage,
    metadata: Box<dyn MetadataReader>,
    config: SwiftInterfaceIndexConfiguration,
    events: Box<dyn EventSink>,

    pub all_type_definitions: IndexMap<String, Rc<TypeDefinition>>,
    pub root_type_definitions: Vec<Rc<TypeDefinition>>,
    pub all_protocol_definitions: IndexMap<String, Rc<ProtocolDefinition>>,
    pub root_protocol_definitions: Vec<Rc<ProtocolDefinition>>,

    /// Extensions synthesized while linking Phase 1/2's parent chains (a
    /// type or protocol rooted at an extension rather than a declaration).
    pub type_extension_definitions: Vec<Rc<ExtensionDefinition>>,
    /// Extensions synthesized from Phase 3's conformance/associated-type
    /// records.
    pub conformance_extension_definitions: Vec<Rc<ExtensionDefinition>>,
    /// Extensions synthesized from Phase 4's `inExtension=true` member
    /// groups.
    pub member_extension_definitions: Vec<Rc<ExtensionDefinition>>,

    pub protocol_conformances_by_type_name: IndexMap<String, IndexMap<String, ProtocolConformanceRecord>>,
    pub conforming_types_by_protocol_name: IndexMap<String, IndexSet<String>>,

    /// The shared merge key for "the plain extension of this target": every
    /// phase that would otherwise synthesize its own `extension Foo {...}`
    /// for the same target looks here first via `claim_default_extension`,
    /// so a type that both conforms and carries plain members gets one
    /// combined block instead of one per phase.
    default_extension_by_type_name: IndexMap<String, Rc<ExtensionDefinition>>,

    pub global_function_definitions: Vec<GlobalFunctionDefinition>,
    pub global_variable_definitions: Vec<GlobalVariableDefinition>,
}

impl InterfaceIndexer {
    pub fn new(
        storage: Storage,
        metadata: Box<dyn MetadataReader>,
        config: SwiftInterfaceIndexConfiguration,
        events: Box<dyn EventSink>,
    ) -> Self {
        Self {
            storage,
            metadata,
            config,
            events,
            all_type_definitions: IndexMap::new(),
            root_type_definitions: Vec::new(),
            all_protocol_definitions: IndexMap::new(),
            root_protocol_definitions: Vec::new(),
            type_extension_definitions: Vec::new(),
            conformance_extension_definitions: Vec::new(),
            member_extension_definitions: Vec::new(),
            protocol_conformances_by_type_name: IndexMap::new(),
            conforming_types_by_protocol_name: IndexMap::new(),
            default_extension_by_type_name: IndexMap::new(),
            global_function_definitions: Vec::new(),
            global_variable_definitions: Vec::new(),
        }
    }

    /// Returns the shared default extension for `target_name`, creating it
    /// on first use. The `bool` tells the caller whether it was just created
    /// here -- only the phase that creates it is responsible for pushing it
    /// into one of the three `*_extension_definitions` lists; a phase that
    /// finds it already claimed just attaches to it.
    fn claim_default_extension(
        &mut self,
        target_name: &str,
        target_node: NodeRef,
        kind: ExtensionTargetKind,
    ) -> (Rc<ExtensionDefinition>, bool) {
        if let Some(existing) = self.default_extension_by_type_name.get(target_name) {
            return (existing.clone(), false);
        }
        let extension = ExtensionDefinition::new(ExtensionName { target_node, kind });
        self.default_extension_by_type_name
            .insert(target_name.to_owned(), extension.clone());
        (extension, true)
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn config(&self) -> SwiftInterfaceIndexConfiguration {
        self.config
    }

    /// Runs all five phases in order. See the module docs for why this
    /// never actually returns `Err` today even though the signature carries
    /// [`IndexerError`].
    pub async fn prepare(&mut self) -> Result<(), IndexerError> {
        self.events.handle(&IndexerEvent::PhaseStarted(IndexerPhase::Extraction));
        let types = self.extract_type_records();
        let protocols = self.extract_protocol_records();
        let conformances = self.extract_conformance_records();
        let associated_types = self.extract_associated_type_records();
        let fields = self.extract_field_records();
        self.events.handle(&IndexerEvent::PhaseCompleted(IndexerPhase::Extraction));

        self.events.handle(&IndexerEvent::PhaseStarted(IndexerPhase::Types));
        self.index_types(&types);
        self.apply_field_records(&fields);
        self.events.handle(&IndexerEvent::PhaseCompleted(IndexerPhase::Types));

        self.events.handle(&IndexerEvent::PhaseStarted(IndexerPhase::Protocols));
        self.index_protocols(&protocols);
        self.events.handle(&IndexerEvent::PhaseCompleted(IndexerPhase::Protocols));

        self.events.handle(&IndexerEvent::PhaseStarted(IndexerPhase::Conformances));
        self.index_conformances(conformances, associated_types);
        self.events.handle(&IndexerEvent::PhaseCompleted(IndexerPhase::Conformances));

        self.events.handle(&IndexerEvent::PhaseStarted(IndexerPhase::Extensions));
        self.index_extensions();
        self.resolve_conformance_witnesses().await;
        self.events.handle(&IndexerEvent::PhaseCompleted(IndexerPhase::Extensions));

        self.events.handle(&IndexerEvent::PhaseStarted(IndexerPhase::Globals));
        self.index_globals();
        self.events.handle(&IndexerEvent::PhaseCompleted(IndexerPhase::Globals));

        Ok(())
    }

    // ---- Phase 0: extraction ---------------------------------------------

    fn extract_type_records(&self) -> Vec<TypeRecord> {
        self.events
            .handle(&IndexerEvent::ExtractionStarted(MetadataSection::Types));
        let records = self.metadata.type_records();
        self.events.handle(&IndexerEvent::ExtractionCompleted {
            section: MetadataSection::Types,
            count: records.len(),
        });
        records
    }

    fn extract_protocol_records(&self) -> Vec<ProtocolRecord> {
        self.events
            .handle(&IndexerEvent::ExtractionStarted(MetadataSection::Protocols));
        let records = self.metadata.protocol_records();
        self.events.handle(&IndexerEvent::ExtractionCompleted {
            section: MetadataSection::Protocols,
            count: records.len(),
        });
        records
    }

    fn extract_conformance_records(&self) -> Vec<ProtocolConformanceRecord> {
        self.events
            .handle(&IndexerEvent::ExtractionStarted(MetadataSection::ProtocolConformances));
        let records = self.metadata.conformance_records();
        self.events.handle(&IndexerEvent::ExtractionCompleted {
            section: MetadataSection::ProtocolConformances,
            count: records.len(),
        });
        records
    }

    fn extract_associated_type_records(&self) -> Vec<AssociatedTypeRecord> {
        self.events
            .handle(&IndexerEvent::ExtractionStarted(MetadataSection::AssociatedTypes));
        let records = self.metadata.associated_type_records();
        self.events.handle(&IndexerEvent::ExtractionCompleted {
            section: MetadataSection::AssociatedTypes,
            count: records.len(),
        });
        records
    }

    fn extract_field_records(&self) -> Vec<FieldRecord> {
        self.events
            .handle(&IndexerEvent::ExtractionStarted(MetadataSection::Fields));
        let records = self.metadata.field_records();
        self.events.handle(&IndexerEvent::ExtractionCompleted {
            section: MetadataSection::Fields,
            count: records.len(),
        });
        records
    }

    /// Latches each type's field list from its field-descriptor records,
    /// grouped by `typeName`. A type with no matching records keeps the
    /// empty list `index()` falls back to.
    fn apply_field_records(&mut self, records: &[FieldRecord]) {
        let mut by_type: IndexMap<&str, Vec<FieldDefinition>> = IndexMap::new();
        for record in records {
            by_type
                .entry(record.type_name.as_str())
                .or_default()
                .push(FieldDefinition { name: record.name.clone(), flags: record.flags.clone() });
        }

        for (type_name, fields) in by_type {
            if let Some(definition) = self.all_type_definitions.get(type_name) {
                definition.set_fields(fields);
            } else {
                self.events.handle(&IndexerEvent::NameExtractionWarning {
                    section: MetadataSection::Fields,
                    message: format!("field descriptor for unknown type `{type_name}`"),
                });
            }
        }
    }

    // ---- Phase 1: types ----------------------------------------------------

    /// Links each type's parent. A record's own `parent` (set when the
    /// declaration lives inside an extension or is rooted at a bare symbol)
    /// takes priority; only when it's absent does `typeName`'s last dotted
    /// component stand in for "nested under another known type record".
    /// `showCImportedTypes` has nothing to filter on in this record shape,
    /// so every record is kept.
    fn index_types(&mut self, records: &[TypeRecord]) {
        let _ = self.config.shows_c_imported_types();

        let mut parents: IndexMap<String, Option<RecordParent>> = IndexMap::new();
        for record in records {
            let type_node = synthesize_type_node(&record.name, record.kind);
            let definition = TypeDefinition::new(type_node, record.name.clone(), record.kind);
            self.all_type_definitions.insert(record.name.clone(), definition);
            parents.insert(record.name.clone(), record.parent.clone());
        }

        let names: Vec<String> = self.all_type_definitions.keys().cloned().collect();
        for name in &names {
            self.events.handle(&IndexerEvent::TypeIndexingStarted { type_name: name.clone() });
            let child = self.all_type_definitions.get(name).cloned();

            if let (Some(child), Some(Some(parent))) = (&child, parents.get(name)) {
                match parent {
                    RecordParent::Extension(target_name) => {
                        if let Some(kind) = self.type_kind_of(target_name) {
                            let target_node = synthesize_type_node(target_name, kind);
                            let (extension, is_new) = self.claim_default_extension(
                                target_name,
                                target_node.clone(),
                                ExtensionTargetKind::Type(kind),
                            );
                            extension.types.borrow_mut().push(child.clone());
                            *child.parent_context.borrow_mut() = Some(ParentContext::Extension(target_node));
                            if is_new {
                                self.type_extension_definitions.push(extension);
                            }
                        } else {
                            self.events.handle(&IndexerEvent::ProcessingFailed {
                                kind: ProcessingFailureKind::Type,
                                message: format!("extension-rooted type `{name}` names unknown target `{target_name}`"),
                            });
                        }
                    }
                    RecordParent::Symbol(symbol_name) => {
                        *child.parent_context.borrow_mut() =
                            Some(ParentContext::Symbol(Symbol::new(0, symbol_name.clone(), None)));
                    }
                }
            } else if let Some((parent_name, _)) = name.rsplit_once('.') {
                if let Some(child) = child {
                    if let Some(parent) = self.all_type_definitions.get(parent_name).cloned() {
                        parent.adopt_type_child(&child);
                    } else if let Some(kind) = self.storage.type_info(parent_name).map(|info| info.kind) {
                        // The parent segment isn't one of this image's
                        // metadata type records, but the Symbol Index
                        // independently learned its kind from a member
                        // symbol -- a real fact, not a guess.
                        *child.parent_context.borrow_mut() =
                            Some(ParentContext::Type(synthesize_type_node(parent_name, kind)));
                    }
                    // Otherwise the parent segment is unresolvable under
                    // either source, so the definition stays root rather
                    // than recording a `ParentContext` we'd have to
                    // fabricate a kind for.
                }
            }

            self.events.handle(&IndexerEvent::TypeIndexingCompleted { type_name: name.clone() });
        }

        self.root_type_definitions = self
            .all_type_definitions
            .values()
            .filter(|def| def.is_root())
            .cloned()
            .collect();
    }

    // ---- Phase 2: protocols -------------------------------------------------

    fn index_protocols(&mut self, records: &[ProtocolRecord]) {
        let mut parents: IndexMap<String, Option<RecordParent>> = IndexMap::new();
        for record in records {
            let protocol_node = synthesize_type_node(&record.name, TypeKind::Protocol);
            let definition = ProtocolDefinition::new(protocol_node, record.name.clone());
            self.all_protocol_definitions.insert(record.name.clone(), definition);
            parents.insert(record.name.clone(), record.parent.clone());
        }

        let names: Vec<String> = self.all_protocol_definitions.keys().cloned().collect();
        for name in &names {
            self.events
                .handle(&IndexerEvent::ProtocolIndexingStarted { protocol_name: name.clone() });
            let child = self.all_protocol_definitions.get(name).cloned();

            match (&child, parents.get(name)) {
                (Some(child), Some(Some(RecordParent::Extension(target_name)))) => {
                    if let Some(kind) = self.type_kind_of(target_name) {
                        let target_node = synthesize_type_node(target_name, kind);
                        let (extension, is_new) = self.claim_default_extension(
                            target_name,
                            target_node.clone(),
                            ExtensionTargetKind::Type(kind),
                        );
                        extension.protocols.borrow_mut().push(child.clone());
                        *child.extension_context.borrow_mut() = Some(target_node);
                        if is_new {
                            self.type_extension_definitions.push(extension);
                        }
                    } else {
                        self.events.handle(&IndexerEvent::ProcessingFailed {
                            kind: ProcessingFailureKind::Protocol,
                            message: format!("extension-rooted protocol `{name}` names unknown target `{target_name}`"),
                        });
                    }
                }
                // A protocol record rooted at a bare symbol has no
                // declaration context to nest under at all; nothing to
                // record beyond it staying root.
                (Some(_), Some(Some(RecordParent::Symbol(_)))) => {}
                _ => {
                    if let Some((parent_name, _)) = name.rsplit_once('.') {
                        if let Some(child) = child {
                            if let Some(parent) = self.all_type_definitions.get(parent_name).cloned() {
                                parent.adopt_protocol_child(&child);
                            }
                        }
                    }
                }
            }

            self.events
                .handle(&IndexerEvent::ProtocolIndexingCompleted { protocol_name: name.clone() });
        }

        self.root_protocol_definitions = self
            .all_protocol_definitions
            .values()
            .filter(|def| def.is_root())
            .cloned()
            .collect();
    }

    // ---- Phase 3: conformances & associated types --------------------------

    fn type_kind_of(&self, type_name: &str) -> Option<TypeKind> {
        self.all_type_definitions
            .get(type_name)
            .map(|def| def.kind)
            .or_else(|| self.storage.type_info(type_name).map(|info| info.kind))
    }

    fn index_conformances(
        &mut self,
        conformances: Vec<ProtocolConformanceRecord>,
        associated_types: Vec<AssociatedTypeRecord>,
    ) {
        for record in &conformances {
            self.protocol_conformances_by_type_name
                .entry(record.type_name.clone())
                .or_default()
                .insert(record.protocol_name.clone(), record.clone());
            self.conforming_types_by_protocol_name
                .entry(record.protocol_name.clone())
                .or_default()
                .insert(record.type_name.clone());
        }

        let mut associated_pool: IndexMap<(String, String), Vec<AssociatedTypeRecord>> = IndexMap::new();
        for record in associated_types {
            associated_pool
                .entry((record.conforming_type_name.clone(), record.protocol_name.clone()))
                .or_default()
                .push(record);
        }

        for record in conformances {
            self.events.handle(&IndexerEvent::ConformanceIndexingStarted {
                type_name: record.type_name.clone(),
                protocol_name: record.protocol_name.clone(),
            });

            let Some(kind) = self.type_kind_of(&record.type_name) else {
                self.events.handle(&IndexerEvent::ProcessingFailed {
                    kind: ProcessingFailureKind::Conformance,
                    message: format!("no known type for conformance target `{}`", record.type_name),
                });
                continue;
            };

            let associated_type = associated_pool
                .get_mut(&(record.type_name.clone(), record.protocol_name.clone()))
                .filter(|pool| !pool.is_empty())
                .map(|pool| pool.remove(0));

            let target_node = synthesize_type_node(&record.type_name, kind);
            let (extension, is_new) =
                self.claim_default_extension(&record.type_name, target_node.clone(), ExtensionTargetKind::Type(kind));

            if extension.protocol_conformance.borrow().is_some() {
                // A second protocol this same type conforms to: Swift keeps
                // each conformance's extension block separate, so this one
                // doesn't share the merged default slot.
                let standalone = ExtensionDefinition::new(ExtensionName {
                    target_node,
                    kind: ExtensionTargetKind::Type(kind),
                })
                .with_protocol_conformance(Some(record.clone()));
                if let Some(associated_type) = associated_type {
                    *standalone.associated_type.borrow_mut() = Some(associated_type);
                }
                self.conformance_extension_definitions.push(standalone);
            } else {
                *extension.protocol_conformance.borrow_mut() = Some(record.clone());
                if let Some(associated_type) = associated_type {
                    *extension.associated_type.borrow_mut() = Some(associated_type);
                }
                if is_new {
                    self.conformance_extension_definitions.push(extension);
                }
            }

            self.events.handle(&IndexerEvent::ConformanceIndexingCompleted {
                type_name: record.type_name.clone(),
                protocol_name: record.protocol_name.clone(),
            });
        }

        // Scenario: an associated-type record with no matching conformance
        // record still synthesizes an extension, carrying only the
        // associated type.
        for ((type_name, _protocol_name), records) in associated_pool {
            for record in records {
                let Some(kind) = self.type_kind_of(&type_name) else {
                    self.events.handle(&IndexerEvent::ProcessingFailed {
                        kind: ProcessingFailureKind::AssociatedType,
                        message: format!("no known type for associated type owner `{type_name}`"),
                    });
                    continue;
                };
                let target_node = synthesize_type_node(&type_name, kind);
                let (extension, is_new) =
                    self.claim_default_extension(&type_name, target_node, ExtensionTargetKind::Type(kind));
                if extension.associated_type.borrow().is_none() {
                    *extension.associated_type.borrow_mut() = Some(record);
                }
                if is_new {
                    self.conformance_extension_definitions.push(extension);
                }
            }
        }
    }

    // ---- Phase 4: extensions ------------------------------------------------

    /// The ordered `inExtension=true` kind list Phase 4 queries the Symbol
    /// Index with. Order here is authoritative per the outer-order
    /// ordering guarantee; this crate's `MemberKind::Variable` is always
    /// produced with `is_storage=true` (see `symbol_index.rs`'s
    /// `process_member_symbol`), so no `is_storage=false` combination
    /// appears.
    const EXTENSION_MEMBER_KINDS: &'static [MemberKind] = &[
        MemberKind::Allocator { in_extension: true },
        MemberKind::Variable { in_extension: true, is_static: false, is_storage: true },
        MemberKind::Variable { in_extension: true, is_static: true, is_storage: true },
        MemberKind::Function { in_extension: true, is_static: false },
        MemberKind::Function { in_extension: true, is_static: true },
        MemberKind::Subscript { in_extension: true, is_static: false },
        MemberKind::Subscript { in_extension: true, is_static: true },
    ];

    fn index_extensions(&mut self) {
        let groups = self
            .storage
            .member_symbols_grouped_by_type_node(Self::EXTENSION_MEMBER_KINDS, &HashSet::new());

        for (type_node, type_name, by_kind) in groups {
            let Some(type_info) = self.storage.type_info(&type_name).cloned() else {
                self.events.handle(&IndexerEvent::NameExtractionWarning {
                    section: MetadataSection::Types,
                    message: format!("extension member group for unknown type `{type_name}`"),
                });
                continue;
            };

            self.events
                .handle(&IndexerEvent::ExtensionIndexingStarted { target: type_node.clone() });
            self.synthesize_member_extensions_for_group(type_node.clone(), &type_name, type_info.kind, by_kind);
            self.events
                .handle(&IndexerEvent::ExtensionIndexingCompleted { target: type_node });
        }
    }

    /// The per-group half of Phase 4, split out so it can be exercised
    /// without a Symbol Index: partitions variable members by their
    /// `dependentGenericSignature` descendant (grouping distinct signatures
    /// into their own extension, since that's what a conditional
    /// conformance's distinct `where` clause means) and synthesizes one
    /// `ExtensionDefinition` per resulting group.
    fn synthesize_member_extensions_for_group(
        &mut self,
        type_node: NodeRef,
        type_name: &str,
        type_kind: TypeKind,
        by_kind: IndexMap<MemberKind, Vec<IndexedSymbolRef>>,
    ) {
        let items_for = |kind: MemberKind| -> Vec<MemberItem> {
            by_kind
                .get(&kind)
                .map(|symbols| to_member_items(symbols))
                .unwrap_or_default()
        };

        let allocators = items_for(MemberKind::Allocator { in_extension: true });
        let functions = items_for(MemberKind::Function { in_extension: true, is_static: false });
        let static_functions = items_for(MemberKind::Function { in_extension: true, is_static: true });
        let subscripts = items_for(MemberKind::Subscript { in_extension: true, is_static: false });
        let static_subscripts = items_for(MemberKind::Subscript { in_extension: true, is_static: true });
        let variables = items_for(MemberKind::Variable { in_extension: true, is_static: false, is_storage: true });
        let static_variables = items_for(MemberKind::Variable { in_extension: true, is_static: true, is_storage: true });

        let (signature_groups, plain_variables) = partition_by_generic_signature(&variables);
        let (static_signature_groups, plain_static_variables) = partition_by_generic_signature(&static_variables);

        let no_method_descriptors = IndexMap::new();
        let (default_extension, is_new) =
            self.claim_default_extension(type_name, type_node.clone(), ExtensionTargetKind::Type(type_kind));
        default_extension.index_with_members(
            builders::build_variables(&plain_variables, &HashMap::new()),
            builders::build_variables(&plain_static_variables, &HashMap::new())
                .into_iter()
                .map(|mut v| {
                    v.is_static = true;
                    v
                })
                .collect(),
            builders::build_functions(&functions, FunctionKind::Function, false, &no_method_descriptors),
            builders::build_functions(&static_functions, FunctionKind::Function, true, &no_method_descriptors),
            builders::build_subscripts(&subscripts),
            builders::build_subscripts(&static_subscripts)
                .into_iter()
                .map(|mut s| {
                    s.is_static = true;
                    s
                })
                .collect(),
            builders::build_allocators(&allocators),
        );
        if is_new {
            self.member_extension_definitions.push(default_extension);
        }

        for (signature, items) in signature_groups {
            let extension = ExtensionDefinition::new(ExtensionName {
                target_node: type_node.clone(),
                kind: ExtensionTargetKind::Type(type_kind),
            })
            .with_generic_signature(Some(signature));
            extension.index_with_members(
                builders::build_variables(&items, &HashMap::new()),
                Vec::new(),
                Vec::new(),
                Vec::new(),
                Vec::new(),
                Vec::new(),
                Vec::new(),
            );
            self.member_extension_definitions.push(extension);
        }

        for (signature, items) in static_signature_groups {
            let extension = ExtensionDefinition::new(ExtensionName {
                target_node: type_node.clone(),
                kind: ExtensionTargetKind::Type(type_kind),
            })
            .with_generic_signature(Some(signature));
            let statics = builders::build_variables(&items, &HashMap::new())
                .into_iter()
                .map(|mut v| {
                    v.is_static = true;
                    v
                })
                .collect();
            extension.index_with_members(Vec::new(), statics, Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new());
            self.member_extension_definitions.push(extension);
        }
    }

    /// Phase 4's mandated bounded-parallelism follow-up pass: at most
    /// `max(1, min(4, activeCpus))` conformance extensions resolve their
    /// resilient witnesses in flight at a time. `ConformanceRecord` carries
    /// no witness list in this metadata model (see `metadata.rs`), so every
    /// call here resolves against an empty witness slice -- the bounded
    /// `Semaphore` acquisition is kept faithful to the contract regardless.
    /// The definition graph's `Rc`-based ownership confines this crate to a
    /// single thread, so "in flight" is sequential in practice rather than
    /// truly concurrent.
    async fn resolve_conformance_witnesses(&mut self) {
        let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let permits = cpus.clamp(1, 4);
        let semaphore = Arc::new(Semaphore::new(permits));
        let empty_rewrites = HashMap::new();

        for extension in &self.conformance_extension_definitions {
            let _permit = semaphore.acquire().await.expect("semaphore is never closed");
            extension.resolve_resilient_witnesses(&self.storage, &[], &empty_rewrites);
        }
    }

    // ---- Phase 5: globals ---------------------------------------------------

    fn index_globals(&mut self) {
        let functions: Vec<IndexedSymbolRef> = self.storage.global_symbols(&GlobalKind::Function).to_vec();
        self.global_function_definitions
            .extend(build_global_function_definitions(&functions));

        for is_storage in [true, false] {
            let variables: Vec<IndexedSymbolRef> =
                self.storage.global_symbols(&GlobalKind::Variable { is_storage }).to_vec();
            self.global_variable_definitions
                .extend(build_global_variable_definitions(&variables, is_storage));
        }
    }
}

fn to_member_items(symbols: &[IndexedSymbolRef]) -> Vec<MemberItem> {
    symbols
        .iter()
        .map(|indexed| MemberItem {
            symbol: indexed.touch().symbol.clone(),
            node: indexed.node.clone(),
            offset: indexed.symbol.offset,
        })
        .collect()
}

/// Splits member items into signature-keyed groups (one extension each) and
/// the remainder with no `dependentGenericSignature` descendant at all.
fn partition_by_generic_signature(items: &[MemberItem]) -> (IndexMap<NodeRef, Vec<MemberItem>>, Vec<MemberItem>) {
    let mut by_signature: IndexMap<NodeRef, Vec<MemberItem>> = IndexMap::new();
    let mut without_signature = Vec::new();
    for item in items {
        match first_descendant(&item.node, |n| n.kind() == NodeKind::DependentGenericSignature) {
            Some(signature) => by_signature.entry(signature).or_default().push(item.clone()),
            None => without_signature.push(item.clone()),
        }
    }
    (by_signature, without_signature)
}

fn build_global_function_definitions(symbols: &[IndexedSymbolRef]) -> Vec<GlobalFunctionDefinition> {
    symbols
        .iter()
        .filter_map(|indexed| {
            let indexed = indexed.touch();
            let name = identifier_of(&indexed.node)?;
            Some(GlobalFunctionDefinition {
                name,
                symbol: indexed.symbol.clone(),
                node: indexed.node.clone(),
            })
        })
        .collect()
}

fn build_global_variable_definitions(symbols: &[IndexedSymbolRef], is_storage: bool) -> Vec<GlobalVariableDefinition> {
    symbols
        .iter()
        .filter_map(|indexed| {
            let indexed = indexed.touch();
            let name = identifier_of(&indexed.node)?;
            Some(GlobalVariableDefinition {
                name,
                symbol: indexed.symbol.clone(),
                node: indexed.node.clone(),
                is_storage,
                is_global_or_static: true,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{AssociatedTypeRecord, ProtocolConformanceRecord};
    use crate::symbol::{IndexedSymbol, NlistFlags};
    use crate::symbol_index::Storage;
    use similar_asserts::assert_eq;
    use swiftsection_demangle::Node;
    use swiftsection_testutils::nominal;

    #[derive(Default)]
    struct FakeMetadata {
        types: Vec<TypeRecord>,
        protocols: Vec<ProtocolRecord>,
        conformances: Vec<ProtocolConformanceRecord>,
        associated_types: Vec<AssociatedTypeRecord>,
        fields: Vec<FieldRecord>,
    }

    impl MetadataReader for FakeMetadata {
        fn type_records(&self) -> Vec<TypeRecord> {
            self.types.clone()
        }
        fn protocol_records(&self) -> Vec<ProtocolRecord> {
            self.protocols.clone()
        }
        fn conformance_records(&self) -> Vec<ProtocolConformanceRecord> {
            self.conformances.clone()
        }
        fn associated_type_records(&self) -> Vec<AssociatedTypeRecord> {
            self.associated_types.clone()
        }
        fn field_records(&self) -> Vec<FieldRecord> {
            self.fields.clone()
        }
    }

    fn test_storage() -> Storage {
        Storage::empty()
    }

    fn test_indexer(metadata: FakeMetadata) -> InterfaceIndexer {
        InterfaceIndexer {
            storage: test_storage(),
            metadata: Box::new(metadata),
            config: SwiftInterfaceIndexConfiguration::new(),
            events: Box::new(crate::events::NullEventSink),
            all_type_definitions: IndexMap::new(),
            root_type_definitions: Vec::new(),
            all_protocol_definitions: IndexMap::new(),
            root_protocol_definitions: Vec::new(),
            type_extension_definitions: Vec::new(),
            conformance_extension_definitions: Vec::new(),
            member_extension_definitions: Vec::new(),
            protocol_conformances_by_type_name: IndexMap::new(),
            conforming_types_by_protocol_name: IndexMap::new(),
            default_extension_by_type_name: IndexMap::new(),
            global_function_definitions: Vec::new(),
            global_variable_definitions: Vec::new(),
        }
    }

    #[test]
    fn nested_type_adopts_into_its_dotted_parent() {
        let mut indexer = test_indexer(FakeMetadata {
            types: vec![
                TypeRecord { name: "Foo".into(), kind: TypeKind::Struct, parent: None },
                TypeRecord { name: "Foo.Inner".into(), kind: TypeKind::Class, parent: None },
            ],
            ..Default::default()
        });

        let records = indexer.metadata.type_records();
        indexer.index_types(&records);

        assert_eq!(indexer.root_type_definitions.len(), 1);
        assert_eq!(indexer.root_type_definitions[0].type_name, "Foo");

        let inner = indexer.all_type_definitions.get("Foo.Inner").unwrap();
        assert_eq!(inner.parent().unwrap().type_name, "Foo");
    }

    #[test]
    fn extension_rooted_type_nests_under_a_synthesized_extension() {
        let mut indexer = test_indexer(FakeMetadata {
            types: vec![
                TypeRecord { name: "Foo".into(), kind: TypeKind::Struct, parent: None },
                TypeRecord {
                    name: "Foo.Inner".into(),
                    kind: TypeKind::Struct,
                    parent: Some(RecordParent::Extension("Foo".into())),
                },
            ],
            ..Default::default()
        });

        let records = indexer.metadata.type_records();
        indexer.index_types(&records);

        assert_eq!(indexer.type_extension_definitions.len(), 1);
        let extension = &indexer.type_extension_definitions[0];
        assert_eq!(extension.types.borrow().len(), 1);
        assert_eq!(extension.types.borrow()[0].type_name, "Foo.Inner");

        let inner = indexer.all_type_definitions.get("Foo.Inner").unwrap();
        assert!(inner.parent().is_none());
        assert!(matches!(
            *inner.parent_context.borrow(),
            Some(ParentContext::Extension(_))
        ));
    }

    #[test]
    fn symbol_rooted_type_records_a_symbol_parent_context() {
        let mut indexer = test_indexer(FakeMetadata {
            types: vec![TypeRecord {
                name: "Foo".into(),
                kind: TypeKind::Struct,
                parent: Some(RecordParent::Symbol("$s3Foo".into())),
            }],
            ..Default::default()
        });

        indexer.index_types(&indexer.metadata.type_records());

        let foo = indexer.all_type_definitions.get("Foo").unwrap();
        assert!(foo.is_root());
        assert!(matches!(*foo.parent_context.borrow(), Some(ParentContext::Symbol(_))));
    }

    #[test]
    fn field_descriptor_records_latch_onto_their_type() {
        let mut indexer = test_indexer(FakeMetadata {
            types: vec![TypeRecord { name: "Foo".into(), kind: TypeKind::Struct, parent: None }],
            fields: vec![FieldRecord {
                type_name: "Foo".into(),
                name: "bar".into(),
                flags: crate::definitions::FieldFlags { is_variable: true, ..Default::default() },
            }],
            ..Default::default()
        });

        indexer.index_types(&indexer.metadata.type_records());
        let fields = indexer.metadata.field_records();
        indexer.apply_field_records(&fields);

        let foo = indexer.all_type_definitions.get("Foo").unwrap();
        assert_eq!(foo.fields().len(), 1);
        assert_eq!(foo.fields()[0].name, "bar");
    }

    #[test]
    fn field_descriptor_for_unknown_type_is_skipped_not_panicked() {
        let mut indexer = test_indexer(FakeMetadata::default());
        indexer.apply_field_records(&[FieldRecord {
            type_name: "Ghost".into(),
            name: "x".into(),
            flags: crate::definitions::FieldFlags::default(),
        }]);
    }

    #[test]
    fn associated_type_without_conformance_still_synthesizes_an_extension() {
        let mut indexer = test_indexer(FakeMetadata {
            types: vec![TypeRecord { name: "Foo".into(), kind: TypeKind::Struct, parent: None }],
            ..Default::default()
        });

        indexer.index_types(&[TypeRecord { name: "Foo".into(), kind: TypeKind::Struct, parent: None }]);
        indexer.index_conformances(
            Vec::new(),
            vec![AssociatedTypeRecord {
                conforming_type_name: "Foo".into(),
                protocol_name: "Sequence".into(),
                name: "Element".into(),
                substituted_type_name: "Int".into(),
            }],
        );

        assert_eq!(indexer.conformance_extension_definitions.len(), 1);
        let extension = &indexer.conformance_extension_definitions[0];
        assert!(extension.protocol_conformance.borrow().is_none());
        assert!(extension.associated_type.borrow().is_some());
    }

    #[test]
    fn conformance_and_matching_associated_type_consume_each_other() {
        let mut indexer = test_indexer(FakeMetadata::default());

        indexer.index_types(&[TypeRecord { name: "Foo".into(), kind: TypeKind::Struct, parent: None }]);
        indexer.index_conformances(
            vec![ProtocolConformanceRecord {
                type_name: "Foo".into(),
                protocol_name: "Sequence".into(),
            }],
            vec![AssociatedTypeRecord {
                conforming_type_name: "Foo".into(),
                protocol_name: "Sequence".into(),
                name: "Element".into(),
                substituted_type_name: "Int".into(),
            }],
        );

        assert_eq!(indexer.conformance_extension_definitions.len(), 1);
        let extension = &indexer.conformance_extension_definitions[0];
        assert!(extension.protocol_conformance.borrow().is_some());
        assert_eq!(
            extension.associated_type.borrow().as_ref().unwrap().name,
            "Element"
        );
    }

    #[test]
    fn second_conformance_for_the_same_type_keeps_its_own_block() {
        let mut indexer = test_indexer(FakeMetadata::default());

        indexer.index_types(&[TypeRecord { name: "Foo".into(), kind: TypeKind::Struct, parent: None }]);
        indexer.index_conformances(
            vec![
                ProtocolConformanceRecord { type_name: "Foo".into(), protocol_name: "Equatable".into() },
                ProtocolConformanceRecord { type_name: "Foo".into(), protocol_name: "Hashable".into() },
            ],
            Vec::new(),
        );

        assert_eq!(indexer.conformance_extension_definitions.len(), 2);
    }

    #[test]
    fn conforming_type_with_plain_members_merges_into_one_extension_block() {
        let mut indexer = test_indexer(FakeMetadata::default());

        indexer.index_types(&[TypeRecord { name: "Foo".into(), kind: TypeKind::Struct, parent: None }]);
        indexer.index_conformances(
            vec![ProtocolConformanceRecord { type_name: "Foo".into(), protocol_name: "Equatable".into() }],
            Vec::new(),
        );

        let type_node = nominal(NodeKind::Structure, "Foo", "X");
        let plain_variable = Node::new(
            NodeKind::Variable,
            vec![type_node.clone(), Node::leaf(NodeKind::Identifier, "plain")],
        );
        let mut by_kind = IndexMap::new();
        by_kind.insert(
            MemberKind::Variable { in_extension: true, is_static: false, is_storage: true },
            vec![IndexedSymbol::new(Symbol::new(1, "$s3Foo1XV5plainSivg", None), plain_variable)],
        );
        indexer.synthesize_member_extensions_for_group(type_node, "Foo", TypeKind::Struct, by_kind);

        assert_eq!(indexer.conformance_extension_definitions.len(), 1);
        assert!(indexer.member_extension_definitions.is_empty());
        let extension = &indexer.conformance_extension_definitions[0];
        assert!(extension.protocol_conformance.borrow().is_some());
        assert_eq!(extension.variables().len(), 1);
    }

    #[test]
    fn member_group_without_known_type_info_is_skipped_not_panicked() {
        let mut indexer = test_indexer(FakeMetadata::default());

        indexer.index_extensions();
        assert!(indexer.member_extension_definitions.is_empty());
    }

    #[test]
    fn synthesize_member_extensions_for_group_partitions_by_generic_signature() {
        let mut indexer = test_indexer(FakeMetadata::default());

        let type_node = nominal(NodeKind::Structure, "Foo", "X");
        let plain_variable = Node::new(
            NodeKind::Variable,
            vec![type_node.clone(), Node::leaf(NodeKind::Identifier, "plain")],
        );
        let signature = Node::new(NodeKind::DependentGenericSignature, vec![Node::leaf(NodeKind::Identifier, "T")]);
        let generic_variable = Node::new(
            NodeKind::Variable,
            vec![type_node.clone(), Node::leaf(NodeKind::Identifier, "generic"), signature.clone()],
        );

        let mut by_kind = IndexMap::new();
        by_kind.insert(
            MemberKind::Variable { in_extension: true, is_static: false, is_storage: true },
            vec![
                IndexedSymbol::new(Symbol::new(1, "$s3Foo1XV5plainSivg", None), plain_variable),
                IndexedSymbol::new(Symbol::new(2, "$s3Foo1XV7genericSivg", None), generic_variable),
            ],
        );

        indexer.synthesize_member_extensions_for_group(type_node, "Foo", TypeKind::Struct, by_kind);

        assert_eq!(indexer.member_extension_definitions.len(), 2);
        let generic_count = indexer
            .member_extension_definitions
            .iter()
            .filter(|ext| ext.generic_signature.is_some())
            .count();
        assert_eq!(generic_count, 1);
    }

    #[test]
    fn global_function_and_variable_builders_require_an_identifier() {
        let named = Node::new(
            NodeKind::Global,
            vec![Node::new(NodeKind::Function, vec![Node::leaf(NodeKind::Module, "Foo"), Node::leaf(NodeKind::Identifier, "run")])],
        );
        let unnamed = Node::new(NodeKind::Global, vec![Node::leaf(NodeKind::Module, "Foo")]);

        let symbols = vec![
            IndexedSymbol::new(Symbol::new(1, "$s3Foo3runyyF", Some(NlistFlags { external: false, undefined: false })), named),
            IndexedSymbol::new(Symbol::new(2, "$s3Foo", None), unnamed),
        ];

        let definitions = build_global_function_definitions(&symbols);
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].name, "run");
    }
}
