//! The Printer: a pure read-over of the definition graph plus a per-node
//! text cache, emitting a structured `(text, SemanticType)` chunk stream
//! instead of a single opaque `String`, so a caller (e.g. an editor's syntax
//! highlighter) can colorize the output without re-parsing it.
//!
//! Printing a definition calls its lazily-latched `index()` the first time
//! it's visited, per this crate's "indexed on first read" contract.

use std::rc::Rc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use swiftsection_demangle::{print_type_name, NodeRef};

use crate::config::PrinterConfiguration;
use crate::definitions::{
    Accessor, ExtensionDefinition, ExtensionTargetKind, FunctionDefinition, FunctionKind,
    ProtocolDefinition, SubscriptDefinition, TypeDefinition, VariableDefinition,
};
use crate::indexer::{GlobalFunctionDefinition, GlobalVariableDefinition, InterfaceIndexer};
use crate::symbol::TypeKind;
use crate::symbol_index::Storage;

/// The soft cap on the Printer's per-node-text cache; once reached, the
/// whole cache is cleared in one shot rather than evicting individual
/// entries.
const MAX_CACHE_ENTRIES: usize = 50_000;

/// The semantic role of one chunk of printed text, so a consumer can
/// colorize output without re-parsing it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SemanticType {
    Standard,
    Keyword,
    Function { is_declaration: bool },
    Variable,
    Type { kind: TypeKind, name: Option<String> },
    Module,
    Other,
}

/// One `(text, semanticType)` unit of the Printer's output stream.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub semantic: SemanticType,
}

/// Accumulates chunks, coalescing adjacent chunks of the same semantic type
/// into one.
#[derive(Default)]
pub struct ChunkWriter {
    chunks: Vec<Chunk>,
}

impl ChunkWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: impl Into<String>, semantic: SemanticType) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        if let Some(last) = self.chunks.last_mut() {
            if last.semantic == semantic {
                last.text.push_str(&text);
                return;
            }
        }
        self.chunks.push(Chunk { text, semantic });
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn into_chunks(self) -> Vec<Chunk> {
        self.chunks
    }

    /// The chunk stream flattened back to plain text, mostly useful for
    /// tests and quick inspection.
    pub fn plain_text(&self) -> String {
        self.chunks.iter().map(|c| c.text.as_str()).collect()
    }
}

fn extension_type_kind(kind: &ExtensionTargetKind) -> TypeKind {
    match kind {
        ExtensionTargetKind::Type(kind) => *kind,
        ExtensionTargetKind::Protocol => TypeKind::Protocol,
        ExtensionTargetKind::TypeAlias => TypeKind::TypeAlias,
    }
}

fn keyword_for(kind: TypeKind) -> &'static str {
    match kind {
        TypeKind::Enum => "enum",
        TypeKind::Struct => "struct",
        TypeKind::Class => "class",
        TypeKind::Protocol => "protocol",
        TypeKind::TypeAlias => "typealias",
    }
}

/// Renders the definition graph built by [`InterfaceIndexer`] into a chunk
/// stream. `'a` ties the Printer to the `Storage` it lazily indexes
/// definitions against.
pub struct Printer<'a> {
    storage: &'a Storage,
    config: PrinterConfiguration,
    cache: Mutex<IndexMap<NodeRef, String>>,
    cache_limit: usize,
}

impl<'a> Printer<'a> {
    pub fn new(storage: &'a Storage, config: PrinterConfiguration) -> Self {
        Self {
            storage,
            config,
            cache: Mutex::new(IndexMap::new()),
            cache_limit: MAX_CACHE_ENTRIES,
        }
    }

    #[cfg(test)]
    fn with_cache_limit(storage: &'a Storage, config: PrinterConfiguration, cache_limit: usize) -> Self {
        Self {
            storage,
            config,
            cache: Mutex::new(IndexMap::new()),
            cache_limit,
        }
    }

    /// Prints every root type, root protocol, extension, and global in the
    /// indexer's output, in phase order.
    pub fn print_index(&self, indexer: &InterfaceIndexer) -> Vec<Chunk> {
        let mut writer = ChunkWriter::new();

        for definition in &indexer.root_type_definitions {
            self.print_type(&mut writer, definition);
        }
        for definition in &indexer.root_protocol_definitions {
            self.print_protocol(&mut writer, definition);
        }
        for extension in indexer
            .type_extension_definitions
            .iter()
            .chain(indexer.conformance_extension_definitions.iter())
            .chain(indexer.member_extension_definitions.iter())
        {
            self.print_extension(&mut writer, extension);
        }
        for function in &indexer.global_function_definitions {
            self.print_global_function(&mut writer, function);
        }
        for variable in &indexer.global_variable_definitions {
            self.print_global_variable(&mut writer, variable);
        }

        writer.into_chunks()
    }

    fn print_type_name_cached(&self, node: &NodeRef) -> String {
        if let Some(cached) = self.cache.lock().get(node) {
            return cached.clone();
        }
        let printed = print_type_name(node);
        let mut cache = self.cache.lock();
        if cache.len() >= self.cache_limit {
            cache.clear();
        }
        cache.insert(node.clone(), printed.clone());
        printed
    }

    pub fn print_type(&self, writer: &mut ChunkWriter, definition: &Rc<TypeDefinition>) {
        definition.index(self.storage);

        let local_name = definition
            .type_name
            .rsplit('.')
            .next()
            .unwrap_or(&definition.type_name)
            .to_owned();

        writer.push(keyword_for(definition.kind), SemanticType::Keyword);
        writer.push(" ", SemanticType::Standard);
        writer.push(
            local_name,
            SemanticType::Type {
                kind: definition.kind,
                name: Some(definition.type_name.clone()),
            },
        );
        writer.push(" {\n", SemanticType::Standard);

        for variable in definition.variables() {
            self.print_variable(writer, variable);
        }
        for variable in definition.static_variables() {
            self.print_variable(writer, variable);
        }
        for function in definition.allocators() {
            self.print_function(writer, function);
        }
        for function in definition.constructors() {
            self.print_function(writer, function);
        }
        for function in definition.functions() {
            self.print_function(writer, function);
        }
        for function in definition.static_functions() {
            self.print_function(writer, function);
        }
        for subscript in definition.subscripts() {
            self.print_subscript(writer, subscript);
        }
        for subscript in definition.static_subscripts() {
            self.print_subscript(writer, subscript);
        }

        for child in definition.type_children.borrow().iter() {
            self.print_type(writer, child);
        }
        for child in definition.protocol_children.borrow().iter() {
            self.print_protocol(writer, child);
        }

        writer.push("}\n", SemanticType::Standard);
    }

    pub fn print_protocol(&self, writer: &mut ChunkWriter, definition: &Rc<ProtocolDefinition>) {
        definition.index(self.storage);

        writer.push("protocol", SemanticType::Keyword);
        writer.push(" ", SemanticType::Standard);
        writer.push(
            definition.protocol_name.clone(),
            SemanticType::Type {
                kind: TypeKind::Protocol,
                name: Some(definition.protocol_name.clone()),
            },
        );
        writer.push(" {\n", SemanticType::Standard);

        for variable in definition.variables() {
            self.print_variable(writer, variable);
        }
        for function in definition.functions() {
            self.print_function(writer, function);
        }
        for subscript in definition.subscripts() {
            self.print_subscript(writer, subscript);
        }

        writer.push("}\n", SemanticType::Standard);
    }

    /// Extensions are pre-populated by the Interface Indexer's Phase
    /// 3/4 (`index_with_members`/`with_protocol_conformance`), so there is
    /// no lazy `index()` call to make here -- only the target's type name
    /// is resolved (through the cache) on demand.
    pub fn print_extension(&self, writer: &mut ChunkWriter, extension: &Rc<ExtensionDefinition>) {
        writer.push("extension", SemanticType::Keyword);
        writer.push(" ", SemanticType::Standard);

        let target_name = self.print_type_name_cached(&extension.name.target_node);
        writer.push(
            target_name.clone(),
            SemanticType::Type {
                kind: extension_type_kind(&extension.name.kind),
                name: Some(target_name),
            },
        );

        if let Some(conformance) = extension.protocol_conformance.borrow().as_ref() {
            writer.push(": ", SemanticType::Standard);
            writer.push(
                conformance.protocol_name.clone(),
                SemanticType::Type {
                    kind: TypeKind::Protocol,
                    name: Some(conformance.protocol_name.clone()),
                },
            );
        }
        writer.push(" {\n", SemanticType::Standard);

        if let Some(associated_type) = extension.associated_type.borrow().as_ref() {
            writer.push("typealias", SemanticType::Keyword);
            writer.push(" ", SemanticType::Standard);
            writer.push(
                associated_type.name.clone(),
                SemanticType::Type {
                    kind: TypeKind::TypeAlias,
                    name: Some(associated_type.name.clone()),
                },
            );
            writer.push(" = ", SemanticType::Standard);
            writer.push(associated_type.substituted_type_name.clone(), SemanticType::Other);
            writer.push("\n", SemanticType::Standard);
        }

        for variable in extension.variables() {
            self.print_variable(writer, variable);
        }
        for variable in extension.static_variables() {
            self.print_variable(writer, variable);
        }
        for function in extension.allocators() {
            self.print_function(writer, function);
        }
        for function in extension.functions() {
            self.print_function(writer, function);
        }
        for function in extension.resolved_witnesses().iter() {
            self.print_function(writer, function);
        }
        for function in extension.static_functions() {
            self.print_function(writer, function);
        }
        for subscript in extension.subscripts() {
            self.print_subscript(writer, subscript);
        }
        for subscript in extension.static_subscripts() {
            self.print_subscript(writer, subscript);
        }

        for witness in extension.missing_symbol_witnesses.borrow().iter() {
            writer.push(
                format!("// unresolved witness: {}\n", witness.requirement_name),
                SemanticType::Other,
            );
        }

        for child in extension.types.borrow().iter() {
            self.print_type(writer, child);
        }
        for child in extension.protocols.borrow().iter() {
            self.print_protocol(writer, child);
        }

        writer.push("}\n", SemanticType::Standard);
    }

    pub fn print_global_function(&self, writer: &mut ChunkWriter, function: &GlobalFunctionDefinition) {
        writer.push("func", SemanticType::Keyword);
        writer.push(" ", SemanticType::Standard);
        writer.push(function.name.clone(), SemanticType::Function { is_declaration: true });
        writer.push("()", SemanticType::Standard);
        self.print_offset_comment(writer, function.symbol.offset);
        writer.push("\n", SemanticType::Standard);
    }

    pub fn print_global_variable(&self, writer: &mut ChunkWriter, variable: &GlobalVariableDefinition) {
        writer.push("var", SemanticType::Keyword);
        writer.push(" ", SemanticType::Standard);
        writer.push(variable.name.clone(), SemanticType::Variable);
        self.print_offset_comment(writer, variable.symbol.offset);
        writer.push("\n", SemanticType::Standard);
    }

    fn print_variable(&self, writer: &mut ChunkWriter, variable: &VariableDefinition) {
        if variable.is_static {
            writer.push("static ", SemanticType::Keyword);
        }
        writer.push("var", SemanticType::Keyword);
        writer.push(" ", SemanticType::Standard);
        writer.push(variable.name.clone(), SemanticType::Variable);
        self.print_accessors(writer, &variable.accessors);
        writer.push("\n", SemanticType::Standard);
    }

    fn print_subscript(&self, writer: &mut ChunkWriter, subscript: &SubscriptDefinition) {
        if subscript.is_static {
            writer.push("static ", SemanticType::Keyword);
        }
        writer.push("subscript", SemanticType::Keyword);
        self.print_accessors(writer, &subscript.accessors);
        writer.push("\n", SemanticType::Standard);
    }

    fn print_accessors(&self, writer: &mut ChunkWriter, accessors: &[Accessor]) {
        for accessor in accessors {
            self.print_offset_comment(writer, accessor.offset);
        }
    }

    fn print_function(&self, writer: &mut ChunkWriter, function: &FunctionDefinition) {
        if function.is_global_or_static {
            writer.push("static ", SemanticType::Keyword);
        }
        match function.kind {
            FunctionKind::Allocator | FunctionKind::Constructor => writer.push("init", SemanticType::Keyword),
            FunctionKind::Function => writer.push("func", SemanticType::Keyword),
        }
        if let Some(name) = &function.name {
            writer.push(" ", SemanticType::Standard);
            writer.push(name.clone(), SemanticType::Function { is_declaration: true });
        }
        writer.push("()", SemanticType::Standard);
        self.print_offset_comment(writer, function.symbol.offset);
        if let Some(descriptor) = &function.method_descriptor {
            writer.push(
                format!(" // methodDescriptor: {}", descriptor.name),
                SemanticType::Other,
            );
        }
        writer.push("\n", SemanticType::Standard);
    }

    fn print_offset_comment(&self, writer: &mut ChunkWriter, offset: u64) {
        if self.config.emits_offset_comments() {
            writer.push(format!(" // offset: {offset:#x}"), SemanticType::Other);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::{synthesize_type_node, ExtensionName};
    use crate::symbol::Symbol;
    use similar_asserts::assert_eq;
    use swiftsection_demangle::{Node, NodeKind};

    #[test]
    fn writer_coalesces_adjacent_same_type_chunks() {
        let mut writer = ChunkWriter::new();
        writer.push("struct", SemanticType::Keyword);
        writer.push(" ", SemanticType::Standard);
        writer.push("Foo", SemanticType::Type { kind: TypeKind::Struct, name: Some("Foo".into()) });
        writer.push(" Bar", SemanticType::Type { kind: TypeKind::Struct, name: Some("Foo".into()) });

        assert_eq!(writer.chunks().len(), 3);
        assert_eq!(writer.chunks()[2].text, "Foo Bar");
    }

    #[test]
    fn writer_skips_empty_text() {
        let mut writer = ChunkWriter::new();
        writer.push("", SemanticType::Standard);
        assert!(writer.chunks().is_empty());
    }

    #[test]
    fn empty_type_definition_prints_braces_with_no_members() {
        let storage = Storage::empty();
        let printer = Printer::new(&storage, PrinterConfiguration::minimal());
        let definition = TypeDefinition::new(
            synthesize_type_node("Foo", TypeKind::Struct),
            "Foo".into(),
            TypeKind::Struct,
        );

        let mut writer = ChunkWriter::new();
        printer.print_type(&mut writer, &definition);

        assert_eq!(writer.plain_text(), "struct Foo {\n}\n");
    }

    #[test]
    fn global_function_with_offset_comments_enabled() {
        let storage = Storage::empty();
        let printer = Printer::new(&storage, PrinterConfiguration::verbose());
        let function = GlobalFunctionDefinition {
            name: "run".into(),
            symbol: Symbol::new(0x10, "$s3Foo3runyyF", None),
            node: Node::leaf(NodeKind::Identifier, "run"),
        };

        let mut writer = ChunkWriter::new();
        printer.print_global_function(&mut writer, &function);

        assert!(writer.plain_text().contains("func run()"));
        assert!(writer.plain_text().contains("0x10"));
    }

    #[test]
    fn type_node_cache_clears_in_one_shot_past_its_limit() {
        let storage = Storage::empty();
        let printer = Printer::with_cache_limit(&storage, PrinterConfiguration::minimal(), 2);

        let a = synthesize_type_node("A", TypeKind::Struct);
        let b = synthesize_type_node("B", TypeKind::Struct);
        let c = synthesize_type_node("C", TypeKind::Struct);

        printer.print_type_name_cached(&a);
        printer.print_type_name_cached(&b);
        assert_eq!(printer.cache.lock().len(), 2);

        // Crossing the limit clears the whole cache rather than evicting.
        printer.print_type_name_cached(&c);
        assert_eq!(printer.cache.lock().len(), 1);
        assert!(printer.cache.lock().contains_key(&c));
        assert!(!printer.cache.lock().contains_key(&a));
    }

    #[test]
    fn conformance_extension_prints_protocol_and_associated_type() {
        let storage = Storage::empty();
        let printer = Printer::new(&storage, PrinterConfiguration::minimal());

        let extension = ExtensionDefinition::new(ExtensionName {
            target_node: synthesize_type_node("Foo", TypeKind::Struct),
            kind: ExtensionTargetKind::Type(TypeKind::Struct),
        })
        .with_protocol_conformance(Some(crate::metadata::ProtocolConformanceRecord {
            type_name: "Foo".into(),
            protocol_name: "Sequence".into(),
        }));
        *extension.associated_type.borrow_mut() = Some(crate::metadata::AssociatedTypeRecord {
            conforming_type_name: "Foo".into(),
            protocol_name: "Sequence".into(),
            name: "Element".into(),
            substituted_type_name: "Int".into(),
        });
        extension.index_with_members(
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );

        let mut writer = ChunkWriter::new();
        printer.print_extension(&mut writer, &extension);

        let text = writer.plain_text();
        assert!(text.contains("extension Foo: Sequence"));
        assert!(text.contains("typealias Element = Int"));
    }
}
