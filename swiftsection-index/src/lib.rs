//! Symbol Index and Interface Indexer.
//!
//! Reconstructs a declarative interface -- types, protocols, extensions,
//! globals, and their members -- from the reflection metadata sections and
//! symbol table of a Swift Mach-O image.
//!
//! The pipeline has three stages, one module each:
//!
//!  - [`metadata`] reads the four `__swift5_*` reflection sections into flat
//!    records ([`metadata::MetadataReader`]).
//!  - [`symbol_index`] classifies every symbol in the image's symbol table
//!    against its demangled tree, producing [`symbol_index::Storage`], a set
//!    of lookup tables keyed by type name, type node, and member kind.
//!  - [`indexer`] fuses the two into the definition graph
//!    ([`definitions::TypeDefinition`], [`definitions::ProtocolDefinition`],
//!    [`definitions::ExtensionDefinition`]) plus the flat global lists, via
//!    [`indexer::InterfaceIndexer`].
//!
//! [`printer`] renders that graph into a structured chunk stream.
//! [`events`] and [`config`] are the cross-cutting observability and
//! configuration surfaces the other modules depend on.

#![warn(missing_docs)]
#![allow(clippy::module_inception)]

mod config;
mod definitions;
mod error;
mod events;
mod indexer;
mod metadata;
mod printer;
mod symbol;
mod symbol_index;

pub use config::{PrinterConfiguration, SwiftInterfaceIndexConfiguration};
pub use definitions::{
    Accessor, AccessorKind, ExtensionDefinition, ExtensionName, ExtensionTargetKind, FieldDefinition,
    FieldFlags, FunctionDefinition, FunctionKind, ParentContext, ProtocolDefinition, ResilientWitness,
    SubscriptDefinition, TypeDefinition, VariableDefinition,
};
pub use error::IndexerError;
pub use events::{
    BroadcastEventSink, DiagnosticLevel, EventSink, IndexerEvent, MetadataSection, NullEventSink,
    Phase, ProcessingFailureKind, TracingEventSink,
};
pub use indexer::{GlobalFunctionDefinition, GlobalVariableDefinition, InterfaceIndexer};
pub use metadata::{
    AssociatedTypeRecord, FieldRecord, MetadataError, MetadataReader, ProtocolConformanceRecord,
    ProtocolRecord, RecordParent, SectionMetadataReader, TypeRecord,
};
pub use printer::{Chunk, ChunkWriter, Printer, SemanticType};
pub use symbol::{
    GlobalKind, IndexedSymbol, IndexedSymbolRef, MemberKind, NlistFlags, Symbol, TypeInfo, TypeKind,
};
pub use symbol_index::Storage;
