//! The Event Dispatcher: a fire-and-forget observer bus for indexing
//! progress and diagnostics. Never on any correctness path -- every signal
//! that affects behavior goes through `Storage`/the definition graph
//! instead.
//!
//! Every event is also emitted through `tracing` at an appropriate level by
//! [`TracingEventSink`], matching how the rest of this workspace layers a
//! structured event surface on top of ambient logging rather than replacing
//! it.

use std::fmt;

use swiftsection_demangle::NodeRef;

/// One of the five ordered phases of [`crate::indexer::InterfaceIndexer::prepare`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Extraction,
    Types,
    Protocols,
    Conformances,
    Extensions,
    Globals,
}

/// A metadata section pulled during [`Phase::Extraction`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetadataSection {
    Types,
    Protocols,
    ProtocolConformances,
    AssociatedTypes,
    Fields,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Debug,
    Info,
    Warn,
}

/// A category of per-record processing failure; carries no payload beyond
/// its kind, since the offending record itself has already been logged at
/// the call site via `tracing::warn!`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessingFailureKind {
    Type,
    Protocol,
    Conformance,
    AssociatedType,
    Extension,
}

/// The full event taxonomy pushed to the bus during `prepare()`.
#[derive(Clone, Debug)]
pub enum IndexerEvent {
    PhaseStarted(Phase),
    PhaseCompleted(Phase),
    PhaseFailed { phase: Phase, message: String },

    ExtractionStarted(MetadataSection),
    ExtractionCompleted { section: MetadataSection, count: usize },
    ExtractionFailed { section: MetadataSection, message: String },

    TypeIndexingStarted { type_name: String },
    TypeIndexingCompleted { type_name: String },
    ProtocolIndexingStarted { protocol_name: String },
    ProtocolIndexingCompleted { protocol_name: String },
    ConformanceIndexingStarted { type_name: String, protocol_name: String },
    ConformanceIndexingCompleted { type_name: String, protocol_name: String },
    ExtensionIndexingStarted { target: NodeRef },
    ExtensionIndexingCompleted { target: NodeRef },

    ProcessingFailed { kind: ProcessingFailureKind, message: String },
    NameExtractionWarning { section: MetadataSection, message: String },
    Diagnostic { level: DiagnosticLevel, message: String },
}

/// A handler on the event bus. Handlers are invoked synchronously from the
/// dispatching task and must not block.
pub trait EventSink {
    fn handle(&self, event: &IndexerEvent);
}

impl fmt::Debug for dyn EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn EventSink")
    }
}

/// Discards every event. The default when the caller doesn't care.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn handle(&self, _event: &IndexerEvent) {}
}

/// Routes every event through `tracing`, at `warn` for failures/warnings and
/// `debug` for everything else.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn handle(&self, event: &IndexerEvent) {
        match event {
            IndexerEvent::PhaseFailed { phase, message } => {
                tracing::warn!(?phase, message, "phase failed")
            }
            IndexerEvent::ExtractionFailed { section, message } => {
                tracing::warn!(?section, message, "extraction failed")
            }
            IndexerEvent::ProcessingFailed { kind, message } => {
                tracing::warn!(?kind, message, "record processing failed")
            }
            IndexerEvent::NameExtractionWarning { section, message } => {
                tracing::warn!(?section, message, "name extraction warning")
            }
            IndexerEvent::Diagnostic { level: DiagnosticLevel::Warn, message } => {
                tracing::warn!(message)
            }
            IndexerEvent::Diagnostic { level: DiagnosticLevel::Info, message } => {
                tracing::info!(message)
            }
            other => tracing::debug!(?other, "indexer event"),
        }
    }
}

/// Fans a single event out to every sink in order, the composition helper
/// named in the external-interfaces section.
#[derive(Default)]
pub struct BroadcastEventSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl BroadcastEventSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn push(&mut self, sink: Box<dyn EventSink>) -> &mut Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for BroadcastEventSink {
    fn handle(&self, event: &IndexerEvent) {
        for sink in &self.sinks {
            sink.handle(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct RecordingSink {
        count: Rc<Cell<usize>>,
    }

    impl EventSink for RecordingSink {
        fn handle(&self, _event: &IndexerEvent) {
            self.count.set(self.count.get() + 1);
        }
    }

    #[test]
    fn broadcast_reaches_every_sink() {
        let a = Rc::new(Cell::new(0));
        let b = Rc::new(Cell::new(0));
        let mut broadcast = BroadcastEventSink::new();
        broadcast.push(Box::new(RecordingSink { count: a.clone() }));
        broadcast.push(Box::new(RecordingSink { count: b.clone() }));
        broadcast.handle(&IndexerEvent::PhaseStarted(Phase::Types));
        assert_eq!(a.get(), 1);
        assert_eq!(b.get(), 1);
    }

    #[test]
    fn null_sink_ignores_everything() {
        NullEventSink.handle(&IndexerEvent::PhaseStarted(Phase::Globals));
    }
}
