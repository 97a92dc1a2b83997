//! Swiftsection reconstructs a declarative interface -- types, protocols,
//! extensions, globals, and their members -- from the Swift reflection
//! metadata and symbol table embedded in a Mach-O image.
//!
//! This crate is a thin facade: it re-exports its three collaborators under
//! feature-gated names so callers can depend on one crate instead of three.
//! Use [`index`] for the full pipeline (Symbol Index + Interface Indexer +
//! Printer), [`macho`] for the Mach-O image abstraction alone, or
//! [`demangle`] for the demangled-tree types alone.

#![warn(missing_docs)]

#[doc(inline)]
#[cfg(feature = "demangle")]
pub use swiftsection_demangle as demangle;
#[doc(inline)]
#[cfg(feature = "index")]
pub use swiftsection_index as index;
#[doc(inline)]
#[cfg(feature = "macho")]
pub use swiftsection_macho as macho;
