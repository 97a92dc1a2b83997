//! Symbol and classification types shared between the Symbol Index and the
//! Interface Indexer.

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

use swiftsection_demangle::NodeRef;

/// `nlist` flags relevant to classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NlistFlags {
    pub external: bool,
    pub undefined: bool,
}

/// A raw symbol-table entry, as read from the Mach-O collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Symbol {
    pub offset: u64,
    pub name: String,
    pub nlist: Option<NlistFlags>,
}

impl Symbol {
    pub fn new(offset: u64, name: impl Into<String>, nlist: Option<NlistFlags>) -> Self {
        Self {
            offset,
            name: name.into(),
            nlist,
        }
    }

    /// A symbol with `offset == 0` never indexes into shared-cache-adjusted
    /// tables.
    pub fn has_offset(&self) -> bool {
        self.offset != 0
    }

    /// Whether this symbol's mangled name matches the language's mangling
    /// prefix.
    pub fn is_language_symbol(&self) -> bool {
        swiftsection_demangle::is_swift_symbol(&self.name)
    }

    pub fn is_external(&self) -> bool {
        self.nlist.map(|n| n.external).unwrap_or(false)
    }
}

/// The nominal-declaration kinds a type node can resolve to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Enum,
    Struct,
    Class,
    Protocol,
    TypeAlias,
}

/// `{name, kind}` pair recorded the first time a type's name is observed
/// while classifying a member symbol.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    pub name: String,
    pub kind: TypeKind,
}

/// The bucket a root-global symbol (one whose demangled root's first child
/// satisfies the `isGlobal` predicate and is not external) is classified
/// into.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum GlobalKind {
    Function,
    Variable { is_storage: bool },
}

/// The bucket a member symbol is classified into, after its outer wrappers
/// (`static`, accessor, extension) have been peeled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Allocator { in_extension: bool },
    Deallocator,
    Constructor { in_extension: bool },
    Destructor,
    Subscript { in_extension: bool, is_static: bool },
    Variable { in_extension: bool, is_static: bool, is_storage: bool },
    Function { in_extension: bool, is_static: bool },
}

impl MemberKind {
    pub fn in_extension(&self) -> bool {
        match self {
            MemberKind::Allocator { in_extension }
            | MemberKind::Constructor { in_extension }
            | MemberKind::Subscript { in_extension, .. }
            | MemberKind::Variable { in_extension, .. }
            | MemberKind::Function { in_extension, .. } => *in_extension,
            MemberKind::Deallocator | MemberKind::Destructor => false,
        }
    }

    pub fn is_static(&self) -> bool {
        match self {
            MemberKind::Subscript { is_static, .. }
            | MemberKind::Variable { is_static, .. }
            | MemberKind::Function { is_static, .. } => *is_static,
            _ => false,
        }
    }
}

/// A reference-counted handle to a classified symbol.
///
/// `consumed` is latched the first time the wrapped value is surfaced by
/// any Symbol Index accessor. The flag is purely observational (it never
/// changes query results) and is shared across every clone of the handle,
/// which is why it lives behind an `Rc` rather than being copied per-bucket.
pub type IndexedSymbolRef = Rc<IndexedSymbol>;

#[derive(Debug)]
pub struct IndexedSymbol {
    pub symbol: Symbol,
    pub node: NodeRef,
    consumed: AtomicBool,
}

impl IndexedSymbol {
    pub fn new(symbol: Symbol, node: NodeRef) -> IndexedSymbolRef {
        Rc::new(Self {
            symbol,
            node,
            consumed: AtomicBool::new(false),
        })
    }

    /// Marks this symbol as surfaced and returns a reference to it. Callers
    /// that just want to peek without latching should read `symbol`/`node`
    /// directly.
    pub fn touch(self: &Rc<Self>) -> &Rc<Self> {
        self.consumed.store(true, Ordering::Relaxed);
        self
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed.load(Ordering::Relaxed)
    }
}

impl PartialEq for IndexedSymbol {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol && self.node == other.node
    }
}

impl Eq for IndexedSymbol {}
