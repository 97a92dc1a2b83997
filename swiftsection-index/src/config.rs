//! Configuration accepted by [`crate::indexer::InterfaceIndexer`] and the
//! Printer contract, built the same `const fn` way as
//! `symbolic_demangle::DemangleOptions`.

/// Options recognized by the Interface Indexer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwiftInterfaceIndexConfiguration {
    show_c_imported_types: bool,
}

impl SwiftInterfaceIndexConfiguration {
    /// The default configuration: C-imported type contexts are skipped.
    pub const fn new() -> Self {
        Self {
            show_c_imported_types: false,
        }
    }

    pub const fn show_c_imported_types(mut self, value: bool) -> Self {
        self.show_c_imported_types = value;
        self
    }

    pub const fn shows_c_imported_types(&self) -> bool {
        self.show_c_imported_types
    }
}

impl Default for SwiftInterfaceIndexConfiguration {
    fn default() -> Self {
        Self::new()
    }
}

/// Options recognized by the Printer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrinterConfiguration {
    emit_offset_comments: bool,
    print_type_layout: bool,
    print_enum_layout: bool,
    print_stripped_symbolic_item: bool,
}

impl PrinterConfiguration {
    /// A minimal configuration: no layout comments, no offset annotations.
    pub const fn minimal() -> Self {
        Self {
            emit_offset_comments: false,
            print_type_layout: false,
            print_enum_layout: false,
            print_stripped_symbolic_item: false,
        }
    }

    /// A configuration that surfaces every optional annotation.
    pub const fn verbose() -> Self {
        Self {
            emit_offset_comments: true,
            print_type_layout: true,
            print_enum_layout: true,
            print_stripped_symbolic_item: true,
        }
    }

    pub const fn emit_offset_comments(mut self, value: bool) -> Self {
        self.emit_offset_comments = value;
        self
    }

    pub const fn print_type_layout(mut self, value: bool) -> Self {
        self.print_type_layout = value;
        self
    }

    pub const fn print_enum_layout(mut self, value: bool) -> Self {
        self.print_enum_layout = value;
        self
    }

    pub const fn print_stripped_symbolic_item(mut self, value: bool) -> Self {
        self.print_stripped_symbolic_item = value;
        self
    }

    pub const fn emits_offset_comments(&self) -> bool {
        self.emit_offset_comments
    }

    pub const fn prints_type_layout(&self) -> bool {
        self.print_type_layout
    }

    pub const fn prints_enum_layout(&self) -> bool {
        self.print_enum_layout
    }

    pub const fn prints_stripped_symbolic_item(&self) -> bool {
        self.print_stripped_symbolic_item
    }
}

impl Default for PrinterConfiguration {
    fn default() -> Self {
        Self::minimal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_index_configuration_hides_c_imported_types() {
        assert!(!SwiftInterfaceIndexConfiguration::new().shows_c_imported_types());
    }

    #[test]
    fn builder_chains() {
        let config = SwiftInterfaceIndexConfiguration::new().show_c_imported_types(true);
        assert!(config.shows_c_imported_types());

        let printer = PrinterConfiguration::minimal().emit_offset_comments(true);
        assert!(printer.emits_offset_comments());
        assert!(!printer.prints_type_layout());
    }

    #[test]
    fn verbose_enables_everything() {
        let printer = PrinterConfiguration::verbose();
        assert!(printer.emits_offset_comments());
        assert!(printer.prints_type_layout());
        assert!(printer.prints_enum_layout());
        assert!(printer.prints_stripped_symbolic_item());
    }
}
