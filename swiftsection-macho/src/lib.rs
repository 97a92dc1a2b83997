//! A Mach-O image abstraction, tailored to reading Swift reflection
//! metadata out of `__swift5_*` sections and classifying its symbol table.
//!
//! Full Mach-O/DWARF debugging-information support (breakpad, ELF, PE, WASM,
//! DWARF line tables, ...) is out of scope here; this crate only wraps
//! [`goblin::mach`] with the handful of accessors the Symbol Index and
//! metadata readers need: ordinary + exported symbol iteration, raw section
//! lookup, and an optional shared dyld cache header.

use std::borrow::Cow;
use std::error::Error;
use std::fmt;

use goblin::mach;
use thiserror::Error;

/// An error when dealing with a [`MachImage`].
#[derive(Debug, Error)]
#[error("invalid Mach-O image")]
pub struct MachError {
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl MachError {
    fn new<E>(source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        Self {
            source: Some(source.into()),
        }
    }
}

impl From<goblin::error::Error> for MachError {
    fn from(e: goblin::error::Error) -> Self {
        Self::new(e)
    }
}

/// `nlist` flags relevant to symbol classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NlistInfo {
    /// The symbol is externally visible (`N_EXT`).
    pub external: bool,
    /// The symbol is undefined (no definition in this image).
    pub undefined: bool,
}

/// A single entry from either the ordinary or the exported symbol table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol<'d> {
    /// Offset from the start of the image, already biased by the load
    /// address where applicable. `0` is used as a sentinel for "no
    /// meaningful offset" (see [`Symbol::has_offset`]).
    pub offset: u64,
    pub name: Cow<'d, str>,
    /// Present for ordinary symbol table entries; absent for entries
    /// synthesized from the exported-symbol trie.
    pub nlist: Option<NlistInfo>,
}

impl Symbol<'_> {
    pub fn has_offset(&self) -> bool {
        self.offset != 0
    }
}

/// Stand-in for the one field the Symbol Index actually needs from a shared
/// dyld cache header: the address at which the cache's shared region starts.
/// The real shared-cache format is its own out-of-scope collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SharedCacheHeader {
    pub shared_region_start: u64,
}

/// A Mach-O image, optionally annotated with the shared cache it was loaded
/// from.
pub struct MachImage<'d> {
    macho: mach::MachO<'d>,
    data: &'d [u8],
    shared_cache: Option<SharedCacheHeader>,
    /// Whether this image is the on-disk file representation (as opposed to
    /// an in-memory mapping already biased by the shared cache's slide).
    /// See [`MachImage::symbols`] / the Glossary entry for "shared cache".
    is_file_representation: bool,
}

impl<'d> MachImage<'d> {
    /// Tests whether the buffer could contain a (non-fat) Mach-O image.
    pub fn test(data: &[u8]) -> bool {
        matches!(
            mach::parse_magic_and_ctx(data, 0),
            Ok((
                mach::header::MH_MAGIC_64
                    | mach::header::MH_CIGAM_64
                    | mach::header::MH_MAGIC
                    | mach::header::MH_CIGAM,
                _,
            ))
        )
    }

    /// Parses a single Mach-O image from `data`.
    pub fn parse(data: &'d [u8]) -> Result<Self, MachError> {
        let macho = mach::MachO::parse(data, 0)?;
        Ok(MachImage {
            macho,
            data,
            shared_cache: None,
            is_file_representation: true,
        })
    }

    /// Attaches the shared dyld cache this image lives in, and marks whether
    /// this `MachImage` was parsed from the cache's on-disk file
    /// representation (as opposed to an in-memory view already rebased by
    /// the slide). This governs whether [`Symbol Index`] applies the
    /// cache-relative offset bias; see the Symbol Index build step.
    pub fn attach_shared_cache(&mut self, header: SharedCacheHeader, is_file_representation: bool) {
        self.shared_cache = Some(header);
        self.is_file_representation = is_file_representation;
    }

    pub fn shared_cache(&self) -> Option<SharedCacheHeader> {
        self.shared_cache
    }

    pub fn is_file_representation(&self) -> bool {
        self.is_file_representation
    }

    pub fn name(&self) -> Option<&'d str> {
        self.macho.name
    }

    pub fn data(&self) -> &'d [u8] {
        self.data
    }

    /// The address at which the image prefers to be loaded, taken from the
    /// `__TEXT` segment's `vmaddr`.
    pub fn load_address(&self) -> u64 {
        for segment in &self.macho.segments {
            if segment.name().map(|name| name == "__TEXT").unwrap_or(false) {
                return segment.vmaddr;
            }
        }
        0
    }

    /// Returns an iterator over the ordinary symbol table.
    pub fn symbols(&self) -> impl Iterator<Item = Symbol<'d>> + '_ {
        let vmaddr = self.load_address();
        self.macho.symbols().filter_map(move |entry| {
            let (name, nlist) = entry.ok()?;
            if name.is_empty() {
                return None;
            }
            let offset = nlist.n_value.saturating_sub(vmaddr);
            Some(Symbol {
                offset,
                name: Cow::Borrowed(name),
                nlist: Some(NlistInfo {
                    external: nlist.is_global(),
                    undefined: nlist.is_undefined(),
                }),
            })
        })
    }

    /// Returns an iterator over the exported-symbol trie, if present.
    pub fn exported_symbols(&self) -> Vec<Symbol<'d>> {
        let exports = match self.macho.exports() {
            Ok(exports) => exports,
            Err(_) => return Vec::new(),
        };

        exports
            .into_iter()
            .map(|export| Symbol {
                offset: export.offset,
                name: Cow::Owned(export.name),
                nlist: None,
            })
            .collect()
    }

    /// Returns the raw bytes of a `__TEXT`/`__DATA`/... section by its short
    /// name (without the leading `__`), e.g. `"swift5_types"`.
    pub fn raw_section(&self, section_name: &str) -> Option<&'d [u8]> {
        for segment in &self.macho.segments {
            for result in segment.into_iter() {
                let Ok((header, data)) = result else {
                    continue;
                };
                if let Ok(name) = header.name() {
                    if name.starts_with("__") && &name[2..] == section_name {
                        return Some(data);
                    }
                }
            }
        }
        None
    }

    /// Convenience accessor for a `__swift5_*` metadata section.
    pub fn swift_section(&self, short_name: &str) -> Option<&'d [u8]> {
        self.raw_section(short_name)
    }
}

impl fmt::Debug for MachImage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachImage")
            .field("name", &self.name())
            .field("load_address", &format_args!("{:#x}", self.load_address()))
            .field("shared_cache", &self.shared_cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_macho_data() {
        assert!(!MachImage::test(b"not a macho file"));
    }

    #[test]
    fn parse_reports_error_on_garbage() {
        let err = MachImage::parse(b"not a macho file").unwrap_err();
        assert!(err.source().is_some());
    }
}
