//! Data model of the indexed object file format.
//!
//! An object file is a single contiguous byte stream of the shape
//!
//! ```text
//! Header {
//!    Magic   [8]byte    // "\x00go115ld"
//!    Flags   u32
//!    Offsets [NBLK]u32  // absolute byte offset of each block below
//! }
//!
//! Strings [...]byte     // raw string pool, not length prefixed
//!
//! Autolib    [...]StringRef  // imported packages
//! PkgIndex   [...]StringRef  // referenced packages by index (1 based)
//! DwarfFiles [...]StringRef  // DWARF file name table
//!
//! SymbolDefs [...]Sym   // package symbol definitions
//! NonPkgDefs [...]Sym   // non-package symbol definitions
//! NonPkgRefs [...]Sym   // non-package symbol references
//!
//! RelocIndex [...]u32   // cumulative count into Relocs
//! AuxIndex   [...]u32   // cumulative count into Aux
//! DataIndex  [...]u32   // cumulative byte offset into Data
//!
//! Relocs [...]Reloc
//! Aux    [...]Aux
//! Data   [...]byte
//! Pcdata [...]byte
//! ```
//!
//! All fixed-width integers are little-endian. A string is referenced
//! inline as a `{len u32, off u32}` pair pointing into the string pool,
//! which lies between the header and the first block. A symbol is
//! referenced as a `{pkg_idx u32, sym_idx u32}` pair, where `pkg_idx`
//! is either one of the predeclared [`PKG_IDX_NONE`] /
//! [`PKG_IDX_BUILTIN`] / [`PKG_IDX_SELF`] sentinels or a 1 based index
//! into the package index block. `{0, 0}` is the nil symbol.
//!
//! The three index blocks carry one entry per defined symbol plus a
//! final terminator, so for `N` defined symbols each holds `N + 1`
//! values. The relocations of the i-th symbol are the `RelocIndex[i]`-th
//! (inclusive) to `RelocIndex[i+1]`-th (exclusive) entries of the Relocs
//! block; aux records and data ranges resolve likewise. This is what
//! buys constant time random access to any record in the file.

use std::borrow::Cow;
use std::io::Write;

use crate::error::IntoError as _;
use crate::util::Pod;
use crate::util::ReadRaw as _;
use crate::writer::Writer;
use crate::Error;
use crate::Reader;
use crate::Result;


/// The magic bytes opening every object file, doubling as the format
/// version gate.
pub const MAGIC: &[u8; 8] = b"\x00go115ld";

/// Size of an inline string reference, two `u32`s.
pub const STRING_REF_SIZE: usize = 8;
/// Size of an encoded symbol record.
pub const SYM_SIZE: usize = STRING_REF_SIZE + 2 + 1 + 1 + 4 + 4;
/// Size of an encoded relocation record.
pub const RELOC_SIZE: usize = 4 + 1 + 1 + 8 + 8;
/// Size of an encoded aux record.
pub const AUX_SIZE: usize = 1 + 8;
/// Size of one entry of an index block.
pub const INDEX_SIZE: usize = 4;

// Blocks, in file order. Offsets are indexed by these.
/// Imported package string references.
pub const BLK_AUTOLIB: usize = 0;
/// Referenced-by-index package string references.
pub const BLK_PKGIDX: usize = 1;
/// DWARF file name string references.
pub const BLK_DWARFFILE: usize = 2;
/// Package symbol definitions.
pub const BLK_SYMDEF: usize = 3;
/// Non-package symbol definitions.
pub const BLK_NONPKGDEF: usize = 4;
/// Non-package symbol references.
pub const BLK_NONPKGREF: usize = 5;
/// Per-symbol relocation index.
pub const BLK_RELOCIDX: usize = 6;
/// Per-symbol aux index.
pub const BLK_AUXIDX: usize = 7;
/// Per-symbol data index.
pub const BLK_DATAIDX: usize = 8;
/// Relocation records.
pub const BLK_RELOC: usize = 9;
/// Aux records.
pub const BLK_AUX: usize = 10;
/// Symbol data payload.
pub const BLK_DATA: usize = 11;
/// PC-indexed auxiliary tables, opaque to the codec.
pub const BLK_PCDATA: usize = 12;
/// The number of blocks.
pub const NBLK: usize = 13;

// Package index sentinels. The index of other referenced packages
// starts from 1.
/// Non-package symbols.
pub const PKG_IDX_NONE: u32 = (1 << 31) - 2;
/// Predefined symbols. Reserved, currently unused.
pub const PKG_IDX_BUILTIN: u32 = (1 << 31) - 3;
/// Symbols defined in the current package.
pub const PKG_IDX_SELF: u32 = (1 << 31) - 4;
/// An invalid package index.
pub const PKG_IDX_INVALID: u32 = 0;

/// The ABI value denoting a file-static symbol.
pub const SYM_ABI_STATIC: u16 = u16::MAX;

/// Object header flag: the package was built in shared mode.
pub const OBJ_FLAG_SHARED: u32 = 1;

/// Symbol flag: duplicate definitions are tolerated.
pub const SYM_FLAG_DUPOK: u8 = 1 << 0;
/// Symbol flag: the symbol is local to its object file.
pub const SYM_FLAG_LOCAL: u8 = 1 << 1;
/// Symbol flag: the symbol participates in the type link table.
pub const SYM_FLAG_TYPELINK: u8 = 1 << 2;
/// Symbol flag: the function is a leaf.
pub const SYM_FLAG_LEAF: u8 = 1 << 3;
/// Symbol flag: the function must not have a stack split prologue.
pub const SYM_FLAG_NOSPLIT: u8 = 1 << 4;
/// Symbol flag: the function may be invoked through reflection.
pub const SYM_FLAG_REFLECT_METHOD: u8 = 1 << 5;
/// Symbol flag: the symbol is a type descriptor.
pub const SYM_FLAG_GOTYPE: u8 = 1 << 6;
/// Symbol flag: the function is the outermost stack frame.
pub const SYM_FLAG_TOP_FRAME: u8 = 1 << 7;

/// Aux kind: the type descriptor of a symbol.
pub const AUX_GOTYPE: u8 = 0;
/// Aux kind: function metadata.
pub const AUX_FUNCINFO: u8 = 1;
/// Aux kind: funcdata referenced by function metadata.
pub const AUX_FUNCDATA: u8 = 2;
/// Aux kind: DWARF debug info.
pub const AUX_DWARF_INFO: u8 = 3;
/// Aux kind: DWARF location list.
pub const AUX_DWARF_LOC: u8 = 4;
/// Aux kind: DWARF range list.
pub const AUX_DWARF_RANGES: u8 = 5;
/// Aux kind: DWARF line table.
pub const AUX_DWARF_LINES: u8 = 6;


#[inline]
fn get_u16(data: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([data[off], data[off + 1]])
}

#[inline]
fn get_u32(data: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}

#[inline]
fn get_u64(data: &[u8], off: usize) -> u64 {
    let mut data = &data[off..];
    // SANITY: All callers pass a window with at least eight bytes
    //         remaining.
    data.read_u64().unwrap()
}

#[inline]
fn put_u32(data: &mut [u8], off: usize, x: u32) {
    data[off..off + 4].copy_from_slice(&x.to_le_bytes());
}

#[inline]
fn put_u64(data: &mut [u8], off: usize, x: u64) {
    data[off..off + 8].copy_from_slice(&x.to_le_bytes());
}


/// The file header: flag word plus the absolute offset of every block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    /// The object level flag word.
    pub flags: u32,
    /// Absolute byte offsets of the block starts, indexed by `BLK_*`.
    pub offsets: [u32; NBLK],
}

impl Header {
    /// The encoded size of the header.
    pub const SIZE: usize = MAGIC.len() + 4 + 4 * NBLK;

    /// Parse a header from the start of `data`, validating the magic.
    pub fn parse(data: &[u8]) -> Result<Header> {
        fn parse_impl(mut data: &[u8]) -> Option<Result<Header>> {
            let magic = data.read_array::<8>()?;
            if magic != *MAGIC {
                return Some(Err(Error::with_invalid_data(
                    "wrong magic, not an indexed object file",
                )))
            }

            let flags = data.read_u32()?;
            let mut offsets = [0; NBLK];
            for offset in offsets.iter_mut() {
                *offset = data.read_u32()?;
            }
            Some(Ok(Header { flags, offsets }))
        }

        parse_impl(data).ok_or_invalid_data(|| "data does not contain a complete header")?
    }

    /// Serialize the header through `w`.
    pub fn write<W>(&self, w: &mut Writer<W>) -> Result<()>
    where
        W: Write,
    {
        w.bytes(MAGIC)?;
        w.u32(self.flags)?;
        for offset in self.offsets {
            w.u32(offset)?;
        }
        Ok(())
    }
}


/// A symbol reference, identifying a symbol within or across packages.
///
/// `{0, 0}` represents the nil symbol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SymRef {
    /// The package: a `PKG_IDX_*` sentinel or a 1 based package index.
    pub pkg_idx: u32,
    /// The symbol's index within the package.
    pub sym_idx: u32,
}

impl SymRef {
    /// Serialize the reference through `w`.
    pub fn write<W>(&self, w: &mut Writer<W>) -> Result<()>
    where
        W: Write,
    {
        w.u32(self.pkg_idx)?;
        w.u32(self.sym_idx)
    }
}


/// A symbol definition, the producer side of a [`RawSym`].
#[derive(Clone, Debug, Default)]
pub struct Sym {
    /// The symbol name. Must have been interned before the record is
    /// written.
    pub name: String,
    /// The symbol's ABI, or [`SYM_ABI_STATIC`].
    pub abi: u16,
    /// The symbol's type code.
    pub typ: u8,
    /// The `SYM_FLAG_*` bitset.
    pub flag: u8,
    /// The size of the symbol's data.
    pub siz: u32,
    /// The symbol's alignment requirement.
    pub align: u32,
}

impl Sym {
    /// Serialize the record through `w`.
    pub fn write<W>(&self, w: &mut Writer<W>) -> Result<()>
    where
        W: Write,
    {
        w.string_ref(&self.name)?;
        w.u16(self.abi)?;
        w.u8(self.typ)?;
        w.u8(self.flag)?;
        w.u32(self.siz)?;
        w.u32(self.align)
    }
}


/// A relocation, the producer side of a [`RawReloc`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Reloc {
    /// Offset of the relocated field within the owning symbol's data.
    pub off: i32,
    /// Width of the relocated field, in bytes.
    pub siz: u8,
    /// The relocation type, opaque to the codec.
    pub typ: u8,
    /// The addend.
    pub add: i64,
    /// The target symbol.
    pub sym: SymRef,
}

impl Reloc {
    /// Serialize the record through `w`.
    pub fn write<W>(&self, w: &mut Writer<W>) -> Result<()>
    where
        W: Write,
    {
        w.u32(self.off as u32)?;
        w.u8(self.siz)?;
        w.u8(self.typ)?;
        w.u64(self.add as u64)?;
        self.sym.write(w)
    }
}


/// An aux record attaching auxiliary metadata to a symbol, the producer
/// side of a [`RawAux`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Aux {
    /// The `AUX_*` kind.
    pub typ: u8,
    /// The auxiliary symbol.
    pub sym: SymRef,
}

impl Aux {
    /// Serialize the record through `w`.
    pub fn write<W>(&self, w: &mut Writer<W>) -> Result<()>
    where
        W: Write,
    {
        w.u8(self.typ)?;
        self.sym.write(w)
    }
}


/// A view of an encoded symbol record, decoding fields on access.
#[repr(transparent)]
#[derive(Clone)]
pub struct RawSym([u8; SYM_SIZE]);

// SAFETY: `RawSym` is valid for any bit pattern.
unsafe impl Pod for RawSym {}

impl RawSym {
    /// Resolve the symbol's name against `r`'s string pool.
    pub fn name<'data>(&self, r: &Reader<'data>) -> Result<Cow<'data, str>> {
        let len = get_u32(&self.0, 0);
        let off = get_u32(&self.0, 4);
        r.string_at(off, len)
    }

    /// The symbol's ABI.
    #[inline]
    pub fn abi(&self) -> u16 {
        get_u16(&self.0, 8)
    }

    /// The symbol's type code.
    #[inline]
    pub fn type_(&self) -> u8 {
        self.0[10]
    }

    /// The `SYM_FLAG_*` bitset. Unknown bits are preserved.
    #[inline]
    pub fn flag(&self) -> u8 {
        self.0[11]
    }

    /// The size of the symbol's data.
    #[inline]
    pub fn siz(&self) -> u32 {
        get_u32(&self.0, 12)
    }

    /// The symbol's alignment requirement.
    #[inline]
    pub fn align(&self) -> u32 {
        get_u32(&self.0, 16)
    }

    /// Whether duplicate definitions of the symbol are tolerated.
    pub fn dupok(&self) -> bool {
        self.flag() & SYM_FLAG_DUPOK != 0
    }

    /// Whether the symbol is local to its object file.
    pub fn local(&self) -> bool {
        self.flag() & SYM_FLAG_LOCAL != 0
    }

    /// Whether the symbol participates in the type link table.
    pub fn typelink(&self) -> bool {
        self.flag() & SYM_FLAG_TYPELINK != 0
    }

    /// Whether the function is a leaf.
    pub fn leaf(&self) -> bool {
        self.flag() & SYM_FLAG_LEAF != 0
    }

    /// Whether the function must not have a stack split prologue.
    pub fn nosplit(&self) -> bool {
        self.flag() & SYM_FLAG_NOSPLIT != 0
    }

    /// Whether the function may be invoked through reflection.
    pub fn reflect_method(&self) -> bool {
        self.flag() & SYM_FLAG_REFLECT_METHOD != 0
    }

    /// Whether the symbol is a type descriptor.
    pub fn is_gotype(&self) -> bool {
        self.flag() & SYM_FLAG_GOTYPE != 0
    }

    /// Whether the function is the outermost frame of a stack trace.
    pub fn top_frame(&self) -> bool {
        self.flag() & SYM_FLAG_TOP_FRAME != 0
    }
}


/// A view of an encoded relocation record.
///
/// Fields decode on access. The setters patch the record in place and
/// hence require a mutable view, obtained through
/// [`from_bytes_mut`][Self::from_bytes_mut] on writable backing memory.
#[repr(transparent)]
#[derive(Clone)]
pub struct RawReloc([u8; RELOC_SIZE]);

// SAFETY: `RawReloc` is valid for any bit pattern.
unsafe impl Pod for RawReloc {}

impl RawReloc {
    /// Reinterpret the start of `data` as a mutable relocation record.
    pub fn from_bytes_mut(data: &mut [u8]) -> Option<&mut RawReloc> {
        crate::util::cast_pod_mut::<RawReloc>(data)
    }

    /// Offset of the relocated field within the owning symbol's data.
    #[inline]
    pub fn off(&self) -> i32 {
        get_u32(&self.0, 0) as i32
    }

    /// Width of the relocated field, in bytes.
    #[inline]
    pub fn siz(&self) -> u8 {
        self.0[4]
    }

    /// The relocation type.
    #[inline]
    pub fn type_(&self) -> u8 {
        self.0[5]
    }

    /// The addend.
    #[inline]
    pub fn add(&self) -> i64 {
        get_u64(&self.0, 6) as i64
    }

    /// The target symbol.
    #[inline]
    pub fn sym(&self) -> SymRef {
        SymRef {
            pkg_idx: get_u32(&self.0, 14),
            sym_idx: get_u32(&self.0, 18),
        }
    }

    /// Set the field offset.
    #[inline]
    pub fn set_off(&mut self, x: i32) {
        put_u32(&mut self.0, 0, x as u32)
    }

    /// Set the field width.
    #[inline]
    pub fn set_siz(&mut self, x: u8) {
        self.0[4] = x
    }

    /// Set the relocation type.
    #[inline]
    pub fn set_type(&mut self, x: u8) {
        self.0[5] = x
    }

    /// Set the addend.
    #[inline]
    pub fn set_add(&mut self, x: i64) {
        put_u64(&mut self.0, 6, x as u64)
    }

    /// Set the target symbol.
    #[inline]
    pub fn set_sym(&mut self, x: SymRef) {
        put_u32(&mut self.0, 14, x.pkg_idx);
        put_u32(&mut self.0, 18, x.sym_idx);
    }

    /// Set all fields at once.
    pub fn set(&mut self, off: i32, siz: u8, typ: u8, add: i64, sym: SymRef) {
        self.set_off(off);
        self.set_siz(siz);
        self.set_type(typ);
        self.set_add(add);
        self.set_sym(sym);
    }
}


/// A view of an encoded aux record.
#[repr(transparent)]
#[derive(Clone)]
pub struct RawAux([u8; AUX_SIZE]);

// SAFETY: `RawAux` is valid for any bit pattern.
unsafe impl Pod for RawAux {}

impl RawAux {
    /// The `AUX_*` kind.
    #[inline]
    pub fn type_(&self) -> u8 {
        self.0[0]
    }

    /// The auxiliary symbol.
    #[inline]
    pub fn sym(&self) -> SymRef {
        SymRef {
            pkg_idx: get_u32(&self.0, 1),
            sym_idx: get_u32(&self.0, 5),
        }
    }
}
