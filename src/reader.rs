//! Zero-copy random access to object files.

use std::borrow::Cow;
use std::str;

use crate::log::debug;
use crate::types::Header;
use crate::types::RawAux;
use crate::types::RawReloc;
use crate::types::RawSym;
use crate::types::AUX_SIZE;
use crate::types::BLK_AUTOLIB;
use crate::types::BLK_AUX;
use crate::types::BLK_AUXIDX;
use crate::types::BLK_DATA;
use crate::types::BLK_DATAIDX;
use crate::types::BLK_DWARFFILE;
use crate::types::BLK_NONPKGDEF;
use crate::types::BLK_NONPKGREF;
use crate::types::BLK_PCDATA;
use crate::types::BLK_PKGIDX;
use crate::types::BLK_RELOC;
use crate::types::BLK_RELOCIDX;
use crate::types::BLK_SYMDEF;
use crate::types::INDEX_SIZE;
use crate::types::OBJ_FLAG_SHARED;
use crate::types::RELOC_SIZE;
use crate::types::STRING_REF_SIZE;
use crate::types::SYM_SIZE;
use crate::util::ReadRaw as _;
use crate::Error;
use crate::ErrorExt as _;
use crate::Result;


/// A random access reader over a complete object file.
///
/// The reader parses the fixed header once at construction and answers
/// every subsequent query by pure offset arithmetic over the header's
/// block offset table and the per-symbol index blocks. Accessors return
/// views borrowing the underlying bytes; nothing is scanned or cached.
///
/// Accessors take no locks and never mutate state, so a reader over
/// read-only memory can be queried from any number of threads.
///
/// Indices passed to the per-symbol accessors have to be in range;
/// handing in an out-of-range index is a bug in the caller and panics.
#[derive(Debug)]
pub struct Reader<'data> {
    /// The raw object file bytes, typically a memory mapped file.
    data: &'data [u8],
    /// Whether `data` is backed by read-only memory.
    readonly: bool,
    /// The parsed header, kept for its block offset table.
    header: Header,
}

impl<'data> Reader<'data> {
    /// Create a `Reader` over the provided object file bytes.
    ///
    /// `readonly` states whether `data` is backed by read-only memory;
    /// if so, string accessors borrow the backing bytes instead of
    /// copying them out.
    pub fn new(data: &'data [u8], readonly: bool) -> Result<Reader<'data>> {
        let header = Header::parse(data).context("failed to parse object file header")?;
        debug!(
            "loaded object file: {} bytes, flags {:#x}",
            data.len(),
            header.flags
        );

        Ok(Reader {
            data,
            readonly,
            header,
        })
    }

    /// Whether the backing memory is read-only.
    #[inline]
    pub fn read_only(&self) -> bool {
        self.readonly
    }

    /// The flag word read from the object file header.
    #[inline]
    pub fn flags(&self) -> u32 {
        self.header.flags
    }

    /// Whether the object was built in shared mode.
    #[inline]
    pub fn shared(&self) -> bool {
        self.header.flags & OBJ_FLAG_SHARED != 0
    }

    /// A view of `len` bytes starting at `off`.
    pub fn bytes_at(&self, off: u32, len: usize) -> &'data [u8] {
        if len == 0 {
            return &[]
        }
        &self.data[off as usize..off as usize + len]
    }

    /// Read a `u8` at `off`.
    pub fn u8_at(&self, off: u32) -> u8 {
        let mut data = self.bytes_at(off, 1);
        // SANITY: The window is exactly one byte.
        data.read_u8().unwrap()
    }

    /// Read a little-endian `u16` at `off`.
    pub fn u16_at(&self, off: u32) -> u16 {
        let mut data = self.bytes_at(off, 2);
        // SANITY: The window is exactly two bytes.
        data.read_u16().unwrap()
    }

    /// Read a little-endian `u32` at `off`.
    pub fn u32_at(&self, off: u32) -> u32 {
        let mut data = self.bytes_at(off, 4);
        // SANITY: The window is exactly four bytes.
        data.read_u32().unwrap()
    }

    /// Read a little-endian `u64` at `off`.
    pub fn u64_at(&self, off: u32) -> u64 {
        let mut data = self.bytes_at(off, 8);
        // SANITY: The window is exactly eight bytes.
        data.read_u64().unwrap()
    }

    /// A view of `len` string pool bytes at `off`.
    ///
    /// On a read-only backed reader the result borrows the backing
    /// memory; otherwise it is copied out, because callers may outlive
    /// mutable backing storage.
    pub fn string_at(&self, off: u32, len: u32) -> Result<Cow<'data, str>> {
        let bytes = self.bytes_at(off, len as usize);
        let s = str::from_utf8(bytes)
            .map_err(Error::with_invalid_data)
            .context("string pool data is not valid UTF-8")?;
        if self.readonly {
            Ok(Cow::Borrowed(s))
        } else {
            Ok(Cow::Owned(s.to_string()))
        }
    }

    /// Resolve the inline string reference at `off`.
    pub fn string_ref(&self, off: u32) -> Result<Cow<'data, str>> {
        let len = self.u32_at(off);
        self.string_at(self.u32_at(off + 4), len)
    }

    fn string_ref_block(&self, blk: usize) -> Result<Vec<Cow<'data, str>>> {
        let n = self.string_ref_count(blk);
        (0..n)
            .map(|i| {
                let off = self.header.offsets[blk] + (i * STRING_REF_SIZE) as u32;
                self.string_ref(off)
            })
            .collect()
    }

    fn string_ref_count(&self, blk: usize) -> usize {
        (self.header.offsets[blk + 1] - self.header.offsets[blk]) as usize / STRING_REF_SIZE
    }

    /// The list of imported packages.
    pub fn autolib(&self) -> Result<Vec<Cow<'data, str>>> {
        self.string_ref_block(BLK_AUTOLIB)
    }

    /// The list of packages referenced by index.
    pub fn pkg_list(&self) -> Result<Vec<Cow<'data, str>>> {
        self.string_ref_block(BLK_PKGIDX)
    }

    /// The number of packages referenced by index.
    pub fn n_pkg(&self) -> usize {
        self.string_ref_count(BLK_PKGIDX)
    }

    /// The `i`-th referenced package.
    pub fn pkg(&self, i: usize) -> Result<Cow<'data, str>> {
        let off = self.header.offsets[BLK_PKGIDX] + (i * STRING_REF_SIZE) as u32;
        self.string_ref(off)
    }

    /// The number of DWARF file names.
    pub fn n_dwarf_file(&self) -> usize {
        self.string_ref_count(BLK_DWARFFILE)
    }

    /// The `i`-th DWARF file name.
    pub fn dwarf_file(&self, i: usize) -> Result<Cow<'data, str>> {
        let off = self.header.offsets[BLK_DWARFFILE] + (i * STRING_REF_SIZE) as u32;
        self.string_ref(off)
    }

    /// The number of package symbol definitions.
    pub fn n_sym(&self) -> usize {
        (self.header.offsets[BLK_SYMDEF + 1] - self.header.offsets[BLK_SYMDEF]) as usize / SYM_SIZE
    }

    /// The number of non-package symbol definitions.
    pub fn n_nonpkgdef(&self) -> usize {
        (self.header.offsets[BLK_NONPKGDEF + 1] - self.header.offsets[BLK_NONPKGDEF]) as usize
            / SYM_SIZE
    }

    /// The number of non-package symbol references.
    pub fn n_nonpkgref(&self) -> usize {
        (self.header.offsets[BLK_NONPKGREF + 1] - self.header.offsets[BLK_NONPKGREF]) as usize
            / SYM_SIZE
    }

    /// The offset of the `i`-th symbol record.
    ///
    /// The symbol definition blocks are adjacent, so `i` counts through
    /// package definitions, non-package definitions, and non-package
    /// references in file order.
    pub fn sym_off(&self, i: usize) -> u32 {
        self.header.offsets[BLK_SYMDEF] + (i * SYM_SIZE) as u32
    }

    /// A view of the `i`-th symbol record.
    pub fn sym(&self, i: usize) -> &'data RawSym {
        let mut data = self.bytes_at(self.sym_off(i), SYM_SIZE);
        // SANITY: The window is exactly one record and `RawSym` has
        //         alignment 1.
        data.read_pod_ref::<RawSym>().unwrap()
    }

    /// The number of relocations of the `i`-th symbol.
    pub fn n_reloc(&self, i: usize) -> usize {
        let idx_off = self.header.offsets[BLK_RELOCIDX] + (i * INDEX_SIZE) as u32;
        (self.u32_at(idx_off + 4) - self.u32_at(idx_off)) as usize
    }

    /// The offset of the `j`-th relocation of the `i`-th symbol.
    pub fn reloc_off(&self, i: usize, j: usize) -> u32 {
        let idx_off = self.header.offsets[BLK_RELOCIDX] + (i * INDEX_SIZE) as u32;
        let reloc_idx = self.u32_at(idx_off) + j as u32;
        self.header.offsets[BLK_RELOC] + reloc_idx * RELOC_SIZE as u32
    }

    /// A view of the `j`-th relocation of the `i`-th symbol.
    pub fn reloc(&self, i: usize, j: usize) -> &'data RawReloc {
        let mut data = self.bytes_at(self.reloc_off(i, j), RELOC_SIZE);
        // SANITY: The window is exactly one record and `RawReloc` has
        //         alignment 1.
        data.read_pod_ref::<RawReloc>().unwrap()
    }

    /// The relocations of the `i`-th symbol, as one contiguous slice of
    /// views.
    pub fn relocs(&self, i: usize) -> &'data [RawReloc] {
        let n = self.n_reloc(i);
        let mut data = self.bytes_at(self.reloc_off(i, 0), n * RELOC_SIZE);
        // SANITY: The window spans `n` records and `RawReloc` has
        //         alignment 1.
        data.read_pod_slice_ref::<RawReloc>(n).unwrap()
    }

    /// The number of aux records of the `i`-th symbol.
    pub fn n_aux(&self, i: usize) -> usize {
        let idx_off = self.header.offsets[BLK_AUXIDX] + (i * INDEX_SIZE) as u32;
        (self.u32_at(idx_off + 4) - self.u32_at(idx_off)) as usize
    }

    /// The offset of the `j`-th aux record of the `i`-th symbol.
    pub fn aux_off(&self, i: usize, j: usize) -> u32 {
        let idx_off = self.header.offsets[BLK_AUXIDX] + (i * INDEX_SIZE) as u32;
        let aux_idx = self.u32_at(idx_off) + j as u32;
        self.header.offsets[BLK_AUX] + aux_idx * AUX_SIZE as u32
    }

    /// A view of the `j`-th aux record of the `i`-th symbol.
    pub fn aux(&self, i: usize, j: usize) -> &'data RawAux {
        let mut data = self.bytes_at(self.aux_off(i, j), AUX_SIZE);
        // SANITY: The window is exactly one record and `RawAux` has
        //         alignment 1.
        data.read_pod_ref::<RawAux>().unwrap()
    }

    /// The aux records of the `i`-th symbol.
    pub fn auxs(&self, i: usize) -> &'data [RawAux] {
        let n = self.n_aux(i);
        let mut data = self.bytes_at(self.aux_off(i, 0), n * AUX_SIZE);
        // SANITY: The window spans `n` records and `RawAux` has
        //         alignment 1.
        data.read_pod_slice_ref::<RawAux>(n).unwrap()
    }

    /// The offset of the `i`-th symbol's data.
    pub fn data_off(&self, i: usize) -> u32 {
        let idx_off = self.header.offsets[BLK_DATAIDX] + (i * INDEX_SIZE) as u32;
        self.header.offsets[BLK_DATA] + self.u32_at(idx_off)
    }

    /// The size of the `i`-th symbol's data.
    pub fn data_size(&self, i: usize) -> usize {
        let idx_off = self.header.offsets[BLK_DATAIDX] + (i * INDEX_SIZE) as u32;
        (self.u32_at(idx_off + 4) - self.u32_at(idx_off)) as usize
    }

    /// A view of the `i`-th symbol's data.
    pub fn data(&self, i: usize) -> &'data [u8] {
        let idx_off = self.header.offsets[BLK_DATAIDX] + (i * INDEX_SIZE) as u32;
        let base = self.header.offsets[BLK_DATA];
        let off = self.u32_at(idx_off);
        let end = self.u32_at(idx_off + 4);
        self.bytes_at(base + off, (end - off) as usize)
    }

    /// The base offset of the pcdata block.
    pub fn pcdata_base(&self) -> u32 {
        self.header.offsets[BLK_PCDATA]
    }

    /// A view of the pcdata block, which spans to the end of the input.
    pub fn pcdata(&self) -> &'data [u8] {
        let base = self.pcdata_base();
        self.bytes_at(base, self.data.len() - base as usize)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::types::Aux;
    use crate::types::Reloc;
    use crate::types::Sym;
    use crate::types::SymRef;
    use crate::types::AUX_FUNCINFO;
    use crate::types::AUX_GOTYPE;
    use crate::types::BLK_DATA;
    use crate::types::MAGIC;
    use crate::types::NBLK;
    use crate::types::PKG_IDX_SELF;
    use crate::types::SYM_ABI_STATIC;
    use crate::types::SYM_FLAG_DUPOK;
    use crate::writer::Writer;
    use crate::ErrorKind;


    /// A symbol definition together with its payload, for artifact
    /// construction.
    #[derive(Default)]
    struct SymDesc {
        sym: Sym,
        data: Vec<u8>,
        relocs: Vec<Reloc>,
        auxs: Vec<Aux>,
    }

    /// Everything that goes into a test artifact.
    #[derive(Default)]
    struct ArtifactDesc {
        flags: u32,
        autolib: Vec<String>,
        pkgs: Vec<String>,
        dwarf_files: Vec<String>,
        symdefs: Vec<SymDesc>,
        nonpkgdefs: Vec<SymDesc>,
        nonpkgrefs: Vec<Sym>,
        pcdata: Vec<u8>,
    }

    /// Serialize an artifact following the producer contract: reserve
    /// header space, front-load all strings, emit blocks in file order
    /// while capturing their offsets, then stamp the header.
    fn write_artifact(desc: &ArtifactDesc) -> Vec<u8> {
        let mut w = Writer::new(Vec::new());
        let mut header = Header {
            flags: desc.flags,
            offsets: [0; NBLK],
        };
        let () = w.bytes(&[0; Header::SIZE]).unwrap();

        let strings = desc
            .autolib
            .iter()
            .chain(desc.pkgs.iter())
            .chain(desc.dwarf_files.iter());
        for s in strings {
            let () = w.add_string(s).unwrap();
        }
        let syms = desc
            .symdefs
            .iter()
            .chain(desc.nonpkgdefs.iter())
            .map(|def| &def.sym)
            .chain(desc.nonpkgrefs.iter());
        for sym in syms {
            let () = w.add_string(&sym.name).unwrap();
        }

        header.offsets[BLK_AUTOLIB] = w.offset();
        for s in desc.autolib.iter() {
            let () = w.string_ref(s).unwrap();
        }
        header.offsets[BLK_PKGIDX] = w.offset();
        for s in desc.pkgs.iter() {
            let () = w.string_ref(s).unwrap();
        }
        header.offsets[BLK_DWARFFILE] = w.offset();
        for s in desc.dwarf_files.iter() {
            let () = w.string_ref(s).unwrap();
        }

        header.offsets[BLK_SYMDEF] = w.offset();
        for def in desc.symdefs.iter() {
            let () = def.sym.write(&mut w).unwrap();
        }
        header.offsets[BLK_NONPKGDEF] = w.offset();
        for def in desc.nonpkgdefs.iter() {
            let () = def.sym.write(&mut w).unwrap();
        }
        header.offsets[BLK_NONPKGREF] = w.offset();
        for sym in desc.nonpkgrefs.iter() {
            let () = sym.write(&mut w).unwrap();
        }

        let defined = || desc.symdefs.iter().chain(desc.nonpkgdefs.iter());

        header.offsets[BLK_RELOCIDX] = w.offset();
        let mut count = 0u32;
        for def in defined() {
            let () = w.u32(count).unwrap();
            count += def.relocs.len() as u32;
        }
        let () = w.u32(count).unwrap();

        header.offsets[BLK_AUXIDX] = w.offset();
        let mut count = 0u32;
        for def in defined() {
            let () = w.u32(count).unwrap();
            count += def.auxs.len() as u32;
        }
        let () = w.u32(count).unwrap();

        header.offsets[BLK_DATAIDX] = w.offset();
        let mut off = 0u32;
        for def in defined() {
            let () = w.u32(off).unwrap();
            off += def.data.len() as u32;
        }
        let () = w.u32(off).unwrap();

        header.offsets[BLK_RELOC] = w.offset();
        for def in defined() {
            for reloc in def.relocs.iter() {
                let () = reloc.write(&mut w).unwrap();
            }
        }
        header.offsets[BLK_AUX] = w.offset();
        for def in defined() {
            for aux in def.auxs.iter() {
                let () = aux.write(&mut w).unwrap();
            }
        }
        header.offsets[BLK_DATA] = w.offset();
        for def in defined() {
            let () = w.bytes(&def.data).unwrap();
        }
        header.offsets[BLK_PCDATA] = w.offset();
        let () = w.bytes(&desc.pcdata).unwrap();

        let mut buf = w.into_inner();
        let () = header.write(&mut Writer::new(&mut buf[..])).unwrap();
        buf
    }

    /// Re-serialize the contents of a reader in canonical order.
    fn materialize(r: &Reader<'_>) -> Vec<u8> {
        let desc = ArtifactDesc {
            flags: r.flags(),
            autolib: r
                .autolib()
                .unwrap()
                .into_iter()
                .map(Cow::into_owned)
                .collect(),
            pkgs: r
                .pkg_list()
                .unwrap()
                .into_iter()
                .map(Cow::into_owned)
                .collect(),
            dwarf_files: (0..r.n_dwarf_file())
                .map(|i| r.dwarf_file(i).unwrap().into_owned())
                .collect(),
            symdefs: (0..r.n_sym()).map(|i| materialize_sym(r, i)).collect(),
            nonpkgdefs: (r.n_sym()..r.n_sym() + r.n_nonpkgdef())
                .map(|i| materialize_sym(r, i))
                .collect(),
            nonpkgrefs: (0..r.n_nonpkgref())
                .map(|i| materialize_sym(r, r.n_sym() + r.n_nonpkgdef() + i).sym)
                .collect(),
            pcdata: r.pcdata().to_vec(),
        };
        write_artifact(&desc)
    }

    fn materialize_sym(r: &Reader<'_>, i: usize) -> SymDesc {
        let raw = r.sym(i);
        let sym = Sym {
            name: raw.name(r).unwrap().into_owned(),
            abi: raw.abi(),
            typ: raw.type_(),
            flag: raw.flag(),
            siz: raw.siz(),
            align: raw.align(),
        };

        let defined = i < r.n_sym() + r.n_nonpkgdef();
        if !defined {
            return SymDesc {
                sym,
                ..Default::default()
            }
        }

        SymDesc {
            sym,
            data: r.data(i).to_vec(),
            relocs: r
                .relocs(i)
                .iter()
                .map(|raw| Reloc {
                    off: raw.off(),
                    siz: raw.siz(),
                    typ: raw.type_(),
                    add: raw.add(),
                    sym: raw.sym(),
                })
                .collect(),
            auxs: r
                .auxs(i)
                .iter()
                .map(|raw| Aux {
                    typ: raw.type_(),
                    sym: raw.sym(),
                })
                .collect(),
        }
    }

    fn sym_foo() -> SymDesc {
        SymDesc {
            sym: Sym {
                name: "foo".to_string(),
                abi: 0,
                typ: 1,
                flag: SYM_FLAG_DUPOK,
                siz: 4,
                align: 4,
            },
            data: vec![0x01, 0x02, 0x03, 0x04],
            relocs: Vec::new(),
            auxs: Vec::new(),
        }
    }


    /// An artifact with no strings and no entries in any block is
    /// sixty-four bytes of header, with every offset pointing at the
    /// end.
    #[test]
    fn empty_artifact() {
        let buf = write_artifact(&ArtifactDesc::default());

        let mut expected = Vec::new();
        let () = expected.extend_from_slice(MAGIC);
        let () = expected.extend_from_slice(&[0; 4]);
        for _ in 0..NBLK {
            let () = expected.extend_from_slice(&64u32.to_le_bytes());
        }
        assert_eq!(buf, expected);

        let r = Reader::new(&buf, true).unwrap();
        assert_eq!(r.n_sym(), 0);
        assert_eq!(r.n_nonpkgdef(), 0);
        assert_eq!(r.n_nonpkgref(), 0);
        assert_eq!(r.n_pkg(), 0);
        assert_eq!(r.n_dwarf_file(), 0);
        assert!(r.autolib().unwrap().is_empty());
        assert!(r.pkg_list().unwrap().is_empty());
        assert!(r.pcdata().is_empty());
        assert!(!r.shared());

        // A zero length string resolves to "" no matter the offset.
        assert_eq!(r.string_at(0xdead_beef, 0).unwrap(), "");
    }

    /// A single defined symbol with data and no relocations reads back
    /// field for field.
    #[test]
    fn single_symbol() {
        let desc = ArtifactDesc {
            symdefs: vec![sym_foo()],
            ..Default::default()
        };
        let buf = write_artifact(&desc);

        let r = Reader::new(&buf, true).unwrap();
        assert_eq!(r.n_sym(), 1);

        let sym = r.sym(0);
        assert_eq!(sym.name(&r).unwrap(), "foo");
        assert_eq!(sym.abi(), 0);
        assert_eq!(sym.type_(), 1);
        assert!(sym.dupok());
        assert!(!sym.local());
        assert_eq!(sym.siz(), 4);
        assert_eq!(sym.align(), 4);

        assert_eq!(r.data(0), [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(r.data_size(0), 4);
        assert_eq!(r.n_reloc(0), 0);
        assert!(r.relocs(0).is_empty());
        assert_eq!(r.n_aux(0), 0);
        assert!(r.auxs(0).is_empty());
    }

    /// A relocation with a negative addend and a self-package target
    /// reads back exactly.
    #[test]
    fn single_relocation() {
        let mut symdef = sym_foo();
        let target = SymRef {
            pkg_idx: PKG_IDX_SELF,
            sym_idx: 0,
        };
        symdef.relocs.push(Reloc {
            off: 0,
            siz: 4,
            typ: 7,
            add: -42,
            sym: target,
        });
        let desc = ArtifactDesc {
            symdefs: vec![symdef],
            ..Default::default()
        };
        let buf = write_artifact(&desc);

        let r = Reader::new(&buf, true).unwrap();
        assert_eq!(r.n_reloc(0), 1);

        let reloc = r.reloc(0, 0);
        assert_eq!(reloc.off(), 0);
        assert_eq!(reloc.siz(), 4);
        assert_eq!(reloc.type_(), 7);
        assert_eq!(reloc.add(), -42);
        assert_eq!(reloc.sym(), target);
    }

    /// Symbols with asymmetric relocation and aux counts index into
    /// the shared payload blocks correctly.
    #[test]
    fn asymmetric_counts() {
        let gotype = Aux {
            typ: AUX_GOTYPE,
            sym: SymRef {
                pkg_idx: PKG_IDX_SELF,
                sym_idx: 1,
            },
        };
        let funcinfo = Aux {
            typ: AUX_FUNCINFO,
            sym: SymRef {
                pkg_idx: PKG_IDX_SELF,
                sym_idx: 2,
            },
        };

        let mut first = sym_foo();
        for i in 0..3 {
            first.relocs.push(Reloc {
                off: i * 4,
                siz: 4,
                typ: 1,
                add: i as i64,
                sym: SymRef {
                    pkg_idx: PKG_IDX_SELF,
                    sym_idx: 1,
                },
            });
        }
        first.auxs.push(gotype);

        let mut second = sym_foo();
        second.sym.name = "bar".to_string();
        second.data = vec![0xff; 8];
        second.auxs.push(gotype);
        second.auxs.push(funcinfo);

        let desc = ArtifactDesc {
            symdefs: vec![first, second],
            ..Default::default()
        };
        let buf = write_artifact(&desc);
        let r = Reader::new(&buf, true).unwrap();

        assert_eq!(r.n_sym(), 2);
        assert_eq!(r.n_reloc(0), 3);
        assert_eq!(r.n_reloc(1), 0);
        assert!(r.relocs(1).is_empty());
        assert_eq!(r.n_aux(0), 1);
        assert_eq!(r.n_aux(1), 2);

        let auxs = r.auxs(1);
        assert_eq!(auxs.len(), 2);
        assert_eq!(auxs[0].type_(), AUX_GOTYPE);
        assert_eq!(auxs[1].type_(), AUX_FUNCINFO);
        assert_eq!(auxs[1].sym().sym_idx, 2);

        // The relocations of the first symbol are addend 0, 1, 2 in
        // order.
        for (j, reloc) in r.relocs(0).iter().enumerate() {
            assert_eq!(reloc.add(), j as i64);
            assert_eq!(reloc.off(), j as i32 * 4);
        }

        assert_eq!(r.data(0), [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(r.data(1), [0xff; 8]);
    }

    /// A corrupted magic byte fails reader construction.
    #[test]
    fn magic_mismatch() {
        let mut buf = write_artifact(&ArtifactDesc::default());
        buf[0] = 0x01;

        let err = Reader::new(&buf, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(err.to_string().contains("wrong magic"), "{err}");
    }

    /// The static ABI sentinel reads back as written.
    #[test]
    fn static_abi() {
        let mut symdef = sym_foo();
        symdef.sym.abi = SYM_ABI_STATIC;
        let desc = ArtifactDesc {
            symdefs: vec![symdef],
            ..Default::default()
        };
        let buf = write_artifact(&desc);

        let r = Reader::new(&buf, true).unwrap();
        assert_eq!(r.sym(0).abi(), SYM_ABI_STATIC);
    }

    /// Non-package definitions and references extend the symbol index
    /// space past the package definitions.
    #[test]
    fn nonpkg_symbols() {
        let mut nonpkgdef = sym_foo();
        nonpkgdef.sym.name = "static.0".to_string();
        nonpkgdef.sym.abi = SYM_ABI_STATIC;
        nonpkgdef.data = vec![0xaa, 0xbb];

        let nonpkgref = Sym {
            name: "runtime.newobject".to_string(),
            ..Default::default()
        };

        let desc = ArtifactDesc {
            symdefs: vec![sym_foo()],
            nonpkgdefs: vec![nonpkgdef],
            nonpkgrefs: vec![nonpkgref],
            ..Default::default()
        };
        let buf = write_artifact(&desc);
        let r = Reader::new(&buf, true).unwrap();

        assert_eq!(r.n_sym(), 1);
        assert_eq!(r.n_nonpkgdef(), 1);
        assert_eq!(r.n_nonpkgref(), 1);

        assert_eq!(r.sym(1).name(&r).unwrap(), "static.0");
        assert_eq!(r.data(1), [0xaa, 0xbb]);
        assert_eq!(r.sym(2).name(&r).unwrap(), "runtime.newobject");
    }

    /// Structural invariants of a well-formed artifact: monotonic block
    /// offsets, stride divisibility, index block agreement, and
    /// cumulative consistency with the payload block extents.
    #[test]
    fn structural_invariants() {
        let mut first = sym_foo();
        first.relocs.push(Reloc::default());
        first.auxs.push(Aux::default());
        let desc = ArtifactDesc {
            flags: OBJ_FLAG_SHARED,
            autolib: vec!["runtime".to_string()],
            pkgs: vec!["runtime".to_string(), "sync".to_string()],
            dwarf_files: vec!["foo.go".to_string()],
            symdefs: vec![first, sym_foo()],
            pcdata: vec![0x00, 0x11, 0x22],
            ..Default::default()
        };
        let buf = write_artifact(&desc);
        let header = Header::parse(&buf).unwrap();

        let strides = [
            STRING_REF_SIZE,
            STRING_REF_SIZE,
            STRING_REF_SIZE,
            SYM_SIZE,
            SYM_SIZE,
            SYM_SIZE,
            INDEX_SIZE,
            INDEX_SIZE,
            INDEX_SIZE,
            RELOC_SIZE,
            AUX_SIZE,
            1,
            1,
        ];
        for blk in 0..NBLK - 1 {
            let len = header.offsets[blk + 1] - header.offsets[blk];
            assert!(header.offsets[blk] <= header.offsets[blk + 1], "{blk}");
            assert_eq!(len as usize % strides[blk], 0, "{blk}");
        }

        let r = Reader::new(&buf, true).unwrap();
        let n_def = r.n_sym() + r.n_nonpkgdef();
        for blk in [BLK_RELOCIDX, BLK_AUXIDX, BLK_DATAIDX] {
            let len = (header.offsets[blk + 1] - header.offsets[blk]) as usize;
            assert_eq!(len / INDEX_SIZE, n_def + 1);
        }

        // The final index entries match the payload block extents.
        let total_reloc = r.u32_at(header.offsets[BLK_AUXIDX] - 4);
        assert_eq!(
            total_reloc * RELOC_SIZE as u32,
            header.offsets[BLK_AUX] - header.offsets[BLK_RELOC]
        );
        let total_aux = r.u32_at(header.offsets[BLK_DATAIDX] - 4);
        assert_eq!(
            total_aux * AUX_SIZE as u32,
            header.offsets[BLK_DATA] - header.offsets[BLK_AUX]
        );
        let total_data = r.u32_at(header.offsets[BLK_RELOC] - 4);
        assert_eq!(
            total_data,
            header.offsets[BLK_PCDATA] - header.offsets[BLK_DATA]
        );

        // Every string reference points into the pool region before the
        // first block.
        for i in 0..r.n_pkg() {
            let off = header.offsets[BLK_PKGIDX] + (i * STRING_REF_SIZE) as u32;
            let len = r.u32_at(off);
            let str_off = r.u32_at(off + 4);
            assert!(str_off + len <= header.offsets[BLK_AUTOLIB]);
        }
    }

    /// Reading an artifact and re-serializing it in canonical order
    /// reproduces it byte for byte, reserved flag bits included.
    #[test]
    fn round_trip() {
        let mut first = sym_foo();
        // Unknown symbol flag bits have to survive.
        first.sym.flag = 0xff;
        first.relocs.push(Reloc {
            off: 16,
            siz: 8,
            typ: 2,
            add: 1 << 40,
            sym: SymRef {
                pkg_idx: 1,
                sym_idx: 99,
            },
        });
        first.auxs.push(Aux {
            typ: AUX_GOTYPE,
            sym: SymRef {
                pkg_idx: PKG_IDX_SELF,
                sym_idx: 1,
            },
        });

        let desc = ArtifactDesc {
            // Bit 0 is the shared flag; the high bits are reserved and
            // have to round-trip untouched.
            flags: OBJ_FLAG_SHARED | 0x8000_0000,
            autolib: vec!["runtime".to_string(), "sync".to_string()],
            pkgs: vec!["runtime".to_string()],
            dwarf_files: vec!["a.go".to_string(), "b.go".to_string()],
            symdefs: vec![first],
            nonpkgdefs: vec![sym_foo()],
            nonpkgrefs: vec![Sym {
                name: "runtime.morestack".to_string(),
                ..Default::default()
            }],
            pcdata: vec![0xde, 0xad],
        };
        let buf = write_artifact(&desc);

        let r = Reader::new(&buf, true).unwrap();
        assert!(r.shared());
        assert_eq!(r.flags(), OBJ_FLAG_SHARED | 0x8000_0000);
        assert_eq!(r.sym(0).flag(), 0xff);

        assert_eq!(materialize(&r), buf);
    }

    /// Accessors on a read-only reader return views into the input
    /// slice rather than copies.
    #[test]
    fn zero_copy_views() {
        let desc = ArtifactDesc {
            pkgs: vec!["runtime".to_string()],
            symdefs: vec![sym_foo()],
            ..Default::default()
        };
        let buf = write_artifact(&desc);
        let range = buf.as_ptr() as usize..buf.as_ptr() as usize + buf.len();

        let r = Reader::new(&buf, true).unwrap();

        let data = r.data(0);
        assert!(range.contains(&(data.as_ptr() as usize)));

        let relocs = r.relocs(0);
        assert!(relocs.is_empty());

        match r.pkg(0).unwrap() {
            Cow::Borrowed(s) => assert!(range.contains(&(s.as_ptr() as usize))),
            Cow::Owned(..) => panic!("read-only reader copied a string"),
        }

        // A writable-backed reader copies strings out instead.
        let r = Reader::new(&buf, false).unwrap();
        match r.pkg(0).unwrap() {
            Cow::Borrowed(..) => panic!("mutable-backed reader borrowed a string"),
            Cow::Owned(s) => assert_eq!(s, "runtime"),
        }
    }

    /// A zero length data range yields an empty view, distinguishable
    /// from a missing entry only by its size.
    #[test]
    fn empty_data_range() {
        let mut symdef = sym_foo();
        symdef.data = Vec::new();
        symdef.sym.siz = 0;
        let desc = ArtifactDesc {
            symdefs: vec![symdef],
            ..Default::default()
        };
        let buf = write_artifact(&desc);

        let r = Reader::new(&buf, true).unwrap();
        assert_eq!(r.data_size(0), 0);
        assert_eq!(r.data(0), &[] as &[u8]);
    }
}
