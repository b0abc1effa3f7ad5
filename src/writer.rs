//! Serialization of object files.

use std::collections::HashMap;
use std::io::Write;

use crate::Result;


/// A single pass object file serializer.
///
/// The writer appends little-endian primitives to a byte sink while
/// tracking the running offset, and interns strings so that every
/// distinct string lands in the pool exactly once. It imposes no block
/// ordering of its own; producers emit blocks in file order and record
/// [`offset`][Writer::offset] at each boundary to populate the
/// [`Header`][crate::Header] they stamp over the reserved space last.
///
/// Every string referenced anywhere in the artifact has to be added via
/// [`add_string`][Writer::add_string] before the first
/// [`string_ref`][Writer::string_ref] naming it.
#[derive(Debug)]
pub struct Writer<W> {
    /// The sink receiving the serialized bytes.
    sink: W,
    /// Interned strings, keyed by content, mapped to their absolute
    /// offset in the artifact.
    string_map: HashMap<String, u32>,
    /// The running offset, equal to the count of bytes written so far.
    off: u32,
}

impl<W> Writer<W>
where
    W: Write,
{
    /// Create a new `Writer` serializing into `sink`.
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            string_map: HashMap::new(),
            off: 0,
        }
    }

    /// Destruct the writer, returning the underlying sink.
    pub fn into_inner(self) -> W {
        self.sink
    }

    /// Intern `s`, appending its bytes to the pool unless it is present
    /// already.
    pub fn add_string(&mut self, s: &str) -> Result<()> {
        if self.string_map.contains_key(s) {
            return Ok(())
        }
        let _prev = self.string_map.insert(s.to_string(), self.off);
        self.raw_string(s)
    }

    /// Write an inline reference to the previously added string `s`.
    ///
    /// # Panics
    /// Referencing a string that was never added is a bug in the
    /// producer and panics.
    pub fn string_ref(&mut self, s: &str) -> Result<()> {
        let off = match self.string_map.get(s) {
            Some(off) => *off,
            None => panic!("string_ref: string not added: {s:?}"),
        };
        self.u32(s.len() as u32)?;
        self.u32(off)
    }

    /// Append the bytes of `s` verbatim.
    pub fn raw_string(&mut self, s: &str) -> Result<()> {
        self.bytes(s.as_bytes())
    }

    /// Append `b` verbatim.
    pub fn bytes(&mut self, b: &[u8]) -> Result<()> {
        let () = self.sink.write_all(b)?;
        self.off += b.len() as u32;
        Ok(())
    }

    /// Append a little-endian `u64`.
    pub fn u64(&mut self, x: u64) -> Result<()> {
        self.bytes(&x.to_le_bytes())
    }

    /// Append a little-endian `u32`.
    pub fn u32(&mut self, x: u32) -> Result<()> {
        self.bytes(&x.to_le_bytes())
    }

    /// Append a little-endian `u16`.
    pub fn u16(&mut self, x: u16) -> Result<()> {
        self.bytes(&x.to_le_bytes())
    }

    /// Append a single byte.
    pub fn u8(&mut self, x: u8) -> Result<()> {
        self.bytes(&[x])
    }

    /// The current byte position.
    #[inline]
    pub fn offset(&self) -> u32 {
        self.off
    }
}
