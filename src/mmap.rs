//! Memory mapping of object files.

use std::fs::File;
use std::io;
use std::ops::Deref;
use std::ops::Range;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr::null_mut;
use std::rc::Rc;
use std::slice;

use crate::Error;
use crate::ErrorExt as _;
use crate::Result;


/// A builder for a customizable [`Mmap`].
#[derive(Debug)]
pub struct Builder {
    /// The protection flags to use.
    protection: libc::c_int,
}

impl Builder {
    fn new() -> Self {
        Self {
            protection: libc::PROT_READ,
        }
    }

    /// Configure the mapping to be writable.
    ///
    /// The mapping is private, so writes change only this process' view
    /// of the data and never the underlying file. Consumers use this
    /// mode to patch relocation records in place.
    pub fn writable(mut self) -> Self {
        self.protection |= libc::PROT_WRITE;
        self
    }

    /// Memory map the file at the provided `path`.
    pub fn open<P>(self, path: P) -> Result<Mmap>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path)?;
        self.map(&file)
    }

    /// Map the provided file into memory, in its entirety.
    pub fn map(self, file: &File) -> Result<Mmap> {
        let len = libc::size_t::try_from(file.metadata()?.len())
            .map_err(Error::with_invalid_data)
            .context("file is too large to mmap")?;

        // The kernel does not allow mmap'ing a region of size 0. We
        // want to enable this case transparently, though.
        let mmap = if len == 0 {
            let mapping = Mapping {
                ptr: null_mut(),
                len: 0,
                writable: false,
            };
            Mmap {
                mapping: Rc::new(mapping),
                view: 0..1,
            }
        } else {
            let offset = 0;

            // SAFETY: `mmap` with the provided arguments is always safe to call.
            let ptr = unsafe {
                libc::mmap(
                    null_mut(),
                    len,
                    self.protection,
                    libc::MAP_PRIVATE,
                    file.as_raw_fd(),
                    offset,
                )
            };

            if ptr == libc::MAP_FAILED {
                return Err(Error::from(io::Error::last_os_error()))
            }

            let mapping = Mapping {
                ptr,
                len,
                writable: self.protection & libc::PROT_WRITE != 0,
            };
            Mmap {
                mapping: Rc::new(mapping),
                view: 0..len as u64,
            }
        };
        Ok(mmap)
    }
}


#[derive(Debug)]
struct Mapping {
    ptr: *mut libc::c_void,
    len: usize,
    writable: bool,
}

impl Mapping {
    fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.ptr.is_null() {
            &mut []
        } else {
            // SAFETY: We know that the pointer is valid and represents a
            //         region of `len` bytes, borrowed exclusively through
            //         `self`.
            unsafe { slice::from_raw_parts_mut(self.ptr.cast(), self.len) }
        }
    }
}

impl Deref for Mapping {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        if self.ptr.is_null() {
            &[]
        } else {
            // SAFETY: We know that the pointer is valid and represents a region of
            //         `len` bytes.
            unsafe { slice::from_raw_parts(self.ptr.cast(), self.len) }
        }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: The `ptr` is valid.
            let rc = unsafe { libc::munmap(self.ptr, self.len) };
            #[rustfmt::skip]
            assert!(rc == 0, "unable to unmap mmap: {}", io::Error::last_os_error());
        }
    }
}


/// An owned handle on a memory mapped file, usable as a byte slice.
#[derive(Clone, Debug)]
pub struct Mmap {
    /// The actual memory mapping.
    mapping: Rc<Mapping>,
    /// The view on the memory mapping that this object represents.
    view: Range<u64>,
}

impl Mmap {
    /// Create [`Builder`] for creating a customizable memory mapping.
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Map the provided file into memory, in its entirety.
    pub fn map(file: &File) -> Result<Self> {
        Self::builder().map(file)
    }

    /// Create a new `Mmap` object (sharing the same underlying memory mapping
    /// as the current one) that restricts its view to the provided `range`.
    /// Adjustment happens relative to the current view.
    pub fn constrain(&self, range: Range<u64>) -> Option<Self> {
        if self.view.start + range.end > self.view.end {
            return None
        }

        let mut mmap = self.clone();
        mmap.view.end = mmap.view.start + range.end;
        mmap.view.start += range.start;
        Some(mmap)
    }

    /// Retrieve a mutable view of the mapped bytes.
    ///
    /// Succeeds only on a [`writable`][Builder::writable] mapping with no
    /// other handles sharing it.
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        if !self.mapping.writable {
            return None
        }

        let Range { start, end } = self.view.clone();
        let mapping = Rc::get_mut(&mut self.mapping)?;
        mapping.as_mut_slice().get_mut(start as usize..end as usize)
    }
}

impl Deref for Mmap {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.mapping
            .deref()
            .get(self.view.start as usize..self.view.end as usize)
            .unwrap_or(&[])
    }
}
