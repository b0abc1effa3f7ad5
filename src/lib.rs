#![doc = include_str!("../README.md")]
#![allow(clippy::let_and_return, clippy::let_unit_value)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, rust_2018_idioms)]

mod error;
mod log;
pub mod mmap;
mod reader;
mod types;
mod util;
mod writer;

pub use error::Error;
pub use error::ErrorExt;
pub use error::ErrorKind;
pub use error::IntoError;
pub use error::Result;
pub use mmap::Mmap;
pub use reader::Reader;
pub use types::*;
pub use writer::Writer;
