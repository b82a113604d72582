//! Low-level helpers shared by the document reader
pub mod color;
pub(crate) mod xml;
pub(crate) mod zip;
