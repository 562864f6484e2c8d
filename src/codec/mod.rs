//! Fixed-width integer codec
//!
//! Two layers: [`bitpack`] packs one integer array at a caller-chosen width,
//! and [`blob`] bundles several such arrays into one versioned, optionally
//! checksummed byte string.

pub mod bitpack;
pub mod blob;

pub use bitpack::{bits_required, decode, encode};
pub use blob::{build, parse, BitSection, SectionSpec, SectionedBlob};
