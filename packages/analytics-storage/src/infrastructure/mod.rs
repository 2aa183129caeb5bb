//! Infrastructure layer - Storage adapters
//!
//! - `memory`: in-process store
//! - `json_dir`: directory of JSON collection files

pub mod memory;

#[cfg(feature = "json-dir")]
pub mod json_dir;

pub use memory::MemoryStore;

#[cfg(feature = "json-dir")]
pub use json_dir::JsonDirStore;
