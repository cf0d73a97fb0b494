//! Static discovery of a module's transitive dependency closure.

pub mod reader;
pub mod walker;

pub use reader::{ModuleReader, ModuleRef, WasmModuleReader};
pub use walker::ReferenceWalker;
