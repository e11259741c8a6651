//! The synthesis engine collaborators Vesper drives.
//!
//! [`Engine`] bundles the named interfaces the incremental driver needs:
//! a source reader for a netlist-Verilog subset, the `hierarchy`
//! elaboration pass, the `proc`/`opt`/`techmap` transform pipeline, and
//! the module codec used by the cache. The driver treats every one of
//! them as an opaque, fallible operation.

#![warn(missing_docs)]

pub mod elaborate;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod transform;

pub use elaborate::TOP_SCRATCHPAD_KEY;
pub use error::EngineError;

use std::collections::BTreeSet;
use std::path::Path;
use vesper_ir::{CodecError, Design, Module, ModuleCodec};

/// The bundled synthesis engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct Engine;

impl Engine {
    /// Creates an engine instance.
    pub fn new() -> Self {
        Self
    }

    /// Reads a source file into the design, replacing same-named modules.
    /// Returns the names of the modules read.
    pub fn read_source(
        &self,
        design: &mut Design,
        path: &Path,
    ) -> Result<Vec<String>, EngineError> {
        let source = std::fs::read_to_string(path).map_err(|err| EngineError::Io {
            path: path.to_path_buf(),
            source: err,
        })?;
        self.read_source_str(design, &source, &path.display().to_string())
    }

    /// Reads in-memory source text into the design. `file` labels parse
    /// diagnostics.
    pub fn read_source_str(
        &self,
        design: &mut Design,
        source: &str,
        file: &str,
    ) -> Result<Vec<String>, EngineError> {
        let modules = parser::parse_source(source, file)?;
        let mut names = Vec::with_capacity(modules.len());
        for module in modules {
            names.push(module.name().to_string());
            design.add_module(module);
        }
        log::debug!("read {} module(s) from {file}", names.len());
        Ok(names)
    }

    /// Runs hierarchy elaboration. Returns the resolved top module.
    pub fn elaborate(&self, design: &mut Design, top: Option<&str>) -> Result<String, EngineError> {
        elaborate::hierarchy(design, top)
    }

    /// Runs the transform pipeline (`proc`, `opt -full`, `techmap`,
    /// `opt -full`) scoped to the selected modules.
    pub fn run_pipeline(
        &self,
        design: &mut Design,
        selection: &BTreeSet<String>,
    ) -> Result<(), EngineError> {
        transform::run_pipeline(design, selection)
    }
}

impl ModuleCodec for Engine {
    /// Encodes one module with bincode. The output is opaque to the cache.
    fn serialize_module(&self, module: &Module) -> Result<Vec<u8>, CodecError> {
        bincode::serde::encode_to_vec(module, bincode::config::standard()).map_err(|err| {
            CodecError::Encode {
                reason: err.to_string(),
            }
        })
    }

    /// Decodes module bytes in memory and inserts the module into the
    /// design. No temporary state outlives the call on any path.
    fn load_module(&self, data: &[u8], design: &mut Design) -> Result<String, CodecError> {
        let (module, _): (Module, usize) =
            bincode::serde::decode_from_slice(data, bincode::config::standard()).map_err(
                |err| CodecError::Decode {
                    reason: err.to_string(),
                },
            )?;
        if module.name().is_empty() {
            return Err(CodecError::EmptyName);
        }
        let name = module.name().to_string();
        design.add_module(module);
        Ok(name)
    }
}
