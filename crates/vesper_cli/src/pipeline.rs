//! Shared helpers for commands that read a design from source files.

use std::error::Error;
use std::path::PathBuf;

use vesper_engine::Engine;
use vesper_ir::Design;

/// Reads every file into a fresh design.
pub fn read_design(engine: &Engine, files: &[PathBuf]) -> Result<Design, Box<dyn Error>> {
    let mut design = Design::new();
    for file in files {
        engine.read_source(&mut design, file)?;
    }
    Ok(design)
}
