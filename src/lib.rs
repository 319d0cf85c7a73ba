//! Compiler from a small imperative language to an accumulator machine.
//!
//! The pipeline is `parser` -> `optimizer` -> `codegen` -> `peephole`;
//! `machine` runs the result.

pub mod arith;
pub mod asm;
pub mod ast;
pub mod codegen;
pub mod config;
pub mod constants;
pub mod error;
pub mod machine;
pub mod optimizer;
pub mod parser;
pub mod peephole;
pub mod variables;

use tracing::{debug, info};

use crate::asm::Assembly;
use crate::ast::Program;
use crate::codegen::CodeGen;
pub use crate::config::{Options, Severity};
pub use crate::error::{CompileError, Result, Warning};

#[derive(Debug)]
pub struct Compilation {
    pub assembly: Assembly,
    pub warnings: Vec<Warning>,
}

impl Compilation {
    /// Program text, one instruction per line.
    pub fn render(&self, verbose: bool) -> String {
        self.assembly.render(verbose)
    }
}

pub fn compile_program(mut program: Program, options: &Options) -> Result<Compilation> {
    if options.optimize {
        optimizer::optimize(&mut program, options);
    }
    let mut warnings = optimizer::infinite_loops(&program.commands);

    let (mut assembly, generated) = CodeGen::new(options).generate(&program)?;
    warnings.extend(generated);
    if options.optimize {
        let removed = peephole::optimize(&mut assembly)?;
        debug!(removed, "store/load pairs removed");
    }
    assembly.seal();
    info!(
        instructions = assembly.len(),
        warnings = warnings.len(),
        "compiled"
    );
    Ok(Compilation { assembly, warnings })
}

pub fn compile_source(src: &str, options: &Options) -> Result<Compilation> {
    let program = parser::parse_program(src)?;
    compile_program(program, options)
}
