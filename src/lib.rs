//! Control flow and dataflow analysis of JVM method bytecode
//!
//! Method bodies are described with [`jvm::code`], resolved into control flow graphs (including
//! `jsr`/`ret` subroutines), and then analyzed with the engines in [`jvm::analysis`].

pub mod jvm;
pub mod util;
