pub mod assembler;

pub use assembler::ContextAssembler;
