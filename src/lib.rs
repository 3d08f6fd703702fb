pub mod chain;
pub mod classfile;
pub mod config;
pub mod context;
pub mod coverage;
pub mod device;
pub mod discovery;
pub mod error;
pub mod insn;
pub mod materializer;
pub mod mutants;
pub mod mutators;
pub mod output;
pub mod protocol;
pub mod runner;
pub mod safety;
pub mod state;

pub use error::{Error, Result};
