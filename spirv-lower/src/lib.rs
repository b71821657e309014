pub mod access_chain;
pub mod ast;
pub mod builtin_registry;
pub mod constructor;
pub mod decorations;
pub mod diags;
pub mod error;
pub mod layout;
pub mod lowering;
pub mod options;
pub mod postprocess;
pub mod visitor;

#[cfg(test)]
mod lowering_tests;

#[cfg(test)]
mod control_flow_tests;

pub use diags::{Diagnostic, DiagnosticKind, Diagnostics};
pub use error::{CompilerError, Result};
pub use lowering::{lower, LowerOutput};
pub use options::LowerOptions;
