use crate::ast::Span;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("Internal lowering error: {0}")]
    Internal(String, Option<Span>),

    #[error("SPIR-V generation error: {0}")]
    SpirvError(String, Option<Span>),

    #[error("Unsupported for target: {0}")]
    Unsupported(String, Option<Span>),

    #[error("SPIR-V builder error: {0}")]
    SpirvBuilderError(#[from] rspirv::dr::Error),
}

impl CompilerError {
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Internal(_, span) => *span,
            Self::SpirvError(_, span) => *span,
            Self::Unsupported(_, span) => *span,
            Self::SpirvBuilderError(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CompilerError>;

// Bail macros without span

#[macro_export]
macro_rules! bail_internal {
    ($($arg:tt)*) => {
        return Err($crate::error::CompilerError::Internal(format!($($arg)*), None))
    };
}

#[macro_export]
macro_rules! bail_spirv {
    ($($arg:tt)*) => {
        return Err($crate::error::CompilerError::SpirvError(format!($($arg)*), None))
    };
}

#[macro_export]
macro_rules! bail_unsupported {
    ($($arg:tt)*) => {
        return Err($crate::error::CompilerError::Unsupported(format!($($arg)*), None))
    };
}

// Bail macros with span

#[macro_export]
macro_rules! bail_internal_at {
    ($span:expr, $($arg:tt)*) => {
        return Err($crate::error::CompilerError::Internal(format!($($arg)*), Some($span)))
    };
}

#[macro_export]
macro_rules! bail_spirv_at {
    ($span:expr, $($arg:tt)*) => {
        return Err($crate::error::CompilerError::SpirvError(format!($($arg)*), Some($span)))
    };
}
