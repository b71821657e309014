use crate::ast::SpirvVersion;

/// Generator magic written into the module header (tool id in the upper
/// 16 bits, tool version in the lower).
pub const DEFAULT_GENERATOR: u32 = 0x0008_000b;

/// Knobs for a lowering run. The target environment itself comes from the
/// translation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowerOptions {
    /// Emit `OpName`/`OpMemberName` for variables, functions and structs.
    pub debug_names: bool,
    /// Emit `OpSource` with the source language and version.
    pub emit_source: bool,
    pub generator: u32,
    /// Override the SPIR-V version requested by the unit.
    pub spirv_version: Option<SpirvVersion>,
    /// Lower functions not reachable from the entry point.
    pub emit_uncalled_functions: bool,
}

impl Default for LowerOptions {
    fn default() -> Self {
        LowerOptions {
            debug_names: true,
            emit_source: true,
            generator: DEFAULT_GENERATOR,
            spirv_version: None,
            emit_uncalled_functions: false,
        }
    }
}

impl LowerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debug_names(mut self, enabled: bool) -> Self {
        self.debug_names = enabled;
        self
    }

    pub fn emit_source(mut self, enabled: bool) -> Self {
        self.emit_source = enabled;
        self
    }

    pub fn generator(mut self, magic: u32) -> Self {
        self.generator = magic;
        self
    }

    pub fn spirv_version(mut self, version: SpirvVersion) -> Self {
        self.spirv_version = Some(version);
        self
    }

    pub fn emit_uncalled_functions(mut self, enabled: bool) -> Self {
        self.emit_uncalled_functions = enabled;
        self
    }
}
