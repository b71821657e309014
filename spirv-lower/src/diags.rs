//! Diagnostics collected while lowering, plus compact formatters for the
//! source types and operators that appear in diagnostic messages.

use crate::ast::*;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A recognised construct the lowering cannot express yet. Lowering
    /// continues with a placeholder value.
    MissingFunctionality,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Option<Span>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DiagnosticKind::MissingFunctionality => "missing functionality",
            DiagnosticKind::Warning => "warning",
        };
        match self.span {
            Some(span) => write!(f, "{}:{}: {}: {}", span.line, span.column, kind, self.message),
            None => write!(f, "{}: {}", kind, self.message),
        }
    }
}

/// Append-only sink for recoverable problems found during lowering.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn missing_functionality(&mut self, message: impl Into<String>, span: Option<Span>) {
        let message = message.into();
        log::warn!("missing functionality: {}", message);
        self.entries.push(Diagnostic {
            kind: DiagnosticKind::MissingFunctionality,
            message,
            span,
        });
    }

    pub fn warning(&mut self, message: impl Into<String>, span: Option<Span>) {
        let message = message.into();
        log::warn!("{}", message);
        self.entries.push(Diagnostic {
            kind: DiagnosticKind::Warning,
            message,
            span,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn has_missing_functionality(&self) -> bool {
        self.entries.iter().any(|d| d.kind == DiagnosticKind::MissingFunctionality)
    }
}

/// Pretty-print a source type in shading-language spelling.
///
/// `Float(32)` with vector size 3 prints as `vec3`, an unsized array of
/// `uint` as `uint[]`, and so on.
pub fn format_type(ty: &Type, structs: &[StructDef]) -> String {
    let mut out = format_element(ty, structs);
    for dim in &ty.arrays {
        match dim {
            ArraySize::Sized(n) => out.push_str(&format!("[{}]", n)),
            ArraySize::Unsized => out.push_str("[]"),
            ArraySize::SpecConstant(sym) => out.push_str(&format!("[spec#{}]", sym.0)),
        }
    }
    out
}

fn format_element(ty: &Type, structs: &[StructDef]) -> String {
    let prefix = match ty.basic {
        BasicType::Bool => "b",
        BasicType::Int(32) => "i",
        BasicType::Uint(32) => "u",
        BasicType::Float(64) => "d",
        BasicType::Float(16) => "f16",
        BasicType::Int(bits) => return scalar_or_vector(&format!("int{}_t", bits), ty),
        BasicType::Uint(bits) => return scalar_or_vector(&format!("uint{}_t", bits), ty),
        _ => "",
    };
    if let Some((cols, rows)) = ty.matrix() {
        let base = if prefix.is_empty() { "" } else { prefix };
        return if cols == rows {
            format!("{}mat{}", base, cols)
        } else {
            format!("{}mat{}x{}", base, cols, rows)
        };
    }
    if ty.vector_size > 1 {
        return format!("{}vec{}", prefix, ty.vector_size);
    }
    match &ty.basic {
        BasicType::Void => "void".to_string(),
        BasicType::Bool => "bool".to_string(),
        BasicType::Int(_) => "int".to_string(),
        BasicType::Uint(_) => "uint".to_string(),
        BasicType::Float(16) => "float16_t".to_string(),
        BasicType::Float(64) => "double".to_string(),
        BasicType::Float(_) => "float".to_string(),
        BasicType::Sampler(desc) => format_sampler(desc),
        BasicType::Struct(id) | BasicType::Block(id) => struct_name(*id, structs),
        BasicType::Reference(id) => format!("ref {}", struct_name(*id, structs)),
        BasicType::AccelerationStructure => "accelerationStructureEXT".to_string(),
        BasicType::RayQuery => "rayQueryEXT".to_string(),
    }
}

fn scalar_or_vector(scalar: &str, ty: &Type) -> String {
    if ty.vector_size > 1 {
        format!("{}vec{}", scalar.trim_end_matches("_t"), ty.vector_size)
    } else {
        scalar.to_string()
    }
}

fn struct_name(id: StructId, structs: &[StructDef]) -> String {
    structs
        .get(id.0 as usize)
        .map(|s| s.name.clone())
        .unwrap_or_else(|| format!("struct#{}", id.0))
}

fn format_sampler(desc: &SamplerDesc) -> String {
    let dim = match desc.dim {
        SamplerDim::Dim1D => "1D",
        SamplerDim::Dim2D => "2D",
        SamplerDim::Dim3D => "3D",
        SamplerDim::Cube => "Cube",
        SamplerDim::Rect => "2DRect",
        SamplerDim::Buffer => "Buffer",
        SamplerDim::SubpassData => "",
    };
    let kind = match desc.kind {
        SamplerKind::Sampler => return "sampler".to_string(),
        SamplerKind::Texture => "texture",
        SamplerKind::Combined => "sampler",
        SamplerKind::Image => "image",
        SamplerKind::Subpass => "subpassInput",
    };
    let mut out = format!("{}{}", kind, dim);
    if desc.ms {
        out.push_str("MS");
    }
    if desc.arrayed {
        out.push_str("Array");
    }
    if desc.shadow {
        out.push_str("Shadow");
    }
    out
}

pub fn format_binary_op(op: BinaryOp) -> &'static str {
    use BinaryOp::*;
    match op {
        Add => "+",
        Sub => "-",
        Mul => "*",
        Div => "/",
        Mod => "%",
        ShiftLeft => "<<",
        ShiftRight => ">>",
        BitAnd => "&",
        BitOr => "|",
        BitXor => "^",
        Equal => "==",
        NotEqual => "!=",
        Less => "<",
        Greater => ">",
        LessEqual => "<=",
        GreaterEqual => ">=",
        LogicalAnd => "&&",
        LogicalOr => "||",
        LogicalXor => "^^",
        Assign => "=",
        AddAssign => "+=",
        SubAssign => "-=",
        MulAssign => "*=",
        DivAssign => "/=",
        ModAssign => "%=",
        ShiftLeftAssign => "<<=",
        ShiftRightAssign => ">>=",
        AndAssign => "&=",
        OrAssign => "|=",
        XorAssign => "^=",
        Index => "[]",
        IndexDirect => "[const]",
        IndexStruct => ".",
        VectorTimesScalar => "vec*scalar",
        MatrixTimesScalar => "mat*scalar",
        VectorTimesMatrix => "vec*mat",
        MatrixTimesVector => "mat*vec",
        MatrixTimesMatrix => "mat*mat",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_vector_and_array() {
        let mut ty = Type::float(32).vector(3);
        assert_eq!(format_type(&ty, &[]), "vec3");
        ty.arrays.push(ArraySize::Sized(4));
        assert_eq!(format_type(&ty, &[]), "vec3[4]");
        let uarr = Type::uint(32).array(ArraySize::Unsized);
        assert_eq!(format_type(&uarr, &[]), "uint[]");
    }

    #[test]
    fn test_format_matrix() {
        assert_eq!(format_type(&Type::float(32).matrix_of(4, 4), &[]), "mat4");
        assert_eq!(format_type(&Type::float(64).matrix_of(2, 3), &[]), "dmat2x3");
    }

    #[test]
    fn test_diagnostics_sink() {
        let mut diags = Diagnostics::new();
        assert!(diags.is_empty());
        diags.warning("unused", None);
        diags.missing_functionality("unsupported operator", Some(Span { line: 3, column: 7 }));
        assert_eq!(diags.len(), 2);
        assert!(diags.has_missing_functionality());
        let rendered: Vec<String> = diags.iter().map(|d| d.to_string()).collect();
        assert_eq!(rendered[1], "3:7: missing functionality: unsupported operator");
    }
}
