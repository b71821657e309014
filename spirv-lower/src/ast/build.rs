//! Helpers for assembling translation units by hand.
//!
//! Front ends normally produce the tree directly; these helpers exist for
//! tools and tests that need small, well-formed units without a parser.

use super::*;

pub struct UnitBuilder {
    unit: TranslationUnit,
}

impl UnitBuilder {
    pub fn new(stage: Stage) -> Self {
        UnitBuilder {
            unit: TranslationUnit {
                stage,
                language: SourceLanguage::Glsl,
                language_version: 450,
                target: TargetEnv::default(),
                entry_point: "main".to_string(),
                structs: Vec::new(),
                symbols: Vec::new(),
                functions: Vec::new(),
                entry_function: FunctionId(0),
                global_initializers: Vec::new(),
                linker_objects: Vec::new(),
                extensions: Vec::new(),
                layout: ExecutionLayout::default(),
            },
        }
    }

    pub fn target(&mut self, target: TargetEnv) -> &mut Self {
        self.unit.target = target;
        self
    }

    pub fn spirv_version(&mut self, version: SpirvVersion) -> &mut Self {
        self.unit.target.spirv_version = version;
        self
    }

    pub fn enable_extension(&mut self, name: &str) -> &mut Self {
        self.unit.extensions.push(name.to_string());
        self
    }

    pub fn layout_mut(&mut self) -> &mut ExecutionLayout {
        &mut self.unit.layout
    }

    pub fn add_struct(&mut self, name: &str, members: Vec<StructMember>) -> StructId {
        self.add_block(name, members, Qualifier::default())
    }

    pub fn add_block(&mut self, name: &str, members: Vec<StructMember>, qualifier: Qualifier) -> StructId {
        let id = StructId(self.unit.structs.len() as u32);
        self.unit.structs.push(StructDef {
            name: name.to_string(),
            members,
            qualifier,
        });
        id
    }

    /// Fill in the members of a struct declared earlier, for
    /// self-referential blocks.
    pub fn set_members(&mut self, id: StructId, members: Vec<StructMember>) {
        if let Some(def) = self.unit.structs.get_mut(id.0 as usize) {
            def.members = members;
        }
    }

    /// Declare a local or parameter symbol.
    pub fn local(&mut self, name: &str, ty: Type) -> SymbolId {
        let id = SymbolId(self.unit.symbols.len() as u32);
        self.unit.symbols.push(SymbolDecl {
            name: name.to_string(),
            ty,
            value: None,
        });
        id
    }

    /// Declare a module-scope variable and list it as a linker object.
    pub fn global(&mut self, name: &str, ty: Type) -> SymbolId {
        let id = self.local(name, ty);
        self.unit.linker_objects.push(id);
        id
    }

    pub fn spec_constant(&mut self, name: &str, mut ty: Type, value: ConstantValue, spec_id: u32) -> SymbolId {
        ty.qualifier.storage = StorageQualifier::Const;
        ty.qualifier.spec_constant = true;
        ty.qualifier.layout.spec_id = Some(spec_id);
        let id = self.local(name, ty);
        self.unit.symbols[id.0 as usize].value = Some(value);
        id
    }

    pub fn global_init(&mut self, node: Node) -> &mut Self {
        self.unit.global_initializers.push(node);
        self
    }

    /// Reserve a function so it can be called before its body exists.
    pub fn declare_function(&mut self, name: &str, return_type: Type, params: Vec<SymbolId>) -> FunctionId {
        let id = FunctionId(self.unit.functions.len() as u32);
        self.unit.functions.push(FunctionDef {
            name: name.to_string(),
            return_type,
            params,
            body: Vec::new(),
        });
        id
    }

    pub fn define_function(&mut self, id: FunctionId, body: Vec<Node>) {
        if let Some(def) = self.unit.functions.get_mut(id.0 as usize) {
            def.body = body;
        }
    }

    pub fn function(&mut self, name: &str, return_type: Type, params: Vec<SymbolId>, body: Vec<Node>) -> FunctionId {
        let id = self.declare_function(name, return_type, params);
        self.define_function(id, body);
        id
    }

    /// Define `void main()` and make it the entry point.
    pub fn entry(&mut self, body: Vec<Node>) -> FunctionId {
        let id = self.function("main", Type::void(), Vec::new(), body);
        self.unit.entry_function = id;
        id
    }

    /// Symbol reference carrying the declared type.
    pub fn var(&self, id: SymbolId) -> Node {
        let ty = self
            .unit
            .symbol(id)
            .map(|s| s.ty.clone())
            .unwrap_or_else(Type::void);
        Node::new(NodeKind::Symbol(id), ty)
    }

    pub fn call(&self, function: FunctionId, args: Vec<Node>) -> Node {
        let ty = self
            .unit
            .function(function)
            .map(|f| f.return_type.clone())
            .unwrap_or_else(Type::void);
        Node::new(NodeKind::Call { function, args }, ty)
    }

    /// Member access by source index on a struct or block value.
    pub fn member(&self, base: Node, index: u32) -> Node {
        let ty = base
            .ty
            .struct_id()
            .or(match base.ty.basic {
                BasicType::Reference(id) => Some(id),
                _ => None,
            })
            .and_then(|id| self.unit.struct_def(id))
            .and_then(|def| def.members.get(index as usize))
            .map(|m| m.ty.clone())
            .unwrap_or_else(Type::void);
        binary(BinaryOp::IndexStruct, base, int(index as i64), ty)
    }

    pub fn finish(self) -> TranslationUnit {
        self.unit
    }
}

pub fn int(value: i64) -> Node {
    Node::new(NodeKind::Constant(ConstantValue::Int(value)), Type::int(32).with_storage(StorageQualifier::Const))
}

pub fn uint(value: u64) -> Node {
    Node::new(NodeKind::Constant(ConstantValue::Uint(value)), Type::uint(32).with_storage(StorageQualifier::Const))
}

pub fn float(value: f64) -> Node {
    Node::new(NodeKind::Constant(ConstantValue::Float(value)), Type::float(32).with_storage(StorageQualifier::Const))
}

pub fn boolean(value: bool) -> Node {
    Node::new(NodeKind::Constant(ConstantValue::Bool(value)), Type::bool().with_storage(StorageQualifier::Const))
}

pub fn constant(value: ConstantValue, ty: Type) -> Node {
    Node::new(NodeKind::Constant(value), ty.with_storage(StorageQualifier::Const))
}

pub fn binary(op: BinaryOp, left: Node, right: Node, ty: Type) -> Node {
    Node::new(
        NodeKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        ty,
    )
}

/// `left = right`; the node takes the type of the left side.
pub fn assign(left: Node, right: Node) -> Node {
    let ty = left.ty.clone();
    binary(BinaryOp::Assign, left, right, ty)
}

pub fn compound_assign(op: BinaryOp, left: Node, right: Node) -> Node {
    let ty = left.ty.clone();
    binary(op, left, right, ty)
}

pub fn index(base: Node, index: Node) -> Node {
    let ty = indexed_type(&base.ty);
    binary(BinaryOp::Index, base, index, ty)
}

pub fn index_const(base: Node, index: u32) -> Node {
    let ty = indexed_type(&base.ty);
    binary(BinaryOp::IndexDirect, base, int(index as i64), ty)
}

fn indexed_type(ty: &Type) -> Type {
    if ty.is_array() {
        ty.element_type()
    } else if ty.is_matrix() {
        ty.column_type()
    } else {
        ty.scalar_type()
    }
}

pub fn unary(op: UnaryOp, operand: Node, ty: Type) -> Node {
    Node::new(
        NodeKind::Unary {
            op,
            operand: Box::new(operand),
        },
        ty,
    )
}

pub fn swizzle(base: Node, components: Vec<u32>) -> Node {
    let ty = base.ty.scalar_type().vector(components.len() as u32);
    Node::new(
        NodeKind::Swizzle {
            base: Box::new(base),
            components,
        },
        ty,
    )
}

pub fn construct(ty: Type, args: Vec<Node>) -> Node {
    Node::new(NodeKind::Construct(args), ty)
}

pub fn builtin(op: BuiltinOp, args: Vec<Node>, ty: Type) -> Node {
    Node::new(NodeKind::Builtin { op, args }, ty)
}

pub fn seq(nodes: Vec<Node>) -> Node {
    Node::new(NodeKind::Sequence(nodes), Type::void())
}

pub fn if_then(condition: Node, then_branch: Node, else_branch: Option<Node>) -> Node {
    Node::new(
        NodeKind::Selection {
            condition: Box::new(condition),
            then_branch: Some(Box::new(then_branch)),
            else_branch: else_branch.map(Box::new),
            evaluate_both: false,
            hints: SelectionHints::default(),
        },
        Type::void(),
    )
}

pub fn ternary(condition: Node, then_value: Node, else_value: Node) -> Node {
    let ty = then_value.ty.clone();
    Node::new(
        NodeKind::Selection {
            condition: Box::new(condition),
            then_branch: Some(Box::new(then_value)),
            else_branch: Some(Box::new(else_value)),
            evaluate_both: false,
            hints: SelectionHints::default(),
        },
        ty,
    )
}

pub fn while_loop(test: Node, body: Node) -> Node {
    loop_node(Some(test), Some(body), None, true)
}

pub fn do_while(body: Node, test: Node) -> Node {
    loop_node(Some(test), Some(body), None, false)
}

pub fn for_loop(test: Option<Node>, terminal: Option<Node>, body: Node) -> Node {
    loop_node(test, Some(body), terminal, true)
}

fn loop_node(test: Option<Node>, body: Option<Node>, terminal: Option<Node>, test_first: bool) -> Node {
    Node::new(
        NodeKind::Loop {
            test: test.map(Box::new),
            body: body.map(Box::new),
            terminal: terminal.map(Box::new),
            test_first,
            hints: LoopHints::default(),
        },
        Type::void(),
    )
}

pub fn switch(selector: Node, body: Vec<Node>) -> Node {
    Node::new(
        NodeKind::Switch {
            selector: Box::new(selector),
            body,
            hints: SelectionHints::default(),
        },
        Type::void(),
    )
}

pub fn branch(kind: BranchKind) -> Node {
    Node::new(NodeKind::Branch { kind, value: None }, Type::void())
}

pub fn case(value: i64) -> Node {
    branch(BranchKind::Case(value))
}

pub fn default_label() -> Node {
    branch(BranchKind::Default)
}

pub fn ret(value: Option<Node>) -> Node {
    Node::new(
        NodeKind::Branch {
            kind: BranchKind::Return,
            value: value.map(Box::new),
        },
        Type::void(),
    )
}

pub fn declare(symbol: SymbolId, init: Option<Node>) -> Node {
    Node::new(
        NodeKind::Declare {
            symbol,
            init: init.map(Box::new),
        },
        Type::void(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_type_follows_struct_definition() {
        let mut b = UnitBuilder::new(Stage::Fragment);
        let s = b.add_struct(
            "S",
            vec![
                StructMember::new("a", Type::float(32)),
                StructMember::new("b", Type::int(32).vector(2)),
            ],
        );
        let v = b.local("v", Type::structure(s));
        let m = b.member(b.var(v), 1);
        assert!(m.ty.is_vector());
        assert!(m.ty.is_signed_int());
    }

    #[test]
    fn test_entry_sets_entry_function() {
        let mut b = UnitBuilder::new(Stage::Compute);
        b.function("helper", Type::void(), vec![], vec![]);
        let main = b.entry(vec![]);
        let unit = b.finish();
        assert_eq!(unit.entry_function, main);
        assert_eq!(unit.functions.len(), 2);
    }
}
