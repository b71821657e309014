//! Tree visitor for the typed shading-language tree
//!
//! Read-only analyses over `Node` trees implement `Visitor` and override only
//! the hooks they care about; the walk_* functions do the actual traversal.
//! The analyses the lowering needs (side effects, triviality, call graph,
//! static symbol use) live at the bottom of this module.

use crate::ast::*;
use crate::builtin_registry;
use indexmap::IndexSet;
use std::ops::ControlFlow;

/// Visitor trait for traversing nodes
///
/// All methods have default implementations that delegate to walk_* functions.
/// The Break associated type lets a visitor stop early once it has its answer.
pub trait Visitor: Sized {
    type Break;

    fn visit_function(&mut self, f: &FunctionDef) -> ControlFlow<Self::Break> {
        walk_function(self, f)
    }

    fn visit_node(&mut self, n: &Node) -> ControlFlow<Self::Break> {
        walk_node(self, n)
    }

    fn visit_symbol(&mut self, _id: SymbolId, _n: &Node) -> ControlFlow<Self::Break> {
        ControlFlow::Continue(())
    }

    fn visit_constant(&mut self, _c: &ConstantValue) -> ControlFlow<Self::Break> {
        ControlFlow::Continue(())
    }

    fn visit_binary(&mut self, _op: BinaryOp, left: &Node, right: &Node) -> ControlFlow<Self::Break> {
        walk_binary(self, left, right)
    }

    fn visit_unary(&mut self, _op: UnaryOp, operand: &Node) -> ControlFlow<Self::Break> {
        self.visit_node(operand)
    }

    fn visit_call(&mut self, _function: FunctionId, args: &[Node]) -> ControlFlow<Self::Break> {
        walk_nodes(self, args)
    }

    fn visit_builtin(&mut self, _op: BuiltinOp, args: &[Node]) -> ControlFlow<Self::Break> {
        walk_nodes(self, args)
    }

    fn visit_branch(&mut self, _kind: BranchKind, value: Option<&Node>) -> ControlFlow<Self::Break> {
        match value {
            Some(v) => self.visit_node(v),
            None => ControlFlow::Continue(()),
        }
    }

    fn visit_declare(&mut self, _symbol: SymbolId, init: Option<&Node>) -> ControlFlow<Self::Break> {
        match init {
            Some(v) => self.visit_node(v),
            None => ControlFlow::Continue(()),
        }
    }
}

pub fn walk_function<V: Visitor>(v: &mut V, f: &FunctionDef) -> ControlFlow<V::Break> {
    walk_nodes(v, &f.body)
}

pub fn walk_nodes<V: Visitor>(v: &mut V, nodes: &[Node]) -> ControlFlow<V::Break> {
    for n in nodes {
        v.visit_node(n)?;
    }
    ControlFlow::Continue(())
}

pub fn walk_binary<V: Visitor>(v: &mut V, left: &Node, right: &Node) -> ControlFlow<V::Break> {
    v.visit_node(left)?;
    v.visit_node(right)
}

fn walk_opt<V: Visitor>(v: &mut V, n: Option<&Node>) -> ControlFlow<V::Break> {
    match n {
        Some(n) => v.visit_node(n),
        None => ControlFlow::Continue(()),
    }
}

pub fn walk_node<V: Visitor>(v: &mut V, n: &Node) -> ControlFlow<V::Break> {
    match &n.kind {
        NodeKind::Symbol(id) => v.visit_symbol(*id, n),
        NodeKind::Constant(c) => v.visit_constant(c),
        NodeKind::Binary { op, left, right } => v.visit_binary(*op, left, right),
        NodeKind::Unary { op, operand } => v.visit_unary(*op, operand),
        NodeKind::Swizzle { base, .. } => v.visit_node(base),
        NodeKind::Sequence(nodes) | NodeKind::Construct(nodes) => walk_nodes(v, nodes),
        NodeKind::Call { function, args } => v.visit_call(*function, args),
        NodeKind::Builtin { op, args } => v.visit_builtin(*op, args),
        NodeKind::Selection {
            condition,
            then_branch,
            else_branch,
            ..
        } => {
            v.visit_node(condition)?;
            walk_opt(v, then_branch.as_deref())?;
            walk_opt(v, else_branch.as_deref())
        }
        NodeKind::Switch { selector, body, .. } => {
            v.visit_node(selector)?;
            walk_nodes(v, body)
        }
        NodeKind::Loop {
            test, body, terminal, ..
        } => {
            walk_opt(v, test.as_deref())?;
            walk_opt(v, body.as_deref())?;
            walk_opt(v, terminal.as_deref())
        }
        NodeKind::Branch { kind, value } => v.visit_branch(*kind, value.as_deref()),
        NodeKind::Declare { symbol, init } => v.visit_declare(*symbol, init.as_deref()),
    }
}

// =============================================================================
// Analyses
// =============================================================================

/// Stops at the first node whose evaluation is observable beyond its value.
struct SideEffectFinder;

impl Visitor for SideEffectFinder {
    type Break = ();

    fn visit_binary(&mut self, op: BinaryOp, left: &Node, right: &Node) -> ControlFlow<()> {
        if op.is_assignment() {
            return ControlFlow::Break(());
        }
        walk_binary(self, left, right)
    }

    fn visit_unary(&mut self, op: UnaryOp, operand: &Node) -> ControlFlow<()> {
        if op.writes_operand() {
            return ControlFlow::Break(());
        }
        self.visit_node(operand)
    }

    fn visit_call(&mut self, _function: FunctionId, _args: &[Node]) -> ControlFlow<()> {
        ControlFlow::Break(())
    }

    fn visit_builtin(&mut self, op: BuiltinOp, args: &[Node]) -> ControlFlow<()> {
        if builtin_registry::has_side_effects(op) {
            return ControlFlow::Break(());
        }
        walk_nodes(self, args)
    }

    fn visit_branch(&mut self, _kind: BranchKind, _value: Option<&Node>) -> ControlFlow<()> {
        ControlFlow::Break(())
    }

    fn visit_declare(&mut self, _symbol: SymbolId, _init: Option<&Node>) -> ControlFlow<()> {
        ControlFlow::Break(())
    }
}

pub fn has_side_effects(node: &Node) -> bool {
    SideEffectFinder.visit_node(node).is_break()
}

/// Cheap enough to evaluate unconditionally: constants, variable reads,
/// constant selections out of those, and one level of simple arithmetic
/// or comparison on such leaves.
pub fn is_trivial(node: &Node) -> bool {
    is_trivial_at(node, 0)
}

fn is_trivial_leaf(node: &Node) -> bool {
    match &node.kind {
        NodeKind::Constant(_) => true,
        NodeKind::Symbol(_) => !node.ty.is_opaque(),
        NodeKind::Swizzle { base, .. } => is_trivial_leaf(base),
        NodeKind::Binary {
            op: BinaryOp::IndexDirect | BinaryOp::IndexStruct,
            left,
            ..
        } => is_trivial_leaf(left),
        _ => false,
    }
}

fn is_trivial_at(node: &Node, depth: u32) -> bool {
    if is_trivial_leaf(node) {
        return true;
    }
    if depth > 0 || node.ty.is_array() || node.ty.is_struct() {
        return false;
    }
    match &node.kind {
        NodeKind::Unary {
            op: UnaryOp::Negate | UnaryOp::LogicalNot | UnaryOp::BitwiseNot,
            operand,
        } => is_trivial_leaf(operand),
        NodeKind::Binary { op, left, right } => {
            use BinaryOp::*;
            matches!(
                op,
                Add | Sub
                    | Mul
                    | BitAnd
                    | BitOr
                    | BitXor
                    | Equal
                    | NotEqual
                    | Less
                    | Greater
                    | LessEqual
                    | GreaterEqual
                    | LogicalXor
            ) && is_trivial_leaf(left)
                && is_trivial_leaf(right)
        }
        _ => false,
    }
}

/// Collects callees in discovery order.
struct CallCollector<'a> {
    unit: &'a TranslationUnit,
    found: IndexSet<FunctionId>,
}

impl Visitor for CallCollector<'_> {
    type Break = std::convert::Infallible;

    fn visit_call(&mut self, function: FunctionId, args: &[Node]) -> ControlFlow<Self::Break> {
        walk_nodes(self, args)?;
        if self.found.insert(function) {
            if let Some(def) = self.unit.function(function) {
                self.visit_function(def)?;
            }
        }
        ControlFlow::Continue(())
    }
}

/// Functions reachable from the entry point and the global initializers,
/// entry first.
pub fn reachable_functions(unit: &TranslationUnit) -> IndexSet<FunctionId> {
    let mut collector = CallCollector {
        unit,
        found: IndexSet::new(),
    };
    collector.found.insert(unit.entry_function);
    let _ = walk_nodes(&mut collector, &unit.global_initializers);
    if let Some(entry) = unit.function(unit.entry_function) {
        let _ = collector.visit_function(entry);
    }
    collector.found
}

struct SymbolCollector {
    found: IndexSet<SymbolId>,
}

impl Visitor for SymbolCollector {
    type Break = std::convert::Infallible;

    fn visit_symbol(&mut self, id: SymbolId, _n: &Node) -> ControlFlow<Self::Break> {
        self.found.insert(id);
        ControlFlow::Continue(())
    }

    fn visit_declare(&mut self, symbol: SymbolId, init: Option<&Node>) -> ControlFlow<Self::Break> {
        self.found.insert(symbol);
        walk_opt(self, init)
    }
}

/// Every symbol referenced by the given functions and the global initializers.
pub fn referenced_symbols<'a>(
    unit: &TranslationUnit,
    functions: impl IntoIterator<Item = &'a FunctionId>,
) -> IndexSet<SymbolId> {
    let mut collector = SymbolCollector { found: IndexSet::new() };
    let _ = walk_nodes(&mut collector, &unit.global_initializers);
    for id in functions {
        if let Some(def) = unit.function(*id) {
            let _ = collector.visit_function(def);
        }
    }
    collector.found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;

    #[test]
    fn test_side_effects() {
        let mut b = UnitBuilder::new(Stage::Fragment);
        let x = b.local("x", Type::float(32));
        let read = b.var(x);
        assert!(!has_side_effects(&read));
        assert!(has_side_effects(&assign(b.var(x), float(1.0))));
        let inc = unary(UnaryOp::PostIncrement, b.var(x), Type::float(32));
        assert!(has_side_effects(&binary(BinaryOp::Add, inc, float(1.0), Type::float(32))));
        let f = b.function("f", Type::float(32), vec![], vec![]);
        assert!(has_side_effects(&b.call(f, vec![])));
    }

    #[test]
    fn test_triviality() {
        let mut b = UnitBuilder::new(Stage::Fragment);
        let x = b.local("x", Type::int(32));
        let y = b.local("y", Type::int(32));
        assert!(is_trivial(&int(3)));
        assert!(is_trivial(&b.var(x)));
        let less = binary(BinaryOp::Less, b.var(x), b.var(y), Type::bool());
        assert!(is_trivial(&less));
        let nested = binary(
            BinaryOp::Less,
            binary(BinaryOp::Add, b.var(x), int(1), Type::int(32)),
            b.var(y),
            Type::bool(),
        );
        assert!(!is_trivial(&nested));
    }

    #[test]
    fn test_reachable_functions_in_discovery_order() {
        let mut b = UnitBuilder::new(Stage::Compute);
        let leaf = b.function("leaf", Type::void(), vec![], vec![]);
        let unused = b.function("unused", Type::void(), vec![], vec![]);
        let mid = b.declare_function("mid", Type::void(), vec![]);
        let call_leaf = b.call(leaf, vec![]);
        b.define_function(mid, vec![call_leaf]);
        let call_mid = b.call(mid, vec![]);
        let main = b.entry(vec![call_mid]);
        let unit = b.finish();

        let reachable: Vec<FunctionId> = reachable_functions(&unit).into_iter().collect();
        assert_eq!(reachable, vec![main, mid, leaf]);
        assert!(!reachable.contains(&unused));
    }

    #[test]
    fn test_referenced_symbols() {
        let mut b = UnitBuilder::new(Stage::Fragment);
        let used = b.global("used", Type::float(32).with_storage(StorageQualifier::VaryingOut));
        let _unused = b.global("unused", Type::float(32).with_storage(StorageQualifier::VaryingOut));
        let body = vec![assign(b.var(used), float(1.0))];
        let main = b.entry(body);
        let unit = b.finish();
        let syms = referenced_symbols(&unit, [main].iter());
        assert!(syms.contains(&used));
        assert_eq!(syms.len(), 1);
    }
}
