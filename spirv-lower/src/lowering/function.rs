//! Function signatures, bodies, calls and returns.

use super::{Lowered, LowerCtx, SymbolBinding};
use crate::access_chain::AccessChain;
use crate::ast::{BasicType, FunctionDef, FunctionId, Node, StorageQualifier, Type};
use crate::error::{CompilerError, Result};
use crate::bail_internal_at;
use crate::decorations;
use log::debug;
use rspirv::dr::Operand;
use rspirv::spirv::{Op, StorageClass, Word};

/// How an argument reaches the callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParamPolicy {
    /// The caller's own storage: opaque handles and buffer blocks.
    Original,
    /// Pointer to a caller temporary, copied in for `in`/`inout` and copied
    /// back for `out`/`inout`.
    Copy,
    /// `const in`: a plain SSA value.
    ConstValue,
}

impl ParamPolicy {
    fn for_param(ty: &Type) -> Self {
        if ty.is_opaque() || is_buffer_block(ty) {
            return ParamPolicy::Original;
        }
        match ty.qualifier.storage {
            StorageQualifier::ConstIn => ParamPolicy::ConstValue,
            _ => ParamPolicy::Copy,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FunctionInfo {
    pub id: Word,
    pub return_type: Word,
    pub param_types: Vec<Word>,
    pub policies: Vec<ParamPolicy>,
}

fn is_buffer_block(ty: &Type) -> bool {
    matches!(ty.basic, BasicType::Block(_)) && ty.qualifier.storage == StorageQualifier::Buffer
}

fn copies_in(ty: &Type) -> bool {
    ty.qualifier.storage != StorageQualifier::Out
}

fn copies_out(ty: &Type) -> bool {
    ty.qualifier.storage.is_param_output()
}

impl<'a> LowerCtx<'a> {
    /// Storage class and pointee of a parameter passed in the caller's own
    /// storage. Buffer blocks keep the layout of the global they came from.
    fn original_param(&mut self, ty: &Type) -> Result<(StorageClass, Word)> {
        if is_buffer_block(ty) {
            let (packing, row_major) = self.block_layout(ty);
            let pointee = self.type_of_layout(ty, packing, row_major, false)?;
            return Ok((decorations::storage_class(ty, &self.target), pointee));
        }
        let storage = match ty.basic {
            BasicType::RayQuery => StorageClass::Function,
            _ => StorageClass::UniformConstant,
        };
        Ok((storage, self.value_type(ty)?))
    }

    fn function_def(&self, id: FunctionId) -> Result<&'a FunctionDef> {
        self.unit
            .function(id)
            .ok_or_else(|| CompilerError::Internal(format!("unknown function {}", id.0), None))
    }

    pub(super) fn function_info(&self, id: FunctionId) -> Result<&FunctionInfo> {
        self.functions
            .get(&id)
            .ok_or_else(|| CompilerError::Internal(format!("function {} was never declared", id.0), None))
    }

    /// Reserve the id and signature of a function so calls can precede its body.
    pub(super) fn declare_function(&mut self, id: FunctionId) -> Result<()> {
        let def = self.function_def(id)?;
        let return_type = self.value_type(&def.return_type)?;
        let mut param_types = Vec::with_capacity(def.params.len());
        let mut policies = Vec::with_capacity(def.params.len());
        for &param in &def.params {
            let decl = self.symbol_decl(param)?;
            let policy = ParamPolicy::for_param(&decl.ty);
            param_types.push(match policy {
                ParamPolicy::Original => {
                    let (storage, pointee) = self.original_param(&decl.ty)?;
                    self.ctor.type_pointer(storage, pointee)
                }
                ParamPolicy::Copy => {
                    let value = self.value_type(&decl.ty)?;
                    self.ctor.type_pointer(StorageClass::Function, value)
                }
                ParamPolicy::ConstValue => self.value_type(&decl.ty)?,
            });
            policies.push(policy);
        }
        let fid = self.ctor.builder.id();
        debug!("declared function {} as %{}", def.name, fid);
        self.functions.insert(
            id,
            FunctionInfo {
                id: fid,
                return_type,
                param_types,
                policies,
            },
        );
        Ok(())
    }

    pub(super) fn lower_function(&mut self, id: FunctionId) -> Result<()> {
        let def = self.function_def(id)?;
        let info = self.function_info(id)?.clone();
        debug!("lowering function {}", def.name);
        let params = self
            .ctor
            .begin_function(info.id, &def.name, info.return_type, &info.param_types)?;

        for ((&param, &param_id), policy) in def.params.iter().zip(&params).zip(&info.policies) {
            let decl = self.symbol_decl(param)?;
            let binding = match policy {
                ParamPolicy::Original => {
                    let (storage, pointee) = self.original_param(&decl.ty)?;
                    SymbolBinding::Variable {
                        ptr: param_id,
                        pointee,
                        storage,
                    }
                }
                ParamPolicy::Copy => SymbolBinding::Variable {
                    ptr: param_id,
                    pointee: self.value_type(&decl.ty)?,
                    storage: StorageClass::Function,
                },
                ParamPolicy::ConstValue => SymbolBinding::Value {
                    id: param_id,
                    ty: self.value_type(&decl.ty)?,
                },
            };
            self.ctor.name(param_id, &decl.name);
            self.symbols.insert(param, binding);
        }

        if id == self.unit.entry_function {
            for init in &self.unit.global_initializers {
                self.lower_statement(init)?;
            }
        }

        self.return_type = Some(def.return_type.clone());
        for node in &def.body {
            self.lower_statement(node)?;
        }
        self.return_type = None;

        // falling off the end
        if self.ctor.is_reachable() {
            if def.return_type.is_void() {
                self.ctor.close_with(Op::Return, vec![])?;
            } else {
                let null = self.ctor.const_null(info.return_type);
                self.ctor.close_with(Op::ReturnValue, vec![Operand::IdRef(null)])?;
            }
        } else {
            self.ctor.close_with(Op::Unreachable, vec![])?;
        }
        self.ctor.end_function()
    }

    pub(super) fn lower_call(&mut self, function: FunctionId, args: &[Node], node: &Node) -> Result<Lowered> {
        let info = self.function_info(function)?.clone();
        let def = self.function_def(function)?;
        if args.len() != info.policies.len() {
            bail_internal_at!(
                node.span,
                "call to {} passes {} argument(s) for {} parameter(s)",
                def.name,
                args.len(),
                info.policies.len()
            );
        }

        // all arguments are evaluated before any is copied back
        let mut operands = Vec::with_capacity(args.len());
        let mut copy_back: Vec<(AccessChain, Word, Word)> = Vec::new();
        for ((arg, policy), &param) in args.iter().zip(&info.policies).zip(&def.params) {
            let decl = self.symbol_decl(param)?;
            match policy {
                ParamPolicy::Original => {
                    let chain = self.lower_chain(arg)?;
                    operands.push(chain.pointer(&mut self.ctor)?);
                }
                ParamPolicy::Copy => {
                    let value_ty = self.value_type(&decl.ty)?;
                    let chain = if copies_out(&decl.ty) {
                        Some(self.lower_chain(arg)?)
                    } else {
                        None
                    };
                    let temp = self.ctor.declare_variable("param", value_ty)?;
                    if copies_in(&decl.ty) {
                        let value = match &chain {
                            Some(chain) => chain.load(&mut self.ctor, value_ty)?,
                            None => {
                                let (value, ty) = self.lower_rvalue(arg)?;
                                self.ctor.convert_representation(value, ty, value_ty)?
                            }
                        };
                        self.ctor.builder.store(temp, value, None, [])?;
                    }
                    operands.push(temp);
                    if let Some(chain) = chain {
                        copy_back.push((chain, temp, value_ty));
                    }
                }
                ParamPolicy::ConstValue => {
                    let value_ty = self.value_type(&decl.ty)?;
                    let (value, ty) = self.lower_rvalue(arg)?;
                    operands.push(self.ctor.convert_representation(value, ty, value_ty)?);
                }
            }
        }

        let id = self
            .ctor
            .builder
            .function_call(info.return_type, None, info.id, operands)?;
        for (chain, temp, ty) in copy_back {
            let value = self.ctor.builder.load(ty, None, temp, None, [])?;
            chain.store(&mut self.ctor, value, ty)?;
        }

        if def.return_type.is_void() {
            Ok(Lowered::Void)
        } else {
            Ok(Lowered::Value {
                id,
                ty: info.return_type,
            })
        }
    }

    /// `return`, copying through a temporary when the value's IR type is
    /// not exactly the declared return type.
    pub(super) fn lower_return(&mut self, value: Option<&Node>, node: &Node) -> Result<()> {
        let Some(value) = value else {
            return self.ctor.emit_terminator(Op::Return, vec![]);
        };
        let Some(declared) = self.return_type.clone() else {
            bail_internal_at!(node.span, "return outside of a function body");
        };
        let return_ty = self.value_type(&declared)?;
        let (mut id, ty) = self.lower_rvalue(value)?;
        if ty != return_ty {
            let temp = self.ctor.declare_variable("ret", return_ty)?;
            AccessChain::lvalue(temp, return_ty, StorageClass::Function).multi_store(&mut self.ctor, id, ty)?;
            id = self.ctor.builder.load(return_ty, None, temp, None, [])?;
        }
        self.ctor.emit_terminator(Op::ReturnValue, vec![Operand::IdRef(id)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Qualifier, SamplerDesc, SamplerDim, StructId};

    fn param(storage: StorageQualifier) -> Type {
        Type::float(32).with_qualifier(Qualifier::with_storage(storage))
    }

    #[test]
    fn test_param_policies() {
        assert_eq!(ParamPolicy::for_param(&param(StorageQualifier::In)), ParamPolicy::Copy);
        assert_eq!(ParamPolicy::for_param(&param(StorageQualifier::InOut)), ParamPolicy::Copy);
        assert_eq!(ParamPolicy::for_param(&param(StorageQualifier::ConstIn)), ParamPolicy::ConstValue);
        let sampler = Type::sampler(SamplerDesc::combined(SamplerDim::Dim2D));
        assert_eq!(ParamPolicy::for_param(&sampler), ParamPolicy::Original);
        let ssbo = Type::block(StructId(0), Qualifier::with_storage(StorageQualifier::Buffer));
        assert_eq!(ParamPolicy::for_param(&ssbo), ParamPolicy::Original);
        let ubo = Type::block(StructId(0), Qualifier::with_storage(StorageQualifier::Uniform));
        assert_eq!(ParamPolicy::for_param(&ubo), ParamPolicy::Copy);
    }

    #[test]
    fn test_copy_direction() {
        assert!(copies_in(&param(StorageQualifier::In)));
        assert!(!copies_out(&param(StorageQualifier::In)));
        assert!(!copies_in(&param(StorageQualifier::Out)));
        assert!(copies_out(&param(StorageQualifier::Out)));
        assert!(copies_in(&param(StorageQualifier::InOut)));
        assert!(copies_out(&param(StorageQualifier::InOut)));
    }
}
