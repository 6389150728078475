use std::sync::Arc;

use dlbind_core::{
    layout, Error, GeneratorComplexity, ImplementationOptions, MethodDescriptor, Result, Scratch,
    TypeDesc, Value, ValueRef,
};

use super::take_arg;
use crate::pipeline::{CallContext, Downstream, ImplementationGenerator, Invoke, Invoker, PipelineWorkUnit};

/// Passes by-reference parameters as pointers to scratch copies and writes
/// whatever native code left there back into the caller's cells.
pub(crate) struct ByRefMarshallingWrapper;

impl ByRefMarshallingWrapper {
    fn rewrite(member: &MethodDescriptor) -> (MethodDescriptor, Vec<(usize, TypeDesc)>) {
        let mut positions = Vec::new();
        let params = member
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| {
                if p.by_ref && p.ty.is_blittable() {
                    positions.push((i, p.ty.clone()));
                    p.retyped(TypeDesc::Pointer, false)
                } else {
                    p.clone()
                }
            })
            .collect();
        (member.with_params(params), positions)
    }
}

impl ImplementationGenerator for ByRefMarshallingWrapper {
    fn name(&self) -> &'static str {
        "ByRefMarshalling"
    }

    fn complexity(&self) -> GeneratorComplexity {
        GeneratorComplexity::MEMBER_DEPENDENT | GeneratorComplexity::TRANSFORMS_PARAMETERS
    }

    fn is_applicable(&self, member: &MethodDescriptor, _options: ImplementationOptions) -> bool {
        member.params.iter().any(|p| p.by_ref && p.ty.is_blittable())
    }

    fn generate(&self, unit: PipelineWorkUnit, next: &mut Downstream<'_>) -> Result<Invoker> {
        let (rewritten, positions) = Self::rewrite(&unit.member);
        let member = unit.member.name.clone();
        let next = next.consume(unit.passthrough(rewritten))?;
        Ok(Arc::new(ByRefInvoker {
            member,
            positions,
            next,
        }))
    }
}

struct ByRefInvoker {
    member: String,
    positions: Vec<(usize, TypeDesc)>,
    next: Invoker,
}

impl Invoke for ByRefInvoker {
    fn invoke(&self, cx: &CallContext<'_>, mut args: Vec<Value>) -> Result<Value> {
        let mut scratch = Scratch::new();
        let mut cells: Vec<(ValueRef, usize, &TypeDesc)> = Vec::with_capacity(self.positions.len());
        for (i, ty) in &self.positions {
            let cell = match take_arg(&mut args, *i, &self.member)? {
                Value::Ref(cell) => cell,
                other => {
                    return Err(Error::argument_mismatch(
                        &self.member,
                        format!("argument {i} is passed by reference, found {}", other.kind()),
                    ))
                }
            };
            let address = scratch.store(ty, &cell.get())?;
            args[*i] = Value::Pointer(address);
            cells.push((cell, address, ty));
        }
        let result = self.next.invoke(cx, args)?;
        for (cell, address, ty) in cells {
            // SAFETY: `address` points at scratch storage of `ty`'s size,
            // alive until `scratch` drops.
            let written = unsafe { layout::read(ty, address as *const u8) }?;
            cell.set(written);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blittable_references_become_pointers() {
        let m = MethodDescriptor::new("f")
            .param("a", TypeDesc::I32)
            .param_ref("b", TypeDesc::I64)
            .param_ref("c", TypeDesc::Bool)
            .param_ref("d", TypeDesc::String);
        assert!(ByRefMarshallingWrapper.is_applicable(&m, ImplementationOptions::empty()));
        let (rewritten, positions) = ByRefMarshallingWrapper::rewrite(&m);
        assert_eq!(positions, [(1, TypeDesc::I64), (2, TypeDesc::Bool)]);
        assert_eq!(rewritten.params[1].ty, TypeDesc::Pointer);
        assert!(!rewritten.params[1].by_ref);
        assert!(rewritten.params[3].by_ref);
        assert!(!ByRefMarshallingWrapper.is_applicable(&rewritten, ImplementationOptions::empty()));
    }
}
