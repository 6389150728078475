use std::sync::Arc;

use dlbind_core::permutation::{self, optional_ref_positions, permutation_index};
use dlbind_core::{
    Error, GeneratorComplexity, ImplementationOptions, MethodDescriptor, Result, Value, ValueRef,
};

use crate::pipeline::{CallContext, Downstream, ImplementationGenerator, Invoke, Invoker, PipelineWorkUnit};
use crate::wrappers::take_arg;

/// Expands optional by-reference parameters into one implementation per
/// presence combination, behind a dispatcher that picks the branch at call
/// time.
pub(crate) struct RefPermutationGenerator;

impl ImplementationGenerator for RefPermutationGenerator {
    fn name(&self) -> &'static str {
        "RefPermutation"
    }

    fn complexity(&self) -> GeneratorComplexity {
        GeneratorComplexity::MEMBER_DEPENDENT
            | GeneratorComplexity::TRANSFORMS_PARAMETERS
            | GeneratorComplexity::CREATES_TYPES
    }

    fn is_applicable(&self, member: &MethodDescriptor, _options: ImplementationOptions) -> bool {
        !member.is_open() && member.params.iter().any(|p| p.is_optional_ref())
    }

    fn generate(&self, unit: PipelineWorkUnit, next: &mut Downstream<'_>) -> Result<Invoker> {
        let positions = optional_ref_positions(&unit.member);
        let mut branches = Vec::new();
        for p in permutation::generate(&unit.member)? {
            log::trace!("generating permutation {} of `{}`", p.index, unit.member.name);
            branches.push(next.consume(unit.passthrough(unit.member.with_params(p.params)))?);
        }
        Ok(Arc::new(PermutationDispatcher {
            member: unit.member.name.clone(),
            positions,
            branches,
        }))
    }
}

/// Jump table over the generated permutations.
struct PermutationDispatcher {
    member: String,
    positions: Vec<usize>,
    branches: Vec<Invoker>,
}

impl PermutationDispatcher {
    fn optional_cell(&self, args: &mut [Value], position: usize) -> Result<ValueRef> {
        match take_arg(args, position, &self.member)? {
            Value::Ref(cell) => Ok(cell),
            other => Err(Error::argument_mismatch(
                &self.member,
                format!("argument {position} is an optional reference, found {}", other.kind()),
            )),
        }
    }
}

impl Invoke for PermutationDispatcher {
    fn invoke(&self, cx: &CallContext<'_>, mut args: Vec<Value>) -> Result<Value> {
        // Present values get a fresh inner cell; its contents are written
        // back into the caller's optional after the call.
        let mut present = Vec::new();
        let mut flags = Vec::with_capacity(self.positions.len());
        for &position in &self.positions {
            let outer = self.optional_cell(&mut args, position)?;
            match outer.get() {
                Value::Optional(Some(value)) => {
                    let inner = ValueRef::new(*value);
                    args[position] = Value::Ref(inner.clone());
                    present.push((outer, inner));
                    flags.push(true);
                }
                Value::Optional(None) => {
                    args[position] = Value::null();
                    flags.push(false);
                }
                other => {
                    return Err(Error::argument_mismatch(
                        &self.member,
                        format!("argument {position} expects an optional, found {}", other.kind()),
                    ))
                }
            }
        }
        let index = permutation_index(flags);
        let branch = self.branches.get(index).ok_or_else(|| Error::PermutationIndex {
            member: self.member.clone(),
            index,
            count: self.branches.len(),
        })?;
        let result = branch.invoke(cx, args)?;
        for (outer, inner) in present {
            outer.set(Value::some(inner.get()));
        }
        Ok(result)
    }
}
