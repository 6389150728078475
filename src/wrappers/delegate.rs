use std::sync::Arc;

use dlbind_core::{
    Callback, DelegateLifetime, Error, GeneratorComplexity, ImplementationOptions, MethodDescriptor,
    RawInvoker, Result, Scratch, TypeDesc, Value,
};

use super::take_arg;
use crate::call::CallInterface;
use crate::pipeline::{CallContext, Downstream, ImplementationGenerator, Invoke, Invoker, PipelineWorkUnit};

/// Passes callbacks to native code as code pointers, keeping them alive as
/// their lifetime hint asks, and turns returned function pointers into
/// callable [`Callback`]s.
pub(crate) struct DelegateMarshallingWrapper;

impl DelegateMarshallingWrapper {
    fn rewrite(member: &MethodDescriptor) -> Result<(MethodDescriptor, Vec<(usize, DelegateLifetime)>, Option<Arc<CallInterface>>)> {
        let mut positions = Vec::new();
        let params = member
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| match &p.ty {
                TypeDesc::Callback(_) if !p.by_ref => {
                    positions.push((i, p.hints.delegate_lifetime()));
                    p.retyped(TypeDesc::Pointer, false)
                }
                _ => p.clone(),
            })
            .collect();
        let mut rewritten = member.with_params(params);
        let ret = match &member.ret.ty {
            TypeDesc::Callback(signature) => {
                rewritten.ret.ty = TypeDesc::Pointer;
                let name = format!("{}::return", member.name);
                Some(Arc::new(CallInterface::new(&name, &signature.params, &signature.ret)?))
            }
            _ => None,
        };
        Ok((rewritten, positions, ret))
    }
}

impl ImplementationGenerator for DelegateMarshallingWrapper {
    fn name(&self) -> &'static str {
        "DelegateMarshalling"
    }

    fn complexity(&self) -> GeneratorComplexity {
        GeneratorComplexity::MEMBER_DEPENDENT
            | GeneratorComplexity::TRANSFORMS_PARAMETERS
            | GeneratorComplexity::CREATES_TYPES
    }

    fn is_applicable(&self, member: &MethodDescriptor, _options: ImplementationOptions) -> bool {
        !member.is_open() && member.mentions(|ty, by_ref| !by_ref && matches!(ty, TypeDesc::Callback(_)))
    }

    fn generate(&self, unit: PipelineWorkUnit, next: &mut Downstream<'_>) -> Result<Invoker> {
        let (rewritten, positions, ret) = Self::rewrite(&unit.member)?;
        let member = unit.member.name.clone();
        let next = next.consume(unit.passthrough(rewritten))?;
        Ok(Arc::new(DelegateInvoker {
            member,
            positions,
            ret,
            next,
        }))
    }
}

struct DelegateInvoker {
    member: String,
    positions: Vec<(usize, DelegateLifetime)>,
    ret: Option<Arc<CallInterface>>,
    next: Invoker,
}

impl Invoke for DelegateInvoker {
    fn invoke(&self, cx: &CallContext<'_>, mut args: Vec<Value>) -> Result<Value> {
        let mut scratch = Scratch::new();
        let mut persistent = Vec::new();
        for &(i, lifetime) in &self.positions {
            let callback = match take_arg(&mut args, i, &self.member)? {
                Value::Callback(callback) => callback,
                other => {
                    return Err(Error::argument_mismatch(
                        &self.member,
                        format!("argument {i} expects a callback, found {}", other.kind()),
                    ))
                }
            };
            args[i] = Value::Pointer(callback.as_ref().map_or(0, Callback::code));
            if let Some(callback) = callback {
                match lifetime {
                    DelegateLifetime::Default | DelegateLifetime::Persistent => persistent.push((i, callback)),
                    DelegateLifetime::CallOnly => scratch.retain(callback),
                    DelegateLifetime::None => {}
                }
            }
        }
        // Persistent callbacks are retained only once the call went through.
        let result = self.next.invoke(cx, args)?;
        for (i, callback) in persistent {
            cx.library.lifetimes().retain(&self.member, i, callback);
        }
        let Some(signature) = &self.ret else {
            return Ok(result);
        };
        match result {
            Value::Pointer(0) => Ok(Value::Callback(None)),
            Value::Pointer(code) => {
                let invoker: Arc<dyn RawInvoker> = signature.clone();
                Ok(Value::Callback(Some(Callback::bound(code, invoker))))
            }
            other => Err(Error::argument_mismatch(
                &self.member,
                format!("expected a function pointer, found {}", other.kind()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlbind_core::{CallbackSignature, MarshalHints, ParameterDescriptor};

    #[test]
    fn callbacks_travel_as_pointers() {
        let sig = CallbackSignature::new([TypeDesc::I32], TypeDesc::I32);
        let m = MethodDescriptor::new("register")
            .with_param(
                ParameterDescriptor::new("cb", TypeDesc::Callback(sig.clone()))
                    .hints(MarshalHints::lifetime(DelegateLifetime::CallOnly)),
            )
            .param("other", TypeDesc::Callback(sig.clone()))
            .returns(TypeDesc::Callback(sig));
        let (rewritten, positions, ret) = DelegateMarshallingWrapper::rewrite(&m).unwrap();
        assert_eq!(positions, [(0, DelegateLifetime::CallOnly), (1, DelegateLifetime::Persistent)]);
        assert!(rewritten.params.iter().all(|p| p.ty == TypeDesc::Pointer));
        assert_eq!(rewritten.ret.ty, TypeDesc::Pointer);
        assert!(ret.is_some());
    }

    #[test]
    fn returned_signatures_must_be_raw() {
        let sig = CallbackSignature::new([TypeDesc::String], TypeDesc::Void);
        let m = MethodDescriptor::new("get").returns(TypeDesc::Callback(sig));
        assert!(matches!(
            DelegateMarshallingWrapper::rewrite(&m).err(),
            Some(Error::UnsupportedType { .. })
        ));
    }
}
