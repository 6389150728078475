use std::sync::Arc;

use dlbind_core::{
    Error, GeneratorComplexity, ImplementationOptions, MarshalHints, MethodDescriptor, Result,
    Scratch, TypeDesc, TypeTransformer, TypeTransformerRepository, Value,
};

use super::take_arg;
use crate::pipeline::{CallContext, Downstream, ImplementationGenerator, Invoke, Invoker, PipelineWorkUnit};

/// The family of complex types a [`LoweringWrapper`] takes care of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoweringKind {
    /// Types with a user registered transformer.
    Custom,
    Boolean,
    String,
    /// Optional value types passed by value.
    Nullable,
    Span,
}

impl LoweringKind {
    fn name(self) -> &'static str {
        match self {
            LoweringKind::Custom => "CustomTypeMarshalling",
            LoweringKind::Boolean => "BooleanMarshalling",
            LoweringKind::String => "StringMarshalling",
            LoweringKind::Nullable => "ValueNullableMarshalling",
            LoweringKind::Span => "SpanMarshalling",
        }
    }

    fn selects(self, ty: &TypeDesc) -> bool {
        match self {
            LoweringKind::Custom => matches!(ty, TypeDesc::Custom(_)),
            LoweringKind::Boolean => *ty == TypeDesc::Bool,
            LoweringKind::String => *ty == TypeDesc::String,
            LoweringKind::Nullable => matches!(ty, TypeDesc::Optional(_)),
            LoweringKind::Span => matches!(ty, TypeDesc::Span(_)),
        }
    }
}

struct Lowered {
    transformer: Arc<dyn TypeTransformer>,
    hints: MarshalHints,
}

/// Lowers by-value parameters of one complex type family before the call
/// and raises the return value after it.
pub(crate) struct LoweringWrapper {
    kind: LoweringKind,
    transformers: Arc<TypeTransformerRepository>,
}

impl LoweringWrapper {
    pub fn new(kind: LoweringKind, transformers: Arc<TypeTransformerRepository>) -> Self {
        LoweringWrapper { kind, transformers }
    }

    fn lowered(&self, ty: &TypeDesc, hints: &MarshalHints) -> Result<Lowered> {
        Ok(Lowered {
            transformer: self.transformers.get(ty)?,
            hints: hints.clone(),
        })
    }

    /// The descriptor later stages see, with the transformers to apply at
    /// each parameter position and to the return value.
    fn rewrite(
        &self,
        member: &MethodDescriptor,
    ) -> Result<(MethodDescriptor, Vec<Option<Lowered>>, Option<Lowered>)> {
        let mut params = Vec::with_capacity(member.params.len());
        let mut lowered = Vec::with_capacity(member.params.len());
        for param in &member.params {
            if param.by_ref || !self.kind.selects(&param.ty) {
                params.push(param.clone());
                lowered.push(None);
                continue;
            }
            let l = self.lowered(&param.ty, &param.hints)?;
            params.push(param.retyped(l.transformer.lowered_type(&param.hints), false));
            lowered.push(Some(l));
        }
        let mut rewritten = member.with_params(params);
        let ret = if self.kind.selects(&member.ret.ty) {
            if self.kind == LoweringKind::Span && member.ret.hints.span_length.is_none() {
                return Err(Error::MissingSpanLength {
                    member: member.name.clone(),
                });
            }
            let l = self.lowered(&member.ret.ty, &member.ret.hints)?;
            rewritten.ret.ty = l.transformer.lowered_type(&member.ret.hints);
            Some(l)
        } else {
            None
        };
        Ok((rewritten, lowered, ret))
    }
}

impl ImplementationGenerator for LoweringWrapper {
    fn name(&self) -> &'static str {
        self.kind.name()
    }

    fn complexity(&self) -> GeneratorComplexity {
        GeneratorComplexity::MEMBER_DEPENDENT | GeneratorComplexity::TRANSFORMS_PARAMETERS
    }

    fn is_applicable(&self, member: &MethodDescriptor, _options: ImplementationOptions) -> bool {
        !member.is_open() && member.mentions(|ty, by_ref| !by_ref && self.kind.selects(ty))
    }

    fn generate(&self, unit: PipelineWorkUnit, next: &mut Downstream<'_>) -> Result<Invoker> {
        let (rewritten, params, ret) = self.rewrite(&unit.member)?;
        let member = unit.member.name.clone();
        let next = next.consume(unit.passthrough(rewritten))?;
        Ok(Arc::new(LoweringInvoker {
            member,
            params,
            ret,
            next,
        }))
    }
}

struct LoweringInvoker {
    member: String,
    params: Vec<Option<Lowered>>,
    ret: Option<Lowered>,
    next: Invoker,
}

impl Invoke for LoweringInvoker {
    fn invoke(&self, cx: &CallContext<'_>, mut args: Vec<Value>) -> Result<Value> {
        // Dropped on every exit path, releasing argument storage and any
        // native memory the caller owns.
        let mut scratch = Scratch::new();
        for (i, lowered) in self.params.iter().enumerate() {
            if let Some(l) = lowered {
                let value = take_arg(&mut args, i, &self.member)?;
                args[i] = l.transformer.lower(value, &l.hints, &mut scratch)?;
            }
        }
        let result = self.next.invoke(cx, args)?;
        match &self.ret {
            Some(l) => l.transformer.raise(result, &l.hints, &mut scratch),
            None => Ok(result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlbind_core::{BoolMarshal, StringEncoding, StructLayout};

    fn wrapper(kind: LoweringKind) -> LoweringWrapper {
        LoweringWrapper::new(kind, Arc::new(TypeTransformerRepository::new()))
    }

    #[test]
    fn booleans_lower_to_their_carrier() {
        let m = MethodDescriptor::new("f")
            .with_param(
                dlbind_core::ParameterDescriptor::new("wide", TypeDesc::Bool)
                    .hints(MarshalHints::boolean(BoolMarshal::VariantBool)),
            )
            .param("plain", TypeDesc::Bool)
            .param_ref("out", TypeDesc::Bool)
            .returns(TypeDesc::Bool);
        let w = wrapper(LoweringKind::Boolean);
        assert!(w.is_applicable(&m, ImplementationOptions::empty()));
        let (rewritten, params, ret) = w.rewrite(&m).unwrap();
        let types: Vec<_> = rewritten.params.iter().map(|p| p.ty.clone()).collect();
        assert_eq!(types, [TypeDesc::I16, TypeDesc::U8, TypeDesc::Bool]);
        assert!(params[2].is_none());
        assert!(ret.is_some());
        assert_eq!(rewritten.ret.ty, TypeDesc::U8);
    }

    #[test]
    fn strings_and_optionals_become_pointers() {
        let point = StructLayout::new("Point", [("x", TypeDesc::I32)]).unwrap();
        let m = MethodDescriptor::new("f")
            .param("name", TypeDesc::String)
            .param("at", TypeDesc::optional(TypeDesc::Struct(point.clone())))
            .returns(TypeDesc::optional(TypeDesc::Struct(point)));
        let (after_strings, _, ret) = wrapper(LoweringKind::String).rewrite(&m).unwrap();
        assert!(ret.is_none());
        assert_eq!(after_strings.params[0].ty, TypeDesc::Pointer);
        let (after_optionals, _, ret) = wrapper(LoweringKind::Nullable).rewrite(&after_strings).unwrap();
        assert!(ret.is_some());
        assert_eq!(after_optionals.params[1].ty, TypeDesc::Pointer);
        assert_eq!(after_optionals.ret.ty, TypeDesc::Pointer);
        assert!(!wrapper(LoweringKind::String).is_applicable(&after_optionals, ImplementationOptions::empty()));
    }

    #[test]
    fn wide_string_hint_is_kept_on_the_parameter() {
        let m = MethodDescriptor::new("f").with_param(
            dlbind_core::ParameterDescriptor::new("s", TypeDesc::String)
                .hints(MarshalHints::string(StringEncoding::Utf16)),
        );
        let (rewritten, params, _) = wrapper(LoweringKind::String).rewrite(&m).unwrap();
        assert_eq!(rewritten.params[0].hints.string, Some(StringEncoding::Utf16));
        assert!(params[0].is_some());
    }

    #[test]
    fn spans_need_a_length_when_returned() {
        let m = MethodDescriptor::new("f").returns(TypeDesc::span(TypeDesc::I32));
        assert!(matches!(
            wrapper(LoweringKind::Span).rewrite(&m).err(),
            Some(Error::MissingSpanLength { .. })
        ));
        let m = MethodDescriptor::new("f").returns_with(TypeDesc::span(TypeDesc::I32), MarshalHints::sized_span(3));
        let (rewritten, _, _) = wrapper(LoweringKind::Span).rewrite(&m).unwrap();
        assert_eq!(rewritten.ret.ty, TypeDesc::Pointer);
    }

    #[test]
    fn unknown_custom_types_are_configuration_errors() {
        let m = MethodDescriptor::new("f").param("h", TypeDesc::custom("Handle"));
        assert!(matches!(
            wrapper(LoweringKind::Custom).rewrite(&m).err(),
            Some(Error::TransformerNotFound { .. })
        ));
    }
}
