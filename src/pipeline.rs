//! Ordering and dispatch of the stages that turn a method descriptor into a
//! callable chain of invokers.

use std::cmp::Reverse;
use std::sync::Arc;

use dlbind_core::{
    Error, GeneratorComplexity, ImplementationOptions, MethodDescriptor, NativeSymbols, Result,
    TypeDesc, TypeTransformerRepository, Value,
};

use crate::generators::{DeferredGenericGenerator, IndirectCallGenerator, StaticBindingGenerator};
use crate::generators::permutation::RefPermutationGenerator;
use crate::implementation::ArtifactBuilder;
use crate::library::NativeLibrary;
use crate::wrappers::{
    ByRefMarshallingWrapper, DelegateMarshallingWrapper, DisposalCallWrapper, LoweringKind,
    LoweringWrapper,
};

/// What an invoker sees of the call in progress.
pub(crate) struct CallContext<'a> {
    pub library: &'a NativeLibrary,
    /// Concrete type arguments of a generic call; empty otherwise.
    pub type_args: &'a [TypeDesc],
}

/// One link of a generated call chain.
pub(crate) trait Invoke: Send + Sync {
    fn invoke(&self, cx: &CallContext<'_>, args: Vec<Value>) -> Result<Value>;
}

pub(crate) type Invoker = Arc<dyn Invoke>;

/// A method on its way through the pipeline.
#[derive(Debug, Clone)]
pub(crate) struct PipelineWorkUnit {
    /// Name of the declaring interface.
    pub interface: String,
    /// Naming rule of the declaring interface.
    pub naming: Option<NativeSymbols>,
    pub symbol: String,
    pub member: MethodDescriptor,
    pub options: ImplementationOptions,
}

impl PipelineWorkUnit {
    /// The unit handed to the next stage, with a rewritten descriptor.
    pub fn passthrough(&self, member: MethodDescriptor) -> PipelineWorkUnit {
        PipelineWorkUnit {
            member,
            ..self.clone()
        }
    }
}

pub(crate) trait ImplementationGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    fn complexity(&self) -> GeneratorComplexity;

    fn is_applicable(&self, member: &MethodDescriptor, options: ImplementationOptions) -> bool;

    /// Builds the invoker for `unit`, handing rewritten units to `next`.
    fn generate(&self, unit: PipelineWorkUnit, next: &mut Downstream<'_>) -> Result<Invoker>;
}

/// The stages left after the current one.
pub(crate) struct Downstream<'a> {
    pipeline: &'a ImplementationPipeline,
    remaining: Vec<usize>,
    artifact: &'a mut ArtifactBuilder,
}

impl Downstream<'_> {
    pub fn consume(&mut self, unit: PipelineWorkUnit) -> Result<Invoker> {
        self.pipeline.consume(unit, &self.remaining, &mut *self.artifact)
    }

    pub fn artifact(&mut self) -> &mut ArtifactBuilder {
        &mut *self.artifact
    }
}

pub(crate) struct ImplementationPipeline {
    stages: Vec<Box<dyn ImplementationGenerator>>,
}

impl ImplementationPipeline {
    /// The stock stages, in registration order, sorted for `options`.
    pub fn baseline(transformers: Arc<TypeTransformerRepository>, options: ImplementationOptions) -> Self {
        let stages: Vec<Box<dyn ImplementationGenerator>> = vec![
            Box::new(RefPermutationGenerator),
            Box::new(StaticBindingGenerator),
            Box::new(IndirectCallGenerator),
            Box::new(DeferredGenericGenerator),
            Box::new(LoweringWrapper::new(LoweringKind::Custom, transformers.clone())),
            Box::new(LoweringWrapper::new(LoweringKind::Boolean, transformers.clone())),
            Box::new(DisposalCallWrapper),
            Box::new(LoweringWrapper::new(LoweringKind::String, transformers.clone())),
            Box::new(LoweringWrapper::new(LoweringKind::Nullable, transformers.clone())),
            Box::new(DelegateMarshallingWrapper),
            Box::new(LoweringWrapper::new(LoweringKind::Span, transformers)),
            Box::new(ByRefMarshallingWrapper),
        ];
        Self::new(stages, options)
    }

    pub fn new(mut stages: Vec<Box<dyn ImplementationGenerator>>, options: ImplementationOptions) -> Self {
        stages.sort_by_key(|s| {
            let c = s.complexity();
            (c.is_terminating(), Reverse(c.score()))
        });
        log::trace!(
            "pipeline for {options:?}: {}",
            stages.iter().map(|s| s.name()).collect::<Vec<_>>().join(" -> ")
        );
        ImplementationPipeline { stages }
    }

    pub fn generate(&self, unit: PipelineWorkUnit, artifact: &mut ArtifactBuilder) -> Result<Invoker> {
        let all: Vec<usize> = (0..self.stages.len()).collect();
        self.consume(unit, &all, artifact)
    }

    fn consume(&self, unit: PipelineWorkUnit, remaining: &[usize], artifact: &mut ArtifactBuilder) -> Result<Invoker> {
        let position = remaining
            .iter()
            .position(|&i| self.stages[i].is_applicable(&unit.member, unit.options))
            .ok_or_else(|| Error::NoApplicableGenerator {
                member: unit.member.to_string(),
            })?;
        let stage = &self.stages[remaining[position]];
        log::trace!("{} handles `{}`", stage.name(), unit.member);
        let mut rest = remaining.to_vec();
        rest.remove(position);
        let mut next = Downstream {
            pipeline: self,
            remaining: rest,
            artifact,
        };
        stage.generate(unit, &mut next)
    }

    #[cfg(test)]
    fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered_by_complexity() {
        let pipeline = ImplementationPipeline::baseline(
            Arc::new(TypeTransformerRepository::new()),
            ImplementationOptions::default(),
        );
        assert_eq!(
            pipeline.stage_names(),
            [
                "RefPermutation",
                "DelegateMarshalling",
                "CustomTypeMarshalling",
                "BooleanMarshalling",
                "StringMarshalling",
                "ValueNullableMarshalling",
                "SpanMarshalling",
                "ByRefMarshalling",
                "DisposalCall",
                "DeferredGeneric",
                "StaticBound",
                "IndirectCall",
            ]
        );
    }

    #[test]
    fn terminating_stage_is_required() {
        let pipeline = ImplementationPipeline::new(vec![Box::new(DisposalCallWrapper)], ImplementationOptions::default());
        let unit = PipelineWorkUnit {
            interface: "ILib".to_string(),
            naming: None,
            symbol: "f".to_string(),
            member: MethodDescriptor::new("f"),
            options: ImplementationOptions::default(),
        };
        let err = pipeline.generate(unit, &mut ArtifactBuilder::default()).err();
        assert!(matches!(err, Some(Error::NoApplicableGenerator { .. })));
    }

    #[test]
    fn strategies_follow_options() {
        let pipeline = ImplementationPipeline::baseline(
            Arc::new(TypeTransformerRepository::new()),
            ImplementationOptions::empty(),
        );
        let method = MethodDescriptor::new("f").param("a", TypeDesc::I32).returns(TypeDesc::I32);
        for (options, expected) in [
            (ImplementationOptions::empty(), 1),
            (ImplementationOptions::USE_INDIRECT_CALLS, 0),
        ] {
            let unit = PipelineWorkUnit {
                interface: "ILib".to_string(),
                naming: None,
                symbol: "f".to_string(),
                member: method.clone(),
                options,
            };
            let mut artifact = ArtifactBuilder::default();
            pipeline.generate(unit, &mut artifact).unwrap();
            assert_eq!(artifact.binding_count(), expected);
            assert_eq!(artifact.symbol("f"), 0);
        }
    }
}
