use std::sync::Arc;

use dlbind_core::{GeneratorComplexity, ImplementationOptions, MethodDescriptor, Result, Value};

use crate::pipeline::{CallContext, Downstream, ImplementationGenerator, Invoke, Invoker, PipelineWorkUnit};

/// Refuses calls on a disposed instance.
pub(crate) struct DisposalCallWrapper;

impl ImplementationGenerator for DisposalCallWrapper {
    fn name(&self) -> &'static str {
        "DisposalCall"
    }

    fn complexity(&self) -> GeneratorComplexity {
        GeneratorComplexity::OPTION_DEPENDENT
    }

    fn is_applicable(&self, _member: &MethodDescriptor, options: ImplementationOptions) -> bool {
        options.contains(ImplementationOptions::GENERATE_DISPOSAL_CHECKS)
    }

    fn generate(&self, unit: PipelineWorkUnit, next: &mut Downstream<'_>) -> Result<Invoker> {
        let next = next.consume(unit)?;
        Ok(Arc::new(DisposalInvoker { next }))
    }
}

struct DisposalInvoker {
    next: Invoker,
}

impl Invoke for DisposalInvoker {
    fn invoke(&self, cx: &CallContext<'_>, args: Vec<Value>) -> Result<Value> {
        cx.library.ensure_not_disposed()?;
        self.next.invoke(cx, args)
    }
}
