use std::sync::Arc;

use dlbind_core::{GeneratorComplexity, ImplementationOptions, MethodDescriptor, Result, Value};

use crate::call::CallInterface;
use crate::pipeline::{CallContext, Downstream, ImplementationGenerator, Invoke, Invoker, PipelineWorkUnit};

/// A resolved symbol bound to its signature. Instances own one per binding
/// slot, created at activation or on first use.
pub(crate) struct BoundFunction {
    code: usize,
    signature: Arc<CallInterface>,
}

impl BoundFunction {
    pub fn new(code: usize, signature: Arc<CallInterface>) -> Self {
        BoundFunction { code, signature }
    }

    pub fn call(&self, args: &[Value]) -> Result<Value> {
        // SAFETY: `code` was resolved for the symbol whose descriptor
        // produced `signature`.
        unsafe { self.signature.invoke_raw(self.code, args) }
    }
}

/// The default strategy: every call goes through a per-instance bound
/// function.
pub(crate) struct StaticBindingGenerator;

impl ImplementationGenerator for StaticBindingGenerator {
    fn name(&self) -> &'static str {
        "StaticBound"
    }

    fn complexity(&self) -> GeneratorComplexity {
        GeneratorComplexity::OPTION_DEPENDENT | GeneratorComplexity::TERMINATING
    }

    fn is_applicable(&self, member: &MethodDescriptor, options: ImplementationOptions) -> bool {
        !options.contains(ImplementationOptions::USE_INDIRECT_CALLS) && !member.is_open()
    }

    fn generate(&self, unit: PipelineWorkUnit, next: &mut Downstream<'_>) -> Result<Invoker> {
        let signature = Arc::new(CallInterface::for_method(&unit.member)?);
        let artifact = next.artifact();
        let symbol = artifact.symbol(&unit.symbol);
        let binding = artifact.binding(symbol, signature);
        Ok(Arc::new(StaticInvoker { binding }))
    }
}

struct StaticInvoker {
    binding: usize,
}

impl Invoke for StaticInvoker {
    fn invoke(&self, cx: &CallContext<'_>, args: Vec<Value>) -> Result<Value> {
        cx.library.binding(self.binding)?.call(&args)
    }
}
