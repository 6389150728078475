use std::sync::Arc;

use dlbind_core::{GeneratorComplexity, ImplementationOptions, MethodDescriptor, Result, Value};

use crate::call::CallInterface;
use crate::pipeline::{CallContext, Downstream, ImplementationGenerator, Invoke, Invoker, PipelineWorkUnit};

/// Calls straight through the raw symbol address. Instances only keep the
/// address; the signature is shared by every instance of the artifact.
pub(crate) struct IndirectCallGenerator;

impl ImplementationGenerator for IndirectCallGenerator {
    fn name(&self) -> &'static str {
        "IndirectCall"
    }

    fn complexity(&self) -> GeneratorComplexity {
        GeneratorComplexity::OPTION_DEPENDENT | GeneratorComplexity::TERMINATING
    }

    fn is_applicable(&self, member: &MethodDescriptor, options: ImplementationOptions) -> bool {
        options.contains(ImplementationOptions::USE_INDIRECT_CALLS) && !member.is_open()
    }

    fn generate(&self, unit: PipelineWorkUnit, next: &mut Downstream<'_>) -> Result<Invoker> {
        let signature = CallInterface::for_method(&unit.member)?;
        let symbol = next.artifact().symbol(&unit.symbol);
        Ok(Arc::new(IndirectInvoker { symbol, signature }))
    }
}

struct IndirectInvoker {
    symbol: usize,
    signature: CallInterface,
}

impl Invoke for IndirectInvoker {
    fn invoke(&self, cx: &CallContext<'_>, args: Vec<Value>) -> Result<Value> {
        let code = cx.library.symbol(self.symbol)?;
        // SAFETY: the symbol slot was allocated for this member's symbol.
        unsafe { self.signature.invoke_raw(code, &args) }
    }
}
