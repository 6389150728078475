use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use dlbind_core::symbols::mangle_generic;
use dlbind_core::{
    GeneratorComplexity, ImplementationOptions, InterfaceDescriptor, MethodDescriptor,
    NativeSymbols, Result, TypeDesc, TypeIdentity, Value,
};

use crate::pipeline::{CallContext, Downstream, ImplementationGenerator, Invoke, Invoker, PipelineWorkUnit};

/// Binds open generic methods on first call with concrete type arguments.
///
/// The closed method is described by a single-method host interface and
/// activated through the regular pipeline against the same library. Hosts are
/// shared by every instance of the artifact, so closed implementations are
/// found again in the implementation cache. Each instance keeps its own
/// closed bindings.
pub(crate) struct DeferredGenericGenerator;

impl ImplementationGenerator for DeferredGenericGenerator {
    fn name(&self) -> &'static str {
        "DeferredGeneric"
    }

    fn complexity(&self) -> GeneratorComplexity {
        GeneratorComplexity::MEMBER_DEPENDENT
            | GeneratorComplexity::CREATES_TYPES
            | GeneratorComplexity::DEFERRED_IMPLEMENTATION
            | GeneratorComplexity::TERMINATING
    }

    fn is_applicable(&self, member: &MethodDescriptor, _options: ImplementationOptions) -> bool {
        member.is_open()
    }

    fn generate(&self, unit: PipelineWorkUnit, _next: &mut Downstream<'_>) -> Result<Invoker> {
        Ok(Arc::new(DeferredInvoker {
            id: TypeIdentity::next(),
            interface: unit.interface,
            naming: unit.naming,
            member: unit.member,
            hosts: Mutex::new(HashMap::new()),
        }))
    }
}

struct DeferredInvoker {
    /// Keys this member's closed bindings within an instance.
    id: TypeIdentity,
    interface: String,
    naming: Option<NativeSymbols>,
    member: MethodDescriptor,
    hosts: Mutex<HashMap<Vec<TypeDesc>, Arc<InterfaceDescriptor>>>,
}

impl DeferredInvoker {
    fn host(&self, type_args: &[TypeDesc]) -> Result<Arc<InterfaceDescriptor>> {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(host) = hosts.get(type_args) {
            return Ok(host.clone());
        }
        // The host applies the naming rule and any mangler to the closed
        // entry point, so the suffix goes on the undecorated name.
        let open = self.member.entry_point.as_deref().unwrap_or(&self.member.name);
        let closed = self.member.close(type_args)?.entry_point(mangle_generic(open, type_args));
        let args: Vec<String> = type_args.iter().map(ToString::to_string).collect();
        let mut builder = InterfaceDescriptor::builder(format!(
            "{}.{}<{}>",
            self.interface,
            self.member.name,
            args.join(", ")
        ))
        .method(closed);
        if let Some(rule) = &self.naming {
            builder = builder.native_symbols(rule.clone());
        }
        let host = builder.build();
        log::debug!("closing `{}` over <{}>", self.member.name, args.join(", "));
        hosts.insert(type_args.to_vec(), host.clone());
        Ok(host)
    }
}

impl Invoke for DeferredInvoker {
    fn invoke(&self, cx: &CallContext<'_>, args: Vec<Value>) -> Result<Value> {
        let host = self.host(cx.type_args)?;
        let closed = cx.library.closed_generic(self.id, cx.type_args, &host)?;
        closed.invoke(&self.member.name, args)
    }
}
