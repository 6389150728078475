//! Mapping described members to native symbol names.

use heck::{ToKebabCase, ToLowerCamelCase, ToSnakeCase, ToUpperCamelCase};

use crate::descriptor::{
    InterfaceDescriptor, MethodDescriptor, PropertyDescriptor, SymbolTransformation,
};
use crate::error::{Error, Result};
use crate::types::{CallingConvention, TypeDesc};

/// Produces the native symbol for an interface member.
pub trait SymbolNameTransformer: Send + Sync {
    fn method_symbol(&self, interface: &InterfaceDescriptor, method: &MethodDescriptor) -> Result<String>;

    fn property_symbol(&self, interface: &InterfaceDescriptor, property: &PropertyDescriptor) -> Result<String>;
}

/// Decorates an entry point, e.g. for a calling convention.
pub trait EntrypointMangler: Send + Sync {
    fn is_applicable(&self, method: &MethodDescriptor) -> bool;

    fn mangle(&self, symbol: &str, method: &MethodDescriptor) -> String;

    fn demangle(&self, mangled: &str) -> String;
}

/// `_name@bytes` decoration of stdcall functions on 32-bit Windows.
pub struct StdCallMangler {
    enabled: bool,
}

impl Default for StdCallMangler {
    fn default() -> Self {
        StdCallMangler {
            enabled: cfg!(all(windows, target_pointer_width = "32")),
        }
    }
}

impl StdCallMangler {
    /// A mangler that applies regardless of the compilation target.
    pub fn always() -> Self {
        StdCallMangler { enabled: true }
    }
}

impl EntrypointMangler for StdCallMangler {
    fn is_applicable(&self, method: &MethodDescriptor) -> bool {
        self.enabled && method.convention == CallingConvention::StdCall
    }

    fn mangle(&self, symbol: &str, method: &MethodDescriptor) -> String {
        format!("_{symbol}@{}", method.argument_bytes())
    }

    fn demangle(&self, mangled: &str) -> String {
        mangled
            .strip_prefix('_')
            .unwrap_or(mangled)
            .split('@')
            .next()
            .unwrap_or_default()
            .to_string()
    }
}

/// Applies a case transformation to `prefix + symbol`.
pub fn transform(symbol: &str, prefix: &str, transformation: SymbolTransformation) -> String {
    let concatenated = format!("{prefix}{symbol}");
    match transformation {
        SymbolTransformation::None => concatenated,
        SymbolTransformation::Pascalize => concatenated.to_upper_camel_case(),
        SymbolTransformation::Camelize => concatenated.to_lower_camel_case(),
        SymbolTransformation::Underscore => concatenated.to_snake_case(),
        SymbolTransformation::Dasherize => concatenated.replace('_', "-"),
        SymbolTransformation::Kebaberize => concatenated.to_kebab_case(),
    }
}

/// Appends one suffix per type argument to the symbol of a generic method.
pub fn mangle_generic(symbol: &str, type_args: &[TypeDesc]) -> String {
    let mut name = symbol.to_string();
    for arg in type_args {
        let suffix = match arg {
            TypeDesc::F32 => "f",
            TypeDesc::F64 => "d",
            TypeDesc::I8 => "sb",
            TypeDesc::U8 => "b",
            TypeDesc::I16 => "s",
            TypeDesc::U16 => "su",
            TypeDesc::I32 => "i",
            TypeDesc::U32 => "iu",
            TypeDesc::I64 => "l",
            TypeDesc::U64 => "lu",
            TypeDesc::ISize if cfg!(target_pointer_width = "64") => "l",
            TypeDesc::USize if cfg!(target_pointer_width = "64") => "lu",
            TypeDesc::ISize => "i",
            TypeDesc::USize => "iu",
            TypeDesc::Struct(_) => "st",
            TypeDesc::Pointer => "v",
            _ => "",
        };
        name.push_str(suffix);
    }
    name
}

/// Explicit entry points first, then the interface's naming rule, then at
/// most one applicable mangler.
pub struct DefaultSymbolTransformer {
    manglers: Vec<Box<dyn EntrypointMangler>>,
}

impl Default for DefaultSymbolTransformer {
    fn default() -> Self {
        DefaultSymbolTransformer {
            manglers: vec![Box::new(StdCallMangler::default())],
        }
    }
}

impl DefaultSymbolTransformer {
    /// A transformer without any mangler.
    pub fn undecorated() -> Self {
        DefaultSymbolTransformer { manglers: vec![] }
    }

    pub fn with_mangler(mut self, mangler: impl EntrypointMangler + 'static) -> Self {
        self.manglers.push(Box::new(mangler));
        self
    }

    fn unmangled(interface: &InterfaceDescriptor, entry_point: &str) -> String {
        match &interface.native_symbols {
            Some(rule) => transform(entry_point, &rule.prefix, rule.transformation),
            None => entry_point.to_string(),
        }
    }
}

impl SymbolNameTransformer for DefaultSymbolTransformer {
    fn method_symbol(&self, interface: &InterfaceDescriptor, method: &MethodDescriptor) -> Result<String> {
        let entry_point = method.entry_point.as_deref().unwrap_or(&method.name);
        let symbol = Self::unmangled(interface, entry_point);
        let mut applicable = self.manglers.iter().filter(|m| m.is_applicable(method));
        match (applicable.next(), applicable.next()) {
            (None, _) => Ok(symbol),
            (Some(mangler), None) => Ok(mangler.mangle(&symbol, method)),
            (Some(_), Some(_)) => Err(Error::AmbiguousMangler {
                member: method.name.clone(),
            }),
        }
    }

    fn property_symbol(&self, interface: &InterfaceDescriptor, property: &PropertyDescriptor) -> Result<String> {
        let entry_point = property.entry_point.as_deref().unwrap_or(&property.name);
        Ok(Self::unmangled(interface, entry_point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::NativeSymbols;
    use crate::types::StructLayout;

    #[test]
    fn transformations() {
        assert_eq!(transform("test", "x", SymbolTransformation::None), "xtest");
        assert_eq!(transform("anExampleTitle", "", SymbolTransformation::Pascalize), "AnExampleTitle");
        assert_eq!(transform("WeeTitleStuff", "", SymbolTransformation::Camelize), "weeTitleStuff");
        assert_eq!(transform("someTestTitle", "", SymbolTransformation::Underscore), "some_test_title");
        assert_eq!(transform("A_test-Title", "", SymbolTransformation::Dasherize), "A-test-Title");
        assert_eq!(transform("SomeTitle", "", SymbolTransformation::Kebaberize), "some-title");
    }

    #[test]
    fn prefix_and_rule_apply_to_entry_points() {
        let iface = InterfaceDescriptor::builder("ILib")
            .native_symbols(NativeSymbols::new("lib_", SymbolTransformation::Underscore))
            .build();
        let t = DefaultSymbolTransformer::default();
        let m = MethodDescriptor::new("MultiplyValues");
        assert_eq!(t.method_symbol(&iface, &m).unwrap(), "lib_multiply_values");
        let m = MethodDescriptor::new("Ignored").entry_point("Explicit");
        assert_eq!(t.method_symbol(&iface, &m).unwrap(), "lib_explicit");
        let p = PropertyDescriptor::new("GlobalCount", TypeDesc::I32);
        assert_eq!(t.property_symbol(&iface, &p).unwrap(), "lib_global_count");
    }

    #[test]
    fn stdcall_decoration() {
        let iface = InterfaceDescriptor::builder("ILib").build();
        let t = DefaultSymbolTransformer::undecorated().with_mangler(StdCallMangler::always());
        let m = MethodDescriptor::new("Add")
            .convention(CallingConvention::StdCall)
            .param("a", TypeDesc::I32)
            .param("b", TypeDesc::I32);
        assert_eq!(t.method_symbol(&iface, &m).unwrap(), "_Add@8");
        let cdecl = MethodDescriptor::new("Add").param("a", TypeDesc::I32);
        assert_eq!(t.method_symbol(&iface, &cdecl).unwrap(), "Add");
        assert_eq!(StdCallMangler::always().demangle("_Add@8"), "Add");
    }

    #[test]
    fn ambiguous_manglers() {
        let iface = InterfaceDescriptor::builder("ILib").build();
        let t = DefaultSymbolTransformer { manglers: vec![] }
            .with_mangler(StdCallMangler::always())
            .with_mangler(StdCallMangler::always());
        let m = MethodDescriptor::new("Add").convention(CallingConvention::StdCall);
        assert!(matches!(
            t.method_symbol(&iface, &m),
            Err(Error::AmbiguousMangler { .. })
        ));
    }

    #[test]
    fn generic_suffixes() {
        let point = StructLayout::new("Point", [("x", TypeDesc::I32)]).unwrap();
        assert_eq!(mangle_generic("Add", &[TypeDesc::I32]), "Addi");
        assert_eq!(mangle_generic("Add", &[TypeDesc::U32, TypeDesc::F64]), "Addiud");
        assert_eq!(mangle_generic("Get", &[TypeDesc::Struct(point)]), "Getst");
        assert_eq!(mangle_generic("Get", &[TypeDesc::I8, TypeDesc::U8]), "Getsbb");
    }
}
