use std::sync::Arc;

use anyhow::Result;
use dlbind::{
    BaseType, Error, ImplementationCache, ImplementationOptions, InterfaceDescriptor,
    MethodDescriptor, NativeSymbols, PropertyDescriptor, SymbolNameTransformer,
    SymbolTransformation, TypeDesc, Value,
};

mod common;

use common::{builder, library_path, TestLibrary};

extern "C" fn multiply(a: i32, b: i32) -> i32 {
    a * b
}

extern "C" fn add(a: i32, b: i32) -> i32 {
    a + b
}

extern "C" fn scale(v: f64, by: f64) -> f64 {
    v * by
}

fn calculator() -> Arc<InterfaceDescriptor> {
    InterfaceDescriptor::builder("ICalculator")
        .method(
            MethodDescriptor::new("Multiply")
                .param("a", TypeDesc::I32)
                .param("b", TypeDesc::I32)
                .returns(TypeDesc::I32),
        )
        .build()
}

fn calculator_library() -> Arc<TestLibrary> {
    TestLibrary::new([("Multiply", multiply as usize), ("Add", add as usize)])
}

#[test]
fn multiplies_through_native_code() -> Result<()> {
    common::init();
    let lib = calculator_library();
    let instance = builder(&lib, ImplementationOptions::default()).activate_interface(&library_path(), &calculator())?;
    assert_eq!(instance.invoke("Multiply", vec![5.into(), 5.into()])?, Value::I32(25));
    assert!(instance.type_name().starts_with("Calculator_"));
    assert_eq!(lib.opened(), 1);
    Ok(())
}

#[test]
fn arguments_are_checked() -> Result<()> {
    let lib = calculator_library();
    let instance = builder(&lib, ImplementationOptions::default()).activate_interface(&library_path(), &calculator())?;
    assert!(matches!(
        instance.invoke("Multiply", vec![5.into()]),
        Err(Error::ArgumentMismatch { .. })
    ));
    assert!(matches!(
        instance.invoke("Multiply", vec![5i64.into(), 5.into()]),
        Err(Error::ArgumentMismatch { .. })
    ));
    assert!(matches!(
        instance.invoke("Divide", vec![]),
        Err(Error::UnknownMember { .. })
    ));
    Ok(())
}

#[test]
fn same_key_same_type() -> Result<()> {
    let lib = calculator_library();
    let builder = builder(&lib, ImplementationOptions::default());
    let iface = calculator();
    let path = library_path();

    let first = builder.activate_interface(&path, &iface)?;
    let second = builder.activate_interface(&path, &iface)?;
    assert_eq!(first.implementation_type(), second.implementation_type());
    assert!(Arc::ptr_eq(first.implementation(), second.implementation()));

    // Every component of the key matters.
    let lazy = builder
        .clone()
        .with_options(ImplementationOptions::default() | ImplementationOptions::USE_LAZY_BINDING)
        .activate_interface(&path, &iface)?;
    assert_ne!(first.implementation_type(), lazy.implementation_type());

    let other_file = tempfile::NamedTempFile::new()?;
    let elsewhere = builder.activate_interface(&other_file.path().to_string_lossy(), &iface)?;
    assert_ne!(first.implementation_type(), elsewhere.implementation_type());

    let other_iface = builder.activate_interface(&path, &calculator())?;
    assert_ne!(first.implementation_type(), other_iface.implementation_type());

    let base = BaseType::builder("CalculatorBase").build();
    let derived = builder.activate_class(&path, &base, &[iface.clone()])?;
    assert_ne!(first.implementation_type(), derived.implementation_type());
    assert!(derived.type_name().starts_with("CalculatorBase_"));
    Ok(())
}

#[test]
fn concurrent_activation_builds_once() -> Result<()> {
    let lib = calculator_library();
    let cache = Arc::new(ImplementationCache::new());
    let builder = builder(&lib, ImplementationOptions::default()).with_cache(cache.clone());
    let iface = calculator();
    let path = library_path();

    let types = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| builder.activate_interface(&path, &iface).map(|i| i.implementation_type())))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect::<Result<Vec<_>, _>>()
    })?;
    assert!(types.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(cache.len(), 1);
    Ok(())
}

/// Binds every method to `Add`.
struct EverythingAdds;

impl SymbolNameTransformer for EverythingAdds {
    fn method_symbol(&self, _: &InterfaceDescriptor, _: &MethodDescriptor) -> dlbind::Result<String> {
        Ok("Add".to_string())
    }

    fn property_symbol(&self, _: &InterfaceDescriptor, property: &PropertyDescriptor) -> dlbind::Result<String> {
        Ok(property.name.clone())
    }
}

#[test]
fn symbol_transformers_do_not_leak_through_a_shared_cache() -> Result<()> {
    let lib = calculator_library();
    let cache = Arc::new(ImplementationCache::new());
    let iface = calculator();
    let path = library_path();

    let adding = builder(&lib, ImplementationOptions::default())
        .with_cache(cache.clone())
        .with_symbol_transformer(Arc::new(EverythingAdds))
        .activate_interface(&path, &iface)?;
    let plain = builder(&lib, ImplementationOptions::default())
        .with_cache(cache.clone())
        .activate_interface(&path, &iface)?;

    assert_eq!(adding.invoke("Multiply", vec![5.into(), 5.into()])?, Value::I32(10));
    assert_eq!(plain.invoke("Multiply", vec![5.into(), 5.into()])?, Value::I32(25));
    assert_ne!(adding.implementation_type(), plain.implementation_type());
    assert_eq!(cache.len(), 2);

    // Default builders still share.
    let again = builder(&lib, ImplementationOptions::default())
        .with_cache(cache.clone())
        .activate_interface(&path, &iface)?;
    assert_eq!(again.implementation_type(), plain.implementation_type());
    assert_eq!(cache.len(), 2);
    Ok(())
}

#[test]
fn eager_binding_reports_missing_symbols() {
    let lib = TestLibrary::new([("Multiply", multiply as usize)]);
    let iface = InterfaceDescriptor::builder("IMissing")
        .method(MethodDescriptor::new("Missing").returns(TypeDesc::I32))
        .build();
    let err = builder(&lib, ImplementationOptions::default())
        .activate_interface(&library_path(), &iface)
        .unwrap_err();
    assert!(matches!(&err, Error::SymbolLoading { symbol, .. } if symbol == "Missing"));
    assert!(err.is_resolution());
    // The handle opened for the failed instance is released again.
    assert_eq!(lib.opened(), 1);
    assert_eq!(lib.closed(), 1);
}

#[test]
fn lazy_binding_retries_failed_resolution() -> Result<()> {
    let lib = calculator_library();
    let iface = InterfaceDescriptor::builder("ILate")
        .method(
            MethodDescriptor::new("Late")
                .param("a", TypeDesc::I32)
                .param("b", TypeDesc::I32)
                .returns(TypeDesc::I32),
        )
        .build();
    let options = ImplementationOptions::default() | ImplementationOptions::USE_LAZY_BINDING;
    let instance = builder(&lib, options).activate_interface(&library_path(), &iface)?;
    assert_eq!(lib.lookups("Late"), 0);

    let args = || vec![Value::I32(2), Value::I32(3)];
    assert!(matches!(instance.invoke("Late", args()), Err(Error::SymbolLoading { .. })));
    lib.define("Late", add as usize);
    assert_eq!(instance.invoke("Late", args())?, Value::I32(5));
    assert_eq!(instance.invoke("Late", args())?, Value::I32(5));
    assert_eq!(lib.lookups("Late"), 2);
    Ok(())
}

#[test]
fn missing_library() {
    let lib = calculator_library();
    let err = builder(&lib, ImplementationOptions::default())
        .activate_interface("/nonexistent/dir/libnothing.so", &calculator())
        .unwrap_err();
    assert!(matches!(err, Error::LibraryNotFound { .. }));
    assert_eq!(lib.opened(), 0);
}

#[test]
fn type_system_errors() {
    let lib = calculator_library();
    let builder = builder(&lib, ImplementationOptions::default());
    let path = library_path();
    assert!(matches!(
        builder.activate_interfaces(&path, &[]),
        Err(Error::NoInterfaces)
    ));
    let class = InterfaceDescriptor::builder("Calculator").class().build();
    assert!(matches!(
        builder.activate_interface(&path, &class),
        Err(Error::NotAnInterface { .. })
    ));
    let concrete = BaseType::builder("Sealed").concrete().build();
    assert!(matches!(
        builder.activate_class(&path, &concrete, &[calculator()]),
        Err(Error::BaseNotAbstract { .. })
    ));
    assert_eq!(lib.opened(), 0);
}

#[test]
fn indirect_calls() -> Result<()> {
    let lib = calculator_library();
    for options in [
        ImplementationOptions::USE_INDIRECT_CALLS,
        ImplementationOptions::USE_INDIRECT_CALLS | ImplementationOptions::USE_LAZY_BINDING,
    ] {
        let instance = builder(&lib, options).activate_interface(&library_path(), &calculator())?;
        assert_eq!(instance.invoke("Multiply", vec![6.into(), 7.into()])?, Value::I32(42));
    }
    Ok(())
}

#[test]
fn inherited_members() -> Result<()> {
    let lib = TestLibrary::new([
        ("Multiply", multiply as usize),
        ("Add", add as usize),
        ("Scale", scale as usize),
    ]);
    let parent = calculator();
    let child = InterfaceDescriptor::builder("IScientific")
        .extends(&parent)
        .method(
            MethodDescriptor::new("Scale")
                .param("v", TypeDesc::F64)
                .param("by", TypeDesc::F64)
                .returns(TypeDesc::F64),
        )
        .build();
    let instance = builder(&lib, ImplementationOptions::default()).activate_interface(&library_path(), &child)?;
    assert_eq!(instance.invoke("Multiply", vec![3.into(), 4.into()])?, Value::I32(12));
    assert_eq!(instance.invoke("Scale", vec![1.5f64.into(), 4.0f64.into()])?, Value::F64(6.0));
    Ok(())
}

#[test]
fn duplicate_members_fold() -> Result<()> {
    let lib = TestLibrary::new([("Multiply", multiply as usize), ("multiply_alt", add as usize)]);
    let first = calculator();
    let second = InterfaceDescriptor::builder("ITimes")
        .method(
            MethodDescriptor::new("Multiply")
                .param("x", TypeDesc::I32)
                .param("y", TypeDesc::I32)
                .returns(TypeDesc::I32),
        )
        .build();
    let instance = builder(&lib, ImplementationOptions::default())
        .activate_interfaces(&library_path(), &[first.clone(), second])?;
    assert_eq!(instance.implementation().method_names().collect::<Vec<_>>(), ["Multiply"]);
    assert_eq!(instance.implementation().symbols(), ["Multiply"]);

    // A different entry point keeps both, the second under a qualified name.
    let other = InterfaceDescriptor::builder("IAlt")
        .method(
            MethodDescriptor::new("Multiply")
                .param("x", TypeDesc::I32)
                .param("y", TypeDesc::I32)
                .returns(TypeDesc::I32)
                .entry_point("multiply_alt"),
        )
        .build();
    let instance = builder(&lib, ImplementationOptions::default()).activate_interfaces(&library_path(), &[first, other])?;
    assert_eq!(
        instance.implementation().method_names().collect::<Vec<_>>(),
        ["Multiply", "IAlt.Multiply"]
    );
    assert_eq!(instance.invoke("IAlt.Multiply", vec![3.into(), 4.into()])?, Value::I32(7));
    Ok(())
}

#[test]
fn native_symbol_rules() -> Result<()> {
    let lib = TestLibrary::new([("calc_multiply_values", multiply as usize)]);
    let iface = InterfaceDescriptor::builder("ICalc")
        .native_symbols(NativeSymbols::new("calc_", SymbolTransformation::Underscore))
        .method(
            MethodDescriptor::new("MultiplyValues")
                .param("a", TypeDesc::I32)
                .param("b", TypeDesc::I32)
                .returns(TypeDesc::I32),
        )
        .build();
    let instance = builder(&lib, ImplementationOptions::default()).activate_interface(&library_path(), &iface)?;
    assert_eq!(instance.implementation().symbols(), ["calc_multiply_values"]);
    assert_eq!(instance.invoke("MultiplyValues", vec![2.into(), 21.into()])?, Value::I32(42));
    Ok(())
}

#[test]
fn library_names_can_be_remapped() -> Result<()> {
    let lib = calculator_library();
    let path = library_path();
    let target = path.clone();
    let instance = builder(&lib, ImplementationOptions::default())
        .with_library_remapper(Arc::new(move |name: &str| (name == "calculator").then(|| target.clone())))
        .activate_interface("calculator", &calculator())?;
    assert_eq!(instance.library_path(), std::fs::canonicalize(&path)?);
    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn system_libc() -> Result<()> {
    common::init();
    let iface = InterfaceDescriptor::builder("ILibc")
        .method(MethodDescriptor::new("abs").param("v", TypeDesc::I32).returns(TypeDesc::I32))
        .method(MethodDescriptor::new("strlen").param("s", TypeDesc::String).returns(TypeDesc::USize))
        .build();
    let builder = dlbind::NativeLibraryBuilder::default().with_cache(Arc::new(ImplementationCache::new()));
    let instance = match builder.activate_interface("libc.so.6", &iface) {
        Ok(instance) => instance,
        Err(e @ Error::LibraryNotFound { .. }) => {
            eprintln!("skipping: {e}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    assert_eq!(instance.invoke("abs", vec![(-17).into()])?, Value::I32(17));
    assert_eq!(instance.invoke("strlen", vec!["hello".into()])?, Value::USize(5));
    Ok(())
}
