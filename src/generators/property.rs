use dlbind_core::{
    layout, Error, ImplementationOptions, PropertyDescriptor, Result, TypeDesc, Value,
};

use crate::implementation::ArtifactBuilder;
use crate::library::NativeLibrary;

/// Getter and setter of a native global variable.
pub(crate) struct NativeProperty {
    name: String,
    ty: TypeDesc,
    symbol: usize,
    can_read: bool,
    can_write: bool,
    disposal_checks: bool,
}

impl NativeProperty {
    pub fn get(&self, library: &NativeLibrary) -> Result<Value> {
        if !self.can_read {
            return Err(Error::argument_mismatch(&self.name, "property is write-only"));
        }
        if self.disposal_checks {
            library.ensure_not_disposed()?;
        }
        let address = library.symbol(self.symbol)?;
        // SAFETY: the symbol names a global of the declared type.
        unsafe { layout::read(&self.ty, address as *const u8) }
    }

    pub fn set(&self, library: &NativeLibrary, value: &Value) -> Result<()> {
        if !self.can_write {
            return Err(Error::argument_mismatch(&self.name, "property is read-only"));
        }
        if self.disposal_checks {
            library.ensure_not_disposed()?;
        }
        let address = library.symbol(self.symbol)?;
        // SAFETY: as for `get`; the caller checked `value` against the type.
        unsafe { layout::write(&self.ty, value, address as *mut u8) }
    }
}

/// The property pipeline's only stage.
pub(crate) struct PropertyGenerator;

impl PropertyGenerator {
    pub fn is_applicable(&self, property: &PropertyDescriptor) -> bool {
        property.ty.is_blittable()
    }

    pub fn generate(
        &self,
        property: &PropertyDescriptor,
        symbol: &str,
        options: ImplementationOptions,
        artifact: &mut ArtifactBuilder,
    ) -> Result<NativeProperty> {
        if !self.is_applicable(property) {
            return Err(Error::UnsupportedType {
                member: property.name.clone(),
                ty: property.ty.clone(),
            });
        }
        Ok(NativeProperty {
            name: property.name.clone(),
            ty: property.ty.clone(),
            symbol: artifact.symbol(symbol),
            can_read: property.can_read,
            can_write: property.can_write,
            disposal_checks: options.contains(ImplementationOptions::GENERATE_DISPOSAL_CHECKS),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_values_with_a_layout_are_supported() {
        let mut artifact = ArtifactBuilder::default();
        let ok = PropertyDescriptor::new("Count", TypeDesc::I32);
        assert!(PropertyGenerator
            .generate(&ok, "count", ImplementationOptions::empty(), &mut artifact)
            .is_ok());
        let bad = PropertyDescriptor::new("Name", TypeDesc::String);
        assert!(matches!(
            PropertyGenerator.generate(&bad, "name", ImplementationOptions::empty(), &mut artifact),
            Err(Error::UnsupportedType { .. })
        ));
    }
}
