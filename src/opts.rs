use dlbind_core::ImplementationOptions;

use crate::builder::NativeLibraryBuilder;

#[derive(Default, Debug, Clone)]
#[cfg_attr(feature = "clap", derive(clap::Args))]
pub struct Opts {
    /// Resolve native symbols on first use instead of at activation
    #[cfg_attr(feature = "clap", arg(long, default_value_t = bool::default()))]
    pub lazy_binding: bool,
    /// Fail calls on disposed instances
    #[cfg_attr(feature = "clap", arg(long, default_value_t = bool::default()))]
    pub disposal_checks: bool,
    /// Allow library names to be remapped before resolution
    #[cfg_attr(feature = "clap", arg(long, default_value_t = bool::default()))]
    pub dll_map: bool,
    /// Call through raw function pointers
    #[cfg_attr(feature = "clap", arg(long, default_value_t = bool::default()))]
    pub indirect_calls: bool,
    /// Request optimized implementations; kept apart in the implementation cache
    #[cfg_attr(feature = "clap", arg(long, default_value_t = bool::default()))]
    pub optimizations: bool,
    /// Skip native security checks; kept apart in the implementation cache
    #[cfg_attr(feature = "clap", arg(long, default_value_t = bool::default()))]
    pub suppress_security: bool,
}

impl Opts {
    pub fn options(&self) -> ImplementationOptions {
        let mut options = ImplementationOptions::empty();
        options.set(ImplementationOptions::USE_LAZY_BINDING, self.lazy_binding);
        options.set(ImplementationOptions::GENERATE_DISPOSAL_CHECKS, self.disposal_checks);
        options.set(ImplementationOptions::ENABLE_DLL_MAP_SUPPORT, self.dll_map);
        options.set(ImplementationOptions::USE_INDIRECT_CALLS, self.indirect_calls);
        options.set(ImplementationOptions::ENABLE_OPTIMIZATIONS, self.optimizations);
        options.set(ImplementationOptions::SUPPRESS_SECURITY, self.suppress_security);
        options
    }

    pub fn build(&self) -> NativeLibraryBuilder {
        NativeLibraryBuilder::new(self.options())
    }
}

impl From<ImplementationOptions> for Opts {
    fn from(options: ImplementationOptions) -> Self {
        Opts {
            lazy_binding: options.contains(ImplementationOptions::USE_LAZY_BINDING),
            disposal_checks: options.contains(ImplementationOptions::GENERATE_DISPOSAL_CHECKS),
            dll_map: options.contains(ImplementationOptions::ENABLE_DLL_MAP_SUPPORT),
            indirect_calls: options.contains(ImplementationOptions::USE_INDIRECT_CALLS),
            optimizations: options.contains(ImplementationOptions::ENABLE_OPTIMIZATIONS),
            suppress_security: options.contains(ImplementationOptions::SUPPRESS_SECURITY),
        }
    }
}
