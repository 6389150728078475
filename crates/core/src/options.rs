use bitflags::bitflags;

bitflags! {
    /// Flags controlling how an implementation is generated. Every flag is
    /// part of the implementation identity key.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct ImplementationOptions: u32 {
        /// Resolve native symbols on first use instead of at construction.
        const USE_LAZY_BINDING = 1 << 0;
        /// Check for disposal before every native call.
        const GENERATE_DISPOSAL_CHECKS = 1 << 1;
        /// Allow library names to be remapped before resolution.
        const ENABLE_DLL_MAP_SUPPORT = 1 << 2;
        /// Call through raw function pointers instead of bound functions.
        const USE_INDIRECT_CALLS = 1 << 3;
        const ENABLE_OPTIMIZATIONS = 1 << 4;
        const SUPPRESS_SECURITY = 1 << 5;
    }
}

impl ImplementationOptions {
    /// The option set used by a default configured builder.
    pub const RECOMMENDED: Self = Self::GENERATE_DISPOSAL_CHECKS
        .union(Self::ENABLE_DLL_MAP_SUPPORT)
        .union(Self::ENABLE_OPTIMIZATIONS)
        .union(Self::SUPPRESS_SECURITY);
}

impl Default for ImplementationOptions {
    fn default() -> Self {
        Self::RECOMMENDED
    }
}

bitflags! {
    /// Classification of a pipeline stage, used to order stages.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GeneratorComplexity: u32 {
        /// Applicability depends on the member's signature.
        const MEMBER_DEPENDENT = 1 << 0;
        /// Applicability depends on the active options.
        const OPTION_DEPENDENT = 1 << 1;
        const TRANSFORMS_PARAMETERS = 1 << 2;
        const CREATES_TYPES = 1 << 3;
        const DEFERRED_IMPLEMENTATION = 1 << 4;
        /// The stage performs the native call and ends the chain.
        const TERMINATING = 1 << 5;
    }
}

impl GeneratorComplexity {
    /// Number of set flags, not counting `TERMINATING`.
    pub fn score(self) -> u32 {
        self.difference(Self::TERMINATING).bits().count_ones()
    }

    pub fn is_terminating(self) -> bool {
        self.contains(Self::TERMINATING)
    }
}
