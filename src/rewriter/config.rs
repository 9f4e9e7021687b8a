/// Tunables for [`crate::rewriter::rewrite`].
///
/// The configuration is passed explicitly into every rewrite; nothing is read from global state.
///
/// # Examples
///
/// ```rust
/// use classlink::rewriter::RewriterConfig;
///
/// let config = RewriterConfig {
///     binary_switch_threshold: 8,
///     ..RewriterConfig::default()
/// };
/// assert_eq!(config.root_class_name, "java/lang/Object");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriterConfig {
    /// `lookupswitch` instructions with fewer pairs than this become `fast_linearswitch`,
    /// the rest `fast_binaryswitch`
    pub binary_switch_threshold: usize,
    /// Internal name of the class whose `<init>` registers finalizers
    pub root_class_name: String,
    /// Rewrite `return` in the root class constructor to `return_register_finalizer`
    pub register_finalizers_at_init: bool,
    /// Rewrite `invokevirtual` of signature-polymorphic methods to `invokehandle`
    pub rewrite_invokehandle: bool,
    /// Upper bound in bytes for the assembled resolution cache, `None` for unlimited
    pub metadata_limit: Option<usize>,
}

impl RewriterConfig {
    /// The default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaves signature-polymorphic calls and the root constructor untouched, for runtimes
    /// without method-handle intrinsics or finalization
    #[must_use]
    pub fn without_intrinsics() -> Self {
        RewriterConfig {
            register_finalizers_at_init: false,
            rewrite_invokehandle: false,
            ..Self::default()
        }
    }
}

impl Default for RewriterConfig {
    fn default() -> Self {
        RewriterConfig {
            binary_switch_threshold: 5,
            root_class_name: "java/lang/Object".to_string(),
            register_finalizers_at_init: true,
            rewrite_invokehandle: true,
            metadata_limit: None,
        }
    }
}
