use std::sync::Arc;

use crate::{
    cache::ResolutionCache,
    classfile::{ConstantPool, MethodCode},
};

/// A loaded class awaiting (or having completed) preparation.
///
/// The constant pool is shared with the resolution cache once one is installed. A class either
/// has no cache and carries its original bytecode, or has exactly one cache and carries rewritten
/// bytecode whose operands index that cache.
#[derive(Debug)]
pub struct LoadedClass {
    name: String,
    pool: Arc<ConstantPool>,
    methods: Vec<MethodCode>,
    cache: Option<ResolutionCache>,
}

impl LoadedClass {
    /// Create a class from its name, constant pool and methods
    pub fn new(name: impl Into<String>, pool: ConstantPool, methods: Vec<MethodCode>) -> Self {
        LoadedClass {
            name: name.into(),
            pool: Arc::new(pool),
            methods,
            cache: None,
        }
    }

    /// Internal name of the class, e.g. `java/lang/Object`
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The constant pool
    #[must_use]
    pub fn pool(&self) -> &Arc<ConstantPool> {
        &self.pool
    }

    /// The methods of this class
    #[must_use]
    pub fn methods(&self) -> &[MethodCode] {
        &self.methods
    }

    /// Mutable access to the methods, used by later preparation steps
    pub fn methods_mut(&mut self) -> &mut [MethodCode] {
        &mut self.methods
    }

    /// Look up a method by name and descriptor
    #[must_use]
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodCode> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// The installed resolution cache, if the class has been rewritten
    #[must_use]
    pub fn cache(&self) -> Option<&ResolutionCache> {
        self.cache.as_ref()
    }

    /// Exclusive access to the resolution cache, for redefinition and archiving
    pub fn cache_mut(&mut self) -> Option<&mut ResolutionCache> {
        self.cache.as_mut()
    }

    /// True once bytecode has been rewritten and a cache installed
    #[must_use]
    pub fn is_rewritten(&self) -> bool {
        self.cache.is_some()
    }

    pub(crate) fn install_cache(&mut self, cache: ResolutionCache) {
        self.cache = Some(cache);
    }

    pub(crate) fn detach_cache(&mut self) -> Option<ResolutionCache> {
        self.cache.take()
    }
}
