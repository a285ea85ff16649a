//! Memoizing wrappers around resolution backends.
//!
//! Lookups go through a `DashMap`: a hit is served from the shard under a read lock,
//! a miss is computed without holding any lock and then inserted if still absent.
//! Two threads missing on the same key compute the same answer twice; the first
//! insertion wins and both return equal values. Negative answers are cached too.

use std::{collections::BTreeMap, sync::Arc};

use dashmap::DashMap;

use crate::resolve::{ClassInfo, ConstantResolver, InheritanceChecker, ResolvedConstant};

/// A [`ConstantResolver`] that remembers every answer of the wrapped resolver.
pub struct CachedConstantResolver<R> {
    inner: R,
    constants: DashMap<(String, String), Option<ResolvedConstant>>,
    classes: DashMap<String, Option<Arc<BTreeMap<String, ResolvedConstant>>>>,
}

impl<R: ConstantResolver> CachedConstantResolver<R> {
    /// Wraps `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            constants: DashMap::new(),
            classes: DashMap::new(),
        }
    }

    /// Returns the wrapped resolver.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Number of cached single-constant answers.
    pub fn cached_len(&self) -> usize {
        self.constants.len()
    }
}

impl<R: ConstantResolver> ConstantResolver for CachedConstantResolver<R> {
    fn resolve(&self, owner: &str, name: &str) -> Option<ResolvedConstant> {
        let key = (owner.to_string(), name.to_string());
        if let Some(cached) = self.constants.get(&key) {
            return cached.clone();
        }

        let computed = self.inner.resolve(owner, name);
        self.constants.entry(key).or_insert(computed).clone()
    }

    fn all_constants(&self, owner: &str) -> Option<BTreeMap<String, ResolvedConstant>> {
        if let Some(cached) = self.classes.get(owner) {
            return cached.as_deref().cloned();
        }

        let computed = self.inner.all_constants(owner).map(Arc::new);
        self.classes
            .entry(owner.to_string())
            .or_insert(computed)
            .as_deref()
            .cloned()
    }
}

/// An [`InheritanceChecker`] that remembers every class info and assignability answer
/// of the wrapped checker.
pub struct CachedInheritanceChecker<C> {
    inner: C,
    infos: DashMap<String, Option<Arc<ClassInfo>>>,
    assignable: DashMap<(String, String), bool>,
}

impl<C: InheritanceChecker> CachedInheritanceChecker<C> {
    /// Wraps `inner`.
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            infos: DashMap::new(),
            assignable: DashMap::new(),
        }
    }

    /// Returns the wrapped checker.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: InheritanceChecker> InheritanceChecker for CachedInheritanceChecker<C> {
    fn class_info(&self, name: &str) -> Option<Arc<ClassInfo>> {
        if let Some(cached) = self.infos.get(name) {
            return cached.clone();
        }

        let computed = self.inner.class_info(name);
        self.infos
            .entry(name.to_string())
            .or_insert(computed)
            .clone()
    }

    fn is_assignable_from(&self, target: &str, source: &str) -> bool {
        let key = (target.to_string(), source.to_string());
        if let Some(cached) = self.assignable.get(&key) {
            return *cached;
        }

        // Walk through `self` so the supertype infos land in the cache as well.
        let computed = default_is_assignable_from(self, target, source);
        *self.assignable.entry(key).or_insert(computed)
    }
}

/// Runs the trait's default assignability walk against `checker`.
fn default_is_assignable_from<C: InheritanceChecker>(
    checker: &CachedInheritanceChecker<C>,
    target: &str,
    source: &str,
) -> bool {
    struct Uncached<'a, C>(&'a CachedInheritanceChecker<C>);

    impl<C: InheritanceChecker> InheritanceChecker for Uncached<'_, C> {
        fn class_info(&self, name: &str) -> Option<Arc<ClassInfo>> {
            self.0.class_info(name)
        }
    }

    Uncached(checker).is_assignable_from(target, source)
}
