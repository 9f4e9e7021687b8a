use std::{sync::Arc, thread};

use crate::{
    bytecode::{instructions::name, opcodes},
    cache::{ErrorKey, FieldEntryFlags, ResolutionCache, ResolvedField, ResolvedMethod},
    classfile::ConstantTag,
    resolution::{CallSiteLink, LinkResolver, LinkageError, LinkageErrorKind, ObjectRef},
    Error, Result,
};

/// Holds the claim on a call site while its bootstrap runs. Dropping it wakes every waiter,
/// and withdraws the claim unless the outcome was already published.
struct SiteClaim<'a> {
    cache: &'a ResolutionCache,
    row: u32,
    released: bool,
}

impl Drop for SiteClaim<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Ok(mut state) = self.cache.linking.lock() {
                state.in_progress.remove(&self.row);
            }
        }
        self.cache.linked.notify_all();
    }
}

impl ResolutionCache {
    /// Probe field row `row` for `bytecode` without resolving
    #[must_use]
    pub fn probe_field(&self, row: u16, bytecode: u8) -> Option<ResolvedField> {
        self.field_entry(usize::from(row))?.probe(bytecode)
    }

    /// Resolve field row `row` for the access instruction `bytecode`.
    ///
    /// Static fields of a class that has not finished initialisation are returned but not
    /// published, so the access resolves again until initialisation completes. The put opcode is
    /// only published for non-final fields and for final updates the resolver allows.
    ///
    /// # Errors
    /// Returns [`Error::Linkage`] from the resolver, or when a static access meets an instance
    /// field (and vice versa). Such errors are not cached.
    pub fn resolve_field<R>(&self, row: u16, bytecode: u8, resolver: &R) -> Result<ResolvedField>
    where
        R: LinkResolver + ?Sized,
    {
        let entry = self.field_entry(usize::from(row)).ok_or(Error::OutOfBounds)?;
        let is_static_access = match bytecode {
            opcodes::GETSTATIC | opcodes::PUTSTATIC => true,
            opcodes::GETFIELD | opcodes::PUTFIELD => false,
            other => {
                return Err(Error::InvariantViolation(format!(
                    "{} is not a field access",
                    name(other)
                )))
            }
        };

        if let Some(resolved) = entry.probe(bytecode) {
            return Ok(resolved);
        }

        let cp_index = entry.constant_pool_index();
        let link = resolver.resolve_field(self.pool(), cp_index, bytecode)?;
        if link.is_static != is_static_access {
            return Err(linkage_error!(
                IncompatibleClassChange,
                "Expected {} field for {} at #{}",
                if is_static_access { "static" } else { "non-static" },
                name(bytecode),
                cp_index
            ));
        }

        let is_put = matches!(bytecode, opcodes::PUTFIELD | opcodes::PUTSTATIC);
        let (get_code, put_code) = if link.is_static && !link.holder_initialized {
            (None, None)
        } else if link.is_static {
            let put = !link.is_final || (is_put && link.final_update_allowed);
            (Some(opcodes::GETSTATIC), put.then_some(opcodes::PUTSTATIC))
        } else {
            let put = !link.is_final || (is_put && link.final_update_allowed);
            (Some(opcodes::GETFIELD), put.then_some(opcodes::PUTFIELD))
        };

        entry.fill_in(&link, get_code, put_code);
        log::trace!(
            "resolved field #{} for {} (get={:?}, put={:?})",
            cp_index,
            name(bytecode),
            get_code.map(name),
            put_code.map(name)
        );

        let mut flags = FieldEntryFlags::empty();
        flags.set(FieldEntryFlags::FINAL, link.is_final);
        flags.set(FieldEntryFlags::VOLATILE, link.is_volatile);
        Ok(ResolvedField {
            holder: link.holder,
            offset: link.offset,
            field_index: link.field_index,
            result_type: link.result_type,
            flags,
        })
    }

    /// Probe method row `row` for `bytecode` without resolving
    #[must_use]
    pub fn probe_method(&self, row: u16, bytecode: u8) -> Option<ResolvedMethod> {
        self.method_entry(usize::from(row))?.probe(bytecode)
    }

    /// The appendix published for an `invokehandle` row, if any
    #[must_use]
    pub fn method_appendix(&self, row: u16) -> Option<&ObjectRef> {
        let slot = self.method_entry(usize::from(row))?.appendix_slot()?;
        self.references.get(usize::from(slot))
    }

    /// Resolve method row `row` for the invoke instruction `bytecode`.
    ///
    /// # Errors
    /// Returns [`Error::Linkage`] from the resolver (not cached) and
    /// [`Error::InvariantViolation`] if the resolver's target does not fit the instruction.
    pub fn resolve_method<R>(&self, row: u16, bytecode: u8, resolver: &R) -> Result<ResolvedMethod>
    where
        R: LinkResolver + ?Sized,
    {
        let entry = self
            .method_entry(usize::from(row))
            .ok_or(Error::OutOfBounds)?;
        if let Some(resolved) = entry.probe(bytecode) {
            return Ok(resolved);
        }

        let cp_index = entry.constant_pool_index();
        match bytecode {
            opcodes::INVOKEHANDLE => {
                let link = resolver.resolve_invokehandle(self.pool(), cp_index)?;

                let guard = lock!(self.linking)?;
                if entry.probe(bytecode).is_none() {
                    let has_appendix = link.appendix.is_some();
                    if let Some(appendix) = link.appendix {
                        let slot = entry.appendix_slot().ok_or_else(|| {
                            Error::InvariantViolation(format!(
                                "invokehandle of method #{} has no appendix slot",
                                cp_index
                            ))
                        })?;
                        self.references.set_if_empty(usize::from(slot), appendix);
                    }
                    entry.fill_in_handle(&link.adapter, has_appendix);
                }
                drop(guard);
            }
            opcodes::INVOKEVIRTUAL
            | opcodes::INVOKESPECIAL
            | opcodes::INVOKESTATIC
            | opcodes::INVOKEINTERFACE => {
                let link = resolver.resolve_method(self.pool(), cp_index, bytecode)?;
                entry.fill_in(bytecode, &link)?;
            }
            other => {
                return Err(Error::InvariantViolation(format!(
                    "{} is not an invoke",
                    name(other)
                )))
            }
        }

        entry.probe(bytecode).ok_or_else(|| {
            Error::InvariantViolation(format!(
                "method #{} not published for {}",
                cp_index,
                name(bytecode)
            ))
        })
    }

    /// Probe call site `row` without linking.
    ///
    /// Returns `None` while the site is unlinked, the adapter and appendix once linked, and the
    /// cached error once linking has failed.
    #[must_use]
    pub fn probe_invokedynamic(&self, row: u32) -> Option<Result<CallSiteLink>> {
        let entry = self.indy_entry(usize::try_from(row).ok()?)?;
        if let Some(adapter) = entry.adapter() {
            let appendix = if entry.has_appendix() {
                self.references
                    .get(usize::from(entry.resolved_references_index()))
                    .cloned()
            } else {
                None
            };
            return Some(Ok(CallSiteLink {
                adapter: adapter.clone(),
                appendix,
            }));
        }

        if entry.resolution_failed() {
            return Some(Err(match self.cached_error(ErrorKey::CallSite(row)) {
                Some(error) => Error::Linkage(error),
                None => Error::InvariantViolation(format!(
                    "call site {} failed without a recorded error",
                    row
                )),
            }));
        }

        None
    }

    /// Link invokedynamic call site `row`.
    ///
    /// Concurrent callers wait for the thread that claimed the site, so for plain callers the
    /// bootstrap runs once. A caller that is itself running another site's bootstrap never
    /// waits: it runs this site's bootstrap too, and the first outcome published wins. Every
    /// caller, now and later, observes the same adapter and appendix or the same cached
    /// [`LinkageError`] instance.
    ///
    /// # Errors
    /// Returns the site's cached [`Error::Linkage`] if linking failed, a fresh linkage error for
    /// recursive linking of a site by the thread already linking it, and [`Error::LockError`]
    /// if the critical section is poisoned.
    pub fn resolve_invokedynamic<R>(&self, row: u32, resolver: &R) -> Result<CallSiteLink>
    where
        R: LinkResolver + ?Sized,
    {
        let entry = usize::try_from(row)
            .ok()
            .and_then(|index| self.indy_entry(index))
            .ok_or(Error::OutOfBounds)?;
        if let Some(outcome) = self.probe_invokedynamic(row) {
            return outcome;
        }

        let me = thread::current().id();
        let claimed = {
            let mut state = lock!(self.linking)?;
            loop {
                if entry.is_resolved() || entry.resolution_failed() {
                    drop(state);
                    return self.linked_outcome(row);
                }

                match state.in_progress.get(&row).copied() {
                    None => {
                        state.in_progress.insert(row, me);
                        break true;
                    }
                    Some(owner) if owner == me => {
                        return Err(linkage_error!(
                            BootstrapMethod,
                            "recursive linkage of call site {} (#{})",
                            row,
                            entry.constant_pool_index()
                        ));
                    }
                    // inside another bootstrap: link without a claim and race to publish
                    Some(_) if state.in_progress.values().any(|owner| *owner == me) => {
                        break false;
                    }
                    Some(_) => state = wait!(self.linked, state)?,
                }
            }
        };

        let mut claim = claimed.then_some(SiteClaim {
            cache: self,
            row,
            released: false,
        });
        let outcome = resolver.resolve_invokedynamic(self.pool(), entry.constant_pool_index(), row);

        {
            let mut state = lock!(self.linking)?;
            if entry.is_resolved() || entry.resolution_failed() {
                log::trace!("call site {} was linked by another thread", row);
            } else {
                match outcome {
                    Ok(link) => {
                        let has_appendix = link.appendix.is_some();
                        if let Some(appendix) = link.appendix {
                            self.references.set_if_empty(
                                usize::from(entry.resolved_references_index()),
                                appendix,
                            );
                        }
                        entry.fill_in(&link.adapter, has_appendix);
                        log::trace!("linked call site {} to {}", row, link.adapter);
                    }
                    Err(error) => {
                        let error = match error {
                            Error::Linkage(linkage) => linkage,
                            other => Arc::new(LinkageError::new(
                                LinkageErrorKind::BootstrapMethod,
                                format!("bootstrap method failed: {}", other),
                            )),
                        };
                        log::debug!("call site {} failed to link: {}", row, error);
                        self.errors.insert(ErrorKey::CallSite(row), error);
                        entry.set_failed();
                    }
                }
            }
            if let Some(claim) = claim.as_mut() {
                state.in_progress.remove(&row);
                claim.released = true;
            }
        }
        drop(claim);

        self.linked_outcome(row)
    }

    fn linked_outcome(&self, row: u32) -> Result<CallSiteLink> {
        self.probe_invokedynamic(row).unwrap_or_else(|| {
            Err(Error::InvariantViolation(format!(
                "call site {} is neither linked nor failed",
                row
            )))
        })
    }

    /// Resolve the constant behind reference slot `slot` (the operand of `fast_aldc`).
    ///
    /// The first published object wins. Failures of `MethodHandle`, `MethodType` and `Dynamic`
    /// constants are cached unless a racing thread published a value first.
    ///
    /// # Errors
    /// Returns [`Error::Linkage`] if the constant cannot be produced.
    pub fn resolve_reference<R>(&self, slot: u16, resolver: &R) -> Result<ObjectRef>
    where
        R: LinkResolver + ?Sized,
    {
        let index = usize::from(slot);
        if index >= self.references.len() {
            return Err(Error::OutOfBounds);
        }
        if let Some(object) = self.references.get(index) {
            return Ok(object.clone());
        }

        let cp_index = self.references.constant_pool_index(index).ok_or_else(|| {
            Error::InvariantViolation(format!("reference slot {} is not a constant", slot))
        })?;
        let key = ErrorKey::Constant(cp_index);
        if let Some(error) = self.cached_error(key) {
            return Err(Error::Linkage(error));
        }

        let caches_failure = matches!(
            self.pool().tag_at(cp_index)?,
            ConstantTag::MethodHandle | ConstantTag::MethodType | ConstantTag::Dynamic
        );
        match resolver.resolve_constant(self.pool(), cp_index) {
            Ok(object) => self
                .references
                .set_if_empty(index, object)
                .cloned()
                .ok_or(Error::OutOfBounds),
            Err(Error::Linkage(error)) if caches_failure => {
                let _guard = lock!(self.linking)?;
                if let Some(object) = self.references.get(index) {
                    return Ok(object.clone());
                }
                let cached = self.errors.entry(key).or_insert(error).value().clone();
                Err(Error::Linkage(cached))
            }
            Err(error) => Err(error),
        }
    }

    /// Resolve a reference constant by constant-pool index, for `ldc` instructions that were
    /// left on the slow path.
    ///
    /// # Errors
    /// Returns [`Error::InvariantViolation`] if the constant has no reference slot, otherwise as
    /// [`ResolutionCache::resolve_reference`].
    pub fn resolve_constant<R>(&self, cp_index: u16, resolver: &R) -> Result<ObjectRef>
    where
        R: LinkResolver + ?Sized,
    {
        let slot = self.references.slot_for_constant(cp_index).ok_or_else(|| {
            Error::InvariantViolation(format!("constant #{} has no reference slot", cp_index))
        })?;
        let slot = u16::try_from(slot).map_err(|_| Error::OutOfBounds)?;
        self.resolve_reference(slot, resolver)
    }
}
