#![allow(unused_macros)]

/// Helper macro for locking items, mapping a poisoned lock onto [`crate::Error::LockError`]
///
/// ```rust, ignore
///  let mut state = lock!(self.resolution_lock)?;
///  state.in_progress.insert(site, thread_id);
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().map_err(|_| crate::Error::LockError)
    };
}

/// Helper macro for waiting on a condition variable while holding its guard
///
/// ```rust, ignore
///  state = wait!(self.resolution_cv, state)?;
/// ```
macro_rules! wait {
    ($condvar:expr, $guard:expr) => {
        $condvar.wait($guard).map_err(|_| crate::Error::LockError)
    };
}

/// Helper macro for raising a linkage error of the given kind
///
/// ```rust, ignore
///  return Err(linkage_error!(NoSuchField, "field {} not found", name));
/// ```
macro_rules! linkage_error {
    ($kind:ident, $msg:expr) => {
        crate::Error::Linkage(std::sync::Arc::new(crate::resolution::LinkageError::new(
            crate::resolution::LinkageErrorKind::$kind,
            $msg,
        )))
    };

    ($kind:ident, $fmt:expr, $($arg:tt)*) => {
        crate::Error::Linkage(std::sync::Arc::new(crate::resolution::LinkageError::new(
            crate::resolution::LinkageErrorKind::$kind,
            format!($fmt, $($arg)*),
        )))
    };
}
