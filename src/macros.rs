/// Helper macro for locking items, mapping poisoned locks to [`crate::Error::LockError`]
///
/// ```rust, ignore
///  let mut data = lock!(my_mutex)?;
///  data.insert(key, value);
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock
            .lock()
            .map_err(|error| crate::Error::LockError(error.to_string()))
    };
}
