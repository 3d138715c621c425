use parking_lot::Mutex;

/// Last observed status of one kind, used for change suppression.
///
/// ```
/// use egm_hardware::StatusCache;
///
/// let cache = StatusCache::new();
/// assert!(cache.update(3));
/// assert!(!cache.update(3));
/// assert_eq!(cache.get(), Some(3));
/// ```
#[derive(Debug)]
pub struct StatusCache<T> {
    last: Mutex<Option<T>>,
}

impl<T: PartialEq + Clone> StatusCache<T> {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(None),
        }
    }

    /// Store `status`. Returns `false` if it equals the cached value.
    pub fn update(&self, status: T) -> bool {
        let mut last = self.last.lock();
        if last.as_ref() == Some(&status) {
            return false;
        }
        *last = Some(status);
        true
    }

    pub fn get(&self) -> Option<T> {
        self.last.lock().clone()
    }

    pub fn clear(&self) {
        *self.last.lock() = None;
    }
}

impl<T: PartialEq + Clone> Default for StatusCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
