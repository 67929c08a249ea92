//! Change-tracking value cells.
//!
//! Column state such as width, label or visibility lives in a [`Property`].
//! Setters report whether the value actually changed so the owner only emits
//! events for real changes:
//!
//! ```
//! use lineup_core::Property;
//!
//! let width = Property::new(100.0_f64);
//! assert_eq!(width.replace(150.0), Some(100.0));
//! assert_eq!(width.replace(150.0), None);
//!
//! // widths within half a pixel count as unchanged
//! assert_eq!(width.replace_if_different(150.3, |a, b| (a - b).abs() < 0.5), None);
//! ```

use std::fmt;

use parking_lot::RwLock;

/// A value cell with change detection.
pub struct Property<T> {
    value: RwLock<T>,
}

impl<T: Clone> Property<T> {
    /// Create a new property with an initial value.
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    /// Get a copy of the current value.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    /// Access the value through a closure without cloning.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        f(&self.value.read())
    }

    /// Set the value without change detection.
    pub fn set_silent(&self, value: T) {
        *self.value.write() = value;
    }

    /// Replace the value unless `same(current, new)` holds, returning the old one.
    pub fn replace_if_different<F>(&self, value: T, same: F) -> Option<T>
    where
        F: FnOnce(&T, &T) -> bool,
    {
        let mut current = self.value.write();
        if same(&current, &value) {
            None
        } else {
            Some(std::mem::replace(&mut *current, value))
        }
    }
}

impl<T: Clone + PartialEq> Property<T> {
    /// Set the value, returning `true` if it changed.
    pub fn set(&self, value: T) -> bool {
        self.replace(value).is_some()
    }

    /// Set the value, returning the old value if it changed.
    pub fn replace(&self, value: T) -> Option<T> {
        self.replace_if_different(value, |a, b| a == b)
    }
}

impl<T: Clone> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl<T: Clone + Default> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("value", &self.get())
            .finish()
    }
}
