use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use dlbind_core::Callback;

/// Callbacks an instance keeps alive for native code.
///
/// There is one slot per member parameter. Passing a new callback in the
/// same position replaces the previous one, which native code is no longer
/// expected to hold.
#[derive(Default)]
pub(crate) struct CallbackLifetimes {
    slots: Mutex<HashMap<(String, usize), Callback>>,
}

impl CallbackLifetimes {
    pub fn retain(&self, member: &str, position: usize, callback: Callback) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((member.to_string(), position), callback);
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn clear(&self) {
        let released: Vec<Callback> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, callback)| callback)
            .collect();
        log::debug!("released {} retained callbacks", released.len());
    }
}
