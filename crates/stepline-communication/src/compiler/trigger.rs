//! Trigger registration
//!
//! Triggers are registered while compiling and looked up by id when the
//! device reports that one fired.

use std::fmt;
use stepline_core::CompileError;
use stepline_planner::{TriggerCallback, TriggerEvent};

/// A registered trigger
#[derive(Clone)]
pub struct Trigger {
    /// Id sent to the device
    pub id: i16,
    /// Argument sent to the device and passed back to the callback
    pub arg: i16,
    /// Host callback
    pub callback: TriggerCallback,
}

impl Trigger {
    /// Invoke the callback
    pub fn fire(&self) {
        (self.callback)(TriggerEvent {
            id: self.id,
            arg: self.arg,
        });
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("id", &self.id)
            .field("arg", &self.arg)
            .finish_non_exhaustive()
    }
}

/// Triggers of one compiled program, indexed by id
#[derive(Debug, Clone, Default)]
pub struct TriggerTable {
    entries: Vec<Trigger>,
}

impl TriggerTable {
    /// Register a trigger and return its id
    pub fn register(&mut self, callback: TriggerCallback, arg: i16) -> Result<i16, CompileError> {
        let id = i16::try_from(self.entries.len()).map_err(|_| CompileError::TriggerOverflow {
            count: self.entries.len(),
        })?;
        self.entries.push(Trigger { id, arg, callback });
        Ok(id)
    }

    /// Look up a trigger by the id reported by the device
    pub fn get(&self, id: i32) -> Option<&Trigger> {
        usize::try_from(id).ok().and_then(|i| self.entries.get(i))
    }

    /// Number of registered triggers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no trigger is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget all triggers, keeping the allocation
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
