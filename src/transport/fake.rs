//! Recording tag library for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::error::{Error, Result};
use crate::identifiers::SlotHandle;
use crate::protocol::TagCommand;

use super::{Output, TagLibrary};

/// In-memory library that records every command it receives.
#[derive(Default)]
pub(crate) struct FakeLibrary {
    ready: AtomicBool,
    commands: Mutex<Vec<TagCommand>>,
    failing: Mutex<FxHashSet<&'static str>>,
    declined: Mutex<FxHashSet<String>>,
}

impl FakeLibrary {
    pub(crate) fn ready() -> Arc<Self> {
        let library = Self::default();
        library.ready.store(true, Ordering::SeqCst);
        Arc::new(library)
    }

    pub(crate) fn not_ready() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Makes every call to `method` throw.
    pub(crate) fn fail_method(&self, method: &'static str) {
        self.failing.lock().insert(method);
    }

    /// Makes definitions for `unit_path` return no slot.
    pub(crate) fn decline_path(&self, unit_path: &str) {
        self.declined.lock().insert(unit_path.to_string());
    }

    pub(crate) fn commands(&self) -> Vec<TagCommand> {
        self.commands.lock().clone()
    }

    pub(crate) fn methods(&self) -> Vec<&'static str> {
        self.commands.lock().iter().map(TagCommand::method).collect()
    }

    pub(crate) fn count(&self, method: &str) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|c| c.method() == method)
            .count()
    }

    /// Handles passed to every `destroySlots` call, flattened.
    pub(crate) fn destroyed(&self) -> Vec<SlotHandle> {
        self.commands
            .lock()
            .iter()
            .filter_map(|c| match c {
                TagCommand::DestroySlots { handles } => Some(handles.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

impl TagLibrary for FakeLibrary {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn execute(&self, command: TagCommand) -> Result<Output> {
        let method = command.method();
        let declined = match &command {
            TagCommand::DefineSlot { unit_path, .. }
            | TagCommand::DefineOutOfPageSlot { unit_path, .. } => {
                self.declined.lock().contains(unit_path.as_str())
            }
            _ => false,
        };
        let is_definition = command.is_definition();

        self.commands.lock().push(command);

        if self.failing.lock().contains(method) {
            return Err(Error::library(method, "fake library threw"));
        }
        if declined {
            return Ok(Output::Declined);
        }
        if is_definition {
            return Ok(Output::Defined(SlotHandle::next()));
        }
        Ok(Output::Done)
    }
}
