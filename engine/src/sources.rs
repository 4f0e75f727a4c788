//! Source trees opened per ref.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use ddsl_core::{Location, Registry, RegistryError, SourceTree};
use tracing::debug;

/// Opens the base source location lazily, once per ref.
///
/// A command without `#ref` reads the base location as configured (its own
/// fragment, if any). A command with `#ref` reads the same location pinned
/// to that ref. Compiler and processor go through the same cache, so a file
/// is always read from the revision it was resolved against.
pub struct Sources {
    registry: Registry,
    base: Location,
    trees: RefCell<BTreeMap<Option<String>, Rc<dyn SourceTree>>>,
}

impl Sources {
    pub fn new(registry: Registry, base: Location) -> Self {
        Self {
            registry,
            base,
            trees: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn base(&self) -> &Location {
        &self.base
    }

    /// The tree for `source_ref`, opening it on first use.
    pub fn get(&self, source_ref: Option<&str>) -> Result<Rc<dyn SourceTree>, RegistryError> {
        let key = source_ref.or(self.base.fragment.as_deref()).map(str::to_string);
        if let Some(tree) = self.trees.borrow().get(&key) {
            return Ok(Rc::clone(tree));
        }

        let location = self.base.with_ref(key.as_deref());
        debug!(location = %location, "opening source tree");
        let tree: Rc<dyn SourceTree> = Rc::from(self.registry.open_source(&location)?);
        self.trees.borrow_mut().insert(key, Rc::clone(&tree));
        Ok(tree)
    }
}

impl fmt::Debug for Sources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sources")
            .field("base", &self.base)
            .field("open", &self.trees.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}
