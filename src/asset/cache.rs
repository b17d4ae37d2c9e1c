use super::Handle;

/// Append-only registry handing out typed handles.
///
/// Registries replace global managers: whoever owns the assets passes the
/// registry by reference into the scheduler's entry points.
pub struct Registry<T> {
    items: Vec<T>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn insert(&mut self, item: T) -> Handle<T> {
        let index = self.items.len() as u32;
        self.items.push(item);
        Handle::new(index)
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.items.get(handle.index() as usize)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_resolve_to_inserted_items() {
        let mut registry = Registry::new();
        let a = registry.insert("a");
        let b = registry.insert("b");

        assert_eq!(registry.get(a), Some(&"a"));
        assert_eq!(registry.get(b), Some(&"b"));
        assert_eq!(registry.get(Handle::new(7)), None);
        assert_eq!(registry.len(), 2);
    }
}
