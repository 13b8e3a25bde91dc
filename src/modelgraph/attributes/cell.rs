use crate::value::Value;

/// Per-instance storage for one attribute.
///
/// Holds the raw value as written, plus the memoized results of the read
/// pipeline. Any write drops both caches.
#[derive(Debug, Clone, Default)]
pub struct AttributeCell {
    raw: Value,
    came_from_user: bool,
    /// Raw value was loaded from storage, so an explicit nil is kept.
    from_storage: bool,
    before_type_cast: Option<Value>,
    value: Option<Value>,
    /// The referenced column the cached value was computed from (represents).
    source: Option<Value>,
}

impl AttributeCell {
    pub(crate) fn loaded(raw: Value) -> Self {
        Self {
            raw,
            from_storage: true,
            ..Self::default()
        }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn came_from_user(&self) -> bool {
        self.came_from_user
    }

    pub(crate) fn from_storage(&self) -> bool {
        self.from_storage
    }

    pub(crate) fn write(&mut self, raw: Value) {
        self.raw = raw;
        self.came_from_user = true;
        self.from_storage = false;
        self.invalidate();
    }

    pub(crate) fn invalidate(&mut self) {
        self.before_type_cast = None;
        self.value = None;
        self.source = None;
    }

    pub(crate) fn cached(&self) -> Option<(&Value, &Value)> {
        match (&self.before_type_cast, &self.value) {
            (Some(before), Some(value)) => Some((before, value)),
            _ => None,
        }
    }

    pub(crate) fn cached_for_source(&self, source: &Value) -> Option<&Value> {
        match (&self.source, &self.value) {
            (Some(cached), Some(value)) if cached == source => Some(value),
            _ => None,
        }
    }

    pub(crate) fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub(crate) fn store(&mut self, before_type_cast: Value, value: Value, source: Option<Value>) {
        self.before_type_cast = Some(before_type_cast);
        self.value = Some(value);
        self.source = source;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_drops_caches_and_marks_user_input() {
        let mut cell = AttributeCell::loaded(Value::from("a"));
        cell.store(Value::from("a"), Value::from("A"), None);
        assert!(cell.cached().is_some());
        assert!(cell.from_storage());

        cell.write(Value::from("b"));
        assert!(cell.cached().is_none());
        assert!(cell.came_from_user());
        assert!(!cell.from_storage());
        assert_eq!(cell.raw(), &Value::from("b"));
    }

    #[test]
    fn source_cache_requires_matching_source() {
        let mut cell = AttributeCell::default();
        cell.store(Value::from("x"), Value::from("x"), Some(Value::from("x")));
        assert_eq!(cell.cached_for_source(&Value::from("x")), Some(&Value::from("x")));
        assert_eq!(cell.cached_for_source(&Value::from("y")), None);
    }
}
