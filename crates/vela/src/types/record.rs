//! Records: sorted field sequences with optional nominal names and row
//! extension.
//!
//! Fields are kept sorted lexicographically by key and unique, so structural
//! equality and hashing are order-free by construction. A record carries an
//! optional nominal type name; extending a record with a key absent from its
//! base flips the row-extended flag and erases the name, after which the
//! record is structural for both equality and dispatch.

use std::sync::Arc;

use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Record {
    /// Sorted by key, keys unique.
    fields: Arc<Vec<(String, Value)>>,
    /// Nominal type name; never present on row-extended records.
    type_name: Option<Arc<str>>,
    row_extended: bool,
}

impl Record {
    /// Builds a record from unordered fields; later duplicates win.
    pub fn new(fields: Vec<(String, Value)>, type_name: Option<Arc<str>>) -> Self {
        let mut sorted: Vec<(String, Value)> = Vec::with_capacity(fields.len());
        for (key, value) in fields {
            match sorted.binary_search_by(|(k, _)| k.as_str().cmp(&key)) {
                Ok(pos) => sorted[pos].1 = value,
                Err(pos) => sorted.insert(pos, (key, value)),
            }
        }
        Self {
            fields: Arc::new(sorted),
            type_name,
            row_extended: false,
        }
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    pub fn is_row_extended(&self) -> bool {
        self.row_extended
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields
            .binary_search_by(|(k, _)| k.as_str().cmp(key))
            .ok()
            .map(|pos| &self.fields[pos].1)
    }

    /// Sets a field, persistently.
    ///
    /// Replacing an existing key preserves the nominal name; introducing a new
    /// key marks the record row-extended and erases the name.
    pub fn set(&self, key: &str, value: Value) -> Self {
        match self.fields.binary_search_by(|(k, _)| k.as_str().cmp(key)) {
            Ok(pos) => {
                let mut fields = (*self.fields).clone();
                fields[pos].1 = value;
                Self {
                    fields: Arc::new(fields),
                    type_name: self.type_name.clone(),
                    row_extended: self.row_extended,
                }
            }
            Err(pos) => {
                let mut fields = (*self.fields).clone();
                fields.insert(pos, (key.to_owned(), value));
                Self {
                    fields: Arc::new(fields),
                    type_name: None,
                    row_extended: true,
                }
            }
        }
    }

    /// In-place field assignment for the single-owner case; falls back to the
    /// persistent path when the field array is shared.
    pub fn set_in_place(&mut self, key: &str, value: Value) {
        if let Ok(pos) = self.fields.binary_search_by(|(k, _)| k.as_str().cmp(key)) {
            Arc::make_mut(&mut self.fields)[pos].1 = value;
        } else {
            *self = self.set(key, value);
        }
    }

    /// Tags the record with a nominal type name (an ADT cast). Row-extended
    /// records stay structural: they never adopt a nominal name.
    pub fn with_type_name(&self, name: Arc<str>) -> Self {
        if self.row_extended {
            return self.clone();
        }
        Self {
            fields: Arc::clone(&self.fields),
            type_name: Some(name),
            row_extended: false,
        }
    }

    /// Applies a record-literal spread: base fields first, then the literal's
    /// own fields. Keys new to the base extend the row.
    pub fn extend_with(&self, fields: Vec<(String, Value)>) -> Self {
        let mut out = self.clone();
        for (key, value) in fields {
            out = out.set(&key, value);
        }
        out
    }

    /// Structural equality: same keys, equal values. Nominal names must agree
    /// unless either side is row-extended, which forces structural treatment.
    pub fn record_eq(&self, other: &Self) -> bool {
        if self.fields.len() != other.fields.len() {
            return false;
        }
        if !(self.row_extended || other.row_extended) && self.type_name() != other.type_name() {
            return false;
        }
        self.fields
            .iter()
            .zip(other.fields.iter())
            .all(|((ka, va), (kb, vb))| ka == kb && va.value_eq(vb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: i64, y: i64) -> Record {
        Record::new(
            vec![("y".to_owned(), Value::Int(y)), ("x".to_owned(), Value::Int(x))],
            Some(Arc::from("Point")),
        )
    }

    #[test]
    fn fields_are_sorted_on_construction() {
        let rec = point(1, 2);
        let keys: Vec<_> = rec.fields().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["x", "y"]);
    }

    #[test]
    fn replacing_field_keeps_nominal_name() {
        let rec = point(1, 2).set("x", Value::Int(9));
        assert_eq!(rec.type_name(), Some("Point"));
        assert!(!rec.is_row_extended());
        assert_eq!(rec.get("x"), Some(&Value::Int(9)));
    }

    #[test]
    fn new_field_extends_row_and_erases_name() {
        let rec = point(1, 2).set("z", Value::Int(3));
        assert_eq!(rec.type_name(), None);
        assert!(rec.is_row_extended());
        assert_eq!(rec.len(), 3);
    }

    #[test]
    fn row_extended_equality_is_structural() {
        let nominal = point(1, 2);
        let structural = Record::new(
            vec![("x".to_owned(), Value::Int(1)), ("y".to_owned(), Value::Int(2))],
            None,
        );
        // nominal vs anonymous: names disagree
        assert!(!nominal.record_eq(&structural));
        // extending makes the nominal one structural too
        let extended = nominal.set("z", Value::Int(3));
        let extended_structural = structural.set("z", Value::Int(3));
        assert!(extended.record_eq(&extended_structural));
    }
}
