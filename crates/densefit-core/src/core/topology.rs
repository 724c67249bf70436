use std::collections::HashMap;

/// Source of atom names for a set of atom serial numbers.
///
/// Element types of the model mixture are derived from atom names, so any structure
/// reader (or an in-memory table) that can name atoms can drive model construction.
pub trait AtomNameProvider {
    fn atom_name(&self, serial: usize) -> Option<&str>;
}

impl AtomNameProvider for HashMap<usize, String> {
    fn atom_name(&self, serial: usize) -> Option<&str> {
        self.get(&serial).map(String::as_str)
    }
}

/// Atom names keyed by serial number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomNameTable {
    names: HashMap<usize, String>,
}

impl AtomNameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, serial: usize, name: impl Into<String>) {
        self.names.insert(serial, name.into());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(usize, S)> for AtomNameTable {
    fn from_iter<I: IntoIterator<Item = (usize, S)>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(|(k, v)| (k, v.into())).collect(),
        }
    }
}

impl AtomNameProvider for AtomNameTable {
    fn atom_name(&self, serial: usize) -> Option<&str> {
        self.names.get(&serial).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_returns_inserted_names() {
        let mut table = AtomNameTable::new();
        table.insert(7, "CA");
        assert_eq!(table.atom_name(7), Some("CA"));
        assert_eq!(table.atom_name(8), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn table_collects_from_pairs() {
        let table: AtomNameTable = [(1, "N"), (2, "OG1")].into_iter().collect();
        assert_eq!(table.atom_name(2), Some("OG1"));
    }

    #[test]
    fn hash_map_is_a_provider() {
        let map: HashMap<usize, String> = [(3, "SD".to_string())].into_iter().collect();
        assert_eq!(map.atom_name(3), Some("SD"));
    }
}
