use std::collections::HashMap;

use quiver_common::{QuiverError, Result};
use quiver_vector::DataType;

/// Kind of source a [`Binding`] stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    BaseTable,
    Subquery,
    CrossProduct,
    Join,
    Dummy,
}

/// Named, typed handle to a tabular source visible during binding.
#[derive(Debug, Clone)]
pub struct Binding {
    pub binding_type: BindingType,
    pub table_name: String,
    pub table_index: usize,
    pub column_types: Vec<DataType>,
    pub column_names: Vec<String>,
    /// Column name to position. A repeated name maps to its last position.
    pub name2index: HashMap<String, usize>,
    /// Catalog name of the base table, when this binding reads one.
    pub table: Option<String>,
}

impl Binding {
    /// Builds a binding.
    ///
    /// # Errors
    /// Planner error when the name and type lists differ in length.
    pub fn make_binding(
        binding_type: BindingType,
        table_name: impl Into<String>,
        table_index: usize,
        column_types: Vec<DataType>,
        column_names: Vec<String>,
    ) -> Result<Binding> {
        let table_name = table_name.into();
        if column_types.len() != column_names.len() {
            return Err(QuiverError::Planner(format!(
                "binding '{table_name}': {} column names but {} column types",
                column_names.len(),
                column_types.len()
            )));
        }
        let mut name2index = HashMap::with_capacity(column_names.len());
        for (i, name) in column_names.iter().enumerate() {
            name2index.insert(name.clone(), i);
        }
        Ok(Binding {
            binding_type,
            table_name,
            table_index,
            column_types,
            column_names,
            name2index,
            table: None,
        })
    }

    /// Attaches the base-table handle.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.name2index.get(name).copied()
    }

    pub fn column_count(&self) -> usize {
        self.column_names.len()
    }
}

#[cfg(test)]
mod tests {
    use super::{Binding, BindingType};
    use quiver_common::QuiverError;
    use quiver_vector::DataType;

    #[test]
    fn name_map_inverts_name_list() {
        let b = Binding::make_binding(
            BindingType::BaseTable,
            "t",
            0,
            vec![DataType::integer(), DataType::varchar()],
            vec!["a".to_string(), "b".to_string()],
        )
        .unwrap();
        assert_eq!(b.name2index["b"], 1);
        for (i, n) in b.column_names.iter().enumerate() {
            assert_eq!(b.column_index(n), Some(i));
        }
        assert_eq!(b.table_index, 0);
    }

    #[test]
    fn length_mismatch_is_planner_error() {
        let err = Binding::make_binding(
            BindingType::Subquery,
            "s",
            1,
            vec![DataType::integer()],
            vec!["a".to_string(), "b".to_string()],
        )
        .unwrap_err();
        assert!(matches!(err, QuiverError::Planner(_)));
    }

    #[test]
    fn duplicate_names_last_write_wins() {
        let b = Binding::make_binding(
            BindingType::Subquery,
            "s",
            2,
            vec![DataType::integer(), DataType::bigint()],
            vec!["x".to_string(), "x".to_string()],
        )
        .unwrap();
        assert_eq!(b.column_count(), 2);
        assert_eq!(b.column_index("x"), Some(1));
    }
}
