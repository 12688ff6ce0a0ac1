use quiver_common::{QuiverError, Result};
use quiver_vector::Schema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;

use crate::stats::TableStats;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub schema: Schema,
    #[serde(default)]
    pub options: HashMap<String, String>,
    #[serde(default)]
    pub stats: TableStats,
}

impl TableDef {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            options: HashMap::new(),
            stats: TableStats::default(),
        }
    }
}

/// Table registry. Names are matched case-insensitively.
#[derive(Debug, Default)]
pub struct Catalog {
    tables: HashMap<String, TableDef>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    /// Registers or replaces a table definition.
    pub fn register_table(&mut self, table: TableDef) {
        self.tables.insert(table.name.to_ascii_lowercase(), table);
    }

    /// Registers a new table, failing when the name is taken.
    pub fn create_table(&mut self, table: TableDef) -> Result<()> {
        let key = table.name.to_ascii_lowercase();
        if self.tables.contains_key(&key) {
            return Err(QuiverError::InvalidConfig(format!(
                "table already exists: {}",
                table.name
            )));
        }
        self.tables.insert(key, table);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&TableDef> {
        self.tables
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| QuiverError::Bind(format!("unknown table: {name}")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_ascii_lowercase())
    }

    /// Registered table names, sorted.
    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.values().map(|t| t.name.clone()).collect();
        names.sort();
        names
    }

    pub fn load_from_json(path: &str) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let tables: Vec<TableDef> =
            serde_json::from_str(&s).map_err(|e| QuiverError::InvalidConfig(e.to_string()))?;
        let mut cat = Catalog::new();
        for t in tables {
            cat.register_table(t);
        }
        Ok(cat)
    }
}

#[cfg(test)]
mod tests {
    use super::{Catalog, TableDef};
    use quiver_common::QuiverError;
    use quiver_vector::{DataType, Field, Schema};
    use std::io::Write;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut cat = Catalog::new();
        cat.register_table(TableDef::new(
            "Orders",
            Schema::new(vec![Field::new("id", DataType::bigint())]),
        ));
        assert_eq!(cat.get("orders").unwrap().name, "Orders");
        assert!(matches!(cat.get("missing"), Err(QuiverError::Bind(_))));
        assert!(cat
            .create_table(TableDef::new("ORDERS", Schema::empty()))
            .is_err());
    }

    #[test]
    fn loads_tables_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name":"t","schema":{{"fields":[
                {{"name":"a","data_type":{{"logical_type":"Integer"}}}},
                {{"name":"s","data_type":{{"logical_type":"Varchar","varchar_info":{{"max_length":10}}}}}}
            ]}},"stats":{{"rows":3}}}}]"#
        )
        .unwrap();
        let cat = Catalog::load_from_json(file.path().to_str().unwrap()).unwrap();
        let t = cat.get("t").unwrap();
        assert_eq!(t.schema.len(), 2);
        assert_eq!(t.schema.field(1).unwrap().data_type.to_string(), "VARCHAR(10)");
        assert_eq!(t.stats.rows, Some(3));
        assert_eq!(cat.list_tables(), vec!["t".to_string()]);
    }
}
