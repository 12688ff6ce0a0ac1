use std::fmt;

use quiver_common::{QuiverError, Result};
use sqlparser::ast::Ident;

/// Possibly-qualified column reference as written in SQL.
///
/// Every component is optional; an absent component is inherited from the
/// binding context. Equality compares all five components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ColumnIdentifier {
    pub db_name: Option<String>,
    pub schema_name: Option<String>,
    pub table_name: Option<String>,
    pub column_name: Option<String>,
    pub alias_name: Option<String>,
}

/// Unquoted identifiers fold to lower case; quoted ones keep their spelling.
pub fn normalize_ident(ident: &Ident) -> String {
    match ident.quote_style {
        Some(_) => ident.value.clone(),
        None => ident.value.to_ascii_lowercase(),
    }
}

impl ColumnIdentifier {
    pub fn column(name: impl Into<String>) -> Self {
        Self {
            column_name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table_name: Some(table.into()),
            column_name: Some(column.into()),
            ..Self::default()
        }
    }

    /// Builds an identifier from `[[[db.]schema.]table.]column` parts.
    pub fn from_idents(parts: &[Ident]) -> Result<Self> {
        let names: Vec<String> = parts.iter().map(normalize_ident).collect();
        let mut id = Self::default();
        match names.as_slice() {
            [c] => id.column_name = Some(c.clone()),
            [t, c] => {
                id.table_name = Some(t.clone());
                id.column_name = Some(c.clone());
            }
            [s, t, c] => {
                id.schema_name = Some(s.clone());
                id.table_name = Some(t.clone());
                id.column_name = Some(c.clone());
            }
            [d, s, t, c] => {
                id.db_name = Some(d.clone());
                id.schema_name = Some(s.clone());
                id.table_name = Some(t.clone());
                id.column_name = Some(c.clone());
            }
            _ => {
                return Err(QuiverError::Bind(format!(
                    "invalid column reference with {} parts",
                    parts.len()
                )))
            }
        }
        Ok(id)
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias_name = Some(alias.into());
        self
    }
}

impl fmt::Display for ColumnIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [
            &self.db_name,
            &self.schema_name,
            &self.table_name,
            &self.column_name,
        ];
        let joined = parts
            .iter()
            .filter_map(|p| p.as_deref())
            .collect::<Vec<_>>()
            .join(".");
        f.write_str(&joined)?;
        if let Some(alias) = &self.alias_name {
            write!(f, " AS {alias}")?;
        }
        Ok(())
    }
}
