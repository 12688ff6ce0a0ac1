use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use quiver_common::{QuiverError, Result};

use crate::binding::Binding;
use crate::column_identifier::ColumnIdentifier;
use crate::logical_plan::ColumnBinding;

/// Bindings visible while binding one query block.
///
/// Nested query blocks get a child context via [`BindContext::child`]; it
/// starts without bindings but shares the table-index counter so indexes stay
/// unique across the whole statement.
#[derive(Debug, Default)]
pub struct BindContext {
    bindings: Vec<Binding>,
    by_alias: HashMap<String, usize>,
    table_index_gen: Arc<AtomicUsize>,
}

impl BindContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self {
            bindings: Vec::new(),
            by_alias: HashMap::new(),
            table_index_gen: Arc::clone(&self.table_index_gen),
        }
    }

    pub fn generate_table_index(&self) -> usize {
        self.table_index_gen.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers `binding` under `alias`.
    ///
    /// # Errors
    /// Bind error when the alias is already taken in this context.
    pub fn add_binding(&mut self, alias: &str, binding: Binding) -> Result<()> {
        let key = alias.to_ascii_lowercase();
        if self.by_alias.contains_key(&key) {
            return Err(QuiverError::Bind(format!(
                "table name \"{alias}\" specified more than once"
            )));
        }
        self.by_alias.insert(key, self.bindings.len());
        self.bindings.push(binding);
        Ok(())
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn get_binding(&self, alias: &str) -> Result<&Binding> {
        self.by_alias
            .get(&alias.to_ascii_lowercase())
            .map(|&i| &self.bindings[i])
            .ok_or_else(|| QuiverError::Bind(format!("unknown table or alias: {alias}")))
    }

    /// Resolves a column reference to a binding slot.
    pub fn resolve_column(&self, id: &ColumnIdentifier) -> Result<ColumnBinding> {
        let column = id
            .column_name
            .as_deref()
            .ok_or_else(|| QuiverError::Bind("column reference without a name".to_string()))?;
        if let Some(table) = id.table_name.as_deref() {
            let binding = self.get_binding(table)?;
            let idx = find_column(binding, column).ok_or_else(|| {
                QuiverError::Bind(format!("column {table}.{column} does not exist"))
            })?;
            return Ok(column_binding(binding, idx));
        }
        let mut found: Option<ColumnBinding> = None;
        for binding in &self.bindings {
            if let Some(idx) = find_column(binding, column) {
                if found.is_some() {
                    return Err(QuiverError::Bind(format!(
                        "column reference \"{column}\" is ambiguous"
                    )));
                }
                found = Some(column_binding(binding, idx));
            }
        }
        found.ok_or_else(|| QuiverError::Bind(format!("column \"{column}\" does not exist")))
    }

    /// Columns of `*` (all bindings in order) or `alias.*`.
    pub fn expand_star(&self, qualifier: Option<&str>) -> Result<Vec<ColumnBinding>> {
        let bindings: Vec<&Binding> = match qualifier {
            Some(q) => vec![self.get_binding(q)?],
            None => self.bindings.iter().collect(),
        };
        let cols: Vec<ColumnBinding> = bindings
            .into_iter()
            .flat_map(|b| (0..b.column_count()).map(move |i| column_binding(b, i)))
            .collect();
        if cols.is_empty() {
            return Err(QuiverError::Bind(
                "SELECT * with no tables specified is not valid".to_string(),
            ));
        }
        Ok(cols)
    }
}

fn find_column(binding: &Binding, name: &str) -> Option<usize> {
    binding.column_index(name).or_else(|| {
        binding
            .column_names
            .iter()
            .rposition(|n| n.eq_ignore_ascii_case(name))
    })
}

fn column_binding(binding: &Binding, idx: usize) -> ColumnBinding {
    ColumnBinding::new(
        binding.table_index,
        idx,
        binding.column_names[idx].clone(),
        binding.column_types[idx].clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::BindContext;
    use crate::binding::{Binding, BindingType};
    use crate::column_identifier::ColumnIdentifier;
    use quiver_common::QuiverError;
    use quiver_vector::DataType;

    fn binding(ctx: &BindContext, name: &str, cols: &[&str]) -> Binding {
        Binding::make_binding(
            BindingType::BaseTable,
            name,
            ctx.generate_table_index(),
            cols.iter().map(|_| DataType::integer()).collect(),
            cols.iter().map(|c| c.to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn resolves_qualified_and_unqualified() {
        let mut ctx = BindContext::new();
        let t = binding(&ctx, "t", &["a", "b"]);
        let u = binding(&ctx, "u", &["b", "c"]);
        ctx.add_binding("t", t).unwrap();
        ctx.add_binding("u", u).unwrap();

        let a = ctx.resolve_column(&ColumnIdentifier::column("a")).unwrap();
        assert_eq!(a.key(), (0, 0));
        let ub = ctx.resolve_column(&ColumnIdentifier::qualified("u", "b")).unwrap();
        assert_eq!(ub.key(), (1, 0));
        assert!(matches!(
            ctx.resolve_column(&ColumnIdentifier::column("b")),
            Err(QuiverError::Bind(_))
        ));
        assert!(matches!(
            ctx.resolve_column(&ColumnIdentifier::column("zzz")),
            Err(QuiverError::Bind(_))
        ));
        assert_eq!(ctx.expand_star(None).unwrap().len(), 4);
        assert_eq!(ctx.expand_star(Some("u")).unwrap().len(), 2);
    }

    #[test]
    fn duplicate_alias_rejected_and_child_shares_indexes() {
        let mut ctx = BindContext::new();
        let t = binding(&ctx, "t", &["a"]);
        let t2 = binding(&ctx, "t", &["a"]);
        ctx.add_binding("t", t).unwrap();
        assert!(matches!(ctx.add_binding("T", t2), Err(QuiverError::Bind(_))));
        let child = ctx.child();
        assert!(child.bindings().is_empty());
        assert_eq!(child.generate_table_index(), 2);
        assert_eq!(ctx.generate_table_index(), 3);
    }
}
