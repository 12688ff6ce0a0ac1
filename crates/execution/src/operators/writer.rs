//! Result collection and table writers. Writers report a single BIGINT row
//! with the number of affected rows.

use std::sync::Arc;

use parking_lot::RwLock;
use quiver_common::{QuiverError, Result};
use quiver_storage::{Catalog, StorageProvider, TableDef};
use quiver_vector::{DataBlock, DataType, Schema, Value};
use tracing::{debug, info};

use super::{blocks_from_rows, count_block, take_rows, Sink, StageOutput};
use crate::expressions::{selected_rows, vector_from_values, PhysicalExpr};

/// Keeps non-empty blocks in arrival order.
#[derive(Debug, Default)]
pub struct CollectSink {
    blocks: Vec<DataBlock>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sink for CollectSink {
    fn name(&self) -> &'static str {
        "Collect"
    }

    fn consume(&mut self, block: DataBlock) -> Result<()> {
        if !block.is_empty() {
            self.blocks.push(block);
        }
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<StageOutput> {
        Ok(StageOutput::Blocks(self.blocks))
    }
}

fn selection(predicate: Option<&Arc<dyn PhysicalExpr>>, block: &DataBlock) -> Result<Vec<bool>> {
    let mut mask = vec![predicate.is_none(); block.row_count()];
    if let Some(p) = predicate {
        for row in selected_rows(p.as_ref(), block)? {
            mask[row] = true;
        }
    }
    Ok(mask)
}

/// Appends input rows to a table. `column_map[i]` names the input column
/// feeding table column `i`; unmapped columns receive NULL. Converted blocks
/// are held until `finalize`, so a failing input leaves the table untouched.
pub struct InsertSink {
    table: TableDef,
    storage: Arc<dyn StorageProvider>,
    column_map: Vec<Option<usize>>,
    table_types: Vec<DataType>,
    staged: Vec<DataBlock>,
}

impl InsertSink {
    pub fn new(
        table: TableDef,
        storage: Arc<dyn StorageProvider>,
        column_map: Vec<Option<usize>>,
        table_types: Vec<DataType>,
    ) -> Self {
        Self {
            table,
            storage,
            column_map,
            table_types,
            staged: Vec::new(),
        }
    }
}

impl Sink for InsertSink {
    fn name(&self) -> &'static str {
        "Insert"
    }

    fn consume(&mut self, block: DataBlock) -> Result<()> {
        let rows = block.row_count();
        if rows == 0 {
            return Ok(());
        }
        let mut columns = Vec::with_capacity(self.table_types.len());
        for (target, source) in self.table_types.iter().zip(&self.column_map) {
            let values = match source {
                Some(i) => {
                    let column = block.column(*i).ok_or_else(|| {
                        QuiverError::Executor(format!(
                            "insert source column {i} missing from input block"
                        ))
                    })?;
                    (0..rows)
                        .map(|r| column.value_at(r)?.try_cast(target))
                        .collect::<Result<Vec<_>>>()?
                }
                None => vec![Value::null(target.clone()); rows],
            };
            columns.push(vector_from_values(target, values)?);
        }
        self.staged.push(DataBlock::new(columns, rows)?);
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<StageOutput> {
        let mut written = 0;
        for block in self.staged {
            written += self.storage.append(&self.table, block)?;
        }
        debug!(table = %self.table.name, rows = written, "insert finished");
        Ok(StageOutput::Blocks(vec![count_block(written)?]))
    }
}

/// Rewrites matching rows of a table. Input blocks carry full table rows;
/// the table contents are replaced once all input has been seen.
pub struct UpdateSink {
    table: TableDef,
    storage: Arc<dyn StorageProvider>,
    assignments: Vec<(usize, Arc<dyn PhysicalExpr>)>,
    predicate: Option<Arc<dyn PhysicalExpr>>,
    table_types: Vec<DataType>,
    batch_rows: usize,
    rows: Vec<Vec<Value>>,
    updated: u64,
}

impl UpdateSink {
    pub fn new(
        table: TableDef,
        storage: Arc<dyn StorageProvider>,
        assignments: Vec<(usize, Arc<dyn PhysicalExpr>)>,
        predicate: Option<Arc<dyn PhysicalExpr>>,
        table_types: Vec<DataType>,
        batch_rows: usize,
    ) -> Self {
        Self {
            table,
            storage,
            assignments,
            predicate,
            table_types,
            batch_rows,
            rows: Vec::new(),
            updated: 0,
        }
    }
}

impl Sink for UpdateSink {
    fn name(&self) -> &'static str {
        "Update"
    }

    fn consume(&mut self, block: DataBlock) -> Result<()> {
        let mask = selection(self.predicate.as_ref(), &block)?;
        let targets: Vec<usize> = (0..block.row_count()).filter(|r| mask[*r]).collect();
        // assignments only see the rows they rewrite
        let matched = take_rows(&block, &targets)?;
        let new_values = self
            .assignments
            .iter()
            .map(|(col, e)| Ok((*col, e.evaluate(&matched)?)))
            .collect::<Result<Vec<_>>>()?;
        let mut next = 0;
        for row in 0..block.row_count() {
            let mut values = block.row(row)?;
            if mask[row] {
                for (col, vector) in &new_values {
                    let target = self.table_types.get(*col).ok_or_else(|| {
                        QuiverError::Executor(format!("update target column {col} out of range"))
                    })?;
                    values[*col] = vector.value_at(next)?.try_cast(target)?;
                }
                next += 1;
                self.updated += 1;
            }
            self.rows.push(values);
        }
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<StageOutput> {
        let blocks = blocks_from_rows(&self.table_types, self.rows, self.batch_rows)?;
        self.storage.replace(&self.table, blocks)?;
        debug!(table = %self.table.name, rows = self.updated, "update finished");
        Ok(StageOutput::Blocks(vec![count_block(self.updated)?]))
    }
}

/// Removes matching rows of a table; without a predicate every row goes.
pub struct DeleteSink {
    table: TableDef,
    storage: Arc<dyn StorageProvider>,
    predicate: Option<Arc<dyn PhysicalExpr>>,
    table_types: Vec<DataType>,
    batch_rows: usize,
    kept: Vec<Vec<Value>>,
    deleted: u64,
}

impl DeleteSink {
    pub fn new(
        table: TableDef,
        storage: Arc<dyn StorageProvider>,
        predicate: Option<Arc<dyn PhysicalExpr>>,
        table_types: Vec<DataType>,
        batch_rows: usize,
    ) -> Self {
        Self {
            table,
            storage,
            predicate,
            table_types,
            batch_rows,
            kept: Vec::new(),
            deleted: 0,
        }
    }
}

impl Sink for DeleteSink {
    fn name(&self) -> &'static str {
        "Delete"
    }

    fn consume(&mut self, block: DataBlock) -> Result<()> {
        let mask = selection(self.predicate.as_ref(), &block)?;
        for (row, delete) in mask.into_iter().enumerate() {
            if delete {
                self.deleted += 1;
            } else {
                self.kept.push(block.row(row)?);
            }
        }
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<StageOutput> {
        let blocks = blocks_from_rows(&self.table_types, self.kept, self.batch_rows)?;
        self.storage.replace(&self.table, blocks)?;
        debug!(table = %self.table.name, rows = self.deleted, "delete finished");
        Ok(StageOutput::Blocks(vec![count_block(self.deleted)?]))
    }
}

/// Registers a new table in the catalog and prepares its storage.
pub struct CreateTableSink {
    catalog: Arc<RwLock<Catalog>>,
    storage: Arc<dyn StorageProvider>,
    table: String,
    schema: Schema,
    if_not_exists: bool,
}

impl CreateTableSink {
    pub fn new(
        catalog: Arc<RwLock<Catalog>>,
        storage: Arc<dyn StorageProvider>,
        table: String,
        schema: Schema,
        if_not_exists: bool,
    ) -> Self {
        Self {
            catalog,
            storage,
            table,
            schema,
            if_not_exists,
        }
    }
}

impl Sink for CreateTableSink {
    fn name(&self) -> &'static str {
        "CreateTable"
    }

    fn consume(&mut self, _block: DataBlock) -> Result<()> {
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<StageOutput> {
        let def = TableDef::new(self.table.clone(), self.schema.clone());
        {
            let mut catalog = self.catalog.write();
            if catalog.contains(&self.table) {
                if self.if_not_exists {
                    return Ok(StageOutput::Blocks(vec![count_block(0)?]));
                }
                return Err(QuiverError::Executor(format!(
                    "table already exists: {}",
                    self.table
                )));
            }
            catalog.create_table(def.clone())?;
        }
        self.storage.create_table(&def)?;
        info!(table = %self.table, columns = self.schema.len(), "table created");
        Ok(StageOutput::Blocks(vec![count_block(0)?]))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{CreateTableSink, DeleteSink, InsertSink, UpdateSink};
    use crate::expressions::compile_expr;
    use crate::operators::{Sink, StageOutput};
    use crate::udf::FunctionRegistry;
    use parking_lot::RwLock;
    use quiver_common::QuiverError;
    use quiver_planner::{BinaryOp, Expr};
    use quiver_storage::{Catalog, MemoryStorage, StorageProvider, TableDef};
    use quiver_vector::{DataBlock, DataType, Field, Schema, Value};

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::integer()),
            Field::new("name", DataType::varchar()),
        ])
    }

    fn table() -> (TableDef, Arc<MemoryStorage>) {
        let def = TableDef::new("t", schema());
        let storage = Arc::new(MemoryStorage::new());
        storage.create_table(&def).unwrap();
        (def, storage)
    }

    fn seed(def: &TableDef, storage: &MemoryStorage) {
        let block = DataBlock::from_rows(
            &schema().data_types(),
            &[
                vec![Value::make_int(1), Value::make_varchar("a")],
                vec![Value::make_int(2), Value::make_varchar("b")],
                vec![Value::make_int(3), Value::make_varchar("c")],
            ],
        )
        .unwrap();
        storage.append(def, block).unwrap();
    }

    fn contents(def: &TableDef, storage: &MemoryStorage) -> String {
        storage
            .scan(def, None)
            .unwrap()
            .iter()
            .map(|b| b.to_string())
            .collect()
    }

    fn count(output: StageOutput) -> String {
        match output {
            StageOutput::Blocks(blocks) => blocks.iter().map(|b| b.to_string()).collect(),
            StageOutput::HashTable(_) => panic!("expected blocks"),
        }
    }

    fn id_gt(n: i32) -> Expr {
        Expr::BinaryOp {
            left: Box::new(Expr::ColumnRef {
                name: "id".to_string(),
                index: 0,
                data_type: DataType::integer(),
            }),
            op: BinaryOp::Gt,
            right: Box::new(Expr::Literal(Value::make_int(n))),
        }
    }

    #[test]
    fn insert_maps_and_casts_columns() {
        let (def, storage) = table();
        let mut sink = Box::new(InsertSink::new(
            def.clone(),
            storage.clone(),
            vec![Some(0), None],
            schema().data_types(),
        ));
        let input =
            DataBlock::from_rows(&[DataType::bigint()], &[vec![Value::make_big_int(7)]]).unwrap();
        sink.consume(input).unwrap();
        assert_eq!(count(sink.finalize().unwrap()), "1\n");
        assert_eq!(contents(&def, &storage), "7 NULL\n");
    }

    #[test]
    fn insert_writes_nothing_before_finalize() {
        let (def, storage) = table();
        let mut sink = Box::new(InsertSink::new(
            def.clone(),
            storage.clone(),
            vec![Some(0), Some(1)],
            schema().data_types(),
        ));
        let first = DataBlock::from_rows(
            &schema().data_types(),
            &[vec![Value::make_int(1), Value::make_varchar("a")]],
        )
        .unwrap();
        sink.consume(first).unwrap();
        let overflow = DataBlock::from_rows(
            &[DataType::bigint(), DataType::varchar()],
            &[vec![Value::make_big_int(i64::MAX), Value::make_varchar("b")]],
        )
        .unwrap();
        assert!(sink.consume(overflow).is_err());
        assert_eq!(contents(&def, &storage), "");
        drop(sink);
        assert_eq!(contents(&def, &storage), "");
    }

    #[test]
    fn update_rewrites_matching_rows() {
        let (def, storage) = table();
        seed(&def, &storage);
        let registry = FunctionRegistry::new();
        let types = schema().data_types();
        let assignment = compile_expr(
            &Expr::Literal(Value::make_varchar("z")),
            &types,
            &registry,
        )
        .unwrap();
        let predicate = compile_expr(&id_gt(1), &types, &registry).unwrap();
        let mut sink = Box::new(UpdateSink::new(
            def.clone(),
            storage.clone(),
            vec![(1, assignment)],
            Some(predicate),
            types,
            1024,
        ));
        for block in storage.scan(&def, None).unwrap() {
            sink.consume(block).unwrap();
        }
        assert_eq!(count(sink.finalize().unwrap()), "2\n");
        assert_eq!(contents(&def, &storage), "1 a\n2 z\n3 z\n");
    }

    #[test]
    fn delete_keeps_rows_not_matching() {
        let (def, storage) = table();
        seed(&def, &storage);
        let registry = FunctionRegistry::new();
        let types = schema().data_types();
        let predicate = compile_expr(&id_gt(2), &types, &registry).unwrap();
        let mut sink = Box::new(DeleteSink::new(
            def.clone(),
            storage.clone(),
            Some(predicate),
            types,
            1024,
        ));
        for block in storage.scan(&def, None).unwrap() {
            sink.consume(block).unwrap();
        }
        assert_eq!(count(sink.finalize().unwrap()), "1\n");
        assert_eq!(contents(&def, &storage), "1 a\n2 b\n");
    }

    #[test]
    fn create_table_respects_if_not_exists() {
        let catalog = Arc::new(RwLock::new(Catalog::new()));
        let storage = Arc::new(MemoryStorage::new());
        let create = |if_not_exists| {
            Box::new(CreateTableSink::new(
                catalog.clone(),
                storage.clone(),
                "t".to_string(),
                schema(),
                if_not_exists,
            ))
            .finalize()
        };
        assert_eq!(count(create(false).unwrap()), "0\n");
        assert!(catalog.read().contains("t"));
        assert_eq!(count(create(true).unwrap()), "0\n");
        assert!(matches!(create(false), Err(QuiverError::Executor(_))));
    }
}
