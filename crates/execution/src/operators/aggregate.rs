use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use quiver_common::{QuiverError, Result};
use quiver_planner::{AggregateExpr, AggregateFunction};
use quiver_vector::{ColumnVector, DataBlock, DataType, LogicalType, Value};

use super::{blocks_from_rows, Sink, StageOutput};
use crate::expressions::PhysicalExpr;

/// Running state of one aggregate for one group.
#[derive(Debug, Clone)]
enum Accumulator {
    Count(i64),
    SumInt(Option<i64>),
    SumDouble(Option<f64>),
    Min(Option<Value>),
    Max(Option<Value>),
    Avg { sum: f64, count: i64 },
}

impl Accumulator {
    fn new(aggregate: &AggregateExpr) -> Self {
        match aggregate.func {
            AggregateFunction::CountStar | AggregateFunction::Count => Accumulator::Count(0),
            AggregateFunction::Sum if aggregate.data_type.logical_type() == LogicalType::Double => {
                Accumulator::SumDouble(None)
            }
            AggregateFunction::Sum => Accumulator::SumInt(None),
            AggregateFunction::Min => Accumulator::Min(None),
            AggregateFunction::Max => Accumulator::Max(None),
            AggregateFunction::Avg => Accumulator::Avg { sum: 0.0, count: 0 },
        }
    }

    /// `value` is `None` for COUNT(*), which counts every row.
    fn update(&mut self, value: Option<&Value>) -> Result<()> {
        let Some(v) = value else {
            if let Accumulator::Count(n) = self {
                *n += 1;
            }
            return Ok(());
        };
        if v.is_null() {
            return Ok(());
        }
        match self {
            Accumulator::Count(n) => *n += 1,
            Accumulator::SumInt(sum) => {
                let x = v
                    .as_i64()
                    .ok_or_else(|| QuiverError::Type(format!("cannot sum {v}")))?;
                let next = match sum {
                    Some(s) => s.checked_add(x).ok_or_else(|| {
                        QuiverError::Executor("integer overflow in SUM".to_string())
                    })?,
                    None => x,
                };
                *sum = Some(next);
            }
            Accumulator::SumDouble(sum) => {
                let x = v
                    .as_f64()
                    .ok_or_else(|| QuiverError::Type(format!("cannot sum {v}")))?;
                *sum = Some(sum.unwrap_or(0.0) + x);
            }
            Accumulator::Min(cur) => replace_if(cur, v, Ordering::Less),
            Accumulator::Max(cur) => replace_if(cur, v, Ordering::Greater),
            Accumulator::Avg { sum, count } => {
                let x = v
                    .as_f64()
                    .ok_or_else(|| QuiverError::Type(format!("cannot average {v}")))?;
                *sum += x;
                *count += 1;
            }
        }
        Ok(())
    }

    fn finish(&self, data_type: &DataType) -> Result<Value> {
        let value = match self {
            Accumulator::Count(n) => Value::make_big_int(*n),
            Accumulator::SumInt(Some(s)) => Value::make_big_int(*s),
            Accumulator::SumDouble(Some(s)) => Value::make_double(*s),
            Accumulator::Min(Some(v)) | Accumulator::Max(Some(v)) => v.clone(),
            Accumulator::Avg { sum, count } if *count > 0 => Value::make_double(sum / *count as f64),
            _ => return Ok(Value::null(data_type.clone())),
        };
        value.try_cast(data_type)
    }
}

fn replace_if(current: &mut Option<Value>, candidate: &Value, wanted: Ordering) {
    let better = match current {
        Some(c) => candidate.compare(c) == Some(wanted),
        None => true,
    };
    if better {
        *current = Some(candidate.clone());
    }
}

/// Groups rows by key and folds aggregates. Groups are emitted in the order
/// they were first seen; without GROUP BY exactly one row is produced.
pub struct HashAggregateSink {
    groups: Vec<Arc<dyn PhysicalExpr>>,
    aggregates: Vec<AggregateExpr>,
    args: Vec<Option<Arc<dyn PhysicalExpr>>>,
    output_types: Vec<DataType>,
    batch_rows: usize,
    index: HashMap<Vec<Value>, usize>,
    states: Vec<(Vec<Value>, Vec<Accumulator>)>,
}

impl HashAggregateSink {
    pub fn new(
        groups: Vec<Arc<dyn PhysicalExpr>>,
        aggregates: Vec<AggregateExpr>,
        args: Vec<Option<Arc<dyn PhysicalExpr>>>,
        output_types: Vec<DataType>,
        batch_rows: usize,
    ) -> Self {
        Self {
            groups,
            aggregates,
            args,
            output_types,
            batch_rows,
            index: HashMap::new(),
            states: Vec::new(),
        }
    }

    fn fresh_state(&self) -> Vec<Accumulator> {
        self.aggregates.iter().map(Accumulator::new).collect()
    }
}

impl Sink for HashAggregateSink {
    fn name(&self) -> &'static str {
        "HashAggregate"
    }

    fn consume(&mut self, block: DataBlock) -> Result<()> {
        let keys = self
            .groups
            .iter()
            .map(|g| g.evaluate(&block))
            .collect::<Result<Vec<ColumnVector>>>()?;
        let args = self
            .args
            .iter()
            .map(|a| a.as_ref().map(|e| e.evaluate(&block)).transpose())
            .collect::<Result<Vec<Option<ColumnVector>>>>()?;
        for row in 0..block.row_count() {
            let key = keys
                .iter()
                .map(|k| k.value_at(row))
                .collect::<Result<Vec<_>>>()?;
            let slot = match self.index.get(&key) {
                Some(slot) => *slot,
                None => {
                    let slot = self.states.len();
                    let state = self.fresh_state();
                    self.index.insert(key.clone(), slot);
                    self.states.push((key, state));
                    slot
                }
            };
            let accumulators = &mut self.states[slot].1;
            for (acc, arg) in accumulators.iter_mut().zip(&args) {
                match arg {
                    Some(vector) => acc.update(Some(&vector.value_at(row)?))?,
                    None => acc.update(None)?,
                }
            }
        }
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<StageOutput> {
        if self.states.is_empty() && self.groups.is_empty() {
            let state = self.fresh_state();
            self.states.push((Vec::new(), state));
        }
        let agg_types = &self.output_types[self.groups.len()..];
        let mut rows = Vec::with_capacity(self.states.len());
        for (key, accumulators) in &self.states {
            let mut row = key.clone();
            for (acc, data_type) in accumulators.iter().zip(agg_types) {
                row.push(acc.finish(data_type)?);
            }
            rows.push(row);
        }
        Ok(StageOutput::Blocks(blocks_from_rows(
            &self.output_types,
            rows,
            self.batch_rows,
        )?))
    }
}
