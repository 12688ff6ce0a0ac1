//! Pipeline scheduler.
//!
//! Stages run as blocking tasks on a dedicated tokio runtime. A stage starts
//! once every stage it depends on has completed; independent stages (for
//! example both inputs of a join) run concurrently. The first failing stage
//! cancels the rest and its error becomes the query result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use quiver_common::{EngineConfig, QuiverError, Result, StageId};
use quiver_vector::DataBlock;
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::QueryContext;
use crate::operators::{create_operator, create_sink, read_source, StageOutputs};
use crate::pipeline::{Pipeline, Stage};

/// Executes pipelines on a fixed pool of worker threads.
pub struct Scheduler {
    runtime: Runtime,
    worker_threads: usize,
}

impl Scheduler {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .max_blocking_threads(config.worker_threads)
            .thread_name("quiver-worker")
            .build()?;
        Ok(Self {
            runtime,
            worker_threads: config.worker_threads,
        })
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    /// Starts `pipeline` for `ctx` and returns immediately; the result is
    /// delivered through [`Pipeline::get_result`].
    ///
    /// # Errors
    /// Executor error when `ctx` already has a pipeline in flight or when
    /// `pipeline` was scheduled before.
    pub fn schedule(&self, ctx: &Arc<QueryContext>, pipeline: &Pipeline) -> Result<()> {
        ctx.begin_pipeline()?;
        let sender = match pipeline.take_result_sender() {
            Ok(sender) => sender,
            Err(e) => {
                ctx.finish_pipeline();
                return Err(e);
            }
        };
        let stages = pipeline.shared_stages();
        info!(
            query_id = %ctx.query_id(),
            session_id = %ctx.session_id(),
            stages = stages.len(),
            "scheduling pipeline"
        );
        debug!(query_id = %ctx.query_id(), "pipeline:\n{pipeline}");
        let ctx = Arc::clone(ctx);
        self.runtime.spawn(async move {
            let started = Instant::now();
            let result = run_pipeline(Arc::clone(&ctx), stages).await;
            match &result {
                Ok(blocks) => info!(
                    query_id = %ctx.query_id(),
                    rows = blocks.iter().map(DataBlock::row_count).sum::<usize>(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "pipeline finished"
                ),
                Err(e) => warn!(query_id = %ctx.query_id(), error = %e, "pipeline failed"),
            }
            // clear before delivering so the caller can schedule again; the
            // context owns this runtime and must not be dropped on its threads
            ctx.finish_pipeline();
            drop(ctx);
            let _ = sender.send(result);
        });
        Ok(())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("worker_threads", &self.worker_threads)
            .finish()
    }
}

type StageHandle = JoinHandle<(StageId, Result<()>)>;

async fn run_pipeline(ctx: Arc<QueryContext>, stages: Arc<Vec<Stage>>) -> Result<Vec<DataBlock>> {
    let outputs = Arc::new(StageOutputs::new());
    let cancelled = Arc::new(AtomicBool::new(false));
    let query_id = ctx.query_id().to_string();
    let metrics = ctx.metrics().clone();

    let mut waiting: Vec<usize> = stages.iter().map(|s| s.children.len()).collect();
    let mut running: FuturesUnordered<StageHandle> = FuturesUnordered::new();
    for stage in stages.iter().filter(|s| s.children.is_empty()) {
        running.push(spawn_stage(&ctx, &stages, stage.id, &outputs, &cancelled));
    }
    metrics.set_scheduler_running_stages(&query_id, running.len() as u64);

    while let Some(joined) = running.next().await {
        let (id, result) = match joined {
            Ok(done) => done,
            Err(e) => {
                cancel(&cancelled, &mut running).await;
                metrics.set_scheduler_running_stages(&query_id, 0);
                return Err(QuiverError::Executor(format!("stage task aborted: {e}")));
            }
        };
        if let Err(e) = result {
            warn!(query_id = %query_id, stage_id = id.0, error = %e, "stage failed, cancelling query");
            metrics.inc_stage_failed(&query_id, id.0);
            cancel(&cancelled, &mut running).await;
            metrics.set_scheduler_running_stages(&query_id, 0);
            return Err(e);
        }
        metrics.inc_stage_completed(&query_id, id.0);
        for parent in &stages[id.0].parents {
            waiting[parent.0] -= 1;
            if waiting[parent.0] == 0 {
                running.push(spawn_stage(&ctx, &stages, *parent, &outputs, &cancelled));
            }
        }
        metrics.set_scheduler_running_stages(&query_id, running.len() as u64);
    }
    outputs.take_blocks(StageId(0))
}

/// Flags the remaining stages and waits for them to stop; they check the
/// flag between blocks.
async fn cancel(cancelled: &AtomicBool, running: &mut FuturesUnordered<StageHandle>) {
    cancelled.store(true, Ordering::Release);
    while running.next().await.is_some() {}
}

fn spawn_stage(
    ctx: &Arc<QueryContext>,
    stages: &Arc<Vec<Stage>>,
    id: StageId,
    outputs: &Arc<StageOutputs>,
    cancelled: &Arc<AtomicBool>,
) -> StageHandle {
    let ctx = Arc::clone(ctx);
    let stages = Arc::clone(stages);
    let outputs = Arc::clone(outputs);
    let cancelled = Arc::clone(cancelled);
    tokio::task::spawn_blocking(move || {
        let result = run_stage(&ctx, &stages[id.0], &outputs, &cancelled);
        (id, result)
    })
}

#[derive(Debug, Clone, Copy, Default)]
struct OperatorMetrics {
    rows_in: u64,
    rows_out: u64,
    batches_in: u64,
    batches_out: u64,
    elapsed: Duration,
}

impl OperatorMetrics {
    fn input(&mut self, block: &DataBlock) {
        self.rows_in += block.row_count() as u64;
        self.batches_in += 1;
    }

    fn output(&mut self, blocks: &[DataBlock]) {
        self.rows_out += blocks.iter().map(|b| b.row_count() as u64).sum::<u64>();
        self.batches_out += blocks.len() as u64;
    }
}

/// Drains the stage source through its operators into its sink and stores
/// the sink output.
fn run_stage(
    ctx: &QueryContext,
    stage: &Stage,
    outputs: &StageOutputs,
    cancelled: &AtomicBool,
) -> Result<()> {
    let started = Instant::now();
    debug!(
        query_id = %ctx.query_id(),
        stage_id = stage.id.0,
        operators = ?stage.operator_names(),
        "stage started"
    );
    let source = read_source(&stage.source, ctx, outputs)?;
    let mut operators = stage
        .operators
        .iter()
        .map(|spec| create_operator(spec, ctx, outputs))
        .collect::<Result<Vec<_>>>()?;
    let mut sink = create_sink(&stage.sink, ctx)?;
    let mut op_metrics = vec![OperatorMetrics::default(); operators.len()];
    let mut sink_metrics = OperatorMetrics::default();

    for block in source {
        if cancelled.load(Ordering::Acquire) {
            return Err(QuiverError::Executor(format!(
                "query {} cancelled",
                ctx.query_id()
            )));
        }
        let mut batch = vec![block];
        for (op, m) in operators.iter_mut().zip(op_metrics.iter_mut()) {
            let mut next = Vec::with_capacity(batch.len());
            for b in batch {
                m.input(&b);
                let t = Instant::now();
                let out = op.execute(b)?;
                m.elapsed += t.elapsed();
                m.output(&out);
                next.extend(out);
            }
            batch = next;
        }
        for b in batch {
            sink_metrics.input(&b);
            let t = Instant::now();
            sink.consume(b)?;
            sink_metrics.elapsed += t.elapsed();
        }
        // nothing past a satisfied LIMIT can produce rows
        if operators.iter().any(|op| op.is_finished()) {
            break;
        }
    }

    let sink_name = sink.name();
    let t = Instant::now();
    let output = sink.finalize()?;
    sink_metrics.elapsed += t.elapsed();
    outputs.insert(stage.id, output);

    let query_id = ctx.query_id().to_string();
    let metrics = ctx.metrics();
    for (op, m) in operators.iter().zip(&op_metrics) {
        metrics.record_operator(
            &query_id,
            stage.id.0,
            op.name(),
            m.rows_in,
            m.rows_out,
            m.batches_in,
            m.batches_out,
            m.elapsed.as_secs_f64(),
        );
    }
    metrics.record_operator(
        &query_id,
        stage.id.0,
        sink_name,
        sink_metrics.rows_in,
        sink_metrics.rows_in,
        sink_metrics.batches_in,
        sink_metrics.batches_in,
        sink_metrics.elapsed.as_secs_f64(),
    );
    debug!(
        query_id = %query_id,
        stage_id = stage.id.0,
        rows = sink_metrics.rows_in,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "stage completed"
    );
    Ok(())
}
