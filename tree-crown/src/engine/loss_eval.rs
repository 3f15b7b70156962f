//! Loss on the validation set, computed the way the training loop does.

use super::{is_period_end, Hook, HookContext, Synchronize};
use crate::{
    common::*,
    data::{Batch, DataLoader},
    model::{total_loss, DetectionModel},
    utils::LogEveryN,
};

/// The name of the published scalar.
pub const VALIDATION_LOSS: &str = "validation_loss";

/// A constant scalar written on every step, used to check that hooks run.
pub const HEARTBEAT_SCALAR: (&str, f64) = ("timetest", 12.0);

const MAX_WARMUP_BATCHES: usize = 5;
/// Batches slower than this are reported even during the warm-up window.
const SLOW_BATCH_SECS: f64 = 5.0;

/// Publishes the mean loss over the validation set periodically and after
/// the last step.
pub struct ValidationLossHook {
    period: usize,
    data_loader: Arc<DataLoader>,
    comm: Arc<dyn Synchronize>,
}

impl ValidationLossHook {
    /// A zero `period` evaluates at the last step only.
    pub fn new(period: usize, data_loader: Arc<DataLoader>, comm: Arc<dyn Synchronize>) -> Self {
        Self {
            period,
            data_loader,
            comm,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn should_evaluate(&self, iteration: usize, max_iteration: usize) -> bool {
        is_period_end(iteration, max_iteration, self.period)
    }

    /// Run one pass over the validation loader and return the mean loss.
    ///
    /// It returns `None` if the loader is empty.
    pub fn evaluate_loss(&self, model: &mut dyn DetectionModel) -> Result<Option<f64>> {
        let total = self.data_loader.len();
        let mut state = EvalState::new(total);

        for (idx, batch) in self.data_loader.iter().enumerate() {
            let batch = batch?;
            state.begin_batch(idx);

            let compute_start = Instant::now();
            let loss = compute_loss(model, &batch)
                .with_context(|| format!("failed to compute validation loss on batch {}", idx))?;
            state.end_batch(idx, loss, compute_start.elapsed());
        }

        Ok(state.mean_loss())
    }

    fn do_loss_eval(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
        let _span = info_span!("validation_loss", iteration = ctx.iteration).entered();

        match self.evaluate_loss(ctx.model)? {
            Some(mean_loss) => ctx.storage.put_scalar(VALIDATION_LOSS, mean_loss),
            None => warn!("the validation set is empty, skip publishing {}", VALIDATION_LOSS),
        }

        self.comm.synchronize();
        Ok(())
    }
}

impl Debug for ValidationLossHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationLossHook")
            .field("period", &self.period)
            .field("num_batches", &self.data_loader.len())
            .field("rank", &self.comm.rank())
            .finish()
    }
}

impl Hook for ValidationLossHook {
    fn on_step_end(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
        if self.should_evaluate(ctx.iteration, ctx.max_iteration) {
            self.do_loss_eval(ctx)?;
        }
        let (name, value) = HEARTBEAT_SCALAR;
        ctx.storage.put_scalars([(name, value)]);
        Ok(())
    }
}

/// The sum of all loss components of a batch.
pub fn compute_loss(model: &mut dyn DetectionModel, batch: &Batch) -> Result<f64> {
    let losses = model.compute_losses(batch)?;
    Ok(total_loss(&losses))
}

/// Timing and loss accumulation of one evaluation pass.
#[derive(Debug)]
pub struct EvalState {
    total: usize,
    num_warmup: usize,
    start: Instant,
    total_compute_time: Duration,
    losses: Vec<f64>,
    limiter: LogEveryN,
}

impl EvalState {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            num_warmup: MAX_WARMUP_BATCHES.min(total.saturating_sub(1)),
            start: Instant::now(),
            total_compute_time: Duration::ZERO,
            losses: Vec::with_capacity(total),
            limiter: LogEveryN::with_five_second_interval(),
        }
    }

    pub fn num_warmup(&self) -> usize {
        self.num_warmup
    }

    /// Prepare for batch `idx`. Returns true if the timing counters were reset.
    pub fn begin_batch(&mut self, idx: usize) -> bool {
        if idx == self.num_warmup {
            self.start = Instant::now();
            self.total_compute_time = Duration::ZERO;
            true
        } else {
            false
        }
    }

    /// Record the loss of batch `idx` and report progress.
    pub fn end_batch(&mut self, idx: usize, loss: f64, compute_time: Duration) {
        self.losses.push(loss);
        self.total_compute_time += compute_time;

        if let Some((seconds_per_batch, eta)) = self.progress(idx) {
            if self.limiter.ready() {
                info!(
                    "loss on validation done {}/{}. {:.4} s / batch. ETA={:?}, elapsed={:.2?}",
                    idx + 1,
                    self.total,
                    seconds_per_batch,
                    eta,
                    self.start.elapsed()
                );
            }
        }
    }

    /// The seconds per batch and the remaining time after batch `idx`, if
    /// progress is worth reporting.
    ///
    /// Progress is reported once twice the warm-up window has passed, or
    /// earlier if batches are slower than five seconds. The ETA is truncated
    /// to whole seconds.
    pub fn progress(&self, idx: usize) -> Option<(f64, Duration)> {
        let seconds_per_batch = self.seconds_per_batch(idx);
        if idx < self.num_warmup * 2 && seconds_per_batch <= SLOW_BATCH_SECS {
            return None;
        }
        let remaining = self.total.saturating_sub(idx + 1);
        let eta = Duration::from_secs((seconds_per_batch * remaining as f64) as u64);
        Some((seconds_per_batch, eta))
    }

    /// The mean compute time per batch since the warm-up window.
    pub fn seconds_per_batch(&self, idx: usize) -> f64 {
        let warmup = if idx >= self.num_warmup {
            self.num_warmup
        } else {
            0
        };
        let iters_after_start = idx + 1 - warmup;
        self.total_compute_time.as_secs_f64() / iters_after_start as f64
    }

    pub fn losses(&self) -> &[f64] {
        &self.losses
    }

    pub fn mean_loss(&self) -> Option<f64> {
        if self.losses.is_empty() {
            return None;
        }
        Some(self.losses.iter().sum::<f64>() / self.losses.len() as f64)
    }
}
