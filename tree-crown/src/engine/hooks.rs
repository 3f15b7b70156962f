//! Training hooks.

use super::{EventStorage, JsonWriter, Synchronize, ValidationLossHook};
use crate::{
    common::*, config::LearningRateSchedule, data::DataLoader, evaluation::DatasetEvaluator,
    model::DetectionModel, utils::LrSchedule,
};

/// Returns true if `iteration` is the last step of a period or of the run.
pub fn is_period_end(iteration: usize, max_iteration: usize, period: usize) -> bool {
    let next_iter = iteration + 1;
    next_iter == max_iteration || (period > 0 && next_iter % period == 0)
}

/// The training state handed to hooks.
pub struct HookContext<'a> {
    /// The current step, counted from zero.
    pub iteration: usize,
    /// The number of steps of the run.
    pub max_iteration: usize,
    pub model: &'a mut dyn DetectionModel,
    pub storage: &'a mut EventStorage,
}

/// A callback invoked by the training loop.
///
/// All methods default to no-ops.
pub trait Hook
where
    Self: Send,
{
    fn on_run_begin(&mut self, _ctx: &mut HookContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_step_begin(&mut self, _ctx: &mut HookContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called after every completed optimization step.
    fn on_step_end(&mut self, _ctx: &mut HookContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_run_end(&mut self, _ctx: &mut HookContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// The hooks known by the trainer.
pub enum TrainHook {
    IterationTimer(IterationTimer),
    LrScheduler(LrSchedulerHook),
    Eval(EvalHook),
    ValidationLoss(ValidationLossHook),
    PeriodicWriter(PeriodicWriter),
}

impl TrainHook {
    pub fn name(&self) -> &'static str {
        match self {
            Self::IterationTimer(_) => "IterationTimer",
            Self::LrScheduler(_) => "LrScheduler",
            Self::Eval(_) => "Eval",
            Self::ValidationLoss(_) => "ValidationLoss",
            Self::PeriodicWriter(_) => "PeriodicWriter",
        }
    }

    fn as_hook_mut(&mut self) -> &mut dyn Hook {
        match self {
            Self::IterationTimer(hook) => hook,
            Self::LrScheduler(hook) => hook,
            Self::Eval(hook) => hook,
            Self::ValidationLoss(hook) => hook,
            Self::PeriodicWriter(hook) => hook,
        }
    }
}

impl Debug for TrainHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TrainHook").field(&self.name()).finish()
    }
}

impl Hook for TrainHook {
    fn on_run_begin(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
        self.as_hook_mut().on_run_begin(ctx)
    }

    fn on_step_begin(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
        self.as_hook_mut().on_step_begin(ctx)
    }

    fn on_step_end(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
        self.as_hook_mut().on_step_end(ctx)
    }

    fn on_run_end(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
        self.as_hook_mut().on_run_end(ctx)
    }
}

macro_rules! impl_from_hook {
    ($variant:ident, $hook:ty) => {
        impl From<$hook> for TrainHook {
            fn from(hook: $hook) -> Self {
                Self::$variant(hook)
            }
        }
    };
}

impl_from_hook!(IterationTimer, IterationTimer);
impl_from_hook!(LrScheduler, LrSchedulerHook);
impl_from_hook!(Eval, EvalHook);
impl_from_hook!(ValidationLoss, ValidationLossHook);
impl_from_hook!(PeriodicWriter, PeriodicWriter);

pub use iteration_timer::*;
mod iteration_timer {
    use super::*;

    /// Records the duration of every step as the `time` scalar.
    #[derive(Debug, Default)]
    pub struct IterationTimer {
        run_start: Option<(Instant, usize)>,
        step_start: Option<Instant>,
    }

    impl IterationTimer {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Hook for IterationTimer {
        fn on_run_begin(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
            self.run_start = Some((Instant::now(), ctx.iteration));
            Ok(())
        }

        fn on_step_begin(&mut self, _ctx: &mut HookContext<'_>) -> Result<()> {
            self.step_start = Some(Instant::now());
            Ok(())
        }

        fn on_step_end(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
            if let Some(start) = self.step_start.take() {
                ctx.storage.put_scalar("time", start.elapsed().as_secs_f64());
            }
            Ok(())
        }

        fn on_run_end(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
            if let Some((start, start_iter)) = self.run_start.take() {
                let elapsed = start.elapsed();
                let num_iters = ctx.iteration.saturating_sub(start_iter);
                if num_iters > 0 {
                    info!(
                        "overall training speed: {} iterations in {:.2?} ({:.4} s / it)",
                        num_iters,
                        elapsed,
                        elapsed.as_secs_f64() / num_iters as f64
                    );
                }
            }
            Ok(())
        }
    }
}

pub use lr_scheduler_hook::*;
mod lr_scheduler_hook {
    use super::*;

    /// Sets the learning rate before each step and records it as the `lr` scalar.
    #[derive(Debug)]
    pub struct LrSchedulerHook {
        schedule: LrSchedule,
        lr: Option<f64>,
    }

    impl LrSchedulerHook {
        pub fn new(schedule: &LearningRateSchedule) -> Result<Self> {
            Ok(Self {
                schedule: LrSchedule::new(schedule)?,
                lr: None,
            })
        }
    }

    impl Hook for LrSchedulerHook {
        fn on_step_begin(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
            let lr = self.schedule.lr_at(ctx.iteration);
            ctx.model.set_lr(lr);
            self.lr = Some(lr);
            Ok(())
        }

        fn on_step_end(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
            if let Some(lr) = self.lr.take() {
                ctx.storage.put_scalar("lr", lr);
            }
            Ok(())
        }
    }
}

pub use eval_hook::*;
mod eval_hook {
    use super::*;

    /// Runs the accuracy evaluator periodically and after the last step.
    pub struct EvalHook {
        period: usize,
        data_loader: Arc<DataLoader>,
        evaluator: Box<dyn DatasetEvaluator>,
        comm: Arc<dyn Synchronize>,
    }

    impl EvalHook {
        pub fn new(
            period: usize,
            data_loader: Arc<DataLoader>,
            evaluator: Box<dyn DatasetEvaluator>,
            comm: Arc<dyn Synchronize>,
        ) -> Self {
            Self {
                period,
                data_loader,
                evaluator,
                comm,
            }
        }

        fn do_eval(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
            let _span = info_span!("evaluation", iteration = ctx.iteration).entered();
            info!(
                "start inference on {} batches",
                self.data_loader.len()
            );

            self.evaluator.reset();
            for batch in self.data_loader.iter() {
                let batch = batch?;
                let predictions = ctx.model.inference(&batch)?;
                self.evaluator.process(&batch, predictions)?;
            }
            let results = self.evaluator.evaluate()?;

            for (name, value) in results {
                ensure!(
                    value.is_finite(),
                    "evaluation result '{}' is not finite: {}",
                    name,
                    value
                );
                ctx.storage.put_scalar(format!("eval/{}", name), value);
            }

            self.comm.synchronize();
            Ok(())
        }
    }

    impl Debug for EvalHook {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("EvalHook")
                .field("period", &self.period)
                .field("num_batches", &self.data_loader.len())
                .finish()
        }
    }

    impl Hook for EvalHook {
        fn on_step_end(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
            let next_iter = ctx.iteration + 1;
            // the final evaluation is left to on_run_end
            if self.period > 0 && next_iter % self.period == 0 && next_iter != ctx.max_iteration {
                self.do_eval(ctx)?;
            }
            Ok(())
        }

        fn on_run_end(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
            if ctx.iteration >= ctx.max_iteration {
                self.do_eval(ctx)?;
            }
            Ok(())
        }
    }
}

pub use periodic_writer::*;
mod periodic_writer {
    use super::*;

    /// Writes the latest scalars to the metrics log and the console.
    ///
    /// It should be the last hook so that it sees the scalars of all other hooks.
    #[derive(Debug)]
    pub struct PeriodicWriter {
        period: NonZeroUsize,
        writer: JsonWriter,
    }

    impl PeriodicWriter {
        pub fn new(period: NonZeroUsize, writer: JsonWriter) -> Self {
            Self { period, writer }
        }

        fn write(&mut self, storage: &EventStorage) -> Result<()> {
            self.writer.write(storage)?;

            let latest = storage.latest_since(storage.iter());
            let text = latest
                .iter()
                .map(|(name, (_, value))| format!("{}: {:.4}", name, value))
                .join("  ");
            info!("iter: {}  {}", storage.iter(), text);
            Ok(())
        }
    }

    impl Hook for PeriodicWriter {
        fn on_step_end(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
            // the final step is written once by on_run_end, after the final evaluation
            let is_final_step = ctx.iteration + 1 == ctx.max_iteration;
            let is_due = is_period_end(ctx.iteration, ctx.max_iteration, self.period.get());
            if is_due && !is_final_step {
                self.write(ctx.storage)?;
            }
            Ok(())
        }

        fn on_run_end(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
            self.write(ctx.storage)
        }
    }
}
