use super::{EventStorage, Hook, HookContext, TrainHook};
use crate::{
    common::*,
    data::{Batch, DataLoader},
    model::{total_loss, DetectionModel},
};

/// The iteration-based training loop.
pub struct Trainer {
    model: Box<dyn DetectionModel>,
    train_loader: DataLoader,
    hooks: Vec<TrainHook>,
    storage: EventStorage,
    start_iter: usize,
    max_iter: usize,
}

impl Trainer {
    pub fn new(
        model: Box<dyn DetectionModel>,
        train_loader: DataLoader,
        start_iter: usize,
        max_iter: usize,
    ) -> Self {
        Self {
            model,
            train_loader,
            hooks: vec![],
            storage: EventStorage::new(start_iter),
            start_iter,
            max_iter,
        }
    }

    pub fn hooks(&self) -> &[TrainHook] {
        &self.hooks
    }

    /// The hook list. Hooks run in list order.
    pub fn hooks_mut(&mut self) -> &mut Vec<TrainHook> {
        &mut self.hooks
    }

    pub fn register_hooks<I>(&mut self, hooks: I)
    where
        I: IntoIterator<Item = TrainHook>,
    {
        self.hooks.extend(hooks);
    }

    pub fn storage(&self) -> &EventStorage {
        &self.storage
    }

    pub fn model_mut(&mut self) -> &mut dyn DetectionModel {
        self.model.as_mut()
    }

    pub fn start_iter(&self) -> usize {
        self.start_iter
    }

    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    /// Run the steps from the start to the last iteration.
    pub fn train(&mut self) -> Result<()> {
        let Self {
            start_iter,
            max_iter,
            ..
        } = *self;
        info!("starting training from iteration {}", start_iter);

        let mut stream = self.train_loader.cycle();

        self.call_hooks(start_iter, |hook, ctx| hook.on_run_begin(ctx))?;

        for iteration in start_iter..max_iter {
            self.storage.set_iter(iteration);
            self.call_hooks(iteration, |hook, ctx| hook.on_step_begin(ctx))?;

            let batch = stream
                .next()
                .ok_or_else(|| format_err!("the training set is empty"))??;
            self.run_step(&batch)
                .with_context(|| format!("training failed at iteration {}", iteration))?;

            self.call_hooks(iteration, |hook, ctx| hook.on_step_end(ctx))?;
        }

        self.call_hooks(max_iter, |hook, ctx| hook.on_run_end(ctx))?;
        Ok(())
    }

    /// Run one optimization step and record its losses.
    pub fn run_step(&mut self, batch: &Batch) -> Result<()> {
        let losses = self.model.train_step(batch)?;
        let total = total_loss(&losses);
        ensure!(
            total.is_finite(),
            "loss became infinite or NaN at iteration {}: {:?}",
            self.storage.iter(),
            losses
        );

        self.storage.put_scalars(losses);
        self.storage.put_scalar("total_loss", total);
        Ok(())
    }

    fn call_hooks<F>(&mut self, iteration: usize, mut f: F) -> Result<()>
    where
        F: FnMut(&mut TrainHook, &mut HookContext<'_>) -> Result<()>,
    {
        let Self {
            model,
            hooks,
            storage,
            max_iter,
            ..
        } = self;
        let mut ctx = HookContext {
            iteration,
            max_iteration: *max_iter,
            model: model.as_mut(),
            storage,
        };

        hooks.iter_mut().try_for_each(|hook| {
            let name = hook.name();
            f(hook, &mut ctx).with_context(|| format!("hook {} failed", name))
        })
    }
}

impl Debug for Trainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trainer")
            .field("hooks", &self.hooks)
            .field("start_iter", &self.start_iter)
            .field("max_iter", &self.max_iter)
            .finish()
    }
}
