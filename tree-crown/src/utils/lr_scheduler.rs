use crate::{common::*, config::LearningRateSchedule};

/// A validated learning rate schedule, looked up by iteration.
///
/// A constant rate is a single step starting at iteration zero.
#[derive(Debug, Clone)]
pub struct LrSchedule {
    /// `(first iteration, lr)` pairs with strictly increasing iterations.
    steps: Vec<(usize, f64)>,
}

impl LrSchedule {
    pub fn new(config: &LearningRateSchedule) -> Result<Self> {
        let steps = match config {
            LearningRateSchedule::Constant { lr } => vec![(0, lr.raw())],
            LearningRateSchedule::StepWise { steps } => steps
                .iter()
                .map(|&(iter, lr)| (iter, lr.raw()))
                .collect(),
        };

        ensure!(
            steps.first().map(|&(iter, _)| iter) == Some(0),
            "the lr schedule must start from iteration zero"
        );
        ensure!(
            steps.iter().tuple_windows().all(|(prev, next)| prev.0 < next.0),
            "the lr schedule iterations must be increasing"
        );
        ensure!(
            steps.iter().all(|&(_, lr)| lr > 0.0),
            "the lr must be positive"
        );

        Ok(Self { steps })
    }

    /// The lr in effect at `iteration`.
    pub fn lr_at(&self, iteration: usize) -> f64 {
        let index = self.steps.partition_point(|&(iter, _)| iter <= iteration);
        // the first step starts at zero, so index >= 1
        self.steps[index - 1].1
    }
}
