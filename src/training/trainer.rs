use std::num::NonZeroUsize;

use log::{debug, info};
use rand::Rng;

use super::{EpochSummary, Validation, metrics};
use crate::{
    MlErr, Result,
    arch::{Classifier, Mode, loss::LossFn},
    data::{Batch, InMemoryDataset},
    optimization::Optimizer,
};

/// Trains `model` for `epochs` epochs with the default [`Trainer`].
///
/// Both batch sources are cloned once per epoch and must yield at least one batch, otherwise
/// the call fails with [`MlErr::EmptyBatches`] before the model is touched.
///
/// # Returns
/// One summary per epoch.
pub fn train<'a, 'b, T, V, L, O>(
    model: &mut Classifier,
    train_batches: T,
    validation_batches: V,
    loss_fn: &L,
    optimizer: &mut O,
    epochs: usize,
) -> Result<Vec<EpochSummary>>
where
    T: IntoIterator<Item = Batch<'a>> + Clone,
    V: IntoIterator<Item = Batch<'b>> + Clone,
    L: LossFn + ?Sized,
    O: Optimizer + ?Sized,
{
    Trainer::new(epochs).train(model, train_batches, validation_batches, loss_fn, optimizer)
}

/// Runs the training loop and keeps track of the running loss.
#[derive(Debug, Clone, Copy)]
pub struct Trainer {
    epochs: usize,
    log_every: Option<NonZeroUsize>,
}

impl Trainer {
    /// Creates a new `Trainer`.
    ///
    /// # Arguments
    /// * `epochs` - The amount of full passes over the training batches.
    pub fn new(epochs: usize) -> Self {
        Self {
            epochs,
            log_every: None,
        }
    }

    /// Logs the running loss every `steps` training steps within an epoch.
    pub fn with_log_every(mut self, steps: Option<NonZeroUsize>) -> Self {
        self.log_every = steps;
        self
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }

    /// Trains `model` over fixed batch sources, see [`train`].
    pub fn train<'a, 'b, T, V, L, O>(
        &self,
        model: &mut Classifier,
        train_batches: T,
        validation_batches: V,
        loss_fn: &L,
        optimizer: &mut O,
    ) -> Result<Vec<EpochSummary>>
    where
        T: IntoIterator<Item = Batch<'a>> + Clone,
        V: IntoIterator<Item = Batch<'b>> + Clone,
        L: LossFn + ?Sized,
        O: Optimizer + ?Sized,
    {
        ensure_batches(train_batches.clone(), "training")?;
        ensure_batches(validation_batches.clone(), "validation")?;

        (1..=self.epochs)
            .map(|epoch| {
                self.run_epoch(
                    epoch,
                    model,
                    train_batches.clone(),
                    validation_batches.clone(),
                    loss_fn,
                    optimizer,
                )
            })
            .collect()
    }

    /// Trains `model` reshuffling `train_set` at the start of every epoch.
    ///
    /// # Arguments
    /// * `train_set` - The examples to train with.
    /// * `validation_set` - The examples to validate with after every epoch, never shuffled.
    /// * `batch_size` - The amount of examples per batch.
    /// * `rng` - The source of randomness for the shuffles.
    #[allow(clippy::too_many_arguments)]
    pub fn fit<L, O, R>(
        &self,
        model: &mut Classifier,
        train_set: &mut InMemoryDataset,
        validation_set: &InMemoryDataset,
        batch_size: usize,
        loss_fn: &L,
        optimizer: &mut O,
        rng: &mut R,
    ) -> Result<Vec<EpochSummary>>
    where
        L: LossFn + ?Sized,
        O: Optimizer + ?Sized,
        R: Rng,
    {
        if train_set.is_empty() {
            return Err(MlErr::EmptyBatches { what: "training" });
        }

        if validation_set.is_empty() {
            return Err(MlErr::EmptyBatches { what: "validation" });
        }

        let validation_batches = validation_set.batches(batch_size)?;
        let mut history = Vec::with_capacity(self.epochs);

        for epoch in 1..=self.epochs {
            train_set.shuffle(rng);
            let train_batches = train_set.batches(batch_size)?;

            let summary = self.run_epoch(
                epoch,
                model,
                train_batches,
                validation_batches.clone(),
                loss_fn,
                optimizer,
            )?;
            history.push(summary);
        }

        Ok(history)
    }

    fn run_epoch<'a, 'b, T, V, L, O>(
        &self,
        epoch: usize,
        model: &mut Classifier,
        train_batches: T,
        validation_batches: V,
        loss_fn: &L,
        optimizer: &mut O,
    ) -> Result<EpochSummary>
    where
        T: IntoIterator<Item = Batch<'a>>,
        V: IntoIterator<Item = Batch<'b>>,
        L: LossFn + ?Sized,
        O: Optimizer + ?Sized,
    {
        model.set_mode(Mode::Train);

        let mut running_loss = 0.;
        let mut window_loss = 0.;
        let mut steps = 0;

        for batch in train_batches {
            let loss = train_step(model, batch, loss_fn, optimizer)?;
            running_loss += loss;
            window_loss += loss;
            steps += 1;

            let Some(every) = self.log_every else {
                continue;
            };

            if steps % every.get() == 0 {
                debug!(
                    epoch = epoch,
                    step = steps;
                    "training loss: {:.4}",
                    window_loss / every.get() as f32
                );
                window_loss = 0.;
            }
        }

        if steps == 0 {
            return Err(MlErr::EmptyBatches { what: "training" });
        }

        let Validation { loss, accuracy } = validate(model, validation_batches, loss_fn)?;
        model.set_mode(Mode::Train);

        let summary = EpochSummary {
            epoch,
            train_loss: running_loss / steps as f32,
            val_loss: loss,
            val_accuracy: accuracy,
        };

        info!(
            "epoch {}/{}.. training loss: {:.3}.. validation loss: {:.3}.. validation accuracy: {:.3}",
            epoch, self.epochs, summary.train_loss, summary.val_loss, summary.val_accuracy
        );

        Ok(summary)
    }
}

/// A single training step: resets the gradient, accumulates the batch's gradient and lets the
/// optimizer update the parameters.
///
/// # Returns
/// The batch's loss.
pub fn train_step<L, O>(
    model: &mut Classifier,
    batch: Batch<'_>,
    loss_fn: &L,
    optimizer: &mut O,
) -> Result<f32>
where
    L: LossFn + ?Sized,
    O: Optimizer + ?Sized,
{
    model.zero_grad();
    let loss = accumulate_grad(model, batch, loss_fn)?;
    model.step(optimizer)?;
    Ok(loss)
}

/// Forwards the batch and adds its loss gradient to the model's gradient, without resetting
/// it first.
pub fn accumulate_grad<L>(model: &mut Classifier, batch: Batch<'_>, loss_fn: &L) -> Result<f32>
where
    L: LossFn + ?Sized,
{
    let x = batch.flatten()?;
    let y_pred = model.forward(x)?;

    let loss = loss_fn.loss(y_pred.view(), batch.labels)?;
    let d = loss_fn.loss_prime(y_pred.view(), batch.labels)?;
    model.backward(d.view())?;

    Ok(loss)
}

/// Evaluates `model` over `batches` in evaluation mode and without tracking gradients.
///
/// The previous mode and gradient tracking are restored afterwards, also when an error is
/// returned.
pub fn validate<'a, I, L>(model: &mut Classifier, batches: I, loss_fn: &L) -> Result<Validation>
where
    I: IntoIterator<Item = Batch<'a>>,
    L: LossFn + ?Sized,
{
    let prev = model.mode();
    model.set_mode(Mode::Eval);

    let res = evaluate(&mut model.no_grad(), batches, loss_fn);

    model.set_mode(prev);
    res
}

fn evaluate<'a, I, L>(model: &mut Classifier, batches: I, loss_fn: &L) -> Result<Validation>
where
    I: IntoIterator<Item = Batch<'a>>,
    L: LossFn + ?Sized,
{
    let mut total_loss = 0.;
    let mut total_accuracy = 0.;
    let mut nbatches = 0;

    for batch in batches {
        let y_pred = model.forward(batch.flatten()?)?;
        total_loss += loss_fn.loss(y_pred.view(), batch.labels)?;
        total_accuracy += metrics::accuracy(y_pred.view(), batch.labels)?;
        nbatches += 1;
    }

    if nbatches == 0 {
        return Err(MlErr::EmptyBatches { what: "validation" });
    }

    Ok(Validation {
        loss: total_loss / nbatches as f32,
        accuracy: total_accuracy / nbatches as f32,
    })
}

fn ensure_batches<'a, I>(batches: I, what: &'static str) -> Result<()>
where
    I: IntoIterator<Item = Batch<'a>>,
{
    match batches.into_iter().next() {
        Some(_) => Ok(()),
        None => Err(MlErr::EmptyBatches { what }),
    }
}
