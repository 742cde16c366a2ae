use std::{env, fs::File, io::BufWriter};

use anyhow::{Context, bail};
use log::info;

use mlp_classifier::{
    arch::{Mode, loss::NllLoss},
    checkpoint,
    configs::{self, Adapter, Run},
    training::metrics,
};

const CONFIG_ENV: &str = "MLP_CONFIG";

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let path = env::args()
        .nth(1)
        .or_else(|| env::var(CONFIG_ENV).ok())
        .with_context(|| format!("usage: mlp-classifier <config.json>, or set {CONFIG_ENV}"))?;

    let config = configs::load(&path).with_context(|| format!("cannot load config '{path}'"))?;

    let adapter = Adapter::new();
    let Run {
        mut model,
        mut optimizer,
        trainer,
        batch_size,
        mut rng,
    } = adapter.adapt(&config)?;

    let (mut train_set, test_set) = adapter
        .adapt_datasets(&config.dataset, &config.model)
        .context("cannot read the dataset")?;

    info!(
        "training {} -> {:?} -> {} on {} examples, validating on {}",
        model.input_size(),
        model.hidden_sizes(),
        model.output_size(),
        train_set.len(),
        test_set.len()
    );

    let history = trainer.fit(
        &mut model,
        &mut train_set,
        &test_set,
        batch_size,
        &NllLoss,
        &mut optimizer,
        &mut rng,
    )?;

    checkpoint::save_to_file(&model, &config.checkpoint)
        .with_context(|| format!("cannot write '{}'", config.checkpoint.display()))?;

    let history_path = config.checkpoint.with_extension("history.json");
    let writer = BufWriter::new(
        File::create(&history_path)
            .with_context(|| format!("cannot write '{}'", history_path.display()))?,
    );
    serde_json::to_writer_pretty(writer, &history)?;
    info!("wrote training history to {}", history_path.display());

    let mut reloaded = checkpoint::load_from_file(&config.checkpoint)?;
    model.set_mode(Mode::Eval);
    reloaded.set_mode(Mode::Eval);

    let Some(batch) = test_set.batches(batch_size)?.next() else {
        bail!("the test set is empty");
    };

    let x = batch.flatten()?;
    let probs = reloaded.predict(x)?;
    if model.predict(x)? != probs {
        bail!("the reloaded model disagrees with the trained one");
    }

    let (top_p, top_class) = metrics::top_k(probs.view(), 1);
    info!(
        "reloaded checkpoint predicts class {} with probability {:.3} for a test example labelled {}",
        top_class[[0, 0]],
        top_p[[0, 0]],
        batch.labels[0]
    );

    Ok(())
}
