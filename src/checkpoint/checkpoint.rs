use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use log::info;
use serde::{Deserialize, Serialize};

use super::StateDict;
use crate::{
    Result,
    arch::{Architecture, Classifier, ClassifierBuilder},
};

/// Architecture hyperparameters plus every learned parameter of a classifier.
///
/// A checkpoint has no behavior of its own, models are turned into checkpoints with [`save`]
/// and rebuilt from them with [`load`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub input_size: usize,
    pub output_size: usize,
    pub hidden_layers: Vec<usize>,
    pub state_dict: StateDict,
}

impl Checkpoint {
    pub fn architecture(&self) -> Architecture {
        Architecture::new(self.input_size, self.output_size, &self.hidden_layers)
    }

    /// Writes this checkpoint as JSON to `path`, replacing any existing file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads a checkpoint previously written with [`Checkpoint::save_to`].
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Snapshots `model`.
///
/// The hidden widths are read off the model's layer stack, so they always agree with the
/// stored weight shapes.
pub fn save(model: &Classifier) -> Checkpoint {
    let arch = model.architecture();

    Checkpoint {
        input_size: arch.input_size,
        output_size: arch.output_size,
        hidden_layers: arch.hidden_sizes,
        state_dict: model.state_dict(),
    }
}

/// Builds a fresh classifier from the checkpoint's architecture and copies every stored
/// parameter into it.
///
/// Dropout isn't part of the persisted record, the rebuilt model uses the default probability.
///
/// # Returns
/// The rebuilt model, or an error if a stored parameter is missing, unexpected or has a
/// different shape than the freshly built model's. Nothing is partially loaded.
pub fn load(checkpoint: &Checkpoint) -> Result<Classifier> {
    let mut model = ClassifierBuilder::from_architecture(checkpoint.architecture()).build()?;
    model.load_state_dict(&checkpoint.state_dict)?;
    Ok(model)
}

/// Snapshots `model` straight into a JSON file.
pub fn save_to_file(model: &Classifier, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let checkpoint = save(model);
    checkpoint.save_to(path)?;

    info!(
        input_size = checkpoint.input_size,
        output_size = checkpoint.output_size;
        "saved checkpoint to {} with hidden layers {:?}",
        path.display(),
        checkpoint.hidden_layers
    );
    Ok(())
}

/// Rebuilds a classifier from a JSON checkpoint file.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Classifier> {
    let path = path.as_ref();
    let checkpoint = Checkpoint::load_from(path)?;
    let model = load(&checkpoint)?;

    info!(
        input_size = checkpoint.input_size,
        output_size = checkpoint.output_size;
        "loaded checkpoint from {} with hidden layers {:?}",
        path.display(),
        checkpoint.hidden_layers
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MlErr, checkpoint::TensorRecord, initialization::Init};

    fn const_model(hidden: &[usize]) -> Classifier {
        Classifier::builder(3, 2)
            .hidden_sizes(hidden)
            .init(Init::Const { value: 0.1 })
            .build()
            .unwrap()
    }

    #[test]
    fn save_records_architecture_and_every_parameter() {
        let checkpoint = save(&const_model(&[4]));

        assert_eq!(checkpoint.hidden_layers, [4]);
        let keys: Vec<_> = checkpoint.state_dict.keys().cloned().collect();
        assert_eq!(
            keys,
            [
                "hidden_layers.0.bias",
                "hidden_layers.0.weight",
                "output.bias",
                "output.weight"
            ]
        );
        assert_eq!(checkpoint.state_dict["hidden_layers.0.weight"].shape, [4, 3]);
        assert_eq!(checkpoint.state_dict["output.bias"].shape, [2]);
    }

    #[test]
    fn json_layout_uses_the_documented_field_names() {
        let value = serde_json::to_value(save(&const_model(&[]))).unwrap();

        assert_eq!(value["input_size"], 3);
        assert_eq!(value["output_size"], 2);
        assert_eq!(value["hidden_layers"], serde_json::json!([]));
        assert_eq!(value["state_dict"]["output.weight"]["shape"], serde_json::json!([2, 3]));
    }

    #[test]
    fn load_rejects_a_tampered_shape() {
        let mut checkpoint = save(&const_model(&[4]));
        checkpoint
            .state_dict
            .insert("output.weight".into(), TensorRecord::new([2, 5], vec![0.; 10]));

        assert!(matches!(load(&checkpoint), Err(MlErr::ShapeMismatch { .. })));
    }

    #[test]
    fn load_rejects_missing_and_extra_keys() {
        let mut checkpoint = save(&const_model(&[4]));
        checkpoint.state_dict.remove("output.bias");
        assert!(matches!(load(&checkpoint), Err(MlErr::MissingParam { .. })));

        let mut checkpoint = save(&const_model(&[4]));
        checkpoint
            .state_dict
            .insert("hidden_layers.7.bias".into(), TensorRecord::new([1], vec![0.]));
        assert!(matches!(load(&checkpoint), Err(MlErr::UnexpectedParam { .. })));
    }
}
