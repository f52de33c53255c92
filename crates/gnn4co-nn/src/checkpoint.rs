//! Model checkpoints as safetensors files.

use crate::error::Result;
use crate::model::RelaxationModel;
use std::path::{Path, PathBuf};

/// File extension of checkpoints.
pub const CHECKPOINT_EXT: &str = "safetensors";

/// `{log_dir}/model_ep{epoch}.safetensors`
pub fn epoch_checkpoint_path(log_dir: &Path, epoch: usize) -> PathBuf {
    log_dir.join(format!("model_ep{epoch}.{CHECKPOINT_EXT}"))
}

/// `{log_dir}/model_step{step}.safetensors`
pub fn step_checkpoint_path(log_dir: &Path, step: usize) -> PathBuf {
    log_dir.join(format!("model_step{step}.{CHECKPOINT_EXT}"))
}

/// Write every parameter of `model` to `path`.
pub fn save_model<M: RelaxationModel + ?Sized>(model: &M, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    model.varmap().save(path)?;
    tracing::debug!(path = %path.display(), "saved checkpoint");
    Ok(())
}

/// Overwrite the parameters of `model` in place from `path`.
///
/// Every parameter of the model must be present in the file; tensors keep
/// the model's device.
pub fn load_model<M: RelaxationModel + ?Sized>(model: &mut M, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    model.varmap_mut().load(path)?;
    tracing::debug!(path = %path.display(), "loaded checkpoint");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelConfig, RelaxationNet};
    use candle_core::{DType, Device, Tensor};

    #[test]
    fn test_paths() {
        let dir = Path::new("runs");
        assert_eq!(epoch_checkpoint_path(dir, 3), Path::new("runs/model_ep3.safetensors"));
        assert_eq!(step_checkpoint_path(dir, 40), Path::new("runs/model_step40.safetensors"));
    }

    #[test]
    fn test_load_restores_parameters() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("m.safetensors");
        let config = ModelConfig::default().with_num_layers(2).with_hidden_dim(4);

        let saved = RelaxationNet::new(&config, 2, &Device::Cpu, 1).unwrap();
        save_model(&saved, &path).unwrap();

        let mut restored = RelaxationNet::new(&config, 2, &Device::Cpu, 2).unwrap();
        load_model(&mut restored, &path).unwrap();

        let x = Tensor::new(&[[1f32, 0.0], [0.0, 1.0], [0.6, 0.8]], &Device::Cpu).unwrap();
        let index = Tensor::new(&[[0u32, 1, 1, 2], [1, 0, 2, 1]], &Device::Cpu).unwrap();
        let weight = Tensor::ones(4, DType::F32, &Device::Cpu).unwrap();
        let a = saved.forward_t(&x, &index, &weight, false).unwrap().to_vec2::<f32>().unwrap();
        let b = restored.forward_t(&x, &index, &weight, false).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_file_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let mut model = RelaxationNet::new(&ModelConfig::default().with_num_layers(1), 2, &Device::Cpu, 0).unwrap();
        assert!(load_model(&mut model, tmp.path().join("absent.safetensors")).is_err());
    }
}
