//! Loss histories persisted as 1-D `.npy` arrays.

use crate::error::Result;
use candle_core::{Device, Tensor};
use std::path::{Path, PathBuf};

pub const TRAIN_LOSSES_FILE: &str = "train_losses.npy";
pub const VALID_LOSSES_FILE: &str = "valid_losses.npy";

pub fn train_losses_path(log_dir: &Path) -> PathBuf {
    log_dir.join(TRAIN_LOSSES_FILE)
}

pub fn valid_losses_path(log_dir: &Path) -> PathBuf {
    log_dir.join(VALID_LOSSES_FILE)
}

/// Write `losses` as a float32 vector.
pub fn save_losses(path: impl AsRef<Path>, losses: &[f32]) -> Result<()> {
    let tensor = Tensor::from_slice(losses, losses.len(), &Device::Cpu)?;
    tensor.write_npy(path)?;
    Ok(())
}

/// Read a history written by [`save_losses`].
pub fn load_losses(path: impl AsRef<Path>) -> Result<Vec<f32>> {
    let tensor = Tensor::read_npy(path)?;
    Ok(tensor.flatten_all()?.to_vec1::<f32>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = train_losses_path(tmp.path());
        save_losses(&path, &[3.5, 2.25, -1.0]).unwrap();
        assert_eq!(load_losses(&path).unwrap(), vec![3.5, 2.25, -1.0]);
    }

    #[test]
    fn test_file_names() {
        let dir = Path::new("out");
        assert_eq!(train_losses_path(dir), Path::new("out/train_losses.npy"));
        assert_eq!(valid_losses_path(dir), Path::new("out/valid_losses.npy"));
    }
}
