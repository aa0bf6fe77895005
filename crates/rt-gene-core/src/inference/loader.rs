//! Weight loading utilities for safetensors format.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use safetensors::SafeTensors;
use tracing::debug;

use crate::error::{GazeError, Result};

/// Reads every tensor in a safetensors file onto `device`.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read
/// - The safetensors data is invalid
/// - A tensor uses a dtype candle does not support
pub fn read_safetensors(
    path: impl AsRef<Path>,
    device: &Device,
) -> Result<HashMap<String, Tensor>> {
    let path = path.as_ref();
    debug!("Reading safetensors from {}", path.display());

    let data = std::fs::read(path).map_err(|source| GazeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let tensors = SafeTensors::deserialize(&data)?;

    let mut tensor_map = HashMap::with_capacity(tensors.len());
    for (name, view) in tensors.tensors() {
        let dtype = safetensors_dtype_to_candle(view.dtype())?;
        let tensor = Tensor::from_raw_buffer(view.data(), dtype, view.shape(), device)?;
        tensor_map.insert(name, tensor);
    }

    debug!("Read {} tensors from {}", tensor_map.len(), path.display());
    Ok(tensor_map)
}

/// Loads a safetensors file as a frozen `VarBuilder` for inference.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_safetensors(path: impl AsRef<Path>, device: &Device) -> Result<VarBuilder<'static>> {
    let tensors = read_safetensors(path, device)?;
    Ok(VarBuilder::from_tensors(tensors, DType::F32, device))
}

/// Converts safetensors dtype to candle dtype.
fn safetensors_dtype_to_candle(dtype: safetensors::Dtype) -> Result<DType> {
    use safetensors::Dtype as S;
    match dtype {
        S::F32 => Ok(DType::F32),
        S::F64 => Ok(DType::F64),
        S::F16 => Ok(DType::F16),
        S::BF16 => Ok(DType::BF16),
        S::I64 => Ok(DType::I64),
        S::U8 => Ok(DType::U8),
        S::U32 => Ok(DType::U32),
        other => Err(GazeError::UnsupportedDtype(format!("{other:?}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[allow(clippy::expect_used)]
    fn create_test_safetensors() -> NamedTempFile {
        use safetensors::serialize;
        use safetensors::tensor::TensorView;

        let weights: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0];
        let counter: Vec<i64> = vec![7];
        let weight_bytes: &[u8] = bytemuck::cast_slice(&weights);
        let counter_bytes: &[u8] = bytemuck::cast_slice(&counter);

        let tensors = HashMap::from([
            (
                "bn1.weight".to_string(),
                TensorView::new(safetensors::Dtype::F32, vec![2, 2], weight_bytes)
                    .expect("valid tensor view"),
            ),
            (
                "bn1.num_batches_tracked".to_string(),
                TensorView::new(safetensors::Dtype::I64, vec![], counter_bytes)
                    .expect("valid tensor view"),
            ),
        ]);
        let serialized = serialize(&tensors, &None).expect("serialize");

        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(&serialized).expect("write");
        file
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_read_safetensors() {
        let file = create_test_safetensors();
        let tensors = read_safetensors(file.path(), &Device::Cpu).unwrap();
        assert_eq!(tensors.len(), 2);
        assert_eq!(tensors["bn1.weight"].dims(), &[2, 2]);
        assert_eq!(tensors["bn1.num_batches_tracked"].dtype(), DType::I64);
    }

    #[test]
    fn test_load_safetensors() {
        let file = create_test_safetensors();
        let vb = load_safetensors(file.path(), &Device::Cpu);
        assert!(vb.is_ok_and(|vb| vb.contains_tensor("bn1.weight")));
    }

    #[test]
    fn test_load_safetensors_missing_file() {
        let result = read_safetensors("/nonexistent/path.safetensors", &Device::Cpu);
        assert!(matches!(result, Err(GazeError::Io { .. })));
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn test_read_garbage_is_safetensors_error() {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(b"not a safetensors file").expect("write");
        let result = read_safetensors(file.path(), &Device::Cpu);
        assert!(matches!(result, Err(GazeError::Safetensors(_))));
    }
}
