use std::path::Path;

use parking_lot::Mutex;
use tch::{Device, IValue, Kind, Tensor, no_grad};

use crate::{
    error::ServiceError,
    features::FeatureTable,
    model::{ModelArtifact, Prediction, numeric_matrix},
};

/// TorchScript module fed an `[n_rows, n_features]` f32 tensor.
pub struct TorchScriptModel {
    feature_names: Vec<String>,
    module: Mutex<tch::CModule>,
}

impl TorchScriptModel {
    pub fn load(module_path: &Path, feature_names: Vec<String>) -> Result<Self, ServiceError> {
        if !module_path.exists() {
            return Err(ServiceError::Config(format!(
                "torchscript module missing: {}",
                module_path.display()
            )));
        }
        let mut module = tch::CModule::load_on_device(module_path, Device::Cpu)
            .map_err(|e| ServiceError::Inference(e.to_string()))?;
        module.set_eval();

        Ok(Self {
            feature_names,
            module: Mutex::new(module),
        })
    }
}

impl ModelArtifact for TorchScriptModel {
    fn flavor(&self) -> &'static str {
        "torchscript"
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, table: &FeatureTable) -> Result<Vec<Prediction>, ServiceError> {
        let matrix = numeric_matrix(table, &self.feature_names)?;
        let n_rows = matrix.len() as i64;
        let flat: Vec<f32> = matrix.into_iter().flatten().map(|v| v as f32).collect();
        let input = Tensor::from_slice(&flat).reshape([n_rows, self.feature_names.len() as i64]);

        let output = no_grad(|| {
            let module = self.module.lock();
            module
                .forward_is(&[IValue::Tensor(input)])
                .map_err(|e| ServiceError::Inference(e.to_string()))
        })?;

        let tensor = match output {
            IValue::Tensor(t) => t,
            IValue::Tuple(ref tuple) if !tuple.is_empty() => match &tuple[0] {
                IValue::Tensor(t) => t.shallow_clone(),
                _ => {
                    return Err(ServiceError::Inference(
                        "expected tensor as first tuple element".into(),
                    ));
                }
            },
            _ => return Err(ServiceError::Inference("unexpected model output format".into())),
        };

        // 2-D output holds per-class scores, 1-D output holds one value per row.
        let predictions = if tensor.dim() == 2 {
            let labels = tensor.argmax(1, false).to_kind(Kind::Int64);
            Vec::<i64>::try_from(&labels)
                .map_err(|e| ServiceError::Inference(e.to_string()))?
                .into_iter()
                .map(Prediction::Label)
                .collect()
        } else {
            let values = tensor.flatten(0, -1).to_kind(Kind::Double);
            Vec::<f64>::try_from(&values)
                .map_err(|e| ServiceError::Inference(e.to_string()))?
                .into_iter()
                .map(Prediction::Score)
                .collect()
        };
        Ok(predictions)
    }

    fn is_reentrant(&self) -> bool {
        false
    }
}
