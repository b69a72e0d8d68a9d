//! ONNX Runtime session setup shared by the three OCR models.

use std::path::{Path, PathBuf};

use ort::{ExecutionProviderDispatch, GraphOptimizationLevel, Session};
use tracing::instrument;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    Cpu,
    #[cfg(feature = "tensorrt")]
    TensorRT,
    #[cfg(feature = "coreml")]
    CoreML,
    #[cfg(feature = "cuda")]
    Cuda,
    #[cfg(feature = "directml")]
    DirectML,
}

/// Accelerated providers compiled into this build, in preference order.
const GPU_PROVIDERS: &[ExecutionProvider] = &[
    #[cfg(feature = "tensorrt")]
    ExecutionProvider::TensorRT,
    #[cfg(feature = "coreml")]
    ExecutionProvider::CoreML,
    #[cfg(feature = "directml")]
    ExecutionProvider::DirectML,
    #[cfg(feature = "cuda")]
    ExecutionProvider::Cuda,
];

/// Provider list for the GPU toggle. CPU always comes last as the fallback.
pub fn providers_for(use_gpu: bool) -> Vec<ExecutionProvider> {
    let mut providers = Vec::new();
    if use_gpu {
        if GPU_PROVIDERS.is_empty() {
            log::warn!("GPU requested but no GPU execution provider was compiled in, using CPU");
        }
        providers.extend_from_slice(GPU_PROVIDERS);
    }
    providers.push(ExecutionProvider::Cpu);
    providers
}

#[allow(unused_variables)]
fn dispatch(
    provider: ExecutionProvider,
    cache_path: Option<&Path>,
) -> Option<ExecutionProviderDispatch> {
    match provider {
        // ort always falls back to the CPU provider on its own.
        ExecutionProvider::Cpu => None,
        #[cfg(feature = "tensorrt")]
        ExecutionProvider::TensorRT => {
            let mut trt = ort::TensorRTExecutionProvider::default()
                .with_timing_cache(true)
                .with_builder_optimization_level(5);
            if let Some(cache) = cache_path {
                trt = trt
                    .with_engine_cache(true)
                    .with_engine_cache_path(cache.to_string_lossy());
            }
            Some(trt.build())
        }
        #[cfg(feature = "coreml")]
        ExecutionProvider::CoreML => Some(ort::CoreMLExecutionProvider::default().build()),
        #[cfg(feature = "cuda")]
        ExecutionProvider::Cuda => Some(ort::CUDAExecutionProvider::default().build()),
        #[cfg(feature = "directml")]
        ExecutionProvider::DirectML => Some(ort::DirectMLExecutionProvider::default().build()),
    }
}

pub(crate) fn require_file(path: &Path) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(Error::MissingModel {
            path: path.to_path_buf(),
        })
    }
}

#[instrument(level = "debug", skip(providers))]
pub(crate) fn open_session(
    model: &Path,
    threads: usize,
    providers: &[ExecutionProvider],
    cache_path: Option<&Path>,
) -> Result<Session> {
    let model = require_file(model)?;

    #[cfg(feature = "directml")]
    let parallel = !providers.contains(&ExecutionProvider::DirectML);
    #[cfg(not(feature = "directml"))]
    let parallel = true;

    let dispatches = providers
        .iter()
        .filter_map(|provider| dispatch(*provider, cache_path))
        .collect::<Vec<_>>();

    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_memory_pattern(parallel)?
        .with_parallel_execution(parallel)?
        .with_inter_threads(threads)?
        .with_intra_threads(threads)?
        .with_execution_providers(dispatches)?
        .commit_from_file(&model)?;

    log::debug!("{model:?} inputs: {:?}", session.inputs);
    log::debug!("{model:?} outputs: {:?}", session.outputs);
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_is_always_the_last_provider() {
        assert_eq!(providers_for(false), vec![ExecutionProvider::Cpu]);
        assert_eq!(providers_for(true).last(), Some(&ExecutionProvider::Cpu));
    }

    #[test]
    fn missing_model_is_reported_with_its_path() {
        let err = require_file(Path::new("does/not/exist.onnx")).unwrap_err();
        assert!(matches!(err, Error::MissingModel { .. }));
        assert!(err.to_string().contains("exist.onnx"));
    }
}
