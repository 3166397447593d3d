use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use image::DynamicImage;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info};

use crate::error::ModelError;
use crate::models::{DefectType, Explanation, ExplanationSource, Severity};

/// A loaded vision-language model. Inference only.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Generate text for `prompt` conditioned on the image region
    async fn generate(&self, prompt: &str, region: &DynamicImage) -> Result<String, ModelError>;
}

/// Produces the process-wide [`VisionModel`] on first use
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn VisionModel>, ModelError>;

    /// Human-readable description of what is being loaded
    fn describe(&self) -> String;
}

/// Owned, lazily-initialized handle to the vision-language model.
///
/// The model is loaded at most once (concurrent first callers wait for the
/// same load) and shared through an `Arc`. Invocations pass through a
/// semaphore so a model that serves one request at a time is queued rather
/// than overrun. [`ModelHandle::shutdown`] drops the model and rejects every
/// later call.
pub struct ModelHandle {
    loader: Box<dyn ModelLoader>,
    model: Mutex<Option<Arc<dyn VisionModel>>>,
    permits: Semaphore,
    closed: AtomicBool,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("loader", &self.loader.describe())
            .field("available_permits", &self.permits.available_permits())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl ModelHandle {
    pub fn new(loader: impl ModelLoader + 'static, max_concurrent_requests: usize) -> Self {
        Self {
            loader: Box::new(loader),
            model: Mutex::new(None),
            permits: Semaphore::new(max_concurrent_requests.max(1)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn describe(&self) -> String {
        self.loader.describe()
    }

    pub async fn is_loaded(&self) -> bool {
        self.model.lock().await.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Load the model now instead of on the first request
    pub async fn warm_up(&self) -> Result<(), ModelError> {
        self.acquire_model().await.map(|_| ())
    }

    async fn acquire_model(&self) -> Result<Arc<dyn VisionModel>, ModelError> {
        if self.is_closed() {
            return Err(ModelError::ShutDown);
        }

        // Lock is held across the load so only one caller ever loads
        let mut slot = self.model.lock().await;
        if let Some(model) = slot.as_ref() {
            return Ok(model.clone());
        }
        if self.is_closed() {
            return Err(ModelError::ShutDown);
        }

        info!("Loading vision-language model: {}", self.loader.describe());
        let model = self.loader.load().await?;
        info!("Vision-language model loaded");

        *slot = Some(model.clone());
        Ok(model)
    }

    /// Run one generation, waiting for a free slot if the model is busy
    pub async fn generate(&self, prompt: &str, region: &DynamicImage) -> Result<String, ModelError> {
        let model = self.acquire_model().await?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ModelError::ShutDown)?;
        model.generate(prompt, region).await
    }

    /// Release the model. Calls already holding a permit finish normally.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.permits.close();
        if self.model.lock().await.take().is_some() {
            info!("Vision-language model released");
        }
    }
}

/// Process-wide health of the model-based provider.
///
/// Consecutive failures are counted; reaching the threshold demotes the
/// provider for the rest of the process. A success resets the count but never
/// undoes a demotion.
#[derive(Debug)]
pub struct ModelHealth {
    consecutive_failures: AtomicU32,
    demoted: AtomicBool,
    demote_after: u32,
}

impl ModelHealth {
    /// `demote_after == 0` disables demotion
    pub fn new(demote_after: u32) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            demoted: AtomicBool::new(false),
            demote_after,
        }
    }

    pub fn is_healthy(&self) -> bool {
        !self.demoted.load(Ordering::SeqCst)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// Returns true when this failure is the one that demoted the model
    pub fn record_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if self.demote_after == 0 || failures < self.demote_after {
            return false;
        }
        !self.demoted.swap(true, Ordering::SeqCst)
    }

    pub fn demote(&self) -> bool {
        !self.demoted.swap(true, Ordering::SeqCst)
    }
}

fn engineer_prompt(question: String) -> String {
    format!("Question: {} Answer:", question)
}

pub fn explanation_prompt(defect_type: DefectType, tier: Severity) -> String {
    engineer_prompt(format!(
        "You are a structural inspection engineer analyzing a {} severity {} defect. \
         Describe the structural condition and potential risk factors in technical terms. \
         Be concise and professional.",
        tier.as_str().to_lowercase(),
        defect_type
    ))
}

pub fn action_prompt(defect_type: DefectType, tier: Severity) -> String {
    engineer_prompt(format!(
        "You are a structural inspection engineer. For this {} severity {}, \
         provide a specific recommended action for maintenance or repair. \
         Be direct and actionable.",
        tier.as_str().to_lowercase(),
        defect_type
    ))
}

/// Strip an echoed prompt and surrounding whitespace; empty output is a failure
fn clean_output(prompt: &str, raw: String) -> Result<String, ModelError> {
    let text = raw.trim();
    let text = text.strip_prefix(prompt).unwrap_or(text).trim();
    if text.is_empty() {
        return Err(ModelError::EmptyOutput);
    }
    Ok(text.to_string())
}

/// Explanation provider backed by the shared [`ModelHandle`]
#[derive(Debug, Clone)]
pub struct ModelBasedExplainer {
    handle: Arc<ModelHandle>,
}

impl ModelBasedExplainer {
    pub fn new(handle: Arc<ModelHandle>) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &Arc<ModelHandle> {
        &self.handle
    }

    /// Both texts come from the model or the call fails as a whole
    pub async fn explain(
        &self,
        defect_type: DefectType,
        tier: Severity,
        region: &DynamicImage,
    ) -> Result<Explanation, ModelError> {
        let prompt = explanation_prompt(defect_type, tier);
        let text = clean_output(&prompt, self.handle.generate(&prompt, region).await?)?;

        let prompt = action_prompt(defect_type, tier);
        let recommended_action = clean_output(&prompt, self.handle.generate(&prompt, region).await?)?;

        debug!("Model explanation generated for {} {}", tier, defect_type);

        Ok(Explanation {
            text,
            recommended_action,
            source: ExplanationSource::ModelBased,
        })
    }
}
