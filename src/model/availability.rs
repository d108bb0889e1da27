//! Model capability gate.
//!
//! Queries the runtime for [`ModelAvailability`], folds the answer into the
//! last known state with [`ModelAvailability::advance`], and decides
//! whether an explain cycle may proceed. The probe never creates a session.

use super::{LanguageModel, ModelAvailability};
use crate::error::{MeanAiError, Result};
use std::sync::{Arc, Mutex, PoisonError};

pub struct CapabilityGate {
    model: Arc<dyn LanguageModel>,
    state: Mutex<ModelAvailability>,
}

impl CapabilityGate {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            state: Mutex::new(ModelAvailability::Unknown),
        }
    }

    /// The recorded state, without querying the runtime.
    pub fn last_known(&self) -> ModelAvailability {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Query the runtime and return the updated state.
    ///
    /// Idempotent and safe to call repeatedly. Once `unavailable` has been
    /// observed the runtime is not queried again until [`Self::reset`].
    /// A failed query is logged and leaves the recorded state untouched;
    /// if nothing was recorded yet the result is `unknown`.
    pub async fn check(&self) -> ModelAvailability {
        let current = self.last_known();
        if current == ModelAvailability::Unavailable {
            return current;
        }

        let observed = match self.model.availability().await {
            Ok(observed) => observed,
            Err(e) => {
                tracing::warn!(error = %e, "model availability query failed");
                ModelAvailability::Unknown
            }
        };

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let next = state.advance(observed);
        if next != *state {
            tracing::info!(from = %*state, to = %next, "model availability changed");
        }
        *state = next;
        next
    }

    /// Check availability and fail unless sessions may be created.
    ///
    /// # Errors
    /// - `ModelUnavailable` when the model cannot run or its state could not
    ///   be determined.
    /// - `ModelDownloading` while the download is still in progress.
    pub async fn ensure_ready(&self) -> Result<ModelAvailability> {
        match self.check().await {
            ModelAvailability::Unavailable => Err(MeanAiError::ModelUnavailable(
                "the on-device model is not available on this device".to_owned(),
            )),
            ModelAvailability::Downloading => Err(MeanAiError::ModelDownloading(
                "the on-device model is still downloading".to_owned(),
            )),
            ModelAvailability::Unknown => Err(MeanAiError::ModelUnavailable(
                "the on-device model status could not be determined".to_owned(),
            )),
            ready @ (ModelAvailability::Downloadable | ModelAvailability::Available) => Ok(ready),
        }
    }

    /// Forget a terminal `unavailable` so the next check queries again.
    /// Only ever triggered by an explicit user retry.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != ModelAvailability::Unknown {
            tracing::info!(from = %*state, "model availability reset");
        }
        *state = ModelAvailability::Unknown;
    }
}
