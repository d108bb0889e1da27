//! Session handle wrapping a runtime [`ModelSession`].
//!
//! A [`Session`] is disposed by value, so a disposed session cannot be
//! prompted again and cannot be disposed twice. Dropping a live session
//! without disposing it is a leak and is logged as an error.

use super::{ModelSession, RuntimeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Process-local session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s-{}", self.0)
    }
}

/// How a session came to serve a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionOrigin {
    /// Created on demand for the request.
    Fresh,
    /// Created speculatively by a prefetch and consumed by the request.
    Pooled,
}

impl SessionOrigin {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Pooled => "pooled",
        }
    }
}

/// A live inference session.
pub struct Session {
    id: SessionId,
    system_prompt: Arc<str>,
    origin: SessionOrigin,
    inner: Option<Box<dyn ModelSession>>,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        system_prompt: Arc<str>,
        origin: SessionOrigin,
        inner: Box<dyn ModelSession>,
    ) -> Self {
        Self {
            id,
            system_prompt,
            origin,
            inner: Some(inner),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn origin(&self) -> SessionOrigin {
        self.origin
    }

    /// The instructions baked in at creation.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_none()
    }

    /// Prompt the session.
    ///
    /// # Errors
    /// Returns the runtime's error, or [`RuntimeError::Disposed`] if the
    /// runtime session is gone.
    pub async fn prompt(&mut self, text: &str) -> Result<String, RuntimeError> {
        let inner = self.inner.as_mut().ok_or(RuntimeError::Disposed)?;
        inner.prompt(text).await
    }

    /// Destroy the runtime session. Consumes the handle.
    pub(crate) async fn dispose(mut self) -> Result<(), RuntimeError> {
        match self.inner.take() {
            Some(mut inner) => inner.destroy().await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.inner.is_some() {
            tracing::error!(
                session_id = %self.id,
                origin = self.origin.as_str(),
                "session dropped without dispose; runtime context leaked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSession {
        destroyed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ModelSession for CountingSession {
        async fn prompt(&mut self, text: &str) -> Result<String, RuntimeError> {
            Ok(format!("echo: {text}"))
        }

        async fn destroy(&mut self) -> Result<(), RuntimeError> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn make_session(destroyed: &Arc<AtomicUsize>) -> Session {
        Session::new(
            SessionId(7),
            Arc::from("be brief"),
            SessionOrigin::Fresh,
            Box::new(CountingSession {
                destroyed: Arc::clone(destroyed),
            }),
        )
    }

    #[tokio::test]
    async fn prompt_then_dispose_destroys_once() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let mut session = make_session(&destroyed);
        assert_eq!(session.system_prompt(), "be brief");
        assert!(!session.is_disposed());

        let reply = session.prompt("hello").await.expect("prompt");
        assert_eq!(reply, "echo: hello");

        session.dispose().await.expect("dispose");
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn display_ids() {
        assert_eq!(SessionId(3).to_string(), "s-3");
        assert_eq!(SessionOrigin::Pooled.as_str(), "pooled");
    }
}
