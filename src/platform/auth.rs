// src/platform/auth.rs
//! Authentication prompt text and cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

/// Strings shown by the platform prompt. Rendering is the platform's job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPrompt {
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub cancel: Option<String>,
}

impl AuthPrompt {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Shared cancellation flag for an in-flight authentication
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a key retrieval needs to drive a prompt
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub prompt: Option<AuthPrompt>,
    pub cancel: CancelToken,
}

impl AuthContext {
    pub fn new(prompt: Option<AuthPrompt>, cancel: CancelToken) -> Self {
        Self { prompt, cancel }
    }

    /// Fails with [`PlatformError::Canceled`] once the token has fired
    pub fn ensure_not_cancelled(&self) -> Result<(), PlatformError> {
        if self.cancel.is_cancelled() {
            Err(PlatformError::Canceled)
        } else {
            Ok(())
        }
    }
}
