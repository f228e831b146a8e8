use std::sync::{Arc, Mutex, PoisonError};

use crate::protocol::BodyError;
use crate::protocol::body::LazyBody;

/// A body that can be handed out exactly once.
///
/// Clones share the same slot, so whoever takes the body first owns it and every later attempt
/// fails with [`BodyError::StreamAlreadyConsumed`].
#[derive(Debug)]
pub struct OnceBody<B = LazyBody> {
    inner: Arc<Mutex<Option<B>>>,
}

impl<B> OnceBody<B> {
    pub fn new(body: B) -> Self {
        Self { inner: Arc::new(Mutex::new(Some(body))) }
    }

    pub fn can_consume(&self) -> bool {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    pub fn take(&self) -> Result<B, BodyError> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).take().ok_or(BodyError::StreamAlreadyConsumed)
    }
}

impl<B> Clone for OnceBody<B> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<B> From<B> for OnceBody<B> {
    fn from(body: B) -> Self {
        Self::new(body)
    }
}
