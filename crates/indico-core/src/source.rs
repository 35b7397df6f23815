//! Dependency payload sources

use crate::error::SourceError;
use async_trait::async_trait;
use indico_config::{Channel, ChannelPayload, OperatorConfig, ProxyEnvironment, RawInputs};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Latest payload of each dependency channel
#[async_trait]
pub trait DependencySource: Send + Sync {
    /// Latest payload of `channel`, `None` when nothing was received
    async fn payload(&self, channel: Channel) -> Result<Option<ChannelPayload>, SourceError>;
}

/// Collect every channel's payload together with the local options
///
/// # Errors
/// Returns [`SourceError`] when any channel cannot be read.
pub async fn gather_inputs(
    sources: &dyn DependencySource,
    options: &OperatorConfig,
    proxy: &ProxyEnvironment,
) -> Result<RawInputs, SourceError> {
    let mut inputs = RawInputs::new().with_options(options.clone()).with_proxy(proxy.clone());
    for channel in Channel::ALL {
        if let Some(payload) = sources.payload(channel).await? {
            inputs = inputs.with_payload(channel, payload);
        }
    }
    Ok(inputs)
}

/// In-memory [`DependencySource`] shared by cloning
#[derive(Debug, Clone, Default)]
pub struct MemoryDependencySource {
    payloads: Arc<Mutex<BTreeMap<Channel, ChannelPayload>>>,
    fail_next: Arc<AtomicUsize>,
}

impl MemoryDependencySource {
    /// Create source with no payloads
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a payload
    pub fn set(&self, channel: Channel, payload: ChannelPayload) {
        self.payloads.lock().insert(channel, payload);
    }

    /// Withdraw a payload (relation broken)
    pub fn remove(&self, channel: Channel) {
        self.payloads.lock().remove(&channel);
    }

    /// Fail the next `count` reads
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl DependencySource for MemoryDependencySource {
    async fn payload(&self, channel: Channel) -> Result<Option<ChannelPayload>, SourceError> {
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SourceError(format!("{channel} relation data unavailable")));
        }
        Ok(self.payloads.lock().get(&channel).cloned())
    }
}
