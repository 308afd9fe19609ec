//! Deferred release of GPU resources.
//!
//! Resources created later may depend on resources created earlier, so
//! the queue drains in reverse registration order. Actions are a closed
//! tagged union rather than boxed closures so the queue carries no
//! hidden captured state.

use crate::{Buffer, Sampler, Texture};

pub enum ReleaseAction {
    Buffer(Buffer),
    Texture(Texture),
    Sampler(Sampler),
}

impl From<Buffer> for ReleaseAction {
    fn from(buffer: Buffer) -> Self {
        ReleaseAction::Buffer(buffer)
    }
}

impl From<Texture> for ReleaseAction {
    fn from(texture: Texture) -> Self {
        ReleaseAction::Texture(texture)
    }
}

impl From<Sampler> for ReleaseAction {
    fn from(sampler: Sampler) -> Self {
        ReleaseAction::Sampler(sampler)
    }
}

#[derive(Default)]
pub struct ReleaseQueue {
    actions: Vec<ReleaseAction>,
}

impl ReleaseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: impl Into<ReleaseAction>) {
        self.actions.push(action.into());
    }

    /// Release everything, newest first.
    pub fn flush(&mut self) {
        while let Some(action) = self.actions.pop() {
            drop(action);
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
