//! Backend adapters — the connector layer between the runtime and an LLM.
//!
//! A [`Backend`] continues a raw text context, streaming pieces through an
//! unbounded channel as they are produced. The reasoning thread owns stopping:
//! it aborts the generation task once a complete `<rica>` tag appears at the
//! context tail, so implementations must tolerate cancellation at any await
//! point.

pub mod http;
pub mod scripted;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::GenerationConfig;
use crate::error::RicaResult;

pub use http::OpenAiCompatBackend;
pub use scripted::ScriptedBackend;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Short identifier for logs and thread listings.
    fn name(&self) -> &str;

    /// Continue `prompt`, sending each new piece through `token_tx` and
    /// returning the full completion. An empty completion means the model has
    /// nothing further to say for this context.
    async fn stream(
        &self,
        prompt: &str,
        config: &GenerationConfig,
        token_tx: mpsc::UnboundedSender<String>,
    ) -> RicaResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_is_object_safe() {
        fn _assert_object_safe(_: &dyn Backend) {}
    }
}
