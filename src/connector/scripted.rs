//! A deterministic backend that replays scripted completions.
//!
//! Each call to [`Backend::stream`] pops the next scripted completion and
//! emits it in small pieces, mimicking token streaming. Once the script is
//! exhausted every call returns an empty completion, which the reasoning
//! thread treats as a natural end of generation.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::GenerationConfig;
use crate::error::RicaResult;

use super::Backend;

const PIECE_CHARS: usize = 8;

pub struct ScriptedBackend {
    script: Mutex<VecDeque<String>>,
}

impl ScriptedBackend {
    pub fn new(completions: Vec<String>) -> Self {
        Self {
            script: Mutex::new(completions.into()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Queue another completion after construction.
    pub fn push(&self, completion: impl Into<String>) {
        self.script
            .lock()
            .expect("script mutex poisoned")
            .push_back(completion.into());
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().expect("script mutex poisoned").len()
    }
}

/// Split a completion into streaming pieces on char boundaries.
fn pieces(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut piece = String::new();
    for (count, c) in text.chars().enumerate() {
        piece.push(c);
        if (count + 1) % PIECE_CHARS == 0 {
            out.push(std::mem::take(&mut piece));
        }
    }
    if !piece.is_empty() {
        out.push(piece);
    }
    out
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(
        &self,
        _prompt: &str,
        _config: &GenerationConfig,
        token_tx: mpsc::UnboundedSender<String>,
    ) -> RicaResult<String> {
        let completion = self
            .script
            .lock()
            .expect("script mutex poisoned")
            .pop_front()
            .unwrap_or_default();

        for piece in pieces(&completion) {
            if token_tx.send(piece).is_err() {
                break;
            }
            // Yield so the consumer can observe tokens incrementally.
            tokio::task::yield_now().await;
        }

        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_order() {
        let backend = ScriptedBackend::new(vec!["first".into(), "second".into()]);
        let config = GenerationConfig::default();

        let (tx, _rx) = mpsc::unbounded_channel();
        assert_eq!(backend.stream("", &config, tx).await.unwrap(), "first");
        let (tx, _rx) = mpsc::unbounded_channel();
        assert_eq!(backend.stream("", &config, tx).await.unwrap(), "second");
        let (tx, _rx) = mpsc::unbounded_channel();
        assert_eq!(backend.stream("", &config, tx).await.unwrap(), "");
    }

    #[tokio::test]
    async fn streams_pieces_that_reassemble() {
        let text = "a longer completion that spans several pieces";
        let backend = ScriptedBackend::new(vec![text.into()]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let full = backend
            .stream("", &GenerationConfig::default(), tx)
            .await
            .unwrap();
        assert_eq!(full, text);

        let mut assembled = String::new();
        let mut count = 0;
        while let Some(piece) = rx.recv().await {
            assembled.push_str(&piece);
            count += 1;
        }
        assert_eq!(assembled, text);
        assert!(count > 1);
    }

    #[test]
    fn pieces_respect_char_boundaries() {
        let text = "日本語のテキストでも安全に分割できる";
        let assembled: String = pieces(text).concat();
        assert_eq!(assembled, text);
    }

    #[tokio::test]
    async fn push_appends_to_script() {
        let backend = ScriptedBackend::empty();
        backend.push("later");
        assert_eq!(backend.remaining(), 1);

        let (tx, _rx) = mpsc::unbounded_channel();
        let full = backend
            .stream("", &GenerationConfig::default(), tx)
            .await
            .unwrap();
        assert_eq!(full, "later");
        assert_eq!(backend.remaining(), 0);
    }
}
