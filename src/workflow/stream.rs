//! Simulated streaming for agents without native streaming.
//!
//! [`ChunkedText`] turns a complete response into a lazy, finite sequence of
//! single-character units (grapheme clusters) with a delay between units.
//! Each call to [`ChunkedText::stream`] starts over from the first unit.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt, stream};
use unicode_segmentation::UnicodeSegmentation;

use crate::agent::TextStream;

/// A response split into stream units.
#[derive(Debug, Clone)]
pub struct ChunkedText {
    units: Arc<[String]>,
    delay: Duration,
}

impl ChunkedText {
    /// Splits `text` into grapheme clusters.
    #[must_use]
    pub fn new(text: &str, delay: Duration) -> Self {
        Self {
            units: text.graphemes(true).map(String::from).collect(),
            delay,
        }
    }

    /// Number of units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` for empty text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Units in order, sleeping `delay` between consecutive units.
    pub fn stream(&self) -> impl Stream<Item = String> + Send + 'static {
        let units = Arc::clone(&self.units);
        let delay = self.delay;
        stream::unfold(0usize, move |index| {
            let units = Arc::clone(&units);
            async move {
                let unit = units.get(index)?.clone();
                if index > 0 && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Some((unit, index + 1))
            }
        })
    }
}

/// Wraps a complete response as a [`TextStream`].
#[must_use]
pub fn simulated_stream(text: &str, delay: Duration) -> TextStream {
    Box::pin(ChunkedText::new(text, delay).stream().map(Ok))
}
