//! Batch conversion: many requests, results yielded as they finish.
//!
//! Results arrive in completion order, tagged with the index of the request
//! they belong to. The `concurrency` argument only bounds how many requests
//! are in flight on the caller's side; the converter's gate still decides how
//! many engines actually run.

use std::pin::Pin;

use futures::stream::{self, StreamExt};
use tokio_stream::Stream;
use tracing::info;

use crate::orchestrator::Converter;
use crate::output::ConversionResult;
use crate::request::ConversionRequest;

/// One finished request: its index in the input and its result.
pub type BatchItem = (usize, ConversionResult);

/// A boxed stream of batch results.
pub type BatchStream = Pin<Box<dyn Stream<Item = BatchItem> + Send>>;

impl Converter {
    /// Convert every request, at most `concurrency` at a time (minimum 1).
    ///
    /// # Example
    /// ```rust,no_run
    /// use edgequake_docconv::{ConversionRequest, Converter, ConverterConfig};
    /// use futures::StreamExt;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let converter = Converter::new(ConverterConfig::default())?;
    /// let requests = vec![
    ///     ConversionRequest::from_paths("a.docx", "a.pdf")?,
    ///     ConversionRequest::from_paths("b.xlsx", "b.pdf")?,
    /// ];
    /// let mut results = converter.convert_batch(requests, 2);
    /// while let Some((i, result)) = results.next().await {
    ///     println!("#{i}: success={}", result.success);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn convert_batch(&self, requests: Vec<ConversionRequest>, concurrency: usize) -> BatchStream {
        let total = requests.len();
        info!(total, concurrency, "starting batch conversion");

        let converter = self.clone();
        let s = stream::iter(requests.into_iter().enumerate().map(move |(index, request)| {
            let converter = converter.clone();
            async move { (index, converter.convert(&request).await) }
        }))
        .buffer_unordered(concurrency.max(1));

        Box::pin(s)
    }

    /// Like [`Converter::convert_batch`], but collects the results in
    /// request order.
    pub async fn convert_all(&self, requests: Vec<ConversionRequest>, concurrency: usize) -> Vec<ConversionResult> {
        let mut items: Vec<BatchItem> = self.convert_batch(requests, concurrency).collect().await;
        items.sort_by_key(|(index, _)| *index);
        items.into_iter().map(|(_, result)| result).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConverterConfig;
    use crate::engine::EngineSet;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn every_request_gets_exactly_one_result() {
        let tmp = tempfile::tempdir().unwrap();
        let config = ConverterConfig::builder()
            .temp_root(tmp.path().join("scratch"))
            .build()
            .unwrap();
        let converter = Converter::with_engines(config, EngineSet::new()).unwrap();

        let requests = (0..5)
            .map(|i| {
                ConversionRequest::from_paths(
                    tmp.path().join(format!("missing-{i}.docx")),
                    tmp.path().join(format!("out-{i}.pdf")),
                )
                .unwrap()
            })
            .collect();
        let results = converter.convert_all(requests, 3).await;
        assert_eq!(results.len(), 5);
        for r in &results {
            assert!(!r.success);
            assert_eq!(r.error.as_ref().unwrap().kind, ErrorKind::Validation);
        }
    }

    #[tokio::test]
    async fn empty_batch_finishes_immediately() {
        let converter = Converter::with_engines(ConverterConfig::default(), EngineSet::new()).unwrap();
        let mut s = converter.convert_batch(Vec::new(), 0);
        assert!(s.next().await.is_none());
    }
}
