//! Trait seam for the upstream inference backend.

use std::future::Future;
use std::pin::Pin;

use futures_util::Stream;

use convo_types::error::UpstreamError;
use convo_types::llm::{GenerationOutput, GenerationRequest, StreamEvent};

/// Boxed stream of generation events.
///
/// The stream is finite: zero or more `Fragment`s, then either a
/// `Completed` terminal event or an `Err` item, after which the stream
/// must be dropped.
pub type GenerationStream =
    Pin<Box<dyn Stream<Item = Result<StreamEvent, UpstreamError>> + Send + 'static>>;

/// Client for a remote text-generation backend.
pub trait InferenceClient: Send + Sync {
    /// One whole-response generation call.
    fn complete(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<GenerationOutput, UpstreamError>> + Send;

    /// Start a streaming generation call. Transport errors surface as
    /// stream items so that fragments received before the failure are
    /// still observable.
    fn stream(&self, request: GenerationRequest) -> GenerationStream;

    /// Whether the backend currently answers its health probe.
    fn healthy(&self) -> impl Future<Output = bool> + Send;
}
