//! Download orchestration.
//!
//! `begin` turns a validated token into a flowing byte stream: resolve the
//! dataset's physical copy through the router, build the transform plan,
//! honor a resume offset according to the plan's resumability, and wrap the
//! stream so progress advances as bytes leave and the session lands in the
//! right terminal state however the stream ends. The token is consumed only
//! on a clean end of stream, so an interrupted transfer can retry.

use datashare_core::models::download::{DownloadSession, TokenInfo};
use datashare_core::models::format::Resumability;
use datashare_core::AppError;
use datashare_storage::StorageRouter;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::catalog::DatasetCatalog;
use crate::progress::ProgressTracker;
use crate::tokens::TokenManager;
use crate::transform::{discard_prefix, from_storage, DataStream, TransferPlan};
use crate::AppResult;

/// A ready-to-serve download: the byte stream plus the response metadata
/// the HTTP layer needs.
pub struct DownloadStream {
    pub stream: DataStream,
    /// Exact output size when knowable (raw passthrough only).
    pub total_bytes: Option<u64>,
    pub content_type: &'static str,
    pub filename: String,
    pub resumable: bool,
    /// Byte offset this stream starts at, zero for a fresh download.
    pub offset: u64,
}

/// How a retry of an interrupted download should proceed.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RetryDecision {
    /// Offset the retry continues from; zero means restart.
    pub resume_offset: u64,
    /// True when the plan cannot continue mid-stream and the transfer
    /// starts over.
    pub restart: bool,
}

pub struct DownloadOrchestrator {
    tokens: Arc<TokenManager>,
    tracker: Arc<ProgressTracker>,
    catalog: Arc<dyn DatasetCatalog>,
    transform_ceiling: u64,
}

impl DownloadOrchestrator {
    pub fn new(
        tokens: Arc<TokenManager>,
        tracker: Arc<ProgressTracker>,
        catalog: Arc<dyn DatasetCatalog>,
        transform_ceiling: u64,
    ) -> Self {
        DownloadOrchestrator {
            tokens,
            tracker,
            catalog,
            transform_ceiling,
        }
    }

    /// Start (or resume) the transfer for a token.
    ///
    /// `offset` greater than zero requires a plan that supports offsets;
    /// `for_retry` relaxes single-use validation for an explicit retry.
    pub async fn begin(
        &self,
        router: &StorageRouter,
        token: &str,
        offset: u64,
        for_retry: bool,
    ) -> AppResult<DownloadStream> {
        let info = self.tokens.validate(token, for_retry)?;
        let dataset = self
            .catalog
            .get_dataset(info.dataset_id)
            .await?
            .ok_or_else(|| {
                AppError::DatasetUnavailable(format!("Dataset {} not found", info.dataset_id))
            })?;

        let plan = TransferPlan::new(dataset.stored_format, info.format, info.compression)?;

        if offset > 0 && !plan.resumability.supports_offset() {
            return Err(AppError::InvalidInput(
                "This download cannot resume from an offset; retry restarts from zero".to_string(),
            ));
        }
        if plan.requires_materialization() && dataset.size_bytes > self.transform_ceiling {
            return Err(AppError::TransformTooLarge {
                size: dataset.size_bytes,
                ceiling: self.transform_ceiling,
            });
        }

        if dataset.locations.is_empty() {
            return Err(AppError::DatasetUnavailable(format!(
                "Dataset {} has no stored file",
                dataset.id
            )));
        }

        let stem = dataset.name.clone();
        let inner_name = format!("{}.{}", stem, plan.requested_format.extension());

        // Reads only ever touch the dataset's recorded copies; a stray
        // object under the same key (an unverified migration copy) can
        // never satisfy a download.
        let stream = match plan.resumability {
            // The backend seeks; bytes on the wire are bytes in storage.
            Resumability::ByteSeekable => {
                from_storage(router.read_recorded(&dataset.locations, offset).await?)
            }
            // Re-derive the whole output and discard up to the offset.
            Resumability::RederiveAndDiscard => {
                let source = from_storage(router.read_recorded(&dataset.locations, 0).await?);
                let derived = plan.apply(source, self.transform_ceiling, &inner_name);
                if offset > 0 {
                    discard_prefix(derived, offset)
                } else {
                    derived
                }
            }
            Resumability::RestartOnly => {
                let source = from_storage(router.read_recorded(&dataset.locations, 0).await?);
                plan.apply(source, self.transform_ceiling, &inner_name)
            }
        };

        let total_bytes = plan.output_size(dataset.size_bytes);
        self.tracker
            .start(token, total_bytes.unwrap_or(0), offset);

        tracing::info!(
            dataset_id = %dataset.id,
            format = %plan.requested_format,
            compression = %plan.compression,
            offset,
            retry = for_retry,
            "Download started"
        );

        let instrumented = InstrumentedStream {
            inner: stream,
            tokens: Arc::clone(&self.tokens),
            tracker: Arc::clone(&self.tracker),
            token: token.to_string(),
            expected_total: total_bytes,
            delivered: offset,
            finished: false,
        };

        Ok(DownloadStream {
            stream: Box::pin(instrumented),
            total_bytes,
            content_type: plan.content_type(),
            filename: plan.filename(&stem),
            resumable: info.resumable,
            offset,
        })
    }

    /// Decide how a retry should proceed for an interrupted or failed
    /// session. The caller follows up with `begin(..., decision.resume_offset,
    /// true)`.
    pub fn retry(&self, token: &str) -> AppResult<RetryDecision> {
        let info = self.tokens.validate(token, true)?;
        let session = self.tracker.get(token)?;

        if !session.status.is_retryable() {
            return Err(AppError::InvalidInput(format!(
                "Download is {:?} and cannot be retried",
                session.status
            )));
        }

        let decision = if info.resumable {
            RetryDecision {
                resume_offset: session.resume_offset,
                restart: session.resume_offset == 0,
            }
        } else {
            RetryDecision {
                resume_offset: 0,
                restart: true,
            }
        };

        tracing::info!(
            resume_offset = decision.resume_offset,
            restart = decision.restart,
            "Retry accepted"
        );
        Ok(decision)
    }

    pub fn progress(&self, token: &str) -> AppResult<DownloadSession> {
        self.tracker.get(token)
    }

    pub fn token_info(&self, token: &str, for_retry: bool) -> AppResult<TokenInfo> {
        self.tokens.validate(token, for_retry)
    }
}

/// Wraps the outgoing stream to keep the session state truthful:
/// every chunk advances progress, a clean end completes the session and
/// consumes the token, an error fails it, and dropping the stream mid-way
/// (client hung up) interrupts it.
struct InstrumentedStream {
    inner: DataStream,
    tokens: Arc<TokenManager>,
    tracker: Arc<ProgressTracker>,
    token: String,
    expected_total: Option<u64>,
    delivered: u64,
    finished: bool,
}

impl Stream for InstrumentedStream {
    type Item = Result<bytes::Bytes, AppError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(chunk))) => {
                this.delivered += chunk.len() as u64;
                let _ = this.tracker.advance(&this.token, chunk.len() as u64);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finished = true;
                let _ = this.tracker.fail(&this.token, e.to_string());
                tracing::warn!(error = %e, "Download stream failed");
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finished = true;
                if let Some(total) = this.expected_total {
                    if this.delivered != total {
                        let err = AppError::StorageReadFailed(format!(
                            "Stream ended after {} of {} bytes",
                            this.delivered, total
                        ));
                        let _ = this.tracker.fail(&this.token, err.to_string());
                        return Poll::Ready(Some(Err(err)));
                    }
                }
                let _ = this.tracker.finish(&this.token);
                // AlreadyConsumed here just means this was a retry of a
                // finished transfer.
                let _ = this.tokens.consume(&this.token);
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for InstrumentedStream {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.tracker.interrupt(&self.token);
        }
    }
}
