//! Pipeline coordinator: fans pages out to a fixed pool of worker tasks and
//! gathers the results back in page order.
//!
//! ## Ordering
//!
//! Workers pull [`Page`]s from one shared unbounded queue and write each
//! [`PageResult`] into a results table slot addressed by page index. Once
//! every worker task has been joined, the table is read front to back. The
//! order in which workers finish never influences the output.
//!
//! ## Failure containment
//!
//! Each page runs inside `catch_unwind`. A page that panics, or that returns a
//! [`PageError`] under the propagate policy, becomes an empty result carrying
//! the error. The worker then moves on to its next page.

use crate::config::PipelineConfig;
use crate::error::{PageError, Text2DocError};
use crate::output::{AssembledDocument, Page, PageResult};
use crate::pipeline::assemble::assemble;
use crate::pipeline::llm::GenerationClient;
use crate::pipeline::worker::process_page;
use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

/// Shared receiver for several workers pulling from one unbounded channel.
struct SharedReceiver<T> {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<T>>>,
}

impl<T> SharedReceiver<T> {
    fn new(rx: mpsc::UnboundedReceiver<T>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    async fn recv(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }
}

impl<T> Clone for SharedReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

/// One results slot per page, indexed by `Page::index`.
type ResultsTable = Arc<Mutex<Vec<Option<PageResult>>>>;

/// Runs a page set through the worker pool.
pub struct Coordinator {
    client: Arc<GenerationClient>,
    config: Arc<PipelineConfig>,
}

impl Coordinator {
    pub fn new(client: Arc<GenerationClient>, config: &PipelineConfig) -> Self {
        Self {
            client,
            config: Arc::new(config.clone()),
        }
    }

    /// Convert pages and assemble them into one document.
    pub async fn run(&self, pages: Vec<Page>) -> Result<AssembledDocument, Text2DocError> {
        let results = self.process_pages(pages).await?;
        assemble(&results, self.config.title.as_deref())
    }

    /// Convert every page, returning one result per page in index order.
    ///
    /// Fails only when the page set itself is invalid.
    pub async fn process_pages(&self, pages: Vec<Page>) -> Result<Vec<PageResult>, Text2DocError> {
        let pages = validate_pages(pages)?;
        let total = pages.len();
        let workers = self.config.concurrency.max(1).min(total.max(1));

        info!(pages = total, workers, "Dispatching pages");
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_conversion_start(total);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for page in pages {
            // The receiver is alive until the workers drop it.
            let _ = tx.send(page);
        }
        drop(tx);

        let queue = SharedReceiver::new(rx);
        let table: ResultsTable = Arc::new(Mutex::new(vec![None; total]));

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let queue = queue.clone();
                let table = table.clone();
                let client = self.client.clone();
                let config = self.config.clone();
                tokio::spawn(async move {
                    debug!(worker, "Page worker started");
                    while let Some(page) = queue.recv().await {
                        let index = page.index;
                        let result = run_contained(&client, &page, &config, total).await;
                        table.lock().await[index] = Some(result);
                    }
                    debug!(worker, "Page worker stopped");
                })
            })
            .collect();

        for (worker, joined) in join_all(handles).await.into_iter().enumerate() {
            if let Err(e) = joined {
                error!(worker, "Page worker task aborted: {e}");
            }
        }

        let slots = std::mem::take(&mut *table.lock().await);
        let results: Vec<PageResult> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    PageResult::failed(
                        index,
                        PageError::Panicked {
                            page: index + 1,
                            detail: "no result recorded for page".into(),
                        },
                    )
                })
            })
            .collect();

        let succeeded = results.iter().filter(|r| r.error.is_none()).count();
        info!(succeeded, total, "All pages finished");
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_conversion_complete(total, succeeded);
        }

        Ok(results)
    }
}

/// Process one page, demoting a page error or panic to an empty result.
async fn run_contained(
    client: &GenerationClient,
    page: &Page,
    config: &PipelineConfig,
    total: usize,
) -> PageResult {
    let page_num = page.page_num();
    if let Some(ref cb) = config.progress_callback {
        cb.on_page_start(page_num, total);
    }

    let outcome = AssertUnwindSafe(process_page(client, page, config))
        .catch_unwind()
        .await;

    let result = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            warn!(page = page_num, "Page failed: {e}");
            PageResult::failed(page.index, e)
        }
        Err(panic) => {
            let detail = panic_message(panic.as_ref());
            error!(page = page_num, "Page worker panicked: {detail}");
            PageResult::failed(
                page.index,
                PageError::Panicked {
                    page: page_num,
                    detail,
                },
            )
        }
    };

    if let Some(ref cb) = config.progress_callback {
        match &result.error {
            None => cb.on_page_complete(page_num, total, result.body.len()),
            Some(e) => cb.on_page_error(page_num, total, &e.to_string()),
        }
    }
    result
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Sort pages by index and check the indices are exactly `0..n`.
pub(crate) fn validate_pages(mut pages: Vec<Page>) -> Result<Vec<Page>, Text2DocError> {
    pages.sort_by_key(|p| p.index);
    for (expected, page) in pages.iter().enumerate() {
        if page.index != expected {
            let detail = if page.index < expected {
                format!("duplicate page index {}", page.index)
            } else {
                format!("missing page index {expected}")
            };
            return Err(Text2DocError::InvalidPages { detail });
        }
    }
    Ok(pages)
}
