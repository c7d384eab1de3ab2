//! Debounced filtering of the entry list.
//!
//! Every query change schedules a pass that waits out a quiet period, then
//! reads the latest snapshot and query, computes the ordered name list and
//! publishes it. Scheduling a new pass cancels the pending one, and the
//! cancellation check and the publish happen under the same lock the
//! scheduler uses, so a stale pass can never overwrite a newer result.

use crate::error::{KitError, Result};
use crate::models::Entry;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Quiet period before a scheduled pass runs.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(180);

/// Category selector of the filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Category {
    #[default]
    All,
    Kind(String),
}

impl Category {
    /// `"All"` (any case) or blank selects everything; anything else is a kind.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() || text.eq_ignore_ascii_case("all") {
            Category::All
        } else {
            Category::Kind(text.to_string())
        }
    }

    fn admits(&self, entry: &Entry) -> bool {
        match self {
            Category::All => true,
            Category::Kind(kind) => entry.kind.to_lowercase() == kind.to_lowercase(),
        }
    }
}

/// Keyword and category of the current view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterQuery {
    pub keyword: String,
    pub category: Category,
}

impl FilterQuery {
    pub fn new(keyword: &str, category: Category) -> Self {
        Self {
            keyword: keyword.trim().to_string(),
            category,
        }
    }

    /// Names of matching entries, most recently updated first.
    pub fn apply(&self, entries: &[Entry]) -> Vec<String> {
        let keyword = self.keyword.trim().to_lowercase();

        let mut matched: Vec<&Entry> = entries
            .iter()
            .filter(|e| self.category.admits(e))
            .filter(|e| {
                keyword.is_empty()
                    || e.name.to_lowercase().contains(&keyword)
                    || e.description
                        .as_deref()
                        .unwrap_or_default()
                        .to_lowercase()
                        .contains(&keyword)
            })
            .collect();

        // stable: ties keep snapshot order
        matched.sort_by(|a, b| b.updated_utc.cmp(&a.updated_utc));
        matched.into_iter().map(|e| e.name.clone()).collect()
    }
}

/// Result of one completed pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterResult {
    pub names: Vec<String>,
    pub total: usize,
}

impl FilterResult {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            total: names.len(),
            names,
        }
    }

    /// Status line shown under the list.
    pub fn status(&self) -> String {
        format!("Total: {}", self.total)
    }
}

/// What a pass delivers to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterEvent {
    Published(FilterResult),
    Status(String),
}

/// Where a pass reads its input, at the moment it resumes after the delay.
pub trait FilterSource: Send + Sync + 'static {
    fn snapshot(&self) -> Result<Arc<[Entry]>>;
    fn query(&self) -> Result<FilterQuery>;
}

/// Where a pass delivers its output.
pub trait FilterSink: Send + Sync + 'static {
    fn publish(&self, result: FilterResult);
    fn report(&self, status: String);
}

impl FilterSink for UnboundedSender<FilterEvent> {
    fn publish(&self, result: FilterResult) {
        if self.send(FilterEvent::Published(result)).is_err() {
            trace!("filter result dropped, receiver closed");
        }
    }

    fn report(&self, status: String) {
        if self.send(FilterEvent::Status(status)).is_err() {
            trace!("filter status dropped, receiver closed");
        }
    }
}

/// Entry snapshot and query shared between the owner thread and passes.
pub struct ViewState {
    entries: RwLock<Arc<[Entry]>>,
    query: RwLock<FilterQuery>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewState {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Arc::from(Vec::new())),
            query: RwLock::new(FilterQuery::default()),
        }
    }

    pub fn set_entries(&self, snapshot: Arc<[Entry]>) -> Result<()> {
        *self.entries.write().map_err(|_| KitError::StatePoisoned)? = snapshot;
        Ok(())
    }

    pub fn set_keyword(&self, keyword: &str) -> Result<()> {
        self.query.write().map_err(|_| KitError::StatePoisoned)?.keyword = keyword.trim().to_string();
        Ok(())
    }

    pub fn set_category(&self, category: Category) -> Result<()> {
        self.query.write().map_err(|_| KitError::StatePoisoned)?.category = category;
        Ok(())
    }
}

impl FilterSource for ViewState {
    fn snapshot(&self) -> Result<Arc<[Entry]>> {
        Ok(self.entries.read().map_err(|_| KitError::StatePoisoned)?.clone())
    }

    fn query(&self) -> Result<FilterQuery> {
        Ok(self.query.read().map_err(|_| KitError::StatePoisoned)?.clone())
    }
}

/// Schedules debounced, cancellable filter passes.
pub struct FilterEngine {
    source: Arc<dyn FilterSource>,
    sink: Arc<dyn FilterSink>,
    delay: Duration,
    runtime: Handle,
    pending: Arc<Mutex<Option<CancellationToken>>>,
}

impl FilterEngine {
    /// Create an engine on the current tokio runtime. Fails with
    /// [`KitError::NoRuntime`] when called outside one.
    pub fn new(source: Arc<dyn FilterSource>, sink: Arc<dyn FilterSink>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| KitError::NoRuntime)?;
        Ok(Self::with_runtime(source, sink, runtime))
    }

    pub fn with_runtime(source: Arc<dyn FilterSource>, sink: Arc<dyn FilterSink>, runtime: Handle) -> Self {
        Self {
            source,
            sink,
            delay: DEFAULT_DEBOUNCE,
            runtime,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Cancel any pending pass and schedule a new one.
    pub fn schedule(&self) -> JoinHandle<()> {
        let token = CancellationToken::new();
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(previous) = pending.replace(token.clone()) {
                previous.cancel();
            }
        }

        let pass = Pass {
            source: Arc::clone(&self.source),
            sink: Arc::clone(&self.sink),
            pending: Arc::clone(&self.pending),
            delay: self.delay,
            token,
        };
        self.runtime.spawn(pass.run())
    }

    /// Cancel the pending pass, if any, without scheduling another.
    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = pending.take() {
            token.cancel();
        }
    }
}

impl Drop for FilterEngine {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct Pass {
    source: Arc<dyn FilterSource>,
    sink: Arc<dyn FilterSink>,
    pending: Arc<Mutex<Option<CancellationToken>>>,
    delay: Duration,
    token: CancellationToken,
}

impl Pass {
    async fn run(self) {
        tokio::select! {
            _ = self.token.cancelled() => {
                trace!("filter pass cancelled during debounce");
                return;
            }
            _ = tokio::time::sleep(self.delay) => {}
        }

        let outcome = self.compute();

        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if self.token.is_cancelled() {
            trace!("filter pass superseded before publishing");
            return;
        }
        match outcome {
            Ok(result) => {
                debug!(total = result.total, "publishing filter result");
                self.sink.publish(result);
            }
            Err(e) => {
                warn!("filter pass failed: {e}");
                self.sink.report(format!("Filter error: {e}"));
            }
        }
        drop(pending);
    }

    fn compute(&self) -> Result<FilterResult> {
        let snapshot = self.source.snapshot()?;
        let query = self.source.query()?;
        Ok(FilterResult::new(query.apply(&snapshot)))
    }
}
