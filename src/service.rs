//! Service layer tying the entry store to the filtered view.
//!
//! Every mutation saves, publishes a fresh snapshot to the shared view state
//! and schedules a filter pass, in that order.

use crate::error::{KitError, Result};
use crate::filter::{Category, FilterEngine, FilterSink, ViewState};
use crate::models::{EntryDraft, KindSet};
use crate::store::{EntryStore, ExportReport, ImportReport};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::warn;
use uuid::Uuid;

/// Owner of the store and the filter engine.
pub struct EntryService {
    store: EntryStore,
    view: Arc<ViewState>,
    engine: FilterEngine,
}

impl EntryService {
    /// Create a service publishing filter results to `sink`, running filter
    /// passes on the current tokio runtime.
    pub fn new(store: EntryStore, sink: Arc<dyn FilterSink>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| KitError::NoRuntime)?;
        Ok(Self::with_runtime(store, sink, runtime))
    }

    /// Create a service whose filter passes run on `runtime`.
    pub fn with_runtime(store: EntryStore, sink: Arc<dyn FilterSink>, runtime: Handle) -> Self {
        let view = Arc::new(ViewState::new());
        let engine = FilterEngine::with_runtime(view.clone(), sink, runtime);
        Self {
            store,
            view,
            engine,
        }
    }

    pub fn with_debounce(mut self, delay: Duration) -> Self {
        self.engine = self.engine.with_delay(delay);
        self
    }

    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    pub fn kinds(&self) -> &KindSet {
        self.store.kinds()
    }

    /// Load the backing file and refresh the view. On error the view shows
    /// an empty list and the error is returned for display.
    pub fn load(&mut self) -> Result<()> {
        let result = self.store.load();
        self.refresh();
        result
    }

    pub fn set_keyword(&self, keyword: &str) -> Result<()> {
        self.view.set_keyword(keyword)?;
        self.engine.schedule();
        Ok(())
    }

    pub fn set_category(&self, category: Category) -> Result<()> {
        self.view.set_category(category)?;
        self.engine.schedule();
        Ok(())
    }

    /// Set keyword and category together, scheduling a single pass.
    pub fn set_query(&self, keyword: &str, category: Category) -> Result<()> {
        self.view.set_keyword(keyword)?;
        self.view.set_category(category)?;
        self.engine.schedule();
        Ok(())
    }

    pub fn add(&mut self, draft: EntryDraft) -> Result<Uuid> {
        let id = self.store.add(draft);
        self.refresh();
        id
    }

    pub fn edit(&mut self, name: &str, draft: EntryDraft) -> Result<()> {
        let result = self.store.edit(name, draft);
        self.refresh();
        result
    }

    pub fn delete<S: AsRef<str>>(&mut self, names: &[S]) -> Result<usize> {
        let result = self.store.delete(names);
        self.refresh();
        result
    }

    pub fn import(&mut self, path: &Path) -> Result<ImportReport> {
        let result = self.store.import(path);
        self.refresh();
        result
    }

    pub fn export(&self, path: &Path) -> Result<ExportReport> {
        self.store.export(path)
    }

    /// Decoded value for copying or display.
    pub fn reveal(&self, name: &str) -> Result<String> {
        self.store.reveal(name)
    }

    /// Publish the current entries and schedule a pass.
    pub fn refresh(&self) {
        if let Err(e) = self.view.set_entries(self.store.snapshot()) {
            warn!("could not publish entry snapshot: {e}");
        }
        self.engine.schedule();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::SensitivityClassifier;
    use crate::filter::FilterEvent;
    use crate::protect::tests::test_protector;
    use tempfile::tempdir;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn service_in(
        dir: &tempfile::TempDir,
    ) -> (EntryService, UnboundedReceiver<FilterEvent>) {
        let (tx, rx) = unbounded_channel();
        let store = EntryStore::new(
            dir.path().join("commands.json"),
            test_protector(),
            SensitivityClassifier::default(),
        );
        (EntryService::new(store, Arc::new(tx)).unwrap(), rx)
    }

    async fn next_published(rx: &mut UnboundedReceiver<FilterEvent>) -> Vec<String> {
        match rx.recv().await {
            Some(FilterEvent::Published(result)) => result.names,
            Some(FilterEvent::Status(status)) => panic!("unexpected status: {status}"),
            None => panic!("channel closed"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutations_refresh_view() {
        let dir = tempdir().unwrap();
        let (mut service, mut rx) = service_in(&dir);
        service.load().unwrap();
        assert!(next_published(&mut rx).await.is_empty());

        service
            .add(EntryDraft::new("deploy", "make deploy", None, None, false).unwrap())
            .unwrap();
        assert_eq!(next_published(&mut rx).await, vec!["deploy"]);

        service.delete(&["deploy"]).unwrap();
        assert!(next_published(&mut rx).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_mutation_still_refreshes() {
        let dir = tempdir().unwrap();
        let (mut service, mut rx) = service_in(&dir);
        service.load().unwrap();
        let _ = next_published(&mut rx).await;

        let err = service.edit("ghost", EntryDraft::new("a", "b", None, None, false).unwrap());
        assert!(matches!(err, Err(KitError::EntryNotFound(_))));
        assert!(next_published(&mut rx).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_changes() {
        let dir = tempdir().unwrap();
        let (mut service, mut rx) = service_in(&dir);
        service
            .add(EntryDraft::new("Home Page", "https://example.com", None, Some("Link"), false).unwrap())
            .unwrap();
        service
            .add(EntryDraft::new("build", "cargo build", None, None, false).unwrap())
            .unwrap();
        let _ = next_published(&mut rx).await;

        service.set_category(Category::parse("Link")).unwrap();
        assert_eq!(next_published(&mut rx).await, vec!["Home Page"]);

        service.set_query("bui", Category::All).unwrap();
        assert_eq!(next_published(&mut rx).await, vec!["build"]);
    }

    fn plain_store(dir: &tempfile::TempDir) -> EntryStore {
        EntryStore::new(
            dir.path().join("commands.json"),
            test_protector(),
            SensitivityClassifier::default(),
        )
    }

    #[test]
    fn test_new_outside_runtime_is_an_error() {
        let dir = tempdir().unwrap();
        let (tx, _rx) = unbounded_channel();
        let result = EntryService::new(plain_store(&dir), Arc::new(tx));
        assert!(matches!(result, Err(KitError::NoRuntime)));
    }

    #[test]
    fn test_with_runtime_from_plain_thread() {
        let dir = tempdir().unwrap();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (tx, mut rx) = unbounded_channel();
        let mut service = EntryService::with_runtime(
            plain_store(&dir),
            Arc::new(tx),
            runtime.handle().clone(),
        )
        .with_debounce(Duration::from_millis(1));

        service
            .add(EntryDraft::new("deploy", "make deploy", None, None, false).unwrap())
            .unwrap();
        let names = runtime.block_on(next_published(&mut rx));
        assert_eq!(names, vec!["deploy"]);
    }
}
