//! Per-category file watching for the dev server
//!
//! One subscription is registered per asset category. Raw filesystem events
//! are collected on a worker thread until the category has been quiet for a
//! while, then handled as one batch. Static, image and sprite watches wait
//! for the configured debounce; markup, style and script watches only merge
//! the handful of events a single save produces.
//!
//! Every batch that touches the category's patterns reruns the category's
//! task to completion and then sends a reload notification, whether or not
//! the task succeeded.

use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

use crate::build::{run_task, BuildContext, Task};
use crate::resources::{Category, PatternSet};

/// Quiet period that merges the events of one save in undebounced categories
pub const SETTLE: Duration = Duration::from_millis(50);

/// Error during watch setup
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WatchError {
    /// Failed to initialize file watcher
    #[error("Failed to initialize file watcher: {0}")]
    WatcherInit(#[source] notify::Error),
    /// Failed to add watch path
    #[error("Failed to watch '{}': {source}", .path.display())]
    WatchPath {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    /// Failed to start the batching thread
    #[error("Failed to start watch worker: {0}")]
    Worker(#[source] std::io::Error),
}

/// Reruns a named task to completion.
pub trait TaskRunner: Send + Sync {
    /// Run `task`, blocking until it finishes. Returns whether it succeeded.
    fn run_task(&self, task: Task) -> bool;
}

/// Tells connected browsers to reload.
pub trait ReloadNotifier: Send + Sync {
    fn reload(&self);
}

impl TaskRunner for BuildContext {
    fn run_task(&self, task: Task) -> bool {
        run_task(self, task).is_success()
    }
}

/// Categories the dev server watches.
///
/// Pages are covered by the markup set, which also sees fragments.
pub const WATCHED: [Category; 7] = [
    Category::Markup,
    Category::Styles,
    Category::Scripts,
    Category::Vendor,
    Category::Static,
    Category::Images,
    Category::Sprite,
];

/// Whether changes in `category` are debounced.
pub fn is_debounced(category: Category) -> bool {
    matches!(category, Category::Static | Category::Images | Category::Sprite)
}

/// How long `category` must be quiet before a batch is handled.
pub fn quiet_period(category: Category, debounce: Duration) -> Duration {
    if is_debounced(category) {
        debounce
    } else {
        SETTLE
    }
}

/// Reacts to batches of changed paths for one category.
#[derive(Clone)]
pub struct WatchHandler {
    category: Category,
    patterns: PatternSet,
    runner: Arc<dyn TaskRunner>,
    notifier: Arc<dyn ReloadNotifier>,
}

impl std::fmt::Debug for WatchHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandler").field("category", &self.category).finish_non_exhaustive()
    }
}

impl WatchHandler {
    pub fn new(
        category: Category,
        patterns: PatternSet,
        runner: Arc<dyn TaskRunner>,
        notifier: Arc<dyn ReloadNotifier>,
    ) -> Self {
        Self { category, patterns, runner, notifier }
    }

    /// Handle one batch of changed paths.
    ///
    /// Returns whether the batch triggered a rerun. Paths outside the
    /// category's patterns are ignored.
    pub fn handle_batch(&self, paths: &[PathBuf]) -> bool {
        let relevant: Vec<&PathBuf> = paths.iter().filter(|p| self.patterns.matches(p)).collect();
        let Some(first) = relevant.first() else {
            return false;
        };

        let task = Task::for_category(self.category);
        tracing::info!(
            category = %self.category,
            task = %task,
            changed = relevant.len(),
            "Change detected in {}",
            first.display()
        );
        if !self.runner.run_task(task) {
            tracing::warn!(task = %task, "Rerun failed; keeping previous output");
        }
        self.notifier.reload();
        true
    }
}

/// A live watch on one category. Dropping it stops watching.
pub struct WatchSubscription {
    category: Category,
    dirs: Vec<PathBuf>,
    _watcher: RecommendedWatcher,
}

impl std::fmt::Debug for WatchSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSubscription").field("category", &self.category).field("dirs", &self.dirs).finish()
    }
}

impl WatchSubscription {
    /// Category being watched.
    pub fn category(&self) -> Category {
        self.category
    }

    /// Directories registered with the OS watcher.
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }
}

/// Directories to watch for a pattern set.
///
/// A base directory that does not exist yet is replaced by its nearest
/// existing ancestor so the category is picked up once it is created.
pub fn watch_dirs_for(patterns: &PatternSet) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for base in patterns.base_dirs() {
        let Some(dir) = base.ancestors().find(|d| d.is_dir()) else {
            tracing::warn!(dir = %base.display(), "No existing directory to watch");
            continue;
        };
        if dir != base.as_path() {
            tracing::debug!(missing = %base.display(), watching = %dir.display(), "Watching nearest existing parent");
        }
        if dirs.iter().any(|d| dir.starts_with(d)) {
            continue;
        }
        dirs.retain(|d| !d.starts_with(dir));
        dirs.push(dir.to_path_buf());
    }
    dirs.sort();
    dirs
}

fn register(watcher: &mut dyn Watcher, dirs: &[PathBuf]) -> Result<(), WatchError> {
    for dir in dirs {
        watcher
            .watch(dir, RecursiveMode::Recursive)
            .map_err(|source| WatchError::WatchPath { path: dir.clone(), source })?;
    }
    Ok(())
}

/// Whether an event changes file contents or the set of files.
///
/// Metadata-only modifications (permissions, timestamps) and accesses are not changes.
pub fn is_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => true,
        _ => false,
    }
}

/// Collect changed paths into batches separated by `quiet` of silence.
///
/// Each batch is handed to `on_batch` once, sorted and deduplicated. Returns
/// when the sending side is dropped; a batch still pending at that point is
/// discarded.
pub fn collect_batches(rx: &Receiver<Vec<PathBuf>>, quiet: Duration, mut on_batch: impl FnMut(Vec<PathBuf>)) {
    while let Ok(mut batch) = rx.recv() {
        loop {
            match rx.recv_timeout(quiet) {
                Ok(paths) => batch.extend(paths),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
        batch.sort();
        batch.dedup();
        on_batch(batch);
    }
}

/// Register a watch for one category.
///
/// `debounce` applies to debounced categories; the others use [`SETTLE`].
pub fn subscribe(handler: WatchHandler, debounce: Duration) -> Result<WatchSubscription, WatchError> {
    let category = handler.category;
    let dirs = watch_dirs_for(&handler.patterns);
    let quiet = quiet_period(category, debounce);

    let (tx, rx) = channel::<Vec<PathBuf>>();
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| match result {
        Ok(event) if is_change(&event.kind) => {
            // The worker only goes away after the watcher is dropped.
            let _ = tx.send(event.paths);
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(category = %category, "Watch error: {}", e),
    })
    .map_err(WatchError::WatcherInit)?;
    register(&mut watcher, &dirs)?;

    thread::Builder::new()
        .name(format!("watch-{}", category))
        .spawn(move || {
            collect_batches(&rx, quiet, |paths| {
                handler.handle_batch(&paths);
            })
        })
        .map_err(WatchError::Worker)?;

    tracing::debug!(category = %category, dirs = dirs.len(), quiet_ms = quiet.as_millis() as u64, "Watching");
    Ok(WatchSubscription { category, dirs, _watcher: watcher })
}

/// Register one watch per category in [`WATCHED`].
pub fn subscribe_all(
    ctx: &BuildContext,
    runner: Arc<dyn TaskRunner>,
    notifier: Arc<dyn ReloadNotifier>,
) -> Result<Vec<WatchSubscription>, WatchError> {
    let debounce = Duration::from_millis(u64::from(ctx.config().watch.debounce_ms));
    WATCHED
        .iter()
        .map(|&category| {
            let patterns = ctx.resources().get(category).clone();
            let handler = WatchHandler::new(category, patterns, Arc::clone(&runner), Arc::clone(&notifier));
            subscribe(handler, debounce)
        })
        .collect()
}

/// Whether `path` lies inside any watched directory.
pub fn is_watched(subscriptions: &[WatchSubscription], path: &Path) -> bool {
    subscriptions.iter().any(|s| s.dirs.iter().any(|d| path.starts_with(d)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        runs: Mutex<Vec<Task>>,
        reloads: AtomicUsize,
        succeed: bool,
    }

    impl TaskRunner for Recorder {
        fn run_task(&self, task: Task) -> bool {
            self.runs.lock().unwrap().push(task);
            self.succeed
        }
    }

    impl ReloadNotifier for Recorder {
        fn reload(&self) {
            self.reloads.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn handler(root: &Path, category: Category, pattern: &str, recorder: &Arc<Recorder>) -> WatchHandler {
        let patterns = PatternSet::new(root, &[pattern.to_string()]).unwrap();
        WatchHandler::new(category, patterns, recorder.clone(), recorder.clone())
    }

    fn wait_for_reloads(recorder: &Recorder, expected: usize, limit: Duration) {
        let start = std::time::Instant::now();
        while recorder.reloads.load(Ordering::SeqCst) < expected && start.elapsed() < limit {
            thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_collect_batches_waits_for_quiet_period() {
        let (tx, rx) = channel();
        let sender = thread::spawn(move || {
            for i in 0..5 {
                tx.send(vec![PathBuf::from(format!("pic{}.png", i))]).unwrap();
                thread::sleep(Duration::from_millis(90));
            }
            tx.send(vec![PathBuf::from("pic0.png")]).unwrap();
            thread::sleep(Duration::from_millis(1000));
        });

        let mut batches = Vec::new();
        collect_batches(&rx, Duration::from_millis(500), |batch| batches.push(batch));
        sender.join().unwrap();

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 5);
    }

    #[test]
    fn test_collect_batches_splits_on_silence() {
        let (tx, rx) = channel();
        let sender = thread::spawn(move || {
            tx.send(vec![PathBuf::from("a.png")]).unwrap();
            tx.send(vec![PathBuf::from("b.png")]).unwrap();
            thread::sleep(Duration::from_millis(500));
            tx.send(vec![PathBuf::from("c.png")]).unwrap();
            thread::sleep(Duration::from_millis(500));
        });

        let mut batches = Vec::new();
        collect_batches(&rx, Duration::from_millis(100), |batch| batches.push(batch));
        sender.join().unwrap();

        assert_eq!(batches, vec![vec![PathBuf::from("a.png"), PathBuf::from("b.png")], vec![PathBuf::from("c.png")]]);
    }

    #[test]
    fn test_burst_of_writes_reruns_once() {
        let temp = TempDir::new().unwrap();
        let fonts = temp.path().join("src/assets/fonts");
        std::fs::create_dir_all(&fonts).unwrap();
        let recorder = Arc::new(Recorder { succeed: true, ..Recorder::default() });

        let sub = subscribe(
            handler(temp.path(), Category::Static, "src/assets/fonts/*.woff2", &recorder),
            Duration::from_millis(500),
        )
        .unwrap();

        for i in 0..5 {
            std::fs::write(fonts.join(format!("face{}.woff2", i)), b"wOF2").unwrap();
            thread::sleep(Duration::from_millis(90));
        }
        thread::sleep(Duration::from_millis(2000));
        drop(sub);

        assert_eq!(*recorder.runs.lock().unwrap(), vec![Task::Copy]);
        assert_eq!(recorder.reloads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_category_dir_created_after_subscribe() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("src/assets")).unwrap();
        let recorder = Arc::new(Recorder { succeed: true, ..Recorder::default() });

        let sub = subscribe(
            handler(temp.path(), Category::Sprite, "src/assets/svg-sprite/*.svg", &recorder),
            Duration::from_millis(100),
        )
        .unwrap();
        assert_eq!(sub.dirs(), &[temp.path().join("src/assets")]);

        let icons = temp.path().join("src/assets/svg-sprite");
        std::fs::create_dir(&icons).unwrap();
        thread::sleep(Duration::from_millis(300));
        std::fs::write(icons.join("home.svg"), "<svg/>").unwrap();

        wait_for_reloads(&recorder, 1, Duration::from_secs(3));
        assert_eq!(recorder.runs.lock().unwrap().first(), Some(&Task::SvgSprite));
    }

    #[test]
    fn test_metadata_only_events_are_not_changes() {
        use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};

        assert!(!is_change(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions))));
        assert!(!is_change(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime))));
        assert!(!is_change(&EventKind::Access(AccessKind::Any)));
        assert!(is_change(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(is_change(&EventKind::Create(CreateKind::File)));
        assert!(is_change(&EventKind::Remove(RemoveKind::File)));
    }

    #[test]
    fn test_quiet_periods() {
        let debounce = Duration::from_millis(500);
        assert_eq!(quiet_period(Category::Images, debounce), debounce);
        assert_eq!(quiet_period(Category::Markup, debounce), SETTLE);
    }

    #[test]
    fn test_reload_sent_even_when_task_fails() {
        let temp = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let handler = handler(temp.path(), Category::Styles, "src/styles/**/*.less", &recorder);

        assert!(handler.handle_batch(&[temp.path().join("src/styles/base/reset.less")]));
        assert_eq!(*recorder.runs.lock().unwrap(), vec![Task::Style]);
        assert_eq!(recorder.reloads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unrelated_paths_are_ignored() {
        let temp = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let handler = handler(temp.path(), Category::Sprite, "src/assets/svg-sprite/*.svg", &recorder);

        assert!(!handler.handle_batch(&[temp.path().join("src/assets/svg-sprite/notes.txt")]));
        assert!(recorder.runs.lock().unwrap().is_empty());
        assert_eq!(recorder.reloads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_debounced_categories() {
        assert!(is_debounced(Category::Static));
        assert!(is_debounced(Category::Images));
        assert!(is_debounced(Category::Sprite));
        assert!(!is_debounced(Category::Markup));
        assert!(!is_debounced(Category::Scripts));
    }

    #[test]
    fn test_subscribe_falls_back_to_existing_parent() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("src/html")).unwrap();
        let recorder = Arc::new(Recorder::default());

        let markup = subscribe(
            handler(temp.path(), Category::Markup, "src/html/**/*.html", &recorder),
            Duration::from_millis(50),
        )
        .unwrap();
        assert_eq!(markup.category(), Category::Markup);
        assert_eq!(markup.dirs(), &[temp.path().join("src/html")]);

        let images = subscribe(
            handler(temp.path(), Category::Images, "src/assets/images/*.png", &recorder),
            Duration::from_millis(50),
        )
        .unwrap();
        assert_eq!(images.dirs(), &[temp.path().join("src")]);

        let subs = vec![markup, images];
        assert!(is_watched(&subs, &temp.path().join("src/html/index.html")));
        assert!(!is_watched(&subs, &temp.path().join("dist/index.html")));
    }
}
