//! Integration tests for the media watcher: index → sweep → queue → capture.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lifestream::capture::{CaptureSignal, CaptureWorker};
use lifestream::config::absolute_path;
use lifestream::storage::{
    get_setting_i64, have_processed, init_storage, list_pending, Database, SettingsStore,
    SqliteLedger, SqliteMediaFeed, SqliteQueue, MARKER_KEY,
};
use lifestream::watcher::{
    Collaborators, Dispatcher, EventBatch, MarkerStore, MediaEvent, MediaIndexer, WakeLock,
    WatcherStats,
};
use lifestream::Config;
use tempfile::TempDir;

struct Harness {
    tmp: TempDir,
    config: Config,
    db: Database,
    indexer: MediaIndexer,
    dispatcher: Dispatcher,
    worker: CaptureWorker,
    wake: WakeLock,
}

impl Harness {
    fn new(excludes: &[&str]) -> Self {
        let tmp = TempDir::new().unwrap();
        let config = Config {
            data_dir: tmp.path().join("data"),
            watch_dirs: vec![tmp.path().to_path_buf()],
            exclude_patterns: excludes.iter().map(|p| (*p).to_string()).collect(),
            sidecar_extensions: vec!["xmp".to_string()],
            ..Config::default()
        };
        Self::start(tmp, config)
    }

    /// Same layout, configured with paths relative to the working directory.
    fn relative() -> Self {
        let tmp = tempfile::Builder::new().tempdir_in(".").unwrap();
        let cwd = std::env::current_dir().unwrap();
        let base = tmp
            .path()
            .strip_prefix(&cwd)
            .unwrap_or(tmp.path())
            .to_path_buf();
        assert!(base.is_relative());

        let config = Config {
            data_dir: base.join("data"),
            watch_dirs: vec![base],
            ..Config::default()
        }
        .resolve_paths()
        .unwrap();
        Self::start(tmp, config)
    }

    fn start(tmp: TempDir, config: Config) -> Self {
        fs::create_dir_all(tmp.path().join("DCIM/Camera")).unwrap();
        config.validate().unwrap();
        fs::create_dir_all(config.output_root()).unwrap();

        let db = Database::open(config.database_path()).unwrap();
        init_storage(&db).unwrap();

        Self::assemble(tmp, config, db)
    }

    /// Rebuild everything over the same data directory, as after a restart.
    fn restart(self) -> Self {
        let Self { tmp, config, .. } = self;
        let db = Database::open(config.database_path()).unwrap();
        init_storage(&db).unwrap();
        Self::assemble(tmp, config, db)
    }

    fn assemble(tmp: TempDir, config: Config, db: Database) -> Self {
        let signal = CaptureSignal::new();
        let wake = WakeLock::new();
        let indexer = MediaIndexer::new(db.clone(), config.watch_dirs.clone()).unwrap();
        let dispatcher = Dispatcher::new(
            config.dispatcher_config(),
            config.path_filter().unwrap(),
            Collaborators {
                feed: Arc::new(SqliteMediaFeed::new(db.clone())),
                ledger: Arc::new(SqliteLedger::new(db.clone())),
                queue: Arc::new(SqliteQueue::new(db.clone())),
                markers: Arc::new(SettingsStore::new(db.clone())),
                kick: Arc::new(signal.clone()),
                liveness: Arc::new(wake.clone()),
            },
            WatcherStats::new(),
        );
        let worker = CaptureWorker::new(db.clone(), signal, config.path_filter().unwrap());

        Self {
            tmp,
            config,
            db,
            indexer,
            dispatcher,
            worker,
            wake,
        }
    }

    fn write(&self, rel: impl AsRef<Path>) -> PathBuf {
        let path = self.tmp.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, [0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
        path
    }

    fn write_output(&self, name: &str) -> PathBuf {
        let path = self.config.output_root().join(name);
        fs::write(&path, [0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
        path
    }

    fn appear(&self, paths: &[&Path]) -> usize {
        let mut batch = EventBatch::new();
        for path in paths {
            batch.add(MediaEvent::Appeared(path.to_path_buf()));
        }
        self.indexer.register_batch(&batch).unwrap()
    }

    fn pending(&self) -> Vec<String> {
        self.db.with_conn(list_pending).unwrap()
    }

    fn marker(&self) -> i64 {
        self.db
            .with_conn(|conn| get_setting_i64(conn, MARKER_KEY))
            .unwrap()
            .unwrap_or(0)
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[test]
fn test_new_photo_dispatched_exactly_once() {
    let h = Harness::new(&[]);
    let photo = h.write("DCIM/Camera/IMG_0001.jpg");
    assert_eq!(h.appear(&[&photo]), 1);

    let report = h.dispatcher.sweep().unwrap();
    assert_eq!(report.dispatched, 1);
    assert!(report.kicked);
    assert_eq!(h.pending(), vec![path_str(&photo)]);
    assert_eq!(h.marker(), h.indexer.high_water());

    assert_eq!(h.worker.drain().unwrap(), 1);
    assert!(h.pending().is_empty());
    assert!(h
        .db
        .with_conn(|conn| have_processed(conn, "IMG_0001.jpg"))
        .unwrap());

    let report = h.dispatcher.sweep().unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(report.dispatched, 0);
    assert!(h.pending().is_empty());
}

#[test]
fn test_own_output_is_never_dispatched() {
    let h = Harness::new(&[]);
    let scaled = h.write_output("IMG_0001_scaled.jpg");
    let photo = h.write("DCIM/Camera/IMG_0002.jpg");
    h.appear(&[&scaled, &photo]);

    let report = h.dispatcher.sweep().unwrap();

    assert_eq!(report.own_files, 1);
    assert_eq!(report.dispatched, 1);
    assert_eq!(h.pending(), vec![path_str(&photo)]);
    assert_eq!(h.marker(), h.indexer.high_water());
}

#[test]
fn test_exclusions_and_reinclusion() {
    let h = Harness::new(&["Screenshots/", "!keep_*.png", "*.gif"]);
    let shot = h.write("DCIM/Screenshots/shot_1.png");
    let kept = h.write("DCIM/Screenshots/keep_1.png");
    let gif = h.write("DCIM/Camera/anim.gif");
    let photo = h.write("DCIM/Camera/IMG_0003.jpg");
    h.appear(&[&shot, &kept, &gif, &photo]);

    let report = h.dispatcher.sweep().unwrap();

    assert_eq!(report.excluded, 2);
    assert_eq!(report.dispatched, 2);
    let mut pending = h.pending();
    pending.sort();
    let mut expected = vec![path_str(&kept), path_str(&photo)];
    expected.sort();
    assert_eq!(pending, expected);
}

#[test]
fn test_missing_file_skipped_but_marker_advances() {
    let h = Harness::new(&[]);
    let photo = h.write("DCIM/Camera/IMG_0004.jpg");
    h.appear(&[&photo]);
    fs::remove_file(&photo).unwrap();

    let report = h.dispatcher.sweep().unwrap();

    assert_eq!(report.examined, 0);
    assert!(!report.kicked);
    assert!(h.pending().is_empty());
    assert_eq!(h.marker(), h.indexer.high_water());
}

#[test]
fn test_already_processed_item_not_requeued() {
    let h = Harness::new(&[]);
    let photo = h.write("DCIM/Camera/IMG_0005.jpg");
    h.appear(&[&photo]);

    // The same file name was captured before, from another location.
    h.db.with_conn(|conn| {
        lifestream::storage::mark_processed(
            conn,
            &lifestream::storage::ProcessedItem::new("IMG_0005.jpg", "/old/IMG_0005.jpg"),
        )
    })
    .unwrap();

    let report = h.dispatcher.sweep().unwrap();

    assert_eq!(report.already_processed, 1);
    assert!(!report.kicked);
    assert!(h.pending().is_empty());
}

#[test]
fn test_first_run_skips_existing_media() {
    let h = Harness::new(&[]);
    h.write("DCIM/Camera/old_1.jpg");
    h.write("DCIM/Camera/old_2.jpg");

    assert_eq!(h.indexer.catalog_existing().unwrap(), 2);
    let store = SettingsStore::new(h.db.clone());
    assert!(h.indexer.seed_marker(&store, false).unwrap());

    let report = h.dispatcher.sweep().unwrap();
    assert_eq!(report.examined, 0);

    let fresh = h.write("DCIM/Camera/new_1.jpg");
    h.appear(&[&fresh]);
    let report = h.dispatcher.sweep().unwrap();
    assert_eq!(report.dispatched, 1);
    assert_eq!(h.pending(), vec![path_str(&fresh)]);
}

#[test]
fn test_backfill_dispatches_existing_media() {
    let h = Harness::new(&[]);
    h.write("DCIM/Camera/old_1.jpg");
    h.write("DCIM/Camera/old_2.jpg");

    h.indexer.catalog_existing().unwrap();
    let store = SettingsStore::new(h.db.clone());
    assert!(h.indexer.seed_marker(&store, true).unwrap());

    let report = h.dispatcher.sweep().unwrap();
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.marker_before, 0);
    assert_eq!(h.pending().len(), 2);
}

#[test]
fn test_marker_survives_restart() {
    let h = Harness::new(&[]);
    let photo = h.write("DCIM/Camera/IMG_0006.jpg");
    h.appear(&[&photo]);
    h.dispatcher.sweep().unwrap();
    let marker = h.marker();
    assert!(marker > 0);

    let h = h.restart();
    let store = SettingsStore::new(h.db.clone());
    assert_eq!(store.get_marker().unwrap(), marker);
    assert!(!h.indexer.seed_marker(&store, true).unwrap());

    // Still pending from before the restart; not queued a second time.
    let report = h.dispatcher.sweep().unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(h.pending(), vec![path_str(&photo)]);

    // The clock resumes above the old rows.
    let next = h.write("DCIM/Camera/IMG_0007.jpg");
    h.appear(&[&next]);
    assert!(h.indexer.high_water() > marker);
    assert_eq!(h.dispatcher.sweep().unwrap().dispatched, 1);
}

#[test]
fn test_relative_config_paths_match_absolute_events() {
    let h = Harness::relative();
    assert!(h.config.output_root().is_absolute());

    let scaled = h.write_output("IMG_0009_scaled.jpg");
    let photo = h.write("DCIM/Camera/IMG_0010.jpg");
    assert!(photo.is_relative());
    assert_eq!(h.indexer.catalog_existing().unwrap(), 2);

    // The filesystem watcher reports the same files by absolute path.
    let cwd = std::env::current_dir().unwrap();
    assert_eq!(h.appear(&[&cwd.join(&photo), &scaled]), 0);

    let report = h.dispatcher.sweep().unwrap();

    assert_eq!(report.own_files, 1);
    assert_eq!(report.dispatched, 1);
    assert_eq!(h.pending(), vec![path_str(&absolute_path(&photo).unwrap())]);
}

#[test]
fn test_liveness_released_after_every_sweep() {
    let h = Harness::new(&[]);
    let photo = h.write("DCIM/Camera/IMG_0008.jpg");
    h.appear(&[&photo]);

    h.dispatcher.sweep().unwrap();
    h.dispatcher.sweep().unwrap();

    let stats = h.wake.stats();
    assert_eq!(stats.acquired, 2);
    assert_eq!(stats.released, 2);
    assert!(!h.wake.is_awake());
}

#[test]
fn test_sweep_report_serializes() {
    let h = Harness::new(&[]);
    let report = h.dispatcher.sweep().unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["dispatched"], 0);
    assert_eq!(json["kicked"], false);
    assert!(json["sweep_id"].is_string());
}
