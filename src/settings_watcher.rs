use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    errors::SettingsError,
    settings::{Settings, read_settings},
};

#[derive(Debug)]
pub enum SettingsEvent {
    Loaded(Settings),
    Reloaded(Settings),
    Invalid(SettingsError),
    Deleted,
}

pub struct SettingsWatcher {
    _watcher: RecommendedWatcher,
}

impl SettingsWatcher {
    /// Parses the file once and keeps watching it. The first event on the
    /// returned channel is always the outcome of the initial parse.
    pub fn start(
        path: &Path,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SettingsEvent>), SettingsError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let initial = read_settings(path);
        let mut last = initial.as_ref().ok().cloned();
        let _ = tx.send(match initial {
            Ok(settings) => SettingsEvent::Loaded(settings),
            Err(e) => SettingsEvent::Invalid(e),
        });

        let file = path.to_path_buf();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if !event.paths.iter().any(|p| p.file_name() == file.file_name()) {
                        return;
                    }
                    if let Some(e) = classify(&event.kind, &file, &mut last) {
                        let _ = tx.send(e);
                    }
                }
                Err(e) => warn!(event = "settings.watch_failed", error = %e),
            }
        })?;

        // Editors often replace the file instead of writing in place, so the
        // directory is watched rather than the file itself.
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        debug!(event = "settings.watch_started", path = %path.display());

        Ok((Self { _watcher: watcher }, rx))
    }
}

fn classify(kind: &EventKind, file: &Path, last: &mut Option<Settings>) -> Option<SettingsEvent> {
    match kind {
        EventKind::Remove(_) if !file.exists() => {
            last.take().map(|_| SettingsEvent::Deleted)
        }
        EventKind::Create(_) | EventKind::Modify(_) => match read_settings(file) {
            Ok(settings) => {
                if last.as_ref() == Some(&settings) {
                    debug!(event = "settings.unchanged");
                    return None;
                }
                let first = last.is_none();
                *last = Some(settings.clone());
                Some(if first {
                    SettingsEvent::Loaded(settings)
                } else {
                    SettingsEvent::Reloaded(settings)
                })
            }
            // A rename-away shows up as a modify on some platforms.
            Err(SettingsError::NotFound { .. }) => last.take().map(|_| SettingsEvent::Deleted),
            Err(e) => Some(SettingsEvent::Invalid(e)),
        },
        _ => None,
    }
}

#[cfg(test)]
mod settings_watcher_tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    const VALID: &str =
        "{\"serverUrl\":\"https://b\",\"username\":\"u\",\"password\":\"p\",\"pooling\":5}";

    #[test]
    fn initial_event_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".commitwatch.json");
        std::fs::write(&path, VALID).unwrap();

        let (_watcher, mut rx) = SettingsWatcher::start(&path).unwrap();
        match rx.try_recv().unwrap() {
            SettingsEvent::Loaded(settings) => assert_eq!(settings.pooling, 5),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn initial_event_is_invalid_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".commitwatch.json");
        std::fs::write(&path, "{not json").unwrap();

        let (_watcher, mut rx) = SettingsWatcher::start(&path).unwrap();
        assert!(matches!(
            rx.try_recv().unwrap(),
            SettingsEvent::Invalid(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn edits_reload_only_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".commitwatch.json");
        std::fs::write(&path, VALID).unwrap();
        let mut last = read_settings(&path).ok();

        let modify = EventKind::Modify(ModifyKind::Any);
        assert!(classify(&modify, &path, &mut last).is_none());

        std::fs::write(&path, VALID.replace("\"pooling\":5", "\"pooling\":9")).unwrap();
        match classify(&modify, &path, &mut last) {
            Some(SettingsEvent::Reloaded(settings)) => assert_eq!(settings.pooling, 9),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn removal_after_load_is_deleted_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".commitwatch.json");
        std::fs::write(&path, VALID).unwrap();
        let mut last = read_settings(&path).ok();
        std::fs::remove_file(&path).unwrap();

        let remove = EventKind::Remove(RemoveKind::File);
        assert!(matches!(
            classify(&remove, &path, &mut last),
            Some(SettingsEvent::Deleted)
        ));
        assert!(classify(&remove, &path, &mut last).is_none());
    }

    #[test]
    fn create_after_delete_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".commitwatch.json");
        let mut last = None;
        std::fs::write(&path, VALID).unwrap();

        assert!(matches!(
            classify(&EventKind::Create(CreateKind::File), &path, &mut last),
            Some(SettingsEvent::Loaded(_))
        ));
    }
}
