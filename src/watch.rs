//! Reload-on-save for profile files.

use anyhow::Result;
use log::{debug, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};

/// Profile files touched by a write/create/rename event.
pub fn edited_profiles(event: &Event) -> Vec<PathBuf> {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return Vec::new();
    }
    event
        .paths
        .iter()
        .filter(|p| p.extension().is_some_and(|e| e == "toml"))
        .cloned()
        .collect()
}

/// Watch `dir` and call `on_edit` for every edited profile. The watcher stops
/// when the returned handle is dropped.
pub fn watch_profiles<F>(dir: &Path, on_edit: F) -> Result<RecommendedWatcher>
where
    F: Fn(PathBuf) + Send + 'static,
{
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            for path in edited_profiles(&event) {
                debug!("watch: {} changed", path.display());
                on_edit(path);
            }
        }
        Err(e) => warn!("watch: {e}"),
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    info!("watch: watching {}", dir.display());
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_only_toml_writes_count() {
        let e = event(EventKind::Modify(ModifyKind::Any), "/p/default.toml");
        assert_eq!(edited_profiles(&e), vec![PathBuf::from("/p/default.toml")]);

        let e = event(EventKind::Create(CreateKind::File), "/p/.default.toml.swp");
        assert!(edited_profiles(&e).is_empty());

        let e = event(EventKind::Access(AccessKind::Any), "/p/default.toml");
        assert!(edited_profiles(&e).is_empty());
    }
}
