use crate::models::config::SyncContext;
use crate::models::upload::UploadRequest;
use crate::{uploader, walker};
use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify, InotifyEvent, WatchDescriptor};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Pause after a failed read so a persistent error does not spin the loop.
const READ_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Everything a watched path reports. Only writes and creates lead to uploads.
fn watch_mask() -> AddWatchFlags {
    AddWatchFlags::IN_MODIFY
        | AddWatchFlags::IN_CREATE
        | AddWatchFlags::IN_MOVED_TO
        | AddWatchFlags::IN_MOVED_FROM
        | AddWatchFlags::IN_DELETE
        | AddWatchFlags::IN_DELETE_SELF
        | AddWatchFlags::IN_MOVE_SELF
        | AddWatchFlags::IN_ATTRIB
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Write,
    Create,
    Other,
}

/// A decoded inotify event with its path resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub is_dir: bool,
}

impl FileChange {
    pub fn from_mask(path: PathBuf, mask: AddWatchFlags) -> Self {
        let kind = if mask.contains(AddWatchFlags::IN_MODIFY) {
            ChangeKind::Write
        } else if mask.intersects(AddWatchFlags::IN_CREATE | AddWatchFlags::IN_MOVED_TO) {
            ChangeKind::Create
        } else {
            ChangeKind::Other
        };

        Self {
            path,
            kind,
            is_dir: mask.contains(AddWatchFlags::IN_ISDIR),
        }
    }

    pub fn triggers_upload(&self) -> bool {
        matches!(self.kind, ChangeKind::Write | ChangeKind::Create)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Change(FileChange),
    Overflow,
}

/// The inotify instance plus the set of paths it watches.
pub struct DirWatcher {
    inotify: Inotify,
    watches: HashMap<WatchDescriptor, PathBuf>,
}

impl DirWatcher {
    pub fn new() -> Result<Self> {
        let inotify = Inotify::init(InitFlags::IN_CLOEXEC).context("initializing inotify")?;
        Ok(Self {
            inotify,
            watches: HashMap::new(),
        })
    }

    /// Subscribes `path` (file or directory) for change notification.
    pub fn add(&mut self, path: &Path) -> Result<()> {
        let wd = self
            .inotify
            .add_watch(path, watch_mask())
            .with_context(|| format!("adding inotify watch on {}", path.display()))?;
        trace!("watching {} ({:?})", path.display(), wd);
        self.watches.insert(wd, path.to_path_buf());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Blocks until at least one event is available and decodes the batch.
    pub fn read_events(&mut self) -> Result<Vec<WatchEvent>> {
        let events = self.inotify.read_events().context("reading inotify events")?;
        Ok(events
            .into_iter()
            .filter_map(|event| self.decode(event))
            .collect())
    }

    fn decode(&mut self, event: InotifyEvent) -> Option<WatchEvent> {
        if event.mask.contains(AddWatchFlags::IN_Q_OVERFLOW) {
            return Some(WatchEvent::Overflow);
        }
        if event.mask.contains(AddWatchFlags::IN_IGNORED) {
            // kernel dropped the watch (path deleted or unmounted)
            self.watches.remove(&event.wd);
            return None;
        }

        let watched = self.watches.get(&event.wd)?;
        let path = match event.name {
            Some(name) => watched.join(name),
            None => watched.clone(),
        };
        Some(WatchEvent::Change(FileChange::from_mask(path, event.mask)))
    }
}

/// How long to wait before reading again after `err`. Interrupted reads are
/// retried immediately.
fn read_retry_delay(err: &anyhow::Error) -> Option<Duration> {
    match err.downcast_ref::<Errno>() {
        Some(Errno::EINTR) => None,
        _ => Some(READ_RETRY_DELAY),
    }
}

/// Acts on one change: uploads written or created files, and brings newly
/// created directories under watch.
///
/// Never fails; problems are logged so the loop can keep going.
pub fn handle_change<R, P>(change: &FileChange, ctx: &SyncContext, mut register: R, post: P)
where
    R: FnMut(&Path) -> Result<()>,
    P: Fn(&UploadRequest) -> Result<()>,
{
    if !change.triggers_upload() {
        trace!("ignoring {:?} on {}", change.kind, change.path.display());
        return;
    }

    if change.is_dir {
        if change.kind != ChangeKind::Create
            || change
                .path
                .file_name()
                .is_none_or(walker::is_hidden_name)
        {
            return;
        }

        info!("new directory {}, adding to watch set", change.path.display());
        if let Err(e) = walker::register_tree(&change.path, &mut register) {
            warn!("{:#}", e);
            return;
        }
        if let Err(e) = walker::initial_sync(ctx, &change.path, &post) {
            warn!("{:#}", e);
        }
        return;
    }

    match uploader::sync_file(ctx, &change.path, &post) {
        Ok(outcome) => debug!("{}: {}", change.path.display(), outcome.description()),
        Err(e) => warn!("upload of {} failed: {:#}", change.path.display(), e),
    }
}

/// Consumes events forever, one at a time, in delivery order.
pub fn run_event_loop<P>(mut watcher: DirWatcher, ctx: Arc<SyncContext>, post: P)
where
    P: Fn(&UploadRequest) -> Result<()>,
{
    info!(
        "Watching {} paths under {}",
        watcher.len(),
        ctx.base_path.display()
    );

    loop {
        let events = match watcher.read_events() {
            Ok(events) => events,
            Err(e) => {
                if let Some(delay) = read_retry_delay(&e) {
                    error!("{:#}", e);
                    thread::sleep(delay);
                }
                continue;
            }
        };

        for event in events {
            match event {
                WatchEvent::Overflow => {
                    warn!("inotify queue overflowed, some changes were not seen")
                }
                WatchEvent::Change(change) => {
                    handle_change(&change, &ctx, |path| watcher.add(path), &post)
                }
            }
        }
    }
}

/// Runs [`run_event_loop`] on its own thread.
pub fn spawn_event_loop<P>(
    watcher: DirWatcher,
    ctx: Arc<SyncContext>,
    post: P,
) -> Result<JoinHandle<()>>
where
    P: Fn(&UploadRequest) -> Result<()> + Send + 'static,
{
    thread::Builder::new()
        .name("event-loop".to_string())
        .spawn(move || run_event_loop(watcher, ctx, post))
        .context("spawning event loop thread")
}
