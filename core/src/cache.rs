use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default lifetime of a memoized command result.
pub const COMMAND_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

/// Outcome of a cached command execution. Errors are cached by message so a
/// failing probe is not retried on every call within the TTL.
#[derive(Debug, Clone)]
pub struct CachedCommandResult {
    pub output: String,
    pub exit_code: i32,
    pub error: Option<String>,
}

/// TTL cache for read-only probe commands (`mount`, `tune2fs -l`,
/// `btrfs filesystem show`), keyed by command plus exact arguments.
///
/// Process-wide shared state: one instance is constructed at registry setup
/// and handed to every adapter. Adapters must flush it after any mutating
/// command so subsequent probes see fresh on-disk state.
pub struct CommandCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, CachedCommandResult)>>,
}

impl CommandCache {
    pub fn new() -> Self {
        Self::with_ttl(COMMAND_CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cache key for a command invocation. Parts are length-prefixed so that
    /// ("a", ["b c"]) and ("a", ["b", "c"]) never collide.
    pub fn key(command: &str, args: &[String]) -> String {
        let mut key = String::with_capacity(command.len() + args.len() * 8);
        let mut push_part = |part: &str| {
            key.push_str(&part.len().to_string());
            key.push(':');
            key.push_str(part);
            key.push('|');
        };
        push_part(command);
        for arg in args {
            push_part(arg);
        }
        key
    }

    pub fn get(&self, key: &str) -> Option<CachedCommandResult> {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match entries.get(key) {
            Some((inserted, value)) if inserted.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, value: CachedCommandResult) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(key, (Instant::now(), value));
    }

    /// Drop every entry. Called after any mutating command (mkfs, fsck with
    /// repair, label changes) so stale probe results never survive a write.
    pub fn flush(&self) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.clear();
    }

    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CommandCache {
    fn default() -> Self {
        Self::new()
    }
}
