//! Helpers for driving sync cycles without a real git server.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Value, json};

use crate::core::{MemoryEntry, MemoryStore, Timestamp};
use crate::git::{CommitId, GitError, GitOp, GitRemote, RemoteSnapshot};

#[derive(Clone, Debug)]
struct StoredCommit {
    parent: Option<CommitId>,
    files: BTreeMap<String, Vec<u8>>,
    message: String,
}

#[derive(Debug, Default)]
struct RemoteState {
    next_id: u64,
    commits: BTreeMap<CommitId, StoredCommit>,
    /// Published branch tips.
    heads: BTreeMap<String, CommitId>,
    failing_fetches: u32,
    failing_pushes: u32,
    /// Writes that land on the remote just before our next pushes.
    interleaved: VecDeque<(String, String, Vec<u8>)>,
    fetches: u32,
    pushes: u32,
}

impl RemoteState {
    fn write_commit(
        &mut self,
        parent: Option<&CommitId>,
        file: &str,
        contents: Vec<u8>,
        message: &str,
    ) -> CommitId {
        self.next_id += 1;
        let id = CommitId::new(format!("{:040x}", self.next_id));
        let mut files = parent
            .and_then(|p| self.commits.get(p))
            .map(|c| c.files.clone())
            .unwrap_or_default();
        files.insert(file.to_string(), contents);
        self.commits.insert(
            id.clone(),
            StoredCommit {
                parent: parent.cloned(),
                files,
                message: message.to_string(),
            },
        );
        id
    }
}

/// Shared in-memory stand-in for a git remote.
///
/// Clones share state, so a test can keep a handle for inspection while the
/// controller owns another.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// A remote whose `branch` already has one commit holding `file`.
    pub fn with_contents(branch: &str, file: &str, contents: Vec<u8>) -> Self {
        let remote = Self::new();
        {
            let mut state = remote.lock();
            let id = state.write_commit(None, file, contents, "seed");
            state.heads.insert(branch.to_string(), id);
        }
        remote
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn fail_next_fetches(&self, n: u32) {
        self.lock().failing_fetches = n;
    }

    pub fn fail_next_pushes(&self, n: u32) {
        self.lock().failing_pushes = n;
    }

    /// Another writer publishes `contents` right before our next push.
    pub fn interleave_push(&self, branch: &str, file: &str, contents: Vec<u8>) {
        self.lock()
            .interleaved
            .push_back((branch.to_string(), file.to_string(), contents));
    }

    pub fn head(&self, branch: &str) -> Option<CommitId> {
        self.lock().heads.get(branch).cloned()
    }

    pub fn contents(&self, branch: &str, file: &str) -> Option<Vec<u8>> {
        let state = self.lock();
        let head = state.heads.get(branch)?;
        state.commits.get(head)?.files.get(file).cloned()
    }

    /// `None` if the commit is unknown, `Some(None)` for a root commit.
    pub fn parent_of(&self, commit: &CommitId) -> Option<Option<CommitId>> {
        self.lock().commits.get(commit).map(|c| c.parent.clone())
    }

    pub fn message_of(&self, commit: &CommitId) -> Option<String> {
        self.lock().commits.get(commit).map(|c| c.message.clone())
    }

    /// Published commits on `branch`, newest first.
    pub fn history(&self, branch: &str) -> Vec<CommitId> {
        let state = self.lock();
        let mut out = Vec::new();
        let mut cursor = state.heads.get(branch).cloned();
        while let Some(id) = cursor {
            cursor = state.commits.get(&id).and_then(|c| c.parent.clone());
            out.push(id);
        }
        out
    }

    pub fn fetch_count(&self) -> u32 {
        self.lock().fetches
    }

    pub fn push_count(&self) -> u32 {
        self.lock().pushes
    }
}

impl GitRemote for InMemoryRemote {
    fn fetch(&self, branch: &str, file: &str) -> Result<RemoteSnapshot, GitError> {
        let mut state = self.lock();
        state.fetches += 1;
        if state.failing_fetches > 0 {
            state.failing_fetches -= 1;
            return Err(GitError::Network {
                op: GitOp::Fetch,
                message: "simulated outage".into(),
            });
        }
        let head = state.heads.get(branch).cloned();
        let contents = head
            .as_ref()
            .and_then(|h| state.commits.get(h))
            .and_then(|c| c.files.get(file).cloned());
        Ok(RemoteSnapshot { head, contents })
    }

    fn commit(
        &self,
        _branch: &str,
        file: &str,
        parent: Option<&CommitId>,
        contents: &[u8],
        message: &str,
    ) -> Result<CommitId, GitError> {
        Ok(self
            .lock()
            .write_commit(parent, file, contents.to_vec(), message))
    }

    fn push(&self, branch: &str, commit: &CommitId) -> Result<(), GitError> {
        let mut state = self.lock();
        state.pushes += 1;
        if state.failing_pushes > 0 {
            state.failing_pushes -= 1;
            return Err(GitError::Network {
                op: GitOp::Push,
                message: "simulated outage".into(),
            });
        }

        if let Some((their_branch, their_file, contents)) = state.interleaved.pop_front() {
            let parent = state.heads.get(&their_branch).cloned();
            let id = state.write_commit(parent.as_ref(), &their_file, contents, "concurrent writer");
            state.heads.insert(their_branch, id);
        }

        let Some(stored) = state.commits.get(commit) else {
            return Err(GitError::PushRejected(crate::git::PushRejected {
                message: format!("unknown commit {commit}"),
            }));
        };
        if stored.parent.as_ref() != state.heads.get(branch) {
            return Err(GitError::NonFastForward);
        }
        state.heads.insert(branch.to_string(), commit.clone());
        Ok(())
    }
}

/// Entry authored on `host` at `created` (unix seconds), last edited at
/// `updated` with `content`.
pub fn fixture_entry(
    host: &str,
    original_id: &str,
    created: i64,
    updated: i64,
    content: Value,
) -> MemoryEntry {
    let created_at = seconds(created);
    let mut entry = match MemoryEntry::new(host, original_id, created_at, content.clone()) {
        Ok(entry) => entry,
        Err(e) => panic!("fixture entry {host}/{original_id}: {e}"),
    };
    if updated != created {
        if let Err(e) = entry.edit(content, seconds(updated)) {
            panic!("fixture edit {host}/{original_id}: {e}");
        }
    }
    entry
}

/// Store of `count` distinct entries from `host`, ids `<prefix>-<n>`.
pub fn fixture_store(host: &str, prefix: &str, count: usize) -> MemoryStore {
    MemoryStore::from_entries((0..count).map(|i| {
        fixture_entry(
            host,
            &format!("{prefix}-{i}"),
            1_700_000_000 + i as i64,
            1_700_000_000 + i as i64,
            json!({ "text": format!("{prefix} note {i}"), "n": i }),
        )
    }))
}

fn seconds(secs: i64) -> Timestamp {
    match Timestamp::from_unix_millis(secs.saturating_mul(1000)) {
        Ok(ts) => ts,
        Err(e) => panic!("fixture timestamp {secs}: {e}"),
    }
}
