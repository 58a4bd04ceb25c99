//! `GitRemote` backed by a real repository through `git2`.
//!
//! Commits are written straight into the object database on the memory
//! branch, parented on the fetched tip, so history stays linear and the
//! user's checkout is never touched.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use git2::{ErrorClass, ErrorCode, FileMode, ObjectType, Oid, Repository, Signature};

use super::error::{GitError, GitOp, PushRejected};
use super::remote::{CommitId, GitRemote, RemoteSnapshot};

pub struct Git2Remote {
    repo: Repository,
    remote: String,
}

impl Git2Remote {
    /// Open the repository containing `path`.
    pub fn open(path: &Path, remote: &str) -> Result<Self, GitError> {
        let repo = Repository::discover(path).map_err(|source| GitError::OpenRepo {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            repo,
            remote: remote.to_string(),
        })
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn remote_name(&self) -> &str {
        &self.remote
    }

    /// Working tree root, or the git dir of a bare repository.
    pub fn root(&self) -> PathBuf {
        self.repo
            .workdir()
            .unwrap_or_else(|| self.repo.path())
            .to_path_buf()
    }

    fn tracking_ref(&self, branch: &str) -> String {
        format!("refs/remotes/{}/{branch}", self.remote)
    }

    fn signature(&self) -> Result<Signature<'static>, GitError> {
        match self.repo.signature() {
            Ok(sig) => Ok(sig.to_owned()),
            Err(_) => Ok(Signature::now("memsync", "memsync@localhost")?),
        }
    }

    /// Keep the index in step when the memory branch is checked out.
    fn sync_index(&self, branch: &str, file: &Path, contents: &[u8]) -> Result<(), GitError> {
        if self.repo.is_bare() {
            return Ok(());
        }
        let head = self.repo.find_reference("HEAD")?;
        if head.symbolic_target() != Some(local_ref(branch).as_str()) {
            return Ok(());
        }
        let mut index = self.repo.index()?;
        let entry = git2::IndexEntry {
            ctime: git2::IndexTime::new(0, 0),
            mtime: git2::IndexTime::new(0, 0),
            dev: 0,
            ino: 0,
            mode: u32::from(FileMode::Blob),
            uid: 0,
            gid: 0,
            file_size: u32::try_from(contents.len()).unwrap_or(u32::MAX),
            id: Oid::zero(),
            flags: 0,
            flags_extended: 0,
            path: file.to_string_lossy().as_bytes().to_vec(),
        };
        index.add_frombuffer(&entry, contents)?;
        index.write()?;
        Ok(())
    }
}

impl GitRemote for Git2Remote {
    fn fetch(&self, branch: &str, file: &str) -> Result<RemoteSnapshot, GitError> {
        let rel = repo_path(file)?;

        if let Ok(mut remote) = self.repo.find_remote(&self.remote) {
            let refspec = format!("+{}:{}", local_ref(branch), self.tracking_ref(branch));
            let mut fo = git2::FetchOptions::new();
            fo.remote_callbacks(credential_callbacks(&self.repo));
            if let Err(e) = remote.fetch(&[refspec.as_str()], Some(&mut fo), None) {
                if is_network(&e) {
                    return Err(GitError::Network {
                        op: GitOp::Fetch,
                        message: e.message().to_string(),
                    });
                }
                // a branch that does not exist yet is not an error
                if !is_missing_ref(&e) {
                    return Err(e.into());
                }
            }
        }

        // Prefer the remote tip, fall back to a local-only branch.
        let head = self
            .repo
            .refname_to_id(&self.tracking_ref(branch))
            .or_else(|_| self.repo.refname_to_id(&local_ref(branch)))
            .ok();

        let contents = match head {
            Some(oid) => read_file_at(&self.repo, oid, rel)?,
            None => None,
        };
        tracing::debug!(
            branch,
            head = ?head.map(|oid| oid.to_string()),
            bytes = contents.as_ref().map(Vec::len),
            "fetched memory branch"
        );
        Ok(RemoteSnapshot {
            head: head.map(CommitId::from),
            contents,
        })
    }

    fn commit(
        &self,
        branch: &str,
        file: &str,
        parent: Option<&CommitId>,
        contents: &[u8],
        message: &str,
    ) -> Result<CommitId, GitError> {
        let rel = repo_path(file)?;
        let blob = self.repo.blob(contents)?;

        let parent_commit = match parent {
            Some(id) => Some(self.repo.find_commit(Oid::from_str(id.as_str())?)?),
            None => None,
        };
        let baseline = match &parent_commit {
            Some(commit) => commit.tree()?,
            None => {
                let empty = self.repo.treebuilder(None)?.write()?;
                self.repo.find_tree(empty)?
            }
        };

        let mut update = git2::build::TreeUpdateBuilder::new();
        update.upsert(rel, blob, FileMode::Blob);
        let tree_oid = update.create_updated(&self.repo, &baseline)?;
        let tree = self.repo.find_tree(tree_oid)?;

        let sig = self.signature()?;
        let parents: Vec<&git2::Commit<'_>> = parent_commit.iter().collect();
        let oid = self.repo.commit(None, &sig, &sig, message, &tree, &parents)?;
        self.repo
            .reference(&local_ref(branch), oid, true, "memsync: merge commit")?;
        self.sync_index(branch, rel, contents)?;

        tracing::debug!(branch, commit = %oid, "created merge commit");
        Ok(CommitId::from(oid))
    }

    fn push(&self, branch: &str, commit: &CommitId) -> Result<(), GitError> {
        // No remote configured - local-only repo, the commit is all there is.
        let Ok(mut remote) = self.repo.find_remote(&self.remote) else {
            return Ok(());
        };

        let local = local_ref(branch);
        if self.repo.refname_to_id(&local)?.to_string() != commit.as_str() {
            self.repo.reference(
                &local,
                Oid::from_str(commit.as_str())?,
                true,
                "memsync: push",
            )?;
        }

        let refspec = format!("{local}:{local}");
        let push_error: RefCell<Option<String>> = RefCell::new(None);
        {
            let mut callbacks = credential_callbacks(&self.repo);
            callbacks.push_update_reference(|_ref_name, status| {
                if let Some(msg) = status {
                    *push_error.borrow_mut() = Some(msg.to_string());
                }
                Ok(())
            });
            let mut push_options = git2::PushOptions::new();
            push_options.remote_callbacks(callbacks);

            if let Err(e) = remote.push(&[refspec.as_str()], Some(&mut push_options)) {
                if e.code() == ErrorCode::NotFastForward || is_non_fast_forward(e.message()) {
                    return Err(GitError::NonFastForward);
                }
                if is_network(&e) {
                    return Err(GitError::Network {
                        op: GitOp::Push,
                        message: e.message().to_string(),
                    });
                }
                return Err(e.into());
            }
        }

        if let Some(message) = push_error.into_inner() {
            if is_non_fast_forward(&message) {
                return Err(GitError::NonFastForward);
            }
            return Err(PushRejected { message }.into());
        }
        Ok(())
    }
}

fn local_ref(branch: &str) -> String {
    format!("refs/heads/{branch}")
}

/// Validate a repository-relative file path.
fn repo_path(file: &str) -> Result<&Path, GitError> {
    let normal = file
        .split('/')
        .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if !normal || file.contains('\\') {
        return Err(GitError::InvalidPath(file.to_string()));
    }
    Ok(Path::new(file))
}

fn read_file_at(repo: &Repository, oid: Oid, path: &Path) -> Result<Option<Vec<u8>>, GitError> {
    let tree = repo.find_commit(oid)?.tree()?;
    let entry = match tree.get_path(path) {
        Ok(entry) => entry,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if entry.kind() != Some(ObjectType::Blob) {
        return Err(GitError::NotABlob(path.display().to_string()));
    }
    let blob = repo.find_blob(entry.id())?;
    Ok(Some(blob.content().to_vec()))
}

fn credential_callbacks<'a>(repo: &Repository) -> git2::RemoteCallbacks<'a> {
    let cfg = repo.config().ok();
    let mut callbacks = git2::RemoteCallbacks::new();
    callbacks.credentials(move |url, username_from_url, allowed| {
        if allowed.is_ssh_key()
            && let Some(user) = username_from_url
        {
            return git2::Cred::ssh_key_from_agent(user);
        }
        if allowed.is_user_pass_plaintext()
            && let Some(ref cfg) = cfg
            && let Ok(cred) = git2::Cred::credential_helper(cfg, url, username_from_url)
        {
            return Ok(cred);
        }
        git2::Cred::default()
    });
    callbacks
}

fn is_network(e: &git2::Error) -> bool {
    matches!(
        e.class(),
        ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssh | ErrorClass::Ssl
    )
}

fn is_missing_ref(e: &git2::Error) -> bool {
    e.code() == ErrorCode::NotFound || e.message().contains("couldn't find remote ref")
}

fn is_non_fast_forward(message: &str) -> bool {
    message.contains("non-fast-forward")
        || message.contains("fetch first")
        || message.contains("non-fastforwardable")
        || message.contains("cannot lock ref")
        || message.contains("failed to update ref")
}
