//! Version-control capabilities the pipeline consumes, as an extension of [git2::Repository].

use git2::{
    build::CheckoutBuilder, BranchType, CherrypickOptions, Commit, Cred, Oid, PushOptions,
    RemoteCallbacks, Repository, ResetType, Signature,
};
use tracing::{debug, info};

use crate::error::MergerError;

/// Result of applying one commit onto the index and working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickOutcome {
    Clean,
    Conflicted { paths: Vec<String> },
}

/// Credentials for pushing over HTTPS.
#[derive(Debug, Clone)]
pub struct PushCredentials {
    pub username: String,
    pub password: String,
}

/// Parse a stored commit id, which must be a full 40-character hex hash.
pub fn parse_sha(sha: &str) -> Result<Oid, MergerError> {
    let trimmed = sha.trim();
    match hex::decode(trimmed) {
        Ok(bytes) if bytes.len() == 20 => {
            Oid::from_bytes(&bytes).map_err(|_| MergerError::InvalidCommitSha(sha.to_string()))
        }
        _ => Err(MergerError::InvalidCommitSha(sha.to_string())),
    }
}

pub trait RepositoryExt {
    /// Create local branch `name` at `base_ref`, returning the starting tip.
    /// Fails with [MergerError::BranchCollision] if the branch already exists.
    fn create_branch_from(&self, name: &str, base_ref: &str) -> Result<Oid, MergerError>;

    fn branch_exists(&self, name: &str) -> Result<bool, MergerError>;

    fn delete_branch(&self, name: &str) -> Result<(), MergerError>;

    /// Point HEAD at `name` and force the working tree to match it.
    fn checkout_branch(&self, name: &str) -> Result<(), MergerError>;

    /// Current tip of a local branch.
    fn branch_tip(&self, name: &str) -> Result<Oid, MergerError>;

    /// Apply `commit` onto the current index and working tree without committing.
    fn cherry_pick_onto_head(&self, commit: &Commit<'_>) -> Result<PickOutcome, MergerError>;

    /// Commit the index onto `branch` with `parent` as sole parent, keeping the
    /// source commit's author.
    fn commit_index(
        &self,
        branch: &str,
        parent: Oid,
        source: &Commit<'_>,
        committer: &Signature<'_>,
        message: &str,
    ) -> Result<Oid, MergerError>;

    /// Hard-reset the checked-out branch, index and working tree to `oid`.
    fn reset_hard(&self, oid: Oid) -> Result<(), MergerError>;

    /// Remove any in-progress cherry-pick/merge markers.
    fn clear_operation_state(&self) -> Result<(), MergerError>;

    fn push_branch(
        &self,
        remote: &str,
        branch: &str,
        credentials: Option<&PushCredentials>,
    ) -> Result<(), MergerError>;

    fn fetch_refspec(&self, remote: &str, refspec: &str) -> Result<(), MergerError>;
}

impl RepositoryExt for Repository {
    fn create_branch_from(&self, name: &str, base_ref: &str) -> Result<Oid, MergerError> {
        if self.branch_exists(name)? {
            return Err(MergerError::BranchCollision(name.to_string()));
        }
        let base = self.revparse_single(base_ref)?.peel_to_commit()?;
        self.branch(name, &base, false)?;
        debug!("Created branch {} at {} ({})", name, base.id(), base_ref);
        Ok(base.id())
    }

    fn branch_exists(&self, name: &str) -> Result<bool, MergerError> {
        match self.find_branch(name, BranchType::Local) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_branch(&self, name: &str) -> Result<(), MergerError> {
        self.find_branch(name, BranchType::Local)?.delete()?;
        debug!("Deleted branch {}", name);
        Ok(())
    }

    fn checkout_branch(&self, name: &str) -> Result<(), MergerError> {
        self.set_head(&format!("refs/heads/{}", name))?;
        self.checkout_head(Some(CheckoutBuilder::new().force()))?;
        Ok(())
    }

    fn branch_tip(&self, name: &str) -> Result<Oid, MergerError> {
        self.find_branch(name, BranchType::Local)?
            .get()
            .target()
            .ok_or_else(|| MergerError::Git(format!("Branch {} has no target", name)))
    }

    fn cherry_pick_onto_head(&self, commit: &Commit<'_>) -> Result<PickOutcome, MergerError> {
        let mut options = CherrypickOptions::new();
        if commit.parent_count() > 1 {
            options.mainline(1);
        }
        self.cherrypick(commit, Some(&mut options))?;

        let index = self.index()?;
        if !index.has_conflicts() {
            return Ok(PickOutcome::Clean);
        }

        let mut paths = Vec::new();
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
            if let Some(entry) = entry {
                paths.push(String::from_utf8_lossy(&entry.path).into_owned());
            }
        }
        Ok(PickOutcome::Conflicted { paths })
    }

    fn commit_index(
        &self,
        branch: &str,
        parent: Oid,
        source: &Commit<'_>,
        committer: &Signature<'_>,
        message: &str,
    ) -> Result<Oid, MergerError> {
        let tree_id = self.index()?.write_tree()?;
        let tree = self.find_tree(tree_id)?;
        let parent = self.find_commit(parent)?;
        let oid = self.commit(
            Some(&format!("refs/heads/{}", branch)),
            &source.author(),
            committer,
            message,
            &tree,
            &[&parent],
        )?;
        Ok(oid)
    }

    fn reset_hard(&self, oid: Oid) -> Result<(), MergerError> {
        let target = self.find_object(oid, None)?;
        self.reset(&target, ResetType::Hard, None)?;
        Ok(())
    }

    fn clear_operation_state(&self) -> Result<(), MergerError> {
        self.cleanup_state()?;
        Ok(())
    }

    fn push_branch(
        &self,
        remote: &str,
        branch: &str,
        credentials: Option<&PushCredentials>,
    ) -> Result<(), MergerError> {
        let mut remote = self.find_remote(remote)?;
        let mut rejection: Option<String> = None;

        {
            let mut callbacks = RemoteCallbacks::new();
            if let Some(credentials) = credentials {
                callbacks.credentials(move |_url, _username, _allowed| {
                    Cred::userpass_plaintext(&credentials.username, &credentials.password)
                });
            }
            callbacks.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    rejection = Some(format!("{}: {}", refname, message));
                }
                Ok(())
            });

            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);
            let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);
            remote.push(&[refspec.as_str()], Some(&mut options))?;
        }

        if let Some(reason) = rejection {
            return Err(MergerError::Git(format!("Push rejected: {}", reason)));
        }
        info!("Pushed branch {} to {}", branch, remote.name().unwrap_or("remote"));
        Ok(())
    }

    fn fetch_refspec(&self, remote: &str, refspec: &str) -> Result<(), MergerError> {
        self.find_remote(remote)?.fetch(&[refspec], None, None)?;
        debug!("Fetched {} from {}", refspec, remote);
        Ok(())
    }
}
