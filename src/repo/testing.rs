//! Scratch repositories for tests.

use git2::{Repository, RepositoryInitOptions, Signature};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, tempdir};

/// A fresh non-bare repository whose unborn HEAD points at `main`.
pub fn init_repo() -> (TempDir, Repository) {
    let dir = tempdir().unwrap();
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    let repo = Repository::init_opts(dir.path(), &opts).unwrap();
    let mut config = repo.config().unwrap();
    config.set_str("user.name", "test").unwrap();
    config.set_str("user.email", "test@test.com").unwrap();
    drop(config);
    (dir, repo)
}

/// Write `name` and commit everything in the working tree on the current branch.
pub fn commit_file(repo: &Repository, name: &str, content: &str, msg: &str) -> git2::Oid {
    let root = repo.workdir().unwrap();
    let file_path = root.join(name);
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&file_path, content).unwrap();
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = Signature::now("test", "test@test.com").unwrap();
    if let Ok(head) = repo.head() {
        let parent = head.peel_to_commit().unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &[&parent])
            .unwrap()
    } else {
        repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &[])
            .unwrap()
    }
}

/// A bare "remote" seeded from a scratch repository. The returned seed
/// repository has `origin` pointing at the bare one so tests can publish more
/// branches with [`Remote::publish`].
pub struct Remote {
    _dir: TempDir,
    pub path: PathBuf,
    pub seed: Repository,
}

impl Remote {
    /// Remote with `main` holding a single `README.md` commit.
    pub fn new() -> Self {
        let dir = tempdir().unwrap();
        let seed_path = dir.path().join("seed");
        let path = dir.path().join("remote.git");
        fs::create_dir_all(&seed_path).unwrap();

        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let seed = Repository::init_opts(&seed_path, &opts).unwrap();
        commit_file(&seed, "README.md", "# app\n", "initial commit");

        let mut bare_opts = RepositoryInitOptions::new();
        bare_opts.bare(true).initial_head("main");
        Repository::init_opts(&path, &bare_opts).unwrap();
        seed.remote("origin", path.to_str().unwrap()).unwrap();
        let remote = Self {
            _dir: dir,
            path,
            seed,
        };
        remote.publish("main");
        remote
    }

    pub fn url(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Push the seed repository's local `branch` to the bare remote.
    pub fn publish(&self, branch: &str) {
        let mut origin = self.seed.find_remote("origin").unwrap();
        let refspec = format!("+refs/heads/{0}:refs/heads/{0}", branch);
        origin.push(&[refspec.as_str()], None).unwrap();
    }

    /// Create `branch` from `from` in the seed, commit `file`, publish it,
    /// and switch the seed back to `from`.
    pub fn branch_with_commit(&self, branch: &str, from: &str, file: &str, content: &str) {
        let base = self
            .seed
            .find_branch(from, git2::BranchType::Local)
            .unwrap()
            .get()
            .peel_to_commit()
            .unwrap();
        self.seed.branch(branch, &base, true).unwrap();
        self.checkout(branch);
        commit_file(&self.seed, file, content, &format!("change {}", file));
        self.publish(branch);
        self.checkout(from);
    }

    pub fn checkout(&self, branch: &str) {
        let refname = format!("refs/heads/{}", branch);
        let obj = self.seed.revparse_single(&refname).unwrap();
        self.seed
            .checkout_tree(&obj, Some(git2::build::CheckoutBuilder::new().force()))
            .unwrap();
        self.seed.set_head(&refname).unwrap();
    }

    /// Tip of `branch` on the bare remote.
    pub fn tip(&self, branch: &str) -> Option<git2::Oid> {
        let bare = Repository::open_bare(&self.path).unwrap();
        bare.refname_to_id(&format!("refs/heads/{}", branch)).ok()
    }

    pub fn file_at(&self, branch: &str, path: &str) -> Option<String> {
        let bare = Repository::open_bare(&self.path).unwrap();
        let commit = bare
            .find_reference(&format!("refs/heads/{}", branch))
            .ok()?
            .peel_to_commit()
            .ok()?;
        let entry = commit.tree().ok()?.get_path(Path::new(path)).ok()?;
        let blob = bare.find_blob(entry.id()).ok()?;
        Some(String::from_utf8_lossy(blob.content()).into_owned())
    }
}
