use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::manifest::ExecutionMode;
use crate::models::operation::{ExecutionResult, MoveOutcome, SkippedMove};
use crate::models::plan::{Move, Plan};
use crate::scope_path;
use crate::services::task_service::TaskHandle;

/// Receives every successful mutation of a real execution, in order.
pub trait MoveJournal {
    fn record_move(&mut self, original: &Path, new: &Path) -> Result<(), AppError>;
    fn record_folder(&mut self, relative: &str) -> Result<(), AppError>;
}

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub cleanup_empty_dirs: bool,
}

/// Reports what `apply` would do without touching the filesystem.
pub fn simulate(
    root: &Path,
    plan: &Plan,
    protected: &HashSet<String>,
    handle: &TaskHandle,
) -> Result<ExecutionResult, AppError> {
    let options = ExecuteOptions {
        cleanup_empty_dirs: false,
    };
    Executor::new(root, ExecutionMode::DryRun, None).run(plan, protected, &options, handle)
}

/// Applies `plan` under `root`, which must be canonical.
///
/// Per-move failures land in `skipped`; only cancellation aborts the run.
pub fn apply(
    root: &Path,
    plan: &Plan,
    protected: &HashSet<String>,
    journal: &mut dyn MoveJournal,
    options: &ExecuteOptions,
    handle: &TaskHandle,
) -> Result<ExecutionResult, AppError> {
    Executor::new(root, ExecutionMode::Real, Some(journal)).run(plan, protected, options, handle)
}

struct Executor<'a> {
    root: &'a Path,
    mode: ExecutionMode,
    journal: Option<&'a mut dyn MoveJournal>,
    reserved: HashSet<PathBuf>,
    vacated: HashSet<PathBuf>,
    planned_dirs: HashSet<PathBuf>,
    created_dirs: HashSet<String>,
    moved_sources: Vec<String>,
    result: ExecutionResult,
}

impl<'a> Executor<'a> {
    fn new(root: &'a Path, mode: ExecutionMode, journal: Option<&'a mut dyn MoveJournal>) -> Self {
        Self {
            root,
            mode,
            journal,
            reserved: HashSet::new(),
            vacated: HashSet::new(),
            planned_dirs: HashSet::new(),
            created_dirs: HashSet::new(),
            moved_sources: Vec::new(),
            result: ExecutionResult::new(mode),
        }
    }

    fn run(
        mut self,
        plan: &Plan,
        protected: &HashSet<String>,
        options: &ExecuteOptions,
        handle: &TaskHandle,
    ) -> Result<ExecutionResult, AppError> {
        info!(root = %self.root.display(), mode = %self.mode, moves = plan.moves.len(), "execution started");

        for folder in &plan.folders {
            handle.checkpoint()?;
            let outcome = match scope_path::resolve_relative(folder) {
                Some(relative) => self.ensure_dir(&relative),
                None => Err("folder is outside the root".to_string()),
            };
            if let Err(reason) = outcome {
                warn!(folder = %folder, %reason, "folder skipped");
                self.result.skipped.push(SkippedMove {
                    index: None,
                    source: folder.clone(),
                    reason,
                });
            }
        }

        let total = plan.moves.len().max(1);
        for (index, mv) in plan.moves.iter().enumerate() {
            handle.checkpoint()?;
            match self.move_one(index, mv, protected) {
                Ok(outcome) => {
                    debug!(source = %outcome.source, destination = %outcome.destination, "moved");
                    self.result.moved_count += 1;
                    self.result.outcomes.push(outcome);
                }
                Err(reason) => {
                    warn!(index, source = %mv.source, %reason, "move skipped");
                    self.result.skipped.push(SkippedMove {
                        index: Some(index),
                        source: mv.source.clone(),
                        reason,
                    });
                }
            }
            handle.progress(
                (index + 1) as f64 / total as f64,
                format!("processed {}/{} move(s)", index + 1, plan.moves.len()),
            );
        }

        if self.mode == ExecutionMode::Real && options.cleanup_empty_dirs {
            self.remove_emptied_dirs(plan);
        }

        self.result.partial = !self.result.skipped.is_empty();
        info!(
            mode = %self.mode,
            moved = self.result.moved_count,
            skipped = self.result.skipped.len(),
            "execution finished"
        );
        Ok(self.result)
    }

    fn move_one(
        &mut self,
        index: usize,
        mv: &Move,
        protected: &HashSet<String>,
    ) -> Result<MoveOutcome, String> {
        let source_rel = scope_path::resolve_relative(&mv.source)
            .ok_or_else(|| "source is outside the root".to_string())?;
        if protected.contains(&source_rel) {
            return Err("source is inside an organized region".to_string());
        }
        let dest_rel = scope_path::resolve_relative(&mv.destination)
            .ok_or_else(|| "destination is outside the root".to_string())?;

        let source = scope_path::join_relative(self.root, &source_rel);
        if !self.source_available(&source) {
            return Err(format!("source `{source_rel}` no longer exists"));
        }

        let planned = scope_path::join_relative(self.root, &dest_rel);
        if planned == source {
            return Err("source and destination are the same".to_string());
        }
        if !scope_path::is_within_root(self.root, &planned) {
            return Err("destination resolves outside the root".to_string());
        }

        let parent_rel = scope_path::parent_of(&dest_rel);
        if !parent_rel.is_empty() {
            self.ensure_dir(parent_rel)?;
        }

        let mut destination = next_free_path(&planned, |candidate| self.is_occupied(candidate));

        if self.mode == ExecutionMode::Real {
            // Something may have appeared at the destination since the check.
            loop {
                match move_file(&source, &destination) {
                    Ok(()) => break,
                    Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                        debug!(destination = %destination.display(), "destination taken meanwhile");
                        self.reserved.insert(destination.clone());
                        destination = next_free_path(&planned, |candidate| self.is_occupied(candidate));
                    }
                    Err(err) => return Err(format!("move failed: {err}")),
                }
            }
            if let Some(journal) = self.journal.as_mut() {
                if let Err(err) = journal.record_move(&source, &destination) {
                    let rollback = match move_file(&destination, &source) {
                        Ok(()) => "rolled back",
                        Err(_) => "could not be rolled back",
                    };
                    return Err(format!("manifest write failed ({err}); move {rollback}"));
                }
            }
        }

        let renamed = destination != planned;
        self.reserved.insert(destination.clone());
        self.vacated.insert(source);
        self.moved_sources.push(source_rel.clone());

        Ok(MoveOutcome {
            index,
            source: source_rel,
            planned_destination: dest_rel.clone(),
            destination: scope_path::relative_to(self.root, &destination).unwrap_or(dest_rel),
            renamed,
        })
    }

    fn source_available(&self, source: &Path) -> bool {
        if self.vacated.contains(source) {
            return false;
        }
        source.is_file() || (self.mode == ExecutionMode::DryRun && self.reserved.contains(source))
    }

    fn is_occupied(&self, path: &Path) -> bool {
        if self.reserved.contains(path) {
            return true;
        }
        fs::symlink_metadata(path).is_ok() && !self.vacated.contains(path)
    }

    fn dir_exists(&self, path: &Path) -> bool {
        path.is_dir() || self.planned_dirs.contains(path)
    }

    /// Creates `relative` and any missing ancestors, recording each one.
    fn ensure_dir(&mut self, relative: &str) -> Result<(), String> {
        let mut chain = scope_path::ancestors(relative);
        chain.push(relative.to_string());

        for prefix in chain {
            let path = scope_path::join_relative(self.root, &prefix);
            if self.dir_exists(&path) {
                continue;
            }
            if fs::symlink_metadata(&path).is_ok() || self.reserved.contains(&path) {
                return Err(format!("`{prefix}` exists and is not a directory"));
            }
            if !scope_path::is_within_root(self.root, &path) {
                return Err(format!("`{prefix}` resolves outside the root"));
            }

            match self.mode {
                ExecutionMode::DryRun => {
                    self.planned_dirs.insert(path);
                }
                ExecutionMode::Real => {
                    match fs::create_dir(&path) {
                        Ok(()) => {}
                        Err(err) if err.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => {
                            continue;
                        }
                        Err(err) => return Err(format!("could not create `{prefix}`: {err}")),
                    }
                    if let Some(journal) = self.journal.as_mut() {
                        journal
                            .record_folder(&prefix)
                            .map_err(|e| format!("manifest write failed: {e}"))?;
                    }
                }
            }
            self.created_dirs.insert(prefix.clone());
            self.result.folders_created.push(prefix);
        }
        Ok(())
    }

    /// Best-effort removal of source directories the run left empty.
    fn remove_emptied_dirs(&mut self, plan: &Plan) {
        let candidates: BTreeSet<String> = self
            .moved_sources
            .iter()
            .flat_map(|source| scope_path::ancestors(source))
            .filter(|dir| !self.created_dirs.contains(dir) && !plan.folders.contains(dir))
            .collect();

        let mut ordered: Vec<String> = candidates.into_iter().collect();
        ordered.sort_by(|a, b| {
            scope_path::depth(b)
                .cmp(&scope_path::depth(a))
                .then_with(|| a.cmp(b))
        });

        for relative in ordered {
            let path = scope_path::join_relative(self.root, &relative);
            if !is_empty_dir(&path) {
                continue;
            }
            match fs::remove_dir(&path) {
                Ok(()) => {
                    debug!(dir = %relative, "removed empty directory");
                    self.result.removed_dirs.push(relative);
                }
                Err(err) => debug!(dir = %relative, error = %err, "could not remove directory"),
            }
        }
    }
}

pub(crate) fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

/// `planned` if free, otherwise `stem_1.ext`, `stem_2.ext`, ... until free.
pub fn next_free_path(planned: &Path, mut occupied: impl FnMut(&Path) -> bool) -> PathBuf {
    if !occupied(planned) {
        return planned.to_path_buf();
    }

    let stem = planned
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = planned
        .extension()
        .map(|s| s.to_string_lossy().to_string());

    let mut n: u64 = 0;
    loop {
        n += 1;
        let name = match &extension {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
        let candidate = planned.with_file_name(name);
        if !occupied(&candidate) {
            return candidate;
        }
    }
}

/// Moves a file without ever replacing an existing `destination`.
///
/// Links the file under its new name and unlinks the old one; where hard
/// links are unavailable (another device, or a filesystem without them) the
/// content is copied into a freshly created file instead. An occupied
/// destination fails with `AlreadyExists` and leaves both paths untouched.
pub(crate) fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    match fs::hard_link(source, destination) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Err(err),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(err),
        Err(err) => {
            debug!(error = %err, "hard link unavailable, copying instead");
            copy_new(source, destination)?;
        }
    }
    if let Err(err) = fs::remove_file(source) {
        let _ = fs::remove_file(destination);
        return Err(err);
    }
    Ok(())
}

fn copy_new(source: &Path, destination: &Path) -> io::Result<()> {
    let mut reader = fs::File::open(source)?;
    let metadata = reader.metadata()?;
    let mut writer = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)?;
    let copied = io::copy(&mut reader, &mut writer)
        .and_then(|_| writer.sync_all())
        .and_then(|_| fs::set_permissions(destination, metadata.permissions()));
    if let Err(err) = copied {
        drop(writer);
        let _ = fs::remove_file(destination);
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::TaskKind;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct VecJournal {
        moves: Vec<(PathBuf, PathBuf)>,
        folders: Vec<String>,
        fail_moves: bool,
    }

    impl MoveJournal for VecJournal {
        fn record_move(&mut self, original: &Path, new: &Path) -> Result<(), AppError> {
            if self.fail_moves {
                return Err(AppError::General("disk full".to_string()));
            }
            self.moves.push((original.to_path_buf(), new.to_path_buf()));
            Ok(())
        }

        fn record_folder(&mut self, relative: &str) -> Result<(), AppError> {
            self.folders.push(relative.to_string());
            Ok(())
        }
    }

    fn setup() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        (dir, root)
    }

    fn touch(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn mv(source: &str, destination: &str) -> Move {
        Move {
            source: source.to_string(),
            destination: destination.to_string(),
            reason: "test".to_string(),
        }
    }

    fn handle() -> TaskHandle {
        TaskHandle::detached(TaskKind::Execute, "root")
    }

    fn real_options() -> ExecuteOptions {
        ExecuteOptions {
            cleanup_empty_dirs: true,
        }
    }

    /// Relative path to (contents, mtime) for every entry under `root`.
    fn fingerprint(root: &Path) -> BTreeMap<String, (Vec<u8>, Option<std::time::SystemTime>)> {
        walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| {
                let rel = scope_path::relative_to(root, e.path()).unwrap();
                let contents = if e.file_type().is_file() {
                    fs::read(e.path()).unwrap()
                } else {
                    Vec::new()
                };
                (rel, (contents, e.metadata().ok().and_then(|m| m.modified().ok())))
            })
            .collect()
    }

    #[test]
    fn dry_run_reports_without_mutation() {
        let (_dir, root) = setup();
        touch(&root, "a.txt", "a");
        touch(&root, "b.png", "b");
        touch(&root, "proj/main.rs", "fn main() {}");
        let before = fingerprint(&root);

        let plan = Plan::new(
            vec!["Docs".to_string(), "Images".to_string()],
            vec![
                mv("a.txt", "Docs/a.txt"),
                mv("b.png", "Images/b.png"),
                mv("proj/main.rs", "Code/main.rs"),
            ],
        );
        let protected: HashSet<String> = ["proj/main.rs".to_string()].into_iter().collect();

        let result = simulate(&root, &plan, &protected, &handle()).unwrap();

        assert_eq!(result.mode, ExecutionMode::DryRun);
        assert_eq!(result.moved_count, plan.moves.len() - 1);
        assert!(result.manifest_id.is_none());
        assert_eq!(result.folders_created, vec!["Docs".to_string(), "Images".to_string()]);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].index, Some(2));
        assert_eq!(fingerprint(&root), before);
    }

    #[test]
    fn real_run_moves_and_journals() {
        let (_dir, root) = setup();
        touch(&root, "a.txt", "alpha");
        touch(&root, "nested/b.txt", "beta");

        let plan = Plan::new(
            vec!["Docs/Text".to_string()],
            vec![mv("a.txt", "Docs/Text/a.txt"), mv("nested/b.txt", "Docs/b.txt")],
        );
        let mut journal = VecJournal::default();

        let result = apply(&root, &plan, &HashSet::new(), &mut journal, &real_options(), &handle())
            .unwrap();

        assert_eq!(result.moved_count, 2);
        assert!(!result.partial);
        assert_eq!(fs::read_to_string(root.join("Docs/Text/a.txt")).unwrap(), "alpha");
        assert_eq!(fs::read_to_string(root.join("Docs/b.txt")).unwrap(), "beta");
        assert!(!root.join("a.txt").exists());
        assert_eq!(journal.moves.len(), 2);
        assert_eq!(journal.moves[0], (root.join("a.txt"), root.join("Docs/Text/a.txt")));
        assert_eq!(journal.folders, vec!["Docs".to_string(), "Docs/Text".to_string()]);
        assert_eq!(result.removed_dirs, vec!["nested".to_string()]);
    }

    #[test]
    fn collisions_get_numeric_suffixes() {
        let (_dir, root) = setup();
        touch(&root, "X/report.pdf", "existing");
        touch(&root, "report.pdf", "incoming");
        touch(&root, "inbox/report.pdf", "second");

        let plan = Plan::new(
            vec!["X".to_string()],
            vec![mv("report.pdf", "X/report.pdf"), mv("inbox/report.pdf", "X/report.pdf")],
        );

        let dry = simulate(&root, &plan, &HashSet::new(), &handle()).unwrap();
        let mut journal = VecJournal::default();
        let real = apply(&root, &plan, &HashSet::new(), &mut journal, &real_options(), &handle())
            .unwrap();

        let realized: Vec<&str> = real.outcomes.iter().map(|o| o.destination.as_str()).collect();
        assert_eq!(realized, vec!["X/report_1.pdf", "X/report_2.pdf"]);
        assert!(real.outcomes.iter().all(|o| o.renamed));
        assert_eq!(dry.outcomes, real.outcomes);
        assert_eq!(fs::read_to_string(root.join("X/report.pdf")).unwrap(), "existing");
        assert_eq!(fs::read_to_string(root.join("X/report_1.pdf")).unwrap(), "incoming");
        assert!(real.folders_created.is_empty());
    }

    #[test]
    fn existing_folders_are_idempotent() {
        let (_dir, root) = setup();
        fs::create_dir_all(root.join("Docs")).unwrap();
        touch(&root, "a.txt", "a");

        let plan = Plan::new(
            vec!["Docs".to_string(), "Fresh".to_string()],
            vec![mv("a.txt", "Docs/a.txt")],
        );
        let mut journal = VecJournal::default();
        let first = apply(&root, &plan, &HashSet::new(), &mut journal, &real_options(), &handle())
            .unwrap();
        assert_eq!(first.folders_created, vec!["Fresh".to_string()]);

        let second = apply(&root, &plan, &HashSet::new(), &mut journal, &real_options(), &handle())
            .unwrap();
        assert!(second.folders_created.is_empty());
        assert!(second.skipped.iter().all(|s| s.index.is_some()));
        assert_eq!(
            fs::read_dir(&root)
                .unwrap()
                .filter(|e| e.as_ref().unwrap().file_name() == "Docs")
                .count(),
            1
        );
    }

    #[test]
    fn per_move_failures_do_not_abort() {
        let (_dir, root) = setup();
        touch(&root, "a.txt", "a");
        touch(&root, "c.txt", "c");

        let plan = Plan::new(
            Vec::new(),
            vec![
                mv("a.txt", "A/a.txt"),
                mv("missing.txt", "A/missing.txt"),
                mv("c.txt", "A/c.txt"),
            ],
        );
        let mut journal = VecJournal::default();
        let result = apply(&root, &plan, &HashSet::new(), &mut journal, &real_options(), &handle())
            .unwrap();

        assert_eq!(result.moved_count, 2);
        assert!(result.partial);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].index, Some(1));
        assert!(result.skipped[0].reason.contains("no longer exists"));
        assert!(root.join("A/c.txt").exists());
    }

    #[test]
    fn journal_failure_rolls_the_move_back() {
        let (_dir, root) = setup();
        touch(&root, "a.txt", "a");

        let plan = Plan::new(Vec::new(), vec![mv("a.txt", "b.txt")]);
        let mut journal = VecJournal {
            fail_moves: true,
            ..VecJournal::default()
        };
        let result = apply(&root, &plan, &HashSet::new(), &mut journal, &real_options(), &handle())
            .unwrap();

        assert_eq!(result.moved_count, 0);
        assert!(result.skipped[0].reason.contains("rolled back"));
        assert!(root.join("a.txt").exists());
        assert!(!root.join("b.txt").exists());
    }

    #[test]
    fn escaping_destinations_are_skipped() {
        let (_dir, root) = setup();
        touch(&root, "a.txt", "a");

        let plan = Plan::new(
            vec!["../outside".to_string()],
            vec![mv("a.txt", "../a.txt")],
        );
        let result = simulate(&root, &plan, &HashSet::new(), &handle()).unwrap();

        assert_eq!(result.moved_count, 0);
        assert_eq!(result.skipped.len(), 2);
        assert_eq!(result.skipped[0].index, None);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_destination_escape_is_skipped() {
        let (_dir, root) = setup();
        let outside = tempfile::tempdir().unwrap();
        touch(&root, "a.txt", "a");
        std::os::unix::fs::symlink(outside.path(), root.join("link")).unwrap();

        let plan = Plan::new(Vec::new(), vec![mv("a.txt", "link/a.txt")]);
        let mut journal = VecJournal::default();
        let result = apply(&root, &plan, &HashSet::new(), &mut journal, &real_options(), &handle())
            .unwrap();

        assert_eq!(result.moved_count, 0);
        assert!(root.join("a.txt").exists());
        assert!(!outside.path().join("a.txt").exists());
    }

    #[test]
    fn cleanup_keeps_non_empty_and_created_dirs() {
        let (_dir, root) = setup();
        touch(&root, "old/deep/a.txt", "a");
        touch(&root, "keep/b.txt", "b");
        touch(&root, "keep/c.txt", "c");

        let plan = Plan::new(
            vec!["New".to_string()],
            vec![mv("old/deep/a.txt", "New/a.txt"), mv("keep/b.txt", "New/b.txt")],
        );
        let mut journal = VecJournal::default();
        let result = apply(&root, &plan, &HashSet::new(), &mut journal, &real_options(), &handle())
            .unwrap();

        assert_eq!(result.removed_dirs, vec!["old/deep".to_string(), "old".to_string()]);
        assert!(root.join("keep").is_dir());
        assert!(root.join("New").is_dir());
    }

    #[test]
    fn cancellation_stops_between_moves() {
        let (_dir, root) = setup();
        touch(&root, "a.txt", "a");
        let plan = Plan::new(Vec::new(), vec![mv("a.txt", "b.txt")]);
        let handle = handle();
        handle.request_cancel();

        let mut journal = VecJournal::default();
        let err = apply(&root, &plan, &HashSet::new(), &mut journal, &real_options(), &handle)
            .unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
        assert!(root.join("a.txt").exists());
    }

    #[test]
    fn move_file_never_replaces_the_destination() {
        let (_dir, root) = setup();
        touch(&root, "a.txt", "incoming");
        touch(&root, "b.txt", "existing");

        let err = move_file(&root.join("a.txt"), &root.join("b.txt")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read_to_string(root.join("a.txt")).unwrap(), "incoming");
        assert_eq!(fs::read_to_string(root.join("b.txt")).unwrap(), "existing");

        move_file(&root.join("a.txt"), &root.join("c.txt")).unwrap();
        assert!(!root.join("a.txt").exists());
        assert_eq!(fs::read_to_string(root.join("c.txt")).unwrap(), "incoming");
    }

    #[test]
    fn copy_fallback_refuses_existing_files() {
        let (_dir, root) = setup();
        touch(&root, "a.txt", "incoming");
        touch(&root, "b.txt", "existing");

        let err = copy_new(&root.join("a.txt"), &root.join("b.txt")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read_to_string(root.join("b.txt")).unwrap(), "existing");

        copy_new(&root.join("a.txt"), &root.join("c.txt")).unwrap();
        assert_eq!(fs::read_to_string(root.join("c.txt")).unwrap(), "incoming");
        assert!(root.join("a.txt").exists());
    }

    #[test]
    fn next_free_path_handles_extensions() {
        let taken: HashSet<PathBuf> = ["/r/a.tar.gz", "/r/a.tar_1.gz", "/r/.env"]
            .iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(
            next_free_path(Path::new("/r/a.tar.gz"), |p| taken.contains(p)),
            PathBuf::from("/r/a.tar_2.gz")
        );
        assert_eq!(
            next_free_path(Path::new("/r/.env"), |p| taken.contains(p)),
            PathBuf::from("/r/.env_1")
        );
        assert_eq!(
            next_free_path(Path::new("/r/free.txt"), |p| taken.contains(p)),
            PathBuf::from("/r/free.txt")
        );
    }
}
