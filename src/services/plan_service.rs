use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::models::file_record::Inventory;
use crate::models::plan::{Plan, PlanProblem, ProblemCode, ValidationResult};
use crate::scope_path;

/// Checks a plan against the inventory it was built from and the live root.
///
/// Never touches the filesystem beyond metadata lookups of planned folders
/// and destination parents. All problems are collected; checks run in a
/// fixed order so the same plan always yields the same problem list.
pub fn validate(plan: &Plan, inventory: &Inventory, root: &Path) -> ValidationResult {
    let mut problems = Vec::new();

    let resolved: Vec<(Option<String>, Option<String>)> = plan
        .moves
        .iter()
        .map(|mv| {
            (
                scope_path::resolve_relative(&mv.source),
                scope_path::resolve_relative(&mv.destination),
            )
        })
        .collect();

    // 1. sources
    let mut first_source: HashMap<&str, usize> = HashMap::new();
    for (index, (mv, (source, _))) in plan.moves.iter().zip(&resolved).enumerate() {
        let Some(source) = source.as_deref() else {
            problems.push(not_in_inventory(index, &mv.source));
            continue;
        };
        match inventory.find(source) {
            None => problems.push(not_in_inventory(index, &mv.source)),
            Some(record) if record.inside_organized_region => problems.push(PlanProblem::for_move(
                index,
                ProblemCode::SourceInOrganizedRegion,
                format!("source `{}` is inside an organized region", mv.source),
            )),
            Some(_) => {
                if let Some(earlier) = first_source.get(source) {
                    problems.push(PlanProblem::for_move(
                        index,
                        ProblemCode::DuplicateSource,
                        format!("source `{source}` is already moved by move {earlier}"),
                    ));
                } else {
                    first_source.insert(source, index);
                }
            }
        }
    }

    // 2. containment
    let mut folders = Vec::new();
    for folder in &plan.folders {
        match scope_path::resolve_relative(folder) {
            Some(resolved) => folders.push(resolved),
            None => problems.push(PlanProblem::for_plan(
                ProblemCode::FolderEscapesRoot,
                format!("folder `{folder}` is outside the root"),
            )),
        }
    }
    for (index, (mv, (_, destination))) in plan.moves.iter().zip(&resolved).enumerate() {
        if destination.is_none() {
            problems.push(PlanProblem::for_move(
                index,
                ProblemCode::DestinationEscapesRoot,
                format!("destination `{}` is outside the root", mv.destination),
            ));
        }
    }

    // 3. destinations: duplicates and no-op moves
    let mut first_use: HashMap<&str, usize> = HashMap::new();
    for (index, (source, destination)) in resolved.iter().enumerate() {
        let Some(destination) = destination.as_deref() else {
            continue;
        };
        if let Some(earlier) = first_use.get(destination) {
            problems.push(PlanProblem::for_move(
                index,
                ProblemCode::DuplicateDestination,
                format!("destination `{destination}` is also used by move {earlier}"),
            ));
        } else {
            first_use.insert(destination, index);
        }
        if source.as_deref() == Some(destination) {
            problems.push(PlanProblem::for_move(
                index,
                ProblemCode::SourceIsDestination,
                format!("`{destination}` would be moved onto itself"),
            ));
        }
    }

    // 4. folders and destination parents
    for folder in &folders {
        if let Some(blocker) = file_in_the_way(root, folder) {
            problems.push(PlanProblem::for_plan(
                ProblemCode::FolderIsFile,
                format!("folder `{folder}` cannot be created, `{blocker}` is a file"),
            ));
        }
    }
    for (index, (_, destination)) in resolved.iter().enumerate() {
        let Some(destination) = destination.as_deref() else {
            continue;
        };
        let parent = scope_path::parent_of(destination);
        if parent.is_empty() {
            continue;
        }
        if let Some(blocker) = file_in_the_way(root, parent) {
            problems.push(PlanProblem::for_move(
                index,
                ProblemCode::FolderIsFile,
                format!("folder `{parent}` cannot be created, `{blocker}` is a file"),
            ));
            continue;
        }
        if folder_is_declared(parent, &folders) || scope_path::join_relative(root, parent).is_dir() {
            continue;
        }
        problems.push(PlanProblem::for_move(
            index,
            ProblemCode::MissingParentFolder,
            format!("folder `{parent}` is neither planned nor existing"),
        ));
    }

    ValidationResult::from_problems(problems)
}

fn not_in_inventory(index: usize, source: &str) -> PlanProblem {
    PlanProblem::for_move(
        index,
        ProblemCode::SourceNotInInventory,
        format!("source `{source}` is not part of the scanned inventory"),
    )
}

/// True when `parent` is a planned folder or an ancestor of one.
fn folder_is_declared(parent: &str, folders: &[String]) -> bool {
    let prefix = format!("{parent}/");
    folders
        .iter()
        .any(|folder| folder == parent || folder.starts_with(&prefix))
}

/// First component of `relative` (outermost first) that exists but is not a directory.
fn file_in_the_way(root: &Path, relative: &str) -> Option<String> {
    let mut chain = scope_path::ancestors(relative);
    chain.push(relative.to_string());
    chain.into_iter().find(|prefix| {
        let path = scope_path::join_relative(root, prefix);
        !path.is_dir() && fs::symlink_metadata(&path).is_ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::file_record::{FileCategory, FileRecord, InventorySummary};
    use crate::models::plan::Move;
    use chrono::Utc;

    fn record(relative: &str, organized: bool) -> FileRecord {
        FileRecord {
            path: format!("/root/{relative}"),
            relative_path: relative.to_string(),
            size_bytes: 1,
            extension: Some("txt".to_string()),
            category: FileCategory::Documents,
            created_at: None,
            modified_at: None,
            excerpt: None,
            inside_organized_region: organized,
        }
    }

    fn inventory(files: Vec<FileRecord>) -> Inventory {
        Inventory {
            id: "inv".to_string(),
            root_path: "/root".to_string(),
            summary: InventorySummary::from_records(&files, vec![], 100, false),
            files,
            created_at: Utc::now(),
        }
    }

    fn mv(source: &str, destination: &str) -> Move {
        Move {
            source: source.to_string(),
            destination: destination.to_string(),
            reason: String::new(),
        }
    }

    fn codes(result: &ValidationResult) -> Vec<(Option<usize>, ProblemCode)> {
        result
            .problems
            .iter()
            .map(|p| (p.move_index, p.code))
            .collect()
    }

    #[test]
    fn accepts_well_formed_plan() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(vec![record("a.txt", false), record("b.txt", false)]);
        let plan = Plan::new(
            vec!["Docs/Text".to_string()],
            vec![mv("a.txt", "Docs/Text/a.txt"), mv("b.txt", "Docs/b.txt")],
        );

        let result = validate(&plan, &inv, dir.path());
        assert!(result.ok, "{:?}", result.problems);
    }

    #[test]
    fn existing_directories_satisfy_parents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Existing")).unwrap();
        let inv = inventory(vec![record("a.txt", false)]);
        let plan = Plan::new(Vec::new(), vec![mv("a.txt", "Existing/a.txt")]);

        assert!(validate(&plan, &inv, dir.path()).ok);
    }

    #[test]
    fn organized_source_is_reported_by_index() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(vec![record("a.txt", true), record("b.txt", true)]);
        let plan = Plan::new(Vec::new(), vec![mv("a.txt", "x.txt")]);

        let result = validate(&plan, &inv, dir.path());
        assert!(!result.ok);
        assert_eq!(
            codes(&result),
            vec![(Some(0), ProblemCode::SourceInOrganizedRegion)]
        );
    }

    #[test]
    fn accumulates_every_problem_in_check_order() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(vec![record("a.txt", false), record("b.txt", false)]);
        let plan = Plan::new(
            vec!["../Outside".to_string()],
            vec![
                mv("ghost.txt", "Docs/ghost.txt"),
                mv("a.txt", "../../etc/a.txt"),
                mv("b.txt", "same.txt"),
                mv("a.txt", "same.txt"),
            ],
        );

        let result = validate(&plan, &inv, dir.path());
        assert_eq!(
            codes(&result),
            vec![
                (Some(0), ProblemCode::SourceNotInInventory),
                (Some(3), ProblemCode::DuplicateSource),
                (None, ProblemCode::FolderEscapesRoot),
                (Some(1), ProblemCode::DestinationEscapesRoot),
                (Some(3), ProblemCode::DuplicateDestination),
                (Some(0), ProblemCode::MissingParentFolder),
            ]
        );
        assert!(result.problems[1].message.contains("move 1"));
        assert!(result.problems[4].message.contains("move 2"));
    }

    #[test]
    fn moving_one_source_twice_is_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(vec![record("a.txt", false)]);
        let plan = Plan::new(
            vec!["X".to_string(), "Y".to_string()],
            vec![mv("a.txt", "X/a.txt"), mv("./a.txt", "Y/a.txt")],
        );

        let result = validate(&plan, &inv, dir.path());
        assert_eq!(codes(&result), vec![(Some(1), ProblemCode::DuplicateSource)]);
        assert_eq!(result.blocking_problems().len(), 1);
    }

    #[test]
    fn moving_a_file_onto_itself_is_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(vec![record("b.txt", false), record("sub/c.txt", false)]);
        let plan = Plan::new(
            Vec::new(),
            vec![mv("b.txt", "b.txt"), mv("sub/c.txt", "sub/./c.txt")],
        );

        let result = validate(&plan, &inv, dir.path());
        assert_eq!(
            codes(&result),
            vec![
                (Some(0), ProblemCode::SourceIsDestination),
                (Some(1), ProblemCode::SourceIsDestination),
                (Some(1), ProblemCode::MissingParentFolder),
            ]
        );
        assert_eq!(result.blocking_problems().len(), 2);
    }

    #[test]
    fn folders_blocked_by_files_are_blocking() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Docs"), "not a folder").unwrap();
        std::fs::write(dir.path().join("Notes"), "not a folder").unwrap();
        let inv = inventory(vec![record("a.txt", false), record("b.txt", false)]);
        let plan = Plan::new(
            vec!["Docs/Text".to_string()],
            vec![mv("a.txt", "Docs/Text/a.txt"), mv("b.txt", "Notes/b.txt")],
        );

        let result = validate(&plan, &inv, dir.path());
        assert_eq!(
            codes(&result),
            vec![
                (None, ProblemCode::FolderIsFile),
                (Some(0), ProblemCode::FolderIsFile),
                (Some(1), ProblemCode::FolderIsFile),
            ]
        );
        assert!(result.problems[0].message.contains("`Docs`"));
        assert_eq!(result.blocking_problems().len(), 3);
    }

    #[test]
    fn absolute_destinations_escape() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(vec![record("a.txt", false)]);
        let plan = Plan::new(Vec::new(), vec![mv("a.txt", "/tmp/a.txt")]);

        let result = validate(&plan, &inv, dir.path());
        assert_eq!(
            codes(&result),
            vec![(Some(0), ProblemCode::DestinationEscapesRoot)]
        );
    }

    #[test]
    fn blocking_problems_exclude_recoverable_ones() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(vec![record("a.txt", true), record("b.txt", false)]);
        let plan = Plan::new(
            Vec::new(),
            vec![mv("a.txt", "Docs/a.txt"), mv("b.txt", "Docs/b.txt")],
        );

        let result = validate(&plan, &inv, dir.path());
        assert!(!result.ok);
        assert!(result.blocking_problems().is_empty());
    }

    #[test]
    fn validation_does_not_touch_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(vec![record("a.txt", false)]);
        let plan = Plan::new(vec!["New".to_string()], vec![mv("a.txt", "New/a.txt")]);

        validate(&plan, &inv, dir.path());
        assert!(!dir.path().join("New").exists());
    }
}
