use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::scope_path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub reason: String,
}

/// A proposed reorganization. Immutable once parsed; re-planning yields a new id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub folders: BTreeSet<String>,
    pub moves: Vec<Move>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemCode {
    MalformedPayload,
    MalformedMove,
    SourceNotInInventory,
    SourceInOrganizedRegion,
    DestinationEscapesRoot,
    FolderEscapesRoot,
    DuplicateDestination,
    DuplicateSource,
    SourceIsDestination,
    FolderIsFile,
    MissingParentFolder,
}

impl ProblemCode {
    /// Problems the execution engine cannot absorb on its own. Organized
    /// sources are skipped per move and missing parents are created on demand.
    pub fn blocks_execution(self) -> bool {
        !matches!(self, Self::SourceInOrganizedRegion | Self::MissingParentFolder)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanProblem {
    pub move_index: Option<usize>,
    pub code: ProblemCode,
    pub message: String,
}

impl PlanProblem {
    pub fn for_move(index: usize, code: ProblemCode, message: impl Into<String>) -> Self {
        Self {
            move_index: Some(index),
            code,
            message: message.into(),
        }
    }

    pub fn for_plan(code: ProblemCode, message: impl Into<String>) -> Self {
        Self {
            move_index: None,
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub ok: bool,
    pub problems: Vec<PlanProblem>,
}

impl ValidationResult {
    pub fn from_problems(problems: Vec<PlanProblem>) -> Self {
        Self {
            ok: problems.is_empty(),
            problems,
        }
    }

    pub fn blocking_problems(&self) -> Vec<PlanProblem> {
        self.problems
            .iter()
            .filter(|problem| problem.code.blocks_execution())
            .cloned()
            .collect()
    }
}

impl Plan {
    pub fn new(folders: impl IntoIterator<Item = String>, moves: Vec<Move>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            folders: folders
                .into_iter()
                .map(|folder| normalize_entry(&folder))
                .filter(|folder| !folder.is_empty())
                .collect(),
            moves,
            created_at: Utc::now(),
        }
    }

    /// Parses an advisory payload into a plan.
    ///
    /// Accepts a JSON object or free-form text wrapping one. Moves may name
    /// their source as `source`, `relative_path` or `file` and their target as
    /// `destination` or `new_path`. Every malformed entry is reported at once.
    pub fn from_untrusted(payload: &Value) -> Result<Self, AppError> {
        let parsed;
        let object = match payload {
            Value::Object(map) => map,
            Value::String(text) => {
                let body = extract_json_payload(text).ok_or_else(|| {
                    malformed("advisory output did not contain a JSON object")
                })?;
                parsed = serde_json::from_str::<Value>(&body)
                    .map_err(|e| malformed(format!("advisory output is not valid JSON: {e}")))?;
                parsed
                    .as_object()
                    .ok_or_else(|| malformed("advisory output is not a JSON object"))?
            }
            _ => return Err(malformed("plan must be a JSON object")),
        };

        let mut problems = Vec::new();

        let mut folders = Vec::new();
        match object.get("folders") {
            None | Some(Value::Null) => {}
            Some(Value::Array(entries)) => {
                for entry in entries {
                    match entry.as_str() {
                        Some(folder) => folders.push(folder.to_string()),
                        None => problems.push(PlanProblem::for_plan(
                            ProblemCode::MalformedPayload,
                            format!("folder entry is not a string: {entry}"),
                        )),
                    }
                }
            }
            Some(_) => problems.push(PlanProblem::for_plan(
                ProblemCode::MalformedPayload,
                "`folders` must be an array of strings",
            )),
        }

        let mut moves = Vec::new();
        match object.get("moves") {
            Some(Value::Array(entries)) => {
                for (index, entry) in entries.iter().enumerate() {
                    match parse_move(entry) {
                        Ok(parsed) => moves.push(parsed),
                        Err(message) => problems.push(PlanProblem::for_move(
                            index,
                            ProblemCode::MalformedMove,
                            message,
                        )),
                    }
                }
            }
            Some(_) => problems.push(PlanProblem::for_plan(
                ProblemCode::MalformedPayload,
                "`moves` must be an array",
            )),
            None => problems.push(PlanProblem::for_plan(
                ProblemCode::MalformedPayload,
                "plan has no `moves` array",
            )),
        }

        if !problems.is_empty() {
            return Err(AppError::ValidationFailed(problems));
        }
        Ok(Self::new(folders, moves))
    }
}

fn parse_move(entry: &Value) -> Result<Move, String> {
    let Some(fields) = entry.as_object() else {
        return Err("move is not an object".to_string());
    };
    let text = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| fields.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let source = text(&["source", "relative_path", "file"])
        .ok_or_else(|| "move has no source path".to_string())?;
    let destination = text(&["destination", "new_path"])
        .ok_or_else(|| "move has no destination path".to_string())?;

    Ok(Move {
        source: normalize_entry(source),
        destination: normalize_entry(destination),
        reason: text(&["reason"]).unwrap_or_default().to_string(),
    })
}

/// Separator and `./` cleanup only. Escapes are left in place for the validator.
fn normalize_entry(path: &str) -> String {
    let normalized = scope_path::normalize(path);
    let mut trimmed = normalized.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.to_string()
}

fn malformed(message: impl Into<String>) -> AppError {
    AppError::ValidationFailed(vec![PlanProblem::for_plan(
        ProblemCode::MalformedPayload,
        message,
    )])
}

pub fn extract_json_payload(text: &str) -> Option<String> {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + "```json".len()..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim().to_string());
        }
    }

    if let Some(start) = trimmed.find("```") {
        let rest = &trimmed[start + 3..];
        if let Some(newline) = rest.find('\n') {
            let body = &rest[newline + 1..];
            if let Some(end) = body.find("```") {
                return Some(body[..end].trim().to_string());
            }
        }
    }

    let first = trimmed.find('{')?;
    let last = trimmed.rfind('}')?;
    if first <= last {
        return Some(trimmed[first..=last].to_string());
    }

    None
}
