use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::types::DifficultyLevel;
use crate::repositories;
use crate::services::errors::DomainError;

/// One task accepted from an import file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImportedTask {
    pub(crate) text: String,
    pub(crate) correct_answer: String,
    pub(crate) difficulty: DifficultyLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct RejectedEntry {
    /// One-based position in the file.
    pub(crate) position: usize,
    pub(crate) reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ParsedImport {
    pub(crate) accepted: Vec<ImportedTask>,
    pub(crate) rejected: Vec<RejectedEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ImportSummary {
    pub(crate) import_id: String,
    pub(crate) imported: usize,
    pub(crate) task_ids: Vec<String>,
    pub(crate) rejected: Vec<RejectedEntry>,
}

/// Parses a JSON array of `{"text", "key", "difficulty"}` objects. Difficulty is `0`, `1`
/// or `2` (or the level name) and defaults to easy. Broken entries are collected instead
/// of failing the whole file; a file that is not an array fails.
pub(crate) fn parse_import(raw: &str) -> Result<ParsedImport, DomainError> {
    if raw.trim().is_empty() {
        return Err(DomainError::Invalid("Import file is empty".to_string()));
    }
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| DomainError::Invalid(format!("Import file is not valid JSON: {err}")))?;
    let Value::Array(entries) = value else {
        return Err(DomainError::Invalid("Import file must contain a JSON array".to_string()));
    };

    let mut parsed = ParsedImport::default();
    for (index, entry) in entries.iter().enumerate() {
        match parse_entry(entry) {
            Ok(task) => parsed.accepted.push(task),
            Err(reason) => parsed.rejected.push(RejectedEntry { position: index + 1, reason }),
        }
    }
    Ok(parsed)
}

fn parse_entry(entry: &Value) -> Result<ImportedTask, String> {
    let Value::Object(fields) = entry else {
        return Err("entry is not an object".to_string());
    };

    let text = fields
        .get("text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| "missing 'text'".to_string())?;
    let key = match fields.get("key") {
        Some(Value::String(key)) => key.trim().to_string(),
        Some(Value::Number(number)) => number.to_string(),
        _ => return Err("missing 'key'".to_string()),
    };
    if key.is_empty() {
        return Err("empty 'key'".to_string());
    }
    let difficulty = match fields.get("difficulty") {
        None | Some(Value::Null) => DifficultyLevel::Easy,
        Some(value) => parse_difficulty(value)
            .ok_or_else(|| format!("unknown difficulty {value}"))?,
    };

    Ok(ImportedTask { text: text.to_string(), correct_answer: key, difficulty })
}

fn parse_difficulty(value: &Value) -> Option<DifficultyLevel> {
    match value {
        Value::Number(number) => match number.as_u64()? {
            0 => Some(DifficultyLevel::Easy),
            1 => Some(DifficultyLevel::Medium),
            2 => Some(DifficultyLevel::Hard),
            _ => None,
        },
        Value::String(name) => match name.trim().to_ascii_lowercase().as_str() {
            "easy" => Some(DifficultyLevel::Easy),
            "medium" => Some(DifficultyLevel::Medium),
            "hard" => Some(DifficultyLevel::Hard),
            _ => None,
        },
        _ => None,
    }
}

/// Inserts every accepted task with the shared type and subtype in one transaction.
pub(crate) async fn import_tasks(
    pool: &sqlx::PgPool,
    parsed: ParsedImport,
    task_type: &str,
    subtype: Option<&str>,
    created_by: &str,
) -> anyhow::Result<ImportSummary> {
    let now = primitive_now_utc();
    let import_id = Uuid::new_v4().to_string();
    let mut tx = pool.begin().await.context("failed to begin task import transaction")?;

    let mut task_ids = Vec::with_capacity(parsed.accepted.len());
    for (index, task) in parsed.accepted.iter().enumerate() {
        let id = Uuid::new_v4().to_string();
        repositories::tasks::create(
            &mut *tx,
            repositories::tasks::CreateTask {
                id: &id,
                text: &task.text,
                task_type,
                subtype,
                difficulty: task.difficulty,
                correct_answer: &task.correct_answer,
                import_id: Some(&import_id),
                created_by,
                now,
            },
        )
        .await
        .with_context(|| format!("failed to insert imported task #{}", index + 1))?;
        task_ids.push(id);
    }

    tx.commit().await.context("failed to commit task import transaction")?;

    metrics::counter!("tasks_imported_total").increment(task_ids.len() as u64);
    tracing::info!(
        %import_id,
        imported = task_ids.len(),
        rejected = parsed.rejected.len(),
        task_type,
        "Tasks imported"
    );

    Ok(ImportSummary {
        import_id,
        imported: task_ids.len(),
        task_ids,
        rejected: parsed.rejected,
    })
}
