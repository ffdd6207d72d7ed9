//! Turning operator input into an ordered list of generation tasks.

use crate::error::{DishGenError, Result};
use calamine::Reader;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Header of the column holding dish names.
pub const DISH_COLUMN: &str = "dishes";
/// Header of the column holding base prompts.
pub const PROMPT_COLUMN: &str = "dish prompt";
/// Name given to the single task built from a free-text prompt.
pub const PLACEHOLDER_NAME: &str = "dish";

/// One dish to render: a name and the prompt both views start from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationTask {
    /// Dish name, used to derive output file names.
    pub name: String,
    /// Prompt describing the dish.
    pub base_prompt: String,
}

impl GenerationTask {
    /// Creates a task.
    pub fn new(name: impl Into<String>, base_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_prompt: base_prompt.into(),
        }
    }

    /// Builds the single task for a free-text prompt.
    pub fn from_prompt(prompt: &str) -> Result<Self> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(DishGenError::MalformedInput("prompt is empty".into()));
        }
        Ok(Self::new(PLACEHOLDER_NAME, prompt))
    }
}

/// Converts a header row and data rows into tasks.
///
/// Columns are matched by exact header text. Rows with both cells blank are
/// skipped; a row with only one blank cell is rejected.
pub fn tasks_from_rows<I>(header: &[String], rows: I) -> Result<Vec<GenerationTask>>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let column = |name: &str| {
        header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| DishGenError::MissingColumn {
                column: name.to_string(),
            })
    };
    let dish_idx = column(DISH_COLUMN)?;
    let prompt_idx = column(PROMPT_COLUMN)?;

    let mut tasks = Vec::new();
    for (i, row) in rows.into_iter().enumerate() {
        let cell = |idx: usize| row.get(idx).map(|c| c.trim()).unwrap_or_default();
        let (name, prompt) = (cell(dish_idx), cell(prompt_idx));

        match (name.is_empty(), prompt.is_empty()) {
            (true, true) => continue,
            (false, false) => tasks.push(GenerationTask::new(name, prompt)),
            (true, false) => {
                return Err(DishGenError::MalformedInput(format!(
                    "row {}: {DISH_COLUMN:?} is empty",
                    i + 1
                )))
            }
            (false, true) => {
                return Err(DishGenError::MalformedInput(format!(
                    "row {}: {PROMPT_COLUMN:?} is empty",
                    i + 1
                )))
            }
        }
    }

    tracing::debug!(count = tasks.len(), "parsed tasks from table");
    Ok(tasks)
}

/// Reads tasks from CSV data with a header row.
pub fn tasks_from_csv<R: std::io::Read>(reader: R) -> Result<Vec<GenerationTask>> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let header: Vec<String> = csv
        .headers()
        .map_err(|e| DishGenError::MalformedInput(format!("CSV header: {e}")))?
        .iter()
        .map(String::from)
        .collect();

    let rows = csv
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(String::from).collect::<Vec<_>>())
                .map_err(|e| DishGenError::MalformedInput(format!("CSV row: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    tasks_from_rows(&header, rows)
}

/// Reads tasks from the first worksheet of an Excel or OpenDocument workbook.
pub fn tasks_from_workbook(path: &Path) -> Result<Vec<GenerationTask>> {
    let mut workbook = calamine::open_workbook_auto(path)
        .map_err(|e| DishGenError::MalformedInput(format!("{}: {e}", path.display())))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| {
            DishGenError::MalformedInput(format!("{}: workbook has no sheets", path.display()))
        })?
        .map_err(|e| DishGenError::MalformedInput(format!("{}: {e}", path.display())))?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<_>>());
    let header = rows.next().ok_or_else(|| {
        DishGenError::MalformedInput(format!("{}: first sheet is empty", path.display()))
    })?;

    tasks_from_rows(&header, rows)
}

/// Loads tasks from a spreadsheet file, choosing the parser by extension.
pub fn load_tasks(path: &Path) -> Result<Vec<GenerationTask>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "csv" => tasks_from_csv(std::fs::File::open(path)?),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => tasks_from_workbook(path),
        _ => Err(DishGenError::MalformedInput(format!(
            "{}: unsupported file type (expected .csv, .xlsx, .xls or .ods)",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_from_prompt_uses_placeholder_name() {
        let task = GenerationTask::from_prompt("  A bowl of ramen ").unwrap();
        assert_eq!(task.name, "dish");
        assert_eq!(task.base_prompt, "A bowl of ramen");
    }

    #[test]
    fn test_from_prompt_rejects_blank() {
        assert!(matches!(
            GenerationTask::from_prompt("   "),
            Err(DishGenError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_rows_preserve_order() {
        let tasks = tasks_from_rows(
            &header(&["dishes", "dish prompt"]),
            vec![
                row(&["Pasta", "A bowl of pasta"]),
                row(&["Salad", "A green salad"]),
                row(&["Soup", "Tomato soup"]),
            ],
        )
        .unwrap();

        let names: Vec<_> = tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["Pasta", "Salad", "Soup"]);
        assert_eq!(tasks[1].base_prompt, "A green salad");
    }

    #[test]
    fn test_rows_columns_in_any_position() {
        let tasks = tasks_from_rows(
            &header(&["id", "dish prompt", "notes", "dishes"]),
            vec![row(&["1", "Crispy tacos", "", "Tacos"])],
        )
        .unwrap();
        assert_eq!(tasks, vec![GenerationTask::new("Tacos", "Crispy tacos")]);
    }

    #[test]
    fn test_missing_columns() {
        let err = tasks_from_rows(&header(&["dish", "dish prompt"]), Vec::new()).unwrap_err();
        assert!(matches!(err, DishGenError::MissingColumn { ref column } if column == "dishes"));

        let err = tasks_from_rows(&header(&["dishes", "Dish Prompt"]), Vec::new()).unwrap_err();
        assert!(
            matches!(err, DishGenError::MissingColumn { ref column } if column == "dish prompt")
        );
    }

    #[test]
    fn test_blank_rows_skipped_half_blank_rejected() {
        let tasks = tasks_from_rows(
            &header(&["dishes", "dish prompt"]),
            vec![row(&["Pasta", "A bowl of pasta"]), row(&["", " "]), row(&[])],
        )
        .unwrap();
        assert_eq!(tasks.len(), 1);

        let err = tasks_from_rows(
            &header(&["dishes", "dish prompt"]),
            vec![row(&["Pasta", "A bowl of pasta"]), row(&["Soup", ""])],
        )
        .unwrap_err();
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn test_csv() {
        let data = "dishes,dish prompt\nPasta,A bowl of pasta\n\"Fish and chips\",\"Battered cod, chips\"\n";
        let tasks = tasks_from_csv(data.as_bytes()).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].name, "Fish and chips");
        assert_eq!(tasks[1].base_prompt, "Battered cod, chips");
    }

    #[test]
    fn test_csv_missing_column() {
        let data = "dishes,prompt\nPasta,A bowl of pasta\n";
        assert!(matches!(
            tasks_from_csv(data.as_bytes()),
            Err(DishGenError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_load_tasks_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dishes.txt");
        std::fs::write(&path, "dishes,dish prompt\n").unwrap();
        assert!(matches!(
            load_tasks(&path),
            Err(DishGenError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_load_tasks_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dishes.CSV");
        std::fs::write(&path, "dishes,dish prompt\nPasta,A bowl of pasta\n").unwrap();
        let tasks = load_tasks(&path).unwrap();
        assert_eq!(tasks, vec![GenerationTask::new("Pasta", "A bowl of pasta")]);
    }

    #[test]
    fn test_corrupt_workbook_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dishes.xlsx");
        std::fs::write(&path, b"not a zip archive").unwrap();
        assert!(matches!(
            load_tasks(&path),
            Err(DishGenError::MalformedInput(_))
        ));
    }
}
