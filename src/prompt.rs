//! Per-view prompt text and output naming.

use crate::input::GenerationTask;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const TOP_INSTRUCTION: &str =
    "Now, show this image from a top-down view. The plate should be centered, not cropped or elongated.";

const FRONT_INSTRUCTION: &str = "Now, show this image from a front view as if seated at a table. Ensure the entire plate is visible and centered.";

/// Camera position an image is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    /// Straight down onto the plate.
    Top,
    /// Eye level of a seated diner.
    Front,
}

impl View {
    /// Both views, in generation order.
    pub const ALL: [View; 2] = [View::Top, View::Front];

    /// Composition instruction appended to the base prompt.
    pub fn instruction(&self) -> &'static str {
        match self {
            Self::Top => TOP_INSTRUCTION,
            Self::Front => FRONT_INSTRUCTION,
        }
    }

    /// File name suffix, without the leading underscore.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Front => "front",
        }
    }

    /// Directory under the output root holding this view's images.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Top => "top_view",
            Self::Front => "front_view",
        }
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Appends the view's composition instruction to a base prompt.
pub fn compose(base_prompt: &str, view: View) -> String {
    format!("{} {}", base_prompt, view.instruction())
}

/// Replaces every whitespace character in a dish name with `_`.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Output path for a dish and view, relative to the output root, without extension.
pub fn path_stem(name: &str, view: View) -> PathBuf {
    Path::new(view.dir_name()).join(format!("{}_{}", normalize_name(name), view.suffix()))
}

/// A prompt ready to send, with the place its image will be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewPrompt<'a> {
    /// Task this prompt was derived from.
    pub task: &'a GenerationTask,
    /// View being generated.
    pub view: View,
    /// Full prompt text.
    pub text: String,
    /// Output path relative to the output root, without extension.
    pub output_path_stem: PathBuf,
}

impl<'a> ViewPrompt<'a> {
    /// Derives the prompt for one view of a task.
    pub fn for_task(task: &'a GenerationTask, view: View) -> Self {
        Self {
            task,
            view,
            text: compose(&task.base_prompt, view),
            output_path_stem: path_stem(&task.name, view),
        }
    }
}
