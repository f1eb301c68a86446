use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::document::Document;
use crate::history::History;
use crate::io::{self, SkinError};
use crate::topology::ModelVariant;

/// Single open document plus its undo history and file bookkeeping.
pub struct Project {
    pub id: Uuid,
    pub document: Document,
    pub history: History,
    /// `None` for unsaved/untitled projects.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,
    /// Display name (derived from path or "Untitled-X").
    pub name: String,
}

impl Project {
    pub fn new_untitled(untitled_counter: usize, variant: ModelVariant) -> Self {
        Self {
            id: Uuid::new_v4(),
            document: Document::new(variant),
            history: History::default(),
            path: None,
            is_dirty: false,
            name: format!("Untitled-{}", untitled_counter),
        }
    }

    /// Open a `.skp` project file. The current state is not touched on
    /// failure; the caller only swaps projects on `Ok`.
    pub fn from_file(path: PathBuf) -> Result<Self, SkinError> {
        let document = io::load_project(&path)?;
        let name = file_display_name(&path);
        Ok(Self {
            id: Uuid::new_v4(),
            document,
            history: History::default(),
            path: Some(path),
            is_dirty: false,
            name,
        })
    }

    /// Save to the project's current path, or to `path` when given (also
    /// adopting it as the new current path).
    pub fn save(&mut self, path: Option<PathBuf>) -> Result<(), SkinError> {
        let target = match path.or_else(|| self.path.clone()) {
            Some(p) => p,
            None => {
                return Err(SkinError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "No file path set for save",
                )));
            }
        };
        io::save_project(&self.document, &target)?;
        self.path = Some(target);
        self.update_name_from_path();
        self.mark_clean();
        Ok(())
    }

    /// Apply the document's pending diff to the history and mark the
    /// project dirty when something actually changed.
    pub fn commit_history(&mut self) -> bool {
        let changed = self.history.commit(&mut self.document);
        if changed {
            self.mark_dirty();
        }
        changed
    }

    pub fn undo(&mut self) -> bool {
        let changed = self.history.undo(&mut self.document);
        if changed {
            self.mark_dirty();
        }
        changed
    }

    pub fn redo(&mut self) -> bool {
        let changed = self.history.redo(&mut self.document);
        if changed {
            self.mark_dirty();
        }
        changed
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    pub fn update_name_from_path(&mut self) {
        if let Some(ref path) = self.path {
            self.name = file_display_name(path);
        }
    }

    /// Display title: name with a dirty indicator.
    pub fn display_title(&self) -> String {
        if self.is_dirty { format!("{}*", self.name) } else { self.name.clone() }
    }
}

fn file_display_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}
