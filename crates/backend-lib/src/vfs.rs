// ============================
// crates/backend-lib/src/vfs.rs
// ============================

//! In-memory project tree shared by everyone in a room.
//!
//! Paths are plain strings (`"src/App.js"`); there is no directory
//! hierarchy beyond what the path names imply. All mutation goes through
//! methods that enforce the create/rename conflict rules, so callers can
//! treat a failed operation as "leave everything untouched".

use std::collections::HashMap;

use codesync_common::FileRecord;

use crate::error::VfsError;

/// Editor language tag for a file extension. Unknown extensions fall
/// back to `"plaintext"`.
pub fn language_for_extension(extension: &str) -> &'static str {
    match extension {
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "py" => "python",
        "java" => "java",
        "cpp" => "cpp",
        "c" => "c",
        "html" => "html",
        "css" => "css",
        "md" => "markdown",
        "json" => "json",
        _ => "plaintext",
    }
}

// Everything after the last dot. A path without a dot is its own
// extension, which matches how clients display such files.
fn extension_of(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or_default()
}

/// The shared file tree of one room.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualFs {
    files: HashMap<String, FileRecord>,
}

impl VirtualFs {
    /// A tree pre-populated with the starter project every new room gets.
    pub fn seeded() -> Self {
        let mut files = HashMap::new();
        files.insert(
            "src/App.js".to_string(),
            FileRecord::new(
                "// Welcome to your collaborative project!\nconsole.log(\"Hello, world!\");",
                "javascript",
            ),
        );
        files.insert(
            "src/utils.js".to_string(),
            FileRecord::new(
                "// Utility functions\nexport const helper = () => {\n  return \"Helper function\";\n};",
                "javascript",
            ),
        );
        files.insert(
            "README.md".to_string(),
            FileRecord::new(
                "# My Collaborative Project\n\nThis is a collaborative coding project.\n\n## Getting Started\n\n1. Start coding!\n2. Collaborate with your team\n3. Build something amazing",
                "markdown",
            ),
        );
        Self { files }
    }

    /// Adds a file with explicit content and language.
    pub fn create(&mut self, path: &str, content: String, language: String) -> Result<(), VfsError> {
        if self.files.contains_key(path) {
            return Err(VfsError::AlreadyExists(path.to_string()));
        }
        self.files
            .insert(path.to_string(), FileRecord::new(content, language));
        Ok(())
    }

    /// Adds a file whose content and language are derived from the path's
    /// extension, the way the structural `create` action does it.
    pub fn create_inferred(&mut self, path: &str) -> Result<(), VfsError> {
        let extension = extension_of(path);
        let content = format!("// New {extension} file\n");
        self.create(path, content, language_for_extension(extension).to_string())
    }

    /// Removes a file, returning its record.
    pub fn remove(&mut self, path: &str) -> Result<FileRecord, VfsError> {
        self.files
            .remove(path)
            .ok_or_else(|| VfsError::NotFound(path.to_string()))
    }

    /// Moves a file to a new path, keeping content and language.
    ///
    /// Fails without touching the tree when the source is missing or the
    /// destination is taken, so a conflicting rename leaves both files
    /// exactly as they were.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), VfsError> {
        if !self.files.contains_key(from) {
            return Err(VfsError::NotFound(from.to_string()));
        }
        if self.files.contains_key(to) {
            return Err(VfsError::AlreadyExists(to.to_string()));
        }
        if let Some(record) = self.files.remove(from) {
            self.files.insert(to.to_string(), record);
        }
        Ok(())
    }

    /// Replaces a file's content. Returns false when the path is unknown.
    pub fn set_content(&mut self, path: &str, content: String) -> bool {
        match self.files.get_mut(path) {
            Some(record) => {
                record.content = content;
                true
            }
            None => false,
        }
    }

    /// Replaces a file's language tag. Returns false when the path is
    /// unknown.
    pub fn set_language(&mut self, path: &str, language: String) -> bool {
        match self.files.get_mut(path) {
            Some(record) => {
                record.language = language;
                true
            }
            None => false,
        }
    }

    /// Overlays a batch of entries onto the tree: existing paths are
    /// replaced, new paths added, everything else kept.
    pub fn bulk_merge(&mut self, entries: HashMap<String, FileRecord>) {
        self.files.extend(entries);
    }

    /// Full copy of the tree in wire form.
    pub fn snapshot(&self) -> HashMap<String, FileRecord> {
        self.files.clone()
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
