//! The `automations.yaml` file
//!
//! Every writer in the process goes through one [`AutomationsFile`], which
//! serializes appends behind an async mutex. Each append is a full
//! read-modify-write through a temporary file followed by a rename.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::document::AutomationDocument;
use crate::format::{format_for_automations_file, parse_automations_file};
use crate::manager::AutomationResult;

/// Comments written around an appended automation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendComments<'a> {
    /// Written at the top when the file is created (or holds no automations)
    pub file_header: &'a str,
    /// Written on the line above the new list item
    pub entry: &'a str,
}

/// Serialized access to `automations.yaml`
#[derive(Debug)]
pub struct AutomationsFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AutomationsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the raw text, treating a missing file as empty
    async fn read_text(&self) -> AutomationResult<String> {
        match fs::read_to_string(&self.path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse every automation currently in the file
    pub async fn read_all(&self) -> AutomationResult<Vec<AutomationDocument>> {
        let _guard = self.lock.lock().await;
        let text = self.read_text().await?;
        Ok(parse_automations_file(&text)?)
    }

    /// Append one automation as a new list item
    ///
    /// A file that is missing, blank, or holds only the empty list `[]` is
    /// started over so the result is still a valid YAML list.
    pub async fn append(
        &self,
        doc: &AutomationDocument,
        comments: Option<AppendComments<'_>>,
    ) -> AutomationResult<()> {
        let item = format_for_automations_file(doc)?;

        let _guard = self.lock.lock().await;
        let existing = self.read_text().await?;

        let started_over = holds_no_automations(&existing);
        let mut content = if started_over {
            comments
                .map(|c| c.file_header.to_string())
                .unwrap_or_default()
        } else {
            let mut content = existing;
            if !content.ends_with('\n') {
                content.push('\n');
            }
            content
        };

        if let Some(comments) = comments {
            // A blank line already at the end belongs to the previous item
            // when it closes a kept block scalar
            if started_over || !content.ends_with("\n\n") {
                content.push('\n');
            }
            content.push_str(comments.entry);
            content.push('\n');
        }
        content.push_str(&item);
        content.push('\n');

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut temp_path = self.path.clone().into_os_string();
        temp_path.push(".tmp");
        let temp_path = PathBuf::from(temp_path);

        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &self.path).await?;

        debug!(
            "Appended automation {} to {}",
            doc.display_name(),
            self.path.display()
        );
        Ok(())
    }
}

/// Whether the text has no list items (only comments, whitespace or `[]`)
fn holds_no_automations(text: &str) -> bool {
    let meaningful: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();
    meaningful.is_empty() || meaningful == ["[]"]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const COMMENTS: AppendComments<'static> = AppendComments {
        file_header: "# Generated automations\n",
        entry: "# Generated",
    };

    fn doc(yaml: &str) -> AutomationDocument {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[tokio::test]
    async fn test_append_creates_file_with_header() {
        let dir = TempDir::new().unwrap();
        let file = AutomationsFile::new(dir.path().join("automations.yaml"));

        file.append(&doc("id: a\nalias: First\n"), Some(COMMENTS))
            .await
            .unwrap();

        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.starts_with("# Generated automations\n\n# Generated\n- "));
        assert_eq!(file.read_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_append_replaces_empty_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("automations.yaml");
        std::fs::write(&path, "[]\n").unwrap();
        let file = AutomationsFile::new(&path);

        file.append(&doc("id: a\n"), None).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("[]"));
        assert_eq!(file.read_all().await.unwrap()[0].id().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_append_keeps_existing_items() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("automations.yaml");
        std::fs::write(&path, "- id: existing\n  alias: Hand written").unwrap();
        let file = AutomationsFile::new(&path);

        file.append(&doc("id: new\n"), Some(COMMENTS)).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("# Generated automations"));
        let ids: Vec<_> = file
            .read_all()
            .await
            .unwrap()
            .iter()
            .filter_map(|d| d.id())
            .collect();
        assert_eq!(ids, vec!["existing", "new"]);
    }

    #[tokio::test]
    async fn test_kept_trailing_lines_survive_next_append() {
        let dir = TempDir::new().unwrap();
        let file = AutomationsFile::new(dir.path().join("automations.yaml"));

        let mut notes = doc("id: notes\n");
        notes.insert("message", "one\ntwo\n\n");
        file.append(&notes, Some(COMMENTS)).await.unwrap();
        file.append(&doc("id: next\n"), Some(COMMENTS)).await.unwrap();

        let read = file.read_all().await.unwrap();
        assert_eq!(read, vec![notes, doc("id: next\n")]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_interleave() {
        let dir = TempDir::new().unwrap();
        let file = std::sync::Arc::new(AutomationsFile::new(dir.path().join("automations.yaml")));

        let mut handles = Vec::new();
        for i in 0..16 {
            let file = file.clone();
            handles.push(tokio::spawn(async move {
                let d = doc(&format!("id: a{i}\nalias: Number {i}\n"));
                file.append(&d, Some(COMMENTS)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(file.read_all().await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_read_all_missing_file() {
        let dir = TempDir::new().unwrap();
        let file = AutomationsFile::new(dir.path().join("missing.yaml"));
        assert!(file.read_all().await.unwrap().is_empty());
    }

    #[test]
    fn test_holds_no_automations() {
        assert!(holds_no_automations(""));
        assert!(holds_no_automations("# header\n\n"));
        assert!(holds_no_automations("[]\n"));
        assert!(!holds_no_automations("- id: a\n"));
    }
}
