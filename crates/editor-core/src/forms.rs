//! Edit forms of elements that are created empty (code blocks, footnotes,
//! related content). Submitting stores the form data; cancelling the first
//! edit removes the element again.

use thiserror::Error;

use crate::core::{ApplyError, AttrPatch, Data, Editor};
use crate::ops::{Op, Path, Transaction};

#[derive(Debug, Error)]
pub enum FormError {
    #[error("no element at {0:?}")]
    NoElement(Path),
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

impl Editor {
    /// Merges `data` into the element at `path` and leaves first-edit state.
    pub fn submit_element_form(&mut self, path: &[usize], data: Data) -> Result<(), FormError> {
        if self.doc().element(path).is_none() {
            return Err(FormError::NoElement(path.to_vec()));
        }
        let patch = AttrPatch {
            set: data,
            ..AttrPatch::default()
        }
        .first_edit(false);
        self.apply(
            Transaction::new(vec![Op::SetNodeAttrs {
                path: path.to_vec(),
                patch,
            }])
            .source("form.submit"),
        )?;
        Ok(())
    }

    /// Cancels the form of the element at `path`. An element still in its
    /// first edit is removed; when its insertion is the latest undo entry
    /// that entry is undone and forgotten, restoring the previous tree
    /// exactly. Returns whether the element was removed.
    pub fn cancel_element_form(&mut self, path: &[usize]) -> Result<bool, FormError> {
        let Some(el) = self.doc().element(path) else {
            return Err(FormError::NoElement(path.to_vec()));
        };
        if !el.is_first_edit {
            return Ok(false);
        }

        if self.last_undo_first_edit() == Some(path) && self.undo() {
            self.clear_redo();
            tracing::debug!(target: "ndla_editor::forms", ?path, "first edit cancelled by undo");
            return Ok(true);
        }

        self.apply(
            Transaction::new(vec![Op::RemoveNode {
                path: path.to_vec(),
            }])
            .source("form.cancel"),
        )?;
        tracing::debug!(target: "ndla_editor::forms", ?path, "first edit cancelled by removal");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginRegistry;
    use serde_json::json;

    fn editor() -> Editor {
        let mut editor =
            Editor::from_html("<section><p>a</p></section>", PluginRegistry::learning_resource())
                .unwrap();
        editor.focus();
        editor
    }

    #[test]
    fn submit_stores_data_and_ends_first_edit() {
        let mut editor = editor();
        editor.run_command("code_block.insert", None).unwrap();
        let path = vec![0, 1];
        assert!(editor.doc().node(&path).unwrap().is_first_edit());

        let data = Data::from([
            ("code-content".to_string(), "print(1)".into()),
            ("code-format".to_string(), "python".into()),
        ]);
        editor.submit_element_form(&path, data).unwrap();
        let block = editor.doc().element(&path).unwrap();
        assert!(!block.is_first_edit);
        assert_eq!(block.data_str("code-format"), Some("python"));
        assert!(!editor.cancel_element_form(&path).unwrap());
    }

    #[test]
    fn cancel_after_other_edits_removes_the_node() {
        let mut editor = editor();
        editor
            .run_command("footnote.insert", Some(json!({ "data": { "title": "T" } })))
            .unwrap();
        editor.run_command("divider.insert", None).unwrap();
        let footnote = editor.doc().element(&[0, 0]).unwrap().children[1].clone();
        assert!(footnote.is_first_edit());

        assert!(editor.cancel_element_form(&[0, 0, 1]).unwrap());
        assert!(
            !editor
                .doc()
                .element(&[0, 0])
                .unwrap()
                .children
                .iter()
                .any(|n| n.is_kind("footnote"))
        );
    }

    #[test]
    fn missing_element_is_an_error() {
        let mut editor = editor();
        assert!(matches!(
            editor.cancel_element_form(&[0, 9]),
            Err(FormError::NoElement(_))
        ));
    }
}
