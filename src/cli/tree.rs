use std::{collections::BTreeMap, path::Path};

use reqforest::{EntityKind, ItemId, ItemIndex, Store};
use tracing::instrument;

use crate::cli::{
    open_context,
    terminal::{Paint, Role},
};

#[derive(Debug, clap::Parser)]
pub struct Command {
    /// The kind of item to print (requirement, use-case, test or source)
    kind: EntityKind,

    /// Print the outline as JSON
    #[arg(long)]
    json: bool,
}

impl Command {
    #[instrument]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let context = open_context(root)?;
        let index = context.index(self.kind);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&index.outline())?);
            return Ok(());
        }

        if index.is_empty() {
            println!("{}", format!("No {} items", self.kind).paint(Role::Muted));
            return Ok(());
        }

        let descriptions: BTreeMap<ItemId, String> = context
            .store()
            .candidate_list(self.kind)?
            .into_iter()
            .map(|candidate| (candidate.id, candidate.description))
            .collect();

        for line in render(index, &descriptions) {
            println!("{line}");
        }
        Ok(())
    }
}

/// One line per item in pre-order, indented by depth.
fn render(index: &ItemIndex, descriptions: &BTreeMap<ItemId, String>) -> Vec<String> {
    index
        .iter()
        .map(|node| {
            let indent = "  ".repeat(node.depth());
            let id = node.id().paint(Role::Id);
            match descriptions.get(node.id()).filter(|d| !d.is_empty()) {
                Some(description) => format!("{indent}{id} {}", description.paint(Role::Muted)),
                None => format!("{indent}{id}"),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use reqforest::{NewItem, SqliteStore};

    use super::*;

    fn id(s: &str) -> ItemId {
        s.parse().unwrap()
    }

    #[test]
    fn render_indents_children() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .create(
                EntityKind::Requirement,
                &NewItem::new(id("R1")).with_description("top"),
            )
            .unwrap();
        store
            .create(
                EntityKind::Requirement,
                &NewItem::new(id("R1.1")).with_parent(id("R1")),
            )
            .unwrap();
        let index = ItemIndex::load(EntityKind::Requirement, &store).unwrap();
        let descriptions = [(id("R1"), "top".to_string())].into_iter().collect();

        let lines = render(&index, &descriptions);

        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("R1") && lines[0].contains("top"));
        assert!(lines[1].starts_with("  "));
        assert!(lines[1].contains("R1.1"));
    }

    #[test]
    fn outline_serializes_as_nested_json() {
        let mut index = ItemIndex::new(EntityKind::UseCase);
        index.append_child_to_parent(id("UC1"), None).unwrap();
        index
            .append_child_to_parent(id("UC1.1"), Some(&id("UC1")))
            .unwrap();

        let json = serde_json::to_value(index.outline()).unwrap();

        assert_eq!(
            json,
            serde_json::json!([{ "id": "UC1", "children": [{ "id": "UC1.1" }] }])
        );
    }
}
