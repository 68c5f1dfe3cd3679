use std::path::Path;

use reqforest::{AppContext, EntityKind, ItemId, ItemRecord, Relation, Store};
use serde::Serialize;
use tracing::instrument;

use crate::cli::{
    open_context,
    terminal::{Paint, Role},
};

#[derive(Debug, clap::Parser)]
pub struct Command {
    /// The kind of item
    kind: EntityKind,

    /// The identifier of the item
    id: ItemId,

    /// Print the details as JSON
    #[arg(long)]
    json: bool,
}

/// Everything known about one item.
#[derive(Debug, Serialize)]
struct Details {
    #[serde(flatten)]
    record: ItemRecord,
    children: Vec<ItemId>,
    links: Vec<Links>,
}

#[derive(Debug, Serialize)]
struct Links {
    kind: EntityKind,
    ids: Vec<ItemId>,
}

impl Details {
    fn load(context: &AppContext, kind: EntityKind, id: &ItemId) -> anyhow::Result<Self> {
        let Some(record) = context.store().item(kind, id)? else {
            anyhow::bail!("{kind} {id} not found");
        };

        let children: Vec<ItemId> = context
            .index(kind)
            .find(id)
            .map(|node| node.children().map(|child| child.id().clone()).collect())
            .unwrap_or_default();

        let links: Vec<Links> = Relation::owned_by(kind)
            .map(|relation| -> anyhow::Result<Links> {
                let ids = context.store().associated_ids(relation, id)?;
                Ok(Links {
                    kind: relation.target(),
                    ids: ids.into_iter().collect(),
                })
            })
            .collect::<anyhow::Result<_>>()?;

        Ok(Self {
            record,
            children,
            links,
        })
    }

    fn print(&self) {
        println!(
            "{} {}",
            self.record.kind.paint(Role::Kind),
            self.record.id.paint(Role::Id)
        );
        if !self.record.description.is_empty() {
            println!("  {}", self.record.description);
        }
        if let Some(parent) = &self.record.parent {
            println!("  {} {parent}", "Parent:".paint(Role::Muted));
        }
        if let Some(source) = &self.record.source {
            println!("  {} {source}", "Source:".paint(Role::Muted));
        }
        if let Some(requirement_type) = self.record.requirement_type {
            println!("  {} {requirement_type}", "Type:".paint(Role::Muted));
        }
        if let Some(priority) = self.record.priority {
            println!("  {} {priority}", "Priority:".paint(Role::Muted));
        }
        if let Some(image) = &self.record.image {
            println!("  {} {image}", "Image:".paint(Role::Muted));
        }
        if !self.children.is_empty() {
            println!("  {}", "Children:".paint(Role::Muted));
            for child in &self.children {
                println!("    • {child}");
            }
        }
        for links in &self.links {
            if links.ids.is_empty() {
                let label = format!("No linked {} items", links.kind);
                println!("  {}", label.paint(Role::Muted));
                continue;
            }
            let label = format!("Linked {} items:", links.kind);
            println!("  {}", label.paint(Role::Muted));
            for id in &links.ids {
                println!("    • {id}");
            }
        }
    }
}

impl Command {
    #[instrument]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let context = open_context(root)?;
        let details = Details::load(&context, self.kind, &self.id)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&details)?);
        } else {
            details.print();
        }
        Ok(())
    }
}
