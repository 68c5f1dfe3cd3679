use std::path::Path;

use reqforest::{AssociationSet, EntityKind, ItemId, Relation};
use tracing::instrument;

use crate::cli::{
    open_context,
    terminal::{checkbox, Paint, Role},
};

#[derive(Debug, clap::Parser)]
pub struct Command {
    /// The kind of the item whose links are edited
    kind: EntityKind,

    /// The identifier of the item whose links are edited
    id: ItemId,

    /// The kind of the linked items
    target_kind: EntityKind,

    /// Items to link (comma separated)
    #[arg(long, value_delimiter = ',')]
    add: Vec<ItemId>,

    /// Items to unlink (comma separated)
    #[arg(long, value_delimiter = ',')]
    remove: Vec<ItemId>,
}

impl Command {
    #[instrument]
    pub fn run(self, root: &Path) -> anyhow::Result<()> {
        let relation = Relation::new(self.kind, self.target_kind)?;
        let mut context = open_context(root)?;
        let mut set = context.association_set(relation, &self.id)?;

        if !self.add.is_empty() || !self.remove.is_empty() {
            self.stage(&mut set)?;
            let diff = context.save_associations(&set)?;

            if diff.is_empty() {
                println!("{}", "No changes".paint(Role::Muted));
            }
            for id in &diff.added {
                println!("  + {}", id.paint(Role::Success));
            }
            for id in &diff.removed {
                println!("  - {}", id.paint(Role::Warning));
            }
        }

        print_candidates(&set);
        Ok(())
    }

    fn stage(&self, set: &mut AssociationSet) -> anyhow::Result<()> {
        for id in &self.add {
            set.toggle(id, true)?;
        }
        for id in &self.remove {
            set.toggle(id, false)?;
        }
        Ok(())
    }
}

fn print_candidates(set: &AssociationSet) {
    if set.candidates().is_empty() {
        let target = set.relation().target();
        println!("{}", format!("No {target} items to link").paint(Role::Muted));
        return;
    }
    for candidate in set.candidates() {
        println!(
            "{} {} {}",
            checkbox(set.is_associated(&candidate.id)),
            candidate.id.paint(Role::Id),
            candidate.description.paint(Role::Muted)
        );
    }
}

#[cfg(test)]
mod tests {
    use reqforest::{AppContext, Config, NewItem, Store};
    use tempfile::tempdir;

    use super::*;

    fn id(s: &str) -> ItemId {
        s.parse().unwrap()
    }

    fn project() -> tempfile::TempDir {
        let tmp = tempdir().unwrap();
        let mut context = AppContext::open(tmp.path(), &Config::default()).unwrap();
        context
            .create(EntityKind::Requirement, NewItem::new(id("R1")))
            .unwrap();
        for test in ["T1", "T2"] {
            context
                .create(EntityKind::Test, NewItem::new(id(test)))
                .unwrap();
        }
        tmp
    }

    fn linked(root: &Path, relation: Relation, owner: &str) -> Vec<ItemId> {
        let context = open_context(root).unwrap();
        context
            .store()
            .associated_ids(relation, &id(owner))
            .unwrap()
            .into_iter()
            .collect()
    }

    #[test]
    fn link_adds_and_removes() {
        let tmp = project();

        Command {
            kind: EntityKind::Requirement,
            id: id("R1"),
            target_kind: EntityKind::Test,
            add: vec![id("T1"), id("T2")],
            remove: vec![],
        }
        .run(tmp.path())
        .unwrap();
        assert_eq!(
            linked(tmp.path(), Relation::REQUIREMENT_TESTS, "R1"),
            [id("T1"), id("T2")]
        );

        Command {
            kind: EntityKind::Test,
            id: id("T2"),
            target_kind: EntityKind::Requirement,
            add: vec![],
            remove: vec![id("R1")],
        }
        .run(tmp.path())
        .unwrap();
        assert_eq!(
            linked(tmp.path(), Relation::REQUIREMENT_TESTS, "R1"),
            [id("T1")]
        );
    }

    #[test]
    fn link_rejects_unknown_target() {
        let tmp = project();

        let err = Command {
            kind: EntityKind::Requirement,
            id: id("R1"),
            target_kind: EntityKind::Test,
            add: vec![id("T9")],
            remove: vec![],
        }
        .run(tmp.path())
        .unwrap_err();

        assert!(err.to_string().contains("T9"));
        assert!(linked(tmp.path(), Relation::REQUIREMENT_TESTS, "R1").is_empty());
    }

    #[test]
    fn link_rejects_unsupported_relation() {
        let tmp = project();

        let err = Command {
            kind: EntityKind::Test,
            id: id("T1"),
            target_kind: EntityKind::Source,
            add: vec![],
            remove: vec![],
        }
        .run(tmp.path())
        .unwrap_err();

        assert!(err.to_string().contains("cannot be associated"));
    }
}
