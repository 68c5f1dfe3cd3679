//! SQLite backed store
//!
//! Each entity kind has its own table keyed by its identifier. Parent links
//! and association rows are foreign keys with cascading updates, so renaming
//! an item carries its children and links along, and deleting an item clears
//! its children's parent reference.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use rusqlite::{params, Connection, OptionalExtension, Params};
use serde::Serialize;
use tracing::instrument;

use super::{Store, StoreError};
use crate::domain::{Candidate, EntityKind, ItemId, Priority, Relation, RequirementType};

/// Current schema version, recorded in `PRAGMA user_version`.
const SCHEMA_VERSION: i32 = 1;

struct Table {
    name: &'static str,
    key: &'static str,
    description: Option<&'static str>,
    parent: Option<&'static str>,
}

const fn table(kind: EntityKind) -> Table {
    match kind {
        EntityKind::Requirement => Table {
            name: "Requirements",
            key: "req_id",
            description: Some("description"),
            parent: Some("parent_id"),
        },
        EntityKind::UseCase => Table {
            name: "UseCases",
            key: "uc_id",
            description: Some("description"),
            parent: Some("parent_id"),
        },
        EntityKind::Test => Table {
            name: "SystemTests",
            key: "test_id",
            description: Some("description"),
            parent: None,
        },
        EntityKind::Source => Table {
            name: "Sources",
            key: "name",
            description: None,
            parent: None,
        },
    }
}

struct LinkTable {
    name: &'static str,
    owner: &'static str,
    target: &'static str,
}

fn link_table(relation: Relation) -> LinkTable {
    use EntityKind::{Requirement, Test, UseCase};

    let (name, owner, target) = match (relation.owner(), relation.target()) {
        (Requirement, UseCase) => ("UseCasesRequirements", "req_id", "uc_id"),
        (UseCase, Requirement) => ("UseCasesRequirements", "uc_id", "req_id"),
        (Requirement, Test) => ("RequirementsTests", "req_id", "test_id"),
        (Test, Requirement) => ("RequirementsTests", "test_id", "req_id"),
        (owner, target) => unreachable!("no association table for {owner} → {target}"),
    };
    LinkTable {
        name,
        owner,
        target,
    }
}

/// The fields needed to create an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    /// The new item's identifier.
    pub id: ItemId,
    /// Free-text description. Ignored for sources.
    pub description: String,
    /// The parent, for hierarchical kinds.
    pub parent: Option<ItemId>,
    /// The requirement type. Requirements only.
    pub requirement_type: Option<RequirementType>,
    /// The requirement priority. Requirements only.
    pub priority: Option<Priority>,
    /// Path or name of a diagram. Use cases only.
    pub image: Option<String>,
}

impl NewItem {
    /// A top-level item with an empty description.
    #[must_use]
    pub const fn new(id: ItemId) -> Self {
        Self {
            id,
            description: String::new(),
            parent: None,
            requirement_type: None,
            priority: None,
            image: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the parent.
    #[must_use]
    pub fn with_parent(mut self, parent: ItemId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets the requirement type.
    #[must_use]
    pub const fn with_type(mut self, requirement_type: RequirementType) -> Self {
        self.requirement_type = Some(requirement_type);
        self
    }

    /// Sets the requirement priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the use case image.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    fn check_attributes(&self, kind: EntityKind) -> Result<(), StoreError> {
        let misplaced = if kind != EntityKind::Requirement && self.requirement_type.is_some() {
            Some("type")
        } else if kind != EntityKind::Requirement && self.priority.is_some() {
            Some("priority")
        } else if kind != EntityKind::UseCase && self.image.is_some() {
            Some("image")
        } else {
            None
        };
        misplaced.map_or(Ok(()), |attribute| {
            Err(StoreError::NoAttribute { kind, attribute })
        })
    }
}

/// A stored item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemRecord {
    /// The item's kind.
    pub kind: EntityKind,
    /// The item's identifier.
    pub id: ItemId,
    /// The item's description; empty for sources.
    pub description: String,
    /// The item's parent, if any.
    pub parent: Option<ItemId>,
    /// The source a requirement came from, if any.
    pub source: Option<ItemId>,
    /// The requirement type, if set.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub requirement_type: Option<RequirementType>,
    /// The requirement priority, if set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// The use case image, if set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// The rows written by [`SqliteStore::save_associations`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationDiff {
    /// Targets newly linked to the owner.
    pub added: BTreeSet<ItemId>,
    /// Targets no longer linked to the owner.
    pub removed: BTreeSet<ItemId>,
}

impl AssociationDiff {
    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// A store backed by a SQLite database.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, or if it was written by
    /// a newer schema version.
    #[instrument]
    pub fn open(path: &Path, wal_mode: bool) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        if wal_mode {
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        }
        Self::with_connection(conn, Some(path.to_path_buf()))
    }

    /// Opens a private, empty in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, None)
    }

    fn with_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        match version {
            0 => {
                conn.execute_batch(include_str!("schema.sql"))?;
                tracing::debug!("created schema version {SCHEMA_VERSION}");
            }
            SCHEMA_VERSION => {}
            found => {
                return Err(StoreError::UnsupportedSchema {
                    found,
                    supported: SCHEMA_VERSION,
                });
            }
        }

        Ok(Self { conn, path })
    }

    /// The database file, or `None` for an in-memory database.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns `true` if an item of `kind` has the identifier `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn exists(&self, kind: EntityKind, id: &ItemId) -> Result<bool, StoreError> {
        let Table { name, key, .. } = table(kind);
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {name} WHERE {key} = ?1)");
        Ok(self.conn.query_row(&sql, [id.as_str()], |row| row.get(0))?)
    }

    /// Creates an item.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotHierarchical`] if a parent is given for a flat kind
    /// - [`StoreError::DuplicateId`] if the identifier is taken
    /// - [`StoreError::NotFound`] if the parent does not exist
    /// - [`StoreError::NoAttribute`] if a type, priority or image is given for
    ///   a kind that does not carry it
    #[instrument(skip(self, item), fields(id = %item.id))]
    pub fn create(&mut self, kind: EntityKind, item: &NewItem) -> Result<(), StoreError> {
        let Table {
            name,
            key,
            description,
            parent,
        } = table(kind);

        if item.parent.is_some() && parent.is_none() {
            return Err(StoreError::NotHierarchical { kind });
        }
        item.check_attributes(kind)?;
        if self.exists(kind, &item.id)? {
            return Err(StoreError::DuplicateId {
                kind,
                id: item.id.clone(),
            });
        }
        if let Some(parent_id) = &item.parent {
            self.require(kind, parent_id)?;
        }

        let tx = self.conn.transaction()?;
        match (description, parent) {
            (Some(description), Some(parent)) => tx.execute(
                &format!(
                    "INSERT INTO {name} ({key}, {description}, {parent}) VALUES (?1, ?2, ?3)"
                ),
                params![item.id.as_str(), item.description, item.parent.as_deref()],
            )?,
            (Some(description), None) => tx.execute(
                &format!("INSERT INTO {name} ({key}, {description}) VALUES (?1, ?2)"),
                params![item.id.as_str(), item.description],
            )?,
            (None, _) => tx.execute(
                &format!("INSERT INTO {name} ({key}) VALUES (?1)"),
                [item.id.as_str()],
            )?,
        };
        let attributes = [
            ("req_type", item.requirement_type.map(RequirementType::code)),
            ("priority", item.priority.map(Priority::code)),
            ("image", item.image.as_deref()),
        ];
        for (column, value) in attributes {
            if let Some(value) = value {
                tx.execute(
                    &format!("UPDATE {name} SET {column} = ?1 WHERE {key} = ?2"),
                    [value, item.id.as_str()],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Reads one item.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn item(&self, kind: EntityKind, id: &ItemId) -> Result<Option<ItemRecord>, StoreError> {
        let Table {
            name,
            key,
            description,
            parent,
        } = table(kind);
        let description = description_column(description);
        let parent = parent.unwrap_or("NULL");
        let (source, req_type, priority, image) = match kind {
            EntityKind::Requirement => (
                "(SELECT s.name FROM Sources s WHERE s.source_id = t.source_id)",
                "t.req_type",
                "t.priority",
                "NULL",
            ),
            EntityKind::UseCase => ("NULL", "NULL", "NULL", "t.image"),
            EntityKind::Test | EntityKind::Source => ("NULL", "NULL", "NULL", "NULL"),
        };
        let sql = format!(
            "SELECT {description}, {parent}, {source}, {req_type}, {priority}, {image}
            FROM {name} t WHERE {key} = ?1"
        );

        let row = self
            .conn
            .query_row(&sql, [id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })
            .optional()?;

        let Some((description, parent, source, req_type, priority, image)) = row else {
            return Ok(None);
        };
        Ok(Some(ItemRecord {
            kind,
            id: id.clone(),
            description,
            parent: parent.map(ItemId::new).transpose()?,
            source: source.map(ItemId::new).transpose()?,
            requirement_type: decode(req_type, "requirement type", RequirementType::from_code)?,
            priority: decode(priority, "priority", Priority::from_code)?,
            image,
        }))
    }

    /// Replaces an item's description.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the item does not exist
    /// - [`StoreError::NoDescription`] for sources
    #[instrument(skip(self, description))]
    pub fn update_description(
        &mut self,
        kind: EntityKind,
        id: &ItemId,
        description: &str,
    ) -> Result<(), StoreError> {
        let Table {
            name,
            key,
            description: column,
            ..
        } = table(kind);
        let Some(column) = column else {
            return Err(StoreError::NoDescription { kind });
        };
        let updated = self.conn.execute(
            &format!("UPDATE {name} SET {column} = ?1 WHERE {key} = ?2"),
            params![description, id.as_str()],
        )?;
        if updated == 0 {
            return Err(not_found(kind, id));
        }
        Ok(())
    }

    /// Changes an item's identifier.
    ///
    /// Children's parent references and association rows follow the rename.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if `old_id` does not exist
    /// - [`StoreError::DuplicateId`] if `new_id` is taken
    #[instrument(skip(self))]
    pub fn rename(
        &mut self,
        kind: EntityKind,
        old_id: &ItemId,
        new_id: &ItemId,
    ) -> Result<(), StoreError> {
        self.require(kind, old_id)?;
        if new_id != old_id && self.exists(kind, new_id)? {
            return Err(StoreError::DuplicateId {
                kind,
                id: new_id.clone(),
            });
        }

        let Table { name, key, .. } = table(kind);
        self.conn.execute(
            &format!("UPDATE {name} SET {key} = ?1 WHERE {key} = ?2"),
            [new_id.as_str(), old_id.as_str()],
        )?;
        Ok(())
    }

    /// Moves an item under a new parent, or to the top level.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotHierarchical`] for flat kinds
    /// - [`StoreError::NotFound`] if either item does not exist
    /// - [`StoreError::Cycle`] if `parent` is the item or a descendant of it
    #[instrument(skip(self))]
    pub fn set_parent(
        &mut self,
        kind: EntityKind,
        id: &ItemId,
        parent: Option<&ItemId>,
    ) -> Result<(), StoreError> {
        let Table {
            name,
            key,
            parent: parent_column,
            ..
        } = table(kind);
        let Some(parent_column) = parent_column else {
            return Err(StoreError::NotHierarchical { kind });
        };

        self.require(kind, id)?;
        if let Some(parent) = parent {
            self.require(kind, parent)?;
            if self.is_ancestor_or_self(kind, id, parent)? {
                return Err(StoreError::Cycle {
                    kind,
                    id: id.clone(),
                    parent: parent.clone(),
                });
            }
        }

        self.conn.execute(
            &format!("UPDATE {name} SET {parent_column} = ?1 WHERE {key} = ?2"),
            params![parent.map(ItemId::as_str), id.as_str()],
        )?;
        Ok(())
    }

    /// Returns `true` if `ancestor` is `node` or one of its ancestors.
    fn is_ancestor_or_self(
        &self,
        kind: EntityKind,
        ancestor: &ItemId,
        node: &ItemId,
    ) -> Result<bool, StoreError> {
        let Table {
            name, key, parent, ..
        } = table(kind);
        let Some(parent) = parent else {
            return Ok(ancestor == node);
        };
        // UNION (not UNION ALL) stops the walk if the stored data already loops.
        let sql = format!(
            "WITH RECURSIVE chain(id) AS (
                SELECT ?1
                UNION
                SELECT t.{parent} FROM {name} t JOIN chain c ON t.{key} = c.id
                WHERE t.{parent} IS NOT NULL
            )
            SELECT EXISTS(SELECT 1 FROM chain WHERE id = ?2)"
        );
        Ok(self
            .conn
            .query_row(&sql, [node.as_str(), ancestor.as_str()], |row| row.get(0))?)
    }

    /// Deletes an item.
    ///
    /// Its children become top-level items and its association rows are
    /// removed. Deleting a source clears it from the requirements citing it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the item does not exist.
    #[instrument(skip(self))]
    pub fn delete(&mut self, kind: EntityKind, id: &ItemId) -> Result<(), StoreError> {
        let Table { name, key, .. } = table(kind);
        let deleted = self
            .conn
            .execute(&format!("DELETE FROM {name} WHERE {key} = ?1"), [id.as_str()])?;
        if deleted == 0 {
            return Err(not_found(kind, id));
        }
        tracing::debug!("deleted {kind} {id}");
        Ok(())
    }

    /// Sets or clears the source a requirement came from.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the requirement or the source does
    /// not exist.
    #[instrument(skip(self))]
    pub fn set_source(
        &mut self,
        requirement: &ItemId,
        source: Option<&ItemId>,
    ) -> Result<(), StoreError> {
        self.require(EntityKind::Requirement, requirement)?;
        let source_id: Option<i64> = match source {
            Some(source) => Some(
                self.conn
                    .query_row(
                        "SELECT source_id FROM Sources WHERE name = ?1",
                        [source.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?
                    .ok_or_else(|| not_found(EntityKind::Source, source))?,
            ),
            None => None,
        };
        self.conn.execute(
            "UPDATE Requirements SET source_id = ?1 WHERE req_id = ?2",
            params![source_id, requirement.as_str()],
        )?;
        Ok(())
    }

    /// Sets or clears a requirement's type.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the requirement does not exist.
    #[instrument(skip(self))]
    pub fn set_type(
        &mut self,
        requirement: &ItemId,
        requirement_type: Option<RequirementType>,
    ) -> Result<(), StoreError> {
        let code = requirement_type.map(RequirementType::code);
        self.update_column(EntityKind::Requirement, "req_type", code, requirement)
    }

    /// Sets or clears a requirement's priority.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the requirement does not exist.
    #[instrument(skip(self))]
    pub fn set_priority(
        &mut self,
        requirement: &ItemId,
        priority: Option<Priority>,
    ) -> Result<(), StoreError> {
        let code = priority.map(Priority::code);
        self.update_column(EntityKind::Requirement, "priority", code, requirement)
    }

    /// Sets or clears the image shown with a use case.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the use case does not exist.
    #[instrument(skip(self))]
    pub fn set_image(&mut self, use_case: &ItemId, image: Option<&str>) -> Result<(), StoreError> {
        self.update_column(EntityKind::UseCase, "image", image, use_case)
    }

    fn update_column(
        &self,
        kind: EntityKind,
        column: &str,
        value: Option<&str>,
        id: &ItemId,
    ) -> Result<(), StoreError> {
        let Table { name, key, .. } = table(kind);
        let updated = self.conn.execute(
            &format!("UPDATE {name} SET {column} = ?1 WHERE {key} = ?2"),
            params![value, id.as_str()],
        )?;
        if updated == 0 {
            return Err(not_found(kind, id));
        }
        Ok(())
    }

    /// Makes the stored associations of `owner` equal to `desired`.
    ///
    /// Only the difference is written, in a single transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the owner, or any target being
    /// added, does not exist.
    #[instrument(skip(self, desired))]
    pub fn save_associations(
        &mut self,
        relation: Relation,
        owner: &ItemId,
        desired: &BTreeSet<ItemId>,
    ) -> Result<AssociationDiff, StoreError> {
        self.require(relation.owner(), owner)?;

        let current = self.associated_ids(relation, owner)?;
        let diff = AssociationDiff {
            added: desired.difference(&current).cloned().collect(),
            removed: current.difference(desired).cloned().collect(),
        };
        for target in &diff.added {
            self.require(relation.target(), target)?;
        }

        let LinkTable {
            name,
            owner: owner_column,
            target: target_column,
        } = link_table(relation);
        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {name} ({owner_column}, {target_column}) VALUES (?1, ?2)"
            ))?;
            for target in &diff.added {
                insert.execute([owner.as_str(), target.as_str()])?;
            }
            let mut remove = tx.prepare(&format!(
                "DELETE FROM {name} WHERE {owner_column} = ?1 AND {target_column} = ?2"
            ))?;
            for target in &diff.removed {
                remove.execute([owner.as_str(), target.as_str()])?;
            }
        }
        tx.commit()?;

        tracing::debug!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            "saved associations"
        );
        Ok(diff)
    }

    fn require(&self, kind: EntityKind, id: &ItemId) -> Result<(), StoreError> {
        if self.exists(kind, id)? {
            Ok(())
        } else {
            Err(not_found(kind, id))
        }
    }

    fn ids<P: Params>(&self, sql: &str, params: P) -> Result<Vec<ItemId>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let raw = stmt
            .query_map(params, |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter()
            .map(|id| ItemId::new(id).map_err(StoreError::from))
            .collect()
    }
}

fn description_column(column: Option<&str>) -> String {
    column.map_or_else(|| "''".to_string(), |column| format!("COALESCE({column}, '')"))
}

fn decode<T>(
    code: Option<String>,
    attribute: &'static str,
    from_code: fn(&str) -> Option<T>,
) -> Result<Option<T>, StoreError> {
    code.map(|code| from_code(&code).ok_or(StoreError::UnknownCode { attribute, code }))
        .transpose()
}

fn not_found(kind: EntityKind, id: &ItemId) -> StoreError {
    StoreError::NotFound {
        kind,
        id: id.clone(),
    }
}

impl Store for SqliteStore {
    fn top_level_ids(&self, kind: EntityKind) -> Result<Vec<ItemId>, StoreError> {
        let Table {
            name, key, parent, ..
        } = table(kind);
        let sql = match parent {
            Some(parent) => {
                format!("SELECT {key} FROM {name} WHERE {parent} IS NULL ORDER BY {key}")
            }
            None => format!("SELECT {key} FROM {name} ORDER BY {key}"),
        };
        self.ids(&sql, [])
    }

    fn child_ids(&self, kind: EntityKind, parent: &ItemId) -> Result<Vec<ItemId>, StoreError> {
        let Table {
            name,
            key,
            parent: parent_column,
            ..
        } = table(kind);
        let Some(parent_column) = parent_column else {
            return Ok(Vec::new());
        };
        self.ids(
            &format!("SELECT {key} FROM {name} WHERE {parent_column} = ?1 ORDER BY {key}"),
            [parent.as_str()],
        )
    }

    fn candidate_list(&self, kind: EntityKind) -> Result<Vec<Candidate>, StoreError> {
        let Table {
            name,
            key,
            description,
            ..
        } = table(kind);
        let description = description_column(description);
        // Requirements are listed by identifier; other kinds in creation order.
        let order = if kind == EntityKind::Requirement {
            key
        } else {
            "rowid"
        };
        let sql = format!("SELECT {key}, {description} FROM {name} ORDER BY {order}");

        let mut stmt = self.conn.prepare(&sql)?;
        let raw = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter()
            .map(|(id, description)| Ok(Candidate::new(ItemId::new(id)?, description)))
            .collect()
    }

    fn associated_ids(
        &self,
        relation: Relation,
        owner: &ItemId,
    ) -> Result<BTreeSet<ItemId>, StoreError> {
        let LinkTable {
            name,
            owner: owner_column,
            target,
        } = link_table(relation);
        let ids = self.ids(
            &format!("SELECT {target} FROM {name} WHERE {owner_column} = ?1"),
            [owner.as_str()],
        )?;
        Ok(ids.into_iter().collect())
    }
}
