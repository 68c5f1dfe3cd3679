use std::path::{Path, PathBuf};

mod link;
mod show;
mod terminal;
mod tree;

use clap::ArgAction;
use reqforest::{
    AppContext, Config, EntityKind, ItemId, NewItem, Priority, RequirementType, StoreError,
};
use terminal::{Paint, Role};
use tracing::instrument;

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// The path to the root of the project
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);
        self.command.run(&self.root)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Initialize a new project
    Init,

    /// Add a requirement, use case, test or source
    Add(Add),

    /// Change the description or attributes of an item
    Edit(Edit),

    /// Change the identifier of an item
    Rename(Rename),

    /// Move an item under a new parent
    ///
    /// Without a parent the item becomes top-level.
    Move(Move),

    /// Delete an item
    ///
    /// Children of a deleted item become top-level items.
    Delete(Delete),

    /// Print the items of one kind as a tree
    Tree(tree::Command),

    /// Show detailed information about an item
    Show(show::Command),

    /// Show or edit the associations of an item
    Link(link::Command),
}

impl Command {
    fn run(self, root: &Path) -> anyhow::Result<()> {
        match self {
            Self::Init => Init::run(root)?,
            Self::Add(command) => command.run(root)?,
            Self::Edit(command) => command.run(root)?,
            Self::Rename(command) => command.run(root)?,
            Self::Move(command) => command.run(root)?,
            Self::Delete(command) => command.run(root)?,
            Self::Tree(command) => command.run(root)?,
            Self::Show(command) => command.run(root)?,
            Self::Link(command) => command.run(root)?,
        }
        Ok(())
    }
}

/// Opens the project rooted at `root`, failing if it was never initialized.
fn open_context(root: &Path) -> anyhow::Result<AppContext> {
    let config = Config::load_or_default(root);
    let database = config.database_path(root);
    if !database.exists() {
        anyhow::bail!(
            "No project found at {} (run `reqforest init` first)",
            root.display()
        );
    }
    Ok(AppContext::open(root, &config)?)
}

#[derive(Debug, clap::Parser)]
pub struct Init {}

impl Init {
    #[instrument]
    fn run(root: &Path) -> anyhow::Result<()> {
        let config_path = root.join(Config::FILE_NAME);
        if config_path.exists() {
            anyhow::bail!("Project already initialized (found existing {})", Config::FILE_NAME);
        }

        std::fs::create_dir_all(root)
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", root.display()))?;

        let config = Config::default();
        config
            .save(&config_path)
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {e}", Config::FILE_NAME))?;
        AppContext::open(root, &config)?;

        println!("Initialized project in {}", root.display());
        println!("  Created: {}", Config::FILE_NAME);
        println!("  Created: {}", config.database().display());
        println!();
        println!("Next steps:");
        println!("  reqforest add requirement R1 --description \"Your first requirement\"");

        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Add {
    /// The kind of item (requirement, use-case, test or source)
    kind: EntityKind,

    /// The identifier of the new item
    id: ItemId,

    /// The description of the item
    #[clap(long, short)]
    description: Option<String>,

    /// The parent of the item (requirements and use cases only)
    #[clap(long, short)]
    parent: Option<ItemId>,

    /// The requirement type (functional, performance, quality-metric or declarative)
    #[clap(long = "type", short = 't')]
    requirement_type: Option<RequirementType>,

    /// The requirement priority (mandatory, desirable or optional)
    #[clap(long)]
    priority: Option<Priority>,

    /// An image illustrating a use case
    #[clap(long)]
    image: Option<String>,
}

impl Add {
    #[instrument]
    fn run(self, root: &Path) -> anyhow::Result<()> {
        let mut context = open_context(root)?;

        let mut item = NewItem::new(self.id.clone())
            .with_description(self.description.unwrap_or_default());
        if let Some(parent) = self.parent {
            item = item.with_parent(parent);
        }
        if let Some(requirement_type) = self.requirement_type {
            item = item.with_type(requirement_type);
        }
        if let Some(priority) = self.priority {
            item = item.with_priority(priority);
        }
        if let Some(image) = self.image {
            item = item.with_image(image);
        }
        context.create(self.kind, item)?;

        println!("{}", format!("Added {} {}", self.kind, self.id).paint(Role::Success));
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Edit {
    /// The kind of item
    kind: EntityKind,

    /// The identifier of the item
    id: ItemId,

    /// The new description
    #[clap(long, short)]
    description: Option<String>,

    /// The requirement type
    #[clap(long = "type", short = 't')]
    requirement_type: Option<RequirementType>,

    /// The requirement priority
    #[clap(long)]
    priority: Option<Priority>,

    /// An image illustrating a use case
    #[clap(long)]
    image: Option<String>,

    /// The source a requirement came from
    #[clap(long)]
    source: Option<ItemId>,
}

impl Edit {
    fn check_kind(&self) -> Result<(), StoreError> {
        let requirement_only = [
            ("type", self.requirement_type.is_some()),
            ("priority", self.priority.is_some()),
            ("source", self.source.is_some()),
        ];
        let misplaced = if self.kind == EntityKind::Requirement {
            None
        } else {
            requirement_only.into_iter().find(|(_, given)| *given)
        };
        let misplaced = misplaced.map(|(attribute, _)| attribute).or_else(|| {
            (self.kind != EntityKind::UseCase && self.image.is_some()).then_some("image")
        });
        misplaced.map_or(Ok(()), |attribute| {
            Err(StoreError::NoAttribute {
                kind: self.kind,
                attribute,
            })
        })
    }

    const fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.requirement_type.is_none()
            && self.priority.is_none()
            && self.image.is_none()
            && self.source.is_none()
    }

    #[instrument]
    fn run(self, root: &Path) -> anyhow::Result<()> {
        if self.is_empty() {
            anyhow::bail!("Nothing to change (see `reqforest edit --help`)");
        }
        self.check_kind()?;
        let mut context = open_context(root)?;
        let store = context.store_mut();
        if !store.exists(self.kind, &self.id)? {
            anyhow::bail!("{} {} not found", self.kind, self.id);
        }

        let mut changed = Vec::new();
        if let Some(description) = &self.description {
            store.update_description(self.kind, &self.id, description)?;
            changed.push("description");
        }
        if let Some(requirement_type) = self.requirement_type {
            store.set_type(&self.id, Some(requirement_type))?;
            changed.push("type");
        }
        if let Some(priority) = self.priority {
            store.set_priority(&self.id, Some(priority))?;
            changed.push("priority");
        }
        if let Some(image) = &self.image {
            store.set_image(&self.id, Some(image))?;
            changed.push("image");
        }
        if let Some(source) = &self.source {
            store.set_source(&self.id, Some(source))?;
            changed.push("source");
        }

        let msg = format!("Updated {} of {} {}", changed.join(", "), self.kind, self.id);
        println!("{}", msg.paint(Role::Success));
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Rename {
    /// The kind of item
    kind: EntityKind,

    /// The current identifier
    old_id: ItemId,

    /// The new identifier
    new_id: ItemId,
}

impl Rename {
    #[instrument]
    fn run(self, root: &Path) -> anyhow::Result<()> {
        let mut context = open_context(root)?;
        context.rename(self.kind, &self.old_id, self.new_id.clone())?;

        let children = context
            .index(self.kind)
            .find(&self.new_id)
            .map_or(0, |node| node.children().len());

        let msg = format!("Renamed {} {} → {}", self.kind, self.old_id, self.new_id);
        println!("{}", msg.paint(Role::Success));
        if children > 0 {
            println!("{}", format!("  {children} children updated").paint(Role::Muted));
        }
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Move {
    /// The kind of item (requirement or use-case)
    kind: EntityKind,

    /// The identifier of the item to move
    id: ItemId,

    /// The new parent; omit to make the item top-level
    #[clap(long, short)]
    parent: Option<ItemId>,
}

impl Move {
    #[instrument]
    fn run(self, root: &Path) -> anyhow::Result<()> {
        let mut context = open_context(root)?;
        context.reparent(self.kind, &self.id, self.parent.as_ref())?;

        let msg = match &self.parent {
            Some(parent) => format!("Moved {} {} under {parent}", self.kind, self.id),
            None => format!("Moved {} {} to the top level", self.kind, self.id),
        };
        println!("{}", msg.paint(Role::Success));
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Delete {
    /// The kind of item
    kind: EntityKind,

    /// The identifier of the item to delete
    id: ItemId,
}

impl Delete {
    #[instrument]
    fn run(self, root: &Path) -> anyhow::Result<()> {
        let mut context = open_context(root)?;

        let Some(node) = context.index(self.kind).find(&self.id) else {
            anyhow::bail!("{} {} not found", self.kind, self.id);
        };
        let orphans: Vec<ItemId> = node.children().map(|child| child.id().clone()).collect();

        context.delete(self.kind, &self.id, None)?;

        println!(
            "{}",
            format!("Deleted {} {}", self.kind, self.id).paint(Role::Success)
        );
        for orphan in &orphans {
            println!("  {} {}", "now top-level:".paint(Role::Warning), orphan);
        }
        Ok(())
    }
}
