use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use codehub_core::{FilterMode, SortBy, TrendingPeriod};

#[derive(Parser)]
#[command(name = "codehub")]
#[command(version, about = "Organize saved GitHub repositories with categories and views", long_about = None)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Dashboard database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Dashboard user to act as
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage categories
    #[command(subcommand)]
    Category(CategoryCommand),

    /// Manage saved repositories
    #[command(subcommand)]
    Repo(RepoCommand),

    /// Filter saved repositories by category
    Filter {
        #[arg(long, value_enum, default_value_t = ModeArg::Any)]
        mode: ModeArg,

        /// Category id or name; repeat for several
        #[arg(short, long = "category")]
        categories: Vec<String>,

        #[arg(long, value_enum)]
        sort: Option<SortArg>,
    },

    /// Manage saved views
    #[command(subcommand)]
    View(ViewCommand),

    /// Search GitHub without saving anything
    Search {
        query: String,

        /// Results to fetch (defaults to github.per_page)
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Show trending repositories on GitHub
    Trending {
        #[arg(short, long, value_enum, default_value_t = PeriodArg::Weekly)]
        period: PeriodArg,

        #[arg(long)]
        language: Option<String>,

        /// Results to fetch (defaults to github.per_page)
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Export saved repositories (or one view) to .json, .csv or .md
    Export {
        path: PathBuf,

        /// Only export repositories matching this view
        #[arg(long)]
        view: Option<String>,

        #[arg(long, value_enum)]
        sort: Option<SortArg>,
    },
}

#[derive(Subcommand)]
enum CategoryCommand {
    Add {
        name: String,
        #[arg(long)]
        color: Option<String>,
    },
    Update {
        /// Category id or name
        category: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Delete a category and untag every repository carrying it
    Delete { category: String },
    /// List categories with usage counts
    List,
}

#[derive(Subcommand)]
enum RepoCommand {
    /// Fetch owner/name from GitHub and save it
    Save {
        full_name: String,
        #[arg(short, long = "category")]
        categories: Vec<String>,
    },
    /// Save every result of a GitHub search
    Import {
        query: String,
        /// Results to fetch (defaults to github.per_page)
        #[arg(short, long)]
        limit: Option<u32>,
        #[arg(short, long = "category")]
        categories: Vec<String>,
    },
    Remove { id: String },
    /// Add categories to a saved repository
    Tag {
        id: String,
        #[arg(short, long = "category", required = true)]
        categories: Vec<String>,
    },
    /// Remove categories from a saved repository
    Untag {
        id: String,
        #[arg(short, long = "category", required = true)]
        categories: Vec<String>,
    },
    List {
        #[arg(long, value_enum)]
        sort: Option<SortArg>,
    },
}

#[derive(Subcommand)]
enum ViewCommand {
    Create {
        name: String,
        #[arg(long, value_enum, default_value_t = ModeArg::Any)]
        mode: ModeArg,
        #[arg(short, long = "category")]
        categories: Vec<String>,
    },
    Rename {
        /// View id or name
        view: String,
        new_name: String,
    },
    Delete { view: String },
    List,
    /// Show the saved repositories a view matches
    Apply {
        view: String,
        #[arg(long, value_enum)]
        sort: Option<SortArg>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    All,
    Any,
    Uncategorized,
}

impl From<ModeArg> for FilterMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::All => FilterMode::All,
            ModeArg::Any => FilterMode::Any,
            ModeArg::Uncategorized => FilterMode::Uncategorized,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Saved,
    Stars,
    Forks,
    Updated,
    Name,
}

impl From<SortArg> for SortBy {
    fn from(sort: SortArg) -> Self {
        match sort {
            SortArg::Saved => SortBy::Saved,
            SortArg::Stars => SortBy::Stars,
            SortArg::Forks => SortBy::Forks,
            SortArg::Updated => SortBy::Updated,
            SortArg::Name => SortBy::Name,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PeriodArg {
    Daily,
    Weekly,
    Monthly,
}

impl From<PeriodArg> for TrendingPeriod {
    fn from(period: PeriodArg) -> Self {
        match period {
            PeriodArg::Daily => TrendingPeriod::Daily,
            PeriodArg::Weekly => TrendingPeriod::Weekly,
            PeriodArg::Monthly => TrendingPeriod::Monthly,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "codehub_cli=info,codehub_core=info,codehub_store=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // CLI > Env > File > Defaults
    let mut config = match &cli.config {
        Some(path) => codehub_core::Config::load_from(path),
        None => codehub_core::Config::load(),
    }
    .context("Failed to load config")?
    .with_env();
    if let Some(db) = cli.db {
        config.storage.database_path = Some(db);
    }
    if let Some(user) = cli.user {
        config.dashboard.user = Some(user);
    }

    let mut ctx = commands::Context::new(config)?;
    tracing::debug!("Acting as user '{}'", ctx.dashboard.user());

    match cli.command {
        Commands::Category(cmd) => match cmd {
            CategoryCommand::Add { name, color } => ctx.category_add(&name, color.as_deref()),
            CategoryCommand::Update {
                category,
                name,
                color,
            } => ctx.category_update(&category, name.as_deref(), color.as_deref()),
            CategoryCommand::Delete { category } => ctx.category_delete(&category),
            CategoryCommand::List => ctx.category_list(),
        },
        Commands::Repo(cmd) => match cmd {
            RepoCommand::Save {
                full_name,
                categories,
            } => ctx.repo_save(&full_name, &categories).await,
            RepoCommand::Import {
                query,
                limit,
                categories,
            } => ctx.repo_import(&query, limit, &categories).await,
            RepoCommand::Remove { id } => ctx.repo_remove(&id),
            RepoCommand::Tag { id, categories } => ctx.repo_tag(&id, &categories),
            RepoCommand::Untag { id, categories } => ctx.repo_untag(&id, &categories),
            RepoCommand::List { sort } => ctx.repo_list(sort.map(Into::into)),
        },
        Commands::Filter {
            mode,
            categories,
            sort,
        } => ctx.filter(mode.into(), &categories, sort.map(Into::into)),
        Commands::View(cmd) => match cmd {
            ViewCommand::Create {
                name,
                mode,
                categories,
            } => ctx.view_create(&name, mode.into(), &categories),
            ViewCommand::Rename { view, new_name } => ctx.view_rename(&view, &new_name),
            ViewCommand::Delete { view } => ctx.view_delete(&view),
            ViewCommand::List => ctx.view_list(),
            ViewCommand::Apply { view, sort } => ctx.view_apply(&view, sort.map(Into::into)),
        },
        Commands::Search { query, limit } => ctx.search(&query, limit).await,
        Commands::Trending {
            period,
            language,
            limit,
        } => ctx.trending(period.into(), language.as_deref(), limit).await,
        Commands::Export { path, view, sort } => {
            ctx.export(&path, view.as_deref(), sort.map(Into::into))
        }
    }
}
