mod catalog;
mod schedule;
mod sync;

use std::path::PathBuf;

use catsync_core::{FeedFormat, PriceTypeCode, ProductTypeId, SortField};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "catsync-cli")]
#[command(about = "Synchronise the product catalog from ERP feeds")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch a feed and reconcile one product type against the catalog
    Import(FeedArgs),
    /// Show what an import would change, without writing anything
    Plan(FeedArgs),
    /// List products with filtering, sorting and pagination
    Products(ProductArgs),
    /// Print the category tree
    Categories {
        #[arg(long)]
        product_type: Option<ProductTypeId>,

        /// Only the subtree rooted at this category id
        #[arg(long)]
        subtree: Option<i64>,

        /// Emit JSON instead of an indented outline
        #[arg(long)]
        json: bool,
    },
    /// List recent synchronisation runs
    Runs {
        #[arg(long)]
        product_type: Option<ProductTypeId>,

        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Run every configured feed on the `CATSYNC_SYNC_CRON` schedule until interrupted
    Schedule,
    /// Apply pending database migrations
    Migrate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Xml,
    Json,
}

impl From<FormatArg> for FeedFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Xml => FeedFormat::Xml,
            FormatArg::Json => FeedFormat::Json,
        }
    }
}

#[derive(Debug, Args)]
pub(crate) struct FeedArgs {
    #[arg(long)]
    product_type: ProductTypeId,

    /// Read the feed from a local file instead of downloading it
    #[arg(long, conflicts_with = "url")]
    file: Option<PathBuf>,

    /// Download from this URL instead of the one in the feeds file
    #[arg(long)]
    url: Option<String>,

    /// Skip format detection
    #[arg(long, value_enum)]
    format: Option<FormatArg>,
}

#[derive(Debug, Args)]
pub(crate) struct ProductArgs {
    #[arg(long)]
    product_type: Option<ProductTypeId>,

    /// Case-insensitive substring of the product name
    #[arg(long)]
    search: Option<String>,

    #[arg(long)]
    category: Option<i64>,

    /// Include products of descendant categories
    #[arg(long, requires = "category")]
    subcategories: bool,

    #[arg(long)]
    min_stock: Option<i32>,

    #[arg(long, default_value = "name")]
    sort: SortField,

    #[arg(long)]
    desc: bool,

    #[arg(long, default_value_t = 1)]
    page: u32,

    #[arg(long, default_value_t = 12)]
    page_size: u32,

    /// Price list to show and sort by
    #[arg(long, default_value_t = 1)]
    price_type: i16,
}

impl ProductArgs {
    fn price_type(&self) -> PriceTypeCode {
        PriceTypeCode::new(self.price_type)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = catsync_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(!config.env.is_production())
        .init();
    tracing::debug!(env = %config.env, "configuration loaded");

    let pool_config = catsync_db::PoolConfig::from_app_config(&config);
    let pool = catsync_db::connect_pool(&config.database_url, pool_config).await?;

    match cli.command {
        Commands::Import(args) => sync::run_import(&pool, &config, &args).await?,
        Commands::Plan(args) => sync::run_plan(&pool, &config, &args).await?,
        Commands::Products(args) => catalog::list_products(&pool, &args).await?,
        Commands::Categories {
            product_type,
            subtree,
            json,
        } => catalog::show_categories(&pool, product_type, subtree, json).await?,
        Commands::Runs {
            product_type,
            limit,
        } => catalog::show_runs(&pool, product_type, limit).await?,
        Commands::Schedule => schedule::run(pool, config).await?,
        Commands::Migrate => {
            let applied = catsync_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
    }

    Ok(())
}

pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal");
}

#[cfg(test)]
mod tests;
