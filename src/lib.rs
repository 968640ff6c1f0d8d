// Review Insights - Core Library
// Loads the review store once and exposes the analytics used by the CLI, TUI and API server

pub mod config;
pub mod db;
pub mod error;
pub mod report;
pub mod stats;
pub mod trend;

// Only compile front-ends when their feature is enabled
#[cfg(feature = "server")]
pub mod api;
#[cfg(feature = "tui")]
pub mod ui;

// Re-export commonly used types
pub use config::Config;
pub use db::{
    load_tables, open_dataset, open_tables, parse_date, Category, Dataset, Good, Ident, Review,
    Table, CATEGORIES_TABLE, GOODS_TABLE, REVIEWS_TABLE,
};
pub use error::{InsightsError, Result};
pub use report::{
    build_dashboard, Cell, ChartKind, ChartSpec, Dashboard, Panel, ResultTable, Tab,
};
pub use stats::{
    bottom_rated, monthly_average, product_average_ratings, rating_distribution, summary,
    top_rated, MonthlyAverage, ProductAverage, RatingCount, ReviewSummary,
};
pub use trend::{
    rank, rating_trends, running_averages, trend_for, Granularity, KeyedTrend, RatingTrend,
    TrendRanking,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the tracing subscriber; `RUST_LOG` wins over the configured level
pub fn init_logging(config: &Config) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // try_init: a second call (tests, embedding) is a no-op
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
