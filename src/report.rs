//! Tabular results and chart parameters handed to the presentation surface.
//!
//! Every analytical output becomes a [`ResultTable`]; chart-worthy ones carry
//! a [`ChartSpec`] naming the category and value columns. The [`Dashboard`]
//! groups panels into the three tabs.

use crate::config::Config;
use crate::db::Dataset;
use crate::error::Result;
use crate::stats::{self, MonthlyAverage, ProductAverage, RatingCount, ReviewSummary};
use crate::trend::{self, Granularity, RatingTrend};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

// ============================================================================
// TABLES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Integer(i64),
    Real(f64),
    Date(NaiveDate),
    Text(String),
    Null,
}

impl Cell {
    /// Numeric view for charting
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Integer(n) => Some(*n as f64),
            Cell::Real(x) if x.is_finite() => Some(*x),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Integer(n) => write!(f, "{}", n),
            Cell::Real(x) if x.is_nan() => f.write_str("NaN"),
            Cell::Real(x) => write!(f, "{:.3}", x),
            Cell::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Cell::Text(s) => f.write_str(s),
            Cell::Null => Ok(()),
        }
    }
}

/// Ordered rows under named columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl ResultTable {
    pub fn new(title: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            title: title.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// (label, value) pairs for a chart; rows with a non-numeric value are skipped
    pub fn series(&self, chart: &ChartSpec) -> Vec<(String, f64)> {
        let (Some(label_col), Some(value_col)) = (
            self.column_index(&chart.category_column),
            self.column_index(&chart.value_column),
        ) else {
            return Vec::new();
        };

        self.rows
            .iter()
            .filter_map(|row| Some((row[label_col].to_string(), row[value_col].as_f64()?)))
            .collect()
    }

    /// Header row followed by every data row
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(|cell| match cell {
                // full precision in exports
                Cell::Real(x) if x.is_finite() => x.to_string(),
                other => other.to_string(),
            }))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        md.push_str(&format!("| {} |\n", self.columns.join(" | ")));
        md.push_str(&format!(
            "|{}|\n",
            self.columns.iter().map(|_| "---").collect::<Vec<_>>().join("|")
        ));
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(Cell::to_string).collect();
            md.push_str(&format!("| {} |\n", cells.join(" | ")));
        }
        md
    }
}

// ============================================================================
// CHARTS & LAYOUT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Pie,
    Line,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub category_column: String,
    pub value_column: String,
    pub kind: ChartKind,
}

impl ChartSpec {
    pub fn new(category_column: &str, value_column: &str, kind: ChartKind) -> Self {
        Self {
            category_column: category_column.to_string(),
            value_column: value_column.to_string(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    pub table: ResultTable,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tab {
    pub title: String,
    pub panels: Vec<Panel>,
}

/// Everything one render shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub summary: ReviewSummary,
    pub tabs: Vec<Tab>,
}

// ============================================================================
// CONVERSIONS
// ============================================================================

pub fn trend_table(title: &str, granularity: Granularity, trends: &[RatingTrend]) -> ResultTable {
    let mut table = ResultTable::new(
        title,
        &[
            granularity.key_column(),
            "RatingRange",
            "RatingRatio",
            "RatingChange",
            "RatingChangeRatio",
        ],
    );
    for t in trends {
        table.push_row(vec![
            Cell::Text(t.key.clone()),
            Cell::Real(t.rating_range),
            Cell::Real(t.rating_ratio),
            Cell::Real(t.rating_change),
            Cell::Real(t.rating_change_ratio),
        ]);
    }
    table
}

pub fn distribution_table(counts: &[RatingCount]) -> ResultTable {
    let mut table = ResultTable::new("Rating distribution", &["Rating", "Count"]);
    for c in counts {
        table.push_row(vec![Cell::Integer(c.rating), Cell::Integer(c.count as i64)]);
    }
    table
}

pub fn monthly_table(months: &[MonthlyAverage]) -> ResultTable {
    let mut table = ResultTable::new("Average rating by month", &["Date", "Rating", "Count"]);
    for m in months {
        table.push_row(vec![
            Cell::Date(m.period),
            Cell::Real(m.average),
            Cell::Integer(m.count as i64),
        ]);
    }
    table
}

pub fn product_average_table(title: &str, averages: &[ProductAverage]) -> ResultTable {
    let mut table = ResultTable::new(title, &["GoodDesc", "AvgRating"]);
    for a in averages {
        table.push_row(vec![Cell::Text(a.product.clone()), Cell::Real(a.avg_rating)]);
    }
    table
}

fn trend_tab(dataset: &Dataset, granularity: Granularity, n: usize, title: &str) -> Tab {
    let ranking = trend::rank(dataset, granularity, n);
    let chart = ChartSpec::new(granularity.key_column(), "RatingChange", ChartKind::Bar);

    Tab {
        title: title.to_string(),
        panels: vec![
            Panel {
                table: trend_table(
                    &format!("Top {} {} by rating growth", n, granularity.plural()),
                    granularity,
                    &ranking.improving,
                ),
                chart: Some(chart.clone()),
            },
            Panel {
                table: trend_table(
                    &format!("Top {} {} by rating decline", n, granularity.plural()),
                    granularity,
                    &ranking.declining,
                ),
                chart: Some(chart),
            },
        ],
    }
}

fn overview_tab(dataset: &Dataset, top_rated: usize) -> Tab {
    let averages = stats::product_average_ratings(dataset);

    Tab {
        title: "Overall Statistics".to_string(),
        panels: vec![
            Panel {
                table: distribution_table(&stats::rating_distribution(dataset)),
                chart: Some(ChartSpec::new("Rating", "Count", ChartKind::Pie)),
            },
            Panel {
                table: monthly_table(&stats::monthly_average(dataset)),
                chart: Some(ChartSpec::new("Date", "Rating", ChartKind::Line)),
            },
            Panel {
                table: product_average_table(
                    &format!("Top {} products by rating", top_rated),
                    &stats::top_rated(&averages, top_rated),
                ),
                chart: None,
            },
            Panel {
                table: product_average_table(
                    &format!("Bottom {} products by rating", top_rated),
                    &stats::bottom_rated(&averages, top_rated),
                ),
                chart: None,
            },
        ],
    }
}

/// Run every analysis against the dataset and lay the results out in tabs
pub fn build_dashboard(dataset: &Dataset, config: &Config) -> Dashboard {
    Dashboard {
        summary: stats::summary(dataset),
        tabs: vec![
            trend_tab(dataset, Granularity::Product, config.top_products, "Product Analysis"),
            trend_tab(dataset, Granularity::Category, config.top_categories, "Category Analysis"),
            overview_tab(dataset, config.top_rated),
        ],
    }
}

// ============================================================================
// RENDERINGS
// ============================================================================

fn slug(title: &str) -> String {
    let mut out = String::new();
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

impl Dashboard {
    pub fn tab(&self, title: &str) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.title == title)
    }

    pub fn tables(&self) -> impl Iterator<Item = &ResultTable> {
        self.tabs
            .iter()
            .flat_map(|tab| tab.panels.iter().map(|p| &p.table))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// SHA-256 of the JSON rendering
    pub fn fingerprint(&self) -> Result<String> {
        let json = serde_json::to_string(self)?;
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        md.push_str("# Product Review Analysis\n\n");

        md.push_str("| Metric | Value |\n");
        md.push_str("|--------|-------|\n");
        md.push_str(&format!("| Reviews | {} |\n", self.summary.total_reviews));
        md.push_str(&format!("| Products | {} |\n", self.summary.total_goods));
        md.push_str(&format!("| Categories | {} |\n", self.summary.total_categories));
        md.push_str(&format!("| Mean rating | {} |\n", Cell::Real(self.summary.mean_rating)));
        if let (Some(first), Some(last)) = (self.summary.first_date, self.summary.last_date) {
            md.push_str(&format!("| Period | {} - {} |\n", first, last));
        }
        md.push('\n');

        for tab in &self.tabs {
            md.push_str(&format!("## {}\n\n", tab.title));
            for panel in &tab.panels {
                md.push_str(&format!("### {}\n\n", panel.table.title));
                md.push_str(&panel.table.to_markdown());
                md.push('\n');
            }
        }

        md
    }

    /// One CSV per table, named after the table title
    pub fn write_csv_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let mut written = Vec::new();
        for table in self.tables() {
            let path = dir.join(format!("{}.csv", slug(&table.title)));
            let file = std::fs::File::create(&path)?;
            table.write_csv(file)?;
            written.push(path);
        }

        info!(files = written.len(), dir = %dir.display(), "exported result tables");
        Ok(written)
    }
}
