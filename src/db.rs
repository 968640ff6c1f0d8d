use crate::error::{InsightsError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

pub const REVIEWS_TABLE: &str = "reviews";
pub const GOODS_TABLE: &str = "goods";
pub const CATEGORIES_TABLE: &str = "categs";

// ============================================================================
// RAW TABLES (catalogue snapshot)
// ============================================================================

/// Full row set of one store table, columns in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Position of a column, or `MissingColumn` when the schema drifted
    pub fn column_index(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| InsightsError::MissingColumn {
                table: self.name.clone(),
                column: column.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Materialize every table listed in the store catalogue.
/// No filtering, no projection.
pub fn load_tables(conn: &Connection) -> Result<BTreeMap<String, Table>> {
    let names: Vec<String> = {
        let mut stmt =
            conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        names
    };

    let mut tables = BTreeMap::new();

    for name in names {
        let table = scan_table(conn, &name)?;
        debug!(table = %name, rows = table.len(), "scanned table");
        tables.insert(name, table);
    }

    info!(tables = tables.len(), "loaded review store catalogue");
    Ok(tables)
}

fn scan_table(conn: &Connection, name: &str) -> Result<Table> {
    let sql = format!("SELECT * FROM \"{}\"", name.replace('"', "\"\""));
    let mut stmt = conn.prepare(&sql)?;

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let rows = stmt
        .query_map([], |row| {
            (0..width)
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Table {
        name: name.to_string(),
        columns,
        rows,
    })
}

/// Open the store read-only and snapshot its catalogue.
/// The connection is dropped before returning, on success or failure.
pub fn open_tables(path: &Path) -> Result<BTreeMap<String, Table>> {
    if !path.exists() {
        return Err(InsightsError::StoreNotFound(path.to_path_buf()));
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    info!(path = %path.display(), "opened review store");

    load_tables(&conn)
}

/// Open the store and extract the typed dataset in one step.
pub fn open_dataset(path: &Path) -> Result<Dataset> {
    let tables = open_tables(path)?;
    Dataset::from_tables(&tables)
}

// ============================================================================
// TYPED ROWS
// ============================================================================

/// Identifier column value (GoodNum, ProductCatNum).
/// SQLite lets these be integers or text; join equality is per variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ident {
    Int(i64),
    Text(String),
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ident::Int(n) => write!(f, "{}", n),
            Ident::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Ident {
    fn from(n: i64) -> Self {
        Ident::Int(n)
    }
}

impl From<&str> for Ident {
    fn from(s: &str) -> Self {
        Ident::Text(s.to_string())
    }
}

/// One review event. NULL keys never join; NULL ratings are left out of every mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(rename = "GoodNum")]
    pub good_num: Option<Ident>,

    /// Not range-checked; averaged as-is
    #[serde(rename = "Rating")]
    pub rating: Option<i64>,

    #[serde(rename = "Date")]
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Good {
    #[serde(rename = "GoodNum")]
    pub good_num: Option<Ident>,

    #[serde(rename = "GoodDesc")]
    pub good_desc: String,

    #[serde(rename = "ProductCatNum")]
    pub product_cat_num: Option<Ident>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(rename = "ProductCatNum")]
    pub product_cat_num: Option<Ident>,

    #[serde(rename = "ProductCatDesc")]
    pub product_cat_desc: String,
}

/// Immutable handle over the three review tables, in store row order.
/// Built once at startup and passed to every analytical function.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    reviews: Vec<Review>,
    goods: Vec<Good>,
    categories: Vec<Category>,
}

impl Dataset {
    pub fn new(reviews: Vec<Review>, goods: Vec<Good>, categories: Vec<Category>) -> Self {
        Self {
            reviews,
            goods,
            categories,
        }
    }

    /// Extract typed rows from a catalogue snapshot.
    /// Missing tables/columns and unparseable values are fatal.
    pub fn from_tables(tables: &BTreeMap<String, Table>) -> Result<Self> {
        let reviews = extract_reviews(require_table(tables, REVIEWS_TABLE)?)?;
        let goods = extract_goods(require_table(tables, GOODS_TABLE)?)?;
        let categories = extract_categories(require_table(tables, CATEGORIES_TABLE)?)?;

        info!(
            reviews = reviews.len(),
            goods = goods.len(),
            categories = categories.len(),
            "dataset ready"
        );

        Ok(Self::new(reviews, goods, categories))
    }

    pub fn reviews(&self) -> &[Review] {
        &self.reviews
    }

    pub fn goods(&self) -> &[Good] {
        &self.goods
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Inner join reviews ⋈ goods on GoodNum, review order preserved.
    /// A NULL key on either side matches nothing.
    pub fn product_reviews(&self) -> Vec<(&Review, &Good)> {
        let mut goods: HashMap<&Ident, Vec<&Good>> = HashMap::new();
        for good in &self.goods {
            if let Some(key) = &good.good_num {
                goods.entry(key).or_default().push(good);
            }
        }

        self.reviews
            .iter()
            .flat_map(|review| {
                review
                    .good_num
                    .as_ref()
                    .and_then(|key| goods.get(key))
                    .into_iter()
                    .flatten()
                    .map(move |good| (review, *good))
            })
            .collect()
    }

    /// Inner join reviews ⋈ goods ⋈ categs, review order preserved.
    pub fn category_reviews(&self) -> Vec<(&Review, &Good, &Category)> {
        let mut categories: HashMap<&Ident, Vec<&Category>> = HashMap::new();
        for category in &self.categories {
            if let Some(key) = &category.product_cat_num {
                categories.entry(key).or_default().push(category);
            }
        }

        self.product_reviews()
            .into_iter()
            .flat_map(|(review, good)| {
                good.product_cat_num
                    .as_ref()
                    .and_then(|key| categories.get(key))
                    .into_iter()
                    .flatten()
                    .map(move |category| (review, good, *category))
            })
            .collect()
    }
}

fn require_table<'a>(tables: &'a BTreeMap<String, Table>, name: &str) -> Result<&'a Table> {
    tables
        .get(name)
        .ok_or_else(|| InsightsError::MissingTable(name.to_string()))
}

fn extract_reviews(table: &Table) -> Result<Vec<Review>> {
    let good_col = table.column_index("GoodNum")?;
    let rating_col = table.column_index("Rating")?;
    let date_col = table.column_index("Date")?;

    table
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            Ok(Review {
                good_num: ident_cell(table, i, good_col, &row[good_col])?,
                rating: rating_cell(table, i, rating_col, &row[rating_col])?,
                date: date_cell(table, i, &row[date_col])?,
            })
        })
        .collect()
}

fn extract_goods(table: &Table) -> Result<Vec<Good>> {
    let good_col = table.column_index("GoodNum")?;
    let desc_col = table.column_index("GoodDesc")?;
    let cat_col = table.column_index("ProductCatNum")?;

    table
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            Ok(Good {
                good_num: ident_cell(table, i, good_col, &row[good_col])?,
                good_desc: text_cell(table, i, desc_col, &row[desc_col])?,
                product_cat_num: ident_cell(table, i, cat_col, &row[cat_col])?,
            })
        })
        .collect()
}

fn extract_categories(table: &Table) -> Result<Vec<Category>> {
    let cat_col = table.column_index("ProductCatNum")?;
    let desc_col = table.column_index("ProductCatDesc")?;

    table
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            Ok(Category {
                product_cat_num: ident_cell(table, i, cat_col, &row[cat_col])?,
                product_cat_desc: text_cell(table, i, desc_col, &row[desc_col])?,
            })
        })
        .collect()
}

fn invalid(table: &Table, row: usize, col: usize, expected: &'static str) -> InsightsError {
    InsightsError::InvalidValue {
        table: table.name.clone(),
        column: table.columns[col].clone(),
        row,
        expected,
    }
}

/// REAL with no fractional part that fits in i64
fn integral(x: f64) -> Option<i64> {
    // i64::MIN as f64 is exactly -2^63; i64::MAX as f64 rounds up to 2^63
    if x.fract() == 0.0 && x >= i64::MIN as f64 && x < i64::MAX as f64 {
        Some(x as i64)
    } else {
        None
    }
}

fn ident_cell(table: &Table, row: usize, col: usize, value: &Value) -> Result<Option<Ident>> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(n) => Ok(Some(Ident::Int(*n))),
        Value::Real(x) => integral(*x)
            .map(|n| Some(Ident::Int(n)))
            .ok_or_else(|| invalid(table, row, col, "integer or text identifier")),
        Value::Text(s) => Ok(Some(Ident::Text(s.clone()))),
        Value::Blob(_) => Err(invalid(table, row, col, "integer or text identifier")),
    }
}

fn text_cell(table: &Table, row: usize, col: usize, value: &Value) -> Result<String> {
    match value {
        Value::Text(s) => Ok(s.clone()),
        Value::Integer(n) => Ok(n.to_string()),
        _ => Err(invalid(table, row, col, "text")),
    }
}

fn rating_cell(table: &Table, row: usize, col: usize, value: &Value) -> Result<Option<i64>> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(n) => Ok(Some(*n)),
        Value::Real(x) => integral(*x)
            .map(Some)
            .ok_or_else(|| invalid(table, row, col, "integer rating")),
        _ => Err(invalid(table, row, col, "integer rating")),
    }
}

fn date_cell(table: &Table, row: usize, value: &Value) -> Result<NaiveDate> {
    let raw = match value {
        Value::Text(s) => s.as_str(),
        other => {
            return Err(InsightsError::InvalidDate {
                table: table.name.clone(),
                row,
                value: format!("{:?}", other),
            })
        }
    };

    parse_date(raw).ok_or_else(|| InsightsError::InvalidDate {
        table: table.name.clone(),
        row,
        value: raw.to_string(),
    })
}

/// Parse a stored date; any time-of-day part is discarded.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }

    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
}

// ============================================================================
// TEST FIXTURES
// ============================================================================


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_load_tables_lists_whole_catalogue() {
        let conn = Connection::open_in_memory().unwrap();
        seed_store(&conn);
        conn.execute_batch("CREATE TABLE extra (x INTEGER); INSERT INTO extra VALUES (7);")
            .unwrap();

        let tables = load_tables(&conn).unwrap();

        assert_eq!(
            tables.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["categs", "extra", "goods", "reviews"]
        );
        assert_eq!(tables["reviews"].len(), 8);
        assert_eq!(tables["goods"].columns, vec!["GoodNum", "GoodDesc", "ProductCatNum"]);
        assert_eq!(tables["extra"].rows, vec![vec![Value::Integer(7)]]);
    }

    #[test]
    fn test_from_tables_extracts_typed_rows() {
        let conn = Connection::open_in_memory().unwrap();
        seed_store(&conn);

        let dataset = Dataset::from_tables(&load_tables(&conn).unwrap()).unwrap();

        assert_eq!(dataset.reviews().len(), 8);
        assert_eq!(dataset.goods().len(), 4);
        assert_eq!(dataset.categories().len(), 2);
        // Time of day is dropped
        assert_eq!(
            dataset.reviews()[5].date,
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
        );
    }

    #[test]
    fn test_missing_table_is_fatal() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE reviews (GoodNum INTEGER, Rating INTEGER, Date TEXT);")
            .unwrap();

        let err = Dataset::from_tables(&load_tables(&conn).unwrap()).unwrap_err();

        assert!(matches!(err, InsightsError::MissingTable(ref t) if t == "goods"));
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE categs (ProductCatNum INTEGER, ProductCatDesc TEXT);
             CREATE TABLE goods (GoodNum INTEGER, GoodDesc TEXT, ProductCatNum INTEGER);
             CREATE TABLE reviews (GoodNum INTEGER, Score INTEGER, Date TEXT);",
        )
        .unwrap();

        let err = Dataset::from_tables(&load_tables(&conn).unwrap()).unwrap_err();

        match err {
            InsightsError::MissingColumn { table, column } => {
                assert_eq!(table, "reviews");
                assert_eq!(column, "Rating");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_date_is_fatal() {
        let conn = Connection::open_in_memory().unwrap();
        create_store(&conn);
        conn.execute_batch("INSERT INTO reviews VALUES (1, 4, '31/12/2024');")
            .unwrap();

        let err = Dataset::from_tables(&load_tables(&conn).unwrap()).unwrap_err();

        assert!(matches!(err, InsightsError::InvalidDate { row: 0, .. }));
    }

    #[test]
    fn test_non_integral_rating_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        create_store(&conn);
        conn.execute_batch("INSERT INTO reviews VALUES (1, 4.5, '2024-01-01');")
            .unwrap();

        let err = Dataset::from_tables(&load_tables(&conn).unwrap()).unwrap_err();

        assert!(matches!(
            err,
            InsightsError::InvalidValue { ref column, .. } if column == "Rating"
        ));
    }

    #[test]
    fn test_out_of_domain_rating_is_kept() {
        let conn = Connection::open_in_memory().unwrap();
        create_store(&conn);
        conn.execute_batch("INSERT INTO reviews VALUES (1, 42, '2024-01-01');")
            .unwrap();

        let dataset = Dataset::from_tables(&load_tables(&conn).unwrap()).unwrap();

        assert_eq!(dataset.reviews()[0].rating, Some(42));
    }

    #[test]
    fn test_null_keys_and_ratings_are_not_fatal() {
        let conn = Connection::open_in_memory().unwrap();
        seed_store(&conn);
        conn.execute_batch(
            "INSERT INTO goods VALUES (12, 'Loose', NULL);
             INSERT INTO reviews VALUES
                (NULL, 4, '2024-01-01'), (12, 3, '2024-01-04'), (10, NULL, '2024-01-03');",
        )
        .unwrap();

        let dataset = Dataset::from_tables(&load_tables(&conn).unwrap()).unwrap();

        assert_eq!(dataset.reviews().len(), 11);
        assert_eq!(dataset.reviews()[8].good_num, None);
        assert_eq!(dataset.reviews()[10].rating, None);
        assert_eq!(dataset.goods()[4].product_cat_num, None);

        // NULL GoodNum joins nothing; the uncategorised good still joins its review
        let products: Vec<&str> = dataset
            .product_reviews()
            .iter()
            .map(|(_, good)| good.good_desc.as_str())
            .collect();
        assert_eq!(products.iter().filter(|p| **p == "Loose").count(), 1);
        assert_eq!(dataset.product_reviews().len(), 9);
        assert!(dataset
            .category_reviews()
            .iter()
            .all(|(_, good, _)| good.good_desc != "Loose"));
    }

    #[test]
    fn test_null_goods_never_match_null_reviews() {
        let mut loose = good(1, "Loose", 100);
        loose.good_num = None;
        let mut unkeyed = review(1, 5, "2024-01-01");
        unkeyed.good_num = None;
        let mut blank = category(100, "Blank");
        blank.product_cat_num = None;
        let mut stray = good(2, "Stray", 100);
        stray.product_cat_num = None;

        let dataset = Dataset::new(
            vec![unkeyed, review(2, 4, "2024-01-01")],
            vec![loose, stray],
            vec![blank],
        );

        assert_eq!(dataset.product_reviews().len(), 1);
        assert!(dataset.category_reviews().is_empty());
    }

    #[test]
    fn test_huge_real_values_are_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        create_store(&conn);
        conn.execute_batch("INSERT INTO reviews VALUES (1, 1e300, '2024-01-01');")
            .unwrap();

        let err = Dataset::from_tables(&load_tables(&conn).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            InsightsError::InvalidValue { ref column, .. } if column == "Rating"
        ));

        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE categs (ProductCatNum REAL, ProductCatDesc TEXT);
             CREATE TABLE goods (GoodNum INTEGER, GoodDesc TEXT, ProductCatNum INTEGER);
             CREATE TABLE reviews (GoodNum INTEGER, Rating INTEGER, Date TEXT);
             INSERT INTO categs VALUES (-1e19, 'Far'), (7.0, 'Near');",
        )
        .unwrap();

        let err = Dataset::from_tables(&load_tables(&conn).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            InsightsError::InvalidValue { row: 0, ref column, .. } if column == "ProductCatNum"
        ));
    }

    #[test]
    fn test_integral_bounds() {
        assert_eq!(integral(7.0), Some(7));
        assert_eq!(integral(-9_223_372_036_854_775_808.0), Some(i64::MIN));
        assert_eq!(integral(9_223_372_036_854_775_808.0), None);
        assert_eq!(integral(1e300), None);
        assert_eq!(integral(f64::NAN), None);
        assert_eq!(integral(2.5), None);
    }

    #[test]
    fn test_open_dataset_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviews.db");
        {
            let conn = Connection::open(&path).unwrap();
            seed_store(&conn);
        }

        let dataset = open_dataset(&path).unwrap();

        assert_eq!(dataset.reviews().len(), 8);
    }

    #[test]
    fn test_open_dataset_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db");

        let err = open_dataset(&path).unwrap_err();

        assert!(matches!(err, InsightsError::StoreNotFound(_)));
    }

    #[test]
    fn test_joins_drop_orphans() {
        let dataset = Dataset::new(
            vec![
                review(1, 5, "2024-01-01"),
                review(2, 4, "2024-01-01"),
                review(3, 3, "2024-01-01"),
            ],
            vec![good(1, "A", 100), good(2, "B", 200)],
            vec![category(100, "Cat")],
        );

        // review for good 3 has no product
        assert_eq!(dataset.product_reviews().len(), 2);
        // good 2 has no category
        let by_category = dataset.category_reviews();
        assert_eq!(by_category.len(), 1);
        assert_eq!(by_category[0].2.product_cat_desc, "Cat");
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 7, 9).unwrap();

        assert_eq!(parse_date("2023-07-09"), Some(expected));
        assert_eq!(parse_date("2023-07-09 13:45:00"), Some(expected));
        assert_eq!(parse_date("2023-07-09T13:45:00.250"), Some(expected));
        assert_eq!(parse_date("09.07.2023"), None);
    }
}
