// Rating-Change Analyzer
//
// Per entity (product or category display name):
//   daily average  = mean rating of all reviews on one date
//   running mean   = cumulative mean of daily averages, date ascending
//   range / ratio  = max and min of the running means
//   change / ratio = last and first running means

use crate::db::Dataset;
use chrono::NaiveDate;
use serde::ser::{SerializeMap, SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Grouping level for trend statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Product,
    Category,
}

impl Granularity {
    /// Size of the improving/declining slices shown on the dashboard
    pub fn default_slice(self) -> usize {
        match self {
            Granularity::Product => 5,
            Granularity::Category => 3,
        }
    }

    /// Column name of the entity key in result tables
    pub fn key_column(self) -> &'static str {
        match self {
            Granularity::Product => "Product",
            Granularity::Category => "Category",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            Granularity::Product => "products",
            Granularity::Category => "categories",
        }
    }
}

/// Trend statistics for one entity.
///
/// Ratios with a zero denominator are `f64::NAN` (JSON `null`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingTrend {
    #[serde(rename = "Key")]
    pub key: String,

    #[serde(rename = "RatingRange")]
    pub rating_range: f64,

    #[serde(rename = "RatingRatio")]
    pub rating_ratio: f64,

    #[serde(rename = "RatingChange")]
    pub rating_change: f64,

    #[serde(rename = "RatingChangeRatio")]
    pub rating_change_ratio: f64,

    /// First running mean (earliest date)
    #[serde(rename = "FirstAvg")]
    pub first_avg: f64,

    /// Last running mean (latest date)
    #[serde(rename = "LastAvg")]
    pub last_avg: f64,

    /// Number of distinct review dates
    #[serde(rename = "Days")]
    pub days: usize,
}

impl RatingTrend {
    /// View that serialises the key under `Product` / `Category`
    pub fn keyed(&self, granularity: Granularity) -> KeyedTrend<'_> {
        KeyedTrend {
            granularity,
            trend: self,
        }
    }
}

/// A trend whose key column is named after its granularity, matching the
/// dashboard result tables.
#[derive(Debug, Clone, Copy)]
pub struct KeyedTrend<'a> {
    pub granularity: Granularity,
    pub trend: &'a RatingTrend,
}

impl Serialize for KeyedTrend<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let t = self.trend;
        let mut map = serializer.serialize_map(Some(8))?;
        map.serialize_entry(self.granularity.key_column(), &t.key)?;
        map.serialize_entry("RatingRange", &t.rating_range)?;
        map.serialize_entry("RatingRatio", &t.rating_ratio)?;
        map.serialize_entry("RatingChange", &t.rating_change)?;
        map.serialize_entry("RatingChangeRatio", &t.rating_change_ratio)?;
        map.serialize_entry("FirstAvg", &t.first_avg)?;
        map.serialize_entry("LastAvg", &t.last_avg)?;
        map.serialize_entry("Days", &t.days)?;
        map.end()
    }
}

/// `numerator / denominator`, or NaN when the denominator is zero
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        f64::NAN
    } else {
        numerator / denominator
    }
}

/// Cumulative mean at every step of an ordered sequence
pub fn running_averages(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .scan((0.0_f64, 0_usize), |(sum, count), &value| {
            *sum += value;
            *count += 1;
            Some(*sum / *count as f64)
        })
        .collect()
}

/// Build a trend from date-ordered daily averages. `None` for an empty sequence.
pub fn trend_from_daily(key: &str, daily: &[f64]) -> Option<RatingTrend> {
    let running = running_averages(daily);
    let (&first_avg, &last_avg) = (running.first()?, running.last()?);

    let (min, max) = running
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    Some(RatingTrend {
        key: key.to_string(),
        rating_range: max - min,
        rating_ratio: safe_ratio(max, min),
        rating_change: last_avg - first_avg,
        rating_change_ratio: safe_ratio(last_avg, first_avg),
        first_avg,
        last_avg,
        days: daily.len(),
    })
}

/// (sum, count) per entity per date; both levels ordered.
/// Sums are f64 so arbitrarily large ratings cannot overflow.
type DailyBuckets<'a> = BTreeMap<&'a str, BTreeMap<NaiveDate, (f64, usize)>>;

fn daily_buckets(dataset: &Dataset, granularity: Granularity) -> DailyBuckets<'_> {
    // Unrated reviews join but carry nothing to average
    let events: Vec<(&str, NaiveDate, i64)> = match granularity {
        Granularity::Product => dataset
            .product_reviews()
            .into_iter()
            .filter_map(|(review, good)| {
                Some((good.good_desc.as_str(), review.date, review.rating?))
            })
            .collect(),
        Granularity::Category => dataset
            .category_reviews()
            .into_iter()
            .filter_map(|(review, _, category)| {
                Some((category.product_cat_desc.as_str(), review.date, review.rating?))
            })
            .collect(),
    };

    let mut buckets: DailyBuckets = BTreeMap::new();
    for (key, date, rating) in events {
        let bucket = buckets
            .entry(key)
            .or_default()
            .entry(date)
            .or_insert((0.0, 0));
        bucket.0 += rating as f64;
        bucket.1 += 1;
    }

    buckets
}

fn daily_series(days: &BTreeMap<NaiveDate, (f64, usize)>) -> Vec<f64> {
    days.values()
        .map(|&(sum, count)| sum / count as f64)
        .collect()
}

/// Trend statistics for every entity, sorted by `rating_change` descending.
///
/// The sort is stable over entities in ascending key order, so equal
/// changes keep alphabetical order.
pub fn rating_trends(dataset: &Dataset, granularity: Granularity) -> Vec<RatingTrend> {
    let buckets = daily_buckets(dataset, granularity);

    let mut trends: Vec<RatingTrend> = buckets
        .iter()
        .filter_map(|(key, days)| trend_from_daily(key, &daily_series(days)))
        .collect();

    trends.sort_by(|a, b| b.rating_change.total_cmp(&a.rating_change));

    debug!(
        granularity = granularity.plural(),
        entities = trends.len(),
        "computed rating trends"
    );
    trends
}

/// Trend for a single entity by display name
pub fn trend_for(dataset: &Dataset, granularity: Granularity, key: &str) -> Option<RatingTrend> {
    let buckets = daily_buckets(dataset, granularity);
    buckets
        .get(key)
        .and_then(|days| trend_from_daily(key, &daily_series(days)))
}

/// Top improving and top declining entities.
/// Entries serialise through [`KeyedTrend`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrendRanking {
    pub granularity: Granularity,

    /// First `n` by change, descending
    pub improving: Vec<RatingTrend>,

    /// Last `n` by change, re-sorted ascending
    pub declining: Vec<RatingTrend>,
}

impl TrendRanking {
    /// Slice an already-sorted trend list. Short lists are returned whole
    /// on both sides, unpadded.
    pub fn from_trends(granularity: Granularity, trends: &[RatingTrend], n: usize) -> Self {
        let improving = trends.iter().take(n).cloned().collect();

        let mut declining = trends[trends.len().saturating_sub(n)..].to_vec();
        declining.sort_by(|a, b| a.rating_change.total_cmp(&b.rating_change));

        Self {
            granularity,
            improving,
            declining,
        }
    }

    fn keyed<'a>(&self, trends: &'a [RatingTrend]) -> Vec<KeyedTrend<'a>> {
        trends.iter().map(|t| t.keyed(self.granularity)).collect()
    }
}

impl Serialize for TrendRanking {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("TrendRanking", 3)?;
        state.serialize_field("granularity", &self.granularity)?;
        state.serialize_field("improving", &self.keyed(&self.improving))?;
        state.serialize_field("declining", &self.keyed(&self.declining))?;
        state.end()
    }
}

/// Compute and slice trends in one step
pub fn rank(dataset: &Dataset, granularity: Granularity, n: usize) -> TrendRanking {
    let trends = rating_trends(dataset, granularity);
    TrendRanking::from_trends(granularity, &trends, n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures::{category, good, review};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn dataset_with_products(n: i64) -> Dataset {
        // product i rises by i-ish points over two days; spread across +/- changes
        let mut reviews = Vec::new();
        let mut goods = Vec::new();
        for i in 0..n {
            goods.push(good(i, &format!("P{:02}", i), i % 3));
            reviews.push(review(i, 3, "2024-01-01"));
            reviews.push(review(i, 1 + (i % 5), "2024-01-02"));
        }
        Dataset::new(
            reviews,
            goods,
            vec![category(0, "C0"), category(1, "C1"), category(2, "C2")],
        )
    }

    #[test]
    fn test_running_averages() {
        assert_eq!(running_averages(&[5.0, 3.0, 4.0]), vec![5.0, 4.0, 4.0]);
        assert!(running_averages(&[]).is_empty());
    }

    #[test]
    fn test_single_product_scenario() {
        let dataset = Dataset::new(
            vec![
                review(1, 5, "2024-01-01"),
                review(1, 3, "2024-01-02"),
                review(1, 4, "2024-01-03"),
            ],
            vec![good(1, "Kettle", 1)],
            vec![category(1, "Kitchen")],
        );

        let trends = rating_trends(&dataset, Granularity::Product);

        assert_eq!(trends.len(), 1);
        let t = &trends[0];
        assert_eq!(t.key, "Kettle");
        assert!(approx(t.first_avg, 5.0));
        assert!(approx(t.last_avg, 4.0));
        assert!(approx(t.rating_range, 1.0));
        assert!(approx(t.rating_ratio, 1.25));
        assert!(approx(t.rating_change, -1.0));
        assert!(approx(t.rating_change_ratio, 0.8));
        assert_eq!(t.days, 3);
    }

    #[test]
    fn test_same_day_reviews_collapse_to_daily_average() {
        // day 1: (5 + 1) / 2 = 3, day 2: 5 -> running [3, 4]
        let dataset = Dataset::new(
            vec![
                review(1, 5, "2024-01-01"),
                review(1, 1, "2024-01-01"),
                review(1, 5, "2024-01-02"),
            ],
            vec![good(1, "Kettle", 1)],
            vec![],
        );

        let t = &rating_trends(&dataset, Granularity::Product)[0];

        assert!(approx(t.first_avg, 3.0));
        assert!(approx(t.last_avg, 4.0));
        assert!(approx(t.rating_change, 1.0));
        assert_eq!(t.days, 2);
    }

    #[test]
    fn test_dates_are_ordered_regardless_of_row_order() {
        let dataset = Dataset::new(
            vec![
                review(1, 4, "2024-01-03"),
                review(1, 5, "2024-01-01"),
                review(1, 3, "2024-01-02"),
            ],
            vec![good(1, "Kettle", 1)],
            vec![],
        );

        let t = &rating_trends(&dataset, Granularity::Product)[0];

        assert!(approx(t.rating_change, -1.0));
    }

    #[test]
    fn test_single_date_entity_is_flat() {
        let dataset = Dataset::new(
            vec![review(1, 4, "2024-01-01"), review(1, 2, "2024-01-01")],
            vec![good(1, "Kettle", 1)],
            vec![],
        );

        let t = &rating_trends(&dataset, Granularity::Product)[0];

        assert_eq!(t.rating_range, 0.0);
        assert_eq!(t.rating_ratio, 1.0);
        assert_eq!(t.rating_change, 0.0);
        assert_eq!(t.rating_change_ratio, 1.0);
    }

    #[test]
    fn test_zero_first_average_yields_nan_ratio() {
        let dataset = Dataset::new(
            vec![review(1, 0, "2024-01-01"), review(1, 4, "2024-01-02")],
            vec![good(1, "Kettle", 1)],
            vec![],
        );

        let t = &rating_trends(&dataset, Granularity::Product)[0];

        assert!(approx(t.rating_change, 2.0));
        assert!(t.rating_change_ratio.is_nan());
        assert!(t.rating_ratio.is_nan());

        let json = serde_json::to_value(t).unwrap();
        assert!(json["RatingChangeRatio"].is_null());
    }

    #[test]
    fn test_category_average_is_over_reviews_not_products() {
        // Same category, same day: product A has 1 review of 5, B has 3 reviews of 1.
        // Pooled mean = 8 / 4 = 2; mean of product means would be 3.
        let dataset = Dataset::new(
            vec![
                review(1, 5, "2024-01-01"),
                review(2, 1, "2024-01-01"),
                review(2, 1, "2024-01-01"),
                review(2, 1, "2024-01-01"),
                review(1, 4, "2024-01-02"),
            ],
            vec![good(1, "A", 7), good(2, "B", 7)],
            vec![category(7, "Kitchen")],
        );

        let t = &rating_trends(&dataset, Granularity::Category)[0];

        assert_eq!(t.key, "Kitchen");
        assert!(approx(t.first_avg, 2.0));
        // running mean of [2, 4]
        assert!(approx(t.last_avg, 3.0));
    }

    #[test]
    fn test_products_without_reviews_are_absent() {
        let dataset = Dataset::new(
            vec![review(1, 5, "2024-01-01")],
            vec![good(1, "Reviewed", 1), good(2, "Silent", 1)],
            vec![category(1, "Kitchen")],
        );

        let trends = rating_trends(&dataset, Granularity::Product);

        assert_eq!(trends.len(), 1);
        assert!(trends.iter().all(|t| t.key != "Silent"));
    }

    #[test]
    fn test_uncategorised_products_skip_category_trends() {
        let dataset = Dataset::new(
            vec![review(1, 5, "2024-01-01"), review(2, 3, "2024-01-01")],
            vec![good(1, "A", 1), good(2, "B", 404)],
            vec![category(1, "Kitchen")],
        );

        assert_eq!(rating_trends(&dataset, Granularity::Product).len(), 2);
        assert_eq!(rating_trends(&dataset, Granularity::Category).len(), 1);
    }

    #[test]
    fn test_null_category_keeps_product_trend() {
        let mut loose = good(2, "Loose", 1);
        loose.product_cat_num = None;
        let dataset = Dataset::new(
            vec![review(1, 5, "2024-01-01"), review(2, 3, "2024-01-02")],
            vec![good(1, "A", 1), loose],
            vec![category(1, "Kitchen")],
        );

        let products = rating_trends(&dataset, Granularity::Product);
        assert!(products.iter().any(|t| t.key == "Loose"));

        let categories = rating_trends(&dataset, Granularity::Category);
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].days, 1);
    }

    #[test]
    fn test_unrated_reviews_are_skipped() {
        let mut unrated = review(1, 0, "2024-01-02");
        unrated.rating = None;
        let dataset = Dataset::new(
            vec![review(1, 4, "2024-01-01"), unrated, review(1, 2, "2024-01-03")],
            vec![good(1, "Kettle", 1)],
            vec![category(1, "Kitchen")],
        );

        let t = &rating_trends(&dataset, Granularity::Product)[0];

        assert_eq!(t.days, 2);
        assert!(approx(t.last_avg, 3.0));
    }

    #[test]
    fn test_huge_ratings_do_not_overflow() {
        let dataset = Dataset::new(
            vec![
                review(1, i64::MAX, "2024-01-01"),
                review(1, i64::MAX, "2024-01-01"),
                review(2, i64::MIN, "2024-01-01"),
                review(2, i64::MIN, "2024-01-02"),
            ],
            vec![good(1, "Big", 1), good(2, "Small", 1)],
            vec![category(1, "Kitchen")],
        );

        let products = rating_trends(&dataset, Granularity::Product);
        let big = products.iter().find(|t| t.key == "Big").unwrap();
        assert_eq!(big.first_avg, i64::MAX as f64);
        assert_eq!(big.rating_change, 0.0);

        let categories = rating_trends(&dataset, Granularity::Category);
        assert_eq!(categories[0].days, 2);
        assert!(categories[0].first_avg.is_finite());
    }

    #[test]
    fn test_trends_sorted_by_change_descending() {
        let dataset = dataset_with_products(12);

        let trends = rating_trends(&dataset, Granularity::Product);

        assert!(trends
            .windows(2)
            .all(|w| w[0].rating_change >= w[1].rating_change));
    }

    #[test]
    fn test_equal_changes_keep_key_order() {
        let dataset = dataset_with_products(12);

        let trends = rating_trends(&dataset, Granularity::Product);

        for w in trends.windows(2) {
            if w[0].rating_change == w[1].rating_change {
                assert!(w[0].key < w[1].key, "{} before {}", w[0].key, w[1].key);
            }
        }
    }

    #[test]
    fn test_range_and_sign_properties() {
        let dataset = dataset_with_products(12);

        for t in rating_trends(&dataset, Granularity::Product) {
            assert!(t.rating_range >= 0.0);
            if t.first_avg > 0.0 {
                let ratio_sign = (t.rating_change_ratio - 1.0).signum();
                if t.rating_change != 0.0 {
                    assert_eq!(ratio_sign, t.rating_change.signum(), "{}", t.key);
                }
            }
        }
    }

    #[test]
    fn test_ranking_top_and_bottom_do_not_overlap() {
        let dataset = dataset_with_products(12);

        let ranking = rank(&dataset, Granularity::Product, 5);

        assert_eq!(ranking.improving.len(), 5);
        assert_eq!(ranking.declining.len(), 5);

        let top_min = ranking
            .improving
            .iter()
            .map(|t| t.rating_change)
            .fold(f64::INFINITY, f64::min);
        let bottom_max = ranking
            .declining
            .iter()
            .map(|t| t.rating_change)
            .fold(f64::NEG_INFINITY, f64::max);
        assert!(top_min >= bottom_max);

        // declining is shown ascending
        assert!(ranking
            .declining
            .windows(2)
            .all(|w| w[0].rating_change <= w[1].rating_change));
    }

    #[test]
    fn test_ranking_short_list_returns_everything() {
        let dataset = dataset_with_products(3);

        let ranking = rank(&dataset, Granularity::Product, 5);

        assert_eq!(ranking.improving.len(), 3);
        assert_eq!(ranking.declining.len(), 3);
    }

    #[test]
    fn test_ranking_empty_dataset() {
        let ranking = rank(&Dataset::default(), Granularity::Category, 3);

        assert!(ranking.improving.is_empty());
        assert!(ranking.declining.is_empty());
    }

    #[test]
    fn test_trend_for_matches_full_computation() {
        let dataset = dataset_with_products(6);
        let trends = rating_trends(&dataset, Granularity::Product);

        let single = trend_for(&dataset, Granularity::Product, "P03").unwrap();

        let from_list = trends.iter().find(|t| t.key == "P03").unwrap();
        assert_eq!(&single, from_list);
        assert!(trend_for(&dataset, Granularity::Product, "missing").is_none());
    }

    #[test]
    fn test_rerun_is_identical() {
        let dataset = dataset_with_products(9);

        let first = serde_json::to_string(&rank(&dataset, Granularity::Category, 3)).unwrap();
        let second = serde_json::to_string(&rank(&dataset, Granularity::Category, 3)).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_ranking_json_uses_key_column() {
        let dataset = dataset_with_products(4);

        let products = serde_json::to_value(rank(&dataset, Granularity::Product, 2)).unwrap();
        let categories = serde_json::to_value(rank(&dataset, Granularity::Category, 2)).unwrap();

        assert_eq!(products["granularity"], "product");
        let first = &products["improving"][0];
        assert!(first["Product"].is_string());
        assert!(first.get("Key").is_none());
        assert!(first["RatingChange"].is_number());
        assert!(categories["declining"][0]["Category"].is_string());

        let t = rating_trends(&dataset, Granularity::Category).remove(0);
        let single = serde_json::to_value(t.keyed(Granularity::Category)).unwrap();
        assert_eq!(single["Category"], t.key);
    }
}
