//! Descriptive statistics over the review table.

use crate::db::Dataset;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Number of reviews with one rating value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingCount {
    #[serde(rename = "Rating")]
    pub rating: i64,

    #[serde(rename = "Count")]
    pub count: usize,
}

/// Mean rating for one calendar month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyAverage {
    pub year: i32,
    pub month: u32,

    /// Last day of the month, used as the chart's x value
    #[serde(rename = "Date")]
    pub period: NaiveDate,

    #[serde(rename = "Rating")]
    pub average: f64,

    #[serde(rename = "Count")]
    pub count: usize,
}

/// Mean rating for one product display name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAverage {
    #[serde(rename = "GoodDesc")]
    pub product: String,

    #[serde(rename = "AvgRating")]
    pub avg_rating: f64,

    #[serde(rename = "Reviews")]
    pub reviews: usize,
}

/// Header numbers for the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub total_reviews: usize,
    pub total_goods: usize,
    pub total_categories: usize,
    /// NaN when there are no reviews
    pub mean_rating: f64,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

/// Review count per distinct rating, ascending.
/// Counts every rated review; no join is involved.
pub fn rating_distribution(dataset: &Dataset) -> Vec<RatingCount> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for rating in dataset.reviews().iter().filter_map(|r| r.rating) {
        *counts.entry(rating).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .map(|(rating, count)| RatingCount { rating, count })
        .collect()
}

/// Last calendar day of a month
fn month_end(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// Mean rating per month, chronological. Months without reviews are absent.
pub fn monthly_average(dataset: &Dataset) -> Vec<MonthlyAverage> {
    let mut months: BTreeMap<(i32, u32), (f64, usize)> = BTreeMap::new();
    for review in dataset.reviews() {
        if let Some(rating) = review.rating {
            let bucket = months
                .entry((review.date.year(), review.date.month()))
                .or_insert((0.0, 0));
            bucket.0 += rating as f64;
            bucket.1 += 1;
        }
    }

    let result: Vec<MonthlyAverage> = months
        .into_iter()
        .filter_map(|((year, month), (sum, count))| {
            Some(MonthlyAverage {
                year,
                month,
                period: month_end(year, month)?,
                average: sum / count as f64,
                count,
            })
        })
        .collect();

    debug!(months = result.len(), "computed monthly averages");
    result
}

/// Mean rating per product name, ascending by name.
/// Reviews without a product and products without reviews are excluded.
pub fn product_average_ratings(dataset: &Dataset) -> Vec<ProductAverage> {
    let mut products: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for (review, good) in dataset.product_reviews() {
        if let Some(rating) = review.rating {
            let bucket = products.entry(good.good_desc.as_str()).or_insert((0.0, 0));
            bucket.0 += rating as f64;
            bucket.1 += 1;
        }
    }

    products
        .into_iter()
        .map(|(product, (sum, count))| ProductAverage {
            product: product.to_string(),
            avg_rating: sum / count as f64,
            reviews: count,
        })
        .collect()
}

/// Highest `n` averages, descending. Ties keep input order.
pub fn top_rated(averages: &[ProductAverage], n: usize) -> Vec<ProductAverage> {
    let mut sorted = averages.to_vec();
    sorted.sort_by(|a, b| b.avg_rating.total_cmp(&a.avg_rating));
    sorted.truncate(n);
    sorted
}

/// Lowest `n` averages, ascending. Ties keep input order.
pub fn bottom_rated(averages: &[ProductAverage], n: usize) -> Vec<ProductAverage> {
    let mut sorted = averages.to_vec();
    sorted.sort_by(|a, b| a.avg_rating.total_cmp(&b.avg_rating));
    sorted.truncate(n);
    sorted
}

/// Dataset totals. `mean_rating` is over rated reviews and NaN when there are none.
pub fn summary(dataset: &Dataset) -> ReviewSummary {
    let reviews = dataset.reviews();
    let (total, rated) = reviews
        .iter()
        .filter_map(|r| r.rating)
        .fold((0.0, 0usize), |(sum, n), rating| (sum + rating as f64, n + 1));

    ReviewSummary {
        total_reviews: reviews.len(),
        total_goods: dataset.goods().len(),
        total_categories: dataset.categories().len(),
        mean_rating: if rated == 0 {
            f64::NAN
        } else {
            total / rated as f64
        },
        first_date: reviews.iter().map(|r| r.date).min(),
        last_date: reviews.iter().map(|r| r.date).max(),
    }
}
