//! Descriptive statistics and financial summaries.
//!
//! The remote Smart Python Executor is preferred when `SMART_EXECUTOR_URL` is
//! set. Any failure there, or no executor at all, falls back to the local
//! engine and the report is marked `source: "local"`.

use chrono::{DateTime, NaiveDate};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use thiserror::Error;

pub type DataRow = Map<String, Value>;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Executor request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Executor returned {0}")]
    Status(u16),

    #[error("Executor reported an error: {0}")]
    Executor(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticsSource {
    Remote,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsReport {
    pub analysis_type: String,
    pub results: Value,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default = "remote_source")]
    pub source: AnalyticsSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn remote_source() -> AnalyticsSource {
    AnalyticsSource::Remote
}

/// `None` where the statistic is undefined (e.g. std of a single value).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnStats {
    pub mean: f64,
    pub median: f64,
    pub std: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

/// Per-column stats keyed by column name, next to `correlation_matrix`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatisticalResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_matrix: Option<CorrelationMatrix>,
    #[serde(flatten)]
    pub columns: BTreeMap<String, ColumnStats>,
}

pub const NO_NUMERIC_COLUMNS: &str = "No numeric columns found for analysis";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoNumericColumns {
    pub available_columns: Vec<String>,
    pub numeric_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub amount: f64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategorySummary {
    pub sum: f64,
    pub count: usize,
    pub mean: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyTrends {
    pub periods: Vec<String>,
    pub amounts: Vec<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinancialResults {
    pub total_transactions: usize,
    pub date_range: DateRange,
    pub total_amount: f64,
    pub average_transaction: Option<f64>,
    pub largest_transaction: Option<f64>,
    pub smallest_transaction: Option<f64>,
    pub by_category: BTreeMap<String, CategorySummary>,
    pub monthly_trends: MonthlyTrends,
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn numeric_column(rows: &[DataRow], column: &str) -> Vec<f64> {
    rows.iter()
        .filter_map(|row| row.get(column).and_then(Value::as_f64))
        .collect()
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Summary of one column. Skewness and excess kurtosis are the biased
/// moment estimators; std is the sample standard deviation.
pub fn column_stats(values: &[f64]) -> Option<ColumnStats> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;

    let moment = |k: i32| values.iter().map(|v| (v - mean).powi(k)).sum::<f64>() / n;
    let (m2, m3, m4) = (moment(2), moment(3), moment(4));

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let sample_var = if values.len() > 1 { m2 * n / (n - 1.0) } else { f64::NAN };

    Some(ColumnStats {
        mean,
        median: median(&sorted),
        std: finite(sample_var.sqrt()),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        skewness: finite(m3 / m2.powf(1.5)),
        kurtosis: finite(m4 / (m2 * m2) - 3.0),
        count: values.len(),
    })
}

/// Pearson correlation over the rows where both columns are numeric.
pub fn pearson(rows: &[DataRow], a: &str, b: &str) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = rows
        .iter()
        .filter_map(|row| Some((row.get(a)?.as_f64()?, row.get(b)?.as_f64()?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    finite(cov / (var_a * var_b).sqrt())
}

fn column_names(rows: &[DataRow], numeric_only: bool) -> Vec<String> {
    let names: BTreeSet<&String> = rows
        .iter()
        .flat_map(|row| row.iter())
        .filter(|(_, v)| !numeric_only || v.is_number())
        .map(|(k, _)| k)
        .collect();
    names.into_iter().cloned().collect()
}

/// Stats for the requested columns that hold numbers. Errors when none do.
pub fn statistical_summary(rows: &[DataRow], columns: &[String]) -> Result<StatisticalResults, NoNumericColumns> {
    let mut stats = BTreeMap::new();
    let mut analysed = Vec::new();
    for column in columns {
        if let Some(summary) = column_stats(&numeric_column(rows, column)) {
            stats.insert(column.clone(), summary);
            analysed.push(column.clone());
        }
    }
    if analysed.is_empty() {
        return Err(NoNumericColumns {
            available_columns: column_names(rows, false),
            numeric_columns: column_names(rows, true),
        });
    }

    let correlation_matrix = (analysed.len() > 1).then(|| CorrelationMatrix {
        values: analysed
            .iter()
            .map(|a| analysed.iter().map(|b| pearson(rows, a, b)).collect())
            .collect(),
        columns: analysed,
    });

    Ok(StatisticalResults {
        columns: stats,
        correlation_matrix,
    })
}

/// Calendar date of an RFC 3339 timestamp or a `YYYY-MM-DD` date.
fn date_of(date: &str) -> Option<NaiveDate> {
    let date = date.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(date) {
        return Some(ts.date_naive());
    }
    NaiveDate::parse_from_str(date.get(..10).unwrap_or(date), "%Y-%m-%d").ok()
}

pub fn financial_summary(transactions: &[Transaction]) -> FinancialResults {
    let amounts: Vec<f64> = transactions.iter().map(|t| t.amount).collect();
    let total: f64 = amounts.iter().sum();

    let mut by_category: BTreeMap<String, CategorySummary> = BTreeMap::new();
    for t in transactions {
        if let Some(category) = &t.category {
            let entry = by_category.entry(category.clone()).or_insert(CategorySummary {
                sum: 0.0,
                count: 0,
                mean: 0.0,
            });
            entry.sum += t.amount;
            entry.count += 1;
            entry.mean = entry.sum / entry.count as f64;
        }
    }

    let mut monthly: BTreeMap<String, f64> = BTreeMap::new();
    let mut dates = Vec::new();
    for t in transactions {
        if let Some(date) = t.date.as_deref().and_then(date_of) {
            *monthly.entry(date.format("%Y-%m").to_string()).or_default() += t.amount;
            dates.push(date);
        }
    }
    let day = |d: NaiveDate| d.format("%Y-%m-%d").to_string();

    FinancialResults {
        total_transactions: transactions.len(),
        date_range: DateRange {
            start: dates.iter().min().copied().map(day),
            end: dates.iter().max().copied().map(day),
        },
        total_amount: total,
        average_transaction: (!amounts.is_empty()).then(|| total / amounts.len() as f64),
        largest_transaction: amounts.iter().copied().reduce(f64::max),
        smallest_transaction: amounts.iter().copied().reduce(f64::min),
        by_category,
        monthly_trends: MonthlyTrends {
            periods: monthly.keys().cloned().collect(),
            amounts: monthly.values().copied().collect(),
        },
    }
}

#[derive(Clone)]
pub struct AnalyticsEngine {
    http: reqwest::Client,
    executor_url: Option<String>,
}

impl AnalyticsEngine {
    const TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(executor_url: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Self::TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            executor_url: executor_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    pub fn local() -> Self {
        Self::new(None)
    }

    async fn remote(&self, url: &str, payload: Value) -> Result<AnalyticsReport, AnalyticsError> {
        let response = self.http.post(format!("{}/execute", url)).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(AnalyticsError::Status(response.status().as_u16()));
        }
        let body: Value = response.json().await?;
        if let Some(error) = body.get("error").and_then(Value::as_str) {
            return Err(AnalyticsError::Executor(error.to_string()));
        }
        serde_json::from_value(body).map_err(|e| AnalyticsError::Executor(e.to_string()))
    }

    async fn run<F>(&self, payload: Value, local: F) -> AnalyticsReport
    where
        F: FnOnce() -> AnalyticsReport,
    {
        if let Some(url) = &self.executor_url {
            match self.remote(url, payload).await {
                Ok(mut report) => {
                    report.source = AnalyticsSource::Remote;
                    return report;
                }
                Err(e) => warn!("Smart executor unavailable, computing locally: {}", e),
            }
        }
        local()
    }

    pub async fn statistical(&self, rows: Vec<DataRow>, columns: Vec<String>) -> AnalyticsReport {
        let payload = json!({
            "analysis_type": "statistical",
            "data": rows,
            "columns": columns,
        });

        self.run(payload, || match statistical_summary(&rows, &columns) {
            Ok(results) => {
                info!("Computed local statistics for {} columns", results.columns.len());
                AnalyticsReport {
                    analysis_type: "statistical".to_string(),
                    insights: vec![
                        format!("Analyzed {} numeric variables", results.columns.len()),
                        format!("Dataset contains {} rows", rows.len()),
                    ],
                    results: serde_json::to_value(&results).unwrap_or(Value::Null),
                    recommendations: Vec::new(),
                    source: AnalyticsSource::Local,
                    error: None,
                }
            }
            Err(missing) => {
                warn!("No numeric columns among {:?}", columns);
                AnalyticsReport {
                    analysis_type: "statistical".to_string(),
                    results: serde_json::to_value(&missing).unwrap_or(Value::Null),
                    insights: Vec::new(),
                    recommendations: Vec::new(),
                    source: AnalyticsSource::Local,
                    error: Some(NO_NUMERIC_COLUMNS.to_string()),
                }
            }
        })
        .await
    }

    pub async fn financial(&self, transactions: Vec<Transaction>) -> AnalyticsReport {
        let payload = json!({
            "analysis_type": "financial",
            "data": transactions,
        });

        self.run(payload, || {
            let results = financial_summary(&transactions);
            AnalyticsReport {
                analysis_type: "financial".to_string(),
                insights: vec![
                    format!("Processed {} financial transactions", results.total_transactions),
                    format!("Total value: {:.2}", results.total_amount),
                ],
                recommendations: vec![
                    "Review largest transactions for accuracy".to_string(),
                    "Monitor monthly spending trends".to_string(),
                ],
                results: serde_json::to_value(&results).unwrap_or(Value::Null),
                source: AnalyticsSource::Local,
                error: None,
            }
        })
        .await
    }
}
