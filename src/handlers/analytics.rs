use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::Value;

use super::JsonBody;
use crate::analytics_service::{AnalyticsReport, DataRow, Transaction};
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const MAX_ROWS: usize = 10_000;

#[derive(Debug, Deserialize)]
pub struct StatisticalRequest {
    pub data: Vec<DataRow>,
    #[serde(default)]
    pub columns: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct FinancialRequest {
    pub transactions: Vec<Transaction>,
}

/// Columns holding a number in the first row, in key order.
fn numeric_columns(rows: &[DataRow]) -> Vec<String> {
    rows.first()
        .map(|row| {
            row.iter()
                .filter(|(_, v)| matches!(v, Value::Number(_)))
                .map(|(k, _)| k.clone())
                .collect()
        })
        .unwrap_or_default()
}

fn check_size(len: usize) -> ApiResult<()> {
    if len == 0 {
        return Err(ApiError::InvalidRequest("at least one row is required".to_string()));
    }
    if len > MAX_ROWS {
        return Err(ApiError::InvalidRequest(format!("at most {} rows are accepted", MAX_ROWS)));
    }
    Ok(())
}

pub async fn statistical(
    State(state): State<AppState>,
    _user: AuthUser,
    JsonBody(request): JsonBody<StatisticalRequest>,
) -> ApiResult<Json<AnalyticsReport>> {
    check_size(request.data.len())?;
    let columns = if request.columns.is_empty() {
        numeric_columns(&request.data)
    } else {
        request.columns
    };
    let report = state.analytics.statistical(request.data, columns).await;
    if let Some(error) = &report.error {
        let available = report.results["available_columns"]
            .as_array()
            .map(|cols| cols.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(", "))
            .unwrap_or_default();
        return Err(ApiError::InvalidRequest(format!("{} (available columns: {})", error, available)));
    }
    Ok(Json(report))
}

pub async fn financial(
    State(state): State<AppState>,
    _user: AuthUser,
    JsonBody(request): JsonBody<FinancialRequest>,
) -> ApiResult<Json<AnalyticsReport>> {
    check_size(request.transactions.len())?;
    Ok(Json(state.analytics.financial(request.transactions).await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn infers_numeric_columns_from_first_row() {
        let rows: Vec<DataRow> = serde_json::from_value(json!([
            { "name": "a", "score": 1.5, "count": 3, "flag": true }
        ]))
        .unwrap();
        assert_eq!(numeric_columns(&rows), vec!["count".to_string(), "score".to_string()]);
        assert!(numeric_columns(&[]).is_empty());
    }

    #[test]
    fn row_count_is_bounded() {
        assert!(check_size(0).is_err());
        assert!(check_size(1).is_ok());
        assert!(check_size(MAX_ROWS + 1).is_err());
    }
}
