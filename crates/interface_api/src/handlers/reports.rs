//! Analytics, report and reconciliation handlers

use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};

use core_kernel::{DateRange, ReportId, TenantId};
use domain_reconciliation::{GeneratedReport, ReportFormat, ReportPeriod, ReportRequest};

use crate::auth::{permissions, require, Claims};
use crate::dto::reports::*;
use crate::dto::ApiResponse;
use crate::{error::ApiError, AppState};

pub async fn get_payment_analytics(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<ApiResponse<AnalyticsResponse>>, ApiError> {
    require(&claims, permissions::REPORT_READ)?;
    let period = DateRange::new(query.start_date, query.end_date)
        .map_err(|e| ApiError::Validation(vec![e.to_string()]))?;

    let analytics = state
        .reconciliation
        .analytics()
        .get_payment_analytics(claims.tenant_id, period)
        .await?;

    Ok(Json(ApiResponse::ok(AnalyticsResponse {
        period: ReportPeriod {
            start: query.start_date,
            end: query.end_date,
        },
        analytics,
    })))
}

/// Builds a report, stores the rendered artifact and returns its URL
pub async fn generate_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<ReportRequest>,
) -> Result<(StatusCode, Json<ApiResponse<GeneratedReport>>), ApiError> {
    require(&claims, permissions::REPORT_READ)?;
    let generated = state
        .reports
        .generate_payment_report(claims.tenant_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(generated))))
}

/// Serves a stored artifact, `RPT-<uuid>.<ext>`
pub async fn download_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((tenant, file_name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    require(&claims, permissions::REPORT_READ)?;
    let tenant_id = TenantId::from_str(&tenant)
        .map_err(|_| ApiError::BadRequest(format!("Invalid tenant id: {tenant}")))?;
    if tenant_id != claims.tenant_id {
        return Err(ApiError::NotFound(format!("Report {file_name} not found")));
    }

    let (stem, extension) = file_name
        .rsplit_once('.')
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid report file name: {file_name}")))?;
    let report_id = ReportId::from_str(stem)
        .map_err(|_| ApiError::BadRequest(format!("Invalid report id: {stem}")))?;
    let format = ReportFormat::from_str(extension)?;

    let artifact = state
        .reports
        .fetch_artifact(claims.tenant_id, report_id, format)
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", artifact.file_name()),
            ),
        ],
        artifact.content,
    )
        .into_response())
}

/// Reconciles one day and optionally repairs what can be repaired
pub async fn reconcile_payments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<ReconcileRequest>,
) -> Result<Json<ApiResponse<ReconciliationResponse>>, ApiError> {
    require(&claims, permissions::RECONCILE)?;
    let reconciliation = state
        .reconciliation
        .reconcile_payments(claims.tenant_id, request.date)
        .await?;

    let repair = if request.repair && !reconciliation.discrepancies.is_empty() {
        Some(state.reconciliation.repair_discrepancies(&reconciliation).await?)
    } else {
        None
    };

    Ok(Json(ApiResponse::ok(ReconciliationResponse { reconciliation, repair })))
}
