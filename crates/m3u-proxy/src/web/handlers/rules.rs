//! Data mapping rule, filter, and client detection rule handlers
//! (spec §6.1 rows 6-7, and the client-detection rows).

use std::collections::HashMap;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppResult;
use crate::gateway::HeaderDynamicContext;
use crate::models::{ClientDetectionRule, DataMappingRule, Filter, FilterMode, RuleDomain};
use crate::repositories::{ClientDetectionRuleRepository, Repository};
use crate::rules::{self, evaluate_predicate_only, EmptyRecord};
use crate::web::responses::Created;
use crate::web::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateDataMappingRuleRequest {
    pub name: String,
    pub source_type: RuleDomain,
    pub expression: String,
    pub priority: i32,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
}

fn default_true() -> bool {
    true
}

pub async fn create_data_mapping_rule(
    State(state): State<AppState>,
    Json(req): Json<CreateDataMappingRuleRequest>,
) -> AppResult<Created<DataMappingRule>> {
    rules::validate(req.source_type, &req.expression)?;

    let mut rule = DataMappingRule::new(req.name, req.source_type, req.expression, req.priority);
    rule.enabled = req.is_enabled;
    let saved = state.repos.put(rule).await?;
    Ok(Created(saved))
}

#[derive(Debug, Deserialize)]
pub struct CreateFilterRequest {
    pub name: String,
    pub source_type: RuleDomain,
    #[serde(default)]
    pub mode: FilterMode,
    pub expression: String,
    pub priority: i32,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
}

pub async fn create_filter(State(state): State<AppState>, Json(req): Json<CreateFilterRequest>) -> AppResult<Created<Filter>> {
    rules::validate(req.source_type, &req.expression)?;

    let mut filter = Filter::new(req.name, req.source_type, req.mode, req.expression, req.priority);
    filter.enabled = req.is_enabled;
    let saved = state.repos.put(filter).await?;
    Ok(Created(saved))
}

pub async fn list_client_detection_rules(State(state): State<AppState>) -> AppResult<Json<Vec<ClientDetectionRule>>> {
    Ok(Json(state.repos.list_enabled_by_priority().await?))
}

#[derive(Debug, Deserialize)]
pub struct TestClientDetectionRuleRequest {
    pub expression: String,
    pub user_agent: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct TestClientDetectionRuleResponse {
    pub matches: bool,
}

pub async fn test_client_detection_rule(Json(req): Json<TestClientDetectionRuleRequest>) -> AppResult<Json<TestClientDetectionRuleResponse>> {
    let expr = rules::validate(RuleDomain::ClientDetection, &req.expression)?;

    let mut headers: HashMap<String, String> = req.headers.into_iter().map(|(k, v)| (k.to_ascii_lowercase(), v)).collect();
    headers.insert("user-agent".to_string(), req.user_agent);

    let ctx = HeaderDynamicContext::new(&headers);
    let matches = evaluate_predicate_only(&expr, &EmptyRecord, &ctx);
    Ok(Json(TestClientDetectionRuleResponse { matches }))
}
