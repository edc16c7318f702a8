//! Claim-run DTOs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use core_kernel::MAX_AMOUNT;
use domain_claims::{AssessmentResult, Assumption, ClaimFacts, ClauseOverride, ScreeningResult};
use domain_coverage::{ClaimContext, CoverageScope, ItemType, LineItem};

use crate::pipeline::ClaimRunInput;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LineItemRequest {
    #[validate(length(min = 1, max = 500, message = "description must be 1-500 characters"))]
    pub description: String,
    pub item_type: ItemType,
    #[validate(length(max = 64))]
    pub item_code: Option<String>,
    #[validate(custom(function = "validate_line_amount"))]
    pub total_price: Decimal,
}

fn validate_line_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.abs() > MAX_AMOUNT {
        let mut error = ValidationError::new("amount_out_of_range");
        error.message = Some(format!("total_price must be within +/-{}", MAX_AMOUNT).into());
        return Err(error);
    }
    Ok(())
}

impl From<LineItemRequest> for LineItem {
    fn from(request: LineItemRequest) -> Self {
        LineItem {
            description: request.description,
            item_type: request.item_type,
            item_code: request.item_code.filter(|c| !c.trim().is_empty()),
            total_price: request.total_price,
        }
    }
}

/// Body of `POST /api/v1/claims/:claim_id/runs`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ExecuteRunRequest {
    /// Generated when absent
    #[validate(length(min = 1, max = 128))]
    pub run_id: Option<String>,
    #[validate(length(min = 1, message = "at least one line item is required"), nested)]
    pub line_items: Vec<LineItemRequest>,
    #[serde(default)]
    pub scope: CoverageScope,
    #[serde(default)]
    pub context: ClaimContext,
    #[serde(default)]
    pub facts: ClaimFacts,
    #[serde(default)]
    pub screening: Option<ScreeningResult>,
    #[serde(default)]
    pub assessment: Option<AssessmentResult>,
    #[serde(default)]
    pub assumptions: Vec<Assumption>,
    #[serde(default)]
    pub overrides: Vec<ClauseOverride>,
}

impl ExecuteRunRequest {
    pub fn into_input(self) -> ClaimRunInput {
        ClaimRunInput {
            line_items: self.line_items.into_iter().map(LineItem::from).collect(),
            scope: self.scope,
            context: self.context,
            facts: self.facts,
            screening: self.screening,
            assessment: self.assessment,
            assumptions: self.assumptions,
            overrides: self.overrides,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunsResponse {
    pub claim_id: String,
    pub runs: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DossierVersionsResponse {
    pub claim_id: String,
    pub run_id: String,
    pub versions: Vec<u32>,
    pub latest: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_line_items_rejected() {
        let request: ExecuteRunRequest = serde_json::from_value(serde_json::json!({
            "line_items": []
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_blank_description_rejected() {
        let request: ExecuteRunRequest = serde_json::from_value(serde_json::json!({
            "line_items": [{ "description": "", "item_type": "parts", "total_price": 10 }]
        }))
        .unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.errors().contains_key("line_items"));
    }

    #[test]
    fn test_out_of_range_price_rejected() {
        let huge = (MAX_AMOUNT + Decimal::ONE).to_string();
        let request: ExecuteRunRequest = serde_json::from_value(serde_json::json!({
            "line_items": [
                { "description": "Turbolader", "item_type": "parts", "total_price": huge },
                { "description": "Credit", "item_type": "other", "total_price": "-120.00" }
            ]
        }))
        .unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.errors().contains_key("line_items"));

        let at_limit = MAX_AMOUNT.to_string();
        let request: ExecuteRunRequest = serde_json::from_value(serde_json::json!({
            "line_items": [{ "description": "Turbolader", "item_type": "parts", "total_price": at_limit }]
        }))
        .unwrap();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_blank_item_code_dropped() {
        let request: ExecuteRunRequest = serde_json::from_value(serde_json::json!({
            "run_id": "run-7",
            "line_items": [{ "description": "Turbolader", "item_type": "parts", "item_code": " ", "total_price": "1800.00" }]
        }))
        .unwrap();
        assert!(request.validate().is_ok());
        let input = request.into_input();
        assert_eq!(input.line_items[0].item_code, None);
    }
}
