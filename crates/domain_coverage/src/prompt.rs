//! Request building and response parsing for the generative stages

use serde::Deserialize;
use std::fmt::Write;

use crate::error::CoverageError;
use crate::line_item::{LineItem, LineItemCoverage};
use crate::model_port::{GenerativeRequest, RequestPurpose};
use crate::scope::{ClaimContext, CoverageScope};

const CLASSIFICATION_SYSTEM: &str = "You adjudicate motor vehicle repair invoices against a \
warranty policy. Decide whether a single invoice line is covered. Answer with one JSON object \
inside a ```json block with the fields is_covered (bool), category (string or null), \
matched_component (string or null), confidence (0..1) and reasoning (string).";

const LINKAGE_SYSTEM: &str = "You review labor lines on a motor vehicle repair invoice. For each \
labor line decide whether it was necessary to install or repair one of the listed parts. Answer \
with one JSON object inside a ```json block: {\"links\": [{\"index\": int, \"necessary\": bool, \
\"linked_part_index\": int or null, \"rationale\": string}]}.";

/// Model opinion on a single line item
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ItemVerdict {
    pub is_covered: bool,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub matched_component: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

/// Model opinion on one labor line in a linkage batch
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LaborLink {
    pub index: usize,
    pub necessary: bool,
    #[serde(default)]
    pub linked_part_index: Option<usize>,
    #[serde(default)]
    pub rationale: String,
}

pub fn classification_request(
    item: &LineItem,
    scope: &CoverageScope,
    context: &ClaimContext,
    temperature: f32,
    max_tokens: u32,
) -> GenerativeRequest {
    let mut prompt = String::new();

    let _ = writeln!(prompt, "## Invoice line");
    let _ = writeln!(prompt, "description: {}", item.description);
    let _ = writeln!(prompt, "type: {}", item.item_type);
    if let Some(code) = &item.item_code {
        let _ = writeln!(prompt, "code: {}", code);
    }
    let _ = writeln!(prompt, "price: {}", item.total_price);

    write_scope(&mut prompt, scope);

    if let Some(primary) = &context.primary_repair {
        let _ = writeln!(prompt, "\n## Primary repair");
        let _ = writeln!(
            prompt,
            "{} (category: {}, covered: {})",
            primary.description,
            primary.category.as_deref().unwrap_or("unknown"),
            primary.is_covered
        );
    }

    if !context.already_covered_parts.is_empty() {
        let _ = writeln!(prompt, "\n## Parts already covered on this claim");
        for part in &context.already_covered_parts {
            let _ = writeln!(
                prompt,
                "- {} ({})",
                part.description,
                part.component.as_deref().or(part.category.as_deref()).unwrap_or("-")
            );
        }
    }

    GenerativeRequest {
        purpose: RequestPurpose::ItemClassification,
        system: CLASSIFICATION_SYSTEM.to_string(),
        prompt,
        temperature,
        max_tokens,
    }
}

/// Builds one request covering every labor candidate
///
/// `candidates` and `parts` carry original item indices so the response can
/// be mapped back without relying on order.
pub fn labor_linkage_request(
    candidates: &[(usize, &LineItemCoverage)],
    parts: &[(usize, &LineItemCoverage)],
    context: &ClaimContext,
    temperature: f32,
    max_tokens: u32,
) -> GenerativeRequest {
    let mut prompt = String::new();

    if let Some(primary) = &context.primary_repair {
        let _ = writeln!(prompt, "## Primary repair\n{}", primary.description);
    }

    let _ = writeln!(prompt, "\n## Parts");
    for (index, part) in parts {
        let _ = writeln!(
            prompt,
            "[{}] {} | code: {} | status: {}",
            index,
            part.item.description,
            part.item.item_code.as_deref().unwrap_or("-"),
            part.status()
        );
    }

    let _ = writeln!(prompt, "\n## Labor lines");
    for (index, labor) in candidates {
        let _ = writeln!(
            prompt,
            "[{}] {} | price: {}",
            index, labor.item.description, labor.item.total_price
        );
    }

    GenerativeRequest {
        purpose: RequestPurpose::LaborLinkage,
        system: LINKAGE_SYSTEM.to_string(),
        prompt,
        temperature,
        max_tokens,
    }
}

fn write_scope(prompt: &mut String, scope: &CoverageScope) {
    let _ = writeln!(prompt, "\n## Covered categories");
    for category in &scope.covered_categories {
        match scope.covered_components.get(category) {
            Some(components) if !components.is_empty() => {
                let _ = writeln!(prompt, "- {}: {}", category, components.join(", "));
            }
            _ => {
                let _ = writeln!(prompt, "- {}", category);
            }
        }
    }
    if !scope.excluded_components.is_empty() {
        let _ = writeln!(prompt, "\n## Excluded components");
        for excluded in &scope.excluded_components {
            let _ = writeln!(prompt, "- {}", excluded);
        }
    }
}

/// Pulls the JSON object out of a completion
///
/// Accepts a ```json fenced block, a bare ``` fence, or falls back to the
/// outermost braces.
pub fn extract_json_block(response: &str) -> Result<&str, CoverageError> {
    for fence in ["```json", "```"] {
        if let Some(start) = response.find(fence) {
            let content_start = start + fence.len();
            let end = response[content_start..]
                .find("```")
                .ok_or_else(|| CoverageError::MalformedResponse("Unclosed JSON block".into()))?;
            return Ok(response[content_start..content_start + end].trim());
        }
    }

    match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if end > start => Ok(&response[start..=end]),
        _ => Err(CoverageError::MalformedResponse("No JSON object found".into())),
    }
}

pub fn parse_item_verdict(response: &str) -> Result<ItemVerdict, CoverageError> {
    let json = extract_json_block(response)?;
    let verdict: ItemVerdict = serde_json::from_str(json)
        .map_err(|e| CoverageError::MalformedResponse(e.to_string()))?;
    if !verdict.confidence.is_finite() {
        return Err(CoverageError::MalformedResponse("confidence is not a number".into()));
    }
    Ok(verdict)
}

/// Parses a linkage batch, skipping entries that do not deserialize
pub fn parse_labor_links(response: &str) -> Result<Vec<LaborLink>, CoverageError> {
    #[derive(Deserialize)]
    struct RawLinks {
        links: Vec<serde_json::Value>,
    }

    let json = extract_json_block(response)?;
    let raw: RawLinks = serde_json::from_str(json)
        .map_err(|e| CoverageError::MalformedResponse(e.to_string()))?;

    Ok(raw
        .links
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<LaborLink>(v) {
            Ok(link) => Some(link),
            Err(e) => {
                tracing::warn!("Skipping malformed labor link: {}", e);
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_item::ItemType;
    use crate::scope::CoveredPart;
    use rust_decimal_macros::dec;

    #[test]
    fn test_extract_fenced_json() {
        let response = "Here you go:\n```json\n{\"is_covered\": true, \"confidence\": 0.8}\n```\nDone.";
        assert_eq!(
            extract_json_block(response).unwrap(),
            "{\"is_covered\": true, \"confidence\": 0.8}"
        );
    }

    #[test]
    fn test_extract_bare_object() {
        let response = "Verdict: {\"is_covered\": false, \"confidence\": 0.3} end";
        let verdict = parse_item_verdict(response).unwrap();
        assert!(!verdict.is_covered);
        assert_eq!(verdict.reasoning, "");
    }

    #[test]
    fn test_missing_json_is_error() {
        assert!(matches!(
            parse_item_verdict("I cannot decide"),
            Err(CoverageError::MalformedResponse(_))
        ));
        assert!(extract_json_block("```json\n{\"a\": 1}").is_err());
    }

    #[test]
    fn test_lenient_link_parsing() {
        let response = r#"```json
{"links": [
  {"index": 3, "necessary": true, "linked_part_index": 0, "rationale": "removal required"},
  {"index": "four", "necessary": true},
  {"index": 5, "necessary": false}
]}
```"#;
        let links = parse_labor_links(response).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].linked_part_index, Some(0));
        assert!(!links[1].necessary);
    }

    #[test]
    fn test_classification_prompt_includes_context() {
        let scope = CoverageScope::new(vec!["engine".to_string()])
            .with_components("engine", vec!["cylinder_head".to_string()])
            .with_exclusions(vec!["timing belt".to_string()]);
        let context = ClaimContext {
            already_covered_parts: vec![CoveredPart {
                description: "Zylinderkopf".to_string(),
                category: Some("engine".to_string()),
                component: Some("cylinder_head".to_string()),
            }],
            ..Default::default()
        };
        let item = LineItem::new("Ventildeckel", ItemType::Parts, dec!(85));

        let request = classification_request(&item, &scope, &context, 0.0, 512);
        assert_eq!(request.purpose, RequestPurpose::ItemClassification);
        assert!(request.prompt.contains("engine: cylinder_head"));
        assert!(request.prompt.contains("timing belt"));
        assert!(request.prompt.contains("Zylinderkopf (cylinder_head)"));
    }
}
