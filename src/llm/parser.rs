//! Response parsing for LLM outputs.
//!
//! Pulls the candidate intent object out of a model reply that may wrap it
//! in a markdown fence or surround it with prose.

use serde_json::Value;

use crate::error::{Result, SheetqlError};

/// Extracts the JSON object text from a model response.
///
/// Looks, in order, for a ```json fence, a bare ``` fence, and finally the
/// span from the first `{` to the last `}`.
pub fn extract_json(response: &str) -> Option<&str> {
    extract_code_block(response, "json")
        .or_else(|| extract_code_block(response, ""))
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .or_else(|| {
            let start = response.find('{')?;
            let end = response.rfind('}')?;
            (end > start).then(|| &response[start..=end])
        })
}

/// Parses a model response into an untyped candidate intent.
///
/// Fails with a translation error when no JSON object can be found or the
/// text is not valid JSON. Shape checks are left to the validator.
pub fn parse_candidate(response: &str) -> Result<Value> {
    let text = extract_json(response).ok_or_else(|| {
        SheetqlError::translation(format!(
            "model response contains no JSON object: {}",
            preview(response)
        ))
    })?;

    let value: Value = serde_json::from_str(text)
        .map_err(|e| SheetqlError::translation(format!("model response is not valid JSON: {}", e)))?;

    if !value.is_object() {
        return Err(SheetqlError::translation(
            "model response is JSON but not an object",
        ));
    }
    Ok(value)
}

/// Returns the content of the first fenced block with the given language tag.
///
/// An empty `lang` matches only fences with no language tag.
fn extract_code_block<'a>(text: &'a str, lang: &str) -> Option<&'a str> {
    let fence = format!("```{}", lang);
    let mut search_from = 0;

    while let Some(found) = text[search_from..].find(&fence) {
        let start = search_from + found;
        let after_fence = start + fence.len();
        let line_end = after_fence + text[after_fence..].find('\n')?;

        if lang.is_empty() && !text[after_fence..line_end].trim().is_empty() {
            // A tagged fence (```sql, ```json); keep looking for a bare one.
            search_from = line_end;
            continue;
        }

        let content_start = line_end + 1;
        let end = text[content_start..].find("```")?;
        return Some(&text[content_start..content_start + end]);
    }

    None
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    let trimmed = text.trim();
    match trimmed.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
