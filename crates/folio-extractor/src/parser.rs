//! Parse LLM output into a JSON object

use serde_json::Value;
use tracing::debug;

/// Parse a raw response, repairing it once if needed
///
/// Order: the response as-is (minus any markdown code fence), then a single
/// structural repair pass. Returns the first parse error when both fail.
pub fn parse_llm_response(response: &str) -> Result<Value, String> {
    let json_str = extract_json(response);

    match serde_json::from_str::<Value>(&json_str) {
        Ok(value) => Ok(value),
        Err(first_error) => {
            let repaired = repair_json(&json_str);
            match serde_json::from_str::<Value>(&repaired) {
                Ok(value) => {
                    debug!("Parsed response after repair");
                    Ok(value)
                }
                Err(_) => Err(format!("JSON parse error: {}", first_error)),
            }
        }
    }
}

/// Extract JSON from response, handling markdown code blocks
fn extract_json(response: &str) -> String {
    let trimmed = response.trim();

    // LLMs sometimes wrap JSON in markdown code blocks
    if trimmed.starts_with("```") {
        let lines: Vec<&str> = trimmed.lines().collect();
        if lines.len() < 2 {
            return String::new();
        }

        // Skip first line (```json or ```) and a closing fence if present
        let end = if lines[lines.len() - 1].trim_start().starts_with("```") {
            lines.len() - 1
        } else {
            lines.len()
        };
        lines[1..end].join("\n")
    } else {
        trimmed.to_string()
    }
}

/// One best-effort structural repair
///
/// - Drop prose before the first `{` / `[` and after the last matching closer
/// - Remove trailing commas before `}` / `]`
/// - Close an unterminated string and any unclosed brackets
fn repair_json(input: &str) -> String {
    let start = match input.find(['{', '[']) {
        Some(start) => start,
        None => return input.to_string(),
    };
    let body = &input[start..];
    let body = match body.rfind(['}', ']']) {
        Some(end) if balanced_prefix_closes(&body[..=end]) => &body[..=end],
        _ => body,
    };

    let mut out = String::with_capacity(body.len() + 8);
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in body.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '{' => {
                stack.push('}');
                out.push(c);
            }
            '[' => {
                stack.push(']');
                out.push(c);
            }
            '}' | ']' => {
                strip_trailing_comma(&mut out);
                if stack.last() == Some(&c) {
                    stack.pop();
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    while let Some(closer) = stack.pop() {
        strip_trailing_comma(&mut out);
        out.push(closer);
    }
    out
}

fn strip_trailing_comma(out: &mut String) {
    let trimmed_len = out.trim_end().len();
    if out[..trimmed_len].ends_with(',') {
        out.truncate(trimmed_len - 1);
    }
}

/// Whether `text` has no unclosed brackets outside strings
fn balanced_prefix_closes(text: &str) -> bool {
    let mut depth = 0i64;
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => depth -= 1,
            _ => {}
        }
    }
    depth <= 0 && !in_string
}
