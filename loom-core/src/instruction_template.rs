use crate::types::PartKind;
use crate::{InvocationContext, LoomError, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Regex pattern to match template placeholders like {variable} or {artifact.file_name}
static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_placeholder_regex() -> &'static Regex {
    PLACEHOLDER_REGEX.get_or_init(|| Regex::new(r"\{+[^{}]*\}+").expect("invalid placeholder regex"))
}

/// Checks if a string is a valid identifier (like Python's str.isidentifier())
fn is_identifier(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }

    let mut chars = s.chars();
    let first = chars.next().unwrap();

    if !first.is_alphabetic() && first != '_' {
        return false;
    }

    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Checks if a variable name is a valid state name. Supports prefixes:
/// app:, user:, temp:
fn is_valid_state_name(var_name: &str) -> bool {
    let parts: Vec<&str> = var_name.split(':').collect();

    match parts.len() {
        1 => is_identifier(var_name),
        2 => {
            let prefix = format!("{}:", parts[0]);
            let valid_prefixes = ["app:", "user:", "temp:"];
            valid_prefixes.contains(&prefix.as_str()) && is_identifier(parts[1])
        }
        _ => false,
    }
}

/// Replaces a single placeholder match with its resolved value.
/// Handles {var}, {var?}, and {artifact.name} syntax.
async fn replace_match(ctx: &dyn InvocationContext, match_str: &str) -> Result<String> {
    let var_name = match_str.trim_matches(|c| c == '{' || c == '}').trim();

    let (var_name, optional) =
        if let Some(name) = var_name.strip_suffix('?') { (name, true) } else { (var_name, false) };

    if let Some(file_name) = var_name.strip_prefix("artifact.") {
        let artifacts =
            ctx.artifacts().ok_or_else(|| LoomError::Agent("artifact service is not initialized".to_string()))?;

        match artifacts.load(file_name, None).await {
            Ok(part) => match &part.kind {
                PartKind::Text { text } => Ok(text.clone()),
                _ => Ok(String::new()),
            },
            Err(e) => {
                if optional {
                    Ok(String::new())
                } else {
                    Err(LoomError::Agent(format!("failed to load artifact {file_name}: {e}")))
                }
            }
        }
    } else if is_valid_state_name(var_name) {
        match ctx.get_state(var_name) {
            Some(value) => Ok(format!("{value}")),
            None => {
                if optional {
                    Ok(String::new())
                } else {
                    Err(LoomError::Agent(format!("state variable '{var_name}' not found")))
                }
            }
        }
    } else {
        Ok(match_str.to_string())
    }
}

/// Injects session state and artifact values into an instruction template.
///
/// Supports the following placeholder syntax:
/// - `{var_name}` - required session state variable (errors if missing)
/// - `{var_name?}` - optional variable (empty string if missing)
/// - `{artifact.file_name}` - artifact content insertion
/// - `{app:var}`, `{user:var}`, `{temp:var}` - prefixed state variables
pub async fn inject_session_state(ctx: &dyn InvocationContext, template: &str) -> Result<String> {
    let regex = get_placeholder_regex();
    let mut result = String::with_capacity(template.len());
    let mut last_end = 0;

    for captures in regex.find_iter(template) {
        let match_range = captures.range();
        result.push_str(&template[last_end..match_range.start]);

        let match_str = captures.as_str();
        let replacement = replace_match(ctx, match_str).await?;
        result.push_str(&replacement);

        last_end = match_range.end;
    }

    result.push_str(&template[last_end..]);

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("valid_name"));
        assert!(is_identifier("_private"));
        assert!(is_identifier("name123"));
        assert!(!is_identifier("123invalid"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("with-dash"));
    }

    #[test]
    fn test_is_valid_state_name() {
        assert!(is_valid_state_name("valid_var"));
        assert!(is_valid_state_name("app:config"));
        assert!(is_valid_state_name("user:preference"));
        assert!(is_valid_state_name("temp:data"));
        assert!(!is_valid_state_name("invalid:prefix"));
        assert!(!is_valid_state_name("app:invalid-name"));
        assert!(!is_valid_state_name("too:many:parts"));
    }
}
