use tunacode_domain::tool_name::ToolName;

const SUSPICIOUS_CHARS: &[char] = &['<', '>', '(', ')', '{', '}', '[', ']', '"', '\'', '`'];
const MAX_NAME_LEN: usize = 50;

/// Trims whitespace and rejects names that look like injected markup or
/// runaway generation rather than a real tool identifier. A rejected name
/// is routed as a failed call, never executed.
pub fn normalize(raw: &str) -> Result<ToolName, String> {
    let trimmed = raw.trim();
    if trimmed.len() > MAX_NAME_LEN {
        return Err(format!("tool name exceeds {MAX_NAME_LEN} characters"));
    }
    if trimmed.chars().any(|c| SUSPICIOUS_CHARS.contains(&c)) {
        return Err(format!("tool name '{trimmed}' contains a disallowed character"));
    }
    Ok(ToolName::new(trimmed))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn trims_whitespace() {
        assert_eq!(normalize("  read_file  ").unwrap().as_str(), "read_file");
    }

    #[test]
    fn rejects_markup_characters() {
        assert!(normalize("<script>").is_err());
        assert!(normalize("read_file(\"x\")").is_err());
    }

    #[test]
    fn rejects_overlong_names() {
        let long = "a".repeat(51);
        assert!(normalize(&long).is_err());
    }
}
