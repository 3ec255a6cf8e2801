//! Well-formedness checks applied before any protocol command is issued

use crate::{Error, Result};

const MAX_SELECTOR_LEN: usize = 1024;

/// Validate a CSS selector from a request.
///
/// Returns the trimmed selector, or `None` for a blank one. This is a structural check
/// only: the browser remains the judge of selector grammar.
pub fn selector(raw: Option<&str>) -> Result<Option<String>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    if raw.len() > MAX_SELECTOR_LEN {
        return Err(Error::invalid_input(format!(
            "selector longer than {} bytes",
            MAX_SELECTOR_LEN
        )));
    }
    if raw.chars().any(|c| c.is_control()) {
        return Err(Error::invalid_input("selector contains control characters"));
    }
    if raw.starts_with([',', '>', '+', '~']) || raw.ends_with([',', '>', '+', '~']) {
        return Err(Error::invalid_input(format!("dangling combinator in selector: {}", raw)));
    }

    check_balance(raw)?;
    Ok(Some(raw.to_string()))
}

/// Brackets and quotes must nest; braces and semicolons outside strings are rejected
fn check_balance(selector: &str) -> Result<()> {
    let mut open: Vec<char> = Vec::new();
    let mut quote: Option<char> = None;
    let mut chars = selector.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            // Escaped character, whatever it is
            chars.next();
            continue;
        }
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' => open.push(c),
            ')' | ']' => {
                let expected = if c == ')' { '(' } else { '[' };
                if open.pop() != Some(expected) {
                    return Err(Error::invalid_input(format!("unbalanced '{}' in selector", c)));
                }
            }
            '{' | '}' | ';' => {
                return Err(Error::invalid_input(format!("unexpected '{}' in selector", c)));
            }
            _ => {}
        }
    }

    if quote.is_some() {
        return Err(Error::invalid_input("unterminated string in selector"));
    }
    if let Some(c) = open.pop() {
        return Err(Error::invalid_input(format!("unclosed '{}' in selector", c)));
    }
    Ok(())
}
