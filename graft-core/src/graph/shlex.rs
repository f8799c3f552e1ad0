//! Shell-style splitting of a command line into argv.

/// Split a command line on unquoted whitespace.
///
/// Single quotes are literal, double quotes allow `\"` and `\\` escapes, and a
/// backslash outside quotes escapes the next character. An unterminated quote
/// runs to the end of the input.
pub fn split(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_single = false;
    let mut in_double = false;
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                in_token = true;
            }
            '"' if !in_single => {
                in_double = !in_double;
                in_token = true;
            }
            '\\' if !in_single => {
                in_token = true;
                match chars.next() {
                    Some(next) if in_double && !matches!(next, '"' | '\\' | '$' | '`') => {
                        current.push('\\');
                        current.push(next);
                    }
                    Some(next) => current.push(next),
                    None => current.push('\\'),
                }
            }
            c if c.is_whitespace() && !in_single && !in_double => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            _ => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_token {
        tokens.push(current);
    }

    tokens
}
