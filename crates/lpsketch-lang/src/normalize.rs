//! Rewrites free-form algebra into the strict form the parser accepts.

/// Normalize user text: `4x + y^2` becomes `4*x+y**2`.
///
/// - a `*` is inserted wherever a digit is immediately followed by an ASCII
///   letter (only the literal digit-letter boundary, so `x2y` becomes `x2*y`)
/// - all whitespace is removed
/// - `^` is rewritten to `**`
pub fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    let mut prev: Option<char> = None;

    for c in input.chars() {
        if c.is_ascii_alphabetic() && prev.is_some_and(|p| p.is_ascii_digit()) {
            out.push('*');
        }
        prev = Some(c);

        match c {
            c if c.is_whitespace() => {}
            '^' => out.push_str("**"),
            c => out.push(c),
        }
    }

    out
}
