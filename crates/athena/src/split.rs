//! Statement batch splitting.
//!
//! A batch is split on `;` that occur outside string literals, quoted
//! identifiers and comments. Each piece remembers whether it holds anything
//! other than whitespace and comments, so callers can skip blank fragments
//! without re-parsing them.

/// One statement of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statement<'a> {
    text: &'a str,
    has_code: bool,
}

impl<'a> Statement<'a> {
    /// Statement text, trimmed, with one trailing terminator removed.
    pub fn text(&self) -> &'a str {
        self.text
    }

    /// `true` when the statement is only whitespace and comments.
    pub fn is_blank(&self) -> bool {
        !self.has_code
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lex {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Split `sql` into statements in source order.
///
/// Quoted spans are delimited by `'`, `"` or `` ` ``; only a doubled delimiter
/// stays inside the span, so `'C:\'` is a complete literal. Whitespace after the
/// final terminator does not produce a statement.
pub fn split_statements(sql: &str) -> Vec<Statement<'_>> {
    let mut statements = Vec::new();
    let mut state = Lex::Code;
    let mut start = 0;
    let mut has_code = false;

    let mut chars = sql.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match state {
            Lex::Code => match c {
                ';' => {
                    // Keep the terminator on the statement; `make` strips it.
                    statements.push(make(&sql[start..=i], has_code));
                    start = i + 1;
                    has_code = false;
                }
                '-' if matches!(chars.peek(), Some((_, '-'))) => {
                    chars.next();
                    state = Lex::LineComment;
                }
                '/' if matches!(chars.peek(), Some((_, '*'))) => {
                    chars.next();
                    state = Lex::BlockComment;
                }
                '\'' | '"' | '`' => {
                    has_code = true;
                    state = Lex::Quoted(c);
                }
                c if c.is_whitespace() => {}
                _ => has_code = true,
            },
            Lex::Quoted(delim) => {
                // A doubled delimiter re-enters the span on the next char.
                // Backslashes are ordinary characters.
                if c == delim {
                    state = Lex::Code;
                }
            }
            Lex::LineComment => {
                if c == '\n' {
                    state = Lex::Code;
                }
            }
            Lex::BlockComment => {
                if c == '*' && matches!(chars.peek(), Some((_, '/'))) {
                    chars.next();
                    state = Lex::Code;
                }
            }
        }
    }

    let rest = &sql[start..];
    if !rest.trim().is_empty() {
        statements.push(make(rest, has_code));
    }
    statements
}

fn make(raw: &str, has_code: bool) -> Statement<'_> {
    let trimmed = raw.trim();
    let text = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
    Statement { text, has_code }
}
