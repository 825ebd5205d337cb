use std::borrow::Cow;

/// Target placeholder style for translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// PostgreSQL-style placeholders like `$1`.
    Postgres,
    /// SQLite-style placeholders like `?1`.
    Sqlite,
}

/// How to resolve translation for a call relative to the pool default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranslationMode {
    /// Follow the pool's default setting.
    #[default]
    PoolDefault,
    /// Force translation on, regardless of pool default.
    ForceOn,
    /// Force translation off, regardless of pool default.
    ForceOff,
}

impl TranslationMode {
    #[must_use]
    pub fn resolve(self, pool_default: bool) -> bool {
        match self {
            TranslationMode::PoolDefault => pool_default,
            TranslationMode::ForceOn => true,
            TranslationMode::ForceOff => false,
        }
    }
}

/// Translate placeholders into the target backend's style.
///
/// * `?N` becomes `$N` when targeting Postgres. A bare `?` becomes one more than the
///   highest index seen before it, so `?2, ?` maps to `$2, $3`.
/// * `$N` becomes `?N` when targeting `SQLite`.
///
/// Quoted literals, comments and dollar-quoted blocks are left untouched. Returns a
/// borrowed `Cow` when no changes are needed.
///
/// Bare `?` is also the Postgres jsonb key-exists operator; leave translation off for
/// statements that use it.
#[must_use]
pub fn translate_placeholders<'a>(
    sql: &'a str,
    target: PlaceholderStyle,
    enabled: bool,
) -> Cow<'a, str> {
    if !enabled {
        return Cow::Borrowed(sql);
    }

    let bytes = sql.as_bytes();
    let mut out: Option<String> = None;
    let mut copied = 0;
    // highest index handed out so far; a bare `?` takes the next one, as SQLite numbers it
    let mut last_index = 0usize;
    let mut scanner = CodeScanner::new(sql);

    while let Some(idx) = scanner.next() {
        let (replacement, end) = match (bytes[idx], target) {
            (b'?', PlaceholderStyle::Postgres) => match scan_digits(bytes, idx + 1) {
                Some((end, digits)) => {
                    if let Ok(n) = digits.parse::<usize>() {
                        last_index = last_index.max(n);
                    }
                    (format!("${digits}"), end)
                }
                None => {
                    last_index += 1;
                    (format!("${last_index}"), idx + 1)
                }
            },
            (b'$', PlaceholderStyle::Sqlite) => match scan_digits(bytes, idx + 1) {
                Some((end, digits)) => (format!("?{digits}"), end),
                None => continue,
            },
            _ => continue,
        };

        let buf = out.get_or_insert_with(|| String::with_capacity(sql.len() + 8));
        buf.push_str(&sql[copied..idx]);
        buf.push_str(&replacement);
        copied = end;
        scanner.skip_to(end);
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(sql),
    }
}

/// Walks the byte offsets of a SQL string that sit in plain code, skipping string
/// literals, quoted identifiers, comments and dollar-quoted bodies.
pub(crate) struct CodeScanner<'a> {
    bytes: &'a [u8],
    idx: usize,
}

impl<'a> CodeScanner<'a> {
    pub(crate) fn new(sql: &'a str) -> Self {
        Self {
            bytes: sql.as_bytes(),
            idx: 0,
        }
    }

    /// Resume scanning at `idx`; used after the caller consumed a token.
    pub(crate) fn skip_to(&mut self, idx: usize) {
        self.idx = self.idx.max(idx);
    }

    fn skip_quoted(&mut self, quote: u8) {
        // self.idx points just past the opening quote
        while self.idx < self.bytes.len() {
            if self.bytes[self.idx] == quote {
                if self.bytes.get(self.idx + 1) == Some(&quote) {
                    self.idx += 2;
                    continue;
                }
                self.idx += 1;
                return;
            }
            self.idx += 1;
        }
    }

    fn skip_line_comment(&mut self) {
        while self.idx < self.bytes.len() && self.bytes[self.idx] != b'\n' {
            self.idx += 1;
        }
    }

    fn skip_block_comment(&mut self) {
        let mut depth = 1u32;
        while self.idx < self.bytes.len() && depth > 0 {
            match (self.bytes[self.idx], self.bytes.get(self.idx + 1)) {
                (b'/', Some(b'*')) => {
                    depth += 1;
                    self.idx += 2;
                }
                (b'*', Some(b'/')) => {
                    depth -= 1;
                    self.idx += 2;
                }
                _ => self.idx += 1,
            }
        }
    }

    fn skip_dollar_quoted(&mut self, tag_len: usize, open_start: usize) {
        let tag = &self.bytes[open_start..open_start + tag_len];
        while self.idx < self.bytes.len() {
            if self.bytes[self.idx..].starts_with(tag) {
                self.idx += tag_len;
                return;
            }
            self.idx += 1;
        }
    }
}

impl Iterator for CodeScanner<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.idx < self.bytes.len() {
            let start = self.idx;
            match self.bytes[start] {
                quote @ (b'\'' | b'"') => {
                    self.idx += 1;
                    self.skip_quoted(quote);
                }
                b'-' if self.bytes.get(start + 1) == Some(&b'-') => {
                    self.idx += 2;
                    self.skip_line_comment();
                }
                b'/' if self.bytes.get(start + 1) == Some(&b'*') => {
                    self.idx += 2;
                    self.skip_block_comment();
                }
                b'$' => {
                    if let Some(tag_len) = dollar_quote_tag_len(self.bytes, start) {
                        self.idx += tag_len;
                        self.skip_dollar_quoted(tag_len, start);
                    } else {
                        self.idx += 1;
                        return Some(start);
                    }
                }
                _ => {
                    self.idx += 1;
                    return Some(start);
                }
            }
        }
        None
    }
}

/// Length of a `$tag$` opener (including both dollars) starting at `start`.
///
/// Tags may be empty (`$$`) but cannot start with a digit, so `$1` is never a quote.
fn dollar_quote_tag_len(bytes: &[u8], start: usize) -> Option<usize> {
    let mut idx = start + 1;
    if bytes.get(idx).is_some_and(u8::is_ascii_digit) {
        return None;
    }
    while idx < bytes.len() && bytes[idx] != b'$' {
        let b = bytes[idx];
        if !(b.is_ascii_alphanumeric() || b == b'_') {
            return None;
        }
        idx += 1;
    }
    (idx < bytes.len()).then_some(idx + 1 - start)
}

pub(crate) fn scan_digits(bytes: &[u8], start: usize) -> Option<(usize, &str)> {
    let mut idx = start;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
    }
    if idx == start {
        None
    } else {
        std::str::from_utf8(&bytes[start..idx])
            .ok()
            .map(|digits| (idx, digits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_sqlite_to_postgres() {
        let sql = "select * from t where a = ?1 and b = ?2";
        let res = translate_placeholders(sql, PlaceholderStyle::Postgres, true);
        assert_eq!(res, "select * from t where a = $1 and b = $2");
    }

    #[test]
    fn numbers_bare_question_marks_for_postgres() {
        let sql = "update user set age = ? where id = ?;";
        let res = translate_placeholders(sql, PlaceholderStyle::Postgres, true);
        assert_eq!(res, "update user set age = $1 where id = $2;");
    }

    #[test]
    fn bare_marks_continue_after_numbered_ones() {
        let sql = "select ?2, ?, ?1, ?";
        let res = translate_placeholders(sql, PlaceholderStyle::Postgres, true);
        assert_eq!(res, "select $2, $3, $1, $4");
    }

    #[test]
    fn translates_postgres_to_sqlite() {
        let sql = "insert into t values($1, $2)";
        let res = translate_placeholders(sql, PlaceholderStyle::Sqlite, true);
        assert_eq!(res, "insert into t values(?1, ?2)");
    }

    #[test]
    fn skips_inside_literals_and_comments() {
        let sql = "select '?1', $1 -- $2\n/* ?3 /* $4 */ */ from t where a = $1";
        let res = translate_placeholders(sql, PlaceholderStyle::Sqlite, true);
        assert_eq!(
            res,
            "select '?1', ?1 -- $2\n/* ?3 /* $4 */ */ from t where a = ?1"
        );
    }

    #[test]
    fn skips_dollar_quoted_blocks() {
        let sql = "$foo$ select $1 from t $foo$ where a = $1";
        let res = translate_placeholders(sql, PlaceholderStyle::Sqlite, true);
        assert_eq!(res, "$foo$ select $1 from t $foo$ where a = ?1");
    }

    #[test]
    fn keeps_multibyte_text_intact() {
        let sql = "update user set name = '苏旭' where age = ? and id = ?";
        let res = translate_placeholders(sql, PlaceholderStyle::Postgres, true);
        assert_eq!(res, "update user set name = '苏旭' where age = $1 and id = $2");
    }

    #[test]
    fn respects_disabled_flag() {
        let sql = "select * from t where a = ?1";
        let res = translate_placeholders(sql, PlaceholderStyle::Postgres, false);
        assert!(matches!(res, Cow::Borrowed(_)));
        assert_eq!(res, sql);
    }

    #[test]
    fn untouched_sql_is_borrowed() {
        let sql = "select 1";
        let res = translate_placeholders(sql, PlaceholderStyle::Sqlite, true);
        assert!(matches!(res, Cow::Borrowed(_)));
    }

    #[test]
    fn translation_mode_resolution() {
        assert!(TranslationMode::ForceOn.resolve(false));
        assert!(!TranslationMode::ForceOff.resolve(true));
        assert!(TranslationMode::PoolDefault.resolve(true));
        assert!(!TranslationMode::PoolDefault.resolve(false));
    }
}
