//! Query scope resolver
//!
//! Extracts candidate table references from query text using structural cues
//! (`FROM` and `JOIN` clauses, CTE names, table-producing function calls with
//! a path argument) and intersects them with the catalog. Only tables that
//! are both referenced and registered are ever opened; everything else lands
//! in `invalid_references` and is never touched, however large the catalog.
//!
//! The companion `validate` is a syntactic safety net: it rejects queries
//! containing mutating or structural keywords, with one allowance for
//! `CREATE TABLE ... AS SELECT`. It is best-effort defense-in-depth, not a
//! security boundary: equivalent-but-unmatched syntax will pass.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;

/// Keywords that mark a query as mutating/structural. Matched as whole
/// tokens, outside string literals.
const DENYLIST: &[&str] = &[
    "DELETE", "DROP", "ALTER", "TRUNCATE", "INSERT", "UPDATE", "ATTACH", "EXEC", "EXECUTE",
];

/// Data-file extensions accepted for path-like function arguments
const DATA_FILE_EXTS: &[&str] = &["csv", "parquet", "json", "ndjson", "arrow", "ipc"];

/// The resolved table scope of one query. Computed fresh per query text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryScope {
    /// Every table identifier the text references
    pub referenced: BTreeSet<String>,
    /// Catalog tables at resolution time
    pub available: BTreeSet<String>,
    /// referenced ∩ available: the only tables a loader may open
    pub tables_to_load: BTreeSet<String>,
    /// referenced ∖ available: never opened
    pub invalid_references: BTreeSet<String>,
}

/// Text-level scope resolution and query validation
pub struct ScopeResolver;

impl ScopeResolver {
    /// Resolve the table scope of `query` against the given catalog names
    pub fn resolve<I, S>(query: &str, catalog_names: I) -> QueryScope
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scan = scan(query);
        let referenced = extract_candidates(&scan.tokens);
        let available: BTreeSet<String> = catalog_names.into_iter().map(Into::into).collect();

        let tables_to_load: BTreeSet<String> =
            referenced.intersection(&available).cloned().collect();
        let invalid_references: BTreeSet<String> =
            referenced.difference(&available).cloned().collect();

        QueryScope {
            referenced,
            available,
            tables_to_load,
            invalid_references,
        }
    }

    /// Accept or reject a query on text alone. Rejects empty text, unbalanced
    /// grouping, unterminated literals, and denylisted keywords.
    pub fn validate(query: &str) -> bool {
        if query.trim().is_empty() {
            return false;
        }
        let scan = scan(query);
        if !scan.balanced || !scan.terminated {
            return false;
        }

        let words: Vec<Option<String>> = scan
            .tokens
            .iter()
            .map(|t| match t {
                Token::Word(w) => Some(w.to_uppercase()),
                _ => None,
            })
            .collect();

        let mut i = 0;
        while i < scan.tokens.len() {
            if let Some(word) = &words[i] {
                if DENYLIST.contains(&word.as_str()) {
                    return false;
                }
                if word == "CREATE" {
                    match ctas_end(&words, i) {
                        Some(next) => {
                            i = next;
                            continue;
                        }
                        None => return false,
                    }
                }
            }
            i += 1;
        }
        true
    }
}

/// Check that the CREATE statement starting at `start` is a
/// table-creation-from-projection (`CREATE [OR REPLACE] [TEMP] TABLE name AS
/// SELECT ...`); returns the index just past SELECT when it is.
fn ctas_end(words: &[Option<String>], start: usize) -> Option<usize> {
    let mut i = start + 1;
    let word = |i: usize| words.get(i).and_then(|w| w.as_deref());

    if word(i) == Some("OR") && word(i + 1) == Some("REPLACE") {
        i += 2;
    }
    if matches!(word(i), Some("TEMP") | Some("TEMPORARY")) {
        i += 1;
    }
    if word(i) != Some("TABLE") {
        return None;
    }
    i += 1;
    // Table name: at least one word token
    word(i)?;
    i += 1;
    // The name may be qualified (schema.table); scan forward to AS SELECT.
    // Denylisted words hiding before the introducer still reject the query.
    while i < words.len() {
        match word(i) {
            Some("AS") => {
                let mut k = i + 1;
                while k < words.len() && words[k].is_none() {
                    k += 1;
                }
                return if word(k) == Some("SELECT") {
                    Some(k + 1)
                } else {
                    None
                };
            }
            Some(w) if DENYLIST.contains(&w) => return None,
            _ => i += 1,
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    Punct(char),
}

struct ScanOutcome {
    tokens: Vec<Token>,
    /// Parentheses close in order and end at depth zero
    balanced: bool,
    /// Every string literal and quoted identifier is closed
    terminated: bool,
}

/// Split query text into words, string literals and punctuation, skipping
/// comments. Literal contents are kept (they matter for path arguments) but
/// never treated as words.
fn scan(query: &str) -> ScanOutcome {
    let mut tokens = Vec::new();
    let mut depth: i64 = 0;
    let mut balanced = true;
    let mut terminated = true;

    let chars: Vec<char> = query.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                let quote = c;
                let mut body = String::new();
                let mut closed = false;
                i += 1;
                while i < chars.len() {
                    if chars[i] == quote {
                        // Doubled quote is an escaped quote
                        if i + 1 < chars.len() && chars[i + 1] == quote {
                            body.push(quote);
                            i += 2;
                            continue;
                        }
                        closed = true;
                        i += 1;
                        break;
                    }
                    body.push(chars[i]);
                    i += 1;
                }
                if !closed {
                    terminated = false;
                }
                // Double quotes delimit identifiers, single quotes strings
                if quote == '"' {
                    tokens.push(Token::Word(body));
                } else {
                    tokens.push(Token::Str(body));
                }
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
            }
            _ if c.is_alphanumeric() || c == '_' => {
                let mut word = String::new();
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    word.push(chars[i]);
                    i += 1;
                }
                tokens.push(Token::Word(word));
            }
            _ => {
                if c == '(' {
                    depth += 1;
                } else if c == ')' {
                    depth -= 1;
                    if depth < 0 {
                        balanced = false;
                    }
                }
                if !c.is_whitespace() {
                    tokens.push(Token::Punct(c));
                }
                i += 1;
            }
        }
    }
    if depth != 0 {
        balanced = false;
    }
    ScanOutcome {
        tokens,
        balanced,
        terminated,
    }
}

/// Collect candidate table identifiers from the token stream
fn extract_candidates(tokens: &[Token]) -> BTreeSet<String> {
    let mut candidates = BTreeSet::new();

    let upper = |i: usize| match tokens.get(i) {
        Some(Token::Word(w)) => Some(w.to_uppercase()),
        _ => None,
    };

    let mut i = 0;
    while i < tokens.len() {
        match upper(i).as_deref() {
            Some("FROM") | Some("JOIN") => {
                let keyword_is_from = upper(i) == Some("FROM".to_string());
                let mut j = i + 1;
                loop {
                    j = collect_table_ref(tokens, j, &mut candidates);
                    // Skip an optional alias ("AS x" or bare "x")
                    if upper(j).as_deref() == Some("AS") {
                        j += 2;
                    } else if matches!(tokens.get(j), Some(Token::Word(_)))
                        && !is_clause_keyword(&upper(j).unwrap_or_default())
                    {
                        j += 1;
                    }
                    // Comma lists only occur after FROM
                    if keyword_is_from && matches!(tokens.get(j), Some(Token::Punct(','))) {
                        j += 1;
                        continue;
                    }
                    break;
                }
                i = j;
            }
            Some(_) => {
                // CTE or derived-table name: `name AS (`
                if upper(i + 1).as_deref() == Some("AS")
                    && matches!(tokens.get(i + 2), Some(Token::Punct('(')))
                {
                    if let Some(Token::Word(name)) = tokens.get(i) {
                        if !is_clause_keyword(&name.to_uppercase()) {
                            candidates.insert(name.clone());
                        }
                    }
                }
                // Table-producing function call with a path argument:
                // `read_csv('dir/name.csv')`. Keywords in call position
                // (IN-lists, VALUES) are not function names.
                let word_upper = upper(i).unwrap_or_default();
                if !is_clause_keyword(&word_upper)
                    && !matches!(word_upper.as_str(), "IN" | "VALUES" | "AND" | "OR" | "NOT")
                    && matches!(tokens.get(i + 1), Some(Token::Punct('(')))
                {
                    if let Some(Token::Str(arg)) = tokens.get(i + 2) {
                        if let Some(stem) = path_like_stem(arg) {
                            candidates.insert(stem);
                        }
                    }
                }
                i += 1;
            }
            None => {
                i += 1;
            }
        }
    }
    candidates
}

/// Read one table reference starting at `start`; returns the index after it.
/// Subqueries (`(`) and missing references contribute nothing.
fn collect_table_ref(
    tokens: &[Token],
    start: usize,
    candidates: &mut BTreeSet<String>,
) -> usize {
    match tokens.get(start) {
        Some(Token::Word(w)) => {
            // Function-call table source: the candidate is the path
            // argument's base filename, not the function name
            if matches!(tokens.get(start + 1), Some(Token::Punct('('))) {
                if let Some(Token::Str(arg)) = tokens.get(start + 2) {
                    if let Some(stem) = path_like_stem(arg) {
                        candidates.insert(stem);
                    }
                }
                return start + 1;
            }
            let mut name = w.clone();
            let mut i = start + 1;
            // Qualified name: schema.table
            while matches!(tokens.get(i), Some(Token::Punct('.'))) {
                if let Some(Token::Word(part)) = tokens.get(i + 1) {
                    name.push('.');
                    name.push_str(part);
                    i += 2;
                } else {
                    break;
                }
            }
            if !is_clause_keyword(&name.to_uppercase()) {
                candidates.insert(name);
            }
            i
        }
        Some(Token::Str(s)) => {
            // Direct file reference: FROM 'dir/name.csv'
            if let Some(stem) = path_like_stem(s) {
                candidates.insert(stem);
            }
            start + 1
        }
        _ => start,
    }
}

/// Keywords that can directly follow a table reference and must not be
/// mistaken for aliases or references themselves
fn is_clause_keyword(word: &str) -> bool {
    matches!(
        word,
        "SELECT"
            | "WHERE"
            | "GROUP"
            | "ORDER"
            | "HAVING"
            | "LIMIT"
            | "OFFSET"
            | "ON"
            | "USING"
            | "JOIN"
            | "INNER"
            | "LEFT"
            | "RIGHT"
            | "FULL"
            | "OUTER"
            | "CROSS"
            | "ANTI"
            | "SEMI"
            | "UNION"
            | "EXCEPT"
            | "INTERSECT"
            | "AS"
            | "WITH"
            | "FROM"
    )
}

/// Base filename of a path-like string argument, when it names a data file
fn path_like_stem(arg: &str) -> Option<String> {
    let path = Path::new(arg);
    let ext = path.extension()?.to_str()?.to_lowercase();
    if !DATA_FILE_EXTS.contains(&ext.as_str()) {
        return None;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_scope_soundness() {
        let scope = ScopeResolver::resolve("SELECT * FROM A JOIN C ON A.x = C.x", ["A", "B"]);
        assert_eq!(scope.tables_to_load, names(&["A"]));
        assert_eq!(scope.invalid_references, names(&["C"]));
        assert_eq!(scope.referenced, names(&["A", "C"]));
    }

    #[test]
    fn test_from_comma_list_and_aliases() {
        let scope = ScopeResolver::resolve(
            "SELECT c.name, o.total FROM customers c, orders AS o WHERE c.id = o.cid",
            ["customers", "orders", "unused"],
        );
        assert_eq!(scope.tables_to_load, names(&["customers", "orders"]));
        assert!(scope.invalid_references.is_empty());
    }

    #[test]
    fn test_join_variants() {
        let scope = ScopeResolver::resolve(
            "SELECT * FROM a LEFT JOIN b ON a.x = b.x INNER JOIN c USING (x)",
            ["a", "b", "c"],
        );
        assert_eq!(scope.tables_to_load, names(&["a", "b", "c"]));
    }

    #[test]
    fn test_cte_names_are_candidates() {
        let scope = ScopeResolver::resolve(
            "WITH big AS (SELECT * FROM customers WHERE total > 1000) \
             SELECT * FROM big ORDER BY total DESC",
            ["customers"],
        );
        assert_eq!(scope.tables_to_load, names(&["customers"]));
        assert_eq!(scope.invalid_references, names(&["big"]));
    }

    #[test]
    fn test_path_function_argument() {
        let scope =
            ScopeResolver::resolve("SELECT * FROM read_csv('data/orders.csv')", ["orders"]);
        assert_eq!(scope.tables_to_load, names(&["orders"]));
        // The function name itself is not a table reference
        assert!(!scope.referenced.contains("read_csv"));
    }

    #[test]
    fn test_subquery_is_not_a_reference() {
        let scope = ScopeResolver::resolve(
            "SELECT * FROM (SELECT * FROM inner_t) x",
            ["inner_t", "x"],
        );
        assert_eq!(scope.tables_to_load, names(&["inner_t"]));
    }

    #[test]
    fn test_unreferenced_catalog_tables_stay_out_of_scope() {
        let scope = ScopeResolver::resolve("SELECT * FROM a", ["a", "b", "c", "d"]);
        assert_eq!(scope.tables_to_load, names(&["a"]));
        assert_eq!(scope.available.len(), 4);
    }

    #[test]
    fn test_validate_denylist() {
        assert!(!ScopeResolver::validate("DELETE FROM A"));
        assert!(!ScopeResolver::validate("DROP TABLE A"));
        assert!(!ScopeResolver::validate("delete from A"));
        assert!(!ScopeResolver::validate("INSERT INTO a VALUES (1)"));
        assert!(!ScopeResolver::validate("UPDATE a SET x = 1"));
        assert!(!ScopeResolver::validate("EXEC something"));
        assert!(ScopeResolver::validate("SELECT * FROM A"));
    }

    #[test]
    fn test_validate_ctas_allowance() {
        assert!(ScopeResolver::validate("CREATE TABLE t AS SELECT * FROM A"));
        assert!(ScopeResolver::validate(
            "CREATE OR REPLACE TEMP TABLE t AS SELECT 1"
        ));
        assert!(ScopeResolver::validate(
            "CREATE TABLE staging.t AS SELECT * FROM A"
        ));
        assert!(!ScopeResolver::validate("CREATE TABLE t (x INT)"));
        assert!(!ScopeResolver::validate("CREATE INDEX i ON t (x)"));
    }

    #[test]
    fn test_validate_grouping_and_literals() {
        assert!(!ScopeResolver::validate("SELECT * FROM A WHERE (x > 1"));
        assert!(!ScopeResolver::validate("SELECT * FROM A WHERE x > 1)"));
        assert!(!ScopeResolver::validate("SELECT 'unterminated FROM A"));
        assert!(ScopeResolver::validate("SELECT (1 + (2 * 3)) FROM A"));
        assert!(!ScopeResolver::validate(""));
        assert!(!ScopeResolver::validate("   \n\t "));
    }

    #[test]
    fn test_denylist_word_inside_literal_is_ignored() {
        assert!(ScopeResolver::validate(
            "SELECT 'DELETE FROM A' AS label FROM B"
        ));
        // A column merely containing the substring is fine too
        assert!(ScopeResolver::validate("SELECT updated_at FROM B"));
    }

    #[test]
    fn test_comments_are_skipped() {
        assert!(ScopeResolver::validate(
            "SELECT * FROM A -- DELETE is only a comment\n WHERE x = 1"
        ));
        let scope = ScopeResolver::resolve(
            "SELECT * FROM a /* FROM ghost */ WHERE x = 1",
            ["a", "ghost"],
        );
        assert_eq!(scope.tables_to_load, names(&["a"]));
    }

    #[test]
    fn test_quoted_identifier_reference() {
        let scope = ScopeResolver::resolve("SELECT * FROM \"order lines\"", ["order lines"]);
        assert_eq!(scope.tables_to_load, names(&["order lines"]));
    }
}
