//! Query inspection and table allow-lists.
//!
//! Every connector checks a query against its allow-list before sending it anywhere. The
//! inspection is a small tokenizer, not a SQL parser: it finds the tables referenced after
//! `FROM`, `JOIN` and the commas of a `FROM` list at every nesting level, and rejects anything
//! that is not a single read-only `SELECT`.

use std::fmt;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};

/// Keywords that can never appear in an extraction query.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT",
    "REVOKE", "CALL", "EXEC", "EXECUTE",
];

/// Keywords ending the `FROM` clause of the current nesting level.
const FROM_END_KEYWORDS: &[&str] = &[
    "WHERE", "GROUP", "ORDER", "HAVING", "UNION", "EXCEPT", "INTERSECT", "FETCH", "OFFSET",
    "LIMIT", "FOR",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    /// Bare word, upper-cased.
    Word(String),
    /// Double-quoted identifier, case preserved.
    Quoted(String),
    /// String or numeric literal.
    Literal,
    Symbol(char),
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(word) if word == keyword)
    }

    fn identifier(&self) -> Option<&str> {
        match self {
            Token::Word(word) => Some(word),
            Token::Quoted(name) => Some(name),
            _ => None,
        }
    }
}

/// Splits a query into tokens, dropping comments and whitespace.
pub(crate) fn tokenize(query: &str) -> EtlResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = query.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '-' if chars.peek() == Some(&'-') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = '\0';
                let mut closed = false;
                for c in chars.by_ref() {
                    if previous == '*' && c == '/' {
                        closed = true;
                        break;
                    }
                    previous = c;
                }
                if !closed {
                    bail!(ErrorKind::SecurityViolation, "Query contains an unterminated comment");
                }
            }
            '\'' => {
                let mut closed = false;
                while let Some(c) = chars.next() {
                    if c == '\'' {
                        if chars.peek() == Some(&'\'') {
                            chars.next();
                            continue;
                        }
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    bail!(ErrorKind::SecurityViolation, "Query contains an unterminated string literal");
                }
                tokens.push(Token::Literal);
            }
            '"' => {
                let mut name = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    if c == '"' {
                        if chars.peek() == Some(&'"') {
                            chars.next();
                            name.push('"');
                            continue;
                        }
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    bail!(ErrorKind::SecurityViolation, "Query contains an unterminated identifier");
                }
                tokens.push(Token::Quoted(name));
            }
            c if c.is_ascii_digit() => {
                while chars.peek().is_some_and(|c| c.is_ascii_alphanumeric() || *c == '.') {
                    chars.next();
                }
                tokens.push(Token::Literal);
            }
            c if is_word_char(c) => {
                let mut word = String::from(c);
                while let Some(c) = chars.peek().copied().filter(|c| is_word_char(*c)) {
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word.to_uppercase()));
            }
            c => tokens.push(Token::Symbol(c)),
        }
    }

    Ok(tokens)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '#' | '@' | '$')
}

/// A table referenced by a query, optionally qualified with its schema or library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Returns the tables referenced by a single read-only `SELECT`.
///
/// Fails with [`ErrorKind::SecurityViolation`] for other statement kinds, multiple statements
/// and queries that reference no table.
pub fn referenced_tables(query: &str) -> EtlResult<Vec<TableRef>> {
    let tokens = tokenize(query)?;

    let statement_end = tokens
        .iter()
        .position(|token| *token == Token::Symbol(';'))
        .unwrap_or(tokens.len());
    if tokens[statement_end..].iter().any(|token| *token != Token::Symbol(';')) {
        bail!(
            ErrorKind::SecurityViolation,
            "Query contains more than one statement"
        );
    }
    let tokens = &tokens[..statement_end];

    if !tokens.first().is_some_and(|token| token.is_keyword("SELECT")) {
        bail!(
            ErrorKind::SecurityViolation,
            "Only SELECT queries may be executed"
        );
    }

    if let Some(keyword) = tokens.iter().find_map(|token| match token {
        Token::Word(word) if FORBIDDEN_KEYWORDS.contains(&word.as_str()) => Some(word),
        _ => None,
    }) {
        bail!(
            ErrorKind::SecurityViolation,
            "Query contains a forbidden keyword",
            keyword
        );
    }

    let mut tables = Vec::new();
    // One entry per open parenthesis: whether that level is inside a `FROM` clause.
    let mut in_from = vec![false];
    let mut index = 0;
    while let Some(token) = tokens.get(index) {
        index += 1;

        match token {
            Token::Symbol('(') => in_from.push(false),
            Token::Symbol(')') => {
                in_from.pop();
                if in_from.is_empty() {
                    bail!(
                        ErrorKind::SecurityViolation,
                        "Query has unbalanced parentheses"
                    );
                }
            }
            Token::Symbol(',') if in_from.last() == Some(&true) => {
                index = push_table(tokens, index, &mut tables)?;
            }
            Token::Word(word) if word == "FROM" || word == "JOIN" => {
                if let Some(level) = in_from.last_mut() {
                    *level = true;
                }
                index = push_table(tokens, index, &mut tables)?;
            }
            Token::Word(word) if FROM_END_KEYWORDS.contains(&word.as_str()) => {
                if let Some(level) = in_from.last_mut() {
                    *level = false;
                }
            }
            _ => {}
        }
    }

    if in_from.len() != 1 {
        bail!(
            ErrorKind::SecurityViolation,
            "Query has unbalanced parentheses"
        );
    }

    if tables.is_empty() {
        bail!(
            ErrorKind::SecurityViolation,
            "Query does not reference any table"
        );
    }

    Ok(tables)
}

/// Reads the table expected at `index` into `tables`.
///
/// A parenthesized subquery is left in place so its own level is scanned next.
fn push_table(tokens: &[Token], index: usize, tables: &mut Vec<TableRef>) -> EtlResult<usize> {
    if tokens.get(index) == Some(&Token::Symbol('(')) {
        return Ok(index);
    }

    let (table, next) = read_table(tokens, index)?;
    tables.push(table);

    Ok(next)
}

fn is_name_separator(token: Option<&Token>) -> bool {
    matches!(token, Some(Token::Symbol('.' | '/')))
}

/// Reads `name`, `schema.name` or `schema/name` starting at `index`.
///
/// Names with more than two parts are rejected since they can address other databases.
fn read_table(tokens: &[Token], index: usize) -> EtlResult<(TableRef, usize)> {
    let Some(first) = tokens.get(index).and_then(Token::identifier) else {
        bail!(
            ErrorKind::SecurityViolation,
            "Query has a table reference that cannot be inspected"
        );
    };

    if !is_name_separator(tokens.get(index + 1)) {
        return Ok((
            TableRef {
                schema: None,
                name: first.to_owned(),
            },
            index + 1,
        ));
    }

    let Some(second) = tokens.get(index + 2).and_then(Token::identifier) else {
        bail!(
            ErrorKind::SecurityViolation,
            "Query has a table reference that cannot be inspected"
        );
    };

    if is_name_separator(tokens.get(index + 3)) {
        bail!(
            ErrorKind::SecurityViolation,
            "Query references a table name with more than two parts",
            format!("{first}.{second}.…")
        );
    }

    Ok((
        TableRef {
            schema: Some(first.to_owned()),
            name: second.to_owned(),
        },
        index + 3,
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AllowedTable {
    Table { schema: Option<String>, name: String },
    Schema(String),
}

/// Tables a connector may query.
///
/// Entries are `TABLE`, `SCHEMA.TABLE` (or `SCHEMA/TABLE`) and `SCHEMA.*`. Names are compared
/// case-insensitively. Unqualified references resolve to the default schema when one is set.
#[derive(Debug, Clone)]
pub struct TableAllowList {
    entries: Vec<AllowedTable>,
    default_schema: Option<String>,
}

impl TableAllowList {
    pub fn new<I, S>(patterns: I, default_schema: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = patterns
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref().trim().to_uppercase();
                match pattern.split_once(['.', '/']) {
                    Some((schema, "*")) => AllowedTable::Schema(schema.to_owned()),
                    Some((schema, name)) => AllowedTable::Table {
                        schema: Some(schema.to_owned()),
                        name: name.to_owned(),
                    },
                    None => AllowedTable::Table {
                        schema: None,
                        name: pattern,
                    },
                }
            })
            .collect();

        Self {
            entries,
            default_schema: default_schema.map(|schema| schema.trim().to_uppercase()),
        }
    }

    pub fn is_allowed(&self, table: &TableRef) -> bool {
        let name = table.name.to_uppercase();
        let schema = table
            .schema
            .as_ref()
            .map(|schema| schema.to_uppercase())
            .or_else(|| self.default_schema.clone());

        self.entries.iter().any(|entry| match entry {
            AllowedTable::Schema(allowed) => schema.as_ref() == Some(allowed),
            AllowedTable::Table {
                schema: Some(allowed_schema),
                name: allowed_name,
            } => schema.as_ref() == Some(allowed_schema) && name == *allowed_name,
            AllowedTable::Table {
                schema: None,
                name: allowed_name,
            } => {
                name == *allowed_name
                    && (table.schema.is_none() || schema == self.default_schema)
            }
        })
    }

    /// Checks every table referenced by `query`.
    pub fn check_query(&self, query: &str) -> EtlResult<Vec<TableRef>> {
        let tables = referenced_tables(query)?;

        if let Some(table) = tables.iter().find(|table| !self.is_allowed(table)) {
            bail!(
                ErrorKind::SecurityViolation,
                "Query references a table outside the allow-list",
                table
            );
        }

        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(query: &str) -> Vec<String> {
        referenced_tables(query)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn finds_tables_after_from_and_join() {
        assert_eq!(
            names("SELECT A.K, B.L FROM A LEFT JOIN B ON A.K = B.K"),
            vec!["A", "B"]
        );
        assert_eq!(
            names("select * from catlib/itmmst i, catlib.invbal as v where i.ipart = 'FROM X'"),
            vec!["CATLIB.ITMMST", "CATLIB.INVBAL"]
        );
        assert_eq!(
            names(r#"SELECT "Stock"."On Hand" FROM "Stock" -- FROM secrets"#),
            vec!["Stock"]
        );
    }

    #[test]
    fn rejects_writes_and_stacked_statements() {
        for query in [
            "DELETE FROM ITMMST",
            "SELECT * FROM ITMMST; DROP TABLE ITMMST",
            "SELECT * FROM ITMMST WHERE 1 = (UPDATE X SET Y = 1)",
            "SELECT 1",
            "SELECT * FROM ITMMST WHERE IDESC = 'open",
            "SELECT * FROM CATLIB.REMOTE.USERS",
            "SELECT * FROM (SELECT 1 AS X FROM INVBAL",
        ] {
            let err = referenced_tables(query).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SecurityViolation, "{query}");
        }

        assert!(referenced_tables("SELECT * FROM ITMMST;").is_ok());
    }

    #[test]
    fn tables_after_derived_tables_are_found() {
        assert_eq!(
            names("SELECT * FROM (SELECT 1 AS X FROM INVBAL) T, SECRET.USERS"),
            vec!["INVBAL", "SECRET.USERS"]
        );
        assert_eq!(
            names("SELECT * FROM A JOIN (SELECT K FROM B, C) D ON A.K = D.K, E ORDER BY A.K, E.L"),
            vec!["A", "B", "C", "E"]
        );
        assert_eq!(
            names("SELECT COUNT(*), MAX(Q) FROM A WHERE K IN (SELECT K FROM B) GROUP BY X, Y"),
            vec!["A", "B"]
        );

        let allow_list = TableAllowList::new(["INVBAL"], None);
        let err = allow_list
            .check_query("SELECT * FROM (SELECT 1 AS X FROM INVBAL) T, SECRET.USERS")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SecurityViolation);
        assert_eq!(err.detail(), Some("SECRET.USERS"));

        let library = TableAllowList::new(["CATLIB.*"], None);
        let err = library
            .check_query("SELECT * FROM CATLIB.REMOTE.USERS")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SecurityViolation);
    }

    #[test]
    fn allow_list_supports_tables_and_library_wildcards() {
        let allow_list = TableAllowList::new(["CATLIB.*", "PRCMST", "OTHER/INVBAL"], Some("catlib"));

        assert!(allow_list.check_query("SELECT * FROM ITMMST").is_ok());
        assert!(allow_list.check_query("SELECT * FROM CATLIB/ITMEXT").is_ok());
        assert!(allow_list.check_query("SELECT * FROM other.invbal").is_ok());

        let err = allow_list
            .check_query("SELECT * FROM ITMMST JOIN SECRET.USERS ON 1 = 1")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SecurityViolation);
        assert_eq!(err.detail(), Some("SECRET.USERS"));

        let no_default = TableAllowList::new(["Stock"], None);
        assert!(no_default.check_query(r#"SELECT "Stock"."Part Number" FROM "Stock""#).is_ok());
        assert!(no_default.check_query(r#"SELECT * FROM "Orders""#).is_err());
    }
}
