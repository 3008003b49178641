//! Restricted filter-query translation.
//!
//! Listing requests and lineage stop conditions carry an opaque
//! `filter_query` string. The facade never interprets it; this module turns
//! it into a parameterized SQL fragment on behalf of the access object.
//!
//! The supported grammar is a conjunction of comparisons:
//!
//! ```text
//! expr    := cond ( "AND" cond )*
//! cond    := column op literal
//! op      := "=" | "!=" | "<" | "<=" | ">" | ">=" | "LIKE"
//! literal := integer | float | 'single-quoted string'
//! ```
//!
//! Column names are validated against a per-entity whitelist; anything
//! else is rejected so a filter can never smuggle SQL into a query.
use crate::errors::StoreError;
use crate::query::Parameter;

/// A translated filter: a SQL fragment with `?` placeholders plus the
/// parameters to bind, in order.
#[derive(Debug, Clone)]
pub(crate) struct FilterSql {
    pub clause: String,
    pub params: Vec<Parameter>,
}

/// Translates `expr` into SQL over the whitelisted `columns`, qualifying
/// every column reference with `qualifier` (e.g. `"A."`).
pub(crate) fn translate(
    expr: &str,
    columns: &[&str],
    qualifier: &str,
) -> Result<FilterSql, StoreError> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser {
        tokens: &tokens,
        position: 0,
    };
    let filter = parser.parse(columns, qualifier)?;
    if parser.position != tokens.len() {
        return Err(StoreError::invalid_argument(format!(
            "trailing input in filter query: {:?}",
            expr
        )));
    }
    Ok(filter)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Op(&'static str),
    And,
    Like,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, StoreError> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '=' => {
                chars.next();
                tokens.push(Token::Op("="));
            }
            '!' => {
                chars.next();
                match chars.next() {
                    Some((_, '=')) => tokens.push(Token::Op("!=")),
                    _ => {
                        return Err(StoreError::invalid_argument(format!(
                            "expected '=' after '!' at byte {} in filter query",
                            start
                        )))
                    }
                }
            }
            '<' | '>' => {
                chars.next();
                if let Some(&(_, '=')) = chars.peek() {
                    chars.next();
                    tokens.push(Token::Op(if c == '<' { "<=" } else { ">=" }));
                } else {
                    tokens.push(Token::Op(if c == '<' { "<" } else { ">" }));
                }
            }
            '\'' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some((_, '\'')) => {
                            // '' escapes a quote inside the literal.
                            if let Some(&(_, '\'')) = chars.peek() {
                                chars.next();
                                value.push('\'');
                            } else {
                                break;
                            }
                        }
                        Some((_, c)) => value.push(c),
                        None => {
                            return Err(StoreError::invalid_argument(
                                "unterminated string literal in filter query".to_owned(),
                            ))
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut text = String::new();
                text.push(c);
                chars.next();
                let mut is_float = false;
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        chars.next();
                    } else if c == '.' && !is_float {
                        is_float = true;
                        text.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let token = if is_float {
                    Token::Float(text.parse().map_err(|_| {
                        StoreError::invalid_argument(format!("bad number {:?} in filter query", text))
                    })?)
                } else {
                    Token::Int(text.parse().map_err(|_| {
                        StoreError::invalid_argument(format!("bad number {:?} in filter query", text))
                    })?)
                };
                tokens.push(token);
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut text = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        text.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if text.eq_ignore_ascii_case("and") {
                    tokens.push(Token::And);
                } else if text.eq_ignore_ascii_case("like") {
                    tokens.push(Token::Like);
                } else {
                    tokens.push(Token::Ident(text));
                }
            }
            _ => {
                return Err(StoreError::invalid_argument(format!(
                    "unexpected character {:?} at byte {} in filter query",
                    c, start
                )))
            }
        }
    }
    if tokens.is_empty() {
        return Err(StoreError::invalid_argument(
            "empty filter query".to_owned(),
        ));
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    position: usize,
}

impl<'a> Parser<'a> {
    fn parse(&mut self, columns: &[&str], qualifier: &str) -> Result<FilterSql, StoreError> {
        let mut clause = String::new();
        let mut params = Vec::new();
        loop {
            self.condition(columns, qualifier, &mut clause, &mut params)?;
            match self.tokens.get(self.position) {
                Some(Token::And) => {
                    self.position += 1;
                    clause.push_str(" AND ");
                }
                _ => break,
            }
        }
        Ok(FilterSql { clause, params })
    }

    fn condition(
        &mut self,
        columns: &[&str],
        qualifier: &str,
        clause: &mut String,
        params: &mut Vec<Parameter>,
    ) -> Result<(), StoreError> {
        let column = match self.tokens.get(self.position) {
            Some(Token::Ident(name)) => name.clone(),
            other => {
                return Err(StoreError::invalid_argument(format!(
                    "expected a column name in filter query, got {:?}",
                    other
                )))
            }
        };
        if !columns.contains(&column.as_str()) {
            return Err(StoreError::invalid_argument(format!(
                "column {:?} cannot be used in this filter query",
                column
            )));
        }
        self.position += 1;

        let op = match self.tokens.get(self.position) {
            Some(Token::Op(op)) => *op,
            Some(Token::Like) => "LIKE",
            other => {
                return Err(StoreError::invalid_argument(format!(
                    "expected a comparison operator in filter query, got {:?}",
                    other
                )))
            }
        };
        self.position += 1;

        let param = match self.tokens.get(self.position) {
            Some(Token::Int(v)) => Parameter::Int(*v),
            Some(Token::Float(v)) => Parameter::Double(*v),
            Some(Token::Str(v)) => Parameter::Text(v.clone()),
            other => {
                return Err(StoreError::invalid_argument(format!(
                    "expected a literal in filter query, got {:?}",
                    other
                )))
            }
        };
        self.position += 1;

        clause.push_str(qualifier);
        clause.push_str(&column);
        clause.push(' ');
        clause.push_str(op);
        clause.push_str(" ?");
        params.push(param);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: &[&str] = &["id", "name", "uri", "state", "create_time_since_epoch"];

    #[test]
    fn translates_single_condition() {
        let filter = translate("uri = 'path/to/data'", COLUMNS, "A.").unwrap();
        assert_eq!(filter.clause, "A.uri = ?");
        assert_eq!(filter.params, vec![Parameter::Text("path/to/data".to_owned())]);
    }

    #[test]
    fn translates_conjunction() {
        let filter = translate("state != 0 AND create_time_since_epoch >= 1000", COLUMNS, "A.").unwrap();
        assert_eq!(filter.clause, "A.state != ? AND A.create_time_since_epoch >= ?");
        assert_eq!(filter.params, vec![Parameter::Int(0), Parameter::Int(1000)]);
    }

    #[test]
    fn translates_like_and_quote_escape() {
        let filter = translate("name LIKE 'run-%' AND uri = 'o''clock'", COLUMNS, "").unwrap();
        assert_eq!(filter.clause, "name LIKE ? AND uri = ?");
        assert_eq!(
            filter.params,
            vec![
                Parameter::Text("run-%".to_owned()),
                Parameter::Text("o'clock".to_owned()),
            ]
        );
    }

    #[test]
    fn rejects_unknown_column() {
        assert!(translate("password = 'x'", COLUMNS, "").is_err());
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(translate("", COLUMNS, "").is_err());
        assert!(translate("uri =", COLUMNS, "").is_err());
        assert!(translate("uri = 'x' OR name = 'y'", COLUMNS, "").is_err());
        assert!(translate("uri = 'unterminated", COLUMNS, "").is_err());
        assert!(translate("uri ; DROP TABLE Artifact", COLUMNS, "").is_err());
    }

    #[test]
    fn rejects_trailing_tokens() {
        assert!(translate("id = 1 name", COLUMNS, "").is_err());
    }
}
