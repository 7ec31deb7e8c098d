use silo::{Error, Result, Value};
use std::{cmp::Ordering, iter::Peekable, str::Chars};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// Bare word or double quoted identifier, `quoted` words are never keywords.
    Word { text: String, quoted: bool },
    Text(String),
    Number(String),
    Placeholder,
    Symbol(&'static str),
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word { text, quoted: false } if text.eq_ignore_ascii_case(keyword))
    }
}

fn read_quoted(chars: &mut Peekable<Chars>, quote: char) -> Result<String> {
    let mut result = String::new();
    loop {
        match chars.next() {
            Some(c) if c == quote => {
                if chars.peek() == Some(&quote) {
                    chars.next();
                    result.push(quote);
                } else {
                    return Ok(result);
                }
            }
            Some(c) => result.push(c),
            None => return Err(Error::msg(format!("Unterminated {quote} literal"))),
        }
    }
}

pub(crate) fn tokenize(sql: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '"' => {
                chars.next();
                tokens.push(Token::Word {
                    text: read_quoted(&mut chars, '"')?,
                    quoted: true,
                });
            }
            '\'' => {
                chars.next();
                tokens.push(Token::Text(read_quoted(&mut chars, '\'')?));
            }
            '?' => {
                chars.next();
                tokens.push(Token::Placeholder);
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut number = String::new();
                number.push(c);
                chars.next();
                while let Some(&c) = chars.peek()
                    && (c.is_ascii_digit() || c == '.')
                {
                    number.push(c);
                    chars.next();
                }
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&c) = chars.peek()
                    && (c.is_alphanumeric() || c == '_')
                {
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word {
                    text: word,
                    quoted: false,
                });
            }
            _ => {
                chars.next();
                let symbol = match (c, chars.peek()) {
                    ('<', Some('=')) => "<=",
                    ('>', Some('=')) => ">=",
                    ('!', Some('=')) => "!=",
                    ('<', Some('>')) => "!=",
                    ('(', _) => "(",
                    (')', _) => ")",
                    (',', _) => ",",
                    ('=', _) => "=",
                    ('<', _) => "<",
                    ('>', _) => ">",
                    ('*', _) => "*",
                    (';', _) => ";",
                    _ => return Err(Error::msg(format!("Unexpected character `{c}`"))),
                };
                if symbol.len() == 2 {
                    chars.next();
                }
                tokens.push(Token::Symbol(symbol));
            }
        }
    }
    Ok(tokens)
}

/// Filter of a statement, placeholders already bound.
#[derive(Debug, Clone)]
pub(crate) enum Condition {
    Or(Vec<Condition>),
    And(Vec<Condition>),
    Not(Box<Condition>),
    IsNull(String, bool),
    In(String, Vec<Value>),
    Compare(String, &'static str, Value),
}

#[derive(Debug, Clone)]
pub(crate) enum Statement {
    Select {
        distinct: bool,
        columns: Option<Vec<String>>,
        table: String,
        filter: Option<Condition>,
        order_by: Vec<(String, bool)>,
        limit: Option<usize>,
    },
    Insert {
        table: String,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Value)>,
        filter: Option<Condition>,
    },
    Delete {
        table: String,
        filter: Option<Condition>,
    },
    Truncate {
        table: String,
    },
}

pub(crate) struct Parser {
    tokens: Vec<Token>,
    position: usize,
    args: std::vec::IntoIter<Value>,
}

impl Parser {
    pub(crate) fn new(sql: &str, args: Vec<Value>) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(sql)?,
            position: 0,
            args: args.into_iter(),
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn accept_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|v| v.is_keyword(keyword)) {
            self.position += 1;
            return true;
        }
        false
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.accept_keyword(keyword) {
            return Ok(());
        }
        Err(Error::msg(format!(
            "Expected `{keyword}`, found {:?}",
            self.peek()
        )))
    }

    fn accept_symbol(&mut self, symbol: &str) -> bool {
        if matches!(self.peek(), Some(Token::Symbol(v)) if *v == symbol) {
            self.position += 1;
            return true;
        }
        false
    }

    fn expect_symbol(&mut self, symbol: &str) -> Result<()> {
        if self.accept_symbol(symbol) {
            return Ok(());
        }
        Err(Error::msg(format!(
            "Expected `{symbol}`, found {:?}",
            self.peek()
        )))
    }

    fn identifier(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Word { text, .. }) => Ok(text),
            v => Err(Error::msg(format!("Expected an identifier, found {v:?}"))),
        }
    }

    fn identifiers(&mut self) -> Result<Vec<String>> {
        let mut result = vec![self.identifier()?];
        while self.accept_symbol(",") {
            result.push(self.identifier()?);
        }
        Ok(result)
    }

    fn value(&mut self) -> Result<Value> {
        match self.next() {
            Some(Token::Placeholder) => self
                .args
                .next()
                .ok_or_else(|| Error::msg("More placeholders than arguments")),
            Some(Token::Text(v)) => Ok(Value::Varchar(Some(v.into()))),
            Some(Token::Number(v)) if v.contains('.') => Ok(Value::Float64(Some(v.parse()?))),
            Some(Token::Number(v)) => Ok(Value::Int64(Some(v.parse()?))),
            Some(token) if token.is_keyword("null") => Ok(Value::Null),
            Some(token) if token.is_keyword("true") => Ok(Value::Boolean(Some(true))),
            Some(token) if token.is_keyword("false") => Ok(Value::Boolean(Some(false))),
            v => Err(Error::msg(format!("Expected a value, found {v:?}"))),
        }
    }

    fn values(&mut self) -> Result<Vec<Value>> {
        self.expect_symbol("(")?;
        let mut result = vec![self.value()?];
        while self.accept_symbol(",") {
            result.push(self.value()?);
        }
        self.expect_symbol(")")?;
        Ok(result)
    }

    fn condition(&mut self) -> Result<Condition> {
        let mut terms = vec![self.conjunction()?];
        while self.accept_keyword("or") {
            terms.push(self.conjunction()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Condition::Or(terms)
        })
    }

    fn conjunction(&mut self) -> Result<Condition> {
        let mut terms = vec![self.predicate()?];
        while self.accept_keyword("and") {
            terms.push(self.predicate()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Condition::And(terms)
        })
    }

    fn predicate(&mut self) -> Result<Condition> {
        if self.accept_symbol("(") {
            let result = self.condition()?;
            self.expect_symbol(")")?;
            return Ok(result);
        }
        if self.accept_keyword("not") {
            return Ok(Condition::Not(Box::new(self.predicate()?)));
        }
        let column = self.identifier()?;
        if self.accept_keyword("is") {
            let negated = self.accept_keyword("not");
            self.expect_keyword("null")?;
            return Ok(Condition::IsNull(column, !negated));
        }
        if self.accept_keyword("in") {
            return Ok(Condition::In(column, self.values()?));
        }
        let operator = match self.next() {
            Some(Token::Symbol(v)) if matches!(v, "=" | "!=" | "<" | "<=" | ">" | ">=") => v,
            v => return Err(Error::msg(format!("Expected an operator, found {v:?}"))),
        };
        Ok(Condition::Compare(column, operator, self.value()?))
    }

    fn filter(&mut self) -> Result<Option<Condition>> {
        if self.accept_keyword("where") {
            return self.condition().map(Some);
        }
        Ok(None)
    }

    fn end(&mut self) -> Result<()> {
        self.accept_symbol(";");
        match self.peek() {
            None => Ok(()),
            Some(v) => Err(Error::msg(format!("Unexpected {v:?} at the end of the statement"))),
        }
    }

    pub(crate) fn statement(mut self) -> Result<Statement> {
        let result = if self.accept_keyword("select") {
            let distinct = self.accept_keyword("distinct");
            let columns = if self.accept_symbol("*") {
                None
            } else {
                Some(self.identifiers()?)
            };
            self.expect_keyword("from")?;
            let table = self.identifier()?;
            let filter = self.filter()?;
            let mut order_by = Vec::new();
            if self.accept_keyword("order") {
                self.expect_keyword("by")?;
                loop {
                    let column = self.identifier()?;
                    let descending = self.accept_keyword("desc");
                    if !descending {
                        self.accept_keyword("asc");
                    }
                    order_by.push((column, descending));
                    if !self.accept_symbol(",") {
                        break;
                    }
                }
            }
            let limit = if self.accept_keyword("limit") {
                match self.next() {
                    Some(Token::Number(v)) => Some(v.parse()?),
                    v => return Err(Error::msg(format!("Expected a limit, found {v:?}"))),
                }
            } else {
                None
            };
            Statement::Select {
                distinct,
                columns,
                table,
                filter,
                order_by,
                limit,
            }
        } else if self.accept_keyword("insert") {
            self.expect_keyword("into")?;
            let table = self.identifier()?;
            self.expect_symbol("(")?;
            let columns = self.identifiers()?;
            self.expect_symbol(")")?;
            self.expect_keyword("values")?;
            let mut rows = vec![self.values()?];
            while self.accept_symbol(",") {
                rows.push(self.values()?);
            }
            Statement::Insert {
                table,
                columns,
                rows,
            }
        } else if self.accept_keyword("update") {
            let table = self.identifier()?;
            self.expect_keyword("set")?;
            let mut assignments = Vec::new();
            loop {
                let column = self.identifier()?;
                self.expect_symbol("=")?;
                assignments.push((column, self.value()?));
                if !self.accept_symbol(",") {
                    break;
                }
            }
            let filter = self.filter()?;
            Statement::Update {
                table,
                assignments,
                filter,
            }
        } else if self.accept_keyword("delete") {
            self.expect_keyword("from")?;
            let table = self.identifier()?;
            let filter = self.filter()?;
            Statement::Delete { table, filter }
        } else if self.accept_keyword("truncate") {
            self.accept_keyword("table");
            Statement::Truncate {
                table: self.identifier()?,
            }
        } else {
            return Err(Error::msg(format!(
                "Unsupported statement starting with {:?}",
                self.peek()
            )));
        };
        self.end()?;
        Ok(result)
    }
}

/// Ordering of two cells, `None` when either is `NULL` or they are not comparable.
pub(crate) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    use serde_json::Value as Json;
    if a.is_null() || b.is_null() {
        return None;
    }
    match (a.to_json(), b.to_json()) {
        (Json::Number(a), Json::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Json::String(a), Json::String(b)) => Some(a.cmp(&b)),
        (Json::Bool(a), Json::Bool(b)) => Some(a.cmp(&b)),
        (Json::Bool(a), Json::Number(b)) | (Json::Number(b), Json::Bool(a)) => {
            (a as i64 as f64).partial_cmp(&b.as_f64()?)
        }
        (a, b) => a.to_string().partial_cmp(&b.to_string()),
    }
}
