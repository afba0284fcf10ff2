use std::fmt;

/// 条件表达式错误类型
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
    #[error("Invalid condition syntax: {0}")]
    InvalidSyntax(String),

    #[error("Unknown identifier '{0}' (quote string values)")]
    UnknownIdentifier(String),

    #[error("Type mismatch: cannot apply {op} to {left} and {right}")]
    TypeMismatch {
        op: String,
        left: String,
        right: String,
    },

    #[error("Condition must evaluate to a boolean, got {0}")]
    NotBoolean(String),
}

/// 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,          // ==
    NotEqual,       // !=
    Greater,        // >
    Less,           // <
    GreaterOrEqual, // >=
    LessOrEqual,    // <=
    Contains,       // contains
}

impl CompareOp {
    /// 从字符串解析运算符，`===` / `!==` 视为 `==` / `!=`
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "==" | "===" => Some(Self::Equal),
            "!=" | "!==" => Some(Self::NotEqual),
            ">" => Some(Self::Greater),
            "<" => Some(Self::Less),
            ">=" => Some(Self::GreaterOrEqual),
            "<=" => Some(Self::LessOrEqual),
            "contains" => Some(Self::Contains),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Greater => ">",
            Self::Less => "<",
            Self::GreaterOrEqual => ">=",
            Self::LessOrEqual => "<=",
            Self::Contains => "contains",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 条件中的字面量值
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionValue::Number(n) => write!(f, "{}", n),
            ConditionValue::String(s) => write!(f, "'{}'", s),
            ConditionValue::Bool(b) => write!(f, "{}", b),
            ConditionValue::Null => write!(f, "null"),
        }
    }
}

impl ConditionValue {
    /// 数字字符串与数字之间按数值比较
    fn as_number(&self) -> Option<f64> {
        match self {
            ConditionValue::Number(n) => Some(*n),
            ConditionValue::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    fn mismatch(&self, op: CompareOp, other: &ConditionValue) -> ConditionError {
        ConditionError::TypeMismatch {
            op: op.to_string(),
            left: self.to_string(),
            right: other.to_string(),
        }
    }

    /// 比较两个值
    pub fn compare(&self, op: CompareOp, other: &ConditionValue) -> Result<bool, ConditionError> {
        match (self, other) {
            (ConditionValue::String(a), ConditionValue::String(b)) => Ok(match op {
                CompareOp::Equal => a == b,
                CompareOp::NotEqual => a != b,
                CompareOp::Contains => a.contains(b.as_str()),
                CompareOp::Greater => a > b,
                CompareOp::Less => a < b,
                CompareOp::GreaterOrEqual => a >= b,
                CompareOp::LessOrEqual => a <= b,
            }),

            (ConditionValue::Bool(a), ConditionValue::Bool(b)) => match op {
                CompareOp::Equal => Ok(a == b),
                CompareOp::NotEqual => Ok(a != b),
                _ => Err(self.mismatch(op, other)),
            },

            (ConditionValue::Null, _) | (_, ConditionValue::Null) => match op {
                CompareOp::Equal => Ok(self == other),
                CompareOp::NotEqual => Ok(self != other),
                _ => Err(self.mismatch(op, other)),
            },

            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => match op {
                    CompareOp::Equal => Ok((a - b).abs() < f64::EPSILON),
                    CompareOp::NotEqual => Ok((a - b).abs() >= f64::EPSILON),
                    CompareOp::Greater => Ok(a > b),
                    CompareOp::Less => Ok(a < b),
                    CompareOp::GreaterOrEqual => Ok(a >= b),
                    CompareOp::LessOrEqual => Ok(a <= b),
                    CompareOp::Contains => Err(self.mismatch(op, other)),
                },
                _ => match op {
                    CompareOp::Equal => Ok(false),
                    CompareOp::NotEqual => Ok(true),
                    _ => Err(self.mismatch(op, other)),
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Value(ConditionValue),
    Ident(String),
    Op(CompareOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

/// 条件表达式语法树
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionExpr {
    Literal(ConditionValue),
    Compare {
        left: Box<ConditionExpr>,
        op: CompareOp,
        right: Box<ConditionExpr>,
    },
    And(Box<ConditionExpr>, Box<ConditionExpr>),
    Or(Box<ConditionExpr>, Box<ConditionExpr>),
    Not(Box<ConditionExpr>),
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '\'' | '"' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|ch| *ch == c)
                    .map(|offset| start + offset)
                    .ok_or_else(|| {
                        ConditionError::InvalidSyntax(format!("unterminated string at {}", i))
                    })?;
                tokens.push(Token::Value(ConditionValue::String(
                    chars[start..end].iter().collect(),
                )));
                i = end + 1;
            }
            '&' | '|' => {
                if chars.get(i + 1) != Some(&c) {
                    return Err(ConditionError::InvalidSyntax(format!(
                        "expected '{}{}' at {}",
                        c, c, i
                    )));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
                i += 2;
            }
            '=' | '!' | '<' | '>' => {
                let mut end = i + 1;
                while end < chars.len() && chars[end] == '=' && end - i < 3 {
                    end += 1;
                }
                let text: String = chars[i..end].iter().collect();
                if text == "!" {
                    tokens.push(Token::Not);
                } else {
                    let op = CompareOp::parse(&text).ok_or_else(|| {
                        ConditionError::InvalidSyntax(format!("unknown operator '{}'", text))
                    })?;
                    tokens.push(Token::Op(op));
                }
                i = end;
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text.parse::<f64>().map_err(|_| {
                    ConditionError::InvalidSyntax(format!("invalid number '{}'", text))
                })?;
                tokens.push(Token::Value(ConditionValue::Number(number)));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::Value(ConditionValue::Bool(true)),
                    "false" => Token::Value(ConditionValue::Bool(false)),
                    "null" => Token::Value(ConditionValue::Null),
                    "contains" => Token::Op(CompareOp::Contains),
                    _ => Token::Ident(word),
                });
            }
            other => {
                return Err(ConditionError::InvalidSyntax(format!(
                    "unexpected character '{}' at {}",
                    other, i
                )));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> Result<ConditionExpr, ConditionError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = ConditionExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<ConditionExpr, ConditionError> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = ConditionExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<ConditionExpr, ConditionError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(ConditionExpr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<ConditionExpr, ConditionError> {
        let left = self.parse_primary()?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            self.pos += 1;
            let right = self.parse_primary()?;
            return Ok(ConditionExpr::Compare {
                left: Box::new(left),
                op,
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<ConditionExpr, ConditionError> {
        match self.next() {
            Some(Token::Value(value)) => Ok(ConditionExpr::Literal(value)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ConditionError::InvalidSyntax("missing ')'".to_string())),
                }
            }
            Some(Token::Ident(name)) => Err(ConditionError::UnknownIdentifier(name)),
            Some(other) => Err(ConditionError::InvalidSyntax(format!(
                "unexpected token {:?}",
                other
            ))),
            None => Err(ConditionError::InvalidSyntax(
                "unexpected end of expression".to_string(),
            )),
        }
    }
}

/// 解析条件表达式
///
/// 支持的格式：
/// - `200 == 200`
/// - `'active' != 'deleted' && 3 >= 1`
/// - `!(5 < '10') || false`
pub fn parse_condition(input: &str) -> Result<ConditionExpr, ConditionError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ConditionError::InvalidSyntax("empty condition".to_string()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(ConditionError::InvalidSyntax(format!(
            "unexpected trailing token {:?}",
            token
        )));
    }
    Ok(expr)
}

impl ConditionExpr {
    pub fn evaluate(&self) -> Result<ConditionValue, ConditionError> {
        match self {
            ConditionExpr::Literal(value) => Ok(value.clone()),
            ConditionExpr::Compare { left, op, right } => {
                let left = left.evaluate()?;
                let right = right.evaluate()?;
                left.compare(*op, &right).map(ConditionValue::Bool)
            }
            ConditionExpr::And(left, right) => {
                if !left.evaluate_bool()? {
                    return Ok(ConditionValue::Bool(false));
                }
                right.evaluate_bool().map(ConditionValue::Bool)
            }
            ConditionExpr::Or(left, right) => {
                if left.evaluate_bool()? {
                    return Ok(ConditionValue::Bool(true));
                }
                right.evaluate_bool().map(ConditionValue::Bool)
            }
            ConditionExpr::Not(inner) => inner.evaluate_bool().map(|b| ConditionValue::Bool(!b)),
        }
    }

    fn evaluate_bool(&self) -> Result<bool, ConditionError> {
        match self.evaluate()? {
            ConditionValue::Bool(b) => Ok(b),
            other => Err(ConditionError::NotBoolean(other.to_string())),
        }
    }
}

/// 解析并求值，结果必须是布尔值
pub fn evaluate_condition(input: &str) -> Result<bool, ConditionError> {
    parse_condition(input)?.evaluate_bool()
}
