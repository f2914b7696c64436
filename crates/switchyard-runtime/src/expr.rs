//! Restricted boolean-expression evaluator for mode thresholds.
//!
//! Mode configs carry threshold/condition strings such as
//! `"trust_score >= 0.8 and confidence > 0.9"`. These are evaluated by a
//! small hand-written tokenizer and recursive-descent parser — never a
//! general-purpose interpreter. The grammar binds exactly two variables
//! (`trust_score`, `confidence`) plus numeric literals, comparison
//! operators and `and`/`or`.

use thiserror::Error;

/// Errors raised while parsing or evaluating a threshold expression.
#[derive(Debug, Error, PartialEq)]
pub enum ExprError {
    /// A character outside the grammar was found.
    #[error("unexpected character '{0}' at offset {1}")]
    UnexpectedChar(char, usize),

    /// An identifier other than the two bound variables was used.
    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    /// A numeric literal failed to parse.
    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    /// A token appeared where the grammar does not allow it.
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),

    /// The expression ended mid-production.
    #[error("unexpected end of expression")]
    UnexpectedEnd,

    /// A boolean was used where a number was required, or vice versa.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    TrustScore,
    Confidence,
    And,
    Or,
    Ge,
    Le,
    Gt,
    Lt,
    EqEq,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::TrustScore => "trust_score".to_string(),
            Token::Confidence => "confidence".to_string(),
            Token::And => "and".to_string(),
            Token::Or => "or".to_string(),
            Token::Ge => ">=".to_string(),
            Token::Le => "<=".to_string(),
            Token::Gt => ">".to_string(),
            Token::Lt => "<".to_string(),
            Token::EqEq => "==".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
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
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(ExprError::UnexpectedChar('=', i));
                }
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| ExprError::InvalidNumber(literal.clone()))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                tokens.push(match ident.as_str() {
                    "trust_score" => Token::TrustScore,
                    "confidence" => Token::Confidence,
                    "and" => Token::And,
                    "or" => Token::Or,
                    _ => return Err(ExprError::UnknownIdentifier(ident)),
                });
            }
            other => return Err(ExprError::UnexpectedChar(other, i)),
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Num(f64),
    Bool(bool),
}

impl Value {
    fn as_num(self) -> Result<f64, ExprError> {
        match self {
            Value::Num(n) => Ok(n),
            Value::Bool(_) => {
                Err(ExprError::TypeMismatch("comparison operand must be numeric".to_string()))
            }
        }
    }

    fn as_bool(self) -> Result<bool, ExprError> {
        match self {
            Value::Bool(b) => Ok(b),
            Value::Num(_) => {
                Err(ExprError::TypeMismatch("boolean operand expected".to_string()))
            }
        }
    }
}

/// Recursive-descent evaluator over the token stream.
///
/// Grammar (lowest to highest precedence):
/// `or := and ('or' and)*`
/// `and := cmp ('and' cmp)*`
/// `cmp := primary (('>=' | '<=' | '>' | '<' | '==') primary)?`
/// `primary := variable | number | '(' or ')'`
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    trust_score: f64,
    confidence: f64,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn or_expr(&mut self) -> Result<Value, ExprError> {
        let mut left = self.and_expr()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let right = self.and_expr()?;
            left = Value::Bool(left.as_bool()? || right.as_bool()?);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Value, ExprError> {
        let mut left = self.cmp_expr()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let right = self.cmp_expr()?;
            left = Value::Bool(left.as_bool()? && right.as_bool()?);
        }
        Ok(left)
    }

    fn cmp_expr(&mut self) -> Result<Value, ExprError> {
        let left = self.primary()?;
        let op = match self.peek() {
            Some(Token::Ge | Token::Le | Token::Gt | Token::Lt | Token::EqEq) => {
                self.next().cloned()
            }
            _ => return Ok(left),
        };

        let right = self.primary()?;
        let (l, r) = (left.as_num()?, right.as_num()?);
        let result = match op {
            Some(Token::Ge) => l >= r,
            Some(Token::Le) => l <= r,
            Some(Token::Gt) => l > r,
            Some(Token::Lt) => l < r,
            Some(Token::EqEq) => (l - r).abs() < f64::EPSILON,
            _ => unreachable!("comparison operator checked above"),
        };
        Ok(Value::Bool(result))
    }

    fn primary(&mut self) -> Result<Value, ExprError> {
        match self.next().cloned() {
            Some(Token::Number(n)) => Ok(Value::Num(n)),
            Some(Token::TrustScore) => Ok(Value::Num(self.trust_score)),
            Some(Token::Confidence) => Ok(Value::Num(self.confidence)),
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(other) => Err(ExprError::UnexpectedToken(other.describe())),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some(other) => Err(ExprError::UnexpectedToken(other.describe())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

/// Evaluates a threshold/condition expression against the two bound
/// variables.
///
/// # Errors
/// Returns `ExprError` for anything outside the restricted grammar, or
/// when the expression does not reduce to a boolean.
pub fn evaluate(src: &str, trust_score: f64, confidence: f64) -> Result<bool, ExprError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(ExprError::UnexpectedEnd);
    }

    let mut parser = Parser { tokens: &tokens, pos: 0, trust_score, confidence };
    let value = parser.or_expr()?;

    if parser.pos != tokens.len() {
        let trailing = tokens[parser.pos].describe();
        return Err(ExprError::UnexpectedToken(trailing));
    }

    value.as_bool()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_comparisons() {
        assert!(evaluate("trust_score >= 0.8", 0.8, 0.0).unwrap());
        assert!(!evaluate("trust_score > 0.8", 0.8, 0.0).unwrap());
        assert!(evaluate("confidence < 0.5", 0.0, 0.4).unwrap());
        assert!(evaluate("confidence <= 0.4", 0.0, 0.4).unwrap());
        assert!(evaluate("trust_score == 0.75", 0.75, 0.0).unwrap());
    }

    #[test]
    fn test_boolean_connectives() {
        assert!(evaluate("trust_score >= 0.8 and confidence >= 0.9", 0.85, 0.95).unwrap());
        assert!(!evaluate("trust_score >= 0.8 and confidence >= 0.9", 0.85, 0.5).unwrap());
        assert!(evaluate("trust_score >= 0.8 or confidence >= 0.9", 0.5, 0.95).unwrap());
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        // Parsed as: (ts >= 0.9) or ((ts >= 0.5) and (c >= 0.5))
        assert!(evaluate(
            "trust_score >= 0.9 or trust_score >= 0.5 and confidence >= 0.5",
            0.6,
            0.6
        )
        .unwrap());
        assert!(!evaluate(
            "trust_score >= 0.9 or trust_score >= 0.5 and confidence >= 0.5",
            0.6,
            0.4
        )
        .unwrap());
    }

    #[test]
    fn test_parentheses() {
        assert!(!evaluate(
            "(trust_score >= 0.9 or trust_score >= 0.5) and confidence >= 0.5",
            0.6,
            0.4
        )
        .unwrap());
    }

    #[test]
    fn test_unknown_identifier_rejected() {
        let err = evaluate("velocity >= 0.8", 0.9, 0.9).unwrap_err();
        assert_eq!(err, ExprError::UnknownIdentifier("velocity".to_string()));
    }

    #[test]
    fn test_no_general_evaluation() {
        // Function calls, arithmetic and statements are all outside the
        // grammar and must be rejected, not interpreted.
        assert!(evaluate("max(trust_score, 1)", 0.9, 0.9).is_err());
        assert!(evaluate("trust_score + 0.1 >= 0.8", 0.9, 0.9).is_err());
        assert!(evaluate("trust_score = 0.8", 0.9, 0.9).is_err());
    }

    #[test]
    fn test_non_boolean_result_rejected() {
        assert_eq!(
            evaluate("trust_score", 0.9, 0.9),
            Err(ExprError::TypeMismatch("boolean operand expected".to_string()))
        );
        assert!(evaluate("0.5", 0.9, 0.9).is_err());
    }

    #[test]
    fn test_malformed_inputs() {
        assert_eq!(evaluate("", 0.9, 0.9), Err(ExprError::UnexpectedEnd));
        assert_eq!(evaluate("trust_score >=", 0.9, 0.9), Err(ExprError::UnexpectedEnd));
        assert!(evaluate("trust_score >= 0.8)", 0.9, 0.9).is_err());
        assert!(evaluate("trust_score >= 0..8", 0.9, 0.9).is_err());
        assert!(evaluate("trust_score ! 0.8", 0.9, 0.9).is_err());
    }
}
