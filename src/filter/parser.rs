//! Recursive-descent parser for filter expressions
//!
//! Grammar, matching the CLI surface:
//!
//! ```text
//! expression := operand { ("and" | "or") operand }
//! operand    := "(" expression ")" | comparison
//! comparison := path ("==" | "~=") constant
//! constant   := integer | "string" | 'string' | nil
//! ```
//!
//! `and` and `or` have equal precedence and associate to the left; use
//! parentheses to group.

use super::{Comparison, Expr, Literal, Op};

/// Any error raised while parsing a filter expression
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FilterError {
	#[error("unexpected character `{0}` in filter expression")]
	UnexpectedChar(char),
	#[error("unexpected end of filter expression")]
	UnexpectedEnd,
	#[error("expected {expected}, found `{found}`")]
	Unexpected {
		/// What the grammar required at this point
		expected: &'static str,
		/// The offending token, rendered back to text
		found: String,
	},
	#[error("integer literal out of range")]
	IntOutOfRange,
	#[error("unterminated string literal")]
	UnterminatedString,
}

/// Parse a filter expression into its AST
pub fn parse(input: &str) -> Result<Expr, FilterError> {
	let tokens = tokenize(input)?;
	let mut parser = Parser { tokens, pos: 0 };
	let expr = parser.expression()?;
	match parser.next() {
		None => Ok(expr),
		Some(token) => Err(FilterError::Unexpected {
			expected: "end of expression",
			found: token.render(),
		}),
	}
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
	Ident(String),
	Int(i64),
	Str(String),
	Nil,
	And,
	Or,
	Eq,
	Ne,
	LParen,
	RParen,
}

impl Token {
	fn render(&self) -> String {
		match self {
			Token::Ident(s) => s.clone(),
			Token::Int(i) => i.to_string(),
			Token::Str(s) => format!("\"{s}\""),
			Token::Nil => "nil".to_owned(),
			Token::And => "and".to_owned(),
			Token::Or => "or".to_owned(),
			Token::Eq => "==".to_owned(),
			Token::Ne => "~=".to_owned(),
			Token::LParen => "(".to_owned(),
			Token::RParen => ")".to_owned(),
		}
	}
}

fn tokenize(input: &str) -> Result<Vec<Token>, FilterError> {
	let mut tokens = Vec::new();
	let mut chars = input.chars().peekable();
	while let Some(&c) = chars.peek() {
		match c {
			c if c.is_whitespace() => {
				chars.next();
			}
			'(' => {
				chars.next();
				tokens.push(Token::LParen);
			}
			')' => {
				chars.next();
				tokens.push(Token::RParen);
			}
			'=' => {
				chars.next();
				match chars.next() {
					Some('=') => tokens.push(Token::Eq),
					Some(other) => return Err(FilterError::UnexpectedChar(other)),
					None => return Err(FilterError::UnexpectedEnd),
				}
			}
			'~' => {
				chars.next();
				match chars.next() {
					Some('=') => tokens.push(Token::Ne),
					Some(other) => return Err(FilterError::UnexpectedChar(other)),
					None => return Err(FilterError::UnexpectedEnd),
				}
			}
			quote @ ('"' | '\'') => {
				chars.next();
				let mut literal = String::new();
				loop {
					match chars.next() {
						Some(c) if c == quote => break,
						Some(c) => literal.push(c),
						None => return Err(FilterError::UnterminatedString),
					}
				}
				tokens.push(Token::Str(literal));
			}
			'-' | '0'..='9' => {
				let mut literal = String::new();
				literal.push(c);
				chars.next();
				while let Some(&c) = chars.peek() {
					if c.is_ascii_digit() {
						literal.push(c);
						chars.next();
					} else {
						break;
					}
				}
				let value: i64 = literal.parse().map_err(|_| FilterError::IntOutOfRange)?;
				tokens.push(Token::Int(value));
			}
			c if c.is_ascii_alphanumeric() || c == '_' || c == '.' => {
				let mut ident = String::new();
				while let Some(&c) = chars.peek() {
					if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
						ident.push(c);
						chars.next();
					} else {
						break;
					}
				}
				tokens.push(match ident.as_str() {
					"and" => Token::And,
					"or" => Token::Or,
					"nil" => Token::Nil,
					_ => Token::Ident(ident),
				});
			}
			other => return Err(FilterError::UnexpectedChar(other)),
		}
	}
	Ok(tokens)
}

struct Parser {
	tokens: Vec<Token>,
	pos: usize,
}

impl Parser {
	fn next(&mut self) -> Option<Token> {
		let token = self.tokens.get(self.pos).cloned();
		if token.is_some() {
			self.pos += 1;
		}
		token
	}

	fn peek(&self) -> Option<&Token> {
		self.tokens.get(self.pos)
	}

	fn expression(&mut self) -> Result<Expr, FilterError> {
		let mut expr = self.operand()?;
		loop {
			match self.peek() {
				Some(Token::And) => {
					self.pos += 1;
					expr = Expr::And(Box::new(expr), Box::new(self.operand()?));
				}
				Some(Token::Or) => {
					self.pos += 1;
					expr = Expr::Or(Box::new(expr), Box::new(self.operand()?));
				}
				_ => return Ok(expr),
			}
		}
	}

	fn operand(&mut self) -> Result<Expr, FilterError> {
		match self.next() {
			Some(Token::LParen) => {
				let expr = self.expression()?;
				match self.next() {
					Some(Token::RParen) => Ok(expr),
					Some(token) => Err(FilterError::Unexpected {
						expected: "`)`",
						found: token.render(),
					}),
					None => Err(FilterError::UnexpectedEnd),
				}
			}
			Some(Token::Ident(path)) => {
				let op = match self.next() {
					Some(Token::Eq) => Op::Eq,
					Some(Token::Ne) => Op::Ne,
					Some(token) => {
						return Err(FilterError::Unexpected {
							expected: "`==` or `~=`",
							found: token.render(),
						})
					}
					None => return Err(FilterError::UnexpectedEnd),
				};
				let value = match self.next() {
					Some(Token::Int(value)) => Literal::Int(value),
					Some(Token::Str(value)) => Literal::Str(value),
					Some(Token::Nil) => Literal::Nil,
					Some(token) => {
						return Err(FilterError::Unexpected {
							expected: "an integer, a quoted string or `nil`",
							found: token.render(),
						})
					}
					None => return Err(FilterError::UnexpectedEnd),
				};
				Ok(Expr::Compare(Comparison { path, op, value }))
			}
			Some(token) => Err(FilterError::Unexpected {
				expected: "a field path or `(`",
				found: token.render(),
			}),
			None => Err(FilterError::UnexpectedEnd),
		}
	}
}
