//! Calculator tool: evaluates arithmetic expressions.
//!
//! Grammar (precedence climbing):
//! `+ -` < `* / %` < unary `-` < `^` (right associative) < numbers and
//! parenthesised groups.

use async_trait::async_trait;
use agentrelay_core::error::ToolError;
use agentrelay_core::tool::{Tool, ToolContext, ToolOutcome};
use std::iter::Peekable;
use std::str::Chars;

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports + - * / % ^, parentheses and decimals."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The expression to evaluate, e.g. '(2 + 3) * 4'"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _context: &ToolContext,
    ) -> Result<ToolOutcome, ToolError> {
        let expr = arguments["expression"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'expression' argument".into()))?;

        let value = evaluate(expr).map_err(|reason| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason,
        })?;
        Ok(ToolOutcome::value(format_number(value)))
    }
}

/// Render integers without a trailing `.0`.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Evaluate an arithmetic expression.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let mut parser = ExprParser {
        chars: expr.chars().peekable(),
    };
    let value = parser.expression(0)?;
    parser.skip_whitespace();
    match parser.chars.peek() {
        None => Ok(value),
        Some(c) => Err(format!("Unexpected '{c}'")),
    }
}

struct ExprParser<'a> {
    chars: Peekable<Chars<'a>>,
}

/// Binding power of a binary operator: (left, right).
fn binding_power(op: char) -> Option<(u8, u8)> {
    match op {
        '+' | '-' => Some((1, 2)),
        '*' | '/' | '%' => Some((3, 4)),
        '^' => Some((6, 5)),
        _ => None,
    }
}

const UNARY_POWER: u8 = 5;

impl ExprParser<'_> {
    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
    }

    fn expression(&mut self, min_power: u8) -> Result<f64, String> {
        let mut lhs = self.operand()?;

        loop {
            self.skip_whitespace();
            let Some(&op) = self.chars.peek() else { break };
            let Some((left, right)) = binding_power(op) else { break };
            if left < min_power {
                break;
            }
            self.chars.next();
            let rhs = self.expression(right)?;
            lhs = apply(op, lhs, rhs)?;
        }

        Ok(lhs)
    }

    fn operand(&mut self) -> Result<f64, String> {
        self.skip_whitespace();
        match self.chars.peek().copied() {
            Some('-') => {
                self.chars.next();
                Ok(-self.expression(UNARY_POWER)?)
            }
            Some('(') => {
                self.chars.next();
                let value = self.expression(0)?;
                self.skip_whitespace();
                match self.chars.next() {
                    Some(')') => Ok(value),
                    _ => Err("Expected closing parenthesis".into()),
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) => Err(format!("Unexpected '{c}'")),
            None => Err("Unexpected end of expression".into()),
        }
    }

    fn number(&mut self) -> Result<f64, String> {
        let mut literal = String::new();
        while let Some(c) = self.chars.next_if(|c| c.is_ascii_digit() || *c == '.') {
            literal.push(c);
        }
        literal
            .parse()
            .map_err(|_| format!("Invalid number: {literal}"))
    }
}

fn apply(op: char, lhs: f64, rhs: f64) -> Result<f64, String> {
    match op {
        '+' => Ok(lhs + rhs),
        '-' => Ok(lhs - rhs),
        '*' => Ok(lhs * rhs),
        '/' | '%' if rhs == 0.0 => Err("Division by zero".into()),
        '/' => Ok(lhs / rhs),
        '%' => Ok(lhs % rhs),
        '^' => Ok(lhs.powf(rhs)),
        _ => Err(format!("Unknown operator '{op}'")),
    }
}
