//! Built-in tools: arithmetic and clock.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::iter::Peekable;
use std::str::Chars;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::{ParamSpec, ParamType, Tool};
use crate::error::AgentError;

/// Default `current_time` output format.
const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Evaluates arithmetic expressions (`+ - * /`, parentheses, unary minus).
#[derive(Debug, Clone, Copy, Default)]
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &'static str {
        "calculator"
    }

    fn description(&self) -> &'static str {
        "计算数学表达式，支持加减乘除和括号"
    }

    fn parameters(&self) -> BTreeMap<String, ParamSpec> {
        BTreeMap::from([(
            "expression".to_string(),
            ParamSpec::required(ParamType::String).describe("要计算的表达式，例如 (1+2)*3"),
        )])
    }

    async fn execute(&self, params: &Map<String, Value>) -> Result<Value, AgentError> {
        let expression = params
            .get("expression")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let value = evaluate(expression).map_err(|message| AgentError::ToolExecution {
            name: self.name().to_string(),
            message,
        })?;
        Ok(json!({ "expression": expression, "result": number_value(value) }))
    }
}

/// Reports the current local date and time.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &'static str {
        "current_time"
    }

    fn description(&self) -> &'static str {
        "获取当前日期和时间"
    }

    fn parameters(&self) -> BTreeMap<String, ParamSpec> {
        BTreeMap::from([(
            "format".to_string(),
            ParamSpec::optional(ParamType::String, json!(DEFAULT_TIME_FORMAT))
                .describe("strftime 格式字符串"),
        )])
    }

    async fn execute(&self, params: &Map<String, Value>) -> Result<Value, AgentError> {
        let format = params
            .get("format")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_TIME_FORMAT);
        let now = chrono::Local::now();

        // chrono reports bad format specifiers through fmt::Error
        let mut formatted = String::new();
        write!(formatted, "{}", now.format(format)).map_err(|_| AgentError::ToolExecution {
            name: self.name().to_string(),
            message: format!("无效的时间格式: {format}"),
        })?;

        Ok(json!({
            "datetime": formatted,
            "timezone": now.format("%:z").to_string(),
            "weekday": now.format("%A").to_string(),
        }))
    }
}

/// Integral results are reported as JSON integers.
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

/// Evaluates an arithmetic expression.
///
/// Grammar: `expr := term (('+'|'-') term)*`, `term := factor (('*'|'/') factor)*`,
/// `factor := '-' factor | number | '(' expr ')'`.
pub fn evaluate(expression: &str) -> Result<f64, String> {
    let normalized: String = expression
        .chars()
        .map(|c| match c {
            '×' => '*',
            '÷' => '/',
            '（' => '(',
            '）' => ')',
            other => other,
        })
        .filter(|c| !c.is_whitespace())
        .collect();
    if normalized.is_empty() {
        return Err("表达式为空".to_string());
    }

    let mut parser = Parser {
        chars: normalized.chars().peekable(),
    };
    let value = parser.expr()?;
    if let Some(c) = parser.chars.next() {
        return Err(format!("无法识别的字符: {c}"));
    }
    if value.is_finite() {
        Ok(value)
    } else {
        Err("计算结果溢出".to_string())
    }
}

struct Parser<'a> {
    chars: Peekable<Chars<'a>>,
}

impl Parser<'_> {
    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        while let Some(&op) = self.chars.peek() {
            match op {
                '+' => {
                    self.chars.next();
                    value += self.term()?;
                }
                '-' => {
                    self.chars.next();
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.factor()?;
        while let Some(&op) = self.chars.peek() {
            match op {
                '*' => {
                    self.chars.next();
                    value *= self.factor()?;
                }
                '/' => {
                    self.chars.next();
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err("除数不能为零".to_string());
                    }
                    value /= divisor;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64, String> {
        match self.chars.peek().copied() {
            Some('-') => {
                self.chars.next();
                Ok(-self.factor()?)
            }
            Some('+') => {
                self.chars.next();
                self.factor()
            }
            Some('(') => {
                self.chars.next();
                let value = self.expr()?;
                match self.chars.next() {
                    Some(')') => Ok(value),
                    _ => Err("括号不匹配".to_string()),
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) => Err(format!("无法识别的字符: {c}")),
            None => Err("表达式不完整".to_string()),
        }
    }

    fn number(&mut self) -> Result<f64, String> {
        let mut literal = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                literal.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        literal
            .parse::<f64>()
            .map_err(|_| format!("无效的数字: {literal}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("1+2", 3.0; "addition")]
    #[test_case("2*3+4", 10.0; "precedence")]
    #[test_case("2*(3+4)", 14.0; "parentheses")]
    #[test_case("-5+2", -3.0; "unary minus")]
    #[test_case("7 / 2", 3.5; "division")]
    #[test_case("3×（2+1）", 9.0; "fullwidth operators")]
    fn test_evaluate(expression: &str, expected: f64) {
        let value = evaluate(expression).unwrap_or(f64::NAN);
        assert!((value - expected).abs() < 1e-9, "{expression} = {value}");
    }

    #[test_case("1/0"; "division by zero")]
    #[test_case("(1+2"; "unbalanced")]
    #[test_case("1+"; "incomplete")]
    #[test_case("abc"; "letters")]
    #[test_case(""; "empty")]
    fn test_evaluate_errors(expression: &str) {
        assert!(evaluate(expression).is_err());
    }

    #[tokio::test]
    async fn test_calculator_tool_integer_result() {
        let mut params = Map::new();
        params.insert("expression".to_string(), json!("6*7"));
        let result = CalculatorTool
            .execute(&params)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(result["result"], 42);
    }

    #[tokio::test]
    async fn test_calculator_tool_error() {
        let mut params = Map::new();
        params.insert("expression".to_string(), json!("1/0"));
        let result = CalculatorTool.execute(&params).await;
        assert!(matches!(result, Err(AgentError::ToolExecution { .. })));
    }

    #[tokio::test]
    async fn test_current_time_format() {
        let mut params = Map::new();
        params.insert("format".to_string(), json!("%Y"));
        let result = CurrentTimeTool
            .execute(&params)
            .await
            .unwrap_or_else(|_| unreachable!());
        let year = result["datetime"].as_str().unwrap_or_default();
        assert_eq!(year.len(), 4);
        assert!(year.chars().all(|c| c.is_ascii_digit()));
    }
}
