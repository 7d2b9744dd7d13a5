//! Plan scripts.
//!
//! A plan is a numbered list of steps such as
//! `$1 = lookup_customer(email="a@b.c")` followed by
//! `$2 = transfer_funds(from=$1, amount=10)`. The script is appended to the
//! goal verbatim and the model resolves `$N` references from the tool
//! results it already sees in history. Parsing here is only used to lint
//! the plan before a run.

use std::collections::HashSet;

/// Append a plan to a goal.
pub fn compose_goal(goal: &str, script: Option<&str>) -> String {
    match script.map(str::trim).filter(|s| !s.is_empty()) {
        Some(script) => format!(
            "{goal}\n\nFollow this plan. $N refers to the result of step N.\n{script}"
        ),
        None => goal.to_string(),
    }
}

/// One `$N = tool(args)` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptStep {
    pub index: u32,
    pub tool: String,
    pub arguments: String,
    /// Step numbers referenced from the arguments
    pub references: Vec<u32>,
    /// 1-based line number in the script
    pub line: usize,
    balanced: bool,
}

/// A parsed plan.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub steps: Vec<ScriptStep>,
}

impl Script {
    /// Extract steps; lines that are not `$N = tool(...)` are ignored.
    pub fn parse(text: &str) -> Self {
        let steps = text
            .lines()
            .enumerate()
            .filter_map(|(i, line)| parse_step(line.trim(), i + 1))
            .collect();
        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Problems that would confuse the model, one message per finding.
    pub fn lint(&self, known_tools: &[&str]) -> Vec<String> {
        let mut findings = Vec::new();
        let mut defined = HashSet::new();

        for step in &self.steps {
            if !defined.insert(step.index) {
                findings.push(format!("line {}: ${} is defined twice", step.line, step.index));
            }
            if !known_tools.contains(&step.tool.as_str()) {
                findings.push(format!("line {}: unknown tool '{}'", step.line, step.tool));
            }
            if !step.balanced {
                findings.push(format!("line {}: unbalanced parentheses", step.line));
            }
            for reference in &step.references {
                if *reference >= step.index {
                    findings.push(format!(
                        "line {}: ${} refers forward to ${}",
                        step.line, step.index, reference
                    ));
                } else if !defined.contains(reference) {
                    findings.push(format!(
                        "line {}: ${} is never defined",
                        step.line, reference
                    ));
                }
            }
        }

        findings
    }
}

fn parse_step(line: &str, line_no: usize) -> Option<ScriptStep> {
    let rest = line.strip_prefix('$')?;
    let (index, rest) = rest.split_once('=')?;
    let index: u32 = index.trim().parse().ok()?;

    let rest = rest.trim();
    let open = rest.find('(')?;
    let tool = rest[..open].trim();
    if tool.is_empty() || !tool.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }

    let call = &rest[open..];
    let balanced = parens_balanced(call);
    let arguments = call
        .strip_prefix('(')
        .map(|a| a.strip_suffix(')').unwrap_or(a))
        .unwrap_or_default()
        .to_string();

    Some(ScriptStep {
        index,
        tool: tool.to_string(),
        references: references(&arguments),
        arguments,
        line: line_no,
        balanced,
    })
}

fn parens_balanced(text: &str) -> bool {
    let mut depth: i32 = 0;
    let mut quoted = false;
    for c in text.chars() {
        match c {
            '"' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Every `$N` in `text`.
fn references(text: &str) -> Vec<u32> {
    let mut found = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if c != '$' {
            continue;
        }
        let mut digits = String::new();
        while let Some((_, d)) = chars.next_if(|(_, d)| d.is_ascii_digit()) {
            digits.push(d);
        }
        if let Ok(n) = digits.parse() {
            found.push(n);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"
$1 = lookup_customer(email="ada@example.com")
$2 = get_balance(customer=$1)
Then summarize for the customer.
$3 = transfer_funds(from=$1, amount=$2)
"#;

    #[test]
    fn compose_appends_script() {
        assert_eq!(compose_goal("Pay rent", None), "Pay rent");
        assert_eq!(compose_goal("Pay rent", Some("  ")), "Pay rent");
        let goal = compose_goal("Pay rent", Some(PLAN));
        assert!(goal.starts_with("Pay rent\n\n"));
        assert!(goal.contains("$3 = transfer_funds(from=$1, amount=$2)"));
    }

    #[test]
    fn parse_extracts_steps_and_references() {
        let script = Script::parse(PLAN);
        assert_eq!(script.steps.len(), 3);
        assert_eq!(script.steps[0].tool, "lookup_customer");
        assert_eq!(script.steps[0].arguments, r#"email="ada@example.com""#);
        assert_eq!(script.steps[2].references, vec![1, 2]);
        assert_eq!(script.steps[2].line, 5);
    }

    #[test]
    fn clean_plan_has_no_findings() {
        let script = Script::parse(PLAN);
        let findings =
            script.lint(&["lookup_customer", "get_balance", "transfer_funds"]);
        assert!(findings.is_empty(), "{findings:?}");
    }

    #[test]
    fn lint_reports_problems() {
        let script = Script::parse(
            "$1 = lookup(id=$2)\n$2 = refund(amount=(10)\n$2 = lookup(x=1)\n$4 = lookup(x=$3)",
        );
        let findings = script.lint(&["lookup"]);
        let joined = findings.join("\n");
        assert!(joined.contains("refers forward to $2"));
        assert!(joined.contains("unknown tool 'refund'"));
        assert!(joined.contains("unbalanced parentheses"));
        assert!(joined.contains("$2 is defined twice"));
        assert!(joined.contains("$3 is never defined"));
    }

    #[test]
    fn prose_is_not_a_step() {
        assert!(Script::parse("Pay $5 to Bob (today)").is_empty());
    }
}
