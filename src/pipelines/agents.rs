//! Prompt construction and output parsing for the agent steps.
//!
//! Parsing is intentionally forgiving: plans are split on `### Task N`
//! headings and reviews are judged by a `Verdict:` line.

use crate::domain::{ExecutionState, ReviewResult};
use regex::Regex;
use std::sync::OnceLock;

pub const ARCHITECT: &str = "architect";
pub const DEVELOPER: &str = "developer";
pub const REVIEWER: &str = "reviewer";

/// Characters kept from a plan for its one-line summary.
const SUMMARY_MAX_CHARS: usize = 200;

const TASK_HEADING_PATTERN: &str = r"(?mi)^#{2,4}\s*Task\s+\d+";
const VERDICT_PATTERN: &str =
    r"(?i)(?:##\s*)?Verdict[:\*\s]*\**\s*(APPROVED|CHANGES\s*_?\s*REQUESTED|NEEDS\s*_?\s*REVISION)";

fn task_heading_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TASK_HEADING_PATTERN).ok()).as_ref()
}

fn verdict_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(VERDICT_PATTERN).ok()).as_ref()
}

pub fn architect_system_prompt() -> &'static str {
    "You are the architect. Produce an implementation plan in markdown. \
     Start with a `Summary:` line. Split multi-step work into `### Task N: <title>` sections."
}

pub fn developer_system_prompt() -> &'static str {
    "You are the developer. Make the requested change in the working directory and describe what you did."
}

pub fn reviewer_system_prompt() -> &'static str {
    "You are the reviewer. Review the change in the working directory. \
     List problems as `- ` bullets and finish with `Verdict: APPROVED` or `Verdict: CHANGES REQUESTED`."
}

pub fn architect_prompt(state: &ExecutionState) -> String {
    let mut prompt = String::from("Write an implementation plan.\n");
    if let Some(issue) = state.issue() {
        prompt.push_str(&format!("\n## Issue\n{}\n", issue));
    }
    if let Some(design) = state.design() {
        prompt.push_str(&format!("\n## Design\n{}\n", design));
    }
    prompt
}

pub fn developer_prompt(state: &ExecutionState) -> String {
    let mut prompt = String::new();
    match (state.plan_markdown(), state.total_tasks()) {
        (Some(plan), Some(total)) => prompt.push_str(&format!(
            "Implement task {} of {} from this plan.\n\n{}\n",
            state.current_task_index() + 1,
            total,
            plan
        )),
        (Some(plan), None) => prompt.push_str(&format!("Implement this plan.\n\n{}\n", plan)),
        (None, _) => {
            prompt.push_str("Address the review of the current changes.\n");
            if let Some(issue) = state.issue() {
                prompt.push_str(&format!("\n## Issue\n{}\n", issue));
            }
        }
    }
    if let Some(review) = state.last_review().filter(|r| !r.approved) {
        prompt.push_str(&format!("\n## Reviewer feedback\n{}\n", review.summary));
        for comment in &review.comments {
            prompt.push_str(&format!("- {}\n", comment));
        }
    }
    prompt
}

pub fn reviewer_prompt(state: &ExecutionState) -> String {
    let mut prompt = String::from("Review the current changes in the working directory.\n");
    if let Some(total) = state.total_tasks() {
        prompt.push_str(&format!(
            "Only task {} of {} is expected to be done.\n",
            state.current_task_index() + 1,
            total
        ));
    }
    if let Some(plan) = state.plan_markdown() {
        prompt.push_str(&format!("\n## Plan\n{}\n", plan));
    } else if let Some(issue) = state.issue() {
        prompt.push_str(&format!("\n## Issue\n{}\n", issue));
    }
    prompt
}

/// Number of `### Task N` sections, or `None` for a single-shot plan.
pub fn count_tasks(plan: &str) -> Option<u32> {
    let count = match task_heading_regex() {
        Some(re) => re.find_iter(plan).count(),
        None => plan
            .lines()
            .filter(|l| l.trim_start().trim_start_matches('#').trim_start().starts_with("Task "))
            .count(),
    };
    u32::try_from(count).ok().filter(|c| *c > 0)
}

/// The plan's `Summary:` line, or its first prose line.
pub fn plan_summary(plan: &str) -> String {
    let summary_line = plan
        .lines()
        .find_map(|l| l.trim().strip_prefix("Summary:").map(str::trim))
        .or_else(|| {
            plan.lines()
                .map(str::trim)
                .find(|l| !l.is_empty() && !l.starts_with('#'))
        })
        .unwrap_or_default();
    summary_line.chars().take(SUMMARY_MAX_CHARS).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewVerdict {
    Approved,
    ChangesRequested,
    ParseFailure { reason: String },
}

impl ReviewVerdict {
    /// Parse failures count as requested changes.
    pub fn needs_revision(&self) -> bool {
        !matches!(self, Self::Approved)
    }
}

pub fn parse_verdict(report: &str) -> ReviewVerdict {
    let verdict = match verdict_regex() {
        Some(re) => re
            .captures(report)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_uppercase()),
        None => None,
    };

    match verdict {
        Some(v) if v == "APPROVED" => ReviewVerdict::Approved,
        Some(_) => ReviewVerdict::ChangesRequested,
        None => ReviewVerdict::ParseFailure {
            reason: "No valid Verdict found in review".to_string(),
        },
    }
}

/// Builds a review record from raw reviewer output.
pub fn review_result(report: &str) -> ReviewResult {
    let verdict = parse_verdict(report);
    let comments: Vec<String> = report
        .lines()
        .filter_map(|l| l.trim().strip_prefix("- ").map(|c| c.trim().to_string()))
        .collect();
    let summary = match &verdict {
        ReviewVerdict::ParseFailure { reason } => reason.clone(),
        _ => report
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty() && !l.starts_with("- "))
            .unwrap_or_default()
            .chars()
            .take(SUMMARY_MAX_CHARS)
            .collect(),
    };
    ReviewResult {
        reviewer: REVIEWER.to_string(),
        approved: !verdict.needs_revision(),
        summary,
        comments,
    }
}

#[cfg(test)]
#[path = "tests/agents_tests.rs"]
mod tests;
