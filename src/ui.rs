use crate::constants::TRUNCATE_ELLIPSIS_CHARS;
use crate::pool::SlotAssignment;
use anyhow::{Context, Result};
use std::io::{BufRead, IsTerminal, Write};

pub(crate) fn progress(message: &str) {
    eprintln!("==> {message}");
}

/// Terminal questions the pool may need answered. Implementations that cannot
/// ask anything report `is_interactive() == false` and callers fail fast.
pub(crate) trait Prompter {
    fn is_interactive(&self) -> bool;

    /// Picks the assignment to evict from `candidates` (oldest first).
    /// `None` means the user declined.
    fn choose_victim(&self, branch: &str, candidates: &[SlotAssignment]) -> Result<Option<usize>>;

    fn confirm(&self, question: &str) -> Result<bool>;
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
    }

    fn choose_victim(&self, branch: &str, candidates: &[SlotAssignment]) -> Result<Option<usize>> {
        eprintln!("Pool is full. Choose a slot to evict for `{branch}`:");
        for (offset, candidate) in candidates.iter().enumerate() {
            eprintln!(
                "  [{}] {:<14} {} (assigned {})",
                offset + 1,
                candidate.slot_name,
                candidate.branch_name,
                candidate.assigned_at
            );
        }

        loop {
            let Some(answer) = read_answer("Slot to evict [1], or q to cancel: ")? else {
                return Ok(None);
            };
            match parse_victim_choice(&answer, candidates) {
                VictimChoice::Picked(offset) => return Ok(Some(offset)),
                VictimChoice::Cancelled => return Ok(None),
                VictimChoice::Invalid => eprintln!("`{answer}` is not one of the listed slots"),
            }
        }
    }

    fn confirm(&self, question: &str) -> Result<bool> {
        let answer = read_answer(&format!("{question} [y/N]: "))?;
        Ok(answer.as_deref().is_some_and(is_yes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VictimChoice {
    Picked(usize),
    Cancelled,
    Invalid,
}

/// Accepts a 1-based list number, a slot name, empty input (the oldest), or
/// `q`/`n` to cancel.
pub(crate) fn parse_victim_choice(answer: &str, candidates: &[SlotAssignment]) -> VictimChoice {
    let answer = answer.trim();
    if candidates.is_empty() {
        return VictimChoice::Cancelled;
    }
    if answer.is_empty() {
        return VictimChoice::Picked(0);
    }
    if matches!(answer.to_ascii_lowercase().as_str(), "q" | "n" | "no" | "quit") {
        return VictimChoice::Cancelled;
    }
    if let Ok(number) = answer.parse::<usize>()
        && (1..=candidates.len()).contains(&number)
    {
        return VictimChoice::Picked(number - 1);
    }
    match candidates
        .iter()
        .position(|candidate| candidate.slot_name == answer)
    {
        Some(offset) => VictimChoice::Picked(offset),
        None => VictimChoice::Invalid,
    }
}

pub(crate) fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn read_answer(prompt: &str) -> Result<Option<String>> {
    eprint!("{prompt}");
    std::io::stderr().flush().ok();
    let mut line = String::new();
    let read = std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read answer from terminal")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

pub(crate) fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let head = value
        .chars()
        .take(max.saturating_sub(TRUNCATE_ELLIPSIS_CHARS))
        .collect::<String>();
    format!("{head}...")
}
