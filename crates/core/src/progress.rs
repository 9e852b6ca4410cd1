// crates/core/src/progress.rs
//! Coarse progress estimation from the inventory tool's text output.
//!
//! The tool reports no structured progress, so the percentage is derived
//! from substring markers. The estimate never decreases and never exceeds 100.

/// Percentage reported once a request has been validated.
pub const STARTING_PERCENT: u8 = 10;
/// Percentage reported just before the process is dispatched.
pub const DISPATCH_PERCENT: u8 = 20;
/// Baseline once the process is running.
pub const RUNNING_PERCENT: u8 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Jump to an absolute value.
    Set(u8),
    /// Advance by `delta`, never past `ceiling`.
    Advance { delta: u8, ceiling: u8 },
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub trigger: &'static str,
    pub effect: Effect,
}

/// Rules in priority order; the first trigger found in a line wins.
pub const RULES: &[Rule] = &[
    Rule {
        trigger: "Connecting to Azure",
        effect: Effect::Set(40),
    },
    Rule {
        trigger: "Processing",
        effect: Effect::Advance {
            delta: 5,
            ceiling: 80,
        },
    },
    Rule {
        trigger: "Generating",
        effect: Effect::Advance {
            delta: 5,
            ceiling: 90,
        },
    },
];

/// Estimate the new percentage after `line` was printed.
pub fn estimate(current: u8, line: &str) -> u8 {
    estimate_with(RULES, current, line)
}

pub fn estimate_with(rules: &[Rule], current: u8, line: &str) -> u8 {
    let current = current.min(100);
    let Some(rule) = rules.iter().find(|r| line.contains(r.trigger)) else {
        return current;
    };
    let proposed = match rule.effect {
        Effect::Set(value) => value,
        Effect::Advance { delta, ceiling } => current.saturating_add(delta).min(ceiling),
    };
    proposed.max(current).min(100)
}
