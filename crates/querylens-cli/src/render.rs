//! Terminal rendering of messages and live analysis.

use std::fmt::Write as _;

use colored::{ColoredString, Colorize};
use querylens_client::merger::LiveAnalysis;
use querylens_core::flow::IntentFlow;
use querylens_core::highlight::{HighlightStyle, highlight_segments};
use querylens_core::messages::{Message, Sender};

fn paint(text: &str, style: HighlightStyle) -> ColoredString {
    match style {
        HighlightStyle::Company => text.bright_blue().bold(),
        HighlightStyle::Crypto => text.yellow().bold(),
        HighlightStyle::Forex => text.green().bold(),
        HighlightStyle::Other => text.magenta(),
    }
}

/// Message text with its entity spans coloured by category.
pub fn highlighted(message: &Message) -> String {
    let mut out = String::with_capacity(message.text.len());
    for segment in highlight_segments(&message.text, message.highlight_entities()) {
        match segment.style() {
            Some(style) => {
                let _ = write!(out, "{}", paint(segment.text, style));
            }
            None => out.push_str(segment.text),
        }
    }
    out
}

/// One transcript line.
pub fn message_line(message: &Message) -> String {
    match message.sender {
        Sender::User => format!("{} {}", "you ›".bright_black(), highlighted(message)),
        Sender::Bot => format!("{} {}", "bot ›".cyan(), message.text),
    }
}

fn intent_line(flow: &IntentFlow) -> Option<String> {
    let intent = flow.primary_intent.as_ref()?;
    let mut line = format!("intent {} ({:.0}%)", intent.id.bold(), intent.confidence * 100.0);
    for (key, value) in &intent.metadata {
        let _ = write!(line, " {key}={value}");
    }
    Some(line)
}

/// Live analysis preview shown while typing.
pub fn live_preview(live: &LiveAnalysis) -> String {
    let mut out = String::new();
    if live.entities.is_empty() {
        out.push_str(&"no entities".bright_black().to_string());
    } else {
        let entities: Vec<String> = live
            .entities
            .iter()
            .map(|e| paint(&e.value, e.entity_type.into()).to_string())
            .collect();
        out.push_str(&entities.join(" "));
    }
    if let Some(flow) = &live.intent_flow {
        if let Some(line) = intent_line(flow) {
            out.push_str("  ");
            out.push_str(&line);
        }
        if let Some(steps) = flow.steps.as_ref().filter(|s| !s.is_empty()) {
            let labels: Vec<&str> = steps.iter().map(|s| s.label.as_str()).collect();
            let _ = write!(out, "  [{}]", labels.join(" → "));
        }
        if !flow.suggested_actions.is_empty() {
            let _ = write!(out, "  try: {}", flow.suggested_actions.join(", "));
        }
    }
    out
}

/// An informational line.
pub fn info(text: &str) -> String {
    text.bright_black().to_string()
}

/// An error line.
pub fn error(text: &str) -> String {
    text.red().to_string()
}
