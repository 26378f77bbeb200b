//! Output functions for consistent buildpack formatting

use super::context::UiContext;
use crate::stage::{EventLevel, StagingEvent};
use console::style;

const HEADER: &str = "-----> ";
const INDENT: &str = "       ";

/// Plain log lines for one event, without styling
pub fn format_event(event: &StagingEvent) -> Vec<String> {
    let text = event.to_string();
    let mut lines = text.lines();
    let first = lines.next().unwrap_or_default();

    let mut out = vec![match event.level() {
        EventLevel::Step => format!("{HEADER}{first}"),
        EventLevel::Info => format!("{INDENT}{first}"),
        EventLevel::Warning => format!("{INDENT}**WARNING** {first}"),
        EventLevel::ProTip => format!("{INDENT}PRO TIP: {first}"),
    }];
    out.extend(lines.map(|line| format!("{INDENT}{line}")));
    out
}

/// Print one staging event
pub fn event(ctx: &UiContext, event: &StagingEvent) {
    let lines = format_event(event);
    if !ctx.use_fancy_output() {
        for line in lines {
            println!("{line}");
        }
        return;
    }

    for line in lines {
        let styled = match event.level() {
            EventLevel::Step => style(line).cyan().bold(),
            EventLevel::Info => style(line),
            EventLevel::Warning => style(line).yellow(),
            EventLevel::ProTip => style(line).green(),
        };
        println!("{styled}");
    }
}

/// Display a step header
pub fn header(ctx: &UiContext, title: &str) {
    if ctx.use_fancy_output() {
        println!("{}", style(format!("{HEADER}{title}")).cyan().bold());
    } else {
        println!("{HEADER}{title}");
    }
}

/// Display an indented line under the current step
pub fn info(_ctx: &UiContext, message: &str) {
    println!("{INDENT}{message}");
}

/// Display a warning
pub fn warning(ctx: &UiContext, message: &str) {
    let line = format!("{INDENT}**WARNING** {message}");
    if ctx.use_fancy_output() {
        println!("{}", style(line).yellow());
    } else {
        println!("{line}");
    }
}

/// Display a success step
pub fn step_ok(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        println!("  {} {}", style("[OK]").green(), message);
    } else {
        println!("  [OK] {}", message);
    }
}

/// Display a warning step with hint
pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    if ctx.use_fancy_output() {
        println!("  {} {} - {}", style("[WARN]").yellow(), message, style(hint).dim());
    } else {
        println!("  [WARN] {} - {}", message, hint);
    }
}

/// Print styled key-value pair
pub fn key_value(ctx: &UiContext, key: &str, value: &str) {
    if ctx.use_fancy_output() {
        println!("  {}: {}", style(key).dim(), value);
    } else {
        println!("  {}: {}", key, value);
    }
}
