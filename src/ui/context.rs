//! UI context for detecting interactive vs CI environments

use std::io::IsTerminal;

/// UI context that determines output behavior
#[derive(Debug, Clone)]
pub struct UiContext {
    /// Whether running in an interactive terminal
    interactive: bool,
}

impl UiContext {
    /// Detect the current environment
    pub fn detect() -> Self {
        Self {
            interactive: Self::detect_interactive(),
        }
    }

    /// Create a non-interactive context (for testing or staging logs)
    pub fn non_interactive() -> Self {
        Self { interactive: false }
    }

    /// Check if we should use colored output
    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }

    fn detect_interactive() -> bool {
        if !std::io::stdout().is_terminal() {
            return false;
        }

        // Staging runs under CI-like supervisors; keep their logs plain
        let ci_vars = ["CI", "CF_STACK", "GITHUB_ACTIONS", "GITLAB_CI", "JENKINS_URL"];
        !ci_vars.iter().any(|var| std::env::var_os(var).is_some())
    }
}
