use std::io::{self, BufRead, Write};

use runchain_core::Confirm;

/// Asks yes/no questions on the terminal.
///
/// `assume_yes` answers every question without reading stdin.
pub struct TerminalConfirm {
    pub assume_yes: bool,
}

impl Confirm for TerminalConfirm {
    fn confirm(&mut self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        let mut out = io::stdout().lock();
        // A closed stdout or stdin reads as "no".
        if write!(out, "{prompt} (y/n): ").and_then(|_| out.flush()).is_err() {
            return false;
        }
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => false,
            Ok(_) => is_yes(&line),
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
