//! Operator confirmation capability.

/// Asks the operator a yes/no question.
///
/// The binary backs this with a terminal prompt; tests pass closures.
pub trait Confirm {
    /// Returns `true` when the operator agrees to `prompt`.
    fn confirm(&mut self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: FnMut(&str) -> bool,
{
    fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}
