/// Conversational continuity carried across invocations for one channel.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// When true, the next invocation passes `-c` so claude continues the
    /// most recent conversation instead of starting fresh.
    continued: bool,
    /// The most recent forwarded payload, kept for `!retry`.
    last_input: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_continued(&self) -> bool {
        self.continued
    }

    /// Record that a conversation exists to continue from.
    pub fn mark_started(&mut self) {
        self.continued = true;
    }

    /// Start the next invocation fresh. Leaves the last input untouched.
    pub fn reset(&mut self) {
        self.continued = false;
    }

    pub fn record_input(&mut self, text: &str) {
        self.last_input = Some(text.to_string());
    }

    pub fn last_input(&self) -> Option<&str> {
        self.last_input.as_deref()
    }
}
