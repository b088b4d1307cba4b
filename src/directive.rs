/// A control token typed into the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// `!new`: start the next invocation as a fresh conversation.
    New,
    /// `!sleep`: stop the sleep inhibitor.
    Sleep,
    /// `!awake`: start the sleep inhibitor.
    Awake,
    /// `!stop`: cancel the running invocation.
    Stop,
    /// `!retry`: resubmit the last payload.
    Retry,
    /// `!help`: list the directives.
    Help,
}

impl Directive {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "!new" => Some(Self::New),
            "!sleep" => Some(Self::Sleep),
            "!awake" => Some(Self::Awake),
            "!stop" => Some(Self::Stop),
            "!retry" => Some(Self::Retry),
            "!help" => Some(Self::Help),
            _ => None,
        }
    }
}

/// Classified inbound text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input<'a> {
    Empty,
    Directive(Directive),
    /// Text to forward to claude, already trimmed.
    Payload(&'a str),
}

impl<'a> Input<'a> {
    /// Classify `text`. Directives must match exactly after trimming;
    /// `!new please` is a payload.
    pub fn parse(text: &'a str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            return Self::Empty;
        }
        match Directive::from_token(text) {
            Some(directive) => Self::Directive(directive),
            None => Self::Payload(text),
        }
    }
}

pub const HELP_TEXT: &str = "\
Commands:
`!new`   start a new conversation
`!stop`  cancel the running request
`!retry` resend the last message
`!sleep` allow the machine to sleep
`!awake` keep the machine awake
`!help`  show this list
Anything else is sent to claude.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_is_empty() {
        assert_eq!(Input::parse(""), Input::Empty);
        assert_eq!(Input::parse("  \n\t"), Input::Empty);
    }

    #[test]
    fn directives_are_trimmed() {
        assert_eq!(Input::parse("  !new\n"), Input::Directive(Directive::New));
        assert_eq!(Input::parse("!stop"), Input::Directive(Directive::Stop));
        assert_eq!(Input::parse("!retry"), Input::Directive(Directive::Retry));
        assert_eq!(Input::parse("!sleep"), Input::Directive(Directive::Sleep));
        assert_eq!(Input::parse("!awake"), Input::Directive(Directive::Awake));
        assert_eq!(Input::parse("!help"), Input::Directive(Directive::Help));
    }

    #[test]
    fn anything_else_is_a_payload() {
        assert_eq!(Input::parse(" fix the tests "), Input::Payload("fix the tests"));
        assert_eq!(Input::parse("!new please"), Input::Payload("!new please"));
        assert_eq!(Input::parse("!NEW"), Input::Payload("!NEW"));
    }

    #[test]
    fn help_lists_every_directive() {
        for token in ["!new", "!stop", "!retry", "!sleep", "!awake", "!help"] {
            assert!(HELP_TEXT.contains(token), "missing {token}");
        }
    }
}
