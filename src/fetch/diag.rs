/// Buffered diagnostics for one fetch attempt.
///
/// Non-fatal problems (transport errors, unparseable documents, entries
/// without identifiers, per-entry write failures, notification failures)
/// are appended here as they happen and flushed once at the end of the
/// fetch into the status row's `error_msg` and a single combined log line.
#[derive(Debug, Default)]
pub struct Diagnostics {
    messages: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one diagnostic message.
    pub fn push(&mut self, msg: impl Into<String>) {
        self.messages.push(msg.into());
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drain all accumulated messages into one newline-joined string.
    pub fn flush(&mut self) -> String {
        let joined = self.messages.join("\n");
        self.messages.clear();
        joined
    }
}
