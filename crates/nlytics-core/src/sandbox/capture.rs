//! Per-call output buffers.
//!
//! `print` writes here instead of to the process streams. The buffers live
//! inside one execution context, so concurrent executions never interleave
//! output and nothing process-global is redirected.

const TRUNCATION_MARKER: &str = "\n[output truncated]\n";

#[derive(Debug, Clone, Default)]
struct Stream {
    text: String,
    truncated: bool,
}

impl Stream {
    fn write(&mut self, s: &str, limit: usize) {
        if self.truncated {
            return;
        }
        let room = limit.saturating_sub(self.text.len());
        if s.len() <= room {
            self.text.push_str(s);
            return;
        }
        let mut cut = room;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        self.text.push_str(&s[..cut]);
        self.text.push_str(TRUNCATION_MARKER);
        self.truncated = true;
    }
}

/// Captured stdout/stderr of one execution, each capped at `limit` bytes.
#[derive(Debug, Clone)]
pub struct OutputCapture {
    stdout: Stream,
    stderr: Stream,
    limit: usize,
}

impl OutputCapture {
    pub fn new(limit: usize) -> Self {
        Self {
            stdout: Stream::default(),
            stderr: Stream::default(),
            limit,
        }
    }

    pub fn write_stdout(&mut self, s: &str) {
        self.stdout.write(s, self.limit);
    }

    pub fn write_stderr(&mut self, s: &str) {
        self.stderr.write(s, self.limit);
    }

    pub fn stdout(&self) -> &str {
        &self.stdout.text
    }

    pub fn stderr(&self) -> &str {
        &self.stderr.text
    }

    /// Release the buffers as `(stdout, stderr)`.
    pub fn into_parts(self) -> (String, String) {
        (self.stdout.text, self.stderr.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streams_are_separate() {
        let mut cap = OutputCapture::new(1024);
        cap.write_stdout("hello\n");
        cap.write_stderr("warn\n");
        let (out, err) = cap.into_parts();
        assert_eq!(out, "hello\n");
        assert_eq!(err, "warn\n");
    }

    #[test]
    fn test_limit_truncates_once() {
        let mut cap = OutputCapture::new(8);
        cap.write_stdout("12345");
        cap.write_stdout("67890");
        cap.write_stdout("more");
        assert_eq!(cap.stdout(), "12345678\n[output truncated]\n");
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let mut cap = OutputCapture::new(3);
        cap.write_stdout("aé€");
        assert!(cap.stdout().starts_with("aé"));
    }
}
