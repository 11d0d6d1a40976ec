use tracing::debug;

/// Incremental scanner that extracts complete top-level JSON objects from a
/// growing stream of text forming one outer JSON array.
///
/// The scanner is single-pass: each character is examined exactly once, so it
/// emits identical objects regardless of where chunk boundaries fall. A
/// malformed object is dropped and scanning continues; input that never opens
/// `[` yields nothing.
#[derive(Debug, Default)]
pub struct JsonArrayScanner {
    in_array: bool,
    brace_depth: u32,
    in_string: bool,
    escape_next: bool,
    buffer: String,
}

impl JsonArrayScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every object that became syntactically
    /// closed within it, in stream order.
    pub fn push(&mut self, chunk: &str) -> Vec<serde_json::Value> {
        let mut emitted = Vec::new();

        for c in chunk.chars() {
            if !self.in_array {
                // Skip whitespace and any preamble until the array opens.
                if c == '[' {
                    self.in_array = true;
                }
                continue;
            }

            if self.brace_depth == 0 {
                // Between objects: commas and whitespace are separators.
                match c {
                    '{' => {
                        self.buffer.clear();
                        self.buffer.push(c);
                        self.brace_depth = 1;
                        self.in_string = false;
                        self.escape_next = false;
                    }
                    ']' => {
                        self.in_array = false;
                    }
                    _ => {}
                }
                continue;
            }

            // Inside an object.
            self.buffer.push(c);

            if self.escape_next {
                self.escape_next = false;
                continue;
            }

            if self.in_string {
                match c {
                    '\\' => self.escape_next = true,
                    '"' => self.in_string = false,
                    _ => {}
                }
                continue;
            }

            match c {
                '"' => self.in_string = true,
                '{' => self.brace_depth += 1,
                '}' => {
                    self.brace_depth -= 1;
                    if self.brace_depth == 0 {
                        match serde_json::from_str(&self.buffer) {
                            Ok(value) => emitted.push(value),
                            Err(e) => {
                                debug!(error = %e, "Dropping malformed object from stream");
                            }
                        }
                        self.buffer.clear();
                    }
                }
                _ => {}
            }
        }

        emitted
    }
}
