/// Tracks how much of a streaming reply has already been printed, so each
/// cumulative partial only writes its new tail.
#[derive(Debug, Default)]
pub struct StreamingResponse {
    printed: usize,
    is_streaming: bool,
}

impl StreamingResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    /// Accept the cumulative text so far and return the part not yet printed.
    pub fn push<'a>(&mut self, cumulative: &'a str) -> &'a str {
        self.is_streaming = true;
        match cumulative.get(self.printed..) {
            Some(tail) => {
                self.printed = cumulative.len();
                tail
            }
            // Not a prefix extension; print everything again
            None => {
                self.printed = cumulative.len();
                cumulative
            }
        }
    }

    /// Finish the reply, returning whatever of `final_text` is still unprinted.
    pub fn finish<'a>(&mut self, final_text: &'a str) -> &'a str {
        let tail = final_text.get(self.printed..).unwrap_or("");
        self.clear();
        tail
    }

    pub fn clear(&mut self) {
        self.printed = 0;
        self.is_streaming = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_returns_only_new_tail() {
        let mut streaming = StreamingResponse::new();
        assert!(!streaming.is_streaming());

        assert_eq!(streaming.push("Box"), "Box");
        assert_eq!(streaming.push("Box, box"), ", box");
        assert!(streaming.is_streaming());
        assert_eq!(streaming.finish("Box, box!"), "!");
        assert!(!streaming.is_streaming());
    }

    #[test]
    fn non_boundary_offset_reprints_everything() {
        let mut streaming = StreamingResponse::new();
        streaming.push("a");
        // "é" is two bytes; offset 1 falls inside it
        assert_eq!(streaming.push("é"), "é");
    }
}
