use std::collections::VecDeque;

/// Bounded FIFO of recent words, drawn from both finalized
/// transcriptions and incoming text messages. A snapshot of the window
/// decorates outbound segments as a decoding hint.
pub struct RollingContext {
    words: VecDeque<String>,
    cap: usize,
}

impl RollingContext {
    pub fn new(cap: usize) -> Self {
        Self {
            words: VecDeque::with_capacity(cap),
            cap,
        }
    }

    /// Splits `text` on whitespace and pushes the words, evicting the
    /// oldest beyond the cap.
    pub fn push_text(&mut self, text: &str) {
        for word in text.split_whitespace() {
            self.words.push_back(word.to_string());
            while self.words.len() > self.cap {
                self.words.pop_front();
            }
        }
    }

    /// Space-joined view of the current window.
    pub fn snapshot(&self) -> String {
        let mut out = String::new();
        for (i, word) in self.words.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(word);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
