use std::collections::VecDeque;

/// Bounded, insertion-ordered command history. Oldest entries are evicted first.
#[derive(Debug)]
pub struct History {
    entries: VecDeque<String>,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    pub fn push(&mut self, line: String) {
        if self.entries.len() == self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(line);
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Escape {
    #[default]
    None,
    /// Saw ESC.
    Start,
    /// Inside a CSI sequence (`ESC [` ... final byte).
    Csi,
}

/// Reassembles submitted keystrokes into command lines.
///
/// Clients may send input a byte at a time, so partial lines are held until
/// a terminator arrives. LF or CR completes a line (CRLF counts once),
/// DEL/BS erase the previous character, Ctrl-C and Ctrl-U discard the
/// pending line, and escape sequences (arrow keys and the like) are dropped.
/// A multi-byte character split across writes is held until it completes.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<char>,
    /// Leading bytes of an incomplete UTF-8 sequence from the last write.
    partial: Vec<u8>,
    last_was_cr: bool,
    escape: Escape,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw input; returns the trimmed, non-empty lines it completed.
    pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
        let mut completed = Vec::new();
        for ch in self.decode(data).chars() {
            self.push_char(ch, &mut completed);
        }
        completed
    }

    /// Decode `data` behind any bytes held from the previous write. Invalid
    /// sequences become U+FFFD; a truncated trailing sequence is kept back.
    fn decode(&mut self, data: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.partial);
        bytes.extend_from_slice(data);

        let mut text = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(bad) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            self.partial = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        text
    }

    fn push_char(&mut self, ch: char, completed: &mut Vec<String>) {
        match self.escape {
            Escape::Start => {
                self.escape = if ch == '[' { Escape::Csi } else { Escape::None };
                return;
            }
            Escape::Csi => {
                if ('\u{40}'..='\u{7e}').contains(&ch) {
                    self.escape = Escape::None;
                }
                return;
            }
            Escape::None => {}
        }

        let after_cr = std::mem::replace(&mut self.last_was_cr, false);
        match ch {
            '\n' if after_cr => {}
            '\r' | '\n' => {
                self.last_was_cr = ch == '\r';
                let line: String = self.pending.drain(..).collect();
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    completed.push(trimmed.to_string());
                }
            }
            '\u{7f}' | '\u{8}' => {
                self.pending.pop();
            }
            '\u{3}' | '\u{15}' => self.pending.clear(),
            '\u{1b}' => self.escape = Escape::Start,
            '\t' => self.pending.push(ch),
            c if c.is_control() => {}
            c => self.pending.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_bounded_and_evicts_oldest() {
        let mut history = History::new(3);
        for cmd in ["one", "two", "three", "four"] {
            history.push(cmd.to_string());
        }
        assert_eq!(history.entries(), vec!["two", "three", "four"]);
    }

    #[test]
    fn history_keeps_duplicates() {
        let mut history = History::new(5);
        history.push("ls".into());
        history.push("ls".into());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn assembles_line_split_across_writes() {
        let mut asm = LineAssembler::new();
        assert!(asm.feed(b"ec").is_empty());
        assert!(asm.feed(b"ho h").is_empty());
        assert_eq!(asm.feed(b"i\n"), vec!["echo hi"]);
    }

    #[test]
    fn crlf_counts_as_one_terminator() {
        let mut asm = LineAssembler::new();
        assert_eq!(asm.feed(b"pwd\r\nls\r"), vec!["pwd", "ls"]);
        assert!(asm.feed(b"\n").is_empty());
    }

    #[test]
    fn backspace_and_ctrl_c() {
        let mut asm = LineAssembler::new();
        assert_eq!(asm.feed(b"lss\x7f -la\n"), vec!["ls -la"]);
        assert!(asm.feed(b"rm -rf /tmp/x\x03\n").is_empty());
    }

    #[test]
    fn escape_sequences_are_dropped() {
        let mut asm = LineAssembler::new();
        assert_eq!(asm.feed(b"\x1b[Aecho up\x1b[D\n"), vec!["echo up"]);
    }

    #[test]
    fn multibyte_characters_survive_byte_at_a_time_input() {
        let mut asm = LineAssembler::new();
        let mut lines = Vec::new();
        for byte in "echo é → 日本\n".bytes() {
            lines.extend(asm.feed(&[byte]));
        }
        assert_eq!(lines, vec!["echo é → 日本"]);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_held() {
        let mut asm = LineAssembler::new();
        assert_eq!(asm.feed(b"ls \xff\n"), vec!["ls \u{fffd}"]);
        // A truncated sequence followed by a terminator is not a character.
        assert_eq!(asm.feed(b"pwd \xc3"), Vec::<String>::new());
        assert_eq!(asm.feed(b"\n"), vec!["pwd \u{fffd}"]);
    }

    #[test]
    fn lines_are_trimmed_and_blank_lines_skipped() {
        let mut asm = LineAssembler::new();
        assert_eq!(asm.feed(b"   \n  whoami  \n"), vec!["whoami"]);
    }
}
