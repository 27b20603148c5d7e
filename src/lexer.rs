//! Lexical analysis of a single input line into argument words.
//!
//! The only quote character is `"`. A backslash outside quotes keeps the next
//! character verbatim, whatever it is. Inside quotes a backslash only escapes
//! `$`, `` ` ``, `"` and `\`; before any other character the backslash itself
//! is kept.

/// Errors that can occur during the lexical analysis process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexingError {
    /// The line ended while a `"` was still open.
    #[error("unterminated quote detected")]
    UnterminatedQuote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Unquoted,
    DoubleQuote,
}

struct LexingFSM<'a> {
    input: std::str::Chars<'a>,
    state: LexingState,
    escaped: bool,
    buffer: String,
}

impl<'a> LexingFSM<'a> {
    fn new(line: &'a str) -> Self {
        LexingFSM {
            input: line.chars(),
            state: LexingState::Unquoted,
            escaped: false,
            buffer: String::new(),
        }
    }

    /// Runs the machine over the whole input and returns the collected words.
    fn make_tokens(mut self) -> Result<Vec<String>, LexingError> {
        let mut out = Vec::new();

        while let Some(ch) = self.input.next() {
            if self.escaped {
                self.handle_escaped(ch);
                continue;
            }
            match self.state {
                LexingState::Unquoted => self.handle_unquoted(ch, &mut out),
                LexingState::DoubleQuote => self.handle_double_quote(ch),
            }
        }

        // A trailing lone backslash has nothing to escape and is dropped.
        if self.state == LexingState::DoubleQuote {
            return Err(LexingError::UnterminatedQuote);
        }

        self.flush_word(&mut out);
        Ok(out)
    }

    fn handle_escaped(&mut self, ch: char) {
        self.escaped = false;
        match self.state {
            LexingState::Unquoted => self.buffer.push(ch),
            LexingState::DoubleQuote => {
                if !matches!(ch, '$' | '`' | '"' | '\\') {
                    self.buffer.push('\\');
                }
                self.buffer.push(ch);
            }
        }
    }

    fn handle_unquoted(&mut self, ch: char, out: &mut Vec<String>) {
        match ch {
            '\\' => self.escaped = true,
            '"' => self.state = LexingState::DoubleQuote,
            ' ' | '\t' => self.flush_word(out),
            c => self.buffer.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) {
        match ch {
            '\\' => self.escaped = true,
            '"' => self.state = LexingState::Unquoted,
            c => self.buffer.push(c),
        }
    }

    fn flush_word(&mut self, out: &mut Vec<String>) {
        if !self.buffer.is_empty() {
            out.push(std::mem::take(&mut self.buffer));
        }
    }
}

/// Splits `line` into words, applying quoting and escaping rules.
///
/// Runs of unquoted spaces and tabs separate words and never produce empty
/// words. Quotes may start in the middle of a word: `a"b c"d` is the single
/// word `ab cd`.
pub fn tokenize(line: &str) -> Result<Vec<String>, LexingError> {
    LexingFSM::new(line).make_tokens()
}
