//! Terminal rendering of message snapshots: each snapshot replaces the previous one for the same
//! message, so only the newly appended text is printed.

use std::io::{self, Write};

use claudette::conversation::{ContentBlock, Message, Role};

const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const RESULT_PREVIEW: usize = 200;

#[derive(Default)]
pub struct Renderer {
    message_id: Option<String>,
    /// Bytes already printed per block of the current message.
    printed: Vec<usize>,
}

impl Renderer {
    pub fn render(&mut self, message: &Message, out: &mut impl Write) -> io::Result<()> {
        match message.role {
            Role::User => self.render_tool_results(message, out),
            Role::Assistant => self.render_assistant(message, out),
        }
    }

    fn render_assistant(&mut self, message: &Message, out: &mut impl Write) -> io::Result<()> {
        if self.message_id.as_deref() != Some(message.id.as_str()) {
            self.message_id = Some(message.id.clone());
            self.printed.clear();
        }
        for (i, block) in message.content.iter().enumerate() {
            if i == self.printed.len() {
                if i > 0 {
                    writeln!(out)?;
                }
                if matches!(block, ContentBlock::Thinking { .. }) {
                    write!(out, "{}thinking: {}", DIM, RESET)?;
                }
                self.printed.push(0);
            }
            let done = self.printed[i];
            match block {
                ContentBlock::Text { text } => {
                    write!(out, "{}", text.get(done..).unwrap_or(""))?;
                    self.printed[i] = text.len();
                }
                ContentBlock::Thinking { thinking } => {
                    write!(out, "{}{}{}", DIM, thinking.get(done..).unwrap_or(""), RESET)?;
                    self.printed[i] = thinking.len();
                }
                // input is only complete once streaming ends
                ContentBlock::ToolUse { name, input, .. } if !message.is_streaming && done == 0 => {
                    write!(out, "[tool] {} {}", name, input)?;
                    self.printed[i] = 1;
                }
                _ => {}
            }
        }
        if !message.is_streaming {
            writeln!(out)?;
        }
        out.flush()
    }

    fn render_tool_results(&mut self, message: &Message, out: &mut impl Write) -> io::Result<()> {
        for block in &message.content {
            if let ContentBlock::ToolResult {
                content, is_error, ..
            } = block
            {
                let status = if *is_error { "error" } else { "ok" };
                let preview: String = content.chars().take(RESULT_PREVIEW).collect();
                let ellipsis = if preview.len() < content.len() { "..." } else { "" };
                writeln!(out, "{}[result: {}] {}{}{}", DIM, status, preview.trim_end(), ellipsis, RESET)?;
            }
        }
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: &str, content: Vec<ContentBlock>, is_streaming: bool) -> Message {
        let mut m = Message::new("c", Role::Assistant, content);
        m.id = id.to_string();
        m.is_streaming = is_streaming;
        m
    }

    #[test]
    fn prints_only_new_text() {
        let mut r = Renderer::default();
        let mut out = Vec::new();
        r.render(&snapshot("m", vec![ContentBlock::text("Hel")], true), &mut out).unwrap();
        r.render(&snapshot("m", vec![ContentBlock::text("Hello")], true), &mut out).unwrap();
        r.render(&snapshot("m", vec![ContentBlock::text("Hello")], false), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Hello\n");
    }

    #[test]
    fn tool_call_printed_once_finished() {
        let mut r = Renderer::default();
        let mut out = Vec::new();
        let call = |input: &str| ContentBlock::ToolUse {
            id: "t".to_string(),
            name: "list_files".to_string(),
            input: input.to_string(),
        };
        r.render(&snapshot("m", vec![call("{\"pa")], true), &mut out).unwrap();
        r.render(&snapshot("m", vec![call("{\"path\":\".\"}")], false), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[tool] list_files {\"path\":\".\"}\n"
        );
    }

    #[test]
    fn user_text_is_not_echoed() {
        let mut r = Renderer::default();
        let mut out = Vec::new();
        let m = Message::new("c", Role::User, vec![ContentBlock::text("hi")]);
        r.render(&m, &mut out).unwrap();
        assert!(out.is_empty());
    }
}
