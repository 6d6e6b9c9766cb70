//! Scripted page interaction replay.
//!
//! A script is JSON Lines, one step per line:
//!
//! ```text
//! {"action":"click","element":{"handle":1,"id":"email-field"}}
//! {"action":"type","text":"user@example.com"}
//! {"action":"wait","ms":600}
//! ```
//!
//! Typing emits one key-up per character carrying the element's full value,
//! like a browser `keyup` listener reading `input.value`.

use crate::collector::page::PageEventSender;
use crate::collector::types::{ElementHandle, ElementSnapshot, PageEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// One step of a replay script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Click somewhere; `element` becomes the active element (or none).
    Click {
        #[serde(default)]
        element: Option<ElementSnapshot>,
    },
    /// Type `text` into the active element.
    Type { text: String },
    /// Erase the active element's value.
    Clear,
    /// Idle for `ms` milliseconds.
    Wait { ms: u64 },
}

/// Script parsing errors.
#[derive(Debug)]
pub enum ScriptError {
    Io(String),
    Parse { line: usize, message: String },
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptError::Io(e) => write!(f, "IO error: {e}"),
            ScriptError::Parse { line, message } => {
                write!(f, "Parse error on line {line}: {message}")
            }
        }
    }
}

impl std::error::Error for ScriptError {}

/// Parse a JSON Lines script. Blank lines and `#` comments are skipped.
pub fn parse_script(content: &str) -> Result<Vec<ScriptStep>, ScriptError> {
    content
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line, text)| {
            serde_json::from_str(text).map_err(|e| ScriptError::Parse {
                line,
                message: e.to_string(),
            })
        })
        .collect()
}

/// Read and parse a script file.
pub fn load_script(path: &std::path::Path) -> Result<Vec<ScriptStep>, ScriptError> {
    let content = std::fs::read_to_string(path).map_err(|e| ScriptError::Io(e.to_string()))?;
    parse_script(&content)
}

/// Counts of what a replay emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub clicks: u64,
    pub keystrokes: u64,
    /// Keystrokes skipped because nothing held focus.
    pub unfocused_keystrokes: u64,
}

/// Replays script steps into a page collector.
pub struct ScriptPlayer {
    steps: Vec<ScriptStep>,
    keystroke_delay: Duration,
}

impl ScriptPlayer {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            keystroke_delay: Duration::from_millis(30),
        }
    }

    /// Delay between consecutive key-ups while typing.
    pub fn with_keystroke_delay(mut self, delay: Duration) -> Self {
        self.keystroke_delay = delay;
        self
    }

    pub fn steps(&self) -> &[ScriptStep] {
        &self.steps
    }

    /// Play every step in order.
    pub async fn play(&self, sender: &PageEventSender) -> PlaybackStats {
        let mut stats = PlaybackStats::default();
        let mut focused: Option<ElementHandle> = None;
        let mut values: HashMap<ElementHandle, String> = HashMap::new();

        for step in &self.steps {
            match step {
                ScriptStep::Click { element } => {
                    focused = element.as_ref().map(|e| e.handle);
                    sender.send(PageEvent::click(element.clone())).await;
                    stats.clicks += 1;
                }
                ScriptStep::Type { text } => {
                    let Some(handle) = focused else {
                        stats.unfocused_keystrokes += text.chars().count() as u64;
                        continue;
                    };
                    let value = values.entry(handle).or_default();
                    for ch in text.chars() {
                        value.push(ch);
                        sender.send(PageEvent::key_up(handle, value.clone())).await;
                        stats.keystrokes += 1;
                        if !self.keystroke_delay.is_zero() {
                            tokio::time::sleep(self.keystroke_delay).await;
                        }
                    }
                }
                ScriptStep::Clear => {
                    if let Some(handle) = focused {
                        values.insert(handle, String::new());
                        sender.send(PageEvent::key_up(handle, "")).await;
                        stats.keystrokes += 1;
                    }
                }
                ScriptStep::Wait { ms } => {
                    tokio::time::sleep(Duration::from_millis(*ms)).await;
                }
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::page::{CollectorConfig, PageCollector};

    const SCRIPT: &str = r#"
# focus the email input and type
{"action":"click","element":{"handle":1,"id":"email-field"}}
{"action":"type","text":"ab"}

{"action":"click","element":null}
{"action":"type","text":"zz"}
{"action":"wait","ms":5}
"#;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let steps = parse_script(SCRIPT).unwrap();
        assert_eq!(steps.len(), 5);
        assert_eq!(
            steps[0],
            ScriptStep::Click {
                element: Some(ElementSnapshot::new(1).with_id("email-field"))
            }
        );
        assert_eq!(steps[4], ScriptStep::Wait { ms: 5 });
    }

    #[test]
    fn test_parse_reports_line_number() {
        let err = parse_script("{\"action\":\"clear\"}\n{\"action\":\"jump\"}").unwrap_err();
        assert!(matches!(err, ScriptError::Parse { line: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_emits_growing_values() {
        let mut collector = PageCollector::new(CollectorConfig::default());
        collector.start().unwrap();
        let mut receiver = collector.take_receiver().unwrap();

        let player = ScriptPlayer::new(parse_script(SCRIPT).unwrap());
        let stats = player.play(&collector.sender()).await;

        assert_eq!(stats.clicks, 2);
        assert_eq!(stats.keystrokes, 2);
        assert_eq!(stats.unfocused_keystrokes, 2);

        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), 4);
        assert_eq!(events[1], PageEvent::key_up(ElementHandle(1), "a"));
        assert_eq!(events[2], PageEvent::key_up(ElementHandle(1), "ab"));
        assert_eq!(events[3], PageEvent::click(None));
    }
}
