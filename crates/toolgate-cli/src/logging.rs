//! Turn log writer: the full conversation, verbatim, one timestamped file
//! per turn.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use toolgate_core::conversation::Conversation;

pub struct TurnLogger {
    dir: PathBuf,
}

impl TurnLogger {
    pub fn new(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Serialize the conversation to `conversation-<stamp>.json`.
    pub fn log_turn(&self, conversation: &Conversation) -> anyhow::Result<PathBuf> {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f");
        let path = self.dir.join(format!("conversation-{stamp}.json"));
        let file = File::create(&path)?;
        serde_json::to_writer_pretty(file, conversation.messages())?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use toolgate_core::conversation::{ContentBlock, Message, Role};

    use super::*;

    #[test]
    fn log_turn_writes_full_conversation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let logger = TurnLogger::new(dir.path()).expect("logger");

        let mut conversation = Conversation::new();
        conversation.push(Message::user("weather in Paris"));
        conversation.push(Message::new(
            Role::Assistant,
            vec![ContentBlock::FinalResponse {
                response: "18°C".into(),
            }],
        ));

        let path = logger.log_turn(&conversation).expect("log_turn");
        let raw = fs::read_to_string(&path).expect("log file readable");
        let parsed: serde_json::Value = serde_json::from_str(&raw).expect("log file is JSON");

        assert_eq!(parsed.as_array().map(|a| a.len()), Some(2));
        assert!(raw.contains("weather in Paris"));
        assert!(raw.contains("18°C"));
    }

    #[test]
    fn distinct_turns_get_distinct_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let logger = TurnLogger::new(dir.path()).expect("logger");

        let mut conversation = Conversation::new();
        conversation.push(Message::user("one"));
        let first = logger.log_turn(&conversation).expect("first log");
        std::thread::sleep(std::time::Duration::from_millis(5));
        conversation.push(Message::user("two"));
        let second = logger.log_turn(&conversation).expect("second log");

        assert_ne!(first, second);
        assert_eq!(fs::read_dir(dir.path()).expect("dir").count(), 2);
    }
}
