use std::io;

use reedline::{DefaultPrompt, DefaultPromptSegment, FileBackedHistory, Reedline, Signal};
use tracing::warn;

const HISTORY_SIZE: usize = 500;

pub struct Repl {
    line_editor: Reedline,
    prompt: DefaultPrompt,
}

impl Repl {
    pub fn new() -> Self {
        let mut line_editor = Reedline::create();

        // Question history survives restarts when the data dir is writable.
        if let Some(dir) = dirs::data_dir().map(|d| d.join("leki")) {
            let history = std::fs::create_dir_all(&dir)
                .and_then(|_| {
                    FileBackedHistory::with_file(HISTORY_SIZE, dir.join("chat_history.txt"))
                        .map_err(|e| io::Error::other(e.to_string()))
                });
            match history {
                Ok(history) => line_editor = line_editor.with_history(Box::new(history)),
                Err(e) => warn!("Chat history disabled: {}", e),
            }
        }

        Self {
            line_editor,
            prompt: DefaultPrompt::new(
                DefaultPromptSegment::Basic("leki".to_string()),
                DefaultPromptSegment::Empty,
            ),
        }
    }

    /// `Ok(None)` on Ctrl-C or Ctrl-D.
    pub fn read_line(&mut self) -> Result<Option<String>, io::Error> {
        match self.line_editor.read_line(&self.prompt)? {
            Signal::Success(buffer) => Ok(Some(buffer)),
            _ => Ok(None),
        }
    }
}
