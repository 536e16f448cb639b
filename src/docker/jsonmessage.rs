// Rendering of the engine's streamed JSON progress messages
//
// Each pull/push call returns a stream of messages. Progress messages carry a
// layer id; on a terminal every id owns a line that is redrawn in place, on
// anything else progress bars are dropped and status lines are printed as-is.

use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{self, Write};

use super::engine::EngineError;

// ANSI escape codes for terminal manipulation
mod ansi {
    pub const CLEAR_LINE: &str = "\x1B[2K";
    pub const CURSOR_TO_START: &str = "\r";

    /// Move cursor up n lines
    pub fn move_up(n: usize) -> String {
        format!("\x1B[{}A", n)
    }

    /// Move cursor down n lines
    pub fn move_down(n: usize) -> String {
        format!("\x1B[{}B", n)
    }
}

/// Error reported by the engine inside the message stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct JsonError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl JsonError {
    /// Process exit status for this error; codes outside 1..=255 become 1
    pub fn exit_code(&self) -> i32 {
        match self.code {
            1..=255 => self.code as i32,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JsonProgress {
    pub current: Option<i64>,
    pub total: Option<i64>,
}

impl JsonProgress {
    /// Fallback rendering used when the engine sent no pre-rendered bar
    fn render(&self) -> String {
        let current = self.current.unwrap_or(0);
        let total = self.total.unwrap_or(0);
        if current <= 0 && total <= 0 {
            return String::new();
        }
        if total <= 0 {
            return human_size(current);
        }
        format!("{}/{}", human_size(current), human_size(total))
    }
}

/// One message from an engine pull/push stream
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonMessage {
    pub id: Option<String>,
    pub status: Option<String>,
    pub progress: Option<String>,
    pub progress_detail: Option<JsonProgress>,
    pub stream: Option<String>,
    pub error: Option<String>,
    pub error_detail: Option<JsonError>,
    pub aux: Option<serde_json::Value>,
}

impl JsonMessage {
    #[cfg(test)]
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Default::default()
        }
    }

    /// Protocol error carried by this message, if any
    pub fn json_error(&self) -> Option<JsonError> {
        match (&self.error_detail, &self.error) {
            (Some(detail), error) if !detail.message.is_empty() || error.is_none() => {
                Some(detail.clone())
            }
            (detail, Some(message)) => Some(JsonError {
                code: detail.as_ref().map(|d| d.code).unwrap_or(0),
                message: message.clone(),
            }),
            _ => None,
        }
    }

    fn has_progress(&self) -> bool {
        self.progress.is_some() || self.progress_detail.is_some()
    }

    fn progress_text(&self) -> String {
        match (&self.progress, &self.progress_detail) {
            (Some(progress), _) => progress.clone(),
            (None, Some(detail)) => detail.render(),
            (None, None) => String::new(),
        }
    }

    /// Write this message to `out`
    pub fn display<W: Write>(&self, out: &mut W, is_terminal: bool) -> Result<(), DisplayError> {
        if let Some(error) = self.json_error() {
            if error.code == 401 {
                return Err(JsonError {
                    code: 401,
                    message: "authentication is required".to_string(),
                }
                .into());
            }
            return Err(error.into());
        }

        let progress = self.progress_text();
        let mut endl = "";
        if is_terminal && self.stream.is_none() && self.has_progress() {
            write!(out, "{}", ansi::CLEAR_LINE)?;
            endl = ansi::CURSOR_TO_START;
            write!(out, "{}", endl)?;
        } else if !progress.is_empty() {
            // progress bars are meaningless without cursor control
            return Ok(());
        }

        if let Some(id) = &self.id {
            write!(out, "{}: ", id)?;
        }

        let status = self.status.as_deref().unwrap_or("");
        if self.has_progress() && is_terminal {
            write!(out, "{} {}{}", status, progress, endl)?;
        } else if let Some(stream) = &self.stream {
            write!(out, "{}{}", stream, endl)?;
        } else {
            writeln!(out, "{}{}", status, endl)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error(transparent)]
    Json(#[from] JsonError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Failed to write output: {0}")]
    Io(#[from] io::Error),
}

/// Extract the image ID from an aux payload (`{"ID": "sha256:..."}`)
pub fn aux_image_id(aux: &serde_json::Value) -> Option<String> {
    #[derive(Deserialize)]
    struct BuildResult {
        #[serde(rename = "ID")]
        id: String,
    }

    serde_json::from_value::<BuildResult>(aux.clone())
        .ok()
        .map(|result| result.id)
}

/// Render a stream of engine messages until it ends or an error occurs.
///
/// Messages with an `aux` payload are handed to `aux_callback` instead of
/// being rendered. Output is flushed once the stream completes.
pub async fn display_json_messages_stream<S, W, F>(
    mut stream: S,
    out: &mut W,
    is_terminal: bool,
    mut aux_callback: F,
) -> Result<(), DisplayError>
where
    S: Stream<Item = Result<JsonMessage, EngineError>> + Unpin,
    W: Write,
    F: FnMut(&mut W, &serde_json::Value) -> io::Result<()>,
{
    // id -> line index, counted from the first progress line
    let mut ids: HashMap<String, usize> = HashMap::new();

    while let Some(item) = stream.next().await {
        let message = item?;

        if let Some(aux) = &message.aux {
            aux_callback(out, aux)?;
            continue;
        }

        let mut diff = 0;
        match &message.id {
            Some(id) if message.has_progress() => {
                let line = match ids.get(id) {
                    Some(line) => *line,
                    None => {
                        let line = ids.len();
                        ids.insert(id.clone(), line);
                        if is_terminal {
                            writeln!(out)?;
                        }
                        line
                    }
                };
                diff = ids.len() - line;
                if is_terminal && diff > 0 {
                    write!(out, "{}", ansi::move_up(diff))?;
                }
            }
            _ => {
                // Anything that isn't progress output ends the current block
                ids.clear();
            }
        }

        let result = message.display(out, is_terminal);
        if message.id.is_some() && is_terminal && diff > 0 {
            write!(out, "{}", ansi::move_down(diff))?;
        }
        result?;
    }

    out.flush()?;
    Ok(())
}

fn human_size(bytes: i64) -> String {
    const UNITS: &[&str] = &["B", "kB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1000.0 && unit < UNITS.len() - 1 {
        size /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{}{}", bytes, UNITS[0])
    } else {
        format!("{:.3}{}", size, UNITS[unit]).replace(".000", "")
    }
}
