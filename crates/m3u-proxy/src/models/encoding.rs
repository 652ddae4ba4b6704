//! `EncodingProfile` (spec §3, §4.6, §6.4 `transcoder_binary`).

use serde::{Deserialize, Serialize};

use super::Id;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingProfile {
    pub id: Id,
    pub name: String,
    /// Argv template with `{input}` / `{output}` placeholders, e.g.
    /// `["-i", "{input}", "-c:v", "libx264", "-f", "mpegts", "{output}"]`.
    /// `{output}` is conventionally `pipe:1` (stdout).
    pub transcoder_argv_template: Vec<String>,
    pub acceptable_inputs: Vec<String>,
}

impl EncodingProfile {
    /// Render the argv with `input_url` substituted for `{input}` and
    /// `pipe:1` substituted for `{output}`.
    pub fn render_argv(&self, input_url: &str) -> Vec<String> {
        self.transcoder_argv_template
            .iter()
            .map(|arg| arg.replace("{input}", input_url).replace("{output}", "pipe:1"))
            .collect()
    }
}
