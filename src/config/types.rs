use mkvmux_core::MuxConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Cluster, cue, splitting and chapter settings.
    #[serde(default)]
    pub mux: MuxConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Write `name-001.mkv`, `name-002.mkv`, ... when split points are set
    #[serde(default = "default_true")]
    pub numbered_when_splitting: bool,

    /// Overrides the WritingApp string in the segment info
    #[serde(default)]
    pub writing_app: Option<String>,

    /// Overwrite existing output files
    #[serde(default = "default_true")]
    pub overwrite: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            numbered_when_splitting: true,
            writing_app: None,
            overwrite: true,
        }
    }
}

fn default_true() -> bool {
    true
}
