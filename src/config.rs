/// Build-time knobs for the proctoring pipeline.
///
/// Per-attempt values (assessment ids, warning threshold overrides) arrive
/// through the command surface instead; this struct only carries what the
/// embedding application fixes once when it registers the plugin.
#[derive(Debug, Clone)]
pub struct ProctorConfig {
    /// Base URL of the assessment backend, without a trailing slash.
    pub api_base_url: String,

    /// How often the fragment buffer is drained into one uploaded segment.
    pub flush_interval_ms: u64,

    /// Cadence of raw fragment delivery from the capture backend. Independent
    /// of the flush interval; only bounds how much data sits outside the
    /// buffer at any moment.
    pub fragment_interval_ms: u64,

    /// Violations tolerated before the attempt is force-submitted.
    pub max_warnings: u32,

    /// Capture framerate. Proctoring footage does not need to be smooth.
    pub framerate: u32,

    /// Explicit ffmpeg binary path. `None` resolves from `PATH`.
    pub ffmpeg_path: Option<String>,
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".into(),
            flush_interval_ms: 60_000,
            fragment_interval_ms: 3_000,
            max_warnings: 3,
            framerate: 10,
            ffmpeg_path: None,
        }
    }
}
