//! Per-file decision of which transcoding steps are needed.

use crate::probe::AudioProperties;

/// Sample rate ceiling of the canonical format.
pub const DEFAULT_MAX_SAMPLE_RATE: u32 = 48_000;

/// Bit depth of the canonical format.
pub const CANONICAL_BIT_DEPTH: u32 = 16;

/// Codecs that are positively known to be lossless.
const LOSSLESS_CODECS: &[&str] = &[
    "flac", "alac", "tak", "wavpack", "ape", "tta", "mlp", "truehd", "shorten", "wmalossless",
];

/// Returns whether `codec` is a known lossless codec, including every PCM variant.
pub fn is_lossless_codec(codec: &str) -> bool {
    codec.starts_with("pcm_") || LOSSLESS_CODECS.contains(&codec)
}

/// Transcoding parameters derived for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionPlan {
    pub force_sixteen_bit: bool,
    pub resample_target_hz: Option<u32>,
    pub apply_restoration_filters: bool,
}

/// Chooses the conversion plan for a file.
///
/// Unknown properties always lean towards more normalization: unknown depth
/// forces 16 bit, and restoration filters apply unless the codec is known to
/// be lossless. An unknown codec is filtered whatever `_extension` says.
pub fn select(props: &AudioProperties, _extension: &str, max_sample_rate: u32) -> ConversionPlan {
    let force_sixteen_bit = !matches!(props.bit_depth, Some(depth) if depth <= CANONICAL_BIT_DEPTH);

    let resample_target_hz = props
        .sample_rate
        .filter(|&rate| rate > max_sample_rate)
        .map(|_| max_sample_rate);

    let apply_restoration_filters = props
        .codec
        .as_deref()
        .filter(|c| !c.is_empty())
        .is_none_or(|c| !is_lossless_codec(c));

    ConversionPlan {
        force_sixteen_bit,
        resample_target_hz,
        apply_restoration_filters,
    }
}

/// Whether a file already matches the canonical PCM WAV format.
pub fn is_canonical(props: &AudioProperties, max_sample_rate: u32) -> bool {
    let pcm = props.codec.as_deref().is_some_and(|c| c.starts_with("pcm_"));
    let narrow = props.bit_depth.is_some_and(|d| d <= CANONICAL_BIT_DEPTH);
    let rate_ok = props.sample_rate.is_some_and(|r| r <= max_sample_rate);
    pcm && narrow && rate_ok
}
