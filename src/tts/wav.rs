//! Minimal WAV read/write and chunking.
//!
//! Providers that return raw PCM get wrapped here, and large answer audio is
//! split into frame-aligned chunks so each one is an independently playable
//! WAV file.

use crate::error::{Result, SvarError};

/// PCM format of a WAV payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    pub channels: u16,
    pub bits_per_sample: u16,
    pub sample_rate: u32,
}

impl WavSpec {
    /// Bytes per frame (one sample across all channels).
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }
}

/// Wrap raw PCM data in a RIFF/WAVE container.
pub fn write_wav(spec: WavSpec, pcm: &[u8]) -> Vec<u8> {
    let bytes_per_frame = spec.bytes_per_frame() as u32;
    let byte_rate = spec.sample_rate * bytes_per_frame;
    let data_len = pcm.len() as u32;

    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&spec.channels.to_le_bytes());
    out.extend_from_slice(&spec.sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&(bytes_per_frame as u16).to_le_bytes());
    out.extend_from_slice(&spec.bits_per_sample.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);

    out
}

/// Parse a WAV file into its format and PCM payload.
///
/// Handles the common layout (fmt chunk followed by data chunk, possibly with
/// other chunks in between). Only uncompressed PCM is accepted.
pub fn parse_wav(bytes: &[u8]) -> Result<(WavSpec, &[u8])> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(SvarError::Synthesis("Not a RIFF/WAVE file".to_string()));
    }

    let mut spec: Option<WavSpec> = None;
    let mut pos = 12;

    while pos + 8 <= bytes.len() {
        let chunk_id = &bytes[pos..pos + 4];
        let chunk_len = u32::from_le_bytes(
            bytes[pos + 4..pos + 8]
                .try_into()
                .map_err(|_| SvarError::Synthesis("Truncated WAV chunk header".to_string()))?,
        ) as usize;
        let body_start = pos + 8;
        let body_end = body_start + chunk_len;
        if body_end > bytes.len() {
            return Err(SvarError::Synthesis("Truncated WAV chunk".to_string()));
        }

        match chunk_id {
            b"fmt " => {
                if chunk_len < 16 {
                    return Err(SvarError::Synthesis("Malformed fmt chunk".to_string()));
                }
                let body = &bytes[body_start..body_end];
                let format = u16::from_le_bytes([body[0], body[1]]);
                if format != 1 {
                    return Err(SvarError::Synthesis(format!(
                        "Unsupported WAV format code: {}",
                        format
                    )));
                }
                spec = Some(WavSpec {
                    channels: u16::from_le_bytes([body[2], body[3]]),
                    sample_rate: u32::from_le_bytes([body[4], body[5], body[6], body[7]]),
                    bits_per_sample: u16::from_le_bytes([body[14], body[15]]),
                });
            }
            b"data" => {
                let spec = spec
                    .ok_or_else(|| SvarError::Synthesis("data chunk before fmt".to_string()))?;
                return Ok((spec, &bytes[body_start..body_end]));
            }
            _ => {}
        }

        // Chunks are word-aligned.
        pos = body_end + (chunk_len & 1);
    }

    Err(SvarError::Synthesis("No data chunk found".to_string()))
}

/// Split a WAV file into independently playable WAV chunks, each at most
/// `max_chunk_size` bytes, cut on frame boundaries.
///
/// If the input cannot be parsed as WAV it is returned unsplit as a single
/// chunk.
pub fn chunk_wav(bytes: &[u8], max_chunk_size: usize) -> Vec<Vec<u8>> {
    if bytes.len() <= max_chunk_size {
        return vec![bytes.to_vec()];
    }

    let Ok((spec, pcm)) = parse_wav(bytes) else {
        return vec![bytes.to_vec()];
    };

    let bytes_per_frame = spec.bytes_per_frame();
    if bytes_per_frame == 0 {
        return vec![bytes.to_vec()];
    }

    // Leave headroom for the 44-byte header each chunk carries.
    let frames_per_chunk = max_chunk_size.saturating_sub(100) / bytes_per_frame;
    if frames_per_chunk == 0 {
        return vec![bytes.to_vec()];
    }
    let chunk_payload = frames_per_chunk * bytes_per_frame;

    pcm.chunks(chunk_payload)
        .map(|piece| write_wav(spec, piece))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: WavSpec = WavSpec {
        channels: 1,
        bits_per_sample: 16,
        sample_rate: 22050,
    };

    #[test]
    fn test_write_parse_round_trip() {
        let pcm: Vec<u8> = (0..1000u16).flat_map(|s| s.to_le_bytes()).collect();
        let wav = write_wav(SPEC, &pcm);

        let (spec, parsed) = parse_wav(&wav).unwrap();
        assert_eq!(spec, SPEC);
        assert_eq!(parsed, &pcm[..]);
    }

    #[test]
    fn test_parse_rejects_non_wav() {
        assert!(parse_wav(b"not audio at all").is_err());
        assert!(parse_wav(b"RIFF\x00\x00\x00\x00MP3 ").is_err());
    }

    #[test]
    fn test_chunk_concatenation_preserves_pcm() {
        let pcm: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
        let wav = write_wav(SPEC, &pcm);

        let chunks = chunk_wav(&wav, 8 * 1024);
        assert!(chunks.len() > 1);

        let mut rejoined = Vec::new();
        for chunk in &chunks {
            assert!(chunk.len() <= 8 * 1024);
            let (spec, piece) = parse_wav(chunk).unwrap();
            assert_eq!(spec, SPEC);
            // Every chunk holds whole frames.
            assert_eq!(piece.len() % SPEC.bytes_per_frame(), 0);
            rejoined.extend_from_slice(piece);
        }
        assert_eq!(rejoined, pcm);
    }

    #[test]
    fn test_small_file_is_single_chunk() {
        let wav = write_wav(SPEC, &[0u8; 128]);
        let chunks = chunk_wav(&wav, 600 * 1024);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], wav);
    }

    #[test]
    fn test_unparsable_input_passes_through() {
        let garbage = vec![7u8; 5000];
        let chunks = chunk_wav(&garbage, 1024);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], garbage);
    }
}
