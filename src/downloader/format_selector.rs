// FormatSelector - turns raw yt-dlp formats into user-facing qualities
//
// One entry per video height:
// - progressive formats (audio+video in one file) download as-is
// - video-only formats are paired with the best audio-only stream and muxed
// - per height the candidate with the highest video bitrate wins
// Entries are sorted by height, highest first, so the first one is the
// recommendation.

use std::collections::BTreeMap;

use super::extractors::RawFormat;
use super::models::{FormatDescriptor, StreamSelection};
use super::utils::format_size;

pub struct FormatSelector;

struct Candidate<'a> {
    video: &'a RawFormat,
    audio: Option<&'a RawFormat>,
    rate: f32,
}

impl FormatSelector {
    /// Build quality options from raw formats
    pub fn build_descriptors(formats: &[RawFormat]) -> Vec<FormatDescriptor> {
        let best_audio = Self::find_best_audio(formats);
        let mut by_height: BTreeMap<u32, Candidate<'_>> = BTreeMap::new();

        for fmt in formats {
            let Some(height) = fmt.height.filter(|h| *h > 0) else {
                continue;
            };

            let candidate = if fmt.is_progressive() {
                Candidate {
                    video: fmt,
                    audio: None,
                    rate: fmt.tbr.unwrap_or(0.0),
                }
            } else if fmt.is_video_only() {
                let Some(audio) = best_audio else {
                    continue;
                };
                Candidate {
                    video: fmt,
                    audio: Some(audio),
                    rate: fmt.vbr.or(fmt.tbr).unwrap_or(0.0),
                }
            } else {
                continue;
            };

            let replace = by_height
                .get(&height)
                .map_or(true, |existing| candidate.rate > existing.rate);
            if replace {
                by_height.insert(height, candidate);
            }
        }

        let mut descriptors: Vec<FormatDescriptor> = by_height
            .into_values()
            .rev()
            .map(Self::describe)
            .collect();

        if descriptors.is_empty() {
            descriptors.extend(Self::fallback(formats, best_audio));
        }

        descriptors
    }

    /// Something downloadable for sites that report no heights or no video at all
    fn fallback(formats: &[RawFormat], best_audio: Option<&RawFormat>) -> Option<FormatDescriptor> {
        let best_progressive = formats
            .iter()
            .filter(|f| f.is_progressive())
            .max_by(|a, b| a.tbr.unwrap_or(0.0).total_cmp(&b.tbr.unwrap_or(0.0)));

        if let Some(fmt) = best_progressive {
            let mut descriptor = Self::describe(Candidate {
                video: fmt,
                audio: None,
                rate: 0.0,
            });
            descriptor.label = format!("Best available ({})", fmt.format_id);
            return Some(descriptor);
        }

        best_audio.map(|audio| {
            let mut parts = vec![audio.ext.clone()];
            if let Some(abr) = audio.abr {
                parts.push(format!("{:.0} kbps", abr));
            }
            if let Some(size) = audio.effective_size() {
                parts.push(format!("~{}", format_size(size)));
            }
            FormatDescriptor {
                id: audio.format_id.clone(),
                label: format!("Audio only ({})", parts.join(", ")),
                requires_mux: false,
                selection: StreamSelection::Single {
                    format_id: audio.format_id.clone(),
                },
                height: None,
                width: None,
                ext: audio.ext.clone(),
                codec: audio.acodec.clone(),
                estimated_size: audio.effective_size(),
            }
        })
    }

    fn describe(candidate: Candidate<'_>) -> FormatDescriptor {
        let video = candidate.video;
        let selection = match candidate.audio {
            Some(audio) => StreamSelection::Merge {
                video_id: video.format_id.clone(),
                audio_id: audio.format_id.clone(),
            },
            None => StreamSelection::Single {
                format_id: video.format_id.clone(),
            },
        };

        // Size estimate covers both streams of a merge; unknown if the video size is
        let estimated_size = video
            .effective_size()
            .map(|v| v + candidate.audio.and_then(|a| a.effective_size()).unwrap_or(0));

        let codec = Self::get_codec_label(video);
        let mut details = Vec::new();
        if let (Some(w), Some(h)) = (video.width, video.height) {
            details.push(format!("{}x{}", w, h));
        }
        details.push(codec.clone());
        if let Some(size) = estimated_size {
            details.push(format!("~{}", format_size(size)));
        }

        let name = video
            .height
            .map(|h| format!("{}p", h))
            .unwrap_or_else(|| video.format_id.clone());
        let label = format!("{} ({})", name, details.join(", "));

        FormatDescriptor {
            id: selection.token(),
            label,
            requires_mux: candidate.audio.is_some(),
            selection,
            height: video.height,
            width: video.width,
            ext: video.ext.clone(),
            codec: Some(codec),
            estimated_size,
        }
    }

    /// Find best audio format (highest bitrate, AAC on ties)
    fn find_best_audio(formats: &[RawFormat]) -> Option<&RawFormat> {
        formats.iter().filter(|f| f.is_audio_only()).max_by(|a, b| {
            a.abr
                .unwrap_or(0.0)
                .total_cmp(&b.abr.unwrap_or(0.0))
                .then(a.is_aac().cmp(&b.is_aac()))
        })
    }

    /// Get human-readable codec label
    fn get_codec_label(format: &RawFormat) -> String {
        if format.is_h264() {
            "H.264".to_string()
        } else if format.is_vp9() {
            "VP9".to_string()
        } else if format.is_av1() {
            "AV1".to_string()
        } else {
            format
                .vcodec
                .as_deref()
                .map(|v| v.split('.').next().unwrap_or(v).to_string())
                .unwrap_or_else(|| "Unknown".to_string())
        }
    }
}
