// Format resolver - URL in, ordered quality list out

use std::sync::Arc;

use tracing::info;

use super::errors::{DownloadError, ExtractionError};
use super::extractors::{FailureReason, InfoExtractor};
use super::format_selector::FormatSelector;
use super::models::Resolution;

pub struct FormatResolver {
    extractor: Arc<dyn InfoExtractor>,
}

impl FormatResolver {
    pub fn new(extractor: Arc<dyn InfoExtractor>) -> Self {
        Self { extractor }
    }

    /// Query the extractor and build descriptors, recommended first.
    ///
    /// Never succeeds with an empty list. `id` is stamped on the result so
    /// later jobs can prove which resolution they were picked from.
    pub async fn resolve(&self, url: &str, id: u64) -> Result<Resolution, DownloadError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ExtractionError::new(FailureReason::InvalidUrl, "URL is empty").into());
        }

        let media = self.extractor.extract(url).await?;
        let formats = FormatSelector::build_descriptors(&media.formats);

        if formats.is_empty() {
            return Err(ExtractionError::new(
                FailureReason::NoFormats,
                format!("no downloadable formats among {} reported", media.formats.len()),
            )
            .into());
        }

        info!(
            extractor = self.extractor.name(),
            options = formats.len(),
            "[Resolver] \"{}\" resolved",
            media.title
        );

        Ok(Resolution {
            id,
            url: url.to_string(),
            title: media.title,
            formats,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::downloader::extractors::{MediaInfo, RawFormat};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Extractor returning a canned answer and counting calls
    pub(crate) struct StaticExtractor {
        pub result: Result<MediaInfo, DownloadError>,
        pub calls: AtomicUsize,
    }

    impl StaticExtractor {
        pub fn ok(formats: Vec<RawFormat>) -> Self {
            Self {
                result: Ok(MediaInfo {
                    id: "clip".to_string(),
                    title: "Clip".to_string(),
                    formats,
                }),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(reason: FailureReason) -> Self {
            Self {
                result: Err(ExtractionError::new(reason, "ERROR: boom").into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl InfoExtractor for StaticExtractor {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn extract(&self, _url: &str) -> Result<MediaInfo, DownloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    pub(crate) fn progressive(id: &str, height: u32) -> RawFormat {
        RawFormat {
            format_id: id.to_string(),
            ext: "mp4".to_string(),
            width: Some(height * 16 / 9),
            height: Some(height),
            vcodec: Some("avc1.42001E".to_string()),
            acodec: Some("mp4a.40.2".to_string()),
            filesize: Some(1000),
            tbr: Some(500.0),
            ..RawFormat::default()
        }
    }

    pub(crate) fn video_only(id: &str, height: u32) -> RawFormat {
        RawFormat {
            format_id: id.to_string(),
            ext: "mp4".to_string(),
            width: Some(height * 16 / 9),
            height: Some(height),
            vcodec: Some("avc1.640028".to_string()),
            acodec: Some("none".to_string()),
            filesize: Some(8000),
            vbr: Some(4000.0),
            ..RawFormat::default()
        }
    }

    pub(crate) fn audio_only(id: &str) -> RawFormat {
        RawFormat {
            format_id: id.to_string(),
            ext: "m4a".to_string(),
            vcodec: Some("none".to_string()),
            acodec: Some("mp4a.40.2".to_string()),
            filesize: Some(2000),
            abr: Some(128.0),
            ..RawFormat::default()
        }
    }

    #[tokio::test]
    async fn test_resolve_orders_best_first() {
        let extractor = Arc::new(StaticExtractor::ok(vec![
            progressive("18", 360),
            video_only("137", 1080),
            audio_only("140"),
        ]));
        let resolver = FormatResolver::new(extractor);

        let resolution = resolver.resolve(" https://example.com/clip ", 3).await.unwrap();
        assert_eq!(resolution.id, 3);
        assert_eq!(resolution.url, "https://example.com/clip");
        assert_eq!(resolution.recommended().map(|f| f.id.as_str()), Some("137+140"));
        assert_eq!(resolution.formats.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_format_list_is_an_error() {
        let resolver = FormatResolver::new(Arc::new(StaticExtractor::ok(Vec::new())));
        match resolver.resolve("https://example.com/clip", 1).await {
            Err(DownloadError::Extraction(e)) => assert_eq!(e.reason, FailureReason::NoFormats),
            other => panic!("expected NoFormats, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_url_never_reaches_extractor() {
        let extractor = Arc::new(StaticExtractor::ok(vec![progressive("18", 360)]));
        let resolver = FormatResolver::new(extractor.clone());

        let err = resolver.resolve("   ", 1).await.unwrap_err();
        assert!(matches!(
            err,
            DownloadError::Extraction(ExtractionError { reason: FailureReason::InvalidUrl, .. })
        ));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_extractor_failure_passes_through() {
        let resolver =
            FormatResolver::new(Arc::new(StaticExtractor::failing(FailureReason::HostUnreachable)));
        match resolver.resolve("https://nowhere.invalid/v", 1).await {
            Err(DownloadError::Extraction(e)) => {
                assert_eq!(e.reason, FailureReason::HostUnreachable)
            }
            other => panic!("expected extraction error, got {other:?}"),
        }
    }
}
