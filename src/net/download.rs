//! Segmented parallel downloads
//!
//! A file is split into byte ranges by one of four approaches, one pool task
//! is submitted per segment, each task carries the retry wrapper, and the
//! temporary segment files are concatenated into the destination in range
//! order. Segments that still fail after their in-task retries get a second
//! pool-wide round; if any segment fails again the whole download fails and
//! the temporaries are removed.

use super::{ByteRange, NetworkEngine, RequestConfig, RequestResult, RetryPolicy};
use crate::error::{Error, Result};
use crate::pool::WorkerPool;
use crate::util::{sha1_file, sha256_file};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default task count for the `Thread` approach
pub const DEFAULT_SEGMENT_TASKS: usize = 100;
/// Default bytes per segment for the `Size` approach
pub const DEFAULT_SEGMENT_BYTES: u64 = 5 * 1024 * 1024;
/// Default segment count for the `Quantity` approach
pub const DEFAULT_SEGMENT_COUNT: usize = 100;
/// `Auto` switches from equal segments to fixed-size segments above this
const AUTO_SIZE_THRESHOLD: u64 = 50 * 1024 * 1024;

/// How a file is split for parallel download
///
/// A parameter of `0` selects the approach's default (100 tasks, 5 MiB, or
/// 100 segments respectively).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SegmentApproach {
    /// ≤ 50 MiB: 100 equal segments; larger: 5 MiB per segment
    #[default]
    Auto,
    /// Split into the given number of concurrent tasks
    Thread(usize),
    /// Split into segments of the given byte size
    Size(u64),
    /// Split into the given number of segments
    Quantity(usize),
}

/// Expected digest of the completed file
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentDigest {
    /// Hex-encoded SHA-1
    Sha1(String),
    /// Hex-encoded SHA-256
    Sha256(String),
}

/// Configuration for a segmented download
#[derive(Clone, Debug)]
pub struct MultiDownloadConfig {
    /// Source URL
    pub url: String,
    /// Destination file
    pub file_path: PathBuf,
    /// Segmentation strategy
    pub approach: SegmentApproach,
    /// Retry policy applied inside every segment task
    pub retry: RetryPolicy,
    /// Extra headers sent with every segment request
    pub headers: Vec<(String, String)>,
    /// Digest to verify after concatenation
    pub expected_digest: Option<ContentDigest>,
    /// Id prefix used for segment request ids and logs
    pub request_id: String,
}

impl MultiDownloadConfig {
    /// A download of `url` into `file_path` with default settings
    pub fn new(url: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            file_path: file_path.into(),
            approach: SegmentApproach::default(),
            retry: RetryPolicy::default(),
            headers: Vec::new(),
            expected_digest: None,
            request_id: "multi-download".into(),
        }
    }
}

/// Compute the segment plan for a file of `total_size` bytes
///
/// Ranges are inclusive, contiguous, and cover exactly `total_size` bytes in
/// ascending order.
pub fn plan_segments(total_size: u64, approach: SegmentApproach) -> Vec<ByteRange> {
    if total_size == 0 {
        return Vec::new();
    }

    let segment_size = match approach {
        SegmentApproach::Thread(n) | SegmentApproach::Quantity(n) => {
            let count = if n == 0 { DEFAULT_SEGMENT_COUNT } else { n } as u64;
            let count = count.min(total_size);
            total_size.div_ceil(count)
        }
        SegmentApproach::Size(s) => {
            if s == 0 {
                DEFAULT_SEGMENT_BYTES
            } else {
                s
            }
        }
        SegmentApproach::Auto => {
            if total_size <= AUTO_SIZE_THRESHOLD {
                let count = (DEFAULT_SEGMENT_COUNT as u64).min(total_size);
                total_size.div_ceil(count)
            } else {
                DEFAULT_SEGMENT_BYTES
            }
        }
    };

    let mut ranges = Vec::new();
    let mut start = 0u64;
    while start < total_size {
        let end = (start + segment_size).min(total_size) - 1;
        ranges.push(ByteRange {
            start,
            end: Some(end),
        });
        start = end + 1;
    }
    ranges
}

fn part_path(dest: &Path, index: usize) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(format!(".part{index}"));
    PathBuf::from(name)
}

impl NetworkEngine {
    /// Download `cfg.url` into `cfg.file_path` using parallel segments
    ///
    /// When the server does not report a content length, the download falls
    /// back to a single retry-wrapped request. Returns the byte count of the
    /// completed file.
    ///
    /// # Errors
    /// - The failing segment's error after both retry rounds
    /// - [`Error::Integrity`] when a configured digest does not match
    pub async fn multi_download(
        self: &Arc<Self>,
        pool: &WorkerPool,
        cfg: MultiDownloadConfig,
    ) -> Result<u64> {
        let total = match self.content_size(&cfg.url).await {
            Ok(Some(total)) => total,
            Ok(None) | Err(_) => {
                tracing::debug!(url = %cfg.url, "content length unknown, single download");
                return self.single_download(&cfg).await;
            }
        };

        let ranges = plan_segments(total, cfg.approach);
        if ranges.is_empty() {
            tokio::fs::write(&cfg.file_path, b"").await?;
            return Ok(0);
        }
        tracing::info!(
            url = %cfg.url,
            total,
            segments = ranges.len(),
            "starting segmented download"
        );

        let all: Vec<usize> = (0..ranges.len()).collect();
        let mut failed = self.run_segment_round(pool, &cfg, &ranges, &all).await?;

        if !failed.is_empty() {
            tracing::warn!(
                url = %cfg.url,
                failed = failed.len(),
                "retrying failed segments in a second round"
            );
            let indices: Vec<usize> = failed.iter().map(|(index, _)| *index).collect();
            failed = self.run_segment_round(pool, &cfg, &ranges, &indices).await?;
        }

        if let Some((_, result)) = failed.into_iter().next() {
            cleanup_parts(&cfg.file_path, ranges.len()).await;
            return Err(match result {
                Some(result) => result.to_error(&cfg.url),
                None => Error::TaskFailed,
            });
        }

        // Concatenate in range order, removing each temporary as it is
        // consumed.
        let mut dest = tokio::fs::File::create(&cfg.file_path).await?;
        for index in 0..ranges.len() {
            let part = part_path(&cfg.file_path, index);
            let mut src = tokio::fs::File::open(&part).await?;
            tokio::io::copy(&mut src, &mut dest).await?;
            drop(src);
            tokio::fs::remove_file(&part).await?;
        }
        dest.sync_all().await?;
        drop(dest);

        self.verify_digest(&cfg).await?;
        Ok(total)
    }

    fn segment_request(
        &self,
        cfg: &MultiDownloadConfig,
        range: &ByteRange,
        index: usize,
    ) -> RequestConfig {
        let mut request = RequestConfig::get(&cfg.url)
            .with_file(part_path(&cfg.file_path, index))
            .with_range(range.start, range.end)
            .with_request_id(format!("{}-part{index}", cfg.request_id));
        request.headers = cfg.headers.clone();
        request
    }

    /// Submit one pool task per listed segment
    ///
    /// Returns the still-failing segments, each with the last result seen
    /// (`None` when the pool task itself was lost).
    #[allow(clippy::type_complexity)]
    async fn run_segment_round(
        self: &Arc<Self>,
        pool: &WorkerPool,
        cfg: &MultiDownloadConfig,
        ranges: &[ByteRange],
        indices: &[usize],
    ) -> Result<Vec<(usize, Option<RequestResult>)>> {
        // Segment responses come back as 206 Partial Content.
        let mut segment_retry = cfg.retry.clone();
        if !segment_retry.success_codes.contains(&206) {
            segment_retry.success_codes.push(206);
        }

        let mut handles = Vec::with_capacity(indices.len());
        for &index in indices {
            let engine = Arc::clone(self);
            let request = self.segment_request(cfg, &ranges[index], index);
            let retry = segment_retry.clone();
            let handle =
                pool.submit(
                    async move { engine.execute_with_retry(&request, &retry).await },
                )?;
            handles.push((index, handle));
        }

        let mut failed = Vec::new();
        for (index, handle) in handles {
            match handle.join().await {
                Ok(result) if result.is_success() => {}
                Ok(result) => {
                    tracing::warn!(
                        url = %cfg.url,
                        segment = index,
                        status = ?result.status,
                        "segment failed"
                    );
                    failed.push((index, Some(result)));
                }
                Err(_) => failed.push((index, None)),
            }
        }
        failed.sort_unstable_by_key(|(index, _)| *index);
        Ok(failed)
    }

    async fn single_download(self: &Arc<Self>, cfg: &MultiDownloadConfig) -> Result<u64> {
        let mut request = RequestConfig::get(&cfg.url)
            .with_file(&cfg.file_path)
            .with_request_id(cfg.request_id.clone());
        request.headers = cfg.headers.clone();
        let result = self.execute_with_retry(&request, &cfg.retry).await;
        if !result.is_success() {
            return Err(result.to_error(&cfg.url));
        }
        self.verify_digest(cfg).await?;
        Ok(result.bytes_written)
    }

    async fn verify_digest(&self, cfg: &MultiDownloadConfig) -> Result<()> {
        let Some(expected) = cfg.expected_digest.clone() else {
            return Ok(());
        };
        let path = cfg.file_path.clone();
        let (actual, expected_hex) = tokio::task::spawn_blocking(move || {
            let actual = match &expected {
                ContentDigest::Sha1(hex) => sha1_file(&path).map(|a| (a, hex.clone())),
                ContentDigest::Sha256(hex) => sha256_file(&path).map(|a| (a, hex.clone())),
            };
            actual
        })
        .await
        .map_err(|e| Error::InvalidArgument(format!("digest task failed: {e}")))??;

        if !actual.eq_ignore_ascii_case(&expected_hex) {
            tokio::fs::remove_file(&cfg.file_path).await.ok();
            return Err(Error::Integrity {
                path: cfg.file_path.clone(),
                expected: expected_hex,
                actual,
            });
        }
        Ok(())
    }
}

async fn cleanup_parts(dest: &Path, count: usize) {
    for index in 0..count {
        tokio::fs::remove_file(part_path(dest, index)).await.ok();
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_plan_auto_large_uses_five_mib_segments() {
        // 52 MiB: above the threshold, so 5 MiB segments, the last shorter.
        let ranges = plan_segments(52 * MIB, SegmentApproach::Auto);
        assert_eq!(ranges.len(), 11);
        for (i, range) in ranges.iter().enumerate().take(10) {
            assert_eq!(range.start, i as u64 * 5 * MIB);
            assert_eq!(range.end, Some((i as u64 + 1) * 5 * MIB - 1));
        }
        assert_eq!(ranges[10].start, 50 * MIB);
        assert_eq!(ranges[10].end, Some(52 * MIB - 1));
    }

    #[test]
    fn test_plan_auto_small_uses_hundred_segments() {
        let ranges = plan_segments(10 * MIB, SegmentApproach::Auto);
        assert_eq!(ranges.len(), 100);
        let covered: u64 = ranges
            .iter()
            .map(|r| r.end.unwrap() - r.start + 1)
            .sum();
        assert_eq!(covered, 10 * MIB);
    }

    #[test]
    fn test_plan_defaults_for_zero_params() {
        assert_eq!(plan_segments(10 * MIB, SegmentApproach::Quantity(0)).len(), 100);
        assert_eq!(plan_segments(10 * MIB, SegmentApproach::Size(0)).len(), 2);
        assert_eq!(plan_segments(10 * MIB, SegmentApproach::Thread(0)).len(), 100);
    }

    #[test]
    fn test_plan_is_contiguous_and_ordered() {
        let ranges = plan_segments(1000, SegmentApproach::Quantity(7));
        let mut expected_start = 0;
        for range in &ranges {
            assert_eq!(range.start, expected_start);
            expected_start = range.end.unwrap() + 1;
        }
        assert_eq!(expected_start, 1000);
    }

    #[test]
    fn test_plan_tiny_file_caps_segment_count() {
        let ranges = plan_segments(3, SegmentApproach::Quantity(100));
        assert_eq!(ranges.len(), 3);
    }

    /// Serves a fixed body honouring `Range: bytes=a-b` with 206 responses
    struct RangeResponder {
        body: Vec<u8>,
    }

    impl Respond for RangeResponder {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let range = request
                .headers
                .get("range")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("bytes="))
                .and_then(|v| {
                    let (start, end) = v.split_once('-')?;
                    let start: usize = start.parse().ok()?;
                    let end: usize = end.parse().ok()?;
                    Some((start, end))
                });
            match range {
                Some((start, end)) if start < self.body.len() => {
                    let end = end.min(self.body.len() - 1);
                    ResponseTemplate::new(206).set_body_bytes(self.body[start..=end].to_vec())
                }
                Some(_) => ResponseTemplate::new(416),
                None => ResponseTemplate::new(200).set_body_bytes(self.body.clone()),
            }
        }
    }

    fn test_body(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_multi_download_reconstructs_file() {
        let body = test_body(10_000);
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/blob"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/blob"))
            .respond_with(RangeResponder { body: body.clone() })
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("blob.bin");
        let engine = Arc::new(NetworkEngine::new());
        let pool = WorkerPool::new(4);

        let mut cfg = MultiDownloadConfig::new(format!("{}/blob", server.uri()), &dest);
        cfg.approach = SegmentApproach::Quantity(7);
        cfg.retry = RetryPolicy {
            max_retries: 1,
            retry_delay: std::time::Duration::from_millis(10),
            jitter: false,
            ..RetryPolicy::default()
        };

        let written = engine.multi_download(&pool, cfg).await.unwrap();
        assert_eq!(written, body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);

        // No temporary segment file remains.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".part"))
            .collect();
        assert!(leftovers.is_empty(), "leftover parts: {leftovers:?}");
        pool.stop(true).await;
    }

    #[tokio::test]
    async fn test_multi_download_verifies_digest() {
        let body = b"hello digest world".to_vec();
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/d"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/d"))
            .respond_with(RangeResponder { body: body.clone() })
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("d.bin");
        let engine = Arc::new(NetworkEngine::new());
        let pool = WorkerPool::new(2);

        let mut cfg = MultiDownloadConfig::new(format!("{}/d", server.uri()), &dest);
        cfg.approach = SegmentApproach::Quantity(3);
        cfg.expected_digest = Some(ContentDigest::Sha256("deadbeef".into()));

        let err = engine.multi_download(&pool, cfg).await.unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }));
        assert!(!dest.exists(), "corrupt file must be removed");
        pool.stop(true).await;
    }

    #[tokio::test]
    async fn test_failed_segment_attempt_bound() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 10]))
            .mount(&server)
            .await;
        // One segment, one in-task retry, one second round: at most
        // 2 * (max_retries + 1) = 4 requests ever hit the server.
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(NetworkEngine::new());
        let pool = WorkerPool::new(2);

        let mut cfg =
            MultiDownloadConfig::new(format!("{}/broken", server.uri()), dir.path().join("b"));
        cfg.approach = SegmentApproach::Quantity(1);
        cfg.retry = RetryPolicy {
            max_retries: 1,
            retry_delay: std::time::Duration::from_millis(5),
            jitter: false,
            ..RetryPolicy::default()
        };

        let err = engine.multi_download(&pool, cfg).await.unwrap_err();
        assert!(matches!(err, Error::HttpStatus { status: 500, .. }));
        pool.stop(true).await;
        // Dropping the server verifies the expected request count.
    }

    #[tokio::test]
    async fn test_single_fallback_without_content_length() {
        let body = b"streamed".to_vec();
        let server = MockServer::start().await;
        // No HEAD mock: content_size fails, forcing the single-request path.
        Mock::given(method("GET"))
            .and(path("/nolen"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nolen.bin");
        let engine = Arc::new(NetworkEngine::new());
        let pool = WorkerPool::new(2);

        let written = engine
            .multi_download(
                &pool,
                MultiDownloadConfig::new(format!("{}/nolen", server.uri()), &dest),
            )
            .await
            .unwrap();
        assert_eq!(written, body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        pool.stop(true).await;
    }
}
