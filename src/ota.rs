//! Over-the-air firmware update pipeline.
//!
//! A state machine separate from the control loop's periodic work, driven
//! from the API surface: a version check against the backend can roll into a
//! streamed download, and the firmware-upload endpoint can push an image
//! directly. Either way every byte goes into the inactive flash partition
//! through the [`FirmwareSink`] port as it arrives.
//!
//! ```text
//! Idle ──▶ Checking ──▶ Idle (up to date)
//!             │
//!             ▼
//!         Downloading ──▶ Writing ──▶ Done (verify + reboot)
//!                            │
//!                            ▼
//!                          Failed (attempt aborted, old firmware runs on)
//! ```
//!
//! A `Failed` outcome never crashes the bridge; it only ends that attempt.
//! The one deliberate consequence of `Done` is a restart, requested by the
//! caller after the pipeline returns.

use log::{info, warn};
use serde::Deserialize;

use crate::error::{Error, OtaError, ProtocolError, TransportError};

/// Download/copy chunk size. Matches the flash write granularity sweet spot
/// without keeping a large buffer alive.
const CHUNK_SIZE: usize = 1024;

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Where image bytes go. The espidf adapter wraps the inactive OTA
/// partition; tests record the bytes.
pub trait FirmwareSink {
    /// Open the inactive partition for `expected` bytes (`None` = unknown,
    /// push uploads may not declare a length up front).
    fn begin(&mut self, expected: Option<u32>) -> Result<(), OtaError>;

    /// Write one chunk; returns the number of bytes the flash accepted.
    fn write(&mut self, chunk: &[u8]) -> Result<usize, OtaError>;

    /// Verify the image and mark the partition bootable.
    fn commit(&mut self) -> Result<(), OtaError>;

    /// Drop the partial image; the running firmware stays active.
    fn abandon(&mut self);
}

/// Incoming image bytes. `Ok(0)` means the transport ended.
pub trait ByteStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// The backend side of the pull path.
pub trait UpdateSource {
    type Image: ByteStream;

    /// GET the version manifest; returns the raw JSON body.
    fn fetch_manifest(&mut self, url: &str) -> Result<heapless::String<256>, TransportError>;

    /// GET the image; returns the declared content length and the stream.
    fn open_image(&mut self, url: &str) -> Result<(u32, Self::Image), TransportError>;
}

/// Version-check response from the backend.
#[derive(Debug, Deserialize)]
pub struct UpdateManifest {
    pub update: bool,
    pub version: heapless::String<16>,
    #[serde(default)]
    pub url: Option<heapless::String<96>>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaStatus {
    Idle,
    Checking,
    Downloading,
    Writing,
    Done,
    Failed,
}

impl OtaStatus {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Downloading => "downloading",
            Self::Writing => "writing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// Bookkeeping for one update attempt. Created when a check or upload
/// begins; surviving as `Done`/`Failed` until the next attempt resets it.
#[derive(Debug)]
pub struct OtaSession {
    pub current_version: &'static str,
    pub latest_version: heapless::String<16>,
    pub bytes_expected: u32,
    pub bytes_written: u32,
    pub status: OtaStatus,
}

impl OtaSession {
    fn fresh() -> Self {
        Self {
            current_version: env!("CARGO_PKG_VERSION"),
            latest_version: heapless::String::new(),
            bytes_expected: 0,
            bytes_written: 0,
            status: OtaStatus::Idle,
        }
    }
}

/// What a completed pull attempt amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaOutcome {
    /// Backend has nothing newer (or no image URL yet).
    UpToDate,
    /// New image flashed and verified; caller should restart.
    Updated,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct OtaPipeline {
    session: OtaSession,
}

impl OtaPipeline {
    pub fn new() -> Self {
        Self { session: OtaSession::fresh() }
    }

    pub fn session(&self) -> &OtaSession {
        &self.session
    }

    /// True while bytes are in flight (an upload must not start mid-pull).
    pub fn busy(&self) -> bool {
        matches!(
            self.session.status,
            OtaStatus::Checking | OtaStatus::Downloading | OtaStatus::Writing
        )
    }

    // ── Pull path: check the backend, stream if newer ─────────

    /// Check the backend version endpoint; download and flash if it offers
    /// a newer image.
    pub fn check_and_update<S: UpdateSource>(
        &mut self,
        source: &mut S,
        flash: &mut impl FirmwareSink,
        check_url: &str,
    ) -> Result<OtaOutcome, Error> {
        if self.busy() {
            return Err(OtaError::AlreadyActive.into());
        }
        self.session = OtaSession::fresh();
        self.session.status = OtaStatus::Checking;
        info!("ota: checking {check_url}");

        let body = match source.fetch_manifest(check_url) {
            Ok(b) => b,
            Err(e) => return Err(self.fail(e.into())),
        };
        let manifest: UpdateManifest = match serde_json::from_str(&body) {
            Ok(m) => m,
            Err(_) => return Err(self.fail(ProtocolError::MalformedManifest.into())),
        };

        if !manifest.update || manifest.version.as_str() == self.session.current_version {
            info!("ota: already on {}", self.session.current_version);
            self.session.status = OtaStatus::Idle;
            return Ok(OtaOutcome::UpToDate);
        }
        self.session.latest_version = manifest.version;
        let Some(url) = manifest.url else {
            // Newer version announced but not yet downloadable.
            info!("ota: {} available, no image URL", self.session.latest_version);
            self.session.status = OtaStatus::Idle;
            return Ok(OtaOutcome::UpToDate);
        };

        info!(
            "ota: {} -> {}, downloading",
            self.session.current_version, self.session.latest_version
        );
        self.session.status = OtaStatus::Downloading;
        let (expected, mut image) = match source.open_image(&url) {
            Ok(r) => r,
            Err(e) => return Err(self.fail(e.into())),
        };
        self.session.bytes_expected = expected;

        if let Err(e) = flash.begin(Some(expected)) {
            return Err(self.fail(e.into()));
        }
        self.session.status = OtaStatus::Writing;

        // Partial reads are normal; keep going until the declared length is
        // met or the transport ends.
        let mut buf = [0u8; CHUNK_SIZE];
        while self.session.bytes_written < expected {
            let n = match image.read(&mut buf) {
                Ok(n) => n,
                Err(e) => {
                    flash.abandon();
                    return Err(self.fail(e.into()));
                }
            };
            if n == 0 {
                break;
            }
            if let Err(e) = self.write_through(flash, &buf[..n]) {
                return Err(e);
            }
        }

        if self.session.bytes_written != expected {
            flash.abandon();
            warn!(
                "ota: stream ended at {}/{} bytes",
                self.session.bytes_written, expected
            );
            return Err(self.fail(OtaError::ShortImage.into()));
        }

        self.finish(flash).map(|()| OtaOutcome::Updated)
    }

    // ── Push path: the firmware-upload endpoint ───────────────

    /// Start accepting an uploaded image.
    pub fn begin_push(
        &mut self,
        expected: Option<u32>,
        flash: &mut impl FirmwareSink,
    ) -> Result<(), Error> {
        if self.busy() {
            return Err(OtaError::AlreadyActive.into());
        }
        self.session = OtaSession::fresh();
        self.session.bytes_expected = expected.unwrap_or(0);
        if let Err(e) = flash.begin(expected) {
            return Err(self.fail(e.into()));
        }
        self.session.status = OtaStatus::Writing;
        info!("ota: upload started ({:?} bytes)", expected);
        Ok(())
    }

    /// Feed one uploaded chunk. Returns the running byte count.
    pub fn push_chunk(
        &mut self,
        chunk: &[u8],
        flash: &mut impl FirmwareSink,
    ) -> Result<u32, Error> {
        if self.session.status != OtaStatus::Writing {
            return Err(OtaError::NotActive.into());
        }
        self.write_through(flash, chunk)?;
        Ok(self.session.bytes_written)
    }

    /// Upload complete: verify and mark bootable. Caller restarts on Ok.
    pub fn finish_push(&mut self, flash: &mut impl FirmwareSink) -> Result<(), Error> {
        if self.session.status != OtaStatus::Writing {
            return Err(OtaError::NotActive.into());
        }
        if self.session.bytes_expected > 0
            && self.session.bytes_written != self.session.bytes_expected
        {
            flash.abandon();
            return Err(self.fail(OtaError::ShortImage.into()));
        }
        self.finish(flash)
    }

    /// Drop an in-flight upload (client disconnected).
    pub fn abort_push(&mut self, flash: &mut impl FirmwareSink) {
        if self.session.status == OtaStatus::Writing {
            flash.abandon();
            let _ = self.fail(OtaError::ShortImage.into());
        }
    }

    // ── Internal ──────────────────────────────────────────────

    /// Write one chunk, enforcing the accepted-equals-offered invariant.
    fn write_through(
        &mut self,
        flash: &mut impl FirmwareSink,
        chunk: &[u8],
    ) -> Result<(), Error> {
        match flash.write(chunk) {
            Ok(n) if n == chunk.len() => {
                self.session.bytes_written += chunk.len() as u32;
                Ok(())
            }
            Ok(_) => {
                flash.abandon();
                Err(self.fail(OtaError::WriteMismatch.into()))
            }
            Err(e) => {
                flash.abandon();
                Err(self.fail(e.into()))
            }
        }
    }

    fn finish(&mut self, flash: &mut impl FirmwareSink) -> Result<(), Error> {
        if let Err(e) = flash.commit() {
            return Err(self.fail(e.into()));
        }
        self.session.status = OtaStatus::Done;
        info!("ota: image verified ({} bytes)", self.session.bytes_written);
        Ok(())
    }

    /// Mark the attempt failed. The bridge keeps running; only this attempt
    /// is over.
    fn fail(&mut self, err: Error) -> Error {
        warn!("ota: attempt aborted: {err}");
        self.session.status = OtaStatus::Failed;
        err
    }
}

impl Default for OtaPipeline {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Records everything; `accept_limit` simulates a flash that takes
    /// fewer bytes than offered.
    struct MockFlash {
        begun: Option<Option<u32>>,
        written: Vec<u8>,
        committed: bool,
        abandoned: bool,
        accept_limit: Option<usize>,
        fail_begin: bool,
    }

    impl MockFlash {
        fn new() -> Self {
            Self {
                begun: None,
                written: Vec::new(),
                committed: false,
                abandoned: false,
                accept_limit: None,
                fail_begin: false,
            }
        }
    }

    impl FirmwareSink for MockFlash {
        fn begin(&mut self, expected: Option<u32>) -> Result<(), OtaError> {
            if self.fail_begin {
                return Err(OtaError::BeginFailed);
            }
            self.begun = Some(expected);
            Ok(())
        }

        fn write(&mut self, chunk: &[u8]) -> Result<usize, OtaError> {
            let n = self.accept_limit.map_or(chunk.len(), |l| chunk.len().min(l));
            self.written.extend_from_slice(&chunk[..n]);
            Ok(n)
        }

        fn commit(&mut self) -> Result<(), OtaError> {
            self.committed = true;
            Ok(())
        }

        fn abandon(&mut self) {
            self.abandoned = true;
        }
    }

    /// Serves a manifest and a body that may be shorter than declared.
    struct MockSource {
        manifest: &'static str,
        body: Vec<u8>,
        declared_len: u32,
    }

    struct MockImage {
        data: Vec<u8>,
        pos: usize,
    }

    impl ByteStream for MockImage {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            // Drip-feed in small pieces to exercise partial-read handling.
            let n = (self.data.len() - self.pos).min(buf.len()).min(300);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    impl UpdateSource for MockSource {
        type Image = MockImage;

        fn fetch_manifest(&mut self, _url: &str) -> Result<heapless::String<256>, TransportError> {
            heapless::String::try_from(self.manifest).map_err(|_| TransportError::Io)
        }

        fn open_image(&mut self, _url: &str) -> Result<(u32, Self::Image), TransportError> {
            Ok((self.declared_len, MockImage { data: self.body.clone(), pos: 0 }))
        }
    }

    #[test]
    fn up_to_date_stays_idle() {
        let mut ota = OtaPipeline::new();
        let mut flash = MockFlash::new();
        let mut src = MockSource {
            manifest: r#"{"update":false,"version":"0.0.0"}"#,
            body: Vec::new(),
            declared_len: 0,
        };
        let outcome = ota.check_and_update(&mut src, &mut flash, "http://b/check").unwrap();
        assert_eq!(outcome, OtaOutcome::UpToDate);
        assert_eq!(ota.session().status, OtaStatus::Idle);
        assert!(flash.begun.is_none());
    }

    #[test]
    fn newer_version_streams_and_commits() {
        let mut ota = OtaPipeline::new();
        let mut flash = MockFlash::new();
        let mut src = MockSource {
            manifest: r#"{"update":true,"version":"9.9.9","url":"http://b/fw.bin"}"#,
            body: vec![0xAB; 1000],
            declared_len: 1000,
        };
        let outcome = ota.check_and_update(&mut src, &mut flash, "http://b/check").unwrap();
        assert_eq!(outcome, OtaOutcome::Updated);
        assert_eq!(ota.session().status, OtaStatus::Done);
        assert_eq!(ota.session().bytes_written, 1000);
        assert_eq!(flash.written.len(), 1000);
        assert!(flash.committed);
    }

    #[test]
    fn short_stream_fails_without_commit() {
        let mut ota = OtaPipeline::new();
        let mut flash = MockFlash::new();
        let mut src = MockSource {
            manifest: r#"{"update":true,"version":"9.9.9","url":"http://b/fw.bin"}"#,
            body: vec![0xAB; 800],
            declared_len: 1000,
        };
        let err = ota.check_and_update(&mut src, &mut flash, "http://b/check").unwrap_err();
        assert_eq!(err, Error::Ota(OtaError::ShortImage));
        assert_eq!(ota.session().status, OtaStatus::Failed);
        assert_eq!(ota.session().bytes_written, 800);
        assert!(flash.abandoned);
        assert!(!flash.committed, "no reboot path on a failed attempt");
    }

    #[test]
    fn write_mismatch_aborts() {
        let mut ota = OtaPipeline::new();
        let mut flash = MockFlash::new();
        flash.accept_limit = Some(100);
        let mut src = MockSource {
            manifest: r#"{"update":true,"version":"9.9.9","url":"http://b/fw.bin"}"#,
            body: vec![0xAB; 1000],
            declared_len: 1000,
        };
        let err = ota.check_and_update(&mut src, &mut flash, "http://b/check").unwrap_err();
        assert_eq!(err, Error::Ota(OtaError::WriteMismatch));
        assert!(flash.abandoned);
        assert_eq!(ota.session().status, OtaStatus::Failed);
    }

    #[test]
    fn bad_manifest_is_a_protocol_failure() {
        let mut ota = OtaPipeline::new();
        let mut flash = MockFlash::new();
        let mut src = MockSource { manifest: "not json", body: Vec::new(), declared_len: 0 };
        let err = ota.check_and_update(&mut src, &mut flash, "http://b/check").unwrap_err();
        assert_eq!(err, Error::Protocol(ProtocolError::MalformedManifest));
        assert_eq!(ota.session().status, OtaStatus::Failed);
    }

    #[test]
    fn manifest_without_url_is_not_an_attempt() {
        let mut ota = OtaPipeline::new();
        let mut flash = MockFlash::new();
        let mut src = MockSource {
            manifest: r#"{"update":true,"version":"9.9.9"}"#,
            body: Vec::new(),
            declared_len: 0,
        };
        let outcome = ota.check_and_update(&mut src, &mut flash, "http://b/check").unwrap();
        assert_eq!(outcome, OtaOutcome::UpToDate);
        assert_eq!(ota.session().latest_version.as_str(), "9.9.9");
    }

    #[test]
    fn push_upload_happy_path() {
        let mut ota = OtaPipeline::new();
        let mut flash = MockFlash::new();
        ota.begin_push(Some(8), &mut flash).unwrap();
        assert_eq!(ota.push_chunk(b"abcd", &mut flash).unwrap(), 4);
        assert_eq!(ota.push_chunk(b"efgh", &mut flash).unwrap(), 8);
        ota.finish_push(&mut flash).unwrap();
        assert_eq!(ota.session().status, OtaStatus::Done);
        assert!(flash.committed);
    }

    #[test]
    fn push_without_begin_is_rejected() {
        let mut ota = OtaPipeline::new();
        let mut flash = MockFlash::new();
        let err = ota.push_chunk(b"abcd", &mut flash).unwrap_err();
        assert_eq!(err, Error::Ota(OtaError::NotActive));
    }

    #[test]
    fn push_short_of_declared_length_fails() {
        let mut ota = OtaPipeline::new();
        let mut flash = MockFlash::new();
        ota.begin_push(Some(1000), &mut flash).unwrap();
        ota.push_chunk(&[0u8; 800], &mut flash).unwrap();
        let err = ota.finish_push(&mut flash).unwrap_err();
        assert_eq!(err, Error::Ota(OtaError::ShortImage));
        assert!(flash.abandoned);
    }

    #[test]
    fn push_unknown_length_commits_whatever_arrived() {
        let mut ota = OtaPipeline::new();
        let mut flash = MockFlash::new();
        ota.begin_push(None, &mut flash).unwrap();
        ota.push_chunk(&[0u8; 123], &mut flash).unwrap();
        ota.finish_push(&mut flash).unwrap();
        assert_eq!(ota.session().status, OtaStatus::Done);
        assert_eq!(flash.written.len(), 123);
    }

    #[test]
    fn begin_while_busy_is_rejected() {
        let mut ota = OtaPipeline::new();
        let mut flash = MockFlash::new();
        ota.begin_push(Some(10), &mut flash).unwrap();
        let err = ota.begin_push(Some(10), &mut flash).unwrap_err();
        assert_eq!(err, Error::Ota(OtaError::AlreadyActive));
    }

    #[test]
    fn failed_attempt_allows_a_fresh_one() {
        let mut ota = OtaPipeline::new();
        let mut flash = MockFlash::new();
        ota.begin_push(Some(1000), &mut flash).unwrap();
        ota.push_chunk(&[0u8; 10], &mut flash).unwrap();
        assert!(ota.finish_push(&mut flash).is_err());

        // Old firmware still running; a new attempt starts clean.
        let mut flash2 = MockFlash::new();
        ota.begin_push(Some(4), &mut flash2).unwrap();
        ota.push_chunk(b"1234", &mut flash2).unwrap();
        ota.finish_push(&mut flash2).unwrap();
        assert_eq!(ota.session().status, OtaStatus::Done);
    }

    #[test]
    fn begin_failure_reports_failed() {
        let mut ota = OtaPipeline::new();
        let mut flash = MockFlash::new();
        flash.fail_begin = true;
        let err = ota.begin_push(Some(10), &mut flash).unwrap_err();
        assert_eq!(err, Error::Ota(OtaError::BeginFailed));
        assert_eq!(ota.session().status, OtaStatus::Failed);
    }
}
