//! Upload slots
//!
//! A slot is one required file of a session. Its status moves
//! `empty → selected → uploading → succeeded | failed`. The chosen file
//! and its preview live only in memory; status and failure count are what
//! survives a reload.

use crate::api::UploadBody;
use crate::flows::{AcceptedFiles, FlowSpec, SlotSpec};
use crate::session::error::{FileRejection, SessionError, SessionResult};
use base64::{engine::general_purpose, Engine as _};
use festreg_common::config::UploadConfig;
use festreg_common::events::SlotStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Image types every slot accepts
pub const IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

pub const PDF_TYPE: &str = "application/pdf";

/// File selection and retry policy applied to every slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPolicy {
    pub max_file_bytes: u64,
    pub allow_pdf: bool,
    /// Failed attempts after which a slot refuses further uploads
    pub max_failures: Option<u32>,
}

impl Default for SlotPolicy {
    fn default() -> Self {
        Self::from(&UploadConfig::default())
    }
}

impl From<&UploadConfig> for SlotPolicy {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_file_bytes: config.max_file_bytes,
            allow_pdf: config.allow_pdf,
            max_failures: config.retry_ceiling(),
        }
    }
}

impl SlotPolicy {
    /// MIME types a slot accepts under this policy
    pub fn allowed_types(&self, accepts: AcceptedFiles) -> Vec<&'static str> {
        let mut allowed = IMAGE_TYPES.to_vec();
        if accepts == AcceptedFiles::ImagesOrPdf && self.allow_pdf {
            allowed.push(PDF_TYPE);
        }
        allowed
    }

    /// Check size and sniffed type; returns the detected MIME type
    pub fn check(
        &self,
        accepts: AcceptedFiles,
        file: &SelectedFile,
    ) -> Result<&'static str, FileRejection> {
        let size = file.len();
        if size == 0 {
            return Err(FileRejection::Empty);
        }
        if size > self.max_file_bytes {
            return Err(FileRejection::TooLarge {
                size,
                max: self.max_file_bytes,
            });
        }

        let allowed = self.allowed_types(accepts);
        match sniff_mime(&file.data) {
            Some(mime) if allowed.contains(&mime) => Ok(mime),
            detected => Err(FileRejection::UnsupportedType {
                detected: detected.map(str::to_string),
                allowed: allowed.join(", "),
            }),
        }
    }
}

/// Content type from magic bytes; the file name is never trusted
pub fn sniff_mime(data: &[u8]) -> Option<&'static str> {
    infer::get(data).map(|kind| kind.mime_type())
}

/// A file chosen by the user, held in memory only
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub file_name: String,
    pub data: Arc<[u8]>,
}

impl SelectedFile {
    pub fn new(file_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            data: Arc::from(data),
        }
    }

    /// Read a file from disk
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(file_name, data))
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Upload percentage that can only grow until reset
#[derive(Debug, Clone, Default)]
pub struct ProgressCell(Arc<AtomicU8>);

impl ProgressCell {
    pub fn get(&self) -> u8 {
        self.0.load(Ordering::Relaxed)
    }

    /// Raise to `percent` (capped at 100); lower values are ignored
    pub fn advance(&self, percent: u8) {
        self.0.fetch_max(percent.min(100), Ordering::Relaxed);
    }

    fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

/// Persisted part of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSlot {
    pub status: SlotStatus,
    #[serde(default)]
    pub failures: u32,
}

/// One required file within a session
#[derive(Debug, Clone)]
pub struct UploadSlot {
    pub spec: &'static SlotSpec,
    status: SlotStatus,
    file: Option<SelectedFile>,
    mime: Option<&'static str>,
    preview: Option<String>,
    progress: ProgressCell,
    failures: u32,
    last_error: Option<String>,
}

impl UploadSlot {
    pub fn new(spec: &'static SlotSpec) -> Self {
        Self {
            spec,
            status: SlotStatus::Empty,
            file: None,
            mime: None,
            preview: None,
            progress: ProgressCell::default(),
            failures: 0,
            last_error: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    pub fn status(&self) -> SlotStatus {
        self.status
    }

    pub fn file(&self) -> Option<&SelectedFile> {
        self.file.as_ref()
    }

    /// `data:` URL of an image selection
    pub fn preview(&self) -> Option<&str> {
        self.preview.as_deref()
    }

    pub fn progress(&self) -> u8 {
        self.progress.get()
    }

    pub fn progress_cell(&self) -> ProgressCell {
        self.progress.clone()
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Retry ceiling reached under `policy`
    pub fn is_exhausted(&self, policy: &SlotPolicy) -> bool {
        policy
            .max_failures
            .map(|max| self.failures >= max)
            .unwrap_or(false)
    }

    /// Accept a file after validating it; leaves the slot untouched on rejection
    pub fn select(&mut self, file: SelectedFile, policy: &SlotPolicy) -> SessionResult<()> {
        match self.status {
            SlotStatus::Succeeded => return Err(SessionError::SlotBusy(self.name().to_string())),
            SlotStatus::Uploading => {
                return Err(SessionError::UploadFailed {
                    slot: self.name().to_string(),
                    reason: "an upload is already in progress".to_string(),
                })
            }
            _ => {}
        }
        if self.is_exhausted(policy) {
            return Err(SessionError::RetryLimitReached {
                slot: self.name().to_string(),
                failures: self.failures,
            });
        }

        let mime = policy.check(self.spec.accepts, &file)?;

        self.preview = if mime.starts_with("image/") {
            Some(data_url(mime, &file.data))
        } else {
            None
        };
        self.mime = Some(mime);
        self.file = Some(file);
        self.status = SlotStatus::Selected;
        self.progress.reset();
        self.last_error = None;
        Ok(())
    }

    /// Drop the file and return to `empty`
    pub fn discard(&mut self) -> SessionResult<()> {
        if self.status == SlotStatus::Uploading {
            return Err(SessionError::UploadFailed {
                slot: self.name().to_string(),
                reason: "an upload is in progress".to_string(),
            });
        }
        self.clear_file();
        self.status = SlotStatus::Empty;
        self.last_error = None;
        Ok(())
    }

    /// Move to `uploading` and hand out the body to send
    pub fn begin_upload(&mut self, policy: &SlotPolicy) -> SessionResult<UploadBody> {
        let name = self.name().to_string();
        match self.status {
            SlotStatus::Selected | SlotStatus::Failed => {}
            SlotStatus::Succeeded => return Err(SessionError::SlotBusy(name)),
            SlotStatus::Empty => return Err(SessionError::NoFileSelected(name)),
            SlotStatus::Uploading => {
                return Err(SessionError::UploadFailed {
                    slot: name,
                    reason: "an upload is already in progress".to_string(),
                })
            }
        }
        if self.is_exhausted(policy) {
            return Err(SessionError::RetryLimitReached {
                slot: name,
                failures: self.failures,
            });
        }
        let (file, mime) = match (&self.file, self.mime) {
            (Some(file), Some(mime)) => (file, mime),
            _ => return Err(SessionError::NoFileSelected(name)),
        };

        let body = UploadBody {
            content_type: mime.to_string(),
            data: file.data.clone(),
        };
        self.status = SlotStatus::Uploading;
        self.progress.reset();
        self.last_error = None;
        Ok(body)
    }

    pub fn mark_succeeded(&mut self) {
        self.status = SlotStatus::Succeeded;
        self.progress.advance(100);
        self.last_error = None;
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = SlotStatus::Failed;
        self.failures += 1;
        self.last_error = Some(reason.into());
    }

    /// Persisted form of this slot
    pub fn persisted(&self) -> PersistedSlot {
        let status = match self.status {
            SlotStatus::Succeeded => SlotStatus::Succeeded,
            SlotStatus::Failed => SlotStatus::Failed,
            _ => SlotStatus::Empty,
        };
        PersistedSlot {
            status,
            failures: self.failures,
        }
    }

    /// Rebuild after reload; files are gone so only `succeeded` survives as-is
    fn restore(&mut self, persisted: PersistedSlot) {
        self.clear_file();
        self.failures = persisted.failures;
        self.status = match persisted.status {
            SlotStatus::Succeeded => SlotStatus::Succeeded,
            SlotStatus::Failed if persisted.failures > 0 => SlotStatus::Failed,
            _ => SlotStatus::Empty,
        };
        if self.status == SlotStatus::Succeeded {
            self.progress.advance(100);
        }
    }

    fn clear_file(&mut self) {
        self.file = None;
        self.mime = None;
        self.preview = None;
        self.progress.reset();
    }
}

fn data_url(mime: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime, general_purpose::STANDARD.encode(data))
}

/// The ordered slots of one session
#[derive(Debug, Clone)]
pub struct SlotSet {
    slots: Vec<UploadSlot>,
}

impl SlotSet {
    pub fn for_flow(spec: &'static FlowSpec) -> Self {
        Self::from_specs(spec.slots)
    }

    pub fn from_specs(specs: &'static [SlotSpec]) -> Self {
        Self {
            slots: specs.iter().map(UploadSlot::new).collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &UploadSlot> {
        self.slots.iter()
    }

    pub fn get(&self, name: &str) -> Option<&UploadSlot> {
        self.slots.iter().find(|s| s.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> SessionResult<&mut UploadSlot> {
        self.slots
            .iter_mut()
            .find(|s| s.name() == name)
            .ok_or_else(|| SessionError::UnknownSlot(name.to_string()))
    }

    /// Finalize gate: every required slot has `succeeded`
    pub fn all_succeeded(&self) -> bool {
        self.slots.iter().all(|s| s.status() == SlotStatus::Succeeded)
    }

    /// Names of slots not yet `succeeded`
    pub fn missing(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|s| s.status() != SlotStatus::Succeeded)
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn any_exhausted(&self, policy: &SlotPolicy) -> bool {
        self.slots.iter().any(|s| s.is_exhausted(policy))
    }

    /// Back to all-empty, dropping files and failure counts
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = UploadSlot::new(slot.spec);
        }
    }

    /// Drop in-memory files, keeping statuses
    pub fn clear_files(&mut self) {
        for slot in &mut self.slots {
            if slot.status() == SlotStatus::Selected {
                slot.status = SlotStatus::Empty;
            }
            slot.clear_file();
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, PersistedSlot> {
        self.slots
            .iter()
            .map(|s| (s.name().to_string(), s.persisted()))
            .collect()
    }

    /// Apply persisted statuses; unknown names are ignored
    pub fn restore(&mut self, persisted: &BTreeMap<String, PersistedSlot>) {
        for slot in &mut self.slots {
            match persisted.get(slot.name()) {
                Some(p) => slot.restore(*p),
                None => *slot = UploadSlot::new(slot.spec),
            }
        }
    }
}
