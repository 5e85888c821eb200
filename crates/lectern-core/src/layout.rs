//! Shared-storage layout for generation jobs, reference documents and
//! per-owner profile media.
//!
//! Every externally supplied path component goes through the safety checks
//! here before it touches the filesystem.

use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use crate::error::PipelineError;

/// Playlist filename written by the video generator for each job.
pub const PLAYLIST_FILE: &str = "playlist.m3u8";
/// First synthesized audio chunk; its existence marks the job as ready.
pub const FIRST_CHUNK_FILE: &str = "0001p.wav";

const VOICE_FILE: &str = "cloned_voice.wav";
const FACE_IMAGE_FILE: &str = "face.png";
const FACE_VIDEO_FILE: &str = "face.mp4";

#[derive(Debug, Clone)]
pub struct StorageLayout {
    output_root: PathBuf,
    profiles_root: PathBuf,
    references_root: PathBuf,
}

impl StorageLayout {
    pub fn new(output_root: PathBuf, profiles_root: PathBuf, references_root: PathBuf) -> Self {
        Self {
            output_root,
            profiles_root,
            references_root,
        }
    }

    pub fn ensure_roots(&self) -> anyhow::Result<()> {
        for root in [&self.output_root, &self.profiles_root, &self.references_root] {
            std::fs::create_dir_all(root).map_err(|err| {
                anyhow::anyhow!("failed to create storage root {}: {err}", root.display())
            })?;
        }
        Ok(())
    }

    pub fn job_dir(&self, job: Uuid) -> PathBuf {
        self.output_root.join(job.to_string())
    }

    pub fn first_chunk_path(&self, job: Uuid) -> PathBuf {
        self.job_dir(job).join(FIRST_CHUNK_FILE)
    }

    pub fn playlist_path(&self, job: Uuid) -> PathBuf {
        self.job_dir(job).join("video").join(PLAYLIST_FILE)
    }

    /// Path of a named segment inside a job's video directory. The name must
    /// be a bare filename; anything that could escape the directory is
    /// rejected.
    pub fn segment_path(&self, job: Uuid, name: &str) -> Result<PathBuf, PipelineError> {
        if !is_safe_file_name(name) {
            return Err(PipelineError::InvalidRequest(format!(
                "invalid segment name '{name}'"
            )));
        }
        Ok(self.job_dir(job).join("video").join(name))
    }

    /// Absolute path for a reference document addressed as
    /// `room/path/filename`, rejecting traversal attempts.
    pub fn reference_path(&self, relative: &str) -> Result<PathBuf, PipelineError> {
        let candidate = Path::new(relative.trim_start_matches('/'));
        if candidate.as_os_str().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "empty reference path".to_string(),
            ));
        }
        for component in candidate.components() {
            match component {
                Component::Normal(_) => {}
                _ => {
                    return Err(PipelineError::InvalidRequest(format!(
                        "unsafe reference path '{relative}'"
                    )))
                }
            }
        }
        Ok(self.references_root.join(candidate))
    }

    /// Write a reference document under its room directory, going through a
    /// temp file so a crashed write never leaves a half-visible document.
    pub fn persist_reference(
        &self,
        room_path: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "reference payload cannot be empty".to_string(),
            ));
        }
        if !is_safe_file_name(filename) {
            return Err(PipelineError::InvalidRequest(format!(
                "invalid reference filename '{filename}'"
            )));
        }

        let relative = format!("{}/{filename}", room_path.trim_start_matches('/'));
        let full_path = self.reference_path(&relative)?;
        write_atomically(&full_path, bytes)?;
        Ok(full_path)
    }

    pub fn profile_dir(&self, owner: &str) -> Result<PathBuf, PipelineError> {
        if !is_safe_file_name(owner) {
            return Err(PipelineError::InvalidRequest(format!(
                "invalid owner id '{owner}'"
            )));
        }
        Ok(self.profiles_root.join(owner))
    }

    pub fn voice_path(&self, owner: &str) -> Result<PathBuf, PipelineError> {
        Ok(self.profile_dir(owner)?.join(VOICE_FILE))
    }

    pub fn face_image_path(&self, owner: &str) -> Result<PathBuf, PipelineError> {
        Ok(self.profile_dir(owner)?.join(FACE_IMAGE_FILE))
    }

    pub fn face_video_path(&self, owner: &str) -> Result<PathBuf, PipelineError> {
        Ok(self.profile_dir(owner)?.join(FACE_VIDEO_FILE))
    }
}

pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    let parent = path
        .parent()
        .ok_or_else(|| PipelineError::InvalidRequest("path has no parent".to_string()))?;
    std::fs::create_dir_all(parent)?;

    let temp_path = parent.join(format!(".{}.tmp", Uuid::new_v4().simple()));
    std::fs::write(&temp_path, bytes)?;
    match std::fs::rename(&temp_path, path) {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = std::fs::remove_file(&temp_path);
            Err(err.into())
        }
    }
}

/// A bare filename: non-empty, no separators, no hidden/dot-relative names.
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-' | ' '))
}
