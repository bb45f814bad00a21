// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================

//! Shape checks for inbound events.
//!
//! Validation here is about keeping junk out of room state: oversized
//! payloads, markup in display names, traversal-looking paths. An event
//! that fails is dropped by the connection loop; peers never see it and
//! the sender gets no error reply.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use codesync_common::ClientEvent;

pub const MAX_ROOM_ID_LENGTH: usize = 64;
pub const MAX_USER_NAME_LENGTH: usize = 50;
pub const MAX_FILE_PATH_LENGTH: usize = 256;
pub const MAX_LANGUAGE_LENGTH: usize = 32;
pub const MAX_VERSION_LENGTH: usize = 16;
pub const MAX_CONTENT_BYTES: usize = 1_048_576;

static ROOM_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("Invalid room id regex"));

static USER_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^<>{}()\[\]\\/;\x00-\x1f]+$").expect("Invalid user name regex")
});

static FILE_PATH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^<>{}\\;\x00-\x1f]+$").expect("Invalid file path regex"));

static LANGUAGE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+#._-]+$").expect("Invalid language regex"));

static VERSION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9.*_-]+$").expect("Invalid version regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("room id must be 1-{MAX_ROOM_ID_LENGTH} letters, digits, dots, dashes or underscores")]
    InvalidRoomId,

    #[error("user name must be 1-{MAX_USER_NAME_LENGTH} characters without markup")]
    InvalidUserName,

    #[error("file path is empty, too long, absolute, traversing, or holds forbidden characters")]
    InvalidFilePath,

    #[error("language tag must be 1-{MAX_LANGUAGE_LENGTH} plain characters")]
    InvalidLanguage,

    #[error("version constraint must be 1-{MAX_VERSION_LENGTH} plain characters")]
    InvalidVersion,

    #[error("content exceeds {MAX_CONTENT_BYTES} bytes")]
    ContentTooLarge,
}

pub type ValidationResult<T> = Result<T, ValidationError>;

pub fn validate_room_id(room_id: &str) -> ValidationResult<()> {
    if room_id.is_empty() || room_id.len() > MAX_ROOM_ID_LENGTH || !ROOM_ID_REGEX.is_match(room_id)
    {
        return Err(ValidationError::InvalidRoomId);
    }
    Ok(())
}

pub fn validate_user_name(user_name: &str) -> ValidationResult<()> {
    if user_name.is_empty()
        || user_name.len() > MAX_USER_NAME_LENGTH
        || !USER_NAME_REGEX.is_match(user_name)
    {
        return Err(ValidationError::InvalidUserName);
    }
    Ok(())
}

pub fn validate_file_path(path: &str) -> ValidationResult<()> {
    if path.is_empty() || path.len() > MAX_FILE_PATH_LENGTH || !FILE_PATH_REGEX.is_match(path) {
        return Err(ValidationError::InvalidFilePath);
    }
    if path.starts_with('/') || path.split('/').any(|component| component == "..") {
        return Err(ValidationError::InvalidFilePath);
    }
    Ok(())
}

pub fn validate_language(language: &str) -> ValidationResult<()> {
    if language.is_empty()
        || language.len() > MAX_LANGUAGE_LENGTH
        || !LANGUAGE_REGEX.is_match(language)
    {
        return Err(ValidationError::InvalidLanguage);
    }
    Ok(())
}

pub fn validate_version(version: &str) -> ValidationResult<()> {
    if version.len() > MAX_VERSION_LENGTH || !VERSION_REGEX.is_match(version) {
        return Err(ValidationError::InvalidVersion);
    }
    Ok(())
}

pub fn validate_content_size(content: &str) -> ValidationResult<()> {
    if content.len() > MAX_CONTENT_BYTES {
        return Err(ValidationError::ContentTooLarge);
    }
    Ok(())
}

// Optional fields are checked only when present and non-empty; an empty
// optional string downgrades to "not provided" downstream.
fn validate_optional_path(path: Option<&str>) -> ValidationResult<()> {
    match path {
        Some(p) if !p.is_empty() => validate_file_path(p),
        _ => Ok(()),
    }
}

/// Checks every field of an inbound event before it reaches a room.
pub fn validate_client_event(event: &ClientEvent) -> ValidationResult<()> {
    match event {
        ClientEvent::Join { room_id, user_name } => {
            validate_room_id(room_id)?;
            validate_user_name(user_name)
        }
        ClientEvent::CodeChange {
            room_id,
            code,
            file_name,
        } => {
            validate_room_id(room_id)?;
            validate_file_path(file_name)?;
            validate_content_size(code)
        }
        ClientEvent::FileSystemUpdate {
            room_id,
            file_name,
            new_file_name,
            files,
            ..
        } => {
            validate_room_id(room_id)?;
            validate_optional_path(file_name.as_deref())?;
            validate_optional_path(new_file_name.as_deref())?;
            if let Some(files) = files {
                for (path, record) in files {
                    validate_file_path(path)?;
                    validate_content_size(&record.content)?;
                }
            }
            Ok(())
        }
        ClientEvent::CreateFile {
            room_id,
            file_name,
            content,
            language,
        } => {
            validate_room_id(room_id)?;
            validate_file_path(file_name)?;
            validate_content_size(content)?;
            validate_language(language)
        }
        ClientEvent::DeleteFile { room_id, file_name } => {
            validate_room_id(room_id)?;
            validate_file_path(file_name)
        }
        ClientEvent::LeaveRoom => Ok(()),
        ClientEvent::Typing {
            room_id,
            user_name,
            file_name,
        } => {
            validate_room_id(room_id)?;
            validate_user_name(user_name)?;
            validate_file_path(file_name)
        }
        ClientEvent::LanguageChange {
            room_id,
            language,
            file_name,
        } => {
            validate_room_id(room_id)?;
            validate_language(language)?;
            validate_file_path(file_name)
        }
        ClientEvent::CompileCode {
            room_id,
            language,
            version,
            file_name,
            code,
        } => {
            validate_room_id(room_id)?;
            validate_language(language)?;
            if let Some(version) = version.as_deref().filter(|v| !v.is_empty()) {
                validate_version(version)?;
            }
            validate_optional_path(file_name.as_deref())?;
            validate_content_size(code)
        }
        ClientEvent::GetRoomInfo { room_id } => validate_room_id(room_id),
    }
}
