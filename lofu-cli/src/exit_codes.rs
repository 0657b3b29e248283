//! Exit codes following sysexits.h conventions.
//!
//! These codes give scripts a way to tell a missing file from an
//! unreachable backend without parsing messages.

use lofu_core::LofuError;

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid flags, missing configuration).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Data format error (undecodable image, malformed backend response).
/// Maps to EX_DATAERR from sysexits.h.
pub const DATA_ERROR: i32 = 65;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Service unavailable (backend, store, camera).
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const UNAVAILABLE: i32 = 69;

/// I/O error (cannot write output file).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self {
            code: SUCCESS,
            message: None,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        // Library errors carry their own category; everything else is
        // classified by the context attached in the commands.
        let code = match err.chain().find_map(|cause| cause.downcast_ref::<LofuError>()) {
            Some(lofu) => code_for(lofu),
            None if message.contains("Failed to read") => INPUT_ERROR,
            None if message.contains("Failed to write") => IO_ERROR,
            None => GENERAL_ERROR,
        };

        Self {
            code,
            message: Some(message),
        }
    }
}

fn code_for(err: &LofuError) -> i32 {
    match err {
        LofuError::Config(_) | LofuError::InvalidState { .. } => USAGE_ERROR,
        LofuError::Decode(_) | LofuError::Codec(_) | LofuError::MalformedResponse(_) => DATA_ERROR,
        LofuError::CameraUnavailable(_)
        | LofuError::CameraNotReady
        | LofuError::Backend { .. }
        | LofuError::HttpError(_)
        | LofuError::Store(_) => UNAVAILABLE,
        LofuError::Encode(_) => IO_ERROR,
        LofuError::NoImages | LofuError::Busy | LofuError::Superseded => GENERAL_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_library_errors_are_classified_through_context() {
        let err = Err::<(), _>(LofuError::backend("detect", "down"))
            .context("Detection failed")
            .unwrap_err();
        assert_eq!(ExitCode::from_anyhow(&err).code, UNAVAILABLE);

        let err = anyhow::Error::from(LofuError::Config("bad url".into()));
        assert_eq!(ExitCode::from_anyhow(&err).code, USAGE_ERROR);

        let err = anyhow::Error::from(LofuError::Decode("truncated".into()));
        assert_eq!(ExitCode::from_anyhow(&err).code, DATA_ERROR);
    }

    #[test]
    fn test_io_failures_use_context_message() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = Err::<(), _>(io).context("Failed to read image: feet.png").unwrap_err();
        let exit = ExitCode::from_anyhow(&err);
        assert_eq!(exit.code, INPUT_ERROR);
        assert!(exit.message.unwrap().contains("feet.png"));

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Err::<(), _>(io).context("Failed to write overlay").unwrap_err();
        assert_eq!(ExitCode::from_anyhow(&err).code, IO_ERROR);
    }
}
