use sandcore_core::envelope::SandboxProgramContract;

/// Why a `run_once` call that otherwise completed (no timeout, no
/// cancellation, no startup failure) did not produce a usable envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxFailure {
    /// The container exited with a non-zero status.
    NonZeroExit,
    /// The container exited zero but its stdout did not parse as a
    /// well-formed `SandboxProgramContract`.
    InvalidEnvelope,
}

/// Result of one `run_once` call whose container ran to completion (as
/// opposed to a startup failure, timeout, or cancellation, all of which
/// surface as a [`sandcore_core::CoreError`] instead).
#[derive(Debug, Clone)]
pub struct SandboxOutcome {
    /// `true` only when the container exited zero and its stdout parsed as
    /// a well-formed [`SandboxProgramContract`].
    pub ok: bool,
    /// Why `ok` is false; `None` whenever `ok` is true.
    pub failure: Option<SandboxFailure>,
    /// The container's exit code.
    pub exit_code: i64,
    /// Full captured stdout.
    pub stdout: String,
    /// Full captured stderr.
    pub stderr: String,
    /// Parsed envelope, present whenever `ok` is true.
    pub envelope: Option<SandboxProgramContract>,
}

impl SandboxOutcome {
    /// Build the outcome for a container that exited non-zero: `ok=false`,
    /// no envelope, stderr retained for the caller's terminal error event.
    pub fn non_zero_exit(exit_code: i64, stdout: String, stderr: String) -> Self {
        Self {
            ok: false,
            failure: Some(SandboxFailure::NonZeroExit),
            exit_code,
            stdout,
            stderr,
            envelope: None,
        }
    }

    /// Build the outcome for a container that exited zero but whose stdout
    /// failed to parse as a `SandboxProgramContract`.
    pub fn invalid_envelope(stdout: String, stderr: String) -> Self {
        Self {
            ok: false,
            failure: Some(SandboxFailure::InvalidEnvelope),
            exit_code: 0,
            stdout,
            stderr,
            envelope: None,
        }
    }

    /// Build the outcome for a fully successful run.
    pub fn success(stdout: String, stderr: String, envelope: SandboxProgramContract) -> Self {
        Self {
            ok: true,
            failure: None,
            exit_code: 0,
            stdout,
            stderr,
            envelope: Some(envelope),
        }
    }
}
