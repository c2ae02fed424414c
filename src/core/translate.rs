//! Translation of provider job states into [`NormalizedStatus`] records.
//!
//! The table is asymmetric on purpose: an export into the local staging area
//! is followed by a download, so a provider-side `COMPLETED` only finishes the
//! first half of the job. Only exports into the remote asset store treat
//! provider completion as final.

use tracing::{error, warn};

use super::models::{Destination, ExportStep, NormalizedStatus, RawJobSnapshot, RawJobState};

/// Description used when the job could not be observed at all.
pub fn failure_description(destination: Destination) -> String {
    format!("Export to {} failed", destination.label())
}

/// Normalize a snapshot returned by the provider.
///
/// Jobs that never ran or already failed are reported as a failed export with
/// the provider's error message attached.
pub fn normalize(snapshot: &RawJobSnapshot, destination: Destination) -> NormalizedStatus {
    match snapshot.state {
        RawJobState::Unsubmitted | RawJobState::Failed => {
            error!(
                job_id = %snapshot.id,
                state = ?snapshot.state,
                error = snapshot.error_message.as_deref().unwrap_or(""),
                "Export to {} failed",
                destination.label()
            );
            match &snapshot.error_message {
                Some(message) => NormalizedStatus::failed(format!(
                    "{}: {}",
                    failure_description(destination),
                    message
                )),
                None => NormalizedStatus::failed(failure_description(destination)),
            }
        }
        _ => map_state(snapshot, destination),
    }
}

/// Apply the state table without the precondition check.
pub fn map_state(snapshot: &RawJobSnapshot, destination: Destination) -> NormalizedStatus {
    let label = destination.label();

    match snapshot.state {
        RawJobState::Failed => {
            NormalizedStatus::failed(snapshot.error_message.clone().unwrap_or_default())
        }
        RawJobState::CancelRequested | RawJobState::Cancelled => NormalizedStatus::canceled(),
        RawJobState::Completed => match destination {
            Destination::LocalStaging => NormalizedStatus::active(
                format!("Downloading from {}...", label),
                ExportStep::Exported,
            ),
            Destination::RemoteAsset => NormalizedStatus::completed(),
        },
        RawJobState::Ready => NormalizedStatus::active(
            format!("Export to {} pending...", label),
            ExportStep::Exporting,
        ),
        state => {
            if state == RawJobState::Unknown {
                warn!(job_id = %snapshot.id, "Unrecognized job state, assuming export in progress");
            }
            NormalizedStatus::active(format!("Exporting to {}...", label), ExportStep::Exporting)
        }
    }
}
