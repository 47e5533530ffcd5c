use parking_lot::Mutex;
use tracing::{error, info};

use crate::dashboard::DashboardState;
use crate::remote::{ApiError, DashboardApi};

/// Marks a transaction as in flight for as long as it is alive. Dropping it
/// releases the mark whether the dismissal succeeded, failed, panicked, or
/// was cancelled.
struct InFlight<'a> {
    state: &'a Mutex<DashboardState>,
    transaction_id: &'a str,
}

impl<'a> InFlight<'a> {
    fn enter(state: &'a Mutex<DashboardState>, transaction_id: &'a str) -> Self {
        state.lock().begin_dismiss(transaction_id);
        InFlight {
            state,
            transaction_id,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state.lock().end_dismiss(self.transaction_id);
    }
}

/// Asks the backend to clear the error on `transaction_id`, then clears it
/// locally. Unknown ids still go to the backend; a failed call leaves the
/// error visible so the user can retry.
pub async fn dismiss_error(
    state: &Mutex<DashboardState>,
    api: &dyn DashboardApi,
    transaction_id: &str,
) -> Result<usize, ApiError> {
    let _in_flight = InFlight::enter(state, transaction_id);

    match api.dismiss_transaction(transaction_id).await {
        Ok(()) => {
            let patched = state.lock().clear_transaction_error(transaction_id);
            info!(transaction_id, patched, "transaction error dismissed");
            Ok(patched)
        }
        Err(e) => {
            error!(
                transaction_id,
                kind = e.kind(),
                error = %e,
                "failed to dismiss transaction error"
            );
            Err(e)
        }
    }
}
