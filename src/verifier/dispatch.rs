use std::panic::AssertUnwindSafe;

use futures::{future::join_all, FutureExt};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, warn};

use super::session::{PolicyResult, PolicyTarget, SessionVerificationInfo};
use crate::{
    core::response::DecodedPresentation,
    policy::{PolicyExecutor, PolicyRequest, PolicySubject},
};

/// Detail recorded for policies still pending when the verification deadline passes.
pub const TIMEOUT_DETAIL: &str = "timeout";

/// Detail recorded for policies that panicked.
pub const PANIC_DETAIL: &str = "policy panicked";

struct Invocation<'a> {
    request: &'a PolicyRequest,
    subject: PolicySubject<'a>,
    target: PolicyTarget,
}

/// Run every applicable policy against `presentation` concurrently.
///
/// `vp_policies` run once against the presentation, then each credential gets `vc_policies`
/// followed by the policies specific to its type. Results are returned in that order. Policies
/// still running at `deadline`, or that panic, are recorded as failed.
pub(crate) async fn run_policies(
    executor: &dyn PolicyExecutor,
    info: &SessionVerificationInfo,
    presentation: &DecodedPresentation,
    deadline: Instant,
) -> Vec<PolicyResult> {
    let mut invocations = Vec::new();

    for request in &info.vp_policies {
        invocations.push(Invocation {
            request,
            subject: PolicySubject::Presentation(presentation),
            target: PolicyTarget::Presentation,
        });
    }

    for credential in &presentation.credentials {
        let credential_type = credential.credential_type();
        let specific = info
            .specific_policies
            .get(credential_type.unwrap_or(credential.descriptor_id.as_str()))
            .into_iter()
            .flatten();

        for request in info.vc_policies.iter().chain(specific) {
            invocations.push(Invocation {
                request,
                subject: PolicySubject::Credential(credential),
                target: PolicyTarget::Credential {
                    descriptor_id: credential.descriptor_id.clone(),
                    credential_type: credential_type.map(ToOwned::to_owned),
                },
            });
        }
    }

    debug!(policies = invocations.len(), "dispatching policies");

    join_all(invocations.into_iter().map(|invocation| async move {
        let Invocation {
            request,
            subject,
            target,
        } = invocation;
        let policy = request.policy.clone();

        let execution = AssertUnwindSafe(executor.execute(request, subject)).catch_unwind();
        match timeout_at(deadline, execution).await {
            Ok(Ok(Ok(result))) => PolicyResult::success(policy, target, result),
            Ok(Ok(Err(e))) => {
                debug!(%policy, "policy failed: {e:#}");
                PolicyResult::failure(policy, target, format!("{e:#}"))
            }
            Ok(Err(_)) => {
                error!(%policy, "policy panicked");
                PolicyResult::failure(policy, target, PANIC_DETAIL.into())
            }
            Err(_) => {
                warn!(%policy, "policy timed out");
                PolicyResult::failure(policy, target, TIMEOUT_DETAIL.into())
            }
        }
    }))
    .await
}
