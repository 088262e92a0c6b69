//! Query Pipeline - normalize → hooks → forge → dispatch
//!
//! Every stage consumes the previous stage's value. The whole pipeline runs
//! inside the call's tracing span, and errors raised by any stage carry the
//! call's [`QueryContext`].

use serde_json::Value;
use tracing::Instrument;

use super::method::QueryMethod;
use super::request::QueryRequest;
use super::stage_three::forge;
use super::stage_two::{normalize, Normalized};
use crate::context::QueryContext;
use crate::dispatch::dispatch;
use crate::error::OrmResult;
use crate::lifecycle::run_before;
use crate::model::LiveModel;

/// Run one model call end to end
pub async fn run(
    model: &LiveModel,
    method: QueryMethod,
    request: QueryRequest,
    context: QueryContext,
) -> OrmResult<Option<Value>> {
    let span = context.span();
    async move {
        let attach = |error: crate::error::OrmError| error.with_context(&context);
        let resolved = model.resolved();

        let logical = match normalize(
            method,
            request,
            resolved,
            model.schema(),
            model.config(),
            context.initiated_at,
        )
        .map_err(attach)?
        {
            Normalized::Ready(query) => query,
            Normalized::NoOp(outcome) => {
                tracing::debug!(reason = outcome.reason, "Short-circuiting no-op query");
                return Ok(outcome.result);
            }
        };

        let concurrency = model
            .datastore()
            .adapter()
            .max_concurrency()
            .unwrap_or(model.config().hook_concurrency);
        let logical = run_before(logical, model.callbacks(), concurrency)
            .await
            .map_err(attach)?;

        let physical = forge(logical, resolved.identity(), model.schema()).map_err(attach)?;
        let result = dispatch(resolved, model.datastore(), physical, &context)
            .await
            .map_err(attach)?;

        tracing::debug!(elapsed_ms = context.elapsed_ms(), "Query settled");
        Ok(result)
    }
    .instrument(span)
    .await
}
