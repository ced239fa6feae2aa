// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Request scoped read/write routing
//!
//! The routing tag decides which pool the next [`Db::get_conn`](crate::Db::get_conn)
//! call draws from. It lives in a task local, so a scope set at the service
//! boundary is visible to every database call of that request and is restored
//! when the scope is left, also on error or cancellation.

use std::future::Future;

/// Selector for one of the two backing pools
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum RoutingTarget {
    /// The primary, transactional pool
    #[default]
    Write,
    /// The replica pool, auto-commit and flagged read-only
    Read,
}

impl RoutingTarget {
    /// Lowercase label used as the `pool` attribute on metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Read => "read",
        }
    }
}

tokio::task_local! {
    static ROUTING_TARGET: RoutingTarget;

    static TRANSACTION_TARGET: RoutingTarget;
}

/// The routing tag in effect for the current task
///
/// Defaults to [`RoutingTarget::Write`] when no scope is set.
pub fn current_target() -> RoutingTarget {
    ROUTING_TARGET.try_with(|target| *target).unwrap_or_default()
}

/// The pinned target of the currently open transaction, if any
pub(crate) fn transaction_target() -> Option<RoutingTarget> {
    TRANSACTION_TARGET.try_with(|target| *target).ok()
}

/// Run `op` with the given routing target
///
/// Nested scopes may set a different target, which is restored on exit. The
/// restore is drop based and therefore holds on every exit path, including
/// errors and cancellation.
pub async fn with_routing<F>(target: RoutingTarget, op: F) -> F::Output
where
    F: Future,
{
    ROUTING_TARGET.scope(target, op).await
}

/// Run `op` routed to the write pool
pub async fn with_write<F>(op: F) -> F::Output
where
    F: Future,
{
    with_routing(RoutingTarget::Write, op).await
}

/// Run `op` routed to the read pool
///
/// Read-only is a performance hint, not a safety boundary: when a write
/// transaction is already open on this task the hint is ignored with a
/// warning and the operation stays on the write route.
pub async fn with_read<F>(op: F) -> F::Output
where
    F: Future,
{
    if transaction_target() == Some(RoutingTarget::Write) {
        log::warn!(
            "Operation marked read-only inside an open write transaction, keeping the write route"
        );
        return op.await;
    }

    with_routing(RoutingTarget::Read, op).await
}

/// Pin the routing target for the duration of a transaction
///
/// While the scope is active, acquiring a connection for a different target
/// fails with [`DatabaseError::RoutingChangedMidTransaction`](crate::DatabaseError).
pub(crate) async fn pin_transaction<F>(target: RoutingTarget, op: F) -> F::Output
where
    F: Future,
{
    TRANSACTION_TARGET.scope(target, op).await
}
