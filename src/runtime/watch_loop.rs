//! # Watch Loop
//!
//! One `kube-runtime` [`Controller`] per enabled target kind, all running
//! concurrently over the same [`ControllerContext`].

use crate::controller::server::ServerState;
use crate::error::ReconcileError;
use crate::runtime::error_policy::{
    handle_reconciliation_error, handle_reconciliation_success, ControllerContext,
};
use crate::target::{TargetKind, TargetRef};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::{Client, Resource, ResourceExt};
use kube_runtime::{controller::Action, watcher, Controller};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which kinds to watch
#[derive(Debug, Clone, Copy)]
pub struct WatchedKinds {
    pub deployments: bool,
    pub statefulsets: bool,
    pub daemonsets: bool,
    pub secrets: bool,
}

impl WatchedKinds {
    #[must_use]
    pub fn enabled(&self) -> Vec<TargetKind> {
        [
            (self.deployments, TargetKind::Deployment),
            (self.statefulsets, TargetKind::StatefulSet),
            (self.daemonsets, TargetKind::DaemonSet),
            (self.secrets, TargetKind::Secret),
        ]
        .into_iter()
        .filter_map(|(on, kind)| on.then_some(kind))
        .collect()
    }
}

/// Identity of a watched object
fn target_ref<K: Resource>(kind: TargetKind, obj: &K) -> TargetRef {
    TargetRef::new(kind, obj.namespace().unwrap_or_default(), obj.name_any())
}

async fn reconcile<K: Resource>(
    obj: Arc<K>,
    ctx: Arc<ControllerContext>,
    kind: TargetKind,
) -> Result<Action, ReconcileError> {
    let id = target_ref(kind, obj.as_ref());
    let requeue = ctx.engine.reconcile_with_timeout(&id).await?;
    Ok(handle_reconciliation_success(&id, requeue, &ctx))
}

fn error_policy<K: Resource>(
    obj: Arc<K>,
    error: &ReconcileError,
    ctx: Arc<ControllerContext>,
    kind: TargetKind,
) -> Action {
    let id = target_ref(kind, obj.as_ref());
    handle_reconciliation_error(&id, error, &ctx)
}

/// Run a controller for one kind until shutdown
async fn run_controller<K>(api: Api<K>, kind: TargetKind, ctx: Arc<ControllerContext>)
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    info!(kind = %kind, "Starting controller watch loop...");
    Controller::new(api, watcher::Config::default().any_semantic())
        .shutdown_on_signal()
        .run(
            move |obj, ctx| reconcile(obj, ctx, kind),
            move |obj, error, ctx| error_policy(obj, error, ctx, kind),
            ctx,
        )
        .for_each(|result| {
            match result {
                Ok((obj, _action)) => debug!(kind = %kind, object = %obj.name, "watch.event.success"),
                Err(e) => warn!(kind = %kind, error = %e, "Controller stream error"),
            }
            futures::future::ready(())
        })
        .await;
    info!(kind = %kind, "Controller watch loop stopped");
}

fn controller_for(client: &Client, kind: TargetKind, ctx: Arc<ControllerContext>) -> BoxFuture<'static, ()> {
    match kind {
        TargetKind::Deployment => {
            run_controller(Api::<Deployment>::all(client.clone()), kind, ctx).boxed()
        }
        TargetKind::StatefulSet => {
            run_controller(Api::<StatefulSet>::all(client.clone()), kind, ctx).boxed()
        }
        TargetKind::DaemonSet => {
            run_controller(Api::<DaemonSet>::all(client.clone()), kind, ctx).boxed()
        }
        TargetKind::Secret => run_controller(Api::<Secret>::all(client.clone()), kind, ctx).boxed(),
    }
}

/// Run every enabled controller until a shutdown signal arrives
///
/// # Errors
///
/// Returns an error when no kind is enabled.
pub async fn run_watch_loop(
    client: Client,
    kinds: WatchedKinds,
    ctx: Arc<ControllerContext>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let enabled = kinds.enabled();
    if enabled.is_empty() {
        return Err(anyhow::anyhow!(
            "No target kinds enabled, set at least one of WATCH_DEPLOYMENTS, WATCH_STATEFULSETS, WATCH_DAEMONSETS, WATCH_SECRETS"
        ));
    }

    // Flip readiness as soon as a shutdown signal is seen
    let shutdown_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
            shutdown_state.set_ready(false);
        }
    });

    info!(kinds = ?enabled, "Watching target kinds");
    let controllers: Vec<_> = enabled
        .into_iter()
        .map(|kind| controller_for(&client, kind, Arc::clone(&ctx)))
        .collect();
    futures::future::join_all(controllers).await;

    server_state.set_ready(false);
    info!("Controller stopped gracefully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn test_enabled_kinds() {
        let kinds = WatchedKinds {
            deployments: true,
            statefulsets: false,
            daemonsets: true,
            secrets: false,
        };
        assert_eq!(
            kinds.enabled(),
            vec![TargetKind::Deployment, TargetKind::DaemonSet]
        );
    }

    #[test]
    fn test_target_ref_from_object() {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some("db".to_string()),
                namespace: Some("apps".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            target_ref(TargetKind::Secret, &secret),
            TargetRef::new(TargetKind::Secret, "apps", "db")
        );
    }
}
