use chrono::Utc;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use super::events::{ACTION_FINALIZE, REASON_DELETING};
use super::finalizer::{self, FinalizerState};
use super::status::{self, REASON_RECONCILING, REASON_RESIZING};
use super::{ControllerContext, ReconcileErr, Requeue};
use crate::crd::{Condition, Deployer};
use crate::templates::{
    RenderContext, controller_name, is_controlled_by, node_server_name,
    observed_replicas, render_controller, render_node_server,
};

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Run one reconciliation pass for the deployer called `name`.
///
/// Stale-write conflicts are not failures: they end the pass with an
/// immediate requeue so the next pass starts from a fresh read.
#[instrument(skip_all, fields(name = %name))]
pub async fn reconcile_by_name(
    name: &str,
    ctx: &ControllerContext,
) -> Result<Requeue, ReconcileErr> {
    match run_pass(name, ctx).await {
        Err(e) if e.is_conflict() => {
            debug!(error = %e, "reconcile: stale write; retrying from a fresh read");
            Ok(Requeue::Immediate)
        }
        res => {
            if let Ok(requeue) = &res {
                debug!(%requeue, "reconcile: pass complete");
            }
            res
        }
    }
}

async fn run_pass(
    name: &str,
    ctx: &ControllerContext,
) -> Result<Requeue, ReconcileErr> {
    let Some(mut deployer) = ctx.store.get_deployer(name).await? else {
        info!("deployer resource not found; ignoring since object must be deleted");
        return Ok(Requeue::None);
    };

    if status::current(&deployer).is_empty() {
        info!("reconcile: initializing status");
        persist_status(ctx, &deployer, status::initial(&now())).await?;
        // re-fetch so later writes carry the latest resourceVersion
        deployer = match ctx.store.get_deployer(name).await? {
            Some(d) => d,
            None => return Ok(Requeue::None),
        };
    }

    match FinalizerState::of(&deployer) {
        FinalizerState::NoFinalizer => {
            info!("reconcile: adding finalizer");
            deployer = ctx
                .store
                .update_deployer(&finalizer::with_finalizer(&deployer))
                .await?;
        }
        FinalizerState::FinalizerPresent => {}
        FinalizerState::FinalizerRemoved => {
            debug!("reconcile: marked for deletion and finalizer released");
            return Ok(Requeue::None);
        }
        state => return finalize(ctx, deployer, state).await,
    }

    converge(ctx, deployer).await
}

/// Write `next` through the status subresource unless nothing changed.
async fn persist_status(
    ctx: &ControllerContext,
    deployer: &Deployer,
    next: crate::crd::DeployerStatus,
) -> Result<Deployer, ReconcileErr> {
    if deployer.status.as_ref() == Some(&next) {
        return Ok(deployer.clone());
    }
    let mut updated = deployer.clone();
    updated.status = Some(next);
    Ok(ctx.store.update_deployer_status(&updated).await?)
}

async fn set_condition(
    ctx: &ControllerContext,
    deployer: &Deployer,
    cond: Condition,
) -> Result<Deployer, ReconcileErr> {
    let next = status::current(deployer).with_condition(cond, &now());
    persist_status(ctx, deployer, next).await
}

#[instrument(skip_all, fields(state = ?state))]
async fn finalize(
    ctx: &ControllerContext,
    mut deployer: Deployer,
    state: FinalizerState,
) -> Result<Requeue, ReconcileErr> {
    let name = deployer.name_any();

    if state == FinalizerState::MarkedForDeletion {
        info!("finalize: performing finalizer operations before delete");
        set_condition(ctx, &deployer, status::finalizing_started(&name)).await?;
        do_finalizer_operations(ctx, &deployer).await;
    }

    if state != FinalizerState::CleanupDone {
        deployer = match ctx.store.get_deployer(&name).await? {
            Some(d) => d,
            None => return Ok(Requeue::None),
        };
        deployer =
            set_condition(ctx, &deployer, status::finalizing_done(&name))
                .await?;
    }

    info!("finalize: removing finalizer");
    match ctx
        .store
        .update_deployer(&finalizer::without_finalizer(&deployer))
        .await
    {
        Ok(_) => Ok(Requeue::None),
        Err(e) => {
            warn!(error = %e, "finalize: failed to remove finalizer; retrying");
            Ok(Requeue::Immediate)
        }
    }
}

/// Cleanup that must happen before the deployer goes away.
///
/// Child workloads are not touched here: their owner references let the
/// garbage collector remove them once the deployer is purged.
async fn do_finalizer_operations(ctx: &ControllerContext, deployer: &Deployer) {
    ctx.events
        .publish(
            &deployer.object_ref(&()),
            EventType::Warning,
            REASON_DELETING,
            ACTION_FINALIZE,
            Some(format!(
                "Custom Resource {} is being deleted from the namespace {}",
                deployer.name_any(),
                ctx.cfg.namespace
            )),
        )
        .await;
}

/// Record `Available=False` for a failed step and hand back `err`.
///
/// Conflicts and fatal errors skip the status write.
async fn report_failure(
    ctx: &ControllerContext,
    deployer: &Deployer,
    reason: &str,
    message: String,
    err: ReconcileErr,
) -> ReconcileErr {
    if err.is_conflict() || matches!(err, ReconcileErr::Fatal(_)) {
        return err;
    }
    error!(error = %err, %reason, "{}", message);
    if let Err(status_err) =
        set_condition(ctx, deployer, status::unavailable(reason, message)).await
    {
        error!(error = %status_err, "failed to update deployer status");
    }
    err
}

async fn converge(
    ctx: &ControllerContext,
    deployer: Deployer,
) -> Result<Requeue, ReconcileErr> {
    let name = deployer.name_any();
    let ns = ctx.cfg.namespace.as_str();

    let ds_name = node_server_name(&name);
    match ctx.store.get_daemon_set(&ds_name).await {
        Ok(Some(ds)) => {
            if !is_controlled_by(&ds, &deployer) {
                warn!(%ns, daemon_set = %ds_name, "DaemonSet is not owned by this deployer");
            }
        }
        Ok(None) => {
            let ds = match RenderContext::for_deployer(&deployer, &ctx.cfg)
                .and_then(|rc| render_node_server(&rc))
            {
                Ok(ds) => ds,
                Err(e) => {
                    let message = format!(
                        "Failed to create DaemonSet for the custom resource ({}): ({})",
                        name, e
                    );
                    return Err(report_failure(
                        ctx,
                        &deployer,
                        REASON_RECONCILING,
                        message,
                        e.into(),
                    )
                    .await);
                }
            };
            info!(%ns, daemon_set = %ds_name, "creating a new DaemonSet");
            if let Err(e) = ctx.store.create_daemon_set(&ds).await {
                let message = format!(
                    "Failed to create DaemonSet for the custom resource ({}): ({})",
                    name, e
                );
                return Err(report_failure(
                    ctx,
                    &deployer,
                    REASON_RECONCILING,
                    message,
                    e.into(),
                )
                .await);
            }
            return Ok(Requeue::None);
        }
        Err(e) => {
            let message = format!(
                "Failed to get DaemonSet for the custom resource ({}): ({})",
                name, e
            );
            return Err(report_failure(
                ctx,
                &deployer,
                REASON_RECONCILING,
                message,
                e.into(),
            )
            .await);
        }
    }

    let desired = deployer.desired_replicas();
    let dep_name = controller_name(&name);
    let found = match ctx.store.get_deployment(&dep_name).await {
        Ok(Some(dep)) => dep,
        Ok(None) => {
            let dep = match RenderContext::for_deployer(&deployer, &ctx.cfg)
                .and_then(|rc| render_controller(&rc, desired))
            {
                Ok(dep) => dep,
                Err(e) => {
                    let message = format!(
                        "Failed to create Deployment for the custom resource ({}): ({})",
                        name, e
                    );
                    return Err(report_failure(
                        ctx,
                        &deployer,
                        REASON_RECONCILING,
                        message,
                        e.into(),
                    )
                    .await);
                }
            };
            info!(%ns, deployment = %dep_name, replicas = desired, "creating a new Deployment");
            if let Err(e) = ctx.store.create_deployment(&dep).await {
                let message = format!(
                    "Failed to create Deployment for the custom resource ({}): ({})",
                    name, e
                );
                return Err(report_failure(
                    ctx,
                    &deployer,
                    REASON_RECONCILING,
                    message,
                    e.into(),
                )
                .await);
            }
            // let the new Deployment settle before checking its size
            return Ok(Requeue::After(ctx.cfg.create_requeue()));
        }
        Err(e) => {
            let message = format!(
                "Failed to get Deployment for the custom resource ({}): ({})",
                name, e
            );
            return Err(report_failure(
                ctx,
                &deployer,
                REASON_RECONCILING,
                message,
                e.into(),
            )
            .await);
        }
    };

    if !is_controlled_by(&found, &deployer) {
        warn!(%ns, deployment = %dep_name, "Deployment is not owned by this deployer; leaving it untouched");
        set_condition(
            ctx,
            &deployer,
            status::unavailable(
                REASON_RECONCILING,
                format!(
                    "Deployment {} exists but is not owned by the custom resource ({})",
                    dep_name, name
                ),
            ),
        )
        .await?;
        return Ok(Requeue::None);
    }

    let observed = observed_replicas(&found);
    if observed != desired {
        info!(%ns, deployment = %dep_name, observed, desired, "resizing Deployment");
        let mut resized = found;
        resized.spec.get_or_insert_with(Default::default).replicas = Some(desired);
        if let Err(e) = ctx.store.update_deployment(&resized).await {
            let err = ReconcileErr::from(e);
            if err.is_conflict() {
                return Err(err);
            }
            error!(error = %err, %ns, deployment = %dep_name, "failed to update Deployment");
            // the deployer may have moved on since the pass started
            let Some(fresh) = ctx.store.get_deployer(&name).await? else {
                return Err(err);
            };
            set_condition(
                ctx,
                &fresh,
                status::unavailable(
                    REASON_RESIZING,
                    format!(
                        "Failed to update the size for the custom resource ({}): ({})",
                        name, err
                    ),
                ),
            )
            .await?;
            return Err(err);
        }
        return Ok(Requeue::Immediate);
    }

    set_condition(ctx, &deployer, status::available(&name, desired)).await?;
    Ok(Requeue::None)
}
