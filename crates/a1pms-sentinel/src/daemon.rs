//! Supervisor daemon: drives both supervision timers
//!
//! The node check and the service sweep run as two independent background
//! tasks, each on its own interval, until the handle is shut down.

use crate::context::SupervisionContext;
use crate::error::SentinelError;
use crate::policy::SupervisionPolicy;
use crate::service_sweep::ServiceSupervision;
use crate::supervision::NodeSupervision;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

pub struct Supervisor;

impl Supervisor {
    /// Start both supervision loops.
    ///
    /// The first node check runs immediately, so nodes that start out
    /// UNAVAILABLE are synchronized right after startup.
    ///
    /// ```no_run
    /// # use a1pms_sentinel::{Supervisor, SupervisionContext, SupervisionPolicy};
    /// # async fn example(ctx: SupervisionContext) -> Result<(), a1pms_sentinel::SentinelError> {
    /// let handle = Supervisor::spawn(ctx, SupervisionPolicy::default())?;
    ///
    /// tokio::signal::ctrl_c().await.ok();
    /// handle.shutdown().await;
    /// # Ok(())
    /// # }
    /// ```
    pub fn spawn(
        ctx: SupervisionContext,
        policy: SupervisionPolicy,
    ) -> Result<SupervisorHandle, SentinelError> {
        policy.validate().map_err(SentinelError::InvalidPolicy)?;

        info!(
            node_interval_s = policy.node_interval_s,
            service_interval_s = policy.service_interval_s,
            nodes = ctx.nodes.size(),
            "Supervisor active"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let nodes = NodeSupervision::new(ctx.clone());
        let node_task = tokio::spawn(run_periodically(
            policy.node_interval(),
            shutdown_rx.clone(),
            move || {
                let nodes = nodes.clone();
                async move {
                    let stats = nodes.run_tick().await;
                    info!("{}", stats.summary());
                }
            },
        ));

        let services = ServiceSupervision::new(ctx);
        let service_task = tokio::spawn(run_periodically(
            policy.service_interval(),
            shutdown_rx,
            move || {
                let services = services.clone();
                async move {
                    let stats = services.run_sweep().await;
                    if stats.expired_services > 0 {
                        info!("{}", stats.summary());
                    }
                }
            },
        ));

        Ok(SupervisorHandle {
            shutdown_tx,
            tasks: vec![node_task, service_task],
        })
    }
}

async fn run_periodically<F, Fut>(period: Duration, mut shutdown: watch::Receiver<bool>, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => tick().await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Stops the supervision loops
pub struct SupervisorHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SupervisorHandle {
    /// Signal both loops and wait for them to finish their current tick
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Supervision task ended abnormally");
            }
        }
        info!("Supervisor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }
}
