//! disciplined - the discipline background service
//!
//! This is the main entry point for the disciplined service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Privileged executor (shell backed)
//! - Reconciler, scheduler driver and policy manager
//! - IPC server

use anyhow::{Context, Result};
use clap::Parser;
use discipline_api::{
    ClientRole, Command, ErrorCode, ErrorInfo, Event, EventPayload, HealthStatus, Response,
    ResponsePayload,
};
use discipline_config::load_config;
use discipline_core::{
    CoreError, CoreEvent, PolicyManager, Reconciler, RunTrigger, SchedulerDriver, SettingsService,
};
use discipline_executor_api::PrivilegedExecutor;
use discipline_executor_shell::ShellExecutor;
use discipline_ipc::{IpcServer, ServerMessage};
use discipline_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use discipline_util::{ClientId, database_path, default_config_path};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// disciplined - scheduled app restriction enforcement
#[derive(Parser, Debug)]
#[command(name = "disciplined")]
#[command(about = "Scheduled app restriction enforcement service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/discipline/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set DISCIPLINE_SOCKET env var)
    #[arg(short, long, env = "DISCIPLINE_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set DISCIPLINE_DATA_DIR env var)
    #[arg(short, long, env = "DISCIPLINE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

struct Service {
    manager: Arc<PolicyManager>,
    driver: Arc<SchedulerDriver>,
    ipc: Arc<IpcServer>,
    store: Arc<dyn Store>,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let config = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            interval_secs = config.schedule.interval.as_secs(),
            exact_timers = config.schedule.exact_timers,
            "Configuration loaded"
        );

        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| config.daemon.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| config.daemon.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = database_path(&data_dir);
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        store.append_audit(AuditEvent::new(AuditEventType::DaemonStarted))?;

        let executor: Arc<dyn PrivilegedExecutor> = Arc::new(ShellExecutor::new(
            config.executor.command_prefix.clone(),
            config.executor.readiness_probe.clone(),
            config.executor.timeout,
        ));

        let protected = config
            .safety
            .protected_packages(&config.executor.host_package);
        info!(
            prefix = ?config.executor.command_prefix,
            protected = ?protected,
            "Privileged executor configured"
        );

        let reconciler = Arc::new(Reconciler::new(store.clone(), executor, protected));
        let (events, _) = broadcast::channel(64);
        let driver = Arc::new(SchedulerDriver::new(
            reconciler.clone(),
            store.clone(),
            &config.schedule,
            events.clone(),
        ));

        let settings = SettingsService::load_or_default(store.clone());
        let manager = Arc::new(PolicyManager::new(
            store.clone(),
            reconciler,
            driver.clone(),
            settings,
            events,
        ));

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        Ok(Self {
            manager,
            driver,
            ipc: Arc::new(ipc),
            store,
        })
    }

    async fn run(self) -> Result<()> {
        let mut alarms = self
            .driver
            .take_trigger_receiver()
            .context("Alarm receiver already taken")?;
        let mut core_events = self.manager.subscribe();
        let mut ipc_messages = self
            .ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let ipc_accept = self.ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        // First run also arms the periodic alarm
        self.driver.request_immediate(RunTrigger::Startup);

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                Some(trigger) = alarms.recv() => {
                    self.driver.request_immediate(trigger);
                }

                event = core_events.recv() => match event {
                    Ok(event) => Self::handle_core_event(&self.driver, &self.ipc, event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Dropped core events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        error!("Core event channel closed");
                        break;
                    }
                },

                Some(msg) = ipc_messages.recv() => {
                    Self::spawn_ipc_handler(&self.manager, &self.driver, &self.ipc, msg);
                }
            }
        }

        info!("Shutting down disciplined");

        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::DaemonStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }
        self.ipc.shutdown();

        info!("Shutdown complete");
        Ok(())
    }

    fn handle_core_event(driver: &Arc<SchedulerDriver>, ipc: &Arc<IpcServer>, event: CoreEvent) {
        // Change notices double as a second path to request a run
        if event.is_mutation() {
            driver.request_immediate(RunTrigger::Broadcast);
        }

        let payload = match event {
            CoreEvent::PoliciesChanged { policy_count } => {
                EventPayload::PoliciesChanged { policy_count }
            }
            CoreEvent::GroupsChanged { group_count } => EventPayload::GroupsChanged { group_count },
            CoreEvent::ReconcileFinished(summary) => EventPayload::ReconcileFinished(summary),
        };
        ipc.broadcast_event(Event::new(payload));
    }

    /// Requests can wait on the executor; keep them off the main loop
    fn spawn_ipc_handler(
        manager: &Arc<PolicyManager>,
        driver: &Arc<SchedulerDriver>,
        ipc: &Arc<IpcServer>,
        msg: ServerMessage,
    ) -> JoinHandle<()> {
        let manager = manager.clone();
        let driver = driver.clone();
        let ipc = ipc.clone();
        tokio::spawn(async move {
            Self::handle_ipc_message(&manager, &driver, &ipc, msg).await;
        })
    }

    async fn handle_ipc_message(
        manager: &Arc<PolicyManager>,
        driver: &Arc<SchedulerDriver>,
        ipc: &Arc<IpcServer>,
        msg: ServerMessage,
    ) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                let role = ipc
                    .get_client_info(&client_id)
                    .await
                    .map(|info| info.role)
                    .unwrap_or(ClientRole::Observer);

                let allowed = match &request.command {
                    Command::ReconcileNow => role.can_trigger(),
                    command => !command.is_mutation() || role.can_edit(),
                };

                let response = if !allowed {
                    warn!(client_id = %client_id, command = ?request.command, "Denied mutation from observer");
                    Response::error(
                        request.request_id,
                        ErrorInfo::new(ErrorCode::PermissionDenied, "Admin role required"),
                    )
                } else {
                    Self::handle_command(manager, driver, &client_id, request.request_id, request.command)
                        .await
                };

                let _ = ipc.send_response(&client_id, response).await;
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(
                    client_id = %client_id,
                    role = ?info.role,
                    uid = ?info.uid,
                    "Client connected"
                );
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");
            }
        }
    }

    async fn handle_command(
        manager: &Arc<PolicyManager>,
        driver: &Arc<SchedulerDriver>,
        client_id: &ClientId,
        request_id: u64,
        command: Command,
    ) -> Response {
        let now = discipline_util::now();

        let result = match command {
            Command::Ping => Ok(ResponsePayload::Pong),

            Command::GetHealth => Ok(ResponsePayload::Health(HealthStatus {
                live: true,
                executor_ready: manager.executor_ready().await,
                store_ok: manager.store_healthy(),
                policy_count: manager.list_policies().map(|p| p.len()).unwrap_or(0),
                last_run: driver.last_run(),
            })),

            Command::ListPolicies => manager.list_policies().map(ResponsePayload::Policies),

            Command::SavePolicy { policy } => manager
                .save_policy(policy)
                .map(|policy_id| ResponsePayload::PolicySaved { policy_id }),

            Command::DeletePolicy { policy_id } => manager
                .delete_policy(&policy_id)
                .map(|existed| ResponsePayload::PolicyDeleted { existed }),

            Command::ListGroups => manager.list_groups().map(ResponsePayload::Groups),

            Command::SaveGroup { group } => manager
                .save_group(group)
                .map(|group_id| ResponsePayload::GroupSaved { group_id }),

            Command::DeleteGroup { group_id } => manager
                .delete_group(&group_id)
                .map(|existed| ResponsePayload::GroupDeleted { existed }),

            Command::ReconcileNow => Ok(ResponsePayload::ReconcileFinished(
                manager.trigger_reconcile_now().await,
            )),

            Command::GetRestricted => manager
                .currently_restricted_identifiers(now)
                .await
                .map(|set| ResponsePayload::Restricted(set.into_iter().collect())),

            Command::ListPackages => manager
                .installed_packages(now)
                .await
                .map(ResponsePayload::Packages),

            Command::GetSettings => Ok(ResponsePayload::Settings(
                manager.settings_view(now.date_naive()).await,
            )),

            Command::UpdateSettings { update } => manager
                .update_settings(update, now.date_naive())
                .await
                .map(ResponsePayload::Settings),

            Command::SetForceMode { enabled } => manager
                .set_force_mode(enabled, now.date_naive())
                .await
                .map(|view| {
                    view.map_or(ResponsePayload::ForceModeLocked, ResponsePayload::Settings)
                }),

            Command::UseUnlock => manager.use_unlock(now.date_naive()).await.map(|granted| {
                match granted {
                    Some(remaining) => ResponsePayload::UnlockGranted { remaining },
                    None => ResponsePayload::UnlockDenied,
                }
            }),

            Command::SubscribeEvents => Ok(ResponsePayload::Subscribed {
                client_id: client_id.clone(),
            }),

            Command::UnsubscribeEvents => Ok(ResponsePayload::Unsubscribed),
        };

        match result {
            Ok(payload) => Response::success(request_id, payload),
            Err(e) => Response::error(request_id, error_info(&e)),
        }
    }
}

fn error_info(error: &CoreError) -> ErrorInfo {
    let code = match error {
        CoreError::Validation(_) => ErrorCode::ValidationFailed,
        CoreError::Store(_) => ErrorCode::StoreError,
        CoreError::Executor(_) | CoreError::ExecutorNotReady => ErrorCode::ExecutorUnavailable,
    };
    ErrorInfo::new(code, error.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "disciplined starting");

    if discipline_util::is_mock_time_active() {
        let now = discipline_util::format_datetime_full(&discipline_util::now());
        warn!(now = %now, "Schedules use mock time");
    }

    let service = Service::new(&args).await?;
    service.run().await
}
