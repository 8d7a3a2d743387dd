//! Process entry point: wires the broker adapter, the decoder/dispatcher,
//! the per-device pipelines, the client registry, and the
//! interactive-connection endpoint together, then runs until the process
//! is asked to stop.

use std::sync::Arc;

use config::Settings;
use dispatch::DispatchTuning;
use pipeline::{BroadcastTuning, DevicePipelines, PersistenceTuning};
use state::{ClientRegistry, Counters, RoutingTable, SaveFlag};
use store::{SqlxStore, Store};
use task::labels::{ProcessLabels, TaskLabels};
use task::TaskManager;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;
    info!(broker_host = %settings.broker_host, ws_bind_addr = %settings.ws_bind_addr, "starting telemetry bridge");

    let mut task_manager = TaskManager::with_process_labels(ProcessLabels::new("telemetry-bridge"));

    let counters = Arc::new(Counters::new());
    let save_flag = Arc::new(SaveFlag::new(settings.save_flag_default));
    let routing = Arc::new(RoutingTable::new());
    let registry: Arc<ClientRegistry<ws::WsHandle>> = Arc::new(ClientRegistry::new());

    let sqlx_store = SqlxStore::connect(&settings.database_url).await?;
    sqlx_store.init_schema().await?;
    let store: Arc<dyn Store> = Arc::new(sqlx_store);

    let (ingress_tx, ingress_rx) = ingress::channel();

    let pipelines = Arc::new(DevicePipelines::new(
        registry.clone(),
        routing.clone(),
        counters.clone(),
        store.clone(),
        task_manager.clone(),
        BroadcastTuning {
            egress_batch: settings.egress_batch,
            egress_timeout: settings.egress_timeout,
            compression_threshold: settings.compression_threshold,
        },
        PersistenceTuning {
            db_batch: settings.db_batch,
            db_interval: settings.db_interval,
        },
    ));

    let broker_adapter = broker::BrokerAdapter::connect(
        &settings.broker_host,
        settings.broker_port,
        &settings.broker_client_id,
        ingress_tx,
    )
    .await?;

    {
        let pipelines = pipelines.clone();
        let save_flag = save_flag.clone();
        let counters = counters.clone();
        let tuning = DispatchTuning {
            max_batch: settings.max_batch,
            batch_timeout: settings.batch_timeout,
        };
        let task_labels = TaskLabels::new("dispatch", "decoder", "ingress");
        let process_labels = task_manager.process_labels();
        let cleanup_labels = task_labels.clone();

        let join_handle = tokio::spawn(async move {
            dispatch::run(ingress_rx, pipelines, save_flag, counters, tuning).await;
            TaskManager::no_task_cleaner(process_labels, cleanup_labels)
        });
        task_manager.register(join_handle, &task_labels);
    }

    let app_state = ws::AppState {
        registry,
        save_flag,
        counters,
        store,
        broker: broker_adapter,
    };

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for shutdown signal");
        }
    };

    ws::run(&settings.ws_bind_addr, app_state, shutdown).await?;

    task_manager.join().await;
    Ok(())
}
